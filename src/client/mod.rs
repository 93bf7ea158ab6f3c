//! Typed wrappers over the service's five REST endpoints. All paths are
//! rooted at the discovered ingest base URI.

use std::sync::Arc;

use reqwest::{Client, Response};

use crate::auth::AuthProvider;
use crate::config::GzipLevel;
use crate::errors::{self, Error};
use crate::retry::{OperationKind, RetryCoordinator};
use crate::schema::PipeCoords;
use crate::transport;
use crate::types::{
    AppendRowsResponse, BulkChannelStatusRequest, BulkChannelStatusResponse, ChannelStatus,
    DeleteChannelResponse, OpenChannelResponse,
};

/// Append-specific gzip behavior.
#[derive(Debug, Clone, Copy)]
pub struct GzipSettings {
    pub enabled: bool,
    pub min_bytes: usize,
    pub level: GzipLevel,
}

pub struct IngestClient {
    http: Client,
    retry: RetryCoordinator,
    auth: Arc<AuthProvider>,
}

impl IngestClient {
    pub fn new(http: Client, retry: RetryCoordinator, auth: Arc<AuthProvider>) -> Self {
        Self { http, retry, auth }
    }

    async fn ingest_url(&self, path: &str) -> Result<String, Error> {
        let base = self.auth.ingest_base_uri().await?;
        Ok(format!("{base}{}", transport::normalize_path(path)))
    }

    fn channel_path(pipe: &PipeCoords, channel: &str) -> String {
        format!(
            "/v2/streaming/databases/{}/schemas/{}/pipes/{}/channels/{}",
            escape(&pipe.database),
            escape(&pipe.schema),
            escape(&pipe.pipe),
            escape(channel)
        )
    }

    /// `PUT .../channels/{channel}`.
    pub async fn open_channel(
        &self,
        pipe: &PipeCoords,
        channel: &str,
    ) -> Result<OpenChannelResponse, Error> {
        let token = self.auth.bearer_token().await?;
        let url = self.ingest_url(&Self::channel_path(pipe, channel)).await?;
        let response = transport::dispatch(&self.http, &self.retry, OperationKind::OpenChannel, || {
            self.http.put(&url).bearer_auth(&token).json(&serde_json::json!({}))
        })
        .await?;
        Ok(response.json::<OpenChannelResponse>().await?)
    }

    /// `POST .../rows?continuationToken=...&offsetToken=...` with an NDJSON
    /// body, gzip-compressed when enabled and large enough; falls back to an
    /// uncompressed retry exactly once on a gzip-rejection response.
    pub async fn append_rows(
        &self,
        pipe: &PipeCoords,
        channel: &str,
        body: &[u8],
        continuation_token: &str,
        offset_token: Option<&str>,
        gzip: GzipSettings,
    ) -> Result<AppendRowsResponse, Error> {
        let token = self.auth.bearer_token().await?;
        let base = self
            .ingest_url(&format!(
                "/v2/streaming/data/databases/{}/schemas/{}/pipes/{}/channels/{}/rows",
                escape(&pipe.database),
                escape(&pipe.schema),
                escape(&pipe.pipe),
                escape(channel)
            ))
            .await?;
        let mut url = format!("{base}?continuationToken={}", urlencoding::encode(continuation_token));
        if let Some(offset) = offset_token {
            if !offset.is_empty() {
                url.push_str(&format!("&offsetToken={}", urlencoding::encode(offset)));
            }
        }

        if gzip.enabled && body.len() >= gzip.min_bytes {
            let compressed = transport::compress(body, gzip.level)?;
            match self.send_append(&url, &token, &compressed, true).await {
                Ok(response) => return Self::parse_append_response(response).await,
                Err(Error::Service { status, body: resp_body, .. })
                    if transport::response_rejects_gzip(status, &resp_body) =>
                {
                    let response = self.send_append(&url, &token, body, false).await?;
                    return Self::parse_append_response(response).await;
                }
                Err(err) => return Err(err),
            }
        }

        let response = self.send_append(&url, &token, body, false).await?;
        Self::parse_append_response(response).await
    }

    async fn send_append(
        &self,
        url: &str,
        token: &str,
        body: &[u8],
        gzip: bool,
    ) -> Result<Response, Error> {
        let payload = body.to_vec();
        transport::dispatch(&self.http, &self.retry, OperationKind::AppendRows, move || {
            let builder = self
                .http
                .post(url)
                .bearer_auth(token)
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(payload.clone());
            if gzip {
                builder.header(reqwest::header::CONTENT_ENCODING, "gzip")
            } else {
                builder
            }
        })
        .await
    }

    async fn parse_append_response(response: Response) -> Result<AppendRowsResponse, Error> {
        Ok(response.json::<AppendRowsResponse>().await?)
    }

    /// `GET .../channels/{channel}`.
    pub async fn get_channel_status(
        &self,
        pipe: &PipeCoords,
        channel: &str,
    ) -> Result<ChannelStatus, Error> {
        let token = self.auth.bearer_token().await?;
        let url = self.ingest_url(&Self::channel_path(pipe, channel)).await?;
        let response = transport::dispatch(&self.http, &self.retry, OperationKind::GetChannelStatus, || {
            self.http.get(&url).bearer_auth(&token)
        })
        .await?;
        Ok(response.json::<ChannelStatus>().await?)
    }

    /// `POST /v2/streaming/channels/status/` bulk lookup.
    pub async fn list_committed_offsets(
        &self,
        pipe: &PipeCoords,
        channels: &[String],
    ) -> Result<BulkChannelStatusResponse, Error> {
        let token = self.auth.bearer_token().await?;
        let url = self.ingest_url("/v2/streaming/channels/status/").await?;
        let payload = BulkChannelStatusRequest {
            database_name: pipe.database.clone(),
            schema_name: pipe.schema.clone(),
            pipe_name: pipe.pipe.clone(),
            channels: channels.to_vec(),
        };
        let response = transport::dispatch(&self.http, &self.retry, OperationKind::ListCommittedOffsets, || {
            self.http.post(&url).bearer_auth(&token).json(&payload)
        })
        .await?;
        Ok(response.json::<BulkChannelStatusResponse>().await?)
    }

    /// `DELETE .../channels/{channel}`, tolerating an empty success body.
    pub async fn delete_channel(
        &self,
        pipe: &PipeCoords,
        channel: &str,
    ) -> Result<DeleteChannelResponse, Error> {
        let token = self.auth.bearer_token().await?;
        let url = self.ingest_url(&Self::channel_path(pipe, channel)).await?;
        let response = transport::dispatch(&self.http, &self.retry, OperationKind::DeleteChannel, || {
            self.http.delete(&url).bearer_auth(&token)
        })
        .await?;
        let status = response.status();
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(DeleteChannelResponse { channel_status: None });
        }
        serde_json::from_str(&body).map_err(|_| Error::Service {
            status,
            code: None,
            message: None,
            body: errors::truncate_body(&body),
        })
    }
}

fn escape(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}
