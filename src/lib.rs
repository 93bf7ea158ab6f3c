//! A client for streaming row inserts into a cloud data warehouse's
//! append-only pipe endpoint: JWT-signed bootstrap, OAuth token exchange,
//! gzip-aware retrying transport, and buffered, auto-flushing ingest
//! channels.

mod auth;
mod channel;
mod client;
mod config;
mod crypto;
mod errors;
mod normalize;
mod payload;
mod retry;
mod schema;
mod telemetry;
mod token;
mod transport;
mod types;

use std::sync::Arc;

use reqwest::Client as HttpClient;
use tracing::info;

pub use auth::AuthProvider;
pub use channel::{Channel, ChannelState};
pub use client::{GzipSettings, IngestClient};
pub use config::{Account, ChannelTimers, ClientOptions, Credential, FlushPolicy, GzipLevel};
pub use crypto::RsaKeyMaterial;
pub use errors::Error;
pub use normalize::RawValue;
pub use retry::RetryPlan;
pub use schema::{ColumnSpec, ColumnType, PipeCoords, SchemaObjectCoords, TableSchema};
pub use types::{AppendRowsResponse, BulkChannelStatusResponse, ChannelStatus, OpenChannelResponse};

use retry::RetryCoordinator;

/// Top-level entry point: owns the shared [`AuthProvider`] and
/// [`IngestClient`], and mints [`Channel`]s against a single pipe. One
/// instance is meant to live for the process's lifetime; channels are cheap
/// to open and drop.
pub struct SnowpipeStreamingService {
    client: Arc<IngestClient>,
    options: ClientOptions,
}

impl SnowpipeStreamingService {
    /// Builds the HTTP client, parses the key material, and wires the auth
    /// provider and retry coordinator. Does not perform any network I/O;
    /// the first `open_channel` call triggers bootstrap.
    pub fn new(account: Account, credential: Credential, options: ClientOptions) -> Result<Self, Error> {
        let pem = credential.resolve_private_key_pem()?;
        let key = RsaKeyMaterial::from_pem(&pem, credential.private_key_passphrase.as_deref())?;

        let mut builder = HttpClient::builder()
            .user_agent(options.user_agent.clone())
            .timeout(options.timeout)
            .danger_accept_invalid_certs(!options.validate_certificates);
        if let Some(proxy) = &options.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(|e| Error::Config(e.to_string()))?);
        }
        let http = builder.build().map_err(Error::Reqwest)?;

        let plan = RetryPlan::new(options.max_retries, options.retry_backoff_base, std::time::Duration::from_secs(30));
        let auth_retry = RetryCoordinator::new(plan.clone());
        let client_retry = RetryCoordinator::new(plan);

        let auth = Arc::new(AuthProvider::new(account, credential, key, http.clone(), auth_retry));
        let client = Arc::new(IngestClient::new(http, client_retry, auth));

        info!("snowpipe_streaming.service_initialized");
        Ok(Self { client, options })
    }

    /// Opens a channel against `pipe`/`channel_name`, bootstrapping auth and
    /// discovering the ingest host on first use.
    pub async fn open_channel(
        &self,
        pipe: PipeCoords,
        channel_name: impl Into<String>,
        schema: TableSchema,
        flush_policy: FlushPolicy,
        timers: ChannelTimers,
    ) -> Result<Arc<Channel>, Error> {
        let gzip = GzipSettings {
            enabled: self.options.enable_gzip_on_append,
            min_bytes: self.options.gzip_min_bytes,
            level: self.options.gzip_level,
        };
        let channel = Channel::new(
            channel_name,
            pipe,
            schema,
            flush_policy,
            timers,
            gzip,
            Arc::clone(&self.client),
        );
        channel.open().await?;
        info!(channel = channel.name(), "snowpipe_streaming.channel_opened");
        Ok(channel)
    }

    /// Bulk committed-offset lookup across channels of one pipe.
    pub async fn list_committed_offsets(
        &self,
        pipe: &PipeCoords,
        channels: &[String],
    ) -> Result<BulkChannelStatusResponse, Error> {
        self.client.list_committed_offsets(pipe, channels).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_fails_without_key_material() {
        let account = Account::new("org", "acct");
        let credential = Credential::new("user");
        let err = SnowpipeStreamingService::new(account, credential, ClientOptions::default())
            .expect_err("credential has no key material");
        assert!(matches!(err, Error::Config(_)));
    }
}
