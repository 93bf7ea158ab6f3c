//! Request envelope, retry policy, gzip, and error classification.

mod gzip;

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::errors::{self, Error};
use crate::retry::{Attempt, OperationKind, RetryCoordinator};

pub(crate) use gzip::{compress, response_rejects_gzip};

/// Normalizes a path: leading slash present, no trailing slash except root.
pub fn normalize_path(path: &str) -> String {
    let mut p = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    while p.len() > 1 && p.ends_with('/') {
        p.pop();
    }
    p
}

/// True for the two bootstrap paths that must not recurse into
/// `AuthProvider::ensure_ready`.
pub fn is_bootstrap_path(path: &str) -> bool {
    let p = normalize_path(path);
    p == "/v2/streaming/hostname" || p == "/oauth/token"
}

/// Sends one attempt of a request built by `build`, classifying the
/// response and returning the retry-loop decision.
async fn send_once(
    client: &Client,
    build: &(dyn Fn() -> reqwest::RequestBuilder + Send + Sync),
) -> Attempt<Response> {
    let request = match build().build() {
        Ok(r) => r,
        Err(e) => return Attempt::Fail(Error::Reqwest(e)),
    };
    match client.execute(request).await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                return Attempt::Done(response);
            }
            if errors::is_retryable_status(status) {
                let retry_after = parse_retry_after(&response);
                let error = classify_terminal(response).await;
                return Attempt::Retry { error, retry_after };
            }
            Attempt::Fail(classify_terminal(response).await)
        }
        Err(e) => {
            if e.is_timeout() || e.is_connect() {
                Attempt::Retry {
                    error: Error::Reqwest(e),
                    retry_after: None,
                }
            } else {
                Attempt::Fail(Error::Reqwest(e))
            }
        }
    }
}

/// Parses a `Retry-After` header (delta-seconds or HTTP-date), capped at
/// 30s; a past HTTP-date yields a zero delay, never negative.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    let raw = response.headers().get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    if let Ok(secs) = raw.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs).min(Duration::from_secs(30)));
    }
    let at = httpdate::parse_http_date(raw.trim()).ok()?;
    let now = std::time::SystemTime::now();
    let delta = at.duration_since(now).unwrap_or(Duration::ZERO);
    Some(delta.min(Duration::from_secs(30)))
}

async fn classify_terminal(response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed: Option<serde_json::Value> = serde_json::from_str(&body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code").or_else(|| v.get("errorCode")))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("error")))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Error::Service {
        status,
        code,
        message,
        body: errors::truncate_body(&body),
    }
}

/// Runs `build` through the retry coordinator, re-reading the body only once
/// classification has picked a terminal status.
pub(crate) async fn dispatch<F>(
    client: &Client,
    retry: &RetryCoordinator,
    operation: OperationKind,
    build: F,
) -> Result<Response, Error>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let (response, _outcome) = retry
        .execute(operation, |_attempt| send_once(client, &build))
        .await?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_missing_leading_slash() {
        assert_eq!(normalize_path("v2/streaming/hostname"), "/v2/streaming/hostname");
    }

    #[test]
    fn strips_trailing_slash_but_not_root() {
        assert_eq!(normalize_path("/v2/streaming/"), "/v2/streaming");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn recognizes_bootstrap_paths() {
        assert!(is_bootstrap_path("/v2/streaming/hostname"));
        assert!(is_bootstrap_path("oauth/token"));
        assert!(!is_bootstrap_path("/v2/streaming/databases/d/schemas/s/pipes/p/channels/c"));
    }
}
