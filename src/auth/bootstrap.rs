//! The two-call bootstrap protocol: host discovery and OAuth exchange.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::Client;
use serde::Serialize;

use crate::config::{Account, Credential};
use crate::crypto::{self, RsaKeyMaterial};
use crate::errors::{self, Error};
use crate::retry::{OperationKind, RetryCoordinator};
use crate::token::TokenEnvelope;
use crate::transport;

#[derive(Serialize)]
struct JwtClaims {
    iss: String,
    sub: String,
    aud: String,
    iat: u64,
    exp: u64,
}

/// Mints a fresh JWT for one bootstrap round.
pub(super) fn mint_jwt(
    account: &Account,
    credential: &Credential,
    key: &RsaKeyMaterial,
) -> Result<String, Error> {
    let account_upper = account.account_id().replace('.', "-").to_uppercase();
    let user_upper = credential.principal().to_uppercase();
    let sub = format!("{account_upper}.{user_upper}");
    let iss = format!("{sub}.{}", key.fingerprint());
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| Error::Config("system clock before unix epoch".into()))?
        .as_secs();
    let claims = JwtClaims {
        iss,
        sub,
        aud: account.base_uri(),
        iat: now.saturating_sub(30),
        exp: now + 9 * 60,
    };
    crypto::sign(key, &claims)
}

/// `GET {accountBase}/v2/streaming/hostname`.
pub(super) async fn discover_ingest_host(
    http: &Client,
    retry: &RetryCoordinator,
    account: &Account,
    jwt: &str,
) -> Result<String, Error> {
    let url = format!("{}/v2/streaming/hostname", account.base_uri());
    let response = transport::dispatch(http, retry, OperationKind::DiscoverHost, || {
        http.get(&url)
            .bearer_auth(jwt)
            .header("X-Snowflake-Authorization-Token-Type", "KEYPAIR_JWT")
            .header(reqwest::header::ACCEPT, "application/json")
    })
    .await
    .map_err(to_bootstrap_error)?;
    let status = response.status();
    let body = response.text().await?;
    parse_hostname_body(&body).ok_or_else(|| Error::Bootstrap {
        status,
        body: errors::truncate_body(&body),
    })
}

/// `POST {accountBase}/oauth/token`.
pub(super) async fn exchange_oauth_token(
    http: &Client,
    retry: &RetryCoordinator,
    account: &Account,
    ingest_base: &str,
    jwt: &str,
) -> Result<TokenEnvelope, Error> {
    let url = format!("{}/oauth/token", account.base_uri());
    let params = [
        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
        ("scope", ingest_base),
    ];
    let response = transport::dispatch(http, retry, OperationKind::ExchangeOAuthToken, || {
        http.post(&url)
            .bearer_auth(jwt)
            .header("X-Snowflake-Authorization-Token-Type", "KEYPAIR_JWT")
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
    })
    .await
    .map_err(to_bootstrap_error)?;
    let status = response.status();
    let body = response.text().await?;
    parse_oauth_body(&body).ok_or_else(|| Error::Bootstrap {
        status,
        body: errors::truncate_body(&body),
    })
}

fn to_bootstrap_error(err: Error) -> Error {
    match err {
        Error::Service { status, body, .. } => Error::Bootstrap { status, body },
        other => other,
    }
}

/// Tolerates a JSON object with `ingestHostname`, a bare JSON string, or
/// plain text containing the hostname.
fn parse_hostname_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(s) = value.as_str() {
            return Some(normalize_hostname(s));
        }
        return value
            .get("ingestHostname")
            .and_then(|v| v.as_str())
            .map(normalize_hostname);
    }
    Some(normalize_hostname(trimmed))
}

fn normalize_hostname(raw: &str) -> String {
    let raw = raw.trim().trim_matches('"').trim_end_matches('/');
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

/// Tolerates a JSON object (`access_token`/`expires_in`), a form-encoded
/// body, or a bare JWT string.
fn parse_oauth_body(body: &str) -> Option<TokenEnvelope> {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let access_token = value.get("access_token").and_then(|v| v.as_str())?;
        let expires_in = value.get("expires_in").and_then(|v| v.as_u64()).unwrap_or(3600);
        return build_envelope(access_token, expires_in);
    }
    if let Some(envelope) = parse_form_encoded(trimmed) {
        return Some(envelope);
    }
    if is_bare_jwt(trimmed) {
        return build_envelope(trimmed, 3600);
    }
    None
}

fn parse_form_encoded(body: &str) -> Option<TokenEnvelope> {
    if !body.contains('=') {
        return None;
    }
    let mut access_token: Option<String> = None;
    let mut expires_in = 3600u64;
    for pair in body.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?;
        let value = parts.next().unwrap_or("");
        let decoded = urlencoding::decode(value).ok()?.into_owned();
        match key {
            "access_token" => access_token = Some(decoded),
            "expires_in" => expires_in = decoded.parse().unwrap_or(3600),
            _ => {}
        }
    }
    build_envelope(&access_token?, expires_in)
}

fn is_bare_jwt(s: &str) -> bool {
    !s.is_empty() && s.split('.').count() == 3 && !s.contains(char::is_whitespace)
}

fn build_envelope(value: &str, expires_in: u64) -> Option<TokenEnvelope> {
    let now = SystemTime::now();
    let ttl = Duration::from_secs(expires_in.max(60));
    TokenEnvelope::try_new(value.to_string(), now, now + ttl).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_hostname() {
        assert_eq!(
            normalize_hostname("abc123.ingest.snowflakecomputing.com"),
            "https://abc123.ingest.snowflakecomputing.com"
        );
    }

    #[test]
    fn parses_json_object_hostname() {
        let body = r#"{"ingestHostname": "abc.ingest.snowflakecomputing.com"}"#;
        assert_eq!(
            parse_hostname_body(body).unwrap(),
            "https://abc.ingest.snowflakecomputing.com"
        );
    }

    #[test]
    fn parses_json_string_hostname() {
        let body = r#""abc.ingest.snowflakecomputing.com""#;
        assert_eq!(
            parse_hostname_body(body).unwrap(),
            "https://abc.ingest.snowflakecomputing.com"
        );
    }

    #[test]
    fn parses_plain_text_hostname() {
        let body = "abc.ingest.snowflakecomputing.com";
        assert_eq!(
            parse_hostname_body(body).unwrap(),
            "https://abc.ingest.snowflakecomputing.com"
        );
    }

    #[test]
    fn parses_json_oauth_token() {
        let body = r#"{"access_token": "tok-1", "expires_in": 1800}"#;
        let envelope = parse_oauth_body(body).unwrap();
        assert_eq!(envelope.value(), "tok-1");
    }

    #[test]
    fn parses_form_encoded_oauth_token() {
        let body = "access_token=tok-2&expires_in=600&token_type=bearer";
        let envelope = parse_oauth_body(body).unwrap();
        assert_eq!(envelope.value(), "tok-2");
    }

    #[test]
    fn parses_bare_jwt_oauth_token() {
        let body = "aaa.bbb.ccc";
        let envelope = parse_oauth_body(body).unwrap();
        assert_eq!(envelope.value(), "aaa.bbb.ccc");
    }

    #[test]
    fn rejects_unparseable_oauth_body() {
        assert!(parse_oauth_body("not json, not form, not a jwt").is_none());
    }
}
