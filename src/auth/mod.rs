//! Auth provider: JWT signing, host discovery, OAuth exchange, and request
//! stamping.

mod bootstrap;

use std::time::{Duration, SystemTime};

use reqwest::{Client, RequestBuilder};
use tokio::sync::{Mutex, RwLock};

use crate::config::{Account, Credential};
use crate::crypto::RsaKeyMaterial;
use crate::errors::Error;
use crate::retry::RetryCoordinator;
use crate::telemetry::refresh::{RefreshOutcome, RefreshTelemetry};
use crate::token::TokenEnvelope;

/// Skew before OAuth token expiry at which `ensure_ready` proactively
/// refreshes.
const TOKEN_SKEW: Duration = Duration::from_secs(60);

struct AuthState {
    ingest_base: Option<String>,
    token: Option<TokenEnvelope>,
}

/// Owns the discovered ingest host and the OAuth access token; one instance
/// is shared process-wide.
///
/// Bootstrap must gate on three independent conditions (missing token, token
/// within the skew window, or unknown host); `refresh_lock` single-flights
/// concurrent callers through a double-checked read so only one bootstrap
/// round runs at a time.
pub struct AuthProvider {
    account: Account,
    credential: Credential,
    key: RsaKeyMaterial,
    http: Client,
    retry: RetryCoordinator,
    state: RwLock<AuthState>,
    refresh_lock: Mutex<()>,
    telemetry: RefreshTelemetry,
}

impl AuthProvider {
    pub fn new(
        account: Account,
        credential: Credential,
        key: RsaKeyMaterial,
        http: Client,
        retry: RetryCoordinator,
    ) -> Self {
        Self {
            account,
            credential,
            key,
            http,
            retry,
            state: RwLock::new(AuthState {
                ingest_base: None,
                token: None,
            }),
            refresh_lock: Mutex::new(()),
            telemetry: RefreshTelemetry::new("auth_bootstrap"),
        }
    }

    /// The discovered ingest base URI. Fails if host discovery hasn't run yet.
    pub async fn ingest_base_uri(&self) -> Result<String, Error> {
        self.state
            .read()
            .await
            .ingest_base
            .clone()
            .ok_or_else(|| Error::Config("ingest host not yet discovered".into()))
    }

    pub async fn is_ready(&self) -> bool {
        let state = self.state.read().await;
        match (&state.ingest_base, &state.token) {
            (Some(_), Some(token)) => !self.needs_refresh(token),
            _ => false,
        }
    }

    /// Idempotent, re-entrant-safe: concurrent callers single-flight through
    /// `refresh_lock`.
    pub async fn ensure_ready(&self) -> Result<(), Error> {
        if self.is_ready().await {
            return Ok(());
        }
        let _lock = self.refresh_lock.lock().await;
        if self.is_ready().await {
            return Ok(());
        }

        self.telemetry.emit_start(SystemTime::now());
        let jwt = bootstrap::mint_jwt(&self.account, &self.credential, &self.key)?;

        let existing_host = self.state.read().await.ingest_base.clone();
        let ingest_base = match existing_host {
            Some(base) => base,
            None => {
                let discovered =
                    bootstrap::discover_ingest_host(&self.http, &self.retry, &self.account, &jwt)
                        .await
                        .inspect_err(|err| self.telemetry.emit_failure(err, SystemTime::now()))?;
                self.state.write().await.ingest_base = Some(discovered.clone());
                discovered
            }
        };

        match bootstrap::exchange_oauth_token(&self.http, &self.retry, &self.account, &ingest_base, &jwt)
            .await
        {
            Ok(envelope) => {
                self.state.write().await.token = Some(envelope);
                self.telemetry.emit_success(RefreshOutcome::Success, SystemTime::now());
                Ok(())
            }
            Err(err) => {
                self.telemetry.emit_failure(&err, SystemTime::now());
                Err(err)
            }
        }
    }

    /// `ensure_ready` then sets `Authorization: Bearer <access_token>`.
    pub async fn attach(&self, builder: RequestBuilder) -> Result<RequestBuilder, Error> {
        let token = self.bearer_token().await?;
        Ok(builder.bearer_auth(token))
    }

    /// `ensure_ready` then returns the current access token value. Callers
    /// that build their own retryable request closures (the `client` module)
    /// resolve this once and bake it into the closure, since
    /// [`crate::transport::dispatch`]'s builder must be synchronous.
    pub async fn bearer_token(&self) -> Result<String, Error> {
        self.ensure_ready().await?;
        let state = self.state.read().await;
        state
            .token
            .as_ref()
            .map(|t| t.value().to_string())
            .ok_or_else(|| Error::Config("no access token available after ensure_ready".into()))
    }

    fn needs_refresh(&self, token: &TokenEnvelope) -> bool {
        token.remaining(SystemTime::now() + TOKEN_SKEW).is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn needs_refresh_when_within_skew() {
        let now = SystemTime::now();
        let token = TokenEnvelope::try_new(
            "tok".into(),
            now - Duration::from_secs(3600),
            now + Duration::from_secs(30),
        )
        .unwrap();
        let provider = test_provider();
        assert!(provider.needs_refresh(&token));
    }

    #[test]
    fn does_not_need_refresh_when_far_from_expiry() {
        let now = SystemTime::now();
        let token = TokenEnvelope::try_new(
            "tok".into(),
            now - Duration::from_secs(60),
            now + Duration::from_secs(3600),
        )
        .unwrap();
        let provider = test_provider();
        assert!(!provider.needs_refresh(&token));
    }

    fn test_provider() -> AuthProvider {
        const TEST_RSA_PRIVKEY_PEM: &str = include_str!("../../tests/fixtures/id_rsa.pem");
        let key = RsaKeyMaterial::from_pem(TEST_RSA_PRIVKEY_PEM, None).unwrap();
        AuthProvider::new(
            Account::new("org", "acct"),
            Credential::new("user"),
            key,
            Client::new(),
            RetryCoordinator::default(),
        )
    }
}
