//! Account, credential, and client-option records.
//!
//! Loading these from a DI/config-binding layer is out of scope here — this
//! module only defines the plain records and their constructors.

use std::time::Duration;

use crate::errors::Error;

/// Snowflake-style account identity. `account_id` is `{org}-{acct}` and
/// `base_uri` is derived from it.
#[derive(Debug, Clone)]
pub struct Account {
    pub organization_name: String,
    pub account_name: String,
    base_uri_override: Option<String>,
}

impl Account {
    pub fn new(organization_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            organization_name: organization_name.into(),
            account_name: account_name.into(),
            base_uri_override: None,
        }
    }

    /// Points the bootstrap calls at a fixed base URI instead of the derived
    /// `snowflakecomputing.com` host. Exists for pointing a client at a test
    /// double; real deployments should leave this unset.
    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri_override = Some(base_uri.into());
        self
    }

    pub fn account_id(&self) -> String {
        format!("{}-{}", self.organization_name, self.account_name)
    }

    pub fn base_uri(&self) -> String {
        if let Some(base_uri) = &self.base_uri_override {
            return base_uri.clone();
        }
        format!(
            "https://{}.snowflakecomputing.com",
            self.account_id().replace('_', "-").to_lowercase()
        )
    }
}

/// Key-pair credential material. Exactly one of `private_key_pem` /
/// `private_key_path` must be set.
#[derive(Clone)]
pub struct Credential {
    pub user: String,
    pub login: Option<String>,
    pub private_key_pem: Option<String>,
    pub private_key_path: Option<String>,
    pub private_key_passphrase: Option<String>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("login", &self.login)
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "<redacted>"))
            .field("private_key_path", &self.private_key_path)
            .field(
                "private_key_passphrase",
                &self.private_key_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Credential {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            login: None,
            private_key_pem: None,
            private_key_path: None,
            private_key_passphrase: None,
        }
    }

    pub fn with_private_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.private_key_pem = Some(pem.into());
        self
    }

    pub fn with_private_key_path(mut self, path: impl Into<String>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.private_key_passphrase = Some(passphrase.into());
        self
    }

    /// The JWT-signing principal name: `login` if set, else `user`.
    pub fn principal(&self) -> &str {
        self.login.as_deref().unwrap_or(&self.user)
    }

    /// Resolves the PEM text, reading from `private_key_path` if
    /// `private_key_pem` was not supplied directly.
    pub fn resolve_private_key_pem(&self) -> Result<String, Error> {
        if let Some(pem) = &self.private_key_pem {
            return Ok(pem.clone());
        }
        if let Some(path) = &self.private_key_path {
            return std::fs::read_to_string(path).map_err(Error::from);
        }
        Err(Error::Config(
            "neither private_key_pem nor private_key_path is set".into(),
        ))
    }
}

/// gzip compression level for append bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GzipLevel {
    Fastest,
    Default,
    Best,
}

impl GzipLevel {
    pub(crate) fn to_flate2(self) -> flate2::Compression {
        match self {
            GzipLevel::Fastest => flate2::Compression::fast(),
            GzipLevel::Default => flate2::Compression::default(),
            GzipLevel::Best => flate2::Compression::best(),
        }
    }
}

/// Per-request behavior shared by every HTTP operation.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub user_agent: String,
    pub timeout: Duration,
    pub retry_backoff_base: Duration,
    pub max_retries: u32,
    pub proxy: Option<String>,
    pub validate_certificates: bool,
    pub enable_gzip_on_append: bool,
    pub gzip_min_bytes: usize,
    pub gzip_level: GzipLevel,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: "snowpipe-streaming-rust-sdk/0.1.0".to_string(),
            timeout: Duration::from_secs(100),
            retry_backoff_base: Duration::from_millis(200),
            max_retries: 5,
            proxy: None,
            validate_certificates: true,
            enable_gzip_on_append: true,
            gzip_min_bytes: 4096,
            gzip_level: GzipLevel::Fastest,
        }
    }
}

/// Buffered-write flush policy, immutable per channel.
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    pub max_rows: usize,
    pub max_bytes: usize,
    pub flush_interval: Duration,
    pub min_hold_after_append: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_rows: 50_000,
            max_bytes: 4_000_000,
            flush_interval: Duration::from_secs(5),
            min_hold_after_append: Duration::from_secs(10),
        }
    }
}

/// Health-timer / reopen cadence, kept as its own small record so
/// `FlushPolicy` stays focused on buffering thresholds.
#[derive(Debug, Clone, Copy)]
pub struct ChannelTimers {
    pub status_interval: Duration,
    pub reopen_backoff: Duration,
    pub drift_retry_delay: Duration,
}

impl Default for ChannelTimers {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(5 * 60),
            reopen_backoff: Duration::from_secs(2),
            drift_retry_delay: Duration::from_secs(3),
        }
    }
}
