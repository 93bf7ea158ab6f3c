use std::time::{Duration, SystemTime};

use crate::errors::Error;

/// An OAuth access token plus the timestamps needed to decide when it needs
/// refreshing.
#[derive(Clone, Debug)]
pub struct TokenEnvelope {
    value: String,
    issued_at: SystemTime,
    expires_at: SystemTime,
}

impl TokenEnvelope {
    /// Builds an envelope, rejecting a token whose TTL is too short to
    /// support the 1-minute proactive-refresh skew.
    pub fn try_new(
        value: String,
        issued_at: SystemTime,
        expires_at: SystemTime,
    ) -> Result<Self, Error> {
        let ttl = expires_at
            .duration_since(issued_at)
            .map_err(|_| Error::Config("token expires before or at issuance".into()))?;
        if ttl < Duration::from_secs(60) {
            return Err(Error::Config(
                "token TTL must be at least 60 seconds to support proactive refresh".into(),
            ));
        }
        Ok(Self {
            value,
            issued_at,
            expires_at,
        })
    }

    /// The raw token value, suitable for an `Authorization: Bearer` header.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// How long until the token expires relative to `now`; `None` once it
    /// has already expired.
    pub fn remaining(&self, now: SystemTime) -> Option<Duration> {
        self.expires_at.duration_since(now).ok()
    }
}
