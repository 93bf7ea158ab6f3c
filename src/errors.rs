use std::fmt;

use reqwest::StatusCode;

/// Body text kept on an HTTP error is truncated to this many characters.
pub(crate) const ERROR_BODY_TRUNCATE: usize = 200;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    Reqwest(reqwest::Error),
    /// A non-2xx response from the service that was not classified as
    /// retryable: status, parsed service error code (if any), parsed
    /// message (if any), raw body (truncated).
    Service {
        status: StatusCode,
        code: Option<String>,
        message: Option<String>,
        body: String,
    },
    /// Host discovery or OAuth exchange returned a non-2xx or unparseable
    /// body.
    Bootstrap { status: StatusCode, body: String },
    /// A row carried a key absent from the table schema.
    SchemaViolation(String),
    /// A value could not be coerced to its column's semantic type, or
    /// violated precision/scale/length.
    ValueViolation(String),
    /// insert/flush/drop attempted while the channel was not in a state
    /// that permits it.
    ChannelState(String),
    /// open()/drop() returned a non-SUCCESS channel_status.code.
    InvariantFailure(String),
    /// Malformed key material.
    Key(String),
    /// JWT signing failed.
    JwtSign(String),
    /// A single append payload exceeded the maximum request size.
    DataTooLarge(usize, usize),
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::Json(e) => write!(f, "json error: {e}"),
            Error::Reqwest(e) => write!(f, "http transport error: {e}"),
            Error::Service {
                status,
                code,
                message,
                body,
            } => write!(
                f,
                "service error: status={status} code={code:?} message={message:?} body='{body}'"
            ),
            Error::Bootstrap { status, body } => {
                write!(f, "bootstrap failed: status={status} body='{body}'")
            }
            Error::SchemaViolation(msg) => write!(f, "schema violation: {msg}"),
            Error::ValueViolation(msg) => write!(f, "value violation: {msg}"),
            Error::ChannelState(msg) => write!(f, "channel state violation: {msg}"),
            Error::InvariantFailure(msg) => write!(f, "invariant failure: {msg}"),
            Error::Key(msg) => write!(f, "key material error: {msg}"),
            Error::JwtSign(msg) => write!(f, "jwt signing error: {msg}"),
            Error::DataTooLarge(size, max) => {
                write!(f, "payload of {size} bytes exceeds max of {max} bytes")
            }
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Reqwest(err)
    }
}

/// Truncates `body` to [`ERROR_BODY_TRUNCATE`] characters, preserving UTF-8
/// boundaries.
pub(crate) fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_TRUNCATE) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}

/// Classifies an HTTP status: 429/425/408/5xx are retryable by the
/// transport's retry loop; any other non-2xx is terminal.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status.as_u16() == 425
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
