//! Shared wiremock scaffolding for the black-box integration tests. Not a
//! test target itself (lives under `tests/support/`, not `tests/*.rs`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use snowpipe_streaming::{
    Account, ClientOptions, ColumnSpec, ColumnType, Credential, PipeCoords, SchemaObjectCoords,
    SnowpipeStreamingService, TableSchema,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers a fixed sequence of responses by call order, repeating the last
/// one for any calls beyond the sequence's length. Used in place of
/// mount-order/priority tricks to deterministically script a mock through a
/// failure-then-recovery sequence.
pub struct Sequence {
    responses: Vec<ResponseTemplate>,
    next: AtomicUsize,
}

impl Sequence {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(!responses.is_empty(), "a response sequence needs at least one entry");
        Self {
            responses,
            next: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        self.responses[idx.min(self.responses.len() - 1)].clone()
    }
}

pub const TEST_KEY_PEM: &str = include_str!("../fixtures/id_rsa.pem");

/// Retries fast and skips gzip so response bodies are easy to assert on
/// directly; individual tests override fields they care about.
pub fn fast_options() -> ClientOptions {
    ClientOptions {
        max_retries: 2,
        retry_backoff_base: Duration::from_millis(5),
        enable_gzip_on_append: false,
        ..ClientOptions::default()
    }
}

/// Builds a service whose account base URI (and therefore its bootstrap
/// calls) point at `server`. `Account::with_base_uri` exists for exactly
/// this: it replaces the derived `snowflakecomputing.com` host with a test
/// double's address.
pub fn service_against(server: &MockServer, options: ClientOptions) -> SnowpipeStreamingService {
    let account = Account::new("MY_ORG", "MY_ACCOUNT").with_base_uri(server.uri());
    let credential = Credential::new("MY_USER").with_private_key_pem(TEST_KEY_PEM);
    SnowpipeStreamingService::new(account, credential, options).expect("service should build with a valid key")
}

/// Mounts the two bootstrap endpoints so `open_channel` can complete:
/// discovery returns the same mock server as the ingest host, and OAuth
/// exchange hands back a long-lived token.
pub async fn mount_bootstrap(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2/streaming/hostname"))
        .respond_with(ResponseTemplate::new(200).set_body_string(server.uri()))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "access_token": "test-access-token", "expires_in": 3600 })),
        )
        .mount(server)
        .await;
}

pub fn open_channel_body(continuation_token: &str, last_committed_offset_token: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "channel_status": {
            "channel_status_code": "SUCCESS",
            "last_committed_offset_token": last_committed_offset_token,
        },
        "next_continuation_token": continuation_token,
    })
}

pub fn append_rows_body(next_continuation_token: &str) -> serde_json::Value {
    serde_json::json!({ "next_continuation_token": next_continuation_token })
}

pub fn test_pipe() -> PipeCoords {
    PipeCoords::new("MY_DATABASE", "MY_SCHEMA", "MY_PIPE")
}

pub fn test_schema() -> TableSchema {
    TableSchema::new(
        SchemaObjectCoords::new("MY_DATABASE", "MY_SCHEMA", "MY_TABLE"),
        [
            ColumnSpec::new("ID", ColumnType::Number).with_precision_scale(18, 0),
            ColumnSpec::new("VALUE", ColumnType::Varchar).with_length(256),
        ],
    )
}
