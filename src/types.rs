//! Wire DTOs for the ingest client's five endpoints.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ChannelStatus {
    pub database_name: String,
    pub schema_name: String,
    pub pipe_name: String,
    pub channel_name: String,
    #[serde(rename = "channel_status_code")]
    pub status_code: String,
    pub last_committed_offset_token: Option<String>,
    pub created_on_ms: u64,
    pub rows_inserted: Option<i64>,
    pub rows_parsed: Option<i64>,
    #[serde(rename = "rows_errors")]
    pub rows_error_count: Option<i64>,
    pub last_error_offset_upper_bound: Option<String>,
    pub last_error_message: Option<String>,
    pub last_error_timestamp: Option<i64>,
    pub snowflake_avg_processing_latency_ms: Option<i64>,
}

impl ChannelStatus {
    pub fn is_success(&self) -> bool {
        self.status_code == "SUCCESS"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenChannelResponse {
    pub channel_status: ChannelStatus,
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppendRowsResponse {
    pub next_continuation_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkChannelStatusRequest {
    pub database_name: String,
    pub schema_name: String,
    pub pipe_name: String,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkChannelStatusEntry {
    pub channel_name: String,
    pub offset_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BulkChannelStatusResponse {
    pub channels: Vec<BulkChannelStatusEntry>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DeleteChannelResponse {
    pub channel_status: Option<ChannelStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_channel_response() {
        let json = r#"{
          "channel_status": {
            "channel_status_code": "SUCCESS",
            "last_committed_offset_token": "0"
          },
          "next_continuation_token": "ctok-1"
        }"#;
        let resp: OpenChannelResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.next_continuation_token.as_deref(), Some("ctok-1"));
        assert!(resp.channel_status.is_success());
    }

    #[test]
    fn parses_append_rows_response() {
        let json = r#"{ "next_continuation_token": "ctok-2" }"#;
        let resp: AppendRowsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.next_continuation_token, "ctok-2");
    }

    #[test]
    fn parses_bulk_channel_status_response() {
        let json = r#"{ "channels": [{"channel_name": "ch", "offset_token": "7"}] }"#;
        let resp: BulkChannelStatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.channels[0].channel_name, "ch");
        assert_eq!(resp.channels[0].offset_token.as_deref(), Some("7"));
    }

    #[test]
    fn missing_continuation_token_fails_open() {
        let json = r#"{ "channel_status": { "channel_status_code": "SUCCESS" } }"#;
        let resp: OpenChannelResponse = serde_json::from_str(json).unwrap();
        assert!(resp.next_continuation_token.is_none());
    }
}
