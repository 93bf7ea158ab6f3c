//! Open a channel, insert ten rows, set an offset
//! token, flush, and read the committed offset back.

mod support;

use std::collections::HashMap;
use std::time::Duration;

use snowpipe_streaming::RawValue;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn open_insert_flush_read_offset() {
    let server = MockServer::start().await;
    support::mount_bootstrap(&server).await;

    Mock::given(method("PUT"))
        .and(path(
            "/v2/streaming/databases/MY_DATABASE/schemas/MY_SCHEMA/pipes/MY_PIPE/channels/my_channel",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(support::open_channel_body("ctok-1", None)))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(
            "/v2/streaming/data/databases/MY_DATABASE/schemas/MY_SCHEMA/pipes/MY_PIPE/channels/my_channel/rows",
        ))
        .and(query_param("offsetToken", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(support::append_rows_body("ctok-2")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(
            "/v2/streaming/databases/MY_DATABASE/schemas/MY_SCHEMA/pipes/MY_PIPE/channels/my_channel",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "channel_status_code": "SUCCESS",
            "last_committed_offset_token": "10",
        })))
        .mount(&server)
        .await;

    let service = support::service_against(&server, support::fast_options());
    let channel = service
        .open_channel(
            support::test_pipe(),
            "my_channel",
            support::test_schema(),
            Default::default(),
            Default::default(),
        )
        .await
        .expect("open_channel should succeed");

    for id in 1..=10i64 {
        let mut row = HashMap::new();
        row.insert("ID".to_string(), RawValue::Int(id));
        row.insert("VALUE".to_string(), RawValue::String("aaaaaaaaaa".to_string()));
        channel.insert_row(row).await.expect("insert_row should succeed");
    }

    channel
        .set_offset_token_for_next_flush("10")
        .await
        .expect("offset token should be accepted");
    channel.flush(None).await.expect("flush should succeed");

    let committed = channel
        .fetch_latest_committed_offset(Duration::from_secs(5), Duration::from_millis(50))
        .await;
    assert_eq!(committed.as_deref(), Some("10"));

    channel.dispose().await;
}
