//! Dropping a channel shortly after an append
//! sleeps out the remainder of `minHoldAfterAppend` before issuing the
//! delete.
//!
//! Scaled down from the scenario's literal 2 s/10 s figures to keep the test
//! fast; the proportions (drop called well before the hold window elapses,
//! most of the hold window still pending) are preserved.

mod support;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use snowpipe_streaming::{FlushPolicy, RawValue};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn drop_waits_out_the_remaining_hold_window() {
    let server = MockServer::start().await;
    support::mount_bootstrap(&server).await;

    let open_path = "/v2/streaming/databases/MY_DATABASE/schemas/MY_SCHEMA/pipes/MY_PIPE/channels/my_channel";
    let rows_path =
        "/v2/streaming/data/databases/MY_DATABASE/schemas/MY_SCHEMA/pipes/MY_PIPE/channels/my_channel/rows";

    Mock::given(method("PUT"))
        .and(path(open_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(support::open_channel_body("ctok-1", None)))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(rows_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(support::append_rows_body("ctok-2")))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(open_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "channel_status": null })))
        .mount(&server)
        .await;

    let policy = FlushPolicy {
        min_hold_after_append: Duration::from_millis(600),
        ..FlushPolicy::default()
    };
    let service = support::service_against(&server, support::fast_options());
    let channel = service
        .open_channel(support::test_pipe(), "my_channel", support::test_schema(), policy, Default::default())
        .await
        .expect("open_channel should succeed");

    let mut row = HashMap::new();
    row.insert("ID".to_string(), RawValue::Int(1));
    row.insert("VALUE".to_string(), RawValue::String("a".to_string()));
    channel.insert_row(row).await.expect("insert_row should succeed");
    channel.flush(None).await.expect("flush should succeed");

    // Stand in for the scenario's "call drop 2 s after a 10 s hold window":
    // a short real sleep well short of the hold window, then measure how
    // long drop itself blocks waiting out the remainder.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let before_drop = Instant::now();
    channel.drop_channel().await.expect("drop_channel should succeed");
    let drop_elapsed = before_drop.elapsed();

    assert!(
        drop_elapsed >= Duration::from_millis(350) && drop_elapsed <= Duration::from_millis(900),
        "drop should block for roughly the remaining hold window, took {drop_elapsed:?}"
    );
}
