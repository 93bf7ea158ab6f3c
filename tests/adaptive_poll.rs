//! When the service reports a nonzero
//! `snowflake_avg_processing_latency_ms` and no committed offset yet, the
//! poller backs off to roughly `avg/4` between calls instead of hammering at
//! the base poll interval, bounding the number of requests issued over the
//! budget.
//!
//! Scaled down from the scenario's literal 8 s/20 s figures to keep the test
//! fast; the 4:1 ratio between the reported latency and the poll interval is
//! preserved.

mod support;

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn poll_interval_adapts_to_reported_latency() {
    let server = MockServer::start().await;
    support::mount_bootstrap(&server).await;

    let open_path = "/v2/streaming/databases/MY_DATABASE/schemas/MY_SCHEMA/pipes/MY_PIPE/channels/my_channel";
    let status_path = open_path;

    Mock::given(method("PUT"))
        .and(path(open_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(support::open_channel_body("ctok-1", None)))
        .mount(&server)
        .await;

    // avg/4 = 500 ms, well above the 100 ms base poll interval used below.
    Mock::given(method("GET"))
        .and(path(status_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "channel_status_code": "SUCCESS",
            "last_committed_offset_token": null,
            "snowflake_avg_processing_latency_ms": 2000,
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

    let budget = Duration::from_secs(2);
    let committed = channel.fetch_latest_committed_offset(budget, Duration::from_millis(100)).await;
    assert!(committed.is_none(), "no committed offset was ever reported");

    let requests = server.received_requests().await.expect("wiremock logs requests");
    let status_calls = requests
        .iter()
        .filter(|r| r.method.as_str() == "GET" && r.url.path() == status_path)
        .count();

    // At ~500 ms/poll over a 2 s budget, expect on the order of 4 polls;
    // allow generous slack for scheduler jitter without allowing the poller
    // to degenerate into the 100 ms base interval (which would yield ~20).
    assert!(
        (1..=8).contains(&status_calls),
        "expected a handful of adaptively-spaced polls, got {status_calls}"
    );

    channel.dispose().await;
}
