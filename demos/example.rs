//! Minimal end-to-end walkthrough: open a channel against a pipe, insert a
//! few rows, set an offset token, flush, and poll for the committed offset.
//! Not part of the crate's public surface; gated behind `unstable-example`
//! so it never builds (or ships credentials) as part of a normal `cargo
//! build`.

use std::collections::HashMap;
use std::time::Duration;

use snowpipe_streaming::{
    Account, ClientOptions, ColumnSpec, ColumnType, Credential, FlushPolicy, PipeCoords, RawValue,
    SchemaObjectCoords, SnowpipeStreamingService, TableSchema,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let account = Account::new("MY_ORG", "MY_ACCOUNT");
    let credential = Credential::new("MY_USER").with_private_key_path("/path/to/rsa_key.p8");

    let service = SnowpipeStreamingService::new(account, credential, ClientOptions::default())?;

    let pipe = PipeCoords::new("MY_DATABASE", "MY_SCHEMA", "MY_PIPE");
    let schema = TableSchema::new(
        SchemaObjectCoords::new("MY_DATABASE", "MY_SCHEMA", "MY_TABLE"),
        [
            ColumnSpec::new("ID", ColumnType::Number).with_precision_scale(18, 0),
            ColumnSpec::new("VALUE", ColumnType::Varchar).with_length(256),
        ],
    );

    let channel = service
        .open_channel(
            pipe,
            "my_channel",
            schema,
            FlushPolicy::default(),
            Default::default(),
        )
        .await?;

    for id in 0..10i64 {
        let mut row = HashMap::new();
        row.insert("ID".to_string(), RawValue::Int(id));
        row.insert("VALUE".to_string(), RawValue::String("aaaaaaaaaa".to_string()));
        channel.insert_row(row).await?;
    }

    channel.set_offset_token_for_next_flush("10").await?;
    channel.flush(None).await?;

    let committed = channel
        .fetch_latest_committed_offset(Duration::from_secs(20), Duration::from_millis(250))
        .await;
    println!("latest committed offset: {committed:?}");

    channel.dispose().await;
    Ok(())
}
