//! Turns a buffered-row snapshot into the NDJSON append body plus its
//! diagnostic metadata.

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use jiff::Timestamp;
use jiff::tz::TimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::errors::Error;
use crate::normalize::{self, RawValue};
use crate::schema::TableSchema;

/// Diagnostics about one built chunk. Not currently transmitted over the
/// wire by the append call — kept for future use and surfaced to the
/// transport only via [`Chunk::content_md5_header`].
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    pub row_count: usize,
    pub size_bytes: usize,
    pub checksum: String,
    pub offset_token: Option<String>,
}

/// One atomically-built append payload.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_id: String,
    pub data: Vec<u8>,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Optional `Content-MD5` header value, left for the transport to attach
    /// if a future wire revision wants it; unused by the default append path.
    pub fn content_md5_header(&self) -> (&'static str, String) {
        ("Content-MD5", self.metadata.checksum.clone())
    }
}

/// Builds one chunk from a row-buffer snapshot.
pub fn build_chunk(
    channel_name: &str,
    schema: &TableSchema,
    rows: &[HashMap<String, RawValue>],
    offset_token: Option<String>,
) -> Result<Chunk, Error> {
    let mut data = Vec::new();
    for row in rows {
        let normalized = normalize::normalize_row(schema, row)?;
        let mut compact = serde_json::Map::with_capacity(normalized.len());
        for (key, value) in normalized {
            if !value.is_null() {
                compact.insert(key, value);
            }
        }
        serde_json::to_writer(&mut data, &JsonValue::Object(compact))?;
        data.push(b'\n');
    }

    let checksum = STANDARD.encode(md5::compute(&data).0);
    let chunk_id = format!("{channel_name}-{}-{}", chunk_timestamp(), Uuid::new_v4().simple());

    Ok(Chunk {
        chunk_id,
        metadata: ChunkMetadata {
            row_count: rows.len(),
            size_bytes: data.len(),
            checksum,
            offset_token,
        },
        data,
    })
}

/// `yyyyMMddTHHmmssfff` in UTC.
fn chunk_timestamp() -> String {
    let now = Timestamp::now().to_zoned(TimeZone::UTC);
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}{:03}",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.subsec_nanosecond() / 1_000_000
    )
}
