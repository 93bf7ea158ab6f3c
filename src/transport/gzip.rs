use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::config::GzipLevel;
use crate::errors::Error;

/// gzip-compresses `data` at the given level.
pub(crate) fn compress(data: &[u8], level: GzipLevel) -> Result<Vec<u8>, Error> {
    compress_with(data, level.to_flate2())
}

fn compress_with(data: &[u8], compression: Compression) -> Result<Vec<u8>, Error> {
    let mut encoder = GzEncoder::new(Vec::new(), compression);
    encoder.write_all(data)?;
    encoder.finish().map_err(Error::from)
}

/// True when a 400/415 response body names gzip/Content-Encoding, meaning
/// the append should be retried once uncompressed.
pub(crate) fn response_rejects_gzip(status: reqwest::StatusCode, body: &str) -> bool {
    (status.as_u16() == 400 || status.as_u16() == 415)
        && (body.to_lowercase().contains("content-encoding") || body.to_lowercase().contains("gzip"))
}
