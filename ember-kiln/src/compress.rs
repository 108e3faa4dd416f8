//! Gzip framing helpers for uploaded bytecode and snapshot items.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::KilnError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == GZIP_MAGIC
}

pub fn gzip(data: &[u8]) -> Result<Vec<u8>, KilnError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| KilnError::CreateFailed(format!("gzip: {e}")))
}

/// Decompress with a hard output cap so a tiny upload cannot expand into an
/// unbounded allocation.
pub fn gunzip(data: &[u8], max_size: usize) -> Result<Vec<u8>, KilnError> {
    let mut decoder = GzDecoder::new(data).take(max_size as u64 + 1);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| KilnError::CreateFailed(format!("gunzip: {e}")))?;
    if out.len() > max_size {
        return Err(KilnError::CreateFailed(format!(
            "decompressed size exceeds limit of {max_size} bytes"
        )));
    }
    Ok(out)
}
