//! Snapshot extension for interpreted sources.
//!
//! Each unique source is streamed exactly once, framed as a 4-byte
//! big-endian dialect-name length, the dialect name, then the raw source
//! bytes, gzip-compressed per item. Restore replays items through the code
//! store's `put_source` path and re-pins anything whose metadata says so.

use std::collections::HashSet;

use tracing::warn;

use ember_crypto::hash::checksum_hex;

use crate::compress::{gunzip, gzip, is_gzip};
use crate::context::TxContext;
use crate::error::KilnError;
use crate::keeper::Kiln;

/// Format 1: gzipped `pack_item` payloads, no envelope, no metadata.
pub const SNAPSHOT_FORMAT_SOURCES: u32 = 1;

/// Snapshot items are bounded by the interpreted-source size cap.
const MAX_ITEM_SIZE: usize = ember_types::primitives::MAX_INTERPRETED_SIZE + 64;

/// 4-byte big-endian extension length + extension + file bytes.
fn pack_item(extension: &str, file: &[u8]) -> Vec<u8> {
    let ext = extension.as_bytes();
    let mut out = Vec::with_capacity(4 + ext.len() + file.len());
    out.extend_from_slice(&(ext.len() as u32).to_be_bytes());
    out.extend_from_slice(ext);
    out.extend_from_slice(file);
    out
}

fn unpack_item(item: &[u8]) -> Result<(String, Vec<u8>), KilnError> {
    if item.len() < 4 {
        return Err(KilnError::Invalid("snapshot item too short".to_string()));
    }
    let ext_len = u32::from_be_bytes([item[0], item[1], item[2], item[3]]) as usize;
    if item.len() < 4 + ext_len {
        return Err(KilnError::Invalid("snapshot item truncated".to_string()));
    }
    let extension = String::from_utf8(item[4..4 + ext_len].to_vec())
        .map_err(|_| KilnError::Invalid("snapshot dialect is not utf8".to_string()))?;
    Ok((extension, item[4 + ext_len..].to_vec()))
}

impl Kiln {
    /// Stream every unique interpreted source through `write`, deduplicated
    /// by checksum.
    pub fn snapshot_sources(
        &self,
        ctx: &TxContext,
        write: &mut dyn FnMut(Vec<u8>) -> Result<(), KilnError>,
    ) -> Result<(), KilnError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut items = Vec::new();
        self.iterate_code_infos(ctx, |_, info| {
            // Many code ids may point at the same hash; sync it once.
            let hex_hash = checksum_hex(&info.code_hash);
            if !seen.insert(hex_hash) {
                return false;
            }
            let Some(extension) = info.utf8_dialect().and_then(|d| d.source_extension()) else {
                return false;
            };
            match self.code_store.load_source(&info.code_hash, extension) {
                Ok(file) => items.push(pack_item(extension, &file)),
                Err(err) => {
                    warn!(
                        checksum = %checksum_hex(&info.code_hash),
                        error = %err,
                        "skipping unreadable source during snapshot"
                    );
                }
            }
            false
        })?;
        for item in items {
            write(gzip(&item)?)?;
        }
        Ok(())
    }

    /// Replay snapshot items, then re-pin everything marked pinned.
    pub fn restore_sources(
        &self,
        ctx: &TxContext,
        items: impl IntoIterator<Item = Vec<u8>>,
    ) -> Result<(), KilnError> {
        for compressed in items {
            if !is_gzip(&compressed) {
                return Err(KilnError::Invalid("snapshot item is not gzip".to_string()));
            }
            let raw = gunzip(&compressed, MAX_ITEM_SIZE)?;
            let (extension, file) = unpack_item(&raw)?;
            self.code_store.put_source(&file, &extension)?;
        }
        self.finalize_restore(ctx)
    }

    fn finalize_restore(&self, ctx: &TxContext) -> Result<(), KilnError> {
        let mut to_pin = Vec::new();
        self.iterate_code_infos(ctx, |code_id, info| {
            if info.pinned && !self.code_store.has_pinned_artifact(&info.code_hash) {
                to_pin.push(code_id);
            }
            false
        })?;
        for code_id in to_pin {
            self.pin_code(ctx, code_id)?;
        }
        Ok(())
    }
}
