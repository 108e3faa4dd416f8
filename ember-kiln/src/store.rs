//! Content-addressed code storage on disk.
//!
//! Layout under the node home:
//!   `contracts/{hex}`                      native bytecode
//!   `contracts/pinned/{hex}.aot`           ahead-of-time artifacts
//!   `contracts/sources/{ext}/{ext}_{hex}.{ext}`  interpreted source
//!
//! `put` is idempotent: re-storing identical bytes is a no-op success.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use ember_crypto::hash::{checksum, checksum_hex};
use ember_forge::RuntimeBackend;
use ember_types::contract::CodeInfo;
use ember_types::primitives::Checksum;

use crate::error::KilnError;
use crate::host::HostCtx;

pub const PINNED_FOLDER: &str = "pinned";
pub const SOURCES_FOLDER: &str = "sources";
pub const AOT_EXTENSION: &str = "aot";

/// File-backed content-addressed code store.
#[derive(Clone)]
pub struct CodeStore {
    data_dir: PathBuf,
}

impl CodeStore {
    /// Create the store, making the directory tree as needed.
    pub fn new(home: &Path) -> Result<Self, KilnError> {
        let data_dir = home.join("contracts");
        std::fs::create_dir_all(data_dir.join(PINNED_FOLDER)).map_err(io_err)?;
        std::fs::create_dir_all(data_dir.join(SOURCES_FOLDER)).map_err(io_err)?;
        Ok(Self { data_dir })
    }

    pub fn native_path(&self, checksum: &Checksum) -> PathBuf {
        self.data_dir.join(checksum_hex(checksum))
    }

    pub fn pinned_path(&self, checksum: &Checksum) -> PathBuf {
        self.data_dir
            .join(PINNED_FOLDER)
            .join(format!("{}.{AOT_EXTENSION}", checksum_hex(checksum)))
    }

    pub fn source_path(&self, checksum: &Checksum, extension: &str) -> PathBuf {
        self.data_dir
            .join(SOURCES_FOLDER)
            .join(extension)
            .join(format!("{extension}_{}.{extension}", checksum_hex(checksum)))
    }

    /// Store native bytecode, returning its checksum.
    pub fn put(&self, bytecode: &[u8]) -> Result<Checksum, KilnError> {
        let sum = checksum(bytecode);
        let path = self.native_path(&sum);
        if path.exists() {
            return Ok(sum);
        }
        std::fs::write(&path, bytecode).map_err(io_err)?;
        debug!(path = %path.display(), "stored contract bytecode");
        Ok(sum)
    }

    /// Store interpreted source under its dialect directory.
    pub fn put_source(&self, source: &[u8], extension: &str) -> Result<Checksum, KilnError> {
        let sum = checksum(source);
        let path = self.source_path(&sum, extension);
        if path.exists() {
            return Ok(sum);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&path, source).map_err(io_err)?;
        debug!(path = %path.display(), "stored contract source");
        Ok(sum)
    }

    /// Load the bytes for a piece of code, dispatching on its capability
    /// tags: utf8 dialects live in the sources tree, bytecode dialects live
    /// inside CodeInfo, everything else in the native tree.
    pub fn get(&self, info: &CodeInfo) -> Result<Vec<u8>, KilnError> {
        if let Some(dialect) = info.utf8_dialect() {
            let extension = dialect
                .source_extension()
                .ok_or_else(|| KilnError::Invalid("dialect has no source form".to_string()))?;
            return self.load_source(&info.code_hash, extension);
        }
        if !info.interpreted_bytecode_runtime.is_empty() {
            return Ok(info.interpreted_bytecode_runtime.clone());
        }
        self.load_native(&info.code_hash)
    }

    pub fn load_native(&self, checksum: &Checksum) -> Result<Vec<u8>, KilnError> {
        let path = self.native_path(checksum);
        std::fs::read(&path)
            .map_err(|_| KilnError::NotFound(format!("code {}", checksum_hex(checksum))))
    }

    pub fn load_source(&self, checksum: &Checksum, extension: &str) -> Result<Vec<u8>, KilnError> {
        let path = self.source_path(checksum, extension);
        std::fs::read(&path)
            .map_err(|_| KilnError::NotFound(format!("source {}", checksum_hex(checksum))))
    }

    pub fn has_pinned_artifact(&self, checksum: &Checksum) -> bool {
        self.pinned_path(checksum).exists()
    }

    /// The on-disk path serving this code at call time; empty for bytecode
    /// dialects whose runtime bytecode lives inside CodeInfo.
    pub fn code_file_path(&self, info: &CodeInfo) -> String {
        if info.pinned {
            return self.pinned_path(&info.code_hash).display().to_string();
        }
        if let Some(extension) = info.utf8_dialect().and_then(|d| d.source_extension()) {
            return self
                .source_path(&info.code_hash, extension)
                .display()
                .to_string();
        }
        if !info.interpreted_bytecode_runtime.is_empty() {
            return String::new();
        }
        self.native_path(&info.code_hash).display().to_string()
    }

    /// Ahead-of-time compile into the pinned tree, preferring a copy from an
    /// optional shared compiled-artifact cache.
    ///
    /// Backends without a compiled form fall back to a raw copy; loading a
    /// raw "artifact" is part of their `ModuleCode::Precompiled` contract.
    pub fn pin(
        &self,
        checksum: &Checksum,
        backend: &dyn RuntimeBackend<HostCtx>,
        shared_cache_dir: Option<&Path>,
    ) -> Result<(), KilnError> {
        let pinned = self.pinned_path(checksum);
        if let Some(cache_dir) = shared_cache_dir {
            let cached = cache_dir.join(format!("{}.{AOT_EXTENSION}", checksum_hex(checksum)));
            if cached.exists() {
                std::fs::copy(&cached, &pinned).map_err(io_err)?;
                info!(checksum = %checksum_hex(checksum), "pinned from shared artifact cache");
                return Ok(());
            }
        }
        let bytecode = self.load_native(checksum)?;
        match backend.precompile(&bytecode) {
            Ok(artifact) => {
                std::fs::write(&pinned, artifact).map_err(io_err)?;
            }
            Err(ember_forge::ForgeError::Unsupported { .. }) => {
                std::fs::write(&pinned, &bytecode).map_err(io_err)?;
            }
            Err(err) => return Err(KilnError::PinFailed(err.to_string())),
        }
        info!(checksum = %checksum_hex(checksum), "contract is AOT compiled");
        Ok(())
    }

    /// Unpin leaves the artifact on disk; only the metadata flag changes.
    /// Re-pinning is then free and the artifact stays cheap to keep.
    pub fn unpin(&self, checksum: &Checksum) -> Result<(), KilnError> {
        debug!(checksum = %checksum_hex(checksum), "unpinned; artifact left on disk");
        Ok(())
    }
}

fn io_err(err: std::io::Error) -> KilnError {
    KilnError::CreateFailed(err.to_string())
}
