use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

use ember_types::primitives::Checksum;

/// Compute the SHA-256 checksum identifying bytecode in the code store.
pub fn checksum(data: &[u8]) -> Checksum {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the Keccak-256 hash of the given data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Lowercase hex encoding of a checksum, used in code-store file names.
pub fn checksum_hex(checksum: &Checksum) -> String {
    hex::encode(checksum)
}
