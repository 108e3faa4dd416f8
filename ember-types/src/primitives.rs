/// 32-byte SHA-256 content hash of bytecode or interpreted source.
pub type Checksum = [u8; 32];

/// 20-byte account address.
pub type Address = [u8; 20];

/// Monotonically increasing identifier for stored code.
pub type CodeId = u64;

/// Amount of tokens.
pub type Amount = u128;

/// Gas in host-ledger units.
pub type Gas = u64;

/// Unix timestamp in nanoseconds.
pub type Timestamp = u64;

/// Maximum size of an uploaded WebAssembly module (3 MiB).
pub const MAX_WASM_SIZE: usize = 3 * 1024 * 1024;

/// Maximum size of uploaded interpreted bytecode or source (1 MiB).
pub const MAX_INTERPRETED_SIZE: usize = 1024 * 1024;

/// Render an address as a 0x-prefixed lowercase hex string.
pub fn address_display(addr: &Address) -> String {
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for b in addr {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Parse a 0x-prefixed hex string into an address.
pub fn address_from_hex(s: &str) -> Option<Address> {
    let s = s.strip_prefix("0x")?;
    if s.len() != 40 {
        return None;
    }
    let mut addr = [0u8; 20];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        addr[i] = ((hi << 4) | lo) as u8;
    }
    Some(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr: Address = [
            0xde, 0xad, 0xbe, 0xef, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 0xff,
        ];
        let s = address_display(&addr);
        assert!(s.starts_with("0xdeadbeef"));
        assert_eq!(address_from_hex(&s), Some(addr));
    }

    #[test]
    fn test_address_from_hex_rejects_bad_input() {
        assert_eq!(address_from_hex("deadbeef"), None);
        assert_eq!(address_from_hex("0x1234"), None);
        assert_eq!(address_from_hex("0xzz00000000000000000000000000000000000000"), None);
    }
}
