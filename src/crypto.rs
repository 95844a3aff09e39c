//! Hashing and address helpers for powchain

use crate::blockchain::Sha256Hash;
use crate::error::ChainError;
use sha2::{Digest, Sha256};

/// Type alias for a coinbase address, which is a 32-byte hash.
/// We use a fixed-size array for internal type safety and performance.
pub type Address = [u8; 32];

/// The all-zero address. Mining refuses to run with it as coinbase.
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// Convenience function to create an address from a string (hashes the string).
/// Useful for testing and debugging.
pub fn address_from_string(s: &str) -> Address {
    sha256(s.as_bytes())
}

/// Convert an address to a hex string for display.
pub fn address_to_hex(addr: &Address) -> String {
    hex::encode(addr)
}

/// Convert a hex string to an address.
pub fn address_from_hex(hex_str: &str) -> Result<Address, ChainError> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(hex_str)
        .map_err(|e| ChainError::ConfigError(format!("Invalid hex address: {}", e)))?;
    if bytes.len() != 32 {
        return Err(ChainError::ConfigError(format!(
            "Address must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    bytes
        .try_into()
        .map_err(|_| ChainError::ConfigError("Failed to convert bytes into address".to_string()))
}

pub fn sha256(data: &[u8]) -> Sha256Hash {
    Sha256::digest(data).into()
}

/// Abbreviated hash for log lines, e.g. `1a2b3c4d…`.
pub fn short_hash(hash: &Sha256Hash) -> String {
    format!("{}…", hex::encode(&hash[..4]))
}
