//! EVM address handling for derived secp256k1 keys.
//!
//! An address is the last 20 bytes of keccak256 over the 64-byte `X || Y`
//! encoding of the public key; the `0x04` prefix never enters the hash.

pub use ethereum_types::Address;
use secp256k1::PublicKey;

use crate::error::{Error, Result};
use crate::keccak256;

/// Derive the EVM address of a secp256k1 public key
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    // Get uncompressed public key (65 bytes: 0x04 + x + y)
    let uncompressed = public_key.serialize_uncompressed();
    address_from_point(&uncompressed[1..])
}

/// Derive the EVM address from the raw 64-byte `X || Y` coordinates
pub fn address_from_point(xy: &[u8]) -> Address {
    let hash = keccak256(xy);
    Address::from_slice(&hash[12..])
}

/// Render an address with EIP-55 mixed-case checksum
pub fn to_checksum(address: &Address) -> String {
    let lower = hex::encode(address.as_bytes());
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        // Nibble i of the hash decides the case of character i
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a `0x`-prefixed (or bare) 40 hex digit address.
///
/// All-lowercase and all-uppercase inputs are accepted as-is; mixed case must
/// carry a valid EIP-55 checksum.
pub fn parse_address(s: &str) -> Result<Address> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    if digits.len() != 40 {
        return Err(Error::InvalidAddress(format!(
            "expected 40 hex digits, got {}",
            digits.len()
        )));
    }

    let bytes = hex::decode(digits).map_err(|e| Error::InvalidAddress(e.to_string()))?;
    let address = Address::from_slice(&bytes);

    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&address)[2..] != *digits {
        return Err(Error::InvalidAddress(format!("bad EIP-55 checksum: {}", s)));
    }

    Ok(address)
}
