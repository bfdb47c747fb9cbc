//! Ethereum address codec
//!
//! address = last 20 bytes of Keccak-256 over the 64 coordinate bytes of the
//! uncompressed public key, rendered with the EIP-55 mixed-case checksum.

use ethers_core::types::Address;
use ethers_core::utils::to_checksum;
use sha3::{Digest, Keccak256};

use crate::crypto::kdf::ChildPublicKey;
use crate::error::{Error, Result};

/// Raw 20-byte address of a derived child key.
pub fn address_bytes(child: &ChildPublicKey) -> [u8; 20] {
    let hash = Keccak256::digest(child.coordinates());
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    out
}

/// EIP-55 checksummed address string of a derived child key.
pub fn encode(child: &ChildPublicKey) -> String {
    to_checksum(&Address::from_slice(&address_bytes(child)), None)
}

/// Validate a caller-supplied recipient address.
///
/// Accepts all-lowercase, all-uppercase, or correctly EIP-55 checksummed
/// mixed-case hex; anything else fails with `InvalidAddressFormat`.
pub fn parse(text: &str) -> Result<Address> {
    let invalid = |reason: String| Error::InvalidAddressFormat {
        chain: "ethereum",
        address: text.to_string(),
        reason,
    };

    let hex_part = text
        .strip_prefix("0x")
        .ok_or_else(|| invalid("missing 0x prefix".to_string()))?;

    if hex_part.len() != 40 {
        return Err(invalid(format!("expected 40 hex chars, got {}", hex_part.len())));
    }

    let address: Address = text
        .parse()
        .map_err(|e| invalid(format!("not valid hex: {e}")))?;

    // Mixed case carries an EIP-55 checksum that must verify exactly
    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&address, None) != text {
        return Err(invalid("EIP-55 checksum mismatch".to_string()));
    }

    Ok(address)
}
