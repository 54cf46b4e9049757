use ethers::types::{Address, H256, U256};

use crate::crypto::strip_hex_prefix;

// Lowercase 0x prefixed hex of an address, the way scripts write them
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

pub fn format_hash(hash: &H256) -> String {
    format!("0x{}", hex::encode(hash.as_bytes()))
}

/// Parse an unsigned amount written either as a decimal number
/// or as a `0x` prefixed hex number.
pub fn parse_u256(value: &str) -> Option<U256> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.starts_with("0x") || value.starts_with("0X") {
        let digits = strip_hex_prefix(value);
        if digits.is_empty() {
            return None;
        }
        U256::from_str_radix(digits, 16).ok()
    } else {
        U256::from_dec_str(value).ok()
    }
}

// Shorten a long hex payload for log lines
pub fn truncate_hex(value: &str, max: usize) -> String {
    if value.len() <= max {
        value.to_string()
    } else {
        format!("{}...({} chars)", &value[..max], value.len())
    }
}
