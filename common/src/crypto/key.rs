use std::str::FromStr;

use ethers::{
    signers::LocalWallet,
    types::Address,
};

use super::CryptoError;

pub const PRIVATE_KEY_SIZE: usize = 32;

// Remove an optional 0x prefix from a hex string
pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Build a local wallet from a hex encoded private key.
///
/// The key may be given with or without the `0x` prefix.
pub fn parse_private_key(key: &str) -> Result<LocalWallet, CryptoError> {
    let bytes =
        hex::decode(strip_hex_prefix(key.trim())).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
    if bytes.len() != PRIVATE_KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            len: bytes.len(),
            expected: PRIVATE_KEY_SIZE,
        });
    }

    LocalWallet::from_bytes(&bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

// Hex encode (without prefix) the private key held by a wallet
pub fn wallet_private_key_hex(wallet: &LocalWallet) -> String {
    hex::encode(wallet.signer().to_bytes())
}

/// Parse an account or contract address, with or without `0x` prefix
pub fn parse_address(value: &str) -> Result<Address, CryptoError> {
    let trimmed = strip_hex_prefix(value.trim());
    if trimmed.len() != 40 {
        return Err(CryptoError::InvalidAddress(value.to_string()));
    }

    Address::from_str(trimmed).map_err(|_| CryptoError::InvalidAddress(value.to_string()))
}
