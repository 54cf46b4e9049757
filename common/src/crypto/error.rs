use thiserror::Error;

/// Errors that can occur while handling keys and addresses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid hexadecimal string format
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    /// Private key has invalid length
    #[error("Invalid private key length: {len} bytes, expected: {expected} bytes")]
    InvalidKeyLength { len: usize, expected: usize },

    /// Bytes are not a valid secp256k1 scalar
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// Address string is malformed or invalid
    #[error("Invalid address format: {0}")]
    InvalidAddress(String),
}
