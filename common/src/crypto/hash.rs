use sha3::{Digest, Keccak256};

pub const HASH_SIZE: usize = 32; // 32 bytes / 256 bits

// Hash a byte array using the keccak256 algorithm
#[inline(always)]
pub fn keccak256(value: &[u8]) -> [u8; HASH_SIZE] {
    let mut hasher = Keccak256::new();
    hasher.update(value);
    hasher.finalize().into()
}

// Same as keccak256 but hex encoded, used for file names and cache keys
pub fn keccak256_hex(value: &[u8]) -> String {
    hex::encode(keccak256(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input() {
        assert_eq!(
            keccak256_hex(b""),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_keccak_event_signature() {
        // topic of Transfer(address,address,uint256)
        assert_eq!(
            keccak256_hex(b"Transfer(address,address,uint256)"),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }
}
