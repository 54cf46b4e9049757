use thiserror::Error;

use super::JsonRpcErrorObject;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error {code}: {reason}")]
    Http { code: u16, reason: String },
    #[error("Failed to parse JSON response: {0}")]
    InvalidResponse(String),
    #[error("RPC error {}: {}", _0.code, _0.message)]
    Remote(JsonRpcErrorObject),
    #[error("Unexpected result for {method}: {reason}")]
    UnexpectedResult { method: String, reason: String },
}

impl RpcError {
    // Errors worth retrying: the request may not have reached the node
    // A remote error is an answer from the node and is never retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) | Self::Network(_) => true,
            Self::Http { code, .. } => *code >= 500,
            Self::InvalidResponse(_) | Self::Remote(_) | Self::UnexpectedResult { .. } => false,
        }
    }

    // Same for a transaction submission, which is only sent again when
    // the node was never reached: a submission that timed out may be
    // pending already and would be rejected as known
    pub fn is_retryable_submission(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(RpcError::Connection("refused".into()).is_retryable());
        assert!(RpcError::Http {
            code: 503,
            reason: "Service Unavailable".into()
        }
        .is_retryable());
        assert!(!RpcError::Http {
            code: 400,
            reason: "Bad Request".into()
        }
        .is_retryable());
        assert!(!RpcError::Remote(JsonRpcErrorObject {
            code: -32000,
            message: "replacement transaction underpriced".into(),
            data: None
        })
        .is_retryable());
    }

    #[test]
    fn test_retryable_submissions() {
        assert!(RpcError::Connection("refused".into()).is_retryable_submission());
        assert!(!RpcError::Timeout(std::time::Duration::from_secs(30)).is_retryable_submission());
        assert!(!RpcError::Network("reset".into()).is_retryable_submission());
        assert!(!RpcError::Http {
            code: 502,
            reason: "Bad Gateway".into()
        }
        .is_retryable_submission());
    }

    #[test]
    fn test_remote_error_display() {
        let err = RpcError::Remote(JsonRpcErrorObject {
            code: -32000,
            message: "nonce too low".into(),
            data: None,
        });
        assert_eq!(err.to_string(), "RPC error -32000: nonce too low");
    }
}
