use ethers::types::H256;
use evmscript_common::crypto::CryptoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Unknown contract {0}")]
    UnknownContract(String),
    #[error("Contract {0} missing address")]
    MissingAddress(String),
    #[error("Unknown method {method} on contract {contract}")]
    UnknownMethod { contract: String, method: String },
    #[error("Missing argument: {param}")]
    MissingArgument { param: String },
    #[error("Failed parsing argument {param}: {reason}")]
    ArgumentParseError { param: String, reason: String },
    #[error("Library address for {0} unknown")]
    UnknownLibraryAddress(String),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Needed gas is too high: {estimated} (limit is {limit})")]
    GasTooHigh { estimated: u64, limit: u64 },
    #[error("Transaction rejected by the node: {reason}")]
    BroadcastRejected { reason: String },
    #[error("Cyclic reference: {0}")]
    CyclicReference(String),
    #[error("{pending} transaction(s) still pending after {secs}s")]
    ConfirmationTimeout { pending: usize, secs: u64 },
    #[error("New block subscription closed while transactions are pending")]
    SubscriptionClosed,
    #[error("Invalid signing key {key}: {source}")]
    InvalidKey {
        key: String,
        #[source]
        source: CryptoError,
    },
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Invalid address {0}")]
    InvalidAddress(String),
    #[error("Transaction {0:?} reverted")]
    Reverted(H256),
    #[error("No contract address in receipt of deploy transaction {0:?}")]
    MissingContractAddress(H256),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Failed compiling {path}: {source}")]
    Compiler {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Failed parsing script: {0}")]
    ScriptParse(#[from] serde_json::Error),
}

impl ScriptError {
    // Short key names keep private keys out of logs
    pub fn invalid_key(key: &str, source: CryptoError) -> Self {
        Self::InvalidKey {
            key: redact_key(key),
            source,
        }
    }
}

pub fn redact_key(key: &str) -> String {
    let key = evmscript_common::crypto::strip_hex_prefix(key);
    if key.chars().count() <= 8 {
        key.to_string()
    } else {
        format!("{}...", key.chars().take(6).collect::<String>())
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;
