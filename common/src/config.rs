pub const VERSION: &str = env!("BUILD_VERSION");

// JSON-RPC endpoint used when none is configured
pub const DEFAULT_RPC_ADDRESS: &str = "http://127.0.0.1:8545";

// Gas ceiling applied to every transaction
// A request whose estimate exceeds it is never submitted,
// and it is also the gas limit written into the signed transaction
pub const DEFAULT_GAS_LIMIT: u64 = 4_700_000;

// Functions starting with this prefix are expanded by a `test` step
pub const DEFAULT_TEST_PREFIX: &str = "test";

// Events emitted by test contracts to report assertions
pub const ASSERT_SUCCESS_EVENT: &str = "AssertSuccess";
pub const ASSERT_FAILURE_EVENT: &str = "AssertFailure";
// Name of the event parameter carrying the assertion message
pub const ASSERT_MESSAGE_PARAM: &str = "msg";

// Variables injected once a wallet file has been unlocked
pub const WALLET_ADDRESS_VAR: &str = "__WALLET_ADDRESS__";
pub const WALLET_KEY_VAR: &str = "__WALLET_KEY__";

// Width of a library placeholder inside unlinked bytecode
// It is the width of a hex encoded address so linking keeps offsets
pub const LIBRARY_PLACEHOLDER_WIDTH: usize = 40;

// Block polling interval for the new block subscription, in milliseconds
pub const DEFAULT_BLOCK_POLL_INTERVAL_MS: u64 = 1000;

// Time allowed for a whole step group to be mined, in seconds
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 600;
