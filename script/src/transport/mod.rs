mod rpc;

pub use rpc::{RpcTransport, RpcTransportConfig};

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, TransactionRequest, H256, U256};
use log::debug;
use tokio::sync::mpsc;

/// Network operations needed to run a script.
///
/// Implemented over JSON-RPC by `RpcTransport`, and by in-memory
/// chains in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_chain_id(&self) -> Result<u64>;

    /// Number of transactions sent by the account, the next nonce to use
    async fn get_transaction_count(&self, address: Address) -> Result<U256>;

    async fn get_gas_price(&self) -> Result<U256>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<U256>;

    /// Submit a signed transaction, returning its hash
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;

    /// Start receiving the hash of every new block
    async fn subscribe_new_blocks(&self) -> Result<BlockSubscription>;

    /// Receipt of a mined transaction, `None` while it is still pending
    async fn get_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>>;
}

/// Stream of new block hashes.
///
/// Dropping it closes the channel, which stops the producer.
pub struct BlockSubscription {
    receiver: mpsc::Receiver<H256>,
}

impl BlockSubscription {
    pub fn new(receiver: mpsc::Receiver<H256>) -> Self {
        Self { receiver }
    }

    /// Create a subscription along with the sender feeding it
    pub fn channel(capacity: usize) -> (mpsc::Sender<H256>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self::new(receiver))
    }

    // Next block hash, `None` once the producer is gone
    pub async fn next(&mut self) -> Option<H256> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(mut self) {
        debug!("Unsubscribing from new blocks");
        self.receiver.close();
    }
}
