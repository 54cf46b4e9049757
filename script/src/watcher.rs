//! Broadcast and confirmation
//!
//! Transactions of a group are submitted together, then tracked by hash
//! in a pending set. Every new block triggers a receipt query for each
//! pending transaction. Receipts can arrive in any order: a transaction
//! leaves the set as soon as its own receipt is seen, and the group is
//! complete once the set is empty.

use std::time::Duration;

use ethers::types::{Bytes, TransactionReceipt, H256};
use futures::future::join_all;
use indexmap::IndexMap;
use log::{debug, trace, warn};
use tokio::time::{timeout_at, Instant};

use evmscript_common::utils::format_hash;

use crate::{
    error::{ScriptError, ScriptResult},
    transport::Transport,
};

/// Transactions waiting for a receipt, with what to do once mined
pub type PendingSet<T> = IndexMap<H256, T>;

/// Called once per mined transaction of the pending set
pub trait ReceiptHandler<T> {
    fn on_mined(&mut self, entry: T, receipt: TransactionReceipt) -> ScriptResult<()>;
}

/// Outcome of submitting the transactions of a group
pub struct Broadcast<T> {
    pub pending: PendingSet<T>,
    // Accepted hashes, in submission order
    pub hashes: Vec<H256>,
    // Reasons given by the node for every rejected transaction
    pub rejected: Vec<String>,
}

impl<T> Broadcast<T> {
    pub fn rejection(&self) -> Option<ScriptError> {
        if self.rejected.is_empty() {
            None
        } else {
            Some(ScriptError::BroadcastRejected {
                reason: self.rejected.join("; "),
            })
        }
    }
}

/// Submit every signed transaction concurrently
pub async fn broadcast<T>(transport: &dyn Transport, transactions: Vec<(Bytes, T)>) -> Broadcast<T> {
    let (raws, entries): (Vec<_>, Vec<_>) = transactions.into_iter().unzip();
    let results = join_all(raws.into_iter().map(|raw| transport.send_raw_transaction(raw))).await;

    let mut outcome = Broadcast {
        pending: PendingSet::new(),
        hashes: Vec::new(),
        rejected: Vec::new(),
    };
    for (result, entry) in results.into_iter().zip(entries) {
        match result {
            Ok(hash) => {
                debug!("Transaction {} submitted", format_hash(&hash));
                outcome.hashes.push(hash);
                outcome.pending.insert(hash, entry);
            }
            Err(e) => {
                warn!("Transaction rejected: {:#}", e);
                outcome.rejected.push(format!("{:#}", e));
            }
        }
    }
    outcome
}

// Query the receipt of every pending transaction and complete the mined ones
async fn sweep<T, H>(
    transport: &dyn Transport,
    pending: &mut PendingSet<T>,
    handler: &mut H,
    first_error: &mut Option<ScriptError>,
) where
    H: ReceiptHandler<T>,
{
    let hashes: Vec<H256> = pending.keys().copied().collect();
    let receipts = join_all(hashes.iter().map(|hash| transport.get_receipt(*hash))).await;

    for (hash, receipt) in hashes.into_iter().zip(receipts) {
        match receipt {
            Ok(Some(receipt)) => {
                let Some(entry) = pending.shift_remove(&hash) else {
                    continue;
                };
                debug!(
                    "Transaction {} mined in block {:?}",
                    format_hash(&hash),
                    receipt.block_number
                );
                if let Err(e) = handler.on_mined(entry, receipt) {
                    warn!("Failed completing transaction {}: {}", format_hash(&hash), e);
                    first_error.get_or_insert(e);
                }
            }
            Ok(None) => trace!("Transaction {} still pending", format_hash(&hash)),
            // kept pending, queried again on the next block
            Err(e) => warn!("Failed fetching receipt of {}: {:#}", format_hash(&hash), e),
        }
    }
}

/// Wait until every pending transaction has a receipt.
///
/// A handler failure does not stop the wait: the remaining transactions
/// are still confirmed and the first failure is returned at the end.
pub async fn watch<T, H>(
    transport: &dyn Transport,
    mut pending: PendingSet<T>,
    handler: &mut H,
    limit: Duration,
) -> ScriptResult<()>
where
    H: ReceiptHandler<T>,
{
    if pending.is_empty() {
        return Ok(());
    }

    let deadline = Instant::now() + limit;
    let mut subscription = transport.subscribe_new_blocks().await?;
    let mut first_error = None;

    // Transactions may already be mined when the subscription starts
    sweep(transport, &mut pending, handler, &mut first_error).await;

    while !pending.is_empty() {
        match timeout_at(deadline, subscription.next()).await {
            Ok(Some(block)) => {
                trace!("New block {}", format_hash(&block));
                sweep(transport, &mut pending, handler, &mut first_error).await;
            }
            Ok(None) => return Err(ScriptError::SubscriptionClosed),
            Err(_) => {
                return Err(ScriptError::ConfirmationTimeout {
                    pending: pending.len(),
                    secs: limit.as_secs(),
                })
            }
        }
    }

    subscription.unsubscribe();
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
