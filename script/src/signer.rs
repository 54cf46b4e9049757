//! Nonce sequencing and signing
//!
//! All transactions of a step group are grouped by sending account, so
//! different spellings of a key share their nonces. The
//! transaction count of each account is fetched once per group and
//! nonces are assigned from it in step order, so transactions of the
//! same account are gap free and ordered while different accounts are
//! independent.

use ethers::{
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, U256},
};
use indexmap::IndexMap;
use log::{debug, info};

use evmscript_common::crypto::parse_private_key;

use crate::{
    compiler::{Completion, TxPlan},
    error::{ScriptError, ScriptResult},
    transport::Transport,
};

/// Turns a private key and transaction fields into signed bytes
pub trait TransactionSigner: Send + Sync {
    /// Address controlled by the key
    fn address(&self, key: &str) -> ScriptResult<Address>;

    fn sign(&self, key: &str, tx: &TransactionRequest) -> ScriptResult<Bytes>;
}

/// Signs legacy transactions with local private keys
pub struct LocalSigner {
    chain_id: u64,
}

impl LocalSigner {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn wallet(&self, key: &str) -> ScriptResult<LocalWallet> {
        parse_private_key(key)
            .map(|wallet| wallet.with_chain_id(self.chain_id))
            .map_err(|e| ScriptError::invalid_key(key, e))
    }
}

impl TransactionSigner for LocalSigner {
    fn address(&self, key: &str) -> ScriptResult<Address> {
        self.wallet(key).map(|wallet| wallet.address())
    }

    fn sign(&self, key: &str, tx: &TransactionRequest) -> ScriptResult<Bytes> {
        let wallet = self.wallet(key)?;
        let tx: TypedTransaction = tx.clone().chain_id(self.chain_id).into();
        let signature = wallet
            .sign_transaction_sync(&tx)
            .map_err(|e| ScriptError::Signing(e.to_string()))?;
        Ok(tx.rlp_signed(&signature))
    }
}

/// Fully resolved transaction, ready to sign
#[derive(Debug, Clone)]
pub struct TxRequest {
    pub key: String,
    pub nonce: U256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

impl TxRequest {
    pub fn to_transaction(&self) -> TransactionRequest {
        let mut tx = TransactionRequest::new()
            .from(self.from)
            .nonce(self.nonce)
            .value(self.value)
            .data(self.data.clone());
        if let Some(to) = self.to {
            tx = tx.to(to);
        }
        tx
    }
}

#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub request: TxRequest,
    pub completion: Completion,
    pub raw: Bytes,
}

/// Group plans by the account of their key, accounts in order of first appearance
pub fn group_by_account(
    signer: &dyn TransactionSigner,
    plans: Vec<TxPlan>,
) -> ScriptResult<IndexMap<Address, Vec<TxPlan>>> {
    let mut groups: IndexMap<Address, Vec<TxPlan>> = IndexMap::new();
    for plan in plans {
        let from = signer.address(&plan.key)?;
        groups.entry(from).or_default().push(plan);
    }
    Ok(groups)
}

/// Assign consecutive nonces starting at `count` to the plans of one account
pub fn assign_nonces(count: U256, plans: Vec<TxPlan>) -> Vec<(U256, TxPlan)> {
    plans
        .into_iter()
        .enumerate()
        .map(|(i, plan)| (count + U256::from(i), plan))
        .collect()
}

/// Gas policy applied to every transaction of a run
#[derive(Debug, Clone, Copy)]
pub struct GasPolicy {
    // A transaction needing more is rejected, and it is the gas limit
    // of every signed transaction
    pub limit: u64,
}

/// Sequence, estimate and sign every plan of a step group.
///
/// Nothing is submitted here: any failure aborts the group before
/// a single transaction reaches the network.
pub async fn sign_group(
    transport: &dyn Transport,
    signer: &dyn TransactionSigner,
    plans: Vec<TxPlan>,
    policy: GasPolicy,
) -> ScriptResult<Vec<SignedTransaction>> {
    if plans.is_empty() {
        return Ok(Vec::new());
    }

    let gas_price = transport.get_gas_price().await?;
    debug!("Gas price: {}", gas_price);

    let mut signed = Vec::with_capacity(plans.len());
    for (from, plans) in group_by_account(signer, plans)? {
        let count = transport.get_transaction_count(from).await?;
        debug!(
            "Account {:?} has {} transaction(s), signing {} more",
            from,
            count,
            plans.len()
        );

        for (nonce, plan) in assign_nonces(count, plans) {
            let request = TxRequest {
                key: plan.key.clone(),
                nonce,
                from,
                to: plan.to,
                value: plan.value,
                data: plan.data,
            };

            let tx = request.to_transaction();
            let estimated = transport.estimate_gas(&tx).await?;
            debug!("Estimated gas for nonce {} of {:?}: {}", nonce, from, estimated);
            if estimated > U256::from(policy.limit) {
                return Err(ScriptError::GasTooHigh {
                    estimated: if estimated > U256::from(u64::MAX) {
                        u64::MAX
                    } else {
                        estimated.as_u64()
                    },
                    limit: policy.limit,
                });
            }

            let tx = tx.gas(policy.limit).gas_price(gas_price);
            let raw = signer.sign(&request.key, &tx)?;
            signed.push(SignedTransaction {
                request,
                completion: plan.completion,
                raw,
            });
        }
    }

    info!("Signed {} transaction(s)", signed.len());
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn plan(key: &str) -> TxPlan {
        TxPlan {
            key: key.to_string(),
            to: None,
            value: U256::zero(),
            data: Bytes::from(vec![0x60, 0x00]),
            completion: Completion::Deploy {
                contract: "Foo".into(),
                alias: None,
            },
        }
    }

    #[test]
    fn test_local_signer_address() {
        let signer = LocalSigner::new(1337);
        let address = signer.address(DEV_KEY).unwrap();
        assert_eq!(
            format!("{:?}", address),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert!(matches!(signer.address("bad"), Err(ScriptError::InvalidKey { .. })));
    }

    #[test]
    fn test_signed_transaction_recovers_sender() {
        let signer = LocalSigner::new(1337);
        let from = signer.address(DEV_KEY).unwrap();
        let tx = TransactionRequest::new()
            .from(from)
            .to(Address::from_low_u64_be(0xaa))
            .nonce(7u64)
            .value(1u64)
            .gas(21_000u64)
            .gas_price(1u64);

        let raw = signer.sign(DEV_KEY, &tx).unwrap();

        let typed: TypedTransaction = tx.chain_id(1337u64).into();
        let wallet = parse_private_key(DEV_KEY).unwrap().with_chain_id(1337u64);
        let signature = wallet.sign_transaction_sync(&typed).unwrap();
        assert_eq!(raw, typed.rlp_signed(&signature));
        // EIP-155 replay protection
        assert!(signature.v == 1337 * 2 + 35 || signature.v == 1337 * 2 + 36);
        assert_eq!(signature.recover(typed.sighash()).unwrap(), from);
    }

    // Valid private key for any small index
    fn key(index: u8) -> String {
        format!("{:064x}", index as u64 + 1)
    }

    #[test]
    fn test_group_by_account_preserves_order() {
        let signer = LocalSigner::new(1337);
        let plans = vec![plan(&key(1)), plan(&key(0)), plan(&key(1)), plan(&key(2))];
        let groups = group_by_account(&signer, plans).unwrap();
        let accounts: Vec<_> = groups.keys().copied().collect();
        let expected: Vec<_> = [1, 0, 2].iter().map(|i| signer.address(&key(*i)).unwrap()).collect();
        assert_eq!(accounts, expected);
        assert_eq!(groups[&expected[0]].len(), 2);
    }

    #[test]
    fn test_key_spellings_share_account() {
        let signer = LocalSigner::new(1337);
        let prefixed = format!("0x{DEV_KEY}");
        let plans = vec![plan(DEV_KEY), plan(&prefixed), plan(DEV_KEY)];
        let groups = group_by_account(&signer, plans).unwrap();
        assert_eq!(groups.len(), 1);

        let assigned = assign_nonces(U256::from(5u64), groups.into_values().next().unwrap());
        let nonces: Vec<_> = assigned.iter().map(|(nonce, _)| nonce.as_u64()).collect();
        assert_eq!(nonces, vec![5, 6, 7]);
        // each plan keeps its own key for signing
        assert_eq!(assigned[1].1.key, prefixed);
    }

    #[test]
    fn test_group_by_account_rejects_invalid_key() {
        let signer = LocalSigner::new(1337);
        let err = group_by_account(&signer, vec![plan(DEV_KEY), plan("bad")]).unwrap_err();
        assert!(matches!(err, ScriptError::InvalidKey { .. }));
    }

    proptest! {
        #[test]
        fn prop_nonces_are_gap_free(count in 0u64..1_000_000, keys in prop::collection::vec(0u8..4, 1..30)) {
            let signer = LocalSigner::new(1337);
            let plans: Vec<_> = keys.iter().map(|k| plan(&key(*k))).collect();
            for (_, plans) in group_by_account(&signer, plans).unwrap() {
                let assigned = assign_nonces(U256::from(count), plans);
                for (i, (nonce, _)) in assigned.iter().enumerate() {
                    prop_assert_eq!(*nonce, U256::from(count + i as u64));
                }
            }
        }
    }
}
