#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::{
    abi::Token,
    types::{Address, Bytes, Log, TransactionReceipt, TransactionRequest, H256, U256},
    utils::get_contract_address,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use evmscript::{
    BlockSubscription, ContractArtifact, ContractRegistry, ScriptError, ScriptResult,
    TransactionSigner, Transport,
};
use evmscript_common::crypto::keccak256;

/// Fields carried by a mock signed transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockTx {
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: U256,
    pub value: U256,
    pub gas: Option<U256>,
    pub gas_price: Option<U256>,
    pub data: Bytes,
}

impl MockTx {
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.data.get(..4).map(|s| [s[0], s[1], s[2], s[3]])
    }
}

/// Signs by serializing the transaction, the address of a key is
/// derived from its hash so any string is a valid key.
/// Like real keys the `0x` prefix is optional.
pub struct MockSigner;

impl MockSigner {
    pub fn address_of(key: &str) -> Address {
        let key = key.strip_prefix("0x").unwrap_or(key);
        Address::from_slice(&keccak256(key.as_bytes())[12..])
    }
}

impl TransactionSigner for MockSigner {
    fn address(&self, key: &str) -> ScriptResult<Address> {
        Ok(Self::address_of(key))
    }

    fn sign(&self, key: &str, tx: &TransactionRequest) -> ScriptResult<Bytes> {
        let mock = MockTx {
            from: Self::address_of(key),
            to: tx.to.as_ref().and_then(|to| to.as_address()).copied(),
            nonce: tx.nonce.unwrap_or_default(),
            value: tx.value.unwrap_or_default(),
            gas: tx.gas,
            gas_price: tx.gas_price,
            data: tx.data.clone().unwrap_or_default(),
        };
        serde_json::to_vec(&mock)
            .map(Bytes::from)
            .map_err(|e| ScriptError::Signing(e.to_string()))
    }
}

struct ScriptedLog {
    topics: Vec<H256>,
    data: Vec<u8>,
}

#[derive(Default)]
struct ChainState {
    counts: HashMap<Address, U256>,
    mempool: Vec<(H256, MockTx)>,
    receipts: HashMap<H256, TransactionReceipt>,
    submitted: Vec<MockTx>,
    blocks: Option<mpsc::Sender<H256>>,
    block_number: u64,
    events: HashMap<[u8; 4], Vec<ScriptedLog>>,
    reverts: HashSet<[u8; 4]>,
}

/// In-memory chain mining every pending transaction on each block
pub struct MockChain {
    state: Mutex<ChainState>,
    gas_estimate: Mutex<U256>,
}

impl MockChain {
    /// Create the chain and start producing a block every few milliseconds
    pub fn start() -> Arc<Self> {
        let chain = Arc::new(Self {
            state: Mutex::new(ChainState::default()),
            gas_estimate: Mutex::new(U256::from(21_000u64)),
        });

        let miner = chain.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let (block, sender) = miner.mine();
                let Some(sender) = sender else { continue };
                if sender.send(block).await.is_err() {
                    let mut state = miner.state.lock().unwrap();
                    if state.blocks.as_ref().is_some_and(|s| s.same_channel(&sender)) {
                        state.blocks = None;
                    }
                }
            }
        });
        chain
    }

    pub fn set_transaction_count(&self, address: Address, count: u64) {
        self.state.lock().unwrap().counts.insert(address, U256::from(count));
    }

    pub fn set_gas_estimate(&self, gas: u64) {
        *self.gas_estimate.lock().unwrap() = U256::from(gas);
    }

    /// Emit an event from the called contract whenever `selector` is called
    pub fn emit_on(&self, selector: [u8; 4], topics: Vec<H256>, data: Vec<Token>) {
        self.state
            .lock()
            .unwrap()
            .events
            .entry(selector)
            .or_default()
            .push(ScriptedLog {
                topics,
                data: ethers::abi::encode(&data),
            });
    }

    pub fn revert_on(&self, selector: [u8; 4]) {
        self.state.lock().unwrap().reverts.insert(selector);
    }

    pub fn submitted(&self) -> Vec<MockTx> {
        self.state.lock().unwrap().submitted.clone()
    }

    fn mine(&self) -> (H256, Option<mpsc::Sender<H256>>) {
        let mut state = self.state.lock().unwrap();
        state.block_number += 1;
        let block_number = state.block_number;
        let block = H256::from_low_u64_be(block_number);

        let pending = std::mem::take(&mut state.mempool);
        for (hash, tx) in pending {
            let selector = tx.selector();
            let reverted = tx.to.is_some() && selector.is_some_and(|s| state.reverts.contains(&s));

            let logs = match (tx.to, selector) {
                (Some(to), Some(selector)) if !reverted => state
                    .events
                    .get(&selector)
                    .map(|logs| {
                        logs.iter()
                            .map(|log| Log {
                                address: to,
                                topics: log.topics.clone(),
                                data: Bytes::from(log.data.clone()),
                                ..Default::default()
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                _ => Vec::new(),
            };

            let receipt = TransactionReceipt {
                transaction_hash: hash,
                block_hash: Some(block),
                block_number: Some(block_number.into()),
                from: tx.from,
                to: tx.to,
                contract_address: tx
                    .to
                    .is_none()
                    .then(|| get_contract_address(tx.from, tx.nonce)),
                status: Some(if reverted { 0u64 } else { 1u64 }.into()),
                logs,
                ..Default::default()
            };
            *state.counts.entry(tx.from).or_default() += U256::one();
            state.receipts.insert(hash, receipt);
        }

        (block, state.blocks.clone())
    }

    fn next_nonce(state: &ChainState, address: Address) -> U256 {
        let pending = state.mempool.iter().filter(|(_, tx)| tx.from == address).count();
        state.counts.get(&address).copied().unwrap_or_default() + U256::from(pending)
    }
}

#[async_trait]
impl Transport for MockChain {
    async fn get_chain_id(&self) -> Result<u64> {
        Ok(1337)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<U256> {
        let state = self.state.lock().unwrap();
        Ok(state.counts.get(&address).copied().unwrap_or_default())
    }

    async fn get_gas_price(&self) -> Result<U256> {
        Ok(U256::from(1_000_000_000u64))
    }

    async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<U256> {
        Ok(*self.gas_estimate.lock().unwrap())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let tx: MockTx = serde_json::from_slice(&raw)?;
        let mut state = self.state.lock().unwrap();
        let expected = Self::next_nonce(&state, tx.from);
        if tx.nonce != expected {
            return Err(anyhow!("invalid nonce {}, expected {}", tx.nonce, expected));
        }

        let hash = H256::from(keccak256(&raw));
        state.submitted.push(tx.clone());
        state.mempool.push((hash, tx));
        Ok(hash)
    }

    async fn subscribe_new_blocks(&self) -> Result<BlockSubscription> {
        let (sender, subscription) = BlockSubscription::channel(16);
        self.state.lock().unwrap().blocks = Some(sender);
        Ok(subscription)
    }

    async fn get_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        Ok(self.state.lock().unwrap().receipts.get(&hash).cloned())
    }
}

pub fn artifact(name: &str, bytecode: &str, abi: Value) -> ContractArtifact {
    ContractArtifact::new(name.to_string(), bytecode.to_string(), abi).unwrap()
}

fn assert_event(name: &str) -> Value {
    json!({
        "type": "event",
        "name": name,
        "inputs": [{"name": "msg", "type": "string", "indexed": false}],
        "anonymous": false
    })
}

fn function(name: &str, inputs: Value) -> Value {
    json!({
        "type": "function",
        "name": name,
        "inputs": inputs,
        "outputs": [],
        "stateMutability": "nonpayable"
    })
}

/// Contracts used by the scenarios:
/// - `Foo`: no constructor, no function
/// - `Registry`: `register(address)`
/// - `Math`: a library
/// - `Token`: constructor taking a supply, linked against `Math`
/// - `TokenTest`: two test methods and a helper, emitting assertions
pub fn registry() -> ContractRegistry {
    vec![
        artifact("Foo", "6080604052", json!([])),
        artifact(
            "Registry",
            "6080604053",
            json!([function("register", json!([{"name": "target", "type": "address"}]))]),
        ),
        artifact("Math", "6080604054", json!([])),
        artifact(
            "Token",
            &format!("60{:_<40}00", "__Math.sol:Math"),
            json!([{
                "type": "constructor",
                "inputs": [{"name": "supply", "type": "uint256"}],
                "stateMutability": "nonpayable"
            }]),
        ),
        artifact(
            "TokenTest",
            "6080604055",
            json!([
                function("testBalance", json!([])),
                function("testAllowance", json!([])),
                function("helper", json!([])),
                assert_event("AssertSuccess"),
                assert_event("AssertFailure")
            ]),
        ),
    ]
    .into_iter()
    .collect()
}

pub fn selector(registry: &ContractRegistry, contract: &str, method: &str) -> [u8; 4] {
    registry
        .get(contract)
        .unwrap()
        .abi
        .function(method)
        .unwrap()
        .short_signature()
}

pub fn event_topic(registry: &ContractRegistry, contract: &str, event: &str) -> H256 {
    registry.get(contract).unwrap().abi.event(event).unwrap().signature()
}
