//! Step runner
//!
//! Drives the step groups one after the other: a group is compiled,
//! signed, broadcast and fully confirmed before the next one starts,
//! so a group always sees the addresses deployed by the previous ones.

use std::{fmt, path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, Local};
use ethers::{
    abi::RawLog,
    types::{Address, Bytes, TransactionReceipt, H256, U256},
};
use log::{error, info, warn};
use serde_json::{Map, Value};

use evmscript_common::{
    config::{
        ASSERT_FAILURE_EVENT, ASSERT_MESSAGE_PARAM, ASSERT_SUCCESS_EVENT,
        DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_GAS_LIMIT, DEFAULT_TEST_PREFIX,
    },
    utils::{format_address, format_hash},
};

use crate::{
    codec::{token_to_json, token_to_string},
    compiler::{Completion, StepCompiler, TxPlan},
    error::{ScriptError, ScriptResult},
    registry::ContractRegistry,
    resolver::{AddressTable, VariableTable},
    script::{RawStep, StepGroup},
    signer::{sign_group, GasPolicy, TransactionSigner},
    transport::Transport,
    watcher::{broadcast, watch, ReceiptHandler},
};

/// A pass or fail line reported by a test contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub passed: bool,
    pub contract: String,
    pub method: String,
    pub message: String,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}@{} {}",
            if self.passed { "+" } else { "-" },
            self.contract,
            self.method,
            self.message
        )
    }
}

/// State owned by a run and mutated only by the completion of its steps
#[derive(Debug, Default)]
pub struct RunContext {
    pub vars: VariableTable,
    pub addresses: AddressTable,
    pub registry: ContractRegistry,
    pub test_results: Vec<TestOutcome>,
}

impl RunContext {
    pub fn new(vars: VariableTable, addresses: AddressTable, registry: ContractRegistry) -> Self {
        Self {
            vars,
            addresses,
            registry,
            test_results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub gas_limit: u64,
    pub test_prefix: String,
    // Time allowed for all transactions of a group to be mined
    pub confirmation_timeout: Duration,
    // Add decoded events to the messages of a group
    pub show_events: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            test_prefix: DEFAULT_TEST_PREFIX.to_string(),
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            show_events: false,
        }
    }
}

/// Messages and transactions of one step group
#[derive(Debug, Clone, Default)]
pub struct GroupReport {
    pub index: usize,
    pub transactions: Vec<H256>,
    pub messages: Vec<String>,
}

#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub groups: Vec<GroupReport>,
    pub test_results: Vec<TestOutcome>,
    // Fatal error which stopped the run
    pub error: Option<ScriptError>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn failed_tests(&self) -> usize {
        self.test_results.iter().filter(|t| !t.passed).count()
    }

    /// Print every group to stdout
    pub fn print(&self, show_transactions: bool) {
        for group in &self.groups {
            println!("\nStep {}", group.index);
            if show_transactions && !group.transactions.is_empty() {
                println!("Transactions:");
                for tx in &group.transactions {
                    println!("- {}", format_hash(tx));
                }
            }
            println!("Messages:");
            for message in &group.messages {
                println!("- {}", message);
            }
        }
    }

    pub fn print_test_results(&self) {
        if self.test_results.is_empty() {
            return;
        }

        println!("\n\nTest results:");
        for result in &self.test_results {
            println!("{}", result);
        }
    }
}

// Completes the transactions of one group once they are mined
struct GroupRecorder<'a> {
    addresses: &'a mut AddressTable,
    registry: &'a ContractRegistry,
    test_results: &'a mut Vec<TestOutcome>,
    messages: &'a mut Vec<String>,
    show_events: bool,
}

fn is_reverted(receipt: &TransactionReceipt) -> bool {
    receipt.status.map(|s| s.is_zero()).unwrap_or(false)
}

impl GroupRecorder<'_> {
    fn on_transferred(&mut self, to: Address, value: U256, receipt: TransactionReceipt) -> ScriptResult<()> {
        if is_reverted(&receipt) {
            warn!(
                "Transfer to {} reverted in transaction {}",
                format_address(&to),
                format_hash(&receipt.transaction_hash)
            );
            self.messages.push(format!("Transfer to {} reverted", format_address(&to)));
            return Err(ScriptError::Reverted(receipt.transaction_hash));
        }

        info!("Sent {} wei to {}", value, format_address(&to));
        self.messages.push(format!("Sent {} wei to {}", value, format_address(&to)));
        Ok(())
    }

    fn on_deployed(
        &mut self,
        contract: String,
        alias: Option<String>,
        receipt: TransactionReceipt,
    ) -> ScriptResult<()> {
        if is_reverted(&receipt) {
            warn!(
                "Deployment of {} reverted in transaction {}",
                contract,
                format_hash(&receipt.transaction_hash)
            );
            self.messages.push(format!("Contract {} deployment reverted", contract));
            return Err(ScriptError::MissingContractAddress(receipt.transaction_hash));
        }

        let address = receipt
            .contract_address
            .ok_or(ScriptError::MissingContractAddress(receipt.transaction_hash))?;

        let label = match &alias {
            Some(alias) => format!(" ({})", alias),
            None => String::new(),
        };
        info!("Contract {}{} mined at {}", contract, label, format_address(&address));
        self.messages.push(format!(
            "Contract {}{} mined at {}",
            contract,
            label,
            format_address(&address)
        ));
        self.addresses.insert(alias.unwrap_or(contract), address);
        Ok(())
    }

    fn on_called(
        &mut self,
        contract: String,
        method: String,
        address: Address,
        receipt: TransactionReceipt,
    ) -> ScriptResult<()> {
        if is_reverted(&receipt) {
            warn!(
                "Method {}@{} reverted in transaction {}",
                contract,
                method,
                format_hash(&receipt.transaction_hash)
            );
            self.messages.push(format!("Method {}@{} reverted", contract, method));
            return Ok(());
        }

        self.messages.push(format!("Method {}@{} executed", contract, method));

        let artifact = self.registry.get(&contract)?;
        for log in receipt.logs.iter().filter(|log| log.address == address) {
            let Some(topic) = log.topics.first() else {
                continue;
            };
            let Some(event) = artifact
                .abi
                .events()
                .find(|event| !event.anonymous && event.signature() == *topic)
            else {
                continue;
            };

            let decoded = match event.parse_log(RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            }) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("Failed decoding event {} of {}: {}", event.name, contract, e);
                    continue;
                }
            };

            if self.show_events {
                let args: Map<String, Value> = decoded
                    .params
                    .iter()
                    .map(|param| (param.name.clone(), token_to_json(&param.value)))
                    .collect();
                self.messages
                    .push(format!("  {}: {}", event.name, Value::Object(args)));
            }

            let passed = if event.name == ASSERT_SUCCESS_EVENT {
                true
            } else if event.name == ASSERT_FAILURE_EVENT {
                false
            } else {
                continue;
            };

            let message = decoded
                .params
                .iter()
                .find(|param| param.name == ASSERT_MESSAGE_PARAM)
                .map(|param| token_to_string(&param.value))
                .unwrap_or_default();
            self.test_results.push(TestOutcome {
                passed,
                contract: contract.clone(),
                method: method.clone(),
                message,
            });
        }
        Ok(())
    }
}

impl ReceiptHandler<Completion> for GroupRecorder<'_> {
    fn on_mined(&mut self, entry: Completion, receipt: TransactionReceipt) -> ScriptResult<()> {
        match entry {
            Completion::Deploy { contract, alias } => self.on_deployed(contract, alias, receipt),
            Completion::Call {
                contract,
                method,
                address,
            } => self.on_called(contract, method, address, receipt),
            Completion::Transfer { to, value } => self.on_transferred(to, value, receipt),
        }
    }
}

pub struct StepRunner {
    transport: Arc<dyn Transport>,
    signer: Arc<dyn TransactionSigner>,
    options: RunOptions,
}

impl StepRunner {
    pub fn new(
        transport: Arc<dyn Transport>,
        signer: Arc<dyn TransactionSigner>,
        options: RunOptions,
    ) -> Self {
        Self {
            transport,
            signer,
            options,
        }
    }

    /// Run every group in order, stopping on the first fatal error.
    /// Messages and test results gathered until then are kept in the report.
    pub async fn run(&self, ctx: &mut RunContext, groups: Vec<StepGroup>) -> RunReport {
        let started_at = Local::now();
        let total = groups.len();
        let mut reports = Vec::with_capacity(total);
        let mut failure = None;

        for (i, group) in groups.into_iter().enumerate() {
            let mut report = GroupReport {
                index: i + 1,
                ..Default::default()
            };
            info!("Executing step {}/{}", report.index, total);

            let result = self.run_group(ctx, group.into_steps(), &mut report).await;
            reports.push(report);
            if let Err(e) = result {
                error!("Step {} failed: {}", i + 1, e);
                failure = Some(e);
                break;
            }
        }

        if failure.is_none() {
            info!(
                "All {} step(s) executed in {}s",
                total,
                (Local::now() - started_at).num_seconds()
            );
        }

        RunReport {
            started_at,
            groups: reports,
            test_results: std::mem::take(&mut ctx.test_results),
            error: failure,
        }
    }

    async fn run_group(
        &self,
        ctx: &mut RunContext,
        steps: Vec<RawStep>,
        report: &mut GroupReport,
    ) -> ScriptResult<()> {
        let plans = {
            let compiler = StepCompiler::new(
                &ctx.vars,
                &ctx.addresses,
                &ctx.registry,
                &self.options.test_prefix,
            );
            compiler.compile_group(&steps)?
        };
        self.execute(ctx, plans, report).await
    }

    /// Send `value` wei from the account of `key` to `to`, reported as
    /// a single group
    pub async fn send(&self, ctx: &mut RunContext, key: &str, to: Address, value: U256) -> RunReport {
        let started_at = Local::now();
        let plan = TxPlan {
            key: key.to_string(),
            to: Some(to),
            value,
            data: Bytes::default(),
            completion: Completion::Transfer { to, value },
        };

        let mut report = GroupReport {
            index: 1,
            ..Default::default()
        };
        let result = self.execute(ctx, vec![plan], &mut report).await;
        if let Err(e) = &result {
            error!("Transfer failed: {}", e);
        }

        RunReport {
            started_at,
            groups: vec![report],
            test_results: std::mem::take(&mut ctx.test_results),
            error: result.err(),
        }
    }

    // Sign, broadcast and confirm the transactions of one group
    async fn execute(
        &self,
        ctx: &mut RunContext,
        plans: Vec<TxPlan>,
        report: &mut GroupReport,
    ) -> ScriptResult<()> {
        let signed = sign_group(
            self.transport.as_ref(),
            self.signer.as_ref(),
            plans,
            GasPolicy {
                limit: self.options.gas_limit,
            },
        )
        .await?;

        let outcome = broadcast(
            self.transport.as_ref(),
            signed
                .into_iter()
                .map(|tx| (tx.raw, tx.completion))
                .collect(),
        )
        .await;
        report.transactions = outcome.hashes.clone();
        let rejection = outcome.rejection();

        // Accepted transactions are always waited for, even after a rejection
        let mut recorder = GroupRecorder {
            addresses: &mut ctx.addresses,
            registry: &ctx.registry,
            test_results: &mut ctx.test_results,
            messages: &mut report.messages,
            show_events: self.options.show_events,
        };
        watch(
            self.transport.as_ref(),
            outcome.pending,
            &mut recorder,
            self.options.confirmation_timeout,
        )
        .await?;

        match rejection {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Write the preload file: one line per deployed contract with a known
/// interface, binding its name to the contract at its address
pub async fn write_preload<P: AsRef<Path>>(
    path: P,
    addresses: &AddressTable,
    registry: &ContractRegistry,
) -> ScriptResult<usize> {
    let lines = preload_lines(addresses, registry);
    let count = lines.len();
    tokio::fs::write(path.as_ref(), lines.join("\n")).await?;
    info!("Preload file written in {}", path.as_ref().display());
    Ok(count)
}

pub fn preload_lines(addresses: &AddressTable, registry: &ContractRegistry) -> Vec<String> {
    addresses
        .iter()
        .filter_map(|(name, address)| {
            let artifact = registry.get(name).ok()?;
            Some(format!(
                "{} = eth.contract({}).at(\"{}\");",
                name,
                artifact.abi_json,
                format_address(address)
            ))
        })
        .collect()
}
