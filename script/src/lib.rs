//! evmscript
//!
//! Runs declarative scripts of contract deployments, calls and tests
//! against an EVM node: steps are resolved, compiled to transactions,
//! signed with per-account nonces, broadcast and confirmed group after
//! group.

pub mod codec;
pub mod compiler;
pub mod config;
pub mod error;
pub mod linker;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod script;
pub mod signer;
pub mod solc;
pub mod transport;
pub mod wallet;
pub mod watcher;

pub use compiler::{Completion, StepCompiler, TxPlan};
pub use config::{ConfigValidationError, ConfigValidator, ValidatedConfig};
pub use error::{ScriptError, ScriptResult};
pub use registry::{ContractArtifact, ContractRegistry};
pub use resolver::{AddressTable, Resolver, VariableTable};
pub use runner::{RunContext, RunOptions, RunReport, StepRunner, TestOutcome};
pub use script::{RawStep, ScriptFile, StepGroup, StepKind};
pub use signer::{LocalSigner, TransactionSigner};
pub use solc::{ContractCompiler, SolcCompiler};
pub use transport::{BlockSubscription, RpcTransport, RpcTransportConfig, Transport};
