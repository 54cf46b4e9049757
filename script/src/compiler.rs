//! Step compilation
//!
//! A raw step from the script is first resolved into one step per
//! signing key, `test` steps are expanded into one call per test
//! method, and every resulting step is turned into a transaction plan:
//! the target, the value and the payload, still without nonce or gas.

use ethers::types::{Address, Bytes, U256};
use log::{debug, trace};
use serde_json::Value;

use evmscript_common::{
    crypto::{parse_address, strip_hex_prefix},
    utils::{parse_u256, truncate_hex},
};

use crate::{
    codec::bind_arguments,
    error::{ScriptError, ScriptResult},
    linker::{link_bytecode, referenced_libraries},
    registry::{ContractArtifact, ContractRegistry},
    resolver::{number_as_string, value_as_string, AddressTable, Resolver, VariableTable},
    script::{RawStep, StepKind},
};

/// A step with its key, arguments, value and address resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStep {
    pub kind: StepKind,
    pub key: String,
    pub contract: String,
    pub method: Option<String>,
    pub args: Vec<Value>,
    pub value: Option<Value>,
    pub address: Option<Value>,
    pub alias: Option<String>,
}

/// What to do once the transaction of a step is mined
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    // Record the created contract under `alias`, or `contract` when unset
    Deploy {
        contract: String,
        alias: Option<String>,
    },
    Call {
        contract: String,
        method: String,
        address: Address,
    },
    // Plain value transfer, outside of any script step
    Transfer {
        to: Address,
        value: U256,
    },
}

#[derive(Debug, Clone)]
pub struct TxPlan {
    pub key: String,
    // None for a contract creation
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub completion: Completion,
}

pub struct StepCompiler<'a> {
    resolver: Resolver<'a>,
    addresses: &'a AddressTable,
    registry: &'a ContractRegistry,
    test_prefix: &'a str,
}

fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

impl<'a> StepCompiler<'a> {
    pub fn new(
        vars: &'a VariableTable,
        addresses: &'a AddressTable,
        registry: &'a ContractRegistry,
        test_prefix: &'a str,
    ) -> Self {
        Self {
            resolver: Resolver::new(vars, addresses),
            addresses,
            registry,
            test_prefix,
        }
    }

    /// Resolve a raw step into one step per signing key
    pub fn prepare_step(&self, step: &RawStep) -> ScriptResult<Vec<ResolvedStep>> {
        let mut keys = Vec::new();
        for key in as_list(&step.key) {
            match self.resolver.resolve_value(&key)? {
                Value::Array(items) => keys.extend(items),
                other => keys.push(other),
            }
        }

        let args = step
            .args
            .as_ref()
            .map(as_list)
            .unwrap_or_default()
            .iter()
            .map(|arg| self.resolver.resolve_value(arg))
            .collect::<ScriptResult<Vec<_>>>()?;

        let value = step
            .value
            .as_ref()
            .map(|v| self.resolver.resolve_value(v))
            .transpose()?;

        let address = step
            .address
            .as_ref()
            .map(|v| self.resolver.resolve_value(v))
            .transpose()?;

        keys.into_iter()
            .map(|key| {
                let key = value_as_string(&key)
                    .ok_or_else(|| ScriptError::InvalidValue(format!("signing key {key}")))?;
                Ok(ResolvedStep {
                    kind: step.kind,
                    key,
                    contract: step.contract.clone(),
                    method: step.method.clone(),
                    args: args.clone(),
                    value: value.clone(),
                    address: address.clone(),
                    alias: step.alias.clone(),
                })
            })
            .collect()
    }

    fn artifact(&self, contract: &str) -> ScriptResult<&'a ContractArtifact> {
        let name = self.resolver.resolve_name_str(contract)?;
        let name = value_as_string(&name).ok_or_else(|| ScriptError::UnknownContract(name.to_string()))?;
        self.registry.get(&name)
    }

    /// Expand a `test` step into one call per test method of its contract,
    /// other steps are returned as is
    pub fn expand(&self, step: ResolvedStep) -> ScriptResult<Vec<ResolvedStep>> {
        if step.kind != StepKind::Test {
            return Ok(vec![step]);
        }

        let artifact = self.artifact(&step.contract)?;
        let calls: Vec<ResolvedStep> = artifact
            .test_functions(self.test_prefix)
            .map(|function| ResolvedStep {
                kind: StepKind::Call,
                key: step.key.clone(),
                contract: step.contract.clone(),
                method: Some(function.name.clone()),
                args: Vec::new(),
                value: None,
                address: None,
                alias: None,
            })
            .collect();

        debug!(
            "Test step on {} expanded into {} call(s)",
            artifact.name,
            calls.len()
        );
        Ok(calls)
    }

    /// Build the transaction plan of a call or deploy step
    pub fn compile_step(&self, step: &ResolvedStep) -> ScriptResult<TxPlan> {
        let artifact = self.artifact(&step.contract)?;
        let value = parse_value(step.value.as_ref())?;

        let (to, data, completion) = match step.kind {
            StepKind::Call => self.compile_call(artifact, step)?,
            StepKind::Deploy => self.compile_deploy(artifact, step)?,
            StepKind::Test => {
                return Err(ScriptError::InvalidValue(format!(
                    "test step on {} must be expanded before compilation",
                    artifact.name
                )))
            }
        };

        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "Payload for {} step on {}: {}",
                step.kind,
                artifact.name,
                truncate_hex(&hex::encode(&data), 64)
            );
        }

        Ok(TxPlan {
            key: step.key.clone(),
            to,
            value,
            data,
            completion,
        })
    }

    fn compile_call(
        &self,
        artifact: &ContractArtifact,
        step: &ResolvedStep,
    ) -> ScriptResult<(Option<Address>, Bytes, Completion)> {
        let target = match &step.address {
            Some(address) => address.clone(),
            None => self.resolver.resolve_value_str(&artifact.name)?,
        };
        let address = value_as_string(&target)
            .and_then(|target| parse_address(&target).ok())
            .ok_or_else(|| ScriptError::MissingAddress(artifact.name.clone()))?;

        let method = match &step.method {
            Some(method) => {
                let resolved = self.resolver.resolve_name_str(method)?;
                value_as_string(&resolved).unwrap_or_else(|| resolved.to_string())
            }
            None => String::new(),
        };
        let function = artifact
            .function(&method, step.args.len())
            .ok_or_else(|| ScriptError::UnknownMethod {
                contract: artifact.name.clone(),
                method: method.clone(),
            })?;

        let tokens = bind_arguments(&function.inputs, &step.args)?;
        let data = function
            .encode_input(&tokens)
            .map_err(|e| ScriptError::MalformedPayload(format!("{}@{}: {}", artifact.name, method, e)))?;

        Ok((
            Some(address),
            Bytes::from(data),
            Completion::Call {
                contract: artifact.name.clone(),
                method,
                address,
            },
        ))
    }

    fn compile_deploy(
        &self,
        artifact: &ContractArtifact,
        step: &ResolvedStep,
    ) -> ScriptResult<(Option<Address>, Bytes, Completion)> {
        // Without a constructor the contract takes no argument
        let tokens = match artifact.abi.constructor() {
            Some(constructor) => bind_arguments(&constructor.inputs, &step.args)?,
            None => Vec::new(),
        };

        let libraries = referenced_libraries(&artifact.bytecode, &artifact.link_references);
        if !libraries.is_empty() {
            debug!("Linking {} against {}", artifact.name, libraries.join(", "));
        }
        let linked = link_bytecode(&artifact.bytecode, self.addresses, &artifact.link_references)?;
        let code = decode_bytecode(&linked)?;

        let data = match artifact.abi.constructor() {
            Some(constructor) => constructor
                .encode_input(code, &tokens)
                .map_err(|e| ScriptError::MalformedPayload(format!("{} constructor: {}", artifact.name, e)))?,
            None => code,
        };

        if data.is_empty() {
            return Err(ScriptError::MalformedPayload(format!(
                "empty deploy payload for {}",
                artifact.name
            )));
        }

        Ok((
            None,
            Bytes::from(data),
            Completion::Deploy {
                contract: artifact.name.clone(),
                alias: step.alias.clone(),
            },
        ))
    }

    /// Resolve, expand and compile every step of a group, in order
    pub fn compile_group(&self, steps: &[RawStep]) -> ScriptResult<Vec<TxPlan>> {
        let mut plans = Vec::new();
        for step in steps {
            for resolved in self.prepare_step(step)? {
                for expanded in self.expand(resolved)? {
                    plans.push(self.compile_step(&expanded)?);
                }
            }
        }
        Ok(plans)
    }
}

/// Decode linked bytecode, rejecting empty and doubly prefixed payloads
pub fn decode_bytecode(bytecode: &str) -> ScriptResult<Vec<u8>> {
    let trimmed = strip_hex_prefix(bytecode.trim());
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        return Err(ScriptError::MalformedPayload("doubly prefixed payload".into()));
    }
    if trimmed.is_empty() {
        return Err(ScriptError::MalformedPayload("empty payload".into()));
    }

    hex::decode(trimmed).map_err(|e| ScriptError::MalformedPayload(e.to_string()))
}

/// Amount sent with a transaction, zero when not set
pub fn parse_value(value: Option<&Value>) -> ScriptResult<U256> {
    let Some(value) = value else {
        return Ok(U256::zero());
    };

    match value {
        Value::Null => Ok(U256::zero()),
        Value::Number(n) => match n.as_u64() {
            Some(v) => Ok(U256::from(v)),
            None => {
                let text = number_as_string(n);
                parse_u256(&text).ok_or(ScriptError::InvalidValue(text))
            }
        },
        Value::String(s) => parse_u256(s).ok_or_else(|| ScriptError::InvalidValue(s.clone())),
        other => Err(ScriptError::InvalidValue(other.to_string())),
    }
}
