//! Symbolic name resolution
//!
//! Names are looked up through two tables: the script variables
//! and the addresses of deployed contracts. A variable may point
//! to another name, forming a chain which is followed until a
//! terminal value is reached.

use ethers::types::Address;
use indexmap::IndexMap;
use serde_json::{Number, Value};

use evmscript_common::utils::format_address;

use crate::error::{ScriptError, ScriptResult};

pub type VariableTable = IndexMap<String, Value>;
pub type AddressTable = IndexMap<String, Address>;

pub struct Resolver<'a> {
    vars: &'a VariableTable,
    addresses: &'a AddressTable,
}

impl<'a> Resolver<'a> {
    pub fn new(vars: &'a VariableTable, addresses: &'a AddressTable) -> Self {
        Self { vars, addresses }
    }

    /// Follow a name through the variables, stopping on the first
    /// deployed contract name found, which resolves to its address.
    /// An unknown name is returned as a literal.
    pub fn resolve_value(&self, value: &Value) -> ScriptResult<Value> {
        self.resolve(value, true, &mut Vec::new())
    }

    /// Same as `resolve_value` but only the variables are followed
    pub fn resolve_name(&self, value: &Value) -> ScriptResult<Value> {
        self.resolve(value, false, &mut Vec::new())
    }

    pub fn resolve_value_str(&self, name: &str) -> ScriptResult<Value> {
        self.resolve_value(&Value::String(name.to_string()))
    }

    pub fn resolve_name_str(&self, name: &str) -> ScriptResult<Value> {
        self.resolve_name(&Value::String(name.to_string()))
    }

    // `chain` holds the variables followed to reach `value`,
    // a variable seen twice means the chain never terminates
    fn resolve(&self, value: &Value, with_addresses: bool, chain: &mut Vec<String>) -> ScriptResult<Value> {
        let depth = chain.len();
        let result = self.follow(value, with_addresses, chain);
        chain.truncate(depth);
        result
    }

    fn follow(&self, value: &Value, with_addresses: bool, chain: &mut Vec<String>) -> ScriptResult<Value> {
        let mut current = value.clone();
        loop {
            let Some(key) = value_as_string(&current) else {
                break;
            };

            if with_addresses {
                if let Some(address) = self.addresses.get(&key) {
                    return Ok(Value::String(format_address(address)));
                }
            }

            let Some(next) = self.vars.get(&key) else {
                break;
            };

            if chain.contains(&key) {
                chain.push(key);
                return Err(ScriptError::CyclicReference(chain.join(" -> ")));
            }

            chain.push(key);
            current = next.clone();
        }

        match current {
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item, with_addresses, chain))
                .collect::<ScriptResult<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other),
        }
    }
}

/// Textual form of a scalar value, also the key used to look it up
/// in the tables: numbers and booleans are looked up by their text.
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_as_string(n)),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Decimal form of a JSON number. Integers above the u64 range are
/// read as floats and would otherwise be written with an exponent.
pub fn number_as_string(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 => format!("{f:.0}"),
        _ => n.to_string(),
    }
}
