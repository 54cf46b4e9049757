//! Script document model
//!
//! A script is a JSON object with four optional sections:
//! `vars`, `contracts`, `addresses` and `steps`.
//! Each entry of `steps` is either a single step object
//! or an array of step objects executed as one group.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use evmscript_common::crypto::parse_address;

use crate::{
    error::{ScriptError, ScriptResult},
    resolver::{AddressTable, VariableTable},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StepKind {
    Call,
    Deploy,
    Test,
}

/// A step as written in the script, before any resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStep {
    #[serde(rename = "type")]
    pub kind: StepKind,
    // Single name or array of names, one transaction per resolved key
    pub key: Value,
    pub contract: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Value>,
    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepGroup {
    Many(Vec<RawStep>),
    Single(RawStep),
}

impl StepGroup {
    pub fn into_steps(self) -> Vec<RawStep> {
        match self {
            Self::Many(steps) => steps,
            Self::Single(step) => vec![step],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Many(steps) => steps.len(),
            Self::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptFile {
    #[serde(default)]
    pub vars: VariableTable,
    #[serde(default)]
    pub contracts: Vec<String>,
    #[serde(default)]
    pub addresses: IndexMap<String, String>,
    #[serde(default)]
    pub steps: Vec<StepGroup>,
}

impl ScriptFile {
    pub fn parse(content: &str) -> ScriptResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> ScriptResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse(&content)
    }

    /// Merge variables given on the command line over the script ones
    pub fn merge_vars(&mut self, extra: VariableTable) {
        for (name, value) in extra {
            self.vars.insert(name, value);
        }
    }

    /// Parse the `addresses` section into the deployed address table
    pub fn address_table(&self) -> ScriptResult<AddressTable> {
        self.addresses
            .iter()
            .map(|(name, value)| {
                parse_address(value)
                    .map(|address| (name.clone(), address))
                    .map_err(|_| ScriptError::InvalidAddress(format!("{value} for {name}")))
            })
            .collect()
    }

    // Contract paths are relative to the script directory
    pub fn contract_paths(&self, script_dir: &Path) -> Vec<PathBuf> {
        self.contracts
            .iter()
            .map(|path| script_dir.join(path))
            .collect()
    }
}

/// Parse a `NAME=VALUE` variable definition
///
/// The value is read as JSON when possible (numbers, arrays...),
/// otherwise it is kept as a plain string.
pub fn parse_var_definition(definition: &str) -> Result<(String, Value), String> {
    let (name, value) = definition
        .split_once('=')
        .ok_or_else(|| format!("invalid variable definition '{definition}', expected NAME=VALUE"))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty variable name in '{definition}'"));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCRIPT: &str = r#"{
        "vars": {"owner": "0x1", "supply": 1000},
        "contracts": ["contracts/Token.sol", "contracts/Lib.sol"],
        "addresses": {"Registry": "0x00000000000000000000000000000000000000aa"},
        "steps": [
            {"type": "deploy", "key": "owner", "contract": "Token", "args": ["supply"], "as": "MainToken"},
            [
                {"type": "call", "key": ["owner", "other"], "contract": "Token", "method": "mint", "args": [1]},
                {"type": "test", "key": "owner", "contract": "TokenTest"}
            ]
        ]
    }"#;

    #[test]
    fn test_parse_script() {
        let script = ScriptFile::parse(SCRIPT).unwrap();
        assert_eq!(script.vars.get("supply"), Some(&json!(1000)));
        assert_eq!(script.contracts.len(), 2);
        assert_eq!(script.steps.len(), 2);

        let first = script.steps[0].clone().into_steps();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, StepKind::Deploy);
        assert_eq!(first[0].alias.as_deref(), Some("MainToken"));

        let second = script.steps[1].clone().into_steps();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].key, json!(["owner", "other"]));
        assert_eq!(second[0].method.as_deref(), Some("mint"));
        assert_eq!(second[1].kind, StepKind::Test);
    }

    #[test]
    fn test_empty_script() {
        let script = ScriptFile::parse("{}").unwrap();
        assert!(script.vars.is_empty());
        assert!(script.steps.is_empty());
    }

    #[test]
    fn test_unknown_step_type() {
        let err = ScriptFile::parse(r#"{"steps": [{"type": "send", "key": "a", "contract": "A"}]}"#)
            .unwrap_err();
        assert!(matches!(err, ScriptError::ScriptParse(_)));
    }

    #[test]
    fn test_address_table() {
        let script = ScriptFile::parse(SCRIPT).unwrap();
        let table = script.address_table().unwrap();
        assert_eq!(
            table.get("Registry").copied(),
            Some(ethers::types::Address::from_low_u64_be(0xaa))
        );

        let bad = ScriptFile::parse(r#"{"addresses": {"A": "nope"}}"#).unwrap();
        assert!(matches!(bad.address_table(), Err(ScriptError::InvalidAddress(_))));
    }

    #[test]
    fn test_merge_vars() {
        let mut script = ScriptFile::parse(SCRIPT).unwrap();
        let mut extra = VariableTable::new();
        extra.insert("owner".into(), json!("0x2"));
        extra.insert("fresh".into(), json!(true));
        script.merge_vars(extra);

        assert_eq!(script.vars.get("owner"), Some(&json!("0x2")));
        assert_eq!(script.vars.get("fresh"), Some(&json!(true)));
        assert_eq!(script.vars.get("supply"), Some(&json!(1000)));
    }

    #[test]
    fn test_parse_var_definition() {
        assert_eq!(
            parse_var_definition("amount=42").unwrap(),
            ("amount".to_string(), json!(42))
        );
        assert_eq!(
            parse_var_definition("list=[\"a\",\"b\"]").unwrap(),
            ("list".to_string(), json!(["a", "b"]))
        );
        assert_eq!(
            parse_var_definition("owner=0xabc").unwrap(),
            ("owner".to_string(), json!("0xabc"))
        );
        assert_eq!(
            parse_var_definition("eq=a=b").unwrap(),
            ("eq".to_string(), json!("a=b"))
        );
        assert!(parse_var_definition("novalue").is_err());
        assert!(parse_var_definition("=1").is_err());
    }

    #[test]
    fn test_contract_paths() {
        let script = ScriptFile::parse(SCRIPT).unwrap();
        let paths = script.contract_paths(Path::new("/scripts"));
        assert_eq!(paths[0], PathBuf::from("/scripts/contracts/Token.sol"));
    }
}
