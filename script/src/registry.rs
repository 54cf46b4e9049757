use ethers::abi::{Abi, Function};
use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    error::{ScriptError, ScriptResult},
    linker::LinkReferences,
};

/// A compiled contract: its name, unlinked bytecode and interface
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    // Hex encoded, may contain library placeholders
    pub bytecode: String,
    pub abi: Abi,
    // Interface as produced by the compiler, written to the preload file
    pub abi_json: Value,
    // Libraries behind the hashed placeholders of `bytecode`
    pub link_references: LinkReferences,
}

impl ContractArtifact {
    pub fn new(name: String, bytecode: String, abi_json: Value) -> ScriptResult<Self> {
        let abi: Abi = serde_json::from_value(abi_json.clone())?;
        Ok(Self {
            name,
            bytecode,
            abi,
            abi_json,
            link_references: LinkReferences::new(),
        })
    }

    pub fn with_link_references(mut self, link_references: LinkReferences) -> Self {
        self.link_references = link_references;
        self
    }

    /// Find a function by name, preferring the overload taking `arity` arguments
    pub fn function(&self, name: &str, arity: usize) -> Option<&Function> {
        let overloads = self.abi.functions.get(name)?;
        overloads
            .iter()
            .find(|f| f.inputs.len() == arity)
            .or_else(|| overloads.first())
    }

    /// Functions whose name starts with the prefix, sorted by name.
    /// Tests are called without arguments: of each overloaded name only
    /// the overload taking none is a test, names without one are skipped.
    pub fn test_functions<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Function> + 'a {
        self.abi
            .functions
            .iter()
            .filter(move |(name, _)| name.starts_with(prefix))
            .flat_map(|(_, overloads)| overloads.iter().find(|f| f.inputs.is_empty()))
    }
}

/// All contracts compiled for the current run, immutable once loaded
#[derive(Debug, Default)]
pub struct ContractRegistry {
    contracts: IndexMap<String, ContractArtifact>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, artifact: ContractArtifact) {
        self.contracts.insert(artifact.name.clone(), artifact);
    }

    pub fn get(&self, name: &str) -> ScriptResult<&ContractArtifact> {
        self.contracts
            .get(name)
            .ok_or_else(|| ScriptError::UnknownContract(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContractArtifact> {
        self.contracts.values()
    }
}

impl FromIterator<ContractArtifact> for ContractRegistry {
    fn from_iter<I: IntoIterator<Item = ContractArtifact>>(iter: I) -> Self {
        let mut registry = Self::new();
        for artifact in iter {
            registry.insert(artifact);
        }
        registry
    }
}
