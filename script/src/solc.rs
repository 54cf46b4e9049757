//! Solidity compiler service
//!
//! Contracts are compiled with the `solc` binary. The result of every
//! compilation is cached on disk along with the list of source files
//! involved (the contract and everything it imports), and reused as
//! long as none of those files changed.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;

use evmscript_common::crypto::keccak256_hex;

use crate::{
    error::{ScriptError, ScriptResult},
    linker::{link_references, LinkReferences},
    registry::{ContractArtifact, ContractRegistry},
};

lazy_static! {
    static ref IMPORT: Regex =
        Regex::new(r#"import\s+["']([^"']+)["']"#).expect("valid import regex");
}

pub const DEFAULT_SOLC_PATH: &str = "solc";

/// Turns a contract source file into a compiled artifact
#[async_trait]
pub trait ContractCompiler: Send + Sync {
    async fn compile(&self, path: &Path) -> Result<ContractArtifact>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    files: Vec<PathBuf>,
    name: String,
    // Newest modification time of `files`, in milliseconds
    time: u64,
    bytecode: String,
    abi: Value,
    #[serde(default)]
    libraries: LinkReferences,
}

impl CacheEntry {
    fn into_artifact(self) -> Result<ContractArtifact> {
        Ok(ContractArtifact::new(self.name, self.bytecode, self.abi)?.with_link_references(self.libraries))
    }
}

/// A contract picked from the compiler output
#[derive(Debug)]
struct CompiledContract {
    bytecode: String,
    abi: Value,
    // Every contract of the output, libraries are linked by their hash
    libraries: LinkReferences,
}

pub struct SolcCompiler {
    solc_path: PathBuf,
    cache_dir: PathBuf,
}

impl Default for SolcCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_SOLC_PATH, default_cache_dir())
    }
}

pub fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("evmscript")
}

/// Contract name, the file name without its `.sol` extension
pub fn contract_name(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("No contract name in path {}", path.display()))
}

/// Paths imported by a source file, ignoring commented out lines
pub fn extract_imports(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let code = line.split("//").next().unwrap_or_default();
            IMPORT
                .captures(code)
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

/// The file and every file it transitively imports, canonicalized
pub async fn collect_sources(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = vec![tokio::fs::canonicalize(path)
        .await
        .with_context(|| format!("Source file {} not found", path.display()))?];

    while let Some(file) = queue.pop() {
        if !visited.insert(file.clone()) {
            continue;
        }

        let content = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Failed reading {}", file.display()))?;
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        for import in extract_imports(&content) {
            let imported = tokio::fs::canonicalize(dir.join(&import))
                .await
                .with_context(|| format!("Import {} of {} not found", import, file.display()))?;
            queue.push(imported);
        }
        files.push(file);
    }

    Ok(files)
}

async fn newest_mtime(files: &[PathBuf]) -> Result<u64> {
    let mut newest = 0;
    for file in files {
        let modified = tokio::fs::metadata(file).await?.modified()?;
        let millis = modified.duration_since(UNIX_EPOCH)?.as_millis() as u64;
        newest = newest.max(millis);
    }
    Ok(newest)
}

// `solc --combined-json` output, keyed by `<file>:<contract>`
fn pick_contract(output: &Value, name: &str) -> Result<CompiledContract> {
    let contracts = output
        .get("contracts")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("No contracts in compiler output"))?;

    let suffix = format!(":{}", name);
    let contract = contracts
        .iter()
        .find(|(key, _)| key.ends_with(&suffix) || key.as_str() == name)
        .map(|(_, contract)| contract)
        .ok_or_else(|| anyhow!("Contract {} not found in compiler output", name))?;

    let bytecode = contract
        .get("bin")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("No bytecode for contract {}", name))?
        .to_string();

    // Older compilers encode the interface as a JSON string
    let abi = match contract.get("abi") {
        Some(Value::String(s)) => serde_json::from_str(s)?,
        Some(abi @ Value::Array(_)) => abi.clone(),
        _ => bail!("No interface for contract {}", name),
    };

    Ok(CompiledContract {
        bytecode,
        abi,
        libraries: link_references(contracts.keys().map(String::as_str)),
    })
}

impl SolcCompiler {
    pub fn new<S: Into<PathBuf>, C: Into<PathBuf>>(solc_path: S, cache_dir: C) -> Self {
        Self {
            solc_path: solc_path.into(),
            cache_dir: cache_dir.into(),
        }
    }

    fn cache_file(&self, path: &Path) -> PathBuf {
        let key = keccak256_hex(path.to_string_lossy().as_bytes());
        self.cache_dir.join(format!("{}.json", key))
    }

    async fn load_cache(&self, cache_file: &Path) -> Option<CacheEntry> {
        let content = tokio::fs::read_to_string(cache_file).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Ignoring corrupted cache file {}: {}", cache_file.display(), e);
                None
            }
        }
    }

    async fn store_cache(&self, cache_file: &Path, entry: &CacheEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tokio::fs::write(cache_file, serde_json::to_vec(entry)?).await?;
        Ok(())
    }

    async fn run_solc(&self, path: &Path, name: &str) -> Result<CompiledContract> {
        debug!("Running {} on {}", self.solc_path.display(), path.display());
        let output = Command::new(&self.solc_path)
            .arg("--combined-json")
            .arg("abi,bin")
            .arg(path)
            .output()
            .await
            .with_context(|| format!("Failed running {}", self.solc_path.display()))?;

        if !output.status.success() {
            bail!("{}", String::from_utf8_lossy(&output.stderr).trim());
        }

        let output: Value = serde_json::from_slice(&output.stdout)
            .context("Invalid compiler output")?;
        pick_contract(&output, name)
    }

    async fn build(&self, path: &Path, name: String) -> Result<CacheEntry> {
        let files = collect_sources(path).await?;
        let time = newest_mtime(&files).await?;
        let compiled = self.run_solc(path, &name).await?;
        Ok(CacheEntry {
            files,
            name,
            time,
            bytecode: compiled.bytecode,
            abi: compiled.abi,
            libraries: compiled.libraries,
        })
    }
}

#[async_trait]
impl ContractCompiler for SolcCompiler {
    async fn compile(&self, path: &Path) -> Result<ContractArtifact> {
        let path = tokio::fs::canonicalize(path)
            .await
            .with_context(|| format!("Contract file {} not found", path.display()))?;
        let name = contract_name(&path)?;
        let cache_file = self.cache_file(&path);

        if let Some(entry) = self.load_cache(&cache_file).await {
            match newest_mtime(&entry.files).await {
                Ok(time) if time == entry.time => {
                    debug!("Using cached build of {}", path.display());
                    return entry.into_artifact();
                }
                Ok(_) => debug!("Sources of {} changed since last build", name),
                Err(e) => debug!("Cached sources of {} unavailable: {}", name, e),
            }
        }

        let entry = self.build(&path, name).await?;
        if let Err(e) = self.store_cache(&cache_file, &entry).await {
            warn!("Failed caching build of {}: {:#}", path.display(), e);
        }
        info!("Compiled {} from {}", entry.name, path.display());
        entry.into_artifact()
    }
}

/// Compile every contract of a script concurrently into a registry
pub async fn load_contracts(
    compiler: &dyn ContractCompiler,
    paths: &[PathBuf],
) -> ScriptResult<ContractRegistry> {
    let results = join_all(paths.iter().map(|path| compiler.compile(path))).await;

    let mut registry = ContractRegistry::new();
    for (path, result) in paths.iter().zip(results) {
        let artifact = result.map_err(|source| ScriptError::Compiler {
            path: path.display().to_string(),
            source,
        })?;
        registry.insert(artifact);
    }
    Ok(registry)
}
