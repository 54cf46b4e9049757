use anyhow::{anyhow, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use evmscript_common::logger::{LogLevel, ModuleConfig};

use crate::{runner::RunOptions, transport::RpcTransportConfig};

/// Default values for configuration
pub mod defaults {
    use super::*;
    use evmscript_common::config;

    pub const LOG_LEVEL: LogLevel = LogLevel::Info;
    pub const FILENAME_LOG: &str = "evmscript.log";
    pub const LOGS_PATH: &str = "logs/";
    pub const RPC_ADDRESS: &str = config::DEFAULT_RPC_ADDRESS;
    pub const SOLC_PATH: &str = crate::solc::DEFAULT_SOLC_PATH;
    pub const TEST_PREFIX: &str = config::DEFAULT_TEST_PREFIX;

    // Transport defaults
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 1000;
    pub const BLOCK_POLL_INTERVAL_MS: u64 = config::DEFAULT_BLOCK_POLL_INTERVAL_MS;

    // Engine defaults
    pub const CONFIRMATION_TIMEOUT_SECS: u64 = config::DEFAULT_CONFIRMATION_TIMEOUT_SECS;
    pub const GAS_LIMIT: u64 = config::DEFAULT_GAS_LIMIT;

    // Validation limits
    pub const MIN_TIMEOUT_SECS: u64 = 1;
    pub const MAX_TIMEOUT_SECS: u64 = 300;
    pub const MAX_RETRIES_LIMIT: u32 = 10;
    pub const MIN_RETRY_DELAY_MS: u64 = 100;
    pub const MAX_RETRY_DELAY_MS: u64 = 30000;
    pub const MIN_POLL_INTERVAL_MS: u64 = 50;
    pub const MAX_POLL_INTERVAL_MS: u64 = 60000;
    pub const MAX_CONFIRMATION_TIMEOUT_SECS: u64 = 86400;
    pub const MIN_GAS_LIMIT: u64 = 21000;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatedConfig {
    /// Log level configuration
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default)]
    pub file_log_level: Option<LogLevel>,

    /// File logging settings
    #[serde(default)]
    pub disable_file_logging: bool,

    #[serde(default)]
    pub disable_log_color: bool,

    #[serde(default = "default_filename_log")]
    pub filename_log: String,

    #[serde(default = "default_logs_path")]
    pub logs_path: String,

    // Prefix the log file with the date and rotate it every day
    #[serde(default)]
    pub file_log_date_based: bool,

    #[serde(default)]
    pub logs_modules: Vec<ModuleConfig>,

    /// Node connection settings
    #[serde(default = "default_rpc_address")]
    pub rpc_address: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_block_poll_interval_ms")]
    pub block_poll_interval_ms: u64,

    /// Execution settings
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    // Queried from the node when not set
    #[serde(default)]
    pub chain_id: Option<u64>,

    #[serde(default = "default_test_prefix")]
    pub test_prefix: String,

    /// Compiler settings
    #[serde(default = "default_solc_path")]
    pub solc_path: String,

    #[serde(default)]
    pub cache_dir: Option<String>,

    /// Auto-fix configuration issues
    #[serde(default)]
    pub auto_fix_config: bool,

    /// Validation settings
    #[serde(default)]
    pub strict_validation: bool,
}

// Default functions for serde
fn default_log_level() -> LogLevel {
    defaults::LOG_LEVEL
}
fn default_filename_log() -> String {
    defaults::FILENAME_LOG.to_string()
}
fn default_logs_path() -> String {
    defaults::LOGS_PATH.to_string()
}
fn default_rpc_address() -> String {
    defaults::RPC_ADDRESS.to_string()
}
fn default_request_timeout_secs() -> u64 {
    defaults::REQUEST_TIMEOUT_SECS
}
fn default_connection_timeout_secs() -> u64 {
    defaults::CONNECTION_TIMEOUT_SECS
}
fn default_max_retries() -> u32 {
    defaults::MAX_RETRIES
}
fn default_retry_delay_ms() -> u64 {
    defaults::RETRY_DELAY_MS
}
fn default_block_poll_interval_ms() -> u64 {
    defaults::BLOCK_POLL_INTERVAL_MS
}
fn default_confirmation_timeout_secs() -> u64 {
    defaults::CONFIRMATION_TIMEOUT_SECS
}
fn default_gas_limit() -> u64 {
    defaults::GAS_LIMIT
}
fn default_test_prefix() -> String {
    defaults::TEST_PREFIX.to_string()
}
fn default_solc_path() -> String {
    defaults::SOLC_PATH.to_string()
}

impl Default for ValidatedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            file_log_level: None,
            disable_file_logging: false,
            disable_log_color: false,
            filename_log: default_filename_log(),
            logs_path: default_logs_path(),
            file_log_date_based: false,
            logs_modules: Vec::new(),
            rpc_address: default_rpc_address(),
            request_timeout_secs: default_request_timeout_secs(),
            connection_timeout_secs: default_connection_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            block_poll_interval_ms: default_block_poll_interval_ms(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            gas_limit: default_gas_limit(),
            chain_id: None,
            test_prefix: default_test_prefix(),
            solc_path: default_solc_path(),
            cache_dir: None,
            auto_fix_config: true,
            strict_validation: false,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    InvalidRpcAddress(String),
    InvalidTimeout {
        field: String,
        value: u64,
        min: u64,
        max: u64,
    },
    InvalidRetrySettings {
        field: String,
        value: u32,
        max: u32,
    },
    InvalidGasLimit(u64),
    InvalidTestPrefix(String),
    InvalidPath {
        field: String,
        path: String,
        reason: String,
    },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValidationError::InvalidRpcAddress(addr) => write!(
                f,
                "Invalid RPC address: '{}' - must be a valid HTTP/HTTPS URL",
                addr
            ),
            ConfigValidationError::InvalidTimeout {
                field,
                value,
                min,
                max,
            } => write!(
                f,
                "Invalid {}: {} - must be between {} and {}",
                field, value, min, max
            ),
            ConfigValidationError::InvalidRetrySettings { field, value, max } => write!(
                f,
                "Invalid {}: {} - must be between 0 and {}",
                field, value, max
            ),
            ConfigValidationError::InvalidGasLimit(limit) => write!(
                f,
                "Invalid gas limit: {} - must be at least {}",
                limit,
                defaults::MIN_GAS_LIMIT
            ),
            ConfigValidationError::InvalidTestPrefix(prefix) => write!(
                f,
                "Invalid test prefix: '{}' - must not be empty",
                prefix
            ),
            ConfigValidationError::InvalidPath {
                field,
                path,
                reason,
            } => write!(f, "Invalid {}: '{}' - {}", field, path, reason),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validation result
pub type ValidationResult<T> = std::result::Result<T, ConfigValidationError>;

/// What the validation changed or noticed.
///
/// Validation runs before the logger is installed, the report
/// is logged once it is.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub fixed_issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.fixed_issues.is_empty() && self.warnings.is_empty()
    }

    pub fn log(&self) {
        if !self.fixed_issues.is_empty() && log::log_enabled!(log::Level::Info) {
            info!("Auto-fixed {} configuration issue(s):", self.fixed_issues.len());
            for fix in &self.fixed_issues {
                info!("  {}", fix);
            }
        }

        if !self.warnings.is_empty() && log::log_enabled!(log::Level::Warn) {
            warn!("Configuration warnings:");
            for warning in &self.warnings {
                warn!("  {}", warning);
            }
        }
    }
}

/// Configuration validator
pub struct ConfigValidator {
    strict_mode: bool,
    auto_fix: bool,
}

impl ConfigValidator {
    pub fn new(strict_mode: bool, auto_fix: bool) -> Self {
        Self {
            strict_mode,
            auto_fix,
        }
    }

    // Apply the fix when allowed, otherwise fail the validation
    fn fix_or_fail<F>(
        &self,
        error: ConfigValidationError,
        fixed_issues: &mut Vec<String>,
        fix: F,
    ) -> Result<()>
    where
        F: FnOnce() -> String,
    {
        if self.auto_fix && !self.strict_mode {
            fixed_issues.push(format!("{} ({})", fix(), error));
            Ok(())
        } else {
            Err(anyhow!("Configuration validation failed: {}", error))
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self, config: &mut ValidatedConfig) -> Result<ValidationReport> {
        let mut warnings = Vec::new();
        let mut fixed_issues = Vec::new();

        // Never replaced: transactions would be signed for another node
        self.validate_rpc_address(&config.rpc_address)
            .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

        if let Err(e) = self.validate_timeout("request_timeout", config.request_timeout_secs) {
            self.fix_or_fail(e, &mut fixed_issues, || {
                config.request_timeout_secs = defaults::REQUEST_TIMEOUT_SECS;
                format!("Fixed request timeout to {} seconds", config.request_timeout_secs)
            })?;
        }

        if let Err(e) = self.validate_timeout("connection_timeout", config.connection_timeout_secs)
        {
            self.fix_or_fail(e, &mut fixed_issues, || {
                config.connection_timeout_secs = defaults::CONNECTION_TIMEOUT_SECS;
                format!(
                    "Fixed connection timeout to {} seconds",
                    config.connection_timeout_secs
                )
            })?;
        }

        if let Err(e) = self.validate_retry_count(config.max_retries) {
            self.fix_or_fail(e, &mut fixed_issues, || {
                config.max_retries = defaults::MAX_RETRIES;
                format!("Fixed max retries to {}", config.max_retries)
            })?;
        }

        if let Err(e) = self.validate_retry_delay(config.retry_delay_ms) {
            self.fix_or_fail(e, &mut fixed_issues, || {
                config.retry_delay_ms = defaults::RETRY_DELAY_MS;
                format!("Fixed retry delay to {} ms", config.retry_delay_ms)
            })?;
        }

        if let Err(e) = self.validate_poll_interval(config.block_poll_interval_ms) {
            self.fix_or_fail(e, &mut fixed_issues, || {
                config.block_poll_interval_ms = defaults::BLOCK_POLL_INTERVAL_MS;
                format!("Fixed block poll interval to {} ms", config.block_poll_interval_ms)
            })?;
        }

        if let Err(e) = self.validate_confirmation_timeout(config.confirmation_timeout_secs) {
            self.fix_or_fail(e, &mut fixed_issues, || {
                config.confirmation_timeout_secs = defaults::CONFIRMATION_TIMEOUT_SECS;
                format!(
                    "Fixed confirmation timeout to {} seconds",
                    config.confirmation_timeout_secs
                )
            })?;
        }

        if config.gas_limit < defaults::MIN_GAS_LIMIT {
            self.fix_or_fail(
                ConfigValidationError::InvalidGasLimit(config.gas_limit),
                &mut fixed_issues,
                || {
                    config.gas_limit = defaults::GAS_LIMIT;
                    format!("Fixed gas limit to {}", config.gas_limit)
                },
            )?;
        }

        if config.test_prefix.trim().is_empty() {
            self.fix_or_fail(
                ConfigValidationError::InvalidTestPrefix(config.test_prefix.clone()),
                &mut fixed_issues,
                || {
                    config.test_prefix = defaults::TEST_PREFIX.to_string();
                    format!("Fixed test prefix to '{}'", config.test_prefix)
                },
            )?;
        }

        // Validate and create directories
        self.validate_paths(config, &mut warnings, &mut fixed_issues)?;

        Ok(ValidationReport {
            fixed_issues,
            warnings,
        })
    }

    fn validate_rpc_address(&self, address: &str) -> ValidationResult<()> {
        let url_str = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let url = Url::parse(&url_str)
            .map_err(|_| ConfigValidationError::InvalidRpcAddress(address.to_string()))?;
        if url.host_str().is_none() {
            return Err(ConfigValidationError::InvalidRpcAddress(address.to_string()));
        }

        Ok(())
    }

    fn validate_timeout(&self, field: &str, value: u64) -> ValidationResult<()> {
        if value < defaults::MIN_TIMEOUT_SECS || value > defaults::MAX_TIMEOUT_SECS {
            return Err(ConfigValidationError::InvalidTimeout {
                field: field.to_string(),
                value,
                min: defaults::MIN_TIMEOUT_SECS,
                max: defaults::MAX_TIMEOUT_SECS,
            });
        }
        Ok(())
    }

    fn validate_retry_count(&self, value: u32) -> ValidationResult<()> {
        if value > defaults::MAX_RETRIES_LIMIT {
            return Err(ConfigValidationError::InvalidRetrySettings {
                field: "max_retries".to_string(),
                value,
                max: defaults::MAX_RETRIES_LIMIT,
            });
        }
        Ok(())
    }

    fn validate_retry_delay(&self, value: u64) -> ValidationResult<()> {
        if value < defaults::MIN_RETRY_DELAY_MS || value > defaults::MAX_RETRY_DELAY_MS {
            return Err(ConfigValidationError::InvalidTimeout {
                field: "retry_delay".to_string(),
                value,
                min: defaults::MIN_RETRY_DELAY_MS,
                max: defaults::MAX_RETRY_DELAY_MS,
            });
        }
        Ok(())
    }

    fn validate_poll_interval(&self, value: u64) -> ValidationResult<()> {
        if value < defaults::MIN_POLL_INTERVAL_MS || value > defaults::MAX_POLL_INTERVAL_MS {
            return Err(ConfigValidationError::InvalidTimeout {
                field: "block_poll_interval".to_string(),
                value,
                min: defaults::MIN_POLL_INTERVAL_MS,
                max: defaults::MAX_POLL_INTERVAL_MS,
            });
        }
        Ok(())
    }

    fn validate_confirmation_timeout(&self, value: u64) -> ValidationResult<()> {
        if value < defaults::MIN_TIMEOUT_SECS || value > defaults::MAX_CONFIRMATION_TIMEOUT_SECS {
            return Err(ConfigValidationError::InvalidTimeout {
                field: "confirmation_timeout".to_string(),
                value,
                min: defaults::MIN_TIMEOUT_SECS,
                max: defaults::MAX_CONFIRMATION_TIMEOUT_SECS,
            });
        }
        Ok(())
    }

    fn validate_paths(
        &self,
        config: &ValidatedConfig,
        warnings: &mut Vec<String>,
        fixed_issues: &mut Vec<String>,
    ) -> Result<()> {
        if !config.disable_file_logging {
            self.ensure_directory_exists(&config.logs_path, "logs", fixed_issues)?;
        }

        if let Some(cache_dir) = &config.cache_dir {
            self.ensure_directory_exists(cache_dir, "cache", fixed_issues)?;
        }

        // A bare command name is looked up in PATH when compiling
        let solc = Path::new(&config.solc_path);
        if solc.components().count() > 1 && !solc.is_file() {
            let error = ConfigValidationError::InvalidPath {
                field: "solc_path".to_string(),
                path: config.solc_path.clone(),
                reason: "file not found".to_string(),
            };
            if self.strict_mode {
                return Err(anyhow!("Configuration validation failed: {}", error));
            }
            warnings.push(error.to_string());
        }

        Ok(())
    }

    fn ensure_directory_exists(
        &self,
        path: &str,
        dir_type: &str,
        fixed_issues: &mut Vec<String>,
    ) -> Result<()> {
        let path_buf = PathBuf::from(path);

        if !path_buf.exists() {
            std::fs::create_dir_all(&path_buf).map_err(|e| {
                anyhow!("Failed to create {} directory '{}': {}", dir_type, path, e)
            })?;
            fixed_issues.push(format!("Created {} directory: {}", dir_type, path));
        } else if !path_buf.is_dir() {
            return Err(anyhow!("Path '{}' exists but is not a directory", path));
        }

        Ok(())
    }
}

impl ValidatedConfig {
    /// Create RpcTransportConfig from validated settings
    pub fn to_transport_config(&self) -> RpcTransportConfig {
        RpcTransportConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connection_timeout: Duration::from_secs(self.connection_timeout_secs),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            poll_interval: Duration::from_millis(self.block_poll_interval_ms),
        }
    }

    pub fn to_run_options(&self, show_events: bool) -> RunOptions {
        RunOptions {
            gas_limit: self.gas_limit,
            test_prefix: self.test_prefix.clone(),
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
            show_events,
        }
    }

    pub fn compiler_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(crate::solc::default_cache_dir)
    }

    /// Validate and load configuration from file
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        strict_mode: bool,
        auto_fix: bool,
    ) -> Result<(Self, ValidationReport)> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            anyhow!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        let mut config: ValidatedConfig = serde_json::from_str(&content).map_err(|e| {
            anyhow!(
                "Failed to parse config file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        let validator = ConfigValidator::new(strict_mode, auto_fix);
        let report = validator.validate(&mut config)?;
        Ok((config, report))
    }

    /// Save validated configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        std::fs::write(&path, content).map_err(|e| {
            anyhow!(
                "Failed to write config file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        if log::log_enabled!(log::Level::Info) {
            info!("Configuration saved to: {}", path.as_ref().display());
        }
        Ok(())
    }

    /// Generate a configuration template filled with the default values
    pub fn generate_template<P: AsRef<Path>>(path: P) -> Result<()> {
        let mut template = serde_json::to_value(ValidatedConfig::default())?;
        if let Some(fields) = template.as_object_mut() {
            fields.insert(
                "_info".to_string(),
                serde_json::json!({
                    "description": "evmscript configuration",
                    "version": "1.0",
                    "sections": {
                        "logging": "Controls log output and file generation",
                        "node": "Connection settings for the JSON-RPC node",
                        "execution": "Gas limit, chain id, test prefix and confirmation timeout",
                        "compiler": "Path of the solc binary and of the build cache",
                        "validation": "Configuration validation behavior"
                    }
                }),
            );
        }

        std::fs::write(&path, serde_json::to_string_pretty(&template)?).map_err(|e| {
            anyhow!(
                "Failed to write template to '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        if log::log_enabled!(log::Level::Info) {
            info!(
                "Configuration template generated at: {}",
                path.as_ref().display()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_less() -> ValidatedConfig {
        ValidatedConfig {
            disable_file_logging: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let mut config = file_less();
        let report = ConfigValidator::new(true, false).validate(&mut config).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_auto_fix() {
        let mut config = ValidatedConfig {
            max_retries: 50,
            gas_limit: 10,
            test_prefix: " ".to_string(),
            ..file_less()
        };
        let report = ConfigValidator::new(false, true).validate(&mut config).unwrap();
        assert_eq!(report.fixed_issues.len(), 3);
        assert!(report.warnings.is_empty());
        assert!(report.fixed_issues[0].contains("max_retries"));
        assert_eq!(config.max_retries, defaults::MAX_RETRIES);
        assert_eq!(config.gas_limit, defaults::GAS_LIMIT);
        assert_eq!(config.test_prefix, defaults::TEST_PREFIX);
    }

    #[test]
    fn test_invalid_rpc_address_is_never_fixed() {
        for (strict, auto_fix) in [(false, true), (true, true), (false, false)] {
            let mut config = ValidatedConfig {
                rpc_address: "http://".to_string(),
                ..file_less()
            };
            let err = ConfigValidator::new(strict, auto_fix).validate(&mut config).unwrap_err();
            assert!(err.to_string().contains("Invalid RPC address"));
            assert_eq!(config.rpc_address, "http://");
        }
    }

    #[test]
    fn test_warnings_reported() {
        let mut config = ValidatedConfig {
            solc_path: "/nonexistent/bin/solc".to_string(),
            ..file_less()
        };
        let report = ConfigValidator::new(false, true).validate(&mut config).unwrap();
        assert!(report.fixed_issues.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("solc_path"));
    }

    #[test]
    fn test_strict_mode_rejects() {
        let mut config = ValidatedConfig {
            request_timeout_secs: 0,
            ..file_less()
        };
        assert!(ConfigValidator::new(true, true).validate(&mut config).is_err());
        assert!(ConfigValidator::new(false, false).validate(&mut config).is_err());
    }

    #[test]
    fn test_template_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        ValidatedConfig::generate_template(&path).unwrap();

        // unknown fields such as `_info` are ignored
        let config: ValidatedConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.gas_limit, 4_700_000);
        assert_eq!(config.rpc_address, "http://127.0.0.1:8545");
        assert!(config.chain_id.is_none());
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"rpc_address": "localhost:7545", "chain_id": 1337, "disable_file_logging": true,
                "file_log_date_based": true, "logs_modules": [{"module": "reqwest", "level": "warn"}]}"#,
        )
        .unwrap();

        let (config, report) = ValidatedConfig::from_file(&path, false, true).unwrap();
        assert!(report.is_empty());
        assert_eq!(config.chain_id, Some(1337));
        assert!(config.file_log_date_based);
        assert_eq!(config.logs_modules[0].module, "reqwest");
        assert_eq!(config.logs_modules[0].level, LogLevel::Warn);
        assert_eq!(config.rpc_address, "localhost:7545");
        assert_eq!(config.confirmation_timeout_secs, defaults::CONFIRMATION_TIMEOUT_SECS);

        let transport = config.to_transport_config();
        assert_eq!(transport.poll_interval, Duration::from_millis(1000));
    }
}
