use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ethers::utils::parse_ether;
use log::{error, info};
use serde_json::Value;

use evmscript::{
    runner::write_preload,
    script::parse_var_definition,
    solc::load_contracts,
    wallet::unlock_wallet,
    AddressTable, ConfigValidator, ContractArtifact, ContractCompiler, ContractRegistry,
    LocalSigner, RawStep, RpcTransport, RunContext, ScriptFile, SolcCompiler, StepGroup, StepKind,
    StepRunner, Transport, ValidatedConfig, VariableTable,
};
use evmscript_common::{
    config::VERSION,
    crypto::parse_address,
    get_cli_styles,
    logger::{init_logger, LogLevel, LoggerConfig, ModuleConfig, DEFAULT_LOGS_DATETIME_FORMAT},
    utils::format_address,
};

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Run a script file
    Script(ScriptArgs),
    /// Compile a contract and print its interface
    Abi {
        /// Contract source file
        file: PathBuf,
    },
    /// Compile a contract and print its unlinked bytecode
    Bin {
        /// Contract source file
        file: PathBuf,
    },
    /// Compile and deploy a contract
    Deploy {
        /// Contract source file
        file: PathBuf,
        /// Private key to send the transaction from
        #[clap(long)]
        private_key: String,
        /// Constructor arguments
        args: Vec<String>,
    },
    /// Send ether to an address
    Send {
        /// Amount in ether, e.g. 1.5
        amount: String,
        /// Address to send the ether to
        #[clap(long)]
        to: String,
        /// Private key to send the transaction from
        #[clap(long)]
        private_key: String,
    },
}

#[derive(Args, Clone, Debug)]
pub struct ScriptArgs {
    /// Script file to execute
    script: PathBuf,

    /// Set a script variable, repeatable: --var NAME=VALUE
    #[clap(long = "var", value_name = "NAME=VALUE", value_parser = parse_var_definition)]
    vars: Vec<(String, Value)>,

    /// Keystore file of the wallet to unlock
    #[clap(long)]
    wallet_file: Option<PathBuf>,

    /// Password of the keystore file
    #[clap(long)]
    wallet_password: Option<String>,

    /// Print the hash of every transaction sent
    #[clap(long)]
    show_transactions: bool,

    /// Print the events emitted by every call
    #[clap(long)]
    show_events: bool,

    /// Write a preload file of the deployed contracts once the script succeeded
    #[clap(long)]
    preload: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(name = "evmscript")]
#[command(version = VERSION, about = "Run contract deployment and test scripts against an EVM node", styles = get_cli_styles())]
pub struct CliConfig {
    #[command(subcommand)]
    command: Option<Command>,

    /// Set log level
    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Set file log level, same as log level when not set
    #[clap(long, value_enum)]
    file_log_level: Option<LogLevel>,

    /// Disable the log file
    #[clap(long)]
    disable_file_logging: bool,

    /// Prefix the log file with the date and rotate it every day
    #[clap(long)]
    file_log_date_based: bool,

    /// Disable the usage of colors in log
    #[clap(long)]
    disable_log_color: bool,

    /// Log filename
    #[clap(long, default_value_t = String::from("evmscript.log"))]
    filename_log: String,

    /// Logs directory
    #[clap(long, default_value_t = String::from("logs/"))]
    logs_path: String,

    /// Log level of a module, repeatable: --logs-modules reqwest=warn
    #[clap(long, value_name = "MODULE=LEVEL")]
    logs_modules: Vec<ModuleConfig>,

    /// JSON-RPC address of the node, `host:port` or full URL
    #[clap(long, default_value_t = String::from(evmscript_common::config::DEFAULT_RPC_ADDRESS))]
    rpc_address: String,

    /// Chain id used for signing, queried from the node when not set
    #[clap(long)]
    chain_id: Option<u64>,

    /// Gas limit of every transaction
    #[clap(long, default_value_t = evmscript_common::config::DEFAULT_GAS_LIMIT)]
    gas_limit: u64,

    /// Prefix of the methods run by test steps
    #[clap(long, default_value_t = String::from(evmscript_common::config::DEFAULT_TEST_PREFIX))]
    test_prefix: String,

    /// Seconds allowed for the transactions of a step to be mined
    #[clap(long, default_value_t = evmscript_common::config::DEFAULT_CONFIRMATION_TIMEOUT_SECS)]
    confirmation_timeout_secs: u64,

    /// Path of the solc binary
    #[clap(long, default_value_t = String::from(evmscript::solc::DEFAULT_SOLC_PATH))]
    solc_path: String,

    /// Directory of the compiler cache
    #[clap(long)]
    cache_dir: Option<String>,

    /// Advanced: Request timeout in seconds
    #[clap(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Advanced: Connection timeout in seconds
    #[clap(long, default_value_t = 10)]
    connection_timeout_secs: u64,

    /// Advanced: Maximum number of retries
    #[clap(long, default_value_t = 3)]
    max_retries: u32,

    /// Advanced: Retry delay in milliseconds
    #[clap(long, default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Advanced: Interval between two new block polls in milliseconds
    #[clap(long, default_value_t = evmscript_common::config::DEFAULT_BLOCK_POLL_INTERVAL_MS)]
    block_poll_interval_ms: u64,

    /// Enable strict configuration validation
    #[clap(long)]
    strict_validation: bool,

    /// Disable auto-fix of configuration issues
    #[clap(long)]
    no_auto_fix: bool,

    /// JSON File to load the configuration from
    #[clap(long)]
    config_file: Option<String>,

    /// Generate the template at the `config_file` path
    #[clap(long)]
    generate_config_template: bool,
}

impl CliConfig {
    /// Convert CLI configuration to ValidatedConfig
    pub fn to_validated_config(&self) -> ValidatedConfig {
        ValidatedConfig {
            log_level: self.log_level,
            file_log_level: self.file_log_level,
            disable_file_logging: self.disable_file_logging,
            disable_log_color: self.disable_log_color,
            filename_log: self.filename_log.clone(),
            logs_path: self.logs_path.clone(),
            file_log_date_based: self.file_log_date_based,
            logs_modules: self.logs_modules.clone(),
            rpc_address: self.rpc_address.clone(),
            request_timeout_secs: self.request_timeout_secs,
            connection_timeout_secs: self.connection_timeout_secs,
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
            block_poll_interval_ms: self.block_poll_interval_ms,
            confirmation_timeout_secs: self.confirmation_timeout_secs,
            gas_limit: self.gas_limit,
            chain_id: self.chain_id,
            test_prefix: self.test_prefix.clone(),
            solc_path: self.solc_path.clone(),
            cache_dir: self.cache_dir.clone(),
            auto_fix_config: !self.no_auto_fix,
            strict_validation: self.strict_validation,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_config = CliConfig::parse();

    // Handle config template generation
    if let Some(path) = cli_config.config_file.as_ref() {
        if cli_config.generate_config_template {
            if Path::new(path).exists() {
                eprintln!("Config file already exists at {path}");
                eprintln!("Use a different path or remove the existing file");
                return Ok(());
            }

            ValidatedConfig::generate_template(path)?;
            println!("Configuration template generated at {path}");
            println!("Edit the file and run the script with --config-file {path}");
            return Ok(());
        }
    }

    // Load and validate configuration
    let (config, validation) = if let Some(config_path) = &cli_config.config_file {
        ValidatedConfig::from_file(
            config_path,
            cli_config.strict_validation,
            !cli_config.no_auto_fix,
        )?
    } else {
        let mut config = cli_config.to_validated_config();
        let validator = ConfigValidator::new(config.strict_validation, config.auto_fix_config);
        let validation = validator.validate(&mut config)?;
        (config, validation)
    };

    init_logger(LoggerConfig {
        level: config.log_level,
        file_level: config.file_log_level,
        dir_path: &config.logs_path,
        filename_log: &config.filename_log,
        disable_file_logging: config.disable_file_logging,
        date_based_file: config.file_log_date_based,
        disable_colors: config.disable_log_color,
        module_logs: config.logs_modules.clone(),
        datetime_format: DEFAULT_LOGS_DATETIME_FORMAT,
    })?;
    validation.log();

    let Some(command) = cli_config.command else {
        bail!("No command given, see --help");
    };

    if log::log_enabled!(log::Level::Info) {
        info!("evmscript v{}", VERSION);
    }

    match run(command, &config).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("\nError: {:#}", e);
            std::process::exit(1);
        }
    }
}

// Returns false when a step failed, the report being printed already
async fn run(command: Command, config: &ValidatedConfig) -> Result<bool> {
    match command {
        Command::Script(args) => run_script(args, config).await,
        Command::Abi { file } => {
            let artifact = compile(config, &file).await?;
            println!("{}", artifact.abi_json);
            Ok(true)
        }
        Command::Bin { file } => {
            let artifact = compile(config, &file).await?;
            println!("{}", artifact.bytecode);
            Ok(true)
        }
        Command::Deploy {
            file,
            private_key,
            args,
        } => deploy(config, &file, private_key, args).await,
        Command::Send {
            amount,
            to,
            private_key,
        } => send(config, &amount, &to, &private_key).await,
    }
}

fn compiler(config: &ValidatedConfig) -> SolcCompiler {
    SolcCompiler::new(&config.solc_path, config.compiler_cache_dir())
}

async fn compile(config: &ValidatedConfig, file: &Path) -> Result<ContractArtifact> {
    compiler(config)
        .compile(file)
        .await
        .with_context(|| format!("Failed compiling {}", file.display()))
}

// Connect to the node and find the chain id to sign for
async fn step_runner(config: &ValidatedConfig, show_events: bool) -> Result<StepRunner> {
    let transport = Arc::new(RpcTransport::with_config(
        &config.rpc_address,
        config.to_transport_config(),
    )?);
    let chain_id = match config.chain_id {
        Some(chain_id) => chain_id,
        None => transport
            .get_chain_id()
            .await
            .with_context(|| format!("Failed querying chain id from {}", transport.url()))?,
    };
    info!("Using chain id {} on {}", chain_id, transport.url());

    Ok(StepRunner::new(
        transport,
        Arc::new(LocalSigner::new(chain_id)),
        config.to_run_options(show_events),
    ))
}

async fn run_script(args: ScriptArgs, config: &ValidatedConfig) -> Result<bool> {
    let script_path = args.script.as_path();
    info!("Running {}", script_path.display());
    let mut script = ScriptFile::load(script_path)
        .await
        .with_context(|| format!("Failed loading script {}", script_path.display()))?;
    script.merge_vars(args.vars.iter().cloned().collect());

    if let Some(wallet_file) = &args.wallet_file {
        let password = args
            .wallet_password
            .as_deref()
            .ok_or_else(|| anyhow!("A password is required to unlock {}", wallet_file.display()))?;
        unlock_wallet(wallet_file, password, &mut script.vars)?;
    }

    let script_dir = script_path.parent().unwrap_or_else(|| Path::new("."));
    let registry = load_contracts(&compiler(config), &script.contract_paths(script_dir)).await?;
    info!("{} contract(s) loaded", registry.len());

    let addresses = script.address_table()?;
    let runner = step_runner(config, args.show_events).await?;
    let mut ctx = RunContext::new(script.vars, addresses, registry);
    let report = runner.run(&mut ctx, script.steps).await;

    report.print(args.show_transactions);
    if let Some(e) = &report.error {
        eprintln!("\nError: {}", e);
    }
    report.print_test_results();

    if !report.success() {
        return Ok(false);
    }

    if let Some(preload) = &args.preload {
        let count = write_preload(preload, &ctx.addresses, &ctx.registry).await?;
        println!("\n{} contract(s) written to {}", count, preload.display());
    }

    Ok(true)
}

async fn deploy(
    config: &ValidatedConfig,
    file: &Path,
    private_key: String,
    args: Vec<String>,
) -> Result<bool> {
    let artifact = compile(config, file).await?;
    let name = artifact.name.clone();
    let step = RawStep {
        kind: StepKind::Deploy,
        key: Value::String(private_key),
        contract: name.clone(),
        method: None,
        args: Some(Value::Array(args.into_iter().map(Value::String).collect())),
        value: None,
        address: None,
        alias: None,
    };

    let runner = step_runner(config, false).await?;
    let registry: ContractRegistry = std::iter::once(artifact).collect();
    let mut ctx = RunContext::new(VariableTable::new(), AddressTable::new(), registry);
    let report = runner.run(&mut ctx, vec![StepGroup::Single(step)]).await;

    report.print(true);
    if let Some(e) = &report.error {
        eprintln!("\nError: {}", e);
        return Ok(false);
    }

    if let Some(address) = ctx.addresses.get(&name) {
        println!("\nAddress:\n{}", format_address(address));
    }
    Ok(true)
}

async fn send(config: &ValidatedConfig, amount: &str, to: &str, private_key: &str) -> Result<bool> {
    let to = parse_address(to).with_context(|| format!("Invalid recipient {}", to))?;
    let value = parse_ether(amount).with_context(|| format!("Invalid amount {}", amount))?;

    let runner = step_runner(config, false).await?;
    let mut ctx = RunContext::default();
    let report = runner.send(&mut ctx, private_key, to, value).await;

    report.print(true);
    if let Some(e) = &report.error {
        eprintln!("\nError: {}", e);
        return Ok(false);
    }
    Ok(true)
}
