// crates/ad-serving-cli/src/main.rs
// ============================================================================
// Module: Ad Serving CLI Entry Point
// Description: Command dispatcher for config validation and serving simulation.
// Purpose: Provide a safe CLI for offline ad serving workflows.
// Dependencies: clap, ad-serving-config, ad-serving-core, ad-serving-redemption
// ============================================================================

//! ## Overview
//! The `ad-serving` CLI validates configuration files and runs offline
//! serving simulations against a JSON candidate catalog. Simulation output
//! is written to stdout as JSON lines; errors go to stderr with a failure
//! exit code. Input files are untrusted and read with hard size limits.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub(crate) mod simulate;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use ad_serving_config::AdServingConfig;
use ad_serving_core::Candidate;
use ad_serving_core::ClientState;
use ad_serving_core::Clock;
use ad_serving_core::InMemoryArmStore;
use ad_serving_core::JsonFileArmStore;
use ad_serving_core::RedemptionTransport;
use ad_serving_core::SystemClock;
use ad_serving_core::Timestamp;
use ad_serving_redemption::HttpRedemptionTransport;
use ad_serving_redemption::HttpTransportConfig;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::simulate::Engagement;
use crate::simulate::SimulationOptions;
use crate::simulate::run_simulation;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum catalog file size in bytes.
const MAX_CATALOG_BYTES: usize = 8 * 1024 * 1024;
/// Maximum client state file size in bytes.
const MAX_CLIENT_STATE_BYTES: usize = 1024 * 1024;
/// Maximum number of simulated opportunities.
const MAX_OPPORTUNITIES: u32 = 100_000;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "ad-serving", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected command.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Run an offline serving simulation.
    Simulate(SimulateCommand),
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate an ad serving configuration file.
    Validate(ConfigArgs),
    /// Print the serving parameters a configuration resolves to.
    Params(ConfigArgs),
}

/// Arguments shared by config subcommands.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Config file path (defaults to `AD_SERVING_CONFIG` or `ad-serving.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `simulate`.
#[derive(Args, Debug)]
struct SimulateCommand {
    /// Config file path; built-in defaults are used when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// JSON array of candidates.
    #[arg(long, value_name = "PATH")]
    catalog: PathBuf,
    /// Optional JSON client state.
    #[arg(long, value_name = "PATH")]
    client_state: Option<PathBuf>,
    /// Number of serving opportunities.
    #[arg(long, default_value_t = 10)]
    opportunities: u32,
    /// Seed for pacing and bandit draws.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Unix seconds of the first opportunity (defaults to now).
    #[arg(long, value_name = "SECS")]
    start_unix: Option<i64>,
    /// Seconds between opportunities.
    #[arg(long, default_value_t = 900)]
    interval_secs: u64,
    /// Synthetic engagement applied to served ads.
    #[arg(long, value_enum, default_value_t = Engagement::None)]
    engagement: Engagement,
    /// Send confirmations to the configured redemption hosts.
    #[arg(long)]
    redeem: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
pub(crate) struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    pub(crate) const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
pub(crate) type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate(args) => command_config_validate(&args),
            ConfigCommand::Params(args) => command_config_params(&args),
        },
        Commands::Simulate(command) => command_simulate(&command),
    }
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Loads configuration from an explicit or resolved path.
fn load_config(path: Option<&Path>) -> CliResult<AdServingConfig> {
    AdServingConfig::load(path)
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Executes `config validate`.
fn command_config_validate(args: &ConfigArgs) -> CliResult<ExitCode> {
    let _config = load_config(args.config.as_deref())?;
    write_stdout_line("config ok")?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `config params`.
fn command_config_params(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let json = serde_json::to_string_pretty(&config.serving_params())
        .map_err(|err| CliError::new(format!("failed to serialize params: {err}")))?;
    write_stdout_line(&json)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Simulate Command
// ============================================================================

/// Executes `simulate`.
fn command_simulate(command: &SimulateCommand) -> CliResult<ExitCode> {
    if command.opportunities > MAX_OPPORTUNITIES {
        return Err(CliError::new(format!(
            "opportunities exceeds limit of {MAX_OPPORTUNITIES}"
        )));
    }
    let config = match &command.config {
        Some(path) => load_config(Some(path))?,
        None => AdServingConfig::default(),
    };
    let catalog: Vec<Candidate> = read_json(&command.catalog, MAX_CATALOG_BYTES, "catalog")?;
    let client = match &command.client_state {
        Some(path) => read_json::<ClientState>(path, MAX_CLIENT_STATE_BYTES, "client state")?,
        None => ClientState::default(),
    };
    let options = SimulationOptions {
        opportunities: command.opportunities,
        seed: command.seed,
        start: command.start_unix.map_or_else(|| SystemClock.now(), Timestamp::from_unix_secs),
        interval: Duration::from_secs(command.interval_secs),
        engagement: command.engagement,
        client,
    };
    let http = if command.redeem { Some(build_transport(&config)?) } else { None };
    let transport = http.as_ref().map(|transport| transport as &dyn RedemptionTransport);
    let mut stdout = std::io::stdout().lock();
    match &config.bandit.arm_store_path {
        Some(path) => run_simulation(
            &config,
            catalog,
            JsonFileArmStore::new(path.clone()),
            &options,
            transport,
            &mut stdout,
        )?,
        None => {
            run_simulation(&config, catalog, InMemoryArmStore::new(), &options, transport, &mut stdout)?
        }
    };
    Ok(ExitCode::SUCCESS)
}

/// Builds the HTTP transport from the redemption config.
fn build_transport(config: &AdServingConfig) -> CliResult<HttpRedemptionTransport> {
    HttpRedemptionTransport::new(HttpTransportConfig {
        timeout: Duration::from_millis(config.redemption.timeout_ms),
        max_response_bytes: config.redemption.max_response_bytes,
        allow_http: config.redemption.allow_http,
        ..HttpTransportConfig::default()
    })
    .map_err(|err| CliError::new(format!("failed to build transport: {err}")))
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Errors returned by bounded file reads.
#[derive(Debug)]
enum ReadLimitError {
    /// File I/O failure.
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Reads and parses a size-limited JSON file.
fn read_json<T: DeserializeOwned>(path: &Path, max_bytes: usize, label: &str) -> CliResult<T> {
    let bytes = read_bytes_with_limit(path, max_bytes).map_err(|err| match err {
        ReadLimitError::Io(err) => {
            CliError::new(format!("failed to read {label} {}: {err}", path.display()))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "{label} {} is {size} bytes, exceeding the {limit} byte limit",
            path.display()
        )),
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|err| CliError::new(format!("invalid {label} {}: {err}", path.display())))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
