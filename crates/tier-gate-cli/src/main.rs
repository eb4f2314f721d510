// crates/tier-gate-cli/src/main.rs
// ============================================================================
// Module: Tier Gate CLI Entry Point
// Description: Command dispatcher for permission checks and policy admin.
// Purpose: Expose the permission engine to operators and scripts.
// Dependencies: clap, serde, serde_jcs, thiserror, tier-gate-cli, tier-gate-config
// ============================================================================

//! ## Overview
//! The Tier Gate CLI wires an engine from `tier-gate.toml` and runs one
//! command against it. Results are written to stdout as canonical JSON;
//! failures are written to stderr with a non-zero exit code. Input files are
//! untrusted and read with a hard size limit.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use thiserror::Error;
use tier_gate_cli::Engine;
use tier_gate_config::TierGateConfig;
use tier_gate_config::config_toml_example;
use tier_gate_core::CheckRequest;
use tier_gate_core::PolicyMutation;
use tier_gate_core::core::policy::MAX_MUTATION_BATCH;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a mutation batch JSON input.
const MAX_MUTATION_FILE_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "tier-gate", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a subject may perform an action now.
    Check(CheckCommand),
    /// Describe the effective permission matrix of a tier.
    Describe(DescribeCommand),
    /// Apply a batch of policy mutations through the admin gateway.
    Apply(ApplyCommand),
    /// Delete usage counters whose windows have closed.
    Prune(ConfigArgs),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments shared by commands that load configuration.
#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// Optional config file path (defaults to tier-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `check`.
#[derive(Args, Debug)]
struct CheckCommand {
    /// Subject whose usage is counted.
    #[arg(long, value_name = "SUBJECT")]
    subject: String,
    /// Tier name.
    #[arg(long, value_name = "TIER")]
    tier: String,
    /// Feature name.
    #[arg(long, value_name = "FEATURE")]
    feature: String,
    /// Optional sub-feature name.
    #[arg(long = "sub-feature", value_name = "SUB_FEATURE")]
    sub_feature: Option<String>,
    /// Action name.
    #[arg(long, value_name = "ACTION")]
    action: String,
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
}

/// Arguments for `describe`.
#[derive(Args, Debug)]
struct DescribeCommand {
    /// Tier name.
    #[arg(long, value_name = "TIER")]
    tier: String,
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
}

/// Arguments for `apply`.
#[derive(Args, Debug)]
struct ApplyCommand {
    /// Path to a JSON array of policy mutations.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
    /// Config selection.
    #[command(flatten)]
    config: ConfigArgs,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a Tier Gate configuration file.
    Validate(ConfigArgs),
    /// Print a canonical example configuration.
    Example,
}

/// Summary written after a successful `apply`.
#[derive(Debug, Serialize)]
struct ApplyReport {
    /// Number of mutations applied.
    applied: usize,
    /// Whether caches were told to reload.
    invalidated: bool,
}

/// Summary written after a successful `prune`.
#[derive(Debug, Serialize)]
struct PruneReport {
    /// Number of counters removed.
    pruned: u64,
}

/// Summary written after a successful `config validate`.
#[derive(Debug, Serialize)]
struct ConfigReport {
    /// Validation status label.
    status: &'static str,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing error messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Errors raised while reading a size-limited file.
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

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Check(command) => command_check(&command),
        Commands::Describe(command) => command_describe(&command),
        Commands::Apply(command) => command_apply(&command),
        Commands::Prune(args) => command_prune(&args),
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate(args) => command_config_validate(&args),
            ConfigCommand::Example => command_config_example(),
        },
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `check`.
fn command_check(command: &CheckCommand) -> CliResult<ExitCode> {
    let engine = load_engine(&command.config)?;
    let decision = engine
        .service
        .check(CheckRequest {
            subject_id: &command.subject,
            tier: &command.tier,
            feature: &command.feature,
            sub_feature: command.sub_feature.as_deref(),
            action: &command.action,
        })
        .map_err(|err| CliError::new(format!("permission check failed: {err}")))?;
    write_canonical_json(&decision)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `describe`.
fn command_describe(command: &DescribeCommand) -> CliResult<ExitCode> {
    let engine = load_engine(&command.config)?;
    let view = engine
        .service
        .describe_tier(&command.tier)
        .map_err(|err| CliError::new(format!("describe failed: {err}")))?;
    write_canonical_json(&view)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `apply`.
fn command_apply(command: &ApplyCommand) -> CliResult<ExitCode> {
    let mutations = read_mutations(&command.file)?;
    let engine = load_engine(&command.config)?;
    engine
        .gateway
        .apply(&mutations)
        .map_err(|err| CliError::new(format!("policy mutation rejected: {err}")))?;
    write_canonical_json(&ApplyReport {
        applied: mutations.len(),
        invalidated: true,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `prune`.
fn command_prune(args: &ConfigArgs) -> CliResult<ExitCode> {
    let engine = load_engine(args)?;
    let pruned = engine
        .service
        .prune_expired_counters()
        .map_err(|err| CliError::new(format!("counter pruning failed: {err}")))?;
    write_canonical_json(&PruneReport {
        pruned,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `config validate`.
fn command_config_validate(args: &ConfigArgs) -> CliResult<ExitCode> {
    load_config(args)?;
    write_canonical_json(&ConfigReport {
        status: "ok",
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `config example`.
fn command_config_example() -> CliResult<ExitCode> {
    let mut stdout = std::io::stdout();
    write!(&mut stdout, "{}", config_toml_example())
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates configuration.
fn load_config(args: &ConfigArgs) -> CliResult<TierGateConfig> {
    TierGateConfig::load(args.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Loads configuration and wires an engine.
fn load_engine(args: &ConfigArgs) -> CliResult<Engine> {
    let config = load_config(args)?;
    Engine::from_config(&config)
        .map_err(|err| CliError::new(format!("failed to initialize engine: {err}")))
}

/// Reads and parses a mutation batch file.
fn read_mutations(path: &Path) -> CliResult<Vec<PolicyMutation>> {
    let bytes = read_bytes_with_limit(path, MAX_MUTATION_FILE_BYTES).map_err(|err| match err {
        ReadLimitError::Io(err) => CliError::new(format!(
            "failed to read mutations from {}: {err}",
            path.display()
        )),
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "mutations file {} is too large ({size} bytes > {limit} bytes)",
            path.display()
        )),
    })?;
    parse_mutations(&bytes)
        .map_err(|err| CliError::new(format!("invalid mutations in {}: {err}", path.display())))
}

/// Parses a JSON array of policy mutations.
fn parse_mutations(bytes: &[u8]) -> Result<Vec<PolicyMutation>, String> {
    let mutations: Vec<PolicyMutation> =
        serde_json::from_slice(bytes).map_err(|err| err.to_string())?;
    if mutations.is_empty() {
        return Err("mutation batch is empty".to_string());
    }
    if mutations.len() > MAX_MUTATION_BATCH {
        return Err(format!("mutation batch exceeds {MAX_MUTATION_BATCH} entries"));
    }
    Ok(mutations)
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let metadata = file.metadata().map_err(ReadLimitError::Io)?;
    let size = metadata.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        let actual = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        return Err(ReadLimitError::TooLarge {
            size: actual,
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Writes canonical JSON to stdout with a trailing newline.
fn write_canonical_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = serde_jcs::to_vec(value)
        .map_err(|err| CliError::new(format!("failed to serialize output: {err}")))?;
    bytes.push(b'\n');
    let mut stdout = std::io::stdout();
    stdout.write_all(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Writes one line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
