// crates/tvws-cli/src/main.rs
// ============================================================================
// Module: TVWS CLI Entry Point
// Description: Command dispatcher for the TVWS database service and tooling.
// Purpose: Run the PAWS server, seed stores, and poll partner exports.
// Dependencies: clap, tvws-config, tvws-core, tvws-paws, thiserror, tokio
// ============================================================================

//! ## Overview
//! `tvws serve` loads every incumbent dataset and then serves PAWS over
//! HTTP. `tvws import` seeds the configured store from a JSON bundle, and
//! `tvws sync` is the inter-database poller that re-imports a partner export
//! whenever it changes. Inputs are untrusted: bundle reads are size-bounded
//! and configs are validated before use.


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use thiserror::Error;
use tvws_cli::import::ImportBundle;
use tvws_cli::import::ImportMode;
use tvws_cli::import::SyncPoller;
use tvws_cli::import::import_bundle;
use tvws_config::StoreType;
use tvws_config::TvwsConfig;
use tvws_config::config_toml_example;
use tvws_core::Clock;
use tvws_core::SharedIncumbentStore;
use tvws_core::SystemClock;
use tvws_paws::PawsServer;
use tvws_paws::build_incumbent_store;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "tvws", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the PAWS server.
    Serve(ServeCommand),
    /// Import a JSON bundle into the configured store.
    Import(ImportCommand),
    /// Poll a partner export and re-import it when it changes.
    Sync(SyncCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to tvws.toml or `TVWS_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `import`.
#[derive(Args, Debug)]
struct ImportCommand {
    /// Optional config file path (defaults to tvws.toml or `TVWS_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// JSON bundle to import.
    #[arg(long, value_name = "FILE")]
    file: PathBuf,
}

/// Arguments for `sync`.
#[derive(Args, Debug)]
struct SyncCommand {
    /// Optional config file path (defaults to tvws.toml or `TVWS_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Partner export to watch.
    #[arg(long, value_name = "FILE")]
    file: PathBuf,
    /// Seconds between polls.
    #[arg(long, value_name = "SECS", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    interval_secs: u64,
    /// Poll once and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    once: bool,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a TVWS configuration file.
    Validate(ConfigValidateCommand),
    /// Print an annotated example configuration.
    Example,
}

/// Arguments for config validation.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path (defaults to tvws.toml or `TVWS_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        write_stdout_line(&format!("tvws {}", env!("CARGO_PKG_VERSION")))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        write_stdout_line("usage: tvws <serve|import|sync|config> [options]; see --help")?;
        return Ok(ExitCode::SUCCESS);
    };
    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Import(command) => command_import(command).await,
        Commands::Sync(command) => command_sync(command).await,
        Commands::Config { command } => command_config(command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_ref())?;
    let reload_path = config_reload_path(command.config);
    let server = tokio::task::spawn_blocking(move || PawsServer::from_config(config, reload_path))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Path the server re-reads refresh intervals from, when one is known.
fn config_reload_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| std::env::var_os("TVWS_CONFIG").map(PathBuf::from))
        .or_else(|| {
            let default = PathBuf::from("tvws.toml");
            default.exists().then_some(default)
        })
}

// ============================================================================
// SECTION: Import and Sync Commands
// ============================================================================

/// Executes the `import` command.
async fn command_import(command: ImportCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_ref())?;
    let store = open_persistent_store(&config)?;
    let path = command.file;
    let report = tokio::task::spawn_blocking(move || {
        let bundle = ImportBundle::read(&path)?;
        import_bundle(&store, &bundle, ImportMode::Seed, SystemClock.now())
    })
    .await
    .map_err(|err| CliError::new(format!("import failed: join failed: {err}")))?
    .map_err(|err| CliError::new(format!("import failed: {err}")))?;
    write_json_line(&report)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `sync` command.
async fn command_sync(command: SyncCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_ref())?;
    let store = open_persistent_store(&config)?;
    let mut poller = SyncPoller::new(command.file);
    let mut ticker = tokio::time::interval(Duration::from_secs(command.interval_secs));
    loop {
        ticker.tick().await;
        let task_store = store.clone();
        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = poller.poll_once(&task_store, SystemClock.now());
            (poller, result)
        })
        .await
        .map_err(|err| CliError::new(format!("sync failed: join failed: {err}")))?;
        poller = returned;
        match result {
            Ok(Some(report)) => write_json_line(&report)?,
            Ok(None) => {}
            Err(err) if command.once => {
                return Err(CliError::new(format!("sync failed: {err}")));
            }
            Err(err) => write_stderr_line(&format!(
                "sync of {} failed, retrying next poll: {err}",
                poller.path().display()
            ))?,
        }
        if command.once {
            return Ok(ExitCode::SUCCESS);
        }
    }
}

/// Opens the configured store, refusing the non-persistent memory store.
fn open_persistent_store(config: &TvwsConfig) -> CliResult<SharedIncumbentStore> {
    if config.store.store_type == StoreType::Memory {
        return Err(CliError::new(
            "the memory store does not persist; configure [store] type = \"sqlite\"",
        ));
    }
    build_incumbent_store(&config.store).map_err(|err| CliError::new(err.to_string()))
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => {
            let _config = load_config(command.config.as_ref())?;
            write_stdout_line("config ok")?;
        }
        ConfigCommand::Example => write_stdout_line(&config_toml_example())?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Loads and validates a config file.
fn load_config(path: Option<&PathBuf>) -> CliResult<TvwsConfig> {
    TvwsConfig::load(path.map(PathBuf::as_path))
        .map_err(|err| CliError::new(format!("config load failed: {err}")))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(format!("failed to write to stdout: {err}")))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> CliResult<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
        .map_err(|err| CliError::new(format!("failed to write to stderr: {err}")))
}

/// Writes a value as one JSON line to stdout.
fn write_json_line<T: Serialize>(value: &T) -> CliResult<()> {
    let line = serde_json::to_string(value)
        .map_err(|err| CliError::new(format!("failed to render output: {err}")))?;
    write_stdout_line(&line)
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
