//! Operator CLI
//!
//! Every command prints a one-line result and maps its outcome to an exit
//! code:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | operation failed |
//! | 2 | configuration invalid |
//! | 3 | unsupported platform |

use crate::core::{AgentError, AgentSettings, ConfigError, ConfigStore};
use crate::printing::{DeadLetterLog, ReprintSpool};
use crate::supervisor::{ServiceError, ServiceSpec, Supervisor, platform_backend};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use shared::LocationConfig;
use shared::models::location::DEFAULT_POLL_INTERVAL_MS;
use shared::util::millis_to_rfc3339;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
pub const EXIT_CONFIG_INVALID: u8 = 2;
pub const EXIT_UNSUPPORTED: u8 = 3;

/// Crab print agent - prints incoming orders on the location's receipt printer
#[derive(Debug, Parser)]
#[command(name = "crab-print-agent")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Agent state directory (location config, queue, logs)
    #[arg(long, global = true, env = "WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(AgentSettings::default_work_dir)
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write the location config
    Setup(SetupArgs),
    /// Register the agent as an OS service
    Install,
    /// Start the registered service
    Start,
    /// Stop the registered service
    Stop,
    /// Stop and remove the registered service
    Uninstall,
    /// Show service and config state
    Status,
    /// List orders that could not be printed
    DeadLetters,
    /// Queue a dead-lettered order for printing again
    Reprint(ReprintArgs),
    /// Run the agent in the foreground (service entry point)
    #[command(hide = true)]
    Run,
}

#[derive(Debug, Args)]
pub struct SetupArgs {
    #[arg(long)]
    pub location_id: String,
    #[arg(long)]
    pub location_name: String,
    /// Central order service base URL
    #[arg(long)]
    pub server_url: String,
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
    /// `tcp://host:port`, `host:port`, or an OS printer queue name
    #[arg(long)]
    pub printer: String,
}

#[derive(Debug, Args)]
pub struct ReprintArgs {
    pub order_number: u64,
}

/// Exit code for a failed command
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<AgentError>() {
            return match e {
                AgentError::Service(ServiceError::Unsupported(_)) => EXIT_UNSUPPORTED,
                e if e.is_config() => EXIT_CONFIG_INVALID,
                _ => EXIT_FAILED,
            };
        }
        if let Some(e) = cause.downcast_ref::<ServiceError>() {
            return match e {
                ServiceError::Unsupported(_) => EXIT_UNSUPPORTED,
                ServiceError::NotInstalled(_) => EXIT_CONFIG_INVALID,
                _ => EXIT_FAILED,
            };
        }
        if cause.is::<ConfigError>() {
            return EXIT_CONFIG_INVALID;
        }
    }
    EXIT_FAILED
}

// ========== Commands ==========

/// Run a one-shot operator command, returning its result line
pub fn execute(command: &Commands, settings: &AgentSettings) -> Result<String> {
    match command {
        Commands::Setup(args) => setup(args, settings),
        Commands::Install => install(settings),
        Commands::Start => {
            let spec = service_spec(settings)?;
            let name = spec.name.clone();
            platform_backend(spec)?.start()?;
            Ok(format!("Started {name}"))
        }
        Commands::Stop => {
            let spec = service_spec(settings)?;
            let name = spec.name.clone();
            platform_backend(spec)?.stop()?;
            Ok(format!("Stopped {name}"))
        }
        Commands::Uninstall => {
            let spec = service_spec(settings)?;
            let name = spec.name.clone();
            platform_backend(spec)?.uninstall()?;
            Ok(format!("Uninstalled {name}"))
        }
        Commands::Status => status(settings),
        Commands::DeadLetters => dead_letters(settings),
        Commands::Reprint(args) => reprint(args.order_number, settings),
        Commands::Run => bail!("`run` is handled by the service runtime"),
    }
}

fn setup(args: &SetupArgs, settings: &AgentSettings) -> Result<String> {
    let config = LocationConfig {
        location_id: args.location_id.trim().to_string(),
        location_name: args.location_name.trim().to_string(),
        server_url: args.server_url.trim().to_string(),
        poll_interval_ms: args.poll_interval_ms,
        printer_name: args.printer.trim().to_string(),
    };
    let store = ConfigStore::new(&settings.work_dir);
    store.save(&config)?;
    Ok(format!(
        "Saved location {} to {}",
        config.location_id,
        store.path().display()
    ))
}

fn service_spec(settings: &AgentSettings) -> Result<ServiceSpec> {
    let config = ConfigStore::new(&settings.work_dir).load()?;
    let exe = std::env::current_exe().context("failed to resolve current executable")?;
    let work_dir = std::path::absolute(&settings.work_dir)
        .with_context(|| format!("failed to resolve {}", settings.work_dir.display()))?;
    Ok(ServiceSpec::new(
        &config.location_id,
        &config.location_name,
        exe,
        work_dir,
    ))
}

fn install(settings: &AgentSettings) -> Result<String> {
    let spec = service_spec(settings)?;
    let name = spec.name.clone();
    let backend = platform_backend(spec)?;
    backend.install()?;
    backend.start()?;
    Ok(format!("Installed and started {name}"))
}

fn status(settings: &AgentSettings) -> Result<String> {
    let spec = service_spec(settings)?;
    let name = spec.name.clone();
    let state = platform_backend(spec)?.status()?;
    let dead = DeadLetterLog::new(settings.dead_letter_file()).read_all()?.len();
    Ok(format!("{name}: {state}, {dead} dead-lettered"))
}

fn dead_letters(settings: &AgentSettings) -> Result<String> {
    let log = DeadLetterLog::new(settings.dead_letter_file());
    let records = log.read_all()?;
    if records.is_empty() {
        return Ok("No dead-lettered orders".into());
    }

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(format!("{} dead-lettered orders:", records.len()));
    for record in &records {
        lines.push(format!(
            "#{} {} attempts={} reason={} error={}",
            record.order.order_number,
            millis_to_rfc3339(record.dead_lettered_at),
            record.attempts,
            record.reason,
            record.last_error
        ));
    }
    Ok(lines.join("\n"))
}

fn reprint(order_number: u64, settings: &AgentSettings) -> Result<String> {
    let log = DeadLetterLog::new(settings.dead_letter_file());
    let Some(record) = log.find(order_number)? else {
        bail!("order #{order_number} is not in the dead-letter log");
    };
    let path = ReprintSpool::new(settings.reprint_dir()).request(&record.order)?;
    Ok(format!(
        "Queued order #{order_number} for reprint ({})",
        path.display()
    ))
}

/// Service entry point: run the supervisor until SIGTERM or Ctrl-C
pub async fn run_service(settings: AgentSettings) -> Result<()> {
    let supervisor = Supervisor::load(settings)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        signal_token.cancel();
    });

    supervisor.run(shutdown).await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
