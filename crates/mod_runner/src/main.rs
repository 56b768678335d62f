//! Main entry point for the mod runner
//!
//! Loads configuration, registers the InterModHost and InterModClient mods
//! with an in-process mod manager, runs them until a shutdown signal arrives
//! and then shuts them down.

mod cli;
mod config;
mod signals;

use cli::CliArgs;
use config::{AppConfig, LoggingSettings};
use inter_mod_client::ClientMod;
use inter_mod_host::HostMod;
use mod_api::{AccessLevel, CommandInvocation};
use mod_manager::ModManager;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Name commands from the command line and config are issued under.
const CONSOLE_INVOKER: &str = "Console";

// ============================================================================
// Logging Setup
// ============================================================================

/// Initialize logging system
fn setup_logging(config: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

// ============================================================================
// Application
// ============================================================================

pub struct Application {
    config: AppConfig,
    manager: Arc<ModManager>,
}

impl Application {
    /// Builds the application from an already merged configuration.
    pub async fn new(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {}", e).into());
        }

        let manager = ModManager::new(config.mods_directory());
        let retry = config.retry_policy();

        let host_mod = HostMod::new(manager.mod_path(inter_mod_host::HOST_MOD_NAME), retry);
        manager.register_mod(Arc::new(host_mod)).await?;

        let client_mod = ClientMod::new(manager.mod_path(inter_mod_client::CLIENT_MOD_NAME), retry);
        manager.register_mod(Arc::new(client_mod)).await?;

        Ok(Self { config, manager })
    }

    /// Starts the mods if configured to and runs the startup commands.
    pub async fn start(&self) {
        info!("📂 Mods directory: {}", self.config.mods.directory);

        if self.config.mods.auto_start {
            let running = self.manager.start_all().await;
            info!("🔌 Running mods: {:?}", running);
        } else {
            info!("⏸️ Auto start disabled, mods left stopped");
        }

        for line in &self.config.mods.startup_commands {
            let Some(invocation) = parse_command(line) else {
                continue;
            };
            info!("> {}", line);
            if let Err(e) = self.manager.run_command(invocation).await {
                warn!("⚠️ Command '{}' failed: {}", line, e);
            }
        }
    }

    /// Shuts every mod down and reports final statistics.
    pub async fn stop(&self) {
        self.manager.shutdown_all().await;

        let stats = self.manager.get_stats().await;
        info!("📊 Final Statistics:");
        info!("  - Mods registered: {}", stats.total_mods);
        info!("  - Disable requests: {}", stats.disable_requests);
        info!("  - Failed starts: {}", stats.failed_mods);
        info!(
            "  - Commands dispatched: {} ({} failed)",
            stats.commands_dispatched, stats.commands_failed
        );
        for m in &stats.mods {
            info!("  - {} v{}: {}", m.name, m.version, m.state);
        }
    }

    /// Runs until a shutdown signal is received.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.start().await;

        info!("✅ Mod runner is up");
        info!("🛑 Press Ctrl+C to gracefully shutdown");
        let signal = signals::wait_for_shutdown_signal().await?;
        info!("📡 Received {}", signal);

        info!("🛑 Shutdown signal received, stopping mods...");
        self.stop().await;
        Ok(())
    }
}

/// Splits a console line into a command and its parameters.
fn parse_command(line: &str) -> Option<CommandInvocation> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?;
    Some(
        CommandInvocation::new(CONSOLE_INVOKER, AccessLevel::Admin, command)
            .with_parameters(parts.map(str::to_string).collect()),
    )
}

/// Loads the configuration file and applies command-line overrides.
async fn load_config(args: CliArgs) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load_from_file(&args.config_path).await?;

    if let Some(mods_dir) = args.mods_dir {
        config.mods.directory = mods_dir.to_string_lossy().to_string();
    }

    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }

    if args.json_logs {
        config.logging.json_format = true;
    }

    config.mods.startup_commands.extend(args.commands);
    Ok(config)
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config = match load_config(args).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    setup_logging(&config.logging)?;
    info!("🚀 InterMod Runner v{}", env!("CARGO_PKG_VERSION"));

    match Application::new(config).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
