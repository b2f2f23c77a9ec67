// Syncbar - supervisory connector for a local sync daemon
// Main entry point

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use syncbar::config::{load_config, load_config_from, Config};
use syncbar::connector::{HealthResult, LinkState};
use syncbar::errors;
use syncbar::SyncConnector;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "syncbar")]
#[command(about = "Supervisory connector for a local sync daemon", version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: ~/.syncbar/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Daemon GUI address, e.g. https://127.0.0.1:8384
    #[arg(long, global = true)]
    url: Option<String>,

    /// GUI user
    #[arg(long, global = true)]
    user: Option<String>,

    /// GUI password
    #[arg(long, global = true)]
    password: Option<String>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Verify the daemon is reachable and the credentials are accepted
    Check,
    /// Verify once, then report connection health until Ctrl-C
    Watch,
    /// Launch the daemon and report its state until Ctrl-C
    Spawn {
        /// Daemon executable (default: [daemon] executable from config)
        executable: Option<PathBuf>,
    },
    /// Launch the daemon, then verify and watch it until Ctrl-C
    Run {
        /// Daemon executable (default: [daemon] executable from config)
        executable: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    match args.command {
        Command::Check => run_check(&config).await,
        Command::Watch => run_watch(&config).await,
        Command::Spawn { executable } => {
            let exe = resolve_executable(executable, &config)?;
            run_spawn(&config, exe).await
        }
        Command::Run { executable } => {
            let exe = resolve_executable(executable, &config)?;
            run_supervised(&config, exe).await
        }
    }
}

/// Initialize tracing to stderr
///
/// Default: INFO level, overridable with RUST_LOG; SYNCBAR_DEBUG=1 forces debug.
fn init_tracing() {
    let show_debug = std::env::var("SYNCBAR_DEBUG")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);

    let env_filter = if show_debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Bridge log crate → tracing (rustls and friends log through `log`)
    tracing_log::LogTracer::init().ok();
}

/// File, then environment, then command-line flags
fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    if let Some(url) = &args.url {
        config.url = url.clone();
    }
    if let Some(user) = &args.user {
        config.username = user.clone();
    }
    if let Some(password) = &args.password {
        config.password = password.clone();
    }
    Ok(config)
}

fn resolve_executable(executable: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    match executable.or_else(|| config.daemon.executable.clone()) {
        Some(exe) => Ok(exe),
        None => bail!(errors::wrap_error_with_suggestion(
            "No daemon executable given",
            "Pass it as an argument or set [daemon] executable in ~/.syncbar/config.toml"
        )),
    }
}

fn build_connector(config: &Config) -> Result<SyncConnector> {
    SyncConnector::new(config).context("Failed to set up daemon connector")
}

/// One version check; fails the process when the daemon is not usable
async fn run_check(config: &Config) -> Result<()> {
    let connector = build_connector(config)?;
    let result = connector.check_connection().await;

    if result.success {
        println!(
            "Connected to {} (version {})",
            config.url,
            display_version(&result.version_string)
        );
        Ok(())
    } else {
        bail!(errors::explain_probe_failure(&config.url, &result.version_string))
    }
}

async fn run_watch(config: &Config) -> Result<()> {
    let mut connector = build_connector(config)?;
    start_watching(&mut connector, config).await;
    wait_for_shutdown().await
}

async fn run_spawn(config: &Config, executable: PathBuf) -> Result<()> {
    let mut connector = build_connector(config)?;
    start_daemon(&mut connector, &executable)?;
    wait_for_shutdown().await
}

async fn run_supervised(config: &Config, executable: PathBuf) -> Result<()> {
    let mut connector = build_connector(config)?;
    start_daemon(&mut connector, &executable)?;
    start_watching(&mut connector, config).await;
    wait_for_shutdown().await
}

fn start_daemon(connector: &mut SyncConnector, executable: &Path) -> Result<()> {
    connector.set_process_spawned_callback(Arc::new(|running| {
        if running {
            println!("Daemon running");
        } else {
            println!("Daemon not running");
        }
    }));
    connector
        .spawn_daemon(executable)
        .with_context(|| format!("Failed to spawn {}", executable.display()))
}

async fn start_watching(connector: &mut SyncConnector, config: &Config) {
    let result = connector.check_connection().await;
    if result.success {
        println!(
            "Connected to {} (version {})",
            config.url,
            display_version(&result.version_string)
        );
    } else {
        eprintln!("{}", errors::explain_probe_failure(&config.url, &result.version_string));
    }

    connector.set_connection_health_callback(Arc::new(|result: HealthResult| {
        match (result.state, result.connections) {
            (LinkState::Reachable, Some(count)) => {
                println!("Daemon reachable, {} connection(s)", count)
            }
            _ => println!("Daemon unreachable"),
        }
    }));
}

fn display_version(version: &str) -> &str {
    if version.is_empty() {
        "unknown"
    } else {
        version
    }
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    Ok(())
}
