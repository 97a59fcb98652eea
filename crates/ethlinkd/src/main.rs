//! ethlinkd entry point

use anyhow::Context;
use clap::Parser;
use ethlinkd::{
    CarrierWatcher, DebugLevel, EthlinkdConfig, EthlinkdError, FileConfigStore, InterfaceInspector,
    ReconcileController, ShellApplier, StateNotifier, SystemInspector, SystemdNotifier,
    VerifyPolicy, config::DEFAULT_CONFIG_PATH, load_static_config, resolve_desired_config,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Ethernet link supervisor
#[derive(Parser, Debug)]
#[command(name = "ethlinkd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Network device to supervise
    #[arg(short = 'd', long, default_value = "eth0")]
    device: String,

    /// Static configuration file (KEY=VALUE); DHCP when absent
    #[arg(short = 'c', long, default_value = "network.conf")]
    config: PathBuf,

    /// Debug level 0-3; other values fall back to 1
    #[arg(short = 'D', long, default_value = "1", allow_hyphen_values = true)]
    debug: String,

    /// Daemon settings (TOML)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    daemon_config: PathBuf,
}

enum Outcome {
    /// Event source ended or failed non-fatally
    Stopped,
    /// SIGINT or SIGTERM
    Signalled,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = init_logging(&cli.debug);
    info!(device = %cli.device, level = ?level, "Starting ethlinkd");

    match run_daemon(&cli).await {
        Ok(Outcome::Stopped) => {
            info!("ethlinkd exiting");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Signalled) => {
            info!("Received shutdown signal, exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install the tracing subscriber. RUST_LOG wins over the CLI level.
fn init_logging(raw_level: &str) -> DebugLevel {
    let parsed = DebugLevel::from_arg(raw_level);
    let level = parsed.unwrap_or_default();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.tracing_level().as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if parsed.is_none() {
        warn!(
            level = %raw_level,
            "Debug level out of range (0-3), using {}",
            level as u8
        );
    }
    level
}

async fn run_daemon(cli: &Cli) -> anyhow::Result<Outcome> {
    let config = EthlinkdConfig::load_or_default(&cli.daemon_config)
        .with_context(|| format!("loading {}", cli.daemon_config.display()))?;
    config.validate().context("invalid daemon configuration")?;

    ensure_root()?;

    let inspector = SystemInspector::new(&config);
    let identity = inspector
        .read_identity(&cli.device)
        .await
        .with_context(|| format!("resolving device {}", cli.device))?;
    info!(identity = %identity, "Resolved device");

    let static_config = match load_static_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            warn!(
                path = %cli.config.display(),
                error = %e,
                "Ignoring unusable static configuration file"
            );
            None
        }
    };
    let store = FileConfigStore::new(&config.paths.record_dir);
    let desired = resolve_desired_config(static_config, &store, &identity).await;

    let mut events = CarrierWatcher::subscribe(&config.paths.sysfs_root, &identity.name)
        .with_context(|| format!("watching carrier of {}", identity.name))?;

    let notifier = SystemdNotifier::new();
    notifier.notify_ready();
    info!(
        device = %identity.name,
        systemd = notifier.is_enabled(),
        "Watching carrier"
    );

    let mut controller = ReconcileController::new(
        identity,
        desired,
        VerifyPolicy::from_config(&config),
        inspector,
        ShellApplier::new(&config),
        store,
        notifier,
    );

    tokio::select! {
        result = controller.run(&mut events) => match result {
            Ok(()) => Ok(Outcome::Stopped),
            Err(e @ EthlinkdError::ReconfigurationExhausted { .. }) => Err(e.into()),
            Err(e) => Err(anyhow::Error::new(e).context("link supervision failed")),
        },
        () = shutdown_signal() => Ok(Outcome::Signalled),
    }
}

fn ensure_root() -> anyhow::Result<()> {
    if !nix::unistd::geteuid().is_root() {
        return Err(EthlinkdError::Privilege("ethlinkd must run as root".to_string()).into());
    }
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
