//! gatewatchd — the gatewatch daemon.
//!
//! Watches a priority-ordered list of gateways and keeps the default
//! route on the best one that answers:
//! - Health prober (ping or TCP, with retry hysteresis)
//! - State snapshot (survives restarts)
//! - Failover decision engine
//! - Remediation executor (routes, firewall state, DHCP leases, on-demand links)
//!
//! # Usage
//!
//! ```text
//! GATEWATCH_CONFIG=/etc/gatewatch.toml gatewatchd
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use gatewatch_core::config::{ProbeMethod, DEFAULT_CONFIG_PATH};
use gatewatch_core::GatewatchConfig;
use gatewatch_engine::{Supervisor, SupervisorSettings};
use gatewatch_health::{PingProber, Prober, TcpProber};
use gatewatch_remedy::{
    Executor, ExecutorSettings, LogPager, MailPager, Pager, Ports, ShellPorts, ShellRunner,
};
use gatewatch_state::{epoch_secs, SnapshotStore};

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "GATEWATCH_CONFIG";

#[derive(Parser)]
#[command(
    name = "gatewatchd",
    version,
    about = "Gateway health monitor and default-route failover daemon"
)]
struct Cli {}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,gatewatch=debug")),
        )
        .init();

    let _cli = Cli::parse();

    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = GatewatchConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let gateways = config.gateways()?;
    info!(
        path = %config_path.display(),
        gateways = gateways.len(),
        perform_remediation = config.daemon.perform_remediation,
        "gatewatch daemon starting"
    );
    if !config.daemon.perform_remediation {
        warn!(dry_run = true, "remediation disabled, actions will only be logged");
    }

    write_pid_file(&config.daemon.pid_file);

    // Signal streams are registered before the first cycle so nothing is
    // lost while a cycle runs.
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;

    let mut supervisor = build_supervisor(&config, gateways);
    supervisor.start(epoch_secs()).await;

    let interval = config.daemon.cycle_interval();
    loop {
        let decision = supervisor.run_cycle(epoch_secs()).await;
        tracing::debug!(%decision, active = ?supervisor.active(), "cycle complete");

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = sigterm.recv() => {
                info!("received SIGTERM, stopping");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, stopping");
                break;
            }
        }
    }

    info!("gatewatch daemon stopped");
    Ok(())
}

fn build_supervisor(
    config: &GatewatchConfig,
    gateways: Vec<gatewatch_core::GatewayDescriptor>,
) -> Supervisor {
    let runner = Arc::new(ShellRunner::default());
    let ports = Ports::shell(ShellPorts::new(runner.clone(), config.commands.clone()));
    let executor = Executor::new(ports, ExecutorSettings::from(&config.daemon));

    let prober: Arc<dyn Prober> = match config.probe.method {
        ProbeMethod::Icmp => Arc::new(PingProber::new(&config.commands.ping)),
        ProbeMethod::Tcp => Arc::new(TcpProber::new(config.probe.tcp_port)),
    };

    let pager: Arc<dyn Pager> = match &config.notify.to {
        Some(to) => {
            let from = config.notify.from.as_deref().unwrap_or("gatewatch");
            Arc::new(MailPager::new(runner, &config.commands.mail, from, to))
        }
        None => {
            info!("notify.to not set, pages go to the log only");
            Arc::new(LogPager)
        }
    };

    Supervisor::new(
        gateways,
        SnapshotStore::new(&config.daemon.state_file),
        prober,
        executor,
        pager,
        SupervisorSettings::from(config),
    )
}

fn write_pid_file(path: &Path) {
    match std::fs::write(path, format!("{}\n", std::process::id())) {
        Ok(()) => info!(path = %path.display(), "pid file written"),
        Err(e) => warn!(path = %path.display(), error = %e, "cannot write pid file"),
    }
}
