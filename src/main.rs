//! vnode CLI.
//!
//! Accepts node tokens of the form `id[:distro[-alternative]]`, fans
//! out one lifecycle coordinator per node, and prints one outcome line
//! per node in request order. Individual node failures are reported
//! in-band; the process exit code is non-zero when any node ended in
//! anything other than READY.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vnode::batch::{self, BatchEntry};
use vnode::probe::SshTransport;
use vnode::{Coordinator, Settings, VirshHypervisor};

/// Provision short-lived libvirt VMs and wait for them to come up.
#[derive(Debug, Parser)]
#[command(name = "vnode")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Default distribution code for nodes without an explicit one.
    #[arg(long, default_value = "f34")]
    distro: String,

    /// Destroy and undefine an existing domain with the same name.
    #[arg(long)]
    force: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Root directory for per-node configs, disks and logs.
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Directory holding the base cloud images.
    #[arg(long, default_value = "/var/lib/libvirt/boot")]
    boot_dir: PathBuf,

    /// Host interface the guests' bridged NIC attaches to.
    #[arg(long, default_value = "eth0")]
    uplink: String,

    /// Per-node timeout for the launch-and-probe race, in seconds.
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    /// Nodes to provision, as id[:distro[-alternative]].
    #[arg(required = true)]
    nodes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings {
        work_dir: cli.work_dir,
        boot_dir: cli.boot_dir,
        host_uplink: cli.uplink,
        timeout: Duration::from_secs(cli.timeout),
        ..Settings::default()
    };

    info!(
        nodes = cli.nodes.len(),
        distro = %cli.distro,
        force = cli.force,
        timeout_secs = cli.timeout,
        "starting provisioning batch"
    );

    let coordinator = Arc::new(Coordinator::new(
        Arc::new(VirshHypervisor::new()),
        Arc::new(SshTransport::new()),
        settings,
    ));

    let entries = cli
        .nodes
        .iter()
        .map(|token| BatchEntry::parse(token, &cli.distro, cli.force))
        .collect();

    let reports = batch::run_all(coordinator, entries).await;

    let mut all_ready = true;
    for report in &reports {
        println!("node {} -> {}", report.name, report.outcome);
        all_ready &= report.outcome.is_ready();
    }

    if !all_ready {
        std::process::exit(1);
    }
    Ok(())
}
