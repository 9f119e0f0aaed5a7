//! Converge - declarative cluster resource reconciliation CLI

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use converge::client::{create_client, KubeClusterApi};
use converge::driver::{Reconciler, ReconcilerConfig};
use converge::gate::GateableKinds;
use converge::manifest::{parse_documents, ResourceManifest};

/// Apply declarative resource manifests with server-side apply and
/// optionally wait for managed resources to become Ready
#[derive(Parser, Debug)]
#[command(name = "converge", version, about, long_about = None)]
struct Cli {
    /// Manifest files (multi-document YAML or JSON); use '-' for stdin
    #[arg(required = true)]
    manifests: Vec<PathBuf>,

    /// Validate server-side without persisting anything
    #[arg(long)]
    dry_run: bool,

    /// After applying, wait for gateable resources to report Ready
    #[arg(long)]
    wait: bool,

    /// Per-resource readiness timeout in seconds
    #[arg(long, default_value = "300")]
    timeout_seconds: u64,

    /// Interval between readiness poll ticks in seconds
    #[arg(long, default_value = "5")]
    poll_interval_seconds: u64,

    /// Wall-clock cap on the whole run in seconds; still-waiting resources
    /// are reported as timed out when it lapses
    #[arg(long)]
    run_timeout_seconds: Option<u64>,

    /// Resolve field-ownership conflicts in this writer's favor
    #[arg(long)]
    force: bool,

    /// Field owner identifier recorded for every write
    #[arg(long, default_value = converge::DEFAULT_FIELD_MANAGER)]
    field_manager: String,

    /// Path to a kubeconfig file (defaults to in-cluster or environment
    /// configuration)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Override the set of kinds gated on readiness (repeatable)
    #[arg(long = "gate-kind")]
    gate_kinds: Vec<String>,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    output_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let manifests = load_manifests(&cli.manifests).await?;
    if manifests.is_empty() {
        info!("no manifests to apply");
        return Ok(());
    }

    let client = create_client(cli.kubeconfig.as_deref()).await?;
    let api = Arc::new(KubeClusterApi::new(client));

    let gateable_kinds = if cli.gate_kinds.is_empty() {
        GateableKinds::default()
    } else {
        cli.gate_kinds.iter().cloned().collect()
    };

    let config = ReconcilerConfig {
        field_manager: cli.field_manager,
        dry_run: cli.dry_run,
        force: cli.force,
        wait: cli.wait,
        poll_interval: Duration::from_secs(cli.poll_interval_seconds),
        gate_timeout: Duration::from_secs(cli.timeout_seconds),
        run_timeout: cli.run_timeout_seconds.map(Duration::from_secs),
        gateable_kinds,
    };

    let reconciler = Reconciler::new(api, config);
    let report = reconciler.reconcile(&manifests).await?;

    for failure in &report.failures {
        error!(
            resource = %failure.resource_ref,
            phase = %failure.phase,
            reason = %failure.reason,
            detail = failure.detail.as_deref().unwrap_or(""),
            "resource failed"
        );
    }

    if cli.output_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if !report.success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Load and parse every manifest input, preserving input order.
async fn load_manifests(paths: &[PathBuf]) -> anyhow::Result<Vec<ResourceManifest>> {
    let mut manifests = Vec::new();
    for path in paths {
        let content = if path.as_os_str() == "-" {
            use tokio::io::AsyncReadExt;
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        } else {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to read {:?}: {}", path, e))?
        };
        manifests.extend(parse_documents(&content)?);
    }
    Ok(manifests)
}
