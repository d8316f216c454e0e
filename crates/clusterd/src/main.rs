//! clusterd - Instrument cluster daemon
//!
//! Subscribes to the critical and non-critical telemetry publishers and keeps
//! the vehicle display state current. Field changes are logged to the console
//! in place of a rendered display.
//!
//! # Usage
//!
//! Live data from the default local publishers:
//! ```bash
//! ./clusterd
//! ```
//!
//! Remote publishers with a config file:
//! ```bash
//! ./clusterd --config config/cluster.toml
//! ```
//!
//! Synthetic data, no publishers needed:
//! ```bash
//! ./clusterd --mock
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use cluster_core::FieldChange;
use cluster_link::{ChannelKind, ClusterConfig, ClusterRuntime, QueuePolicy, StateWatch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "clusterd")]
#[command(about = "Instrument cluster telemetry daemon")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, env = "CLUSTERD_CONFIG")]
    config: Option<String>,

    /// Drive the display from the synthetic feed instead of live channels
    #[arg(short, long)]
    mock: bool,

    /// Critical channel endpoint (speed, lane, obstacle, sign)
    #[arg(long)]
    critical: Option<String>,

    /// Non-critical channel endpoint (battery, charging, mode, odometer)
    #[arg(long)]
    non_critical: Option<String>,

    /// Keep only the newest unread frame on the critical channel
    #[arg(long)]
    latest_only: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Apply command-line overrides on top of the loaded config
    fn apply(&self, config: &mut ClusterConfig) {
        if self.mock {
            config.synthetic.enabled = true;
        }
        if let Some(endpoint) = &self.critical {
            config.channel_mut(ChannelKind::Critical).endpoint = endpoint.clone();
        }
        if let Some(endpoint) = &self.non_critical {
            config.channel_mut(ChannelKind::NonCritical).endpoint = endpoint.clone();
        }
        if self.latest_only {
            config.channel_mut(ChannelKind::Critical).policy = QueuePolicy::LatestOnly;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "clusterd=debug,cluster_link=debug,cluster_core=debug"
    } else {
        "clusterd=info,cluster_link=info,cluster_core=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from: {}", path);
            ClusterConfig::load(path).with_context(|| format!("Failed to load config {}", path))?
        }
        None => ClusterConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!("Starting clusterd");
    for (kind, channel) in config.channels() {
        info!(channel = %kind, endpoint = %channel.endpoint, policy = ?channel.policy, "Channel configured");
    }

    let mut runtime = ClusterRuntime::from_config(&config);
    let observer = tokio::spawn(observe(runtime.watch()));

    runtime.run_until(shutdown_signal()).await;

    let snapshot = runtime.state().snapshot();
    drop(runtime);
    if let Err(e) = observer.await {
        warn!("Observer task failed: {}", e);
    }

    info!("Final state: {}", serde_json::to_string(&snapshot)?);
    Ok(())
}

/// Console stand-in for the display: log every field change
async fn observe(mut watch: StateWatch) {
    info!(state = ?watch.current(), "Initial state");

    while let Some(change) = watch.next_change().await {
        match change {
            FieldChange::EmergencyBrakeActive(true) | FieldChange::ObjectAlert(true) => {
                warn!(field = change.field(), "{}", change)
            }
            _ => info!(field = change.field(), "{}", change),
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            // Without a signal handler the daemon runs until killed
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
