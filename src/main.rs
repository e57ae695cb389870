use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dhd_bridge::{Bridge, BridgeConfig, ConfigWatcher, ConsoleHost, WebSocketConnector};

/// DHD Bridge - mirror a DHD mixer's Control API into host variables
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Mixer address, overrides the config file
    #[arg(long, env = "DHD_HOST")]
    host: Option<String>,

    /// Control API token, overrides the config file
    #[arg(long, env = "DHD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Also write daily-rotated log files into this directory
    #[arg(long)]
    log_dir: Option<String>,
}

impl Args {
    fn apply(&self, config: BridgeConfig) -> BridgeConfig {
        config.with_overrides(self.host.as_deref(), self.token.as_deref())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let _log_guard = init_logging(&args)?;

    info!("🎬 DHD Bridge v{} starting", env!("CARGO_PKG_VERSION"));

    let (mut watcher, config) = ConfigWatcher::new(args.config.clone())
        .await
        .with_context(|| format!("Failed to start with config {}", args.config))?;

    let bridge = Bridge::new(
        Arc::new(WebSocketConnector::new()),
        Arc::new(ConsoleHost::new()),
    );

    if let Err(e) = bridge.configure(args.apply(config)) {
        error!("Configuration rejected: {}", e);
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            next = watcher.next_config() => {
                let Some(config) = next else {
                    warn!("Config watcher closed, keeping current configuration");
                    (&mut shutdown).await;
                    break;
                };
                info!("🔧 Applying reloaded configuration");
                if let Err(e) = bridge.configure(args.apply(config)) {
                    error!("Configuration rejected: {}", e);
                }
            }
            _ = &mut shutdown => break,
        }
    }

    bridge.teardown().await;
    info!("✅ DHD Bridge stopped");

    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    // RUST_LOG wins over --log-level
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(&args.log_level)
            .with_context(|| format!("Invalid log level: {}", args.log_level))?,
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "dhd-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if args.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?;
    }

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
