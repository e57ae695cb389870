//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::BridgeConfig;

/// Collapses a burst of modify events into one pending reload
#[derive(Debug, Default)]
struct ReloadGate {
    pending: AtomicBool,
}

impl ReloadGate {
    /// True when no reload is pending yet; the caller then owns the reload
    fn try_schedule(&self) -> bool {
        !self.pending.swap(true, Ordering::AcqRel)
    }

    /// Let the next event schedule a reload; call before reading the file
    fn release(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

/// Watches the config file and yields every successfully parsed revision
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<BridgeConfig>,
}

impl ConfigWatcher {
    /// Load the file once and start watching it
    pub async fn new(config_path: String) -> Result<(Self, BridgeConfig)> {
        let (tx, rx) = mpsc::channel(10);

        let initial = BridgeConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        // notify callbacks run on their own OS thread
        let runtime = tokio::runtime::Handle::current();
        let path = config_path.clone();
        let gate = Arc::new(ReloadGate::default());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_)) => {
                    debug!("Config file modified: {:?}", event.paths);
                    if !gate.try_schedule() {
                        return;
                    }
                    let path = path.clone();
                    let tx = tx.clone();
                    let gate = gate.clone();

                    runtime.spawn(async move {
                        // debounce partial writes
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        gate.release();

                        match BridgeConfig::load(&path).await {
                            Ok(config) => {
                                info!("Configuration reloaded");
                                if let Err(e) = tx.send(config).await {
                                    error!("Failed to send config update: {}", e);
                                }
                            }
                            Err(e) => {
                                warn!("Failed to reload config (keeping current attempt): {:#}", e);
                            }
                        }
                    });
                }
                Ok(_) => {}
                Err(e) => error!("Watch error: {}", e),
            }
        })?;

        watcher
            .watch(Path::new(&config_path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path))?;

        info!("Config file watcher started for: {}", config_path);

        Ok((Self { _watcher: watcher, rx }, initial))
    }

    /// Wait for the next parsed revision
    ///
    /// Returns `None` once the watcher is closed.
    pub async fn next_config(&mut self) -> Option<BridgeConfig> {
        self.rx.recv().await
    }
}
