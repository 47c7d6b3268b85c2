//! Idle session eviction.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use super::registry::SessionRegistry;
use crate::config::SessionConfig;

pub struct SessionReaper {
    registry: SessionRegistry,
    config: SessionConfig,
}

impl SessionReaper {
    pub fn new(registry: SessionRegistry, config: SessionConfig) -> Self {
        Self { registry, config }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.config.idle_timeout_secs == 0 {
            tracing::info!("Idle session eviction disabled");
            return;
        }

        tracing::info!(
            idle_timeout = self.config.idle_timeout_secs,
            interval = self.config.sweep_interval_secs,
            "Session reaper starting"
        );

        let max_idle = Duration::from_secs(self.config.idle_timeout_secs);
        let mut ticker = time::interval(Duration::from_secs(self.config.sweep_interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.registry.evict_idle(max_idle);
                    if evicted > 0 {
                        tracing::info!(evicted, remaining = self.registry.len(), "Evicted idle sessions");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session reaper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
