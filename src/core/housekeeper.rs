//! Periodic cleanup of expired and idle engine state.
//!
//! The engine's owner starts the housekeeper explicitly and keeps the
//! returned handle; tests skip it entirely and call `Engine::sweep`
//! directly to single-step cleanup.

use crate::core::engine::Engine;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Interval task that sweeps the engine's shared structures
pub struct Housekeeper {
    engine: Arc<Engine>,
    interval: Duration,
}

impl Housekeeper {
    pub fn new(engine: Arc<Engine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Spawn the sweep loop. Abort the handle to stop it.
    pub fn start(self) -> JoinHandle<()> {
        log::info!(
            "starting housekeeper with a {}s sweep interval",
            self.interval.as_secs()
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick fires immediately; skip it so a fresh engine
            // is not swept at startup
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.engine.sweep(Utc::now()).await;
            }
        })
    }
}
