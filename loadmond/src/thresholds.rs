//! Process-wide alert threshold configuration.
//!
//! The sampling loop reads a snapshot every tick while the HTTP layer may
//! replace the set at any time, so reads must never observe a half-written
//! set. The whole value is swapped under a `RwLock`; `get` hands out a copy,
//! never a reference into the guarded cell.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Per-metric alert limits. Percent metrics are 0-100, network metrics are
/// bytes/sec. All five fields are required on deserialization so a partial
/// update can never slip through as zeros.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub cpu: f64,
    pub gpu: f64,
    pub memory: f64,
    pub net_sent: f64,
    pub net_recv: f64,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            cpu: 90.0,
            gpu: 90.0,
            memory: 90.0,
            net_sent: 10.0 * 1024.0 * 1024.0,
            net_recv: 10.0 * 1024.0 * 1024.0,
        }
    }
}

impl ThresholdSet {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("cpu", self.cpu),
            ("gpu", self.gpu),
            ("memory", self.memory),
            ("net_sent", self.net_sent),
            ("net_recv", self.net_recv),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("threshold '{name}' must be a non-negative number"));
            }
        }
        Ok(())
    }
}

pub struct ThresholdStore {
    inner: RwLock<ThresholdSet>,
}

impl ThresholdStore {
    pub fn new(initial: ThresholdSet) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Consistent snapshot of the in-force set.
    pub async fn get(&self) -> ThresholdSet {
        *self.inner.read().await
    }

    /// Atomically replace the in-force set. Invalid sets are rejected and
    /// the previous set stays in force.
    pub async fn set(&self, next: ThresholdSet) -> Result<(), String> {
        next.validate()?;
        *self.inner.write().await = next;
        log::info!("[thresholds] replaced: {next:?}");
        Ok(())
    }
}

impl Default for ThresholdStore {
    fn default() -> Self {
        Self::new(ThresholdSet::default())
    }
}
