pub mod api;
pub mod collectors;
pub mod config;
pub mod monitor;
pub mod rate;
pub mod store;
pub mod thresholds;

pub use config::Config;
pub use store::LoadStore;
pub use thresholds::{ThresholdSet, ThresholdStore};

/// One instantaneous reading from the host, before any rate derivation.
///
/// Network counters are cumulative bytes since boot; the monitor turns
/// successive readings into bytes/sec. GPU telemetry is best-effort and
/// absent when no GPU (or no readable busy file) is available.
#[derive(Debug, Clone)]
pub struct LoadReading {
    pub cpu_percent: f32,
    pub gpu_percent: Option<f32>,
    pub memory_percent: f32,
    pub net_sent_total: u64,
    pub net_recv_total: u64,
}
