//! Host metric acquisition.
//!
//! The sampling loop only depends on the [`MetricsSource`] trait so tests
//! can inject scripted readings; [`system::SystemCollector`] is the real
//! sysinfo-backed implementation.

pub mod gpu;
pub mod system;

pub use system::SystemCollector;

use crate::LoadReading;
use async_trait::async_trait;

#[async_trait]
pub trait MetricsSource: Send {
    /// Capture one reading. GPU unavailability is not an error (the reading
    /// carries `gpu_percent: None`); an `Err` here means the whole tick
    /// failed and no sample should be recorded.
    async fn sample(&mut self) -> anyhow::Result<LoadReading>;
}
