//! sysinfo-backed metrics source.

use super::{MetricsSource, gpu};
use crate::LoadReading;
use async_trait::async_trait;
use sysinfo::{Networks, System};

/// Samples CPU, memory and network counters from the running host.
///
/// Keeps the `System` handle alive between ticks: sysinfo derives CPU usage
/// from the delta between two refreshes, so the first reading after startup
/// reports 0% CPU and settles from the second tick on.
pub struct SystemCollector {
    sys: System,
    networks: Networks,
}

impl SystemCollector {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for SystemCollector {
    async fn sample(&mut self) -> anyhow::Result<LoadReading> {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();
        self.networks.refresh(true);

        let memory_percent = if self.sys.total_memory() == 0 {
            0.0
        } else {
            self.sys.used_memory() as f32 / self.sys.total_memory() as f32 * 100.0
        };

        let mut net_sent_total = 0u64;
        let mut net_recv_total = 0u64;
        for (_name, data) in &self.networks {
            net_sent_total += data.total_transmitted();
            net_recv_total += data.total_received();
        }

        Ok(LoadReading {
            cpu_percent: self.sys.global_cpu_usage(),
            gpu_percent: gpu::busy_percent(),
            memory_percent,
            net_sent_total,
            net_recv_total,
        })
    }
}
