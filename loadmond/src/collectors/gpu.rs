//! GPU utilization via the DRM sysfs busy counter.
//!
//! amdgpu (and some other drivers) expose an instantaneous busy percentage
//! at /sys/class/drm/<card>/device/gpu_busy_percent. Machines without a GPU,
//! or with a driver that does not publish the file, simply have no GPU
//! telemetry; that is reported as `None`, never as an error.

use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_BUSY_PATH: &str = "/sys/class/drm/card0/device/gpu_busy_percent";

fn busy_path() -> PathBuf {
    env::var("LOADMOND_GPU_BUSY_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_BUSY_PATH))
}

/// Current GPU busy percentage, or `None` when unavailable.
pub fn busy_percent() -> Option<f32> {
    read_busy_percent(&busy_path())
}

fn read_busy_percent(path: &Path) -> Option<f32> {
    let content = std::fs::read_to_string(path).ok()?;
    let value = content.trim().parse::<f32>().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}
