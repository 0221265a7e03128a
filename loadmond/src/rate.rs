//! Network throughput derived from cumulative interface counters.
//!
//! The kernel exposes bytes-since-boot, not bytes/sec; the tracker keeps the
//! previous reading and divides the delta by the elapsed wall time between
//! ticks. Counter resets (interface bounce, counter wrap) would otherwise
//! produce a huge negative delta, so deltas are clamped at zero.

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetCounters {
    pub sent: u64,
    pub recv: u64,
}

/// Per-direction bytes/sec for one pair of readings.
///
/// `elapsed_secs` must be positive; a non-positive elapsed yields zero rates
/// rather than a division blowup.
pub fn rates(prev: NetCounters, cur: NetCounters, elapsed_secs: f64) -> (f64, f64) {
    if elapsed_secs <= 0.0 {
        return (0.0, 0.0);
    }
    let sent = cur.sent.saturating_sub(prev.sent) as f64 / elapsed_secs;
    let recv = cur.recv.saturating_sub(prev.recv) as f64 / elapsed_secs;
    (sent, recv)
}

/// Owns the "last counters" baseline across sampling ticks.
///
/// The first observation of process lifetime has no baseline and returns
/// `None`; every observation, first or not, becomes the baseline for the
/// next one.
#[derive(Debug, Default)]
pub struct RateTracker {
    last: Option<(NetCounters, Instant)>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, cur: NetCounters, now: Instant) -> Option<(f64, f64)> {
        let result = self
            .last
            .map(|(prev, at)| rates(prev, cur, (now - at).as_secs_f64()));
        self.last = Some((cur, now));
        result
    }
}
