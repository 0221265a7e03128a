//! The sampling-alerting-retention core.
//!
//! Two long-lived tasks own all background work: [`Sampler`] records one
//! sample per tick and raises threshold alerts, [`RetentionSweeper`] prunes
//! history on its own, much slower, timer. Both run until the shutdown
//! signal fires and contain every per-tick error; nothing that happens in
//! one tick may take the loop down.

use crate::collectors::MetricsSource;
use crate::rate::{NetCounters, RateTracker};
use crate::store::{AlertEvent, LoadStore, Sample};
use crate::thresholds::ThresholdStore;
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Records one sample per tick and evaluates it against the thresholds in
/// force at that moment.
pub struct Sampler {
    source: Box<dyn MetricsSource>,
    store: Arc<LoadStore>,
    thresholds: Arc<ThresholdStore>,
    tracker: RateTracker,
    interval: Duration,
    last_ts: i64,
}

impl Sampler {
    pub fn new(
        source: Box<dyn MetricsSource>,
        store: Arc<LoadStore>,
        thresholds: Arc<ThresholdStore>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            thresholds,
            tracker: RateTracker::new(),
            interval,
            last_ts: 0,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("[sampler] starting, cadence {:?}", self.interval);
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                tick_at = timer.tick() => self.tick(tick_at).await,
                _ = shutdown.changed() => {
                    info!("[sampler] shutting down");
                    break;
                }
            }
        }
    }

    /// One sample-and-evaluate cycle. `now` is the tick's instant; elapsed
    /// time between ticks is measured from it, not from the wall clock.
    pub async fn tick(&mut self, now: Instant) {
        let reading = match self.source.sample().await {
            Ok(reading) => reading,
            Err(err) => {
                warn!("[sampler] metrics read failed, skipping tick: {err}");
                return;
            }
        };

        // The baseline advances on every tick, persisted or not, so the next
        // tick always measures against the latest counters.
        let counters = NetCounters {
            sent: reading.net_sent_total,
            recv: reading.net_recv_total,
        };
        let rates = self.tracker.observe(counters, now);

        // Wall clock can step backwards under NTP; persisted timestamps must
        // not, so clamp against the previous tick.
        let timestamp = Utc::now().timestamp().max(self.last_ts);
        self.last_ts = timestamp;

        let sample = Sample {
            id: None,
            cpu_percent: reading.cpu_percent,
            gpu_percent: reading.gpu_percent,
            memory_percent: reading.memory_percent,
            net_sent: rates.map(|(sent, _)| sent),
            net_recv: rates.map(|(_, recv)| recv),
            timestamp,
        };

        if let Err(err) = self.store.insert_sample(&sample).await {
            warn!("[sampler] sample insert failed, skipping alert evaluation: {err}");
            return;
        }

        // One snapshot covers all five comparisons; a concurrent threshold
        // update never splits an evaluation.
        let limits = self.thresholds.get().await;

        let mut messages = Vec::new();
        if f64::from(sample.cpu_percent) > limits.cpu {
            messages.push(format!("Critical CPU load: {}%", sample.cpu_percent));
        }
        if let Some(gpu) = sample.gpu_percent {
            if f64::from(gpu) > limits.gpu {
                messages.push(format!("Critical GPU load: {gpu}%"));
            }
        }
        if f64::from(sample.memory_percent) > limits.memory {
            messages.push(format!("Critical memory load: {}%", sample.memory_percent));
        }
        if let Some(sent) = sample.net_sent {
            if sent > limits.net_sent {
                messages.push(format!("High outbound traffic: {sent:.2} B/s"));
            }
        }
        if let Some(recv) = sample.net_recv {
            if recv > limits.net_recv {
                messages.push(format!("High inbound traffic: {recv:.2} B/s"));
            }
        }

        for message in messages {
            warn!("[sampler] {message}");
            let event = AlertEvent {
                id: None,
                message,
                level: "critical".to_string(),
                timestamp,
            };
            if let Err(err) = self.store.insert_event(&event).await {
                warn!("[sampler] event insert failed: {err}");
            }
        }
    }
}

/// Deletes samples and events older than the retention window.
pub struct RetentionSweeper {
    store: Arc<LoadStore>,
    window: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<LoadStore>, window: Duration, interval: Duration) -> Self {
        Self {
            store,
            window,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "[sweeper] starting, window {:?}, cadence {:?}",
            self.window, self.interval
        );
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => self.sweep().await,
                _ = shutdown.changed() => {
                    info!("[sweeper] shutting down");
                    break;
                }
            }
        }
    }

    /// One retention pass. Failures wait for the next scheduled sweep.
    pub async fn sweep(&self) {
        let cutoff = Utc::now().timestamp() - self.window.as_secs() as i64;
        match self.store.delete_older_than(cutoff).await {
            Ok((samples, events)) => {
                info!("[sweeper] deleted {samples} samples, {events} events older than {cutoff}");
            }
            Err(err) => {
                warn!("[sweeper] retention delete failed, retrying next sweep: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoadReading;
    use crate::collectors::MetricsSource;
    use crate::store::Sample;
    use crate::thresholds::ThresholdSet;
    use async_trait::async_trait;

    /// Scripted readings, one per tick.
    struct FakeSource {
        readings: Vec<anyhow::Result<LoadReading>>,
    }

    impl FakeSource {
        fn new(readings: Vec<anyhow::Result<LoadReading>>) -> Self {
            let mut readings = readings;
            readings.reverse();
            Self { readings }
        }
    }

    #[async_trait]
    impl MetricsSource for FakeSource {
        async fn sample(&mut self) -> anyhow::Result<LoadReading> {
            self.readings.pop().expect("fake source exhausted")
        }
    }

    fn reading(cpu: f32, memory: f32, sent: u64, recv: u64) -> LoadReading {
        LoadReading {
            cpu_percent: cpu,
            gpu_percent: None,
            memory_percent: memory,
            net_sent_total: sent,
            net_recv_total: recv,
        }
    }

    async fn sampler_with(
        readings: Vec<anyhow::Result<LoadReading>>,
        limits: ThresholdSet,
    ) -> (Sampler, Arc<LoadStore>) {
        let store = Arc::new(LoadStore::memory().await.unwrap());
        let thresholds = Arc::new(ThresholdStore::new(limits));
        let sampler = Sampler::new(
            Box::new(FakeSource::new(readings)),
            Arc::clone(&store),
            thresholds,
            Duration::from_secs(2),
        );
        (sampler, store)
    }

    #[tokio::test]
    async fn cpu_violation_emits_one_critical_event() {
        let (mut sampler, store) = sampler_with(
            vec![Ok(reading(95.0, 50.0, 0, 0))],
            ThresholdSet::default(),
        )
        .await;
        sampler.tick(Instant::now()).await;

        let events = store.recent_events(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("95"));
        assert_eq!(events[0].level, "critical");

        // first tick: sample persisted, rates absent
        let samples = store.recent_samples(10).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].net_sent, None);
        assert_eq!(samples[0].net_recv, None);
    }

    #[tokio::test]
    async fn value_equal_to_threshold_does_not_alert() {
        let (mut sampler, store) = sampler_with(
            vec![Ok(reading(90.0, 90.0, 0, 0))],
            ThresholdSet::default(),
        )
        .await;
        sampler.tick(Instant::now()).await;
        assert!(store.recent_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn multiple_violations_emit_one_event_each() {
        let (mut sampler, store) = sampler_with(
            vec![Ok(reading(95.0, 96.0, 0, 0))],
            ThresholdSet::default(),
        )
        .await;
        sampler.tick(Instant::now()).await;

        let events = store.recent_events(10).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn absent_metrics_are_skipped_not_zero() {
        // gpu and rate thresholds of 0 would fire on any value; absent
        // values must not be treated as a value at all.
        let limits = ThresholdSet {
            cpu: 100.0,
            gpu: 0.0,
            memory: 100.0,
            net_sent: 0.0,
            net_recv: 0.0,
        };
        let (mut sampler, store) =
            sampler_with(vec![Ok(reading(10.0, 10.0, 500, 500))], limits).await;
        sampler.tick(Instant::now()).await;
        assert!(store.recent_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_tick_derives_rates_from_counters() {
        let (mut sampler, store) = sampler_with(
            vec![
                Ok(reading(10.0, 10.0, 1000, 1000)),
                Ok(reading(10.0, 10.0, 3000, 1000)),
            ],
            ThresholdSet::default(),
        )
        .await;

        let t0 = Instant::now();
        sampler.tick(t0).await;
        sampler.tick(t0 + Duration::from_secs(1)).await;

        let samples = store.recent_samples(1).await.unwrap();
        assert_eq!(samples[0].net_sent, Some(2000.0));
        assert_eq!(samples[0].net_recv, Some(0.0));
    }

    #[tokio::test]
    async fn rate_alert_message_has_two_decimals() {
        let limits = ThresholdSet {
            net_sent: 100.0,
            ..ThresholdSet::default()
        };
        let (mut sampler, store) = sampler_with(
            vec![
                Ok(reading(10.0, 10.0, 0, 0)),
                Ok(reading(10.0, 10.0, 2500, 0)),
            ],
            limits,
        )
        .await;

        let t0 = Instant::now();
        sampler.tick(t0).await;
        sampler.tick(t0 + Duration::from_secs(2)).await;

        let events = store.recent_events(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("1250.00 B/s"), "{}", events[0].message);
    }

    #[tokio::test]
    async fn source_failure_skips_tick_and_loop_survives() {
        let (mut sampler, store) = sampler_with(
            vec![
                Err(anyhow::anyhow!("proc read failed")),
                Ok(reading(10.0, 10.0, 0, 0)),
            ],
            ThresholdSet::default(),
        )
        .await;

        let t0 = Instant::now();
        sampler.tick(t0).await;
        sampler.tick(t0 + Duration::from_secs(2)).await;
        assert_eq!(store.recent_samples(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_suppresses_alerts_but_advances_baseline() {
        let (mut sampler, store) = sampler_with(
            vec![
                Ok(reading(10.0, 10.0, 1000, 1000)),
                Ok(reading(95.0, 10.0, 2000, 1000)),
                Ok(reading(10.0, 10.0, 5000, 1000)),
            ],
            ThresholdSet::default(),
        )
        .await;

        // seed the baseline
        let t0 = Instant::now();
        sampler.tick(t0).await;

        // break sample persistence for one tick
        sqlx::query("ALTER TABLE system_load RENAME TO system_load_hidden")
            .execute(store_pool(&store))
            .await
            .unwrap();
        sampler.tick(t0 + Duration::from_secs(1)).await;
        assert!(
            store.recent_events(10).await.unwrap().is_empty(),
            "failed persistence must not emit alerts"
        );

        sqlx::query("ALTER TABLE system_load_hidden RENAME TO system_load")
            .execute(store_pool(&store))
            .await
            .unwrap();
        sampler.tick(t0 + Duration::from_secs(2)).await;

        // baseline was updated during the failed tick: 5000 - 2000 over 1s
        let samples = store.recent_samples(1).await.unwrap();
        assert_eq!(samples[0].net_sent, Some(3000.0));
    }

    fn store_pool(store: &LoadStore) -> &sqlx::SqlitePool {
        store.pool()
    }

    #[tokio::test]
    async fn timestamps_never_decrease() {
        let (mut sampler, store) = sampler_with(
            vec![Ok(reading(10.0, 10.0, 0, 0)), Ok(reading(10.0, 10.0, 0, 0))],
            ThresholdSet::default(),
        )
        .await;

        // pretend an earlier tick saw a timestamp in the future
        let future = Utc::now().timestamp() + 1000;
        sampler.last_ts = future;
        let t0 = Instant::now();
        sampler.tick(t0).await;
        sampler.tick(t0 + Duration::from_secs(2)).await;

        let samples = store.recent_samples(10).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples[0].timestamp >= samples[1].timestamp);
        assert_eq!(samples[1].timestamp, future, "clamped to the prior tick");
    }

    #[tokio::test]
    async fn threshold_update_applies_to_next_tick() {
        let (mut sampler, store) = sampler_with(
            vec![
                Ok(reading(80.0, 10.0, 0, 0)),
                Ok(reading(80.0, 10.0, 0, 0)),
            ],
            ThresholdSet::default(),
        )
        .await;

        let t0 = Instant::now();
        sampler.tick(t0).await;
        assert!(store.recent_events(10).await.unwrap().is_empty());

        sampler
            .thresholds
            .set(ThresholdSet {
                cpu: 70.0,
                ..ThresholdSet::default()
            })
            .await
            .unwrap();
        sampler.tick(t0 + Duration::from_secs(2)).await;
        assert_eq!(store.recent_events(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_rows() {
        let store = Arc::new(LoadStore::memory().await.unwrap());
        let now = Utc::now().timestamp();
        let day = 86_400;
        for age_days in [1, 6] {
            store
                .insert_sample(&Sample {
                    id: None,
                    cpu_percent: 10.0,
                    gpu_percent: None,
                    memory_percent: 10.0,
                    net_sent: None,
                    net_recv: None,
                    timestamp: now - age_days * day,
                })
                .await
                .unwrap();
        }

        let sweeper = RetentionSweeper::new(
            Arc::clone(&store),
            Duration::from_secs(5 * 86_400),
            Duration::from_secs(86_400),
        );
        sweeper.sweep().await;

        let remaining = store.recent_samples(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp, now - day);
    }
}
