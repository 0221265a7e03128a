//! Sample and event persistence.
//!
//! Backed by SQLite for simplicity and reliability: two append-mostly tables
//! with indexed timestamps for range queries and retention deletes. All
//! timestamps are Unix epoch seconds; the HTTP layer renders them as ISO 8601.

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

/// One persisted point-in-time load observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub cpu_percent: f32,
    pub gpu_percent: Option<f32>,
    pub memory_percent: f32,
    /// Bytes/sec; absent only for the first sample of a process lifetime.
    pub net_sent: Option<f64>,
    pub net_recv: Option<f64>,
    pub timestamp: i64,
}

/// A persisted threshold-violation notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub message: String,
    pub level: String,
    pub timestamp: i64,
}

/// Load history backed by SQLite.
pub struct LoadStore {
    pool: SqlitePool,
}

impl LoadStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, sqlx::Error> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;
        let store = Self::init(pool).await?;
        info!("load store initialized at {}", db_path.as_ref().display());
        Ok(store)
    }

    /// In-memory store, used by tests. A single connection keeps every
    /// query on the same ephemeral database.
    pub async fn memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init(pool).await
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_load (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cpu_percent REAL NOT NULL,
                gpu_percent REAL,
                memory_percent REAL NOT NULL,
                net_sent REAL,
                net_recv REAL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_system_load_timestamp ON system_load(timestamp);
            CREATE TABLE IF NOT EXISTS event_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message TEXT NOT NULL,
                level TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_event_log_timestamp ON event_log(timestamp);
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    pub async fn insert_sample(&self, sample: &Sample) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO system_load (
                cpu_percent, gpu_percent, memory_percent, net_sent, net_recv, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample.cpu_percent)
        .bind(sample.gpu_percent)
        .bind(sample.memory_percent)
        .bind(sample.net_sent)
        .bind(sample.net_recv)
        .bind(sample.timestamp)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("inserted sample #{} at {}", id, sample.timestamp);
        Ok(id)
    }

    pub async fn insert_event(&self, event: &AlertEvent) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO event_log (message, level, timestamp) VALUES (?, ?, ?)",
        )
        .bind(&event.message)
        .bind(&event.level)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("inserted event #{}: {}", id, event.message);
        Ok(id)
    }

    /// Most recent samples, newest first by insert order.
    pub async fn recent_samples(&self, limit: i64) -> Result<Vec<Sample>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, cpu_percent, gpu_percent, memory_percent, net_sent, net_recv, timestamp
            FROM system_load
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(sample_from_row).collect())
    }

    /// Most recent events, newest first by insert order.
    pub async fn recent_events(&self, limit: i64) -> Result<Vec<AlertEvent>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, message, level, timestamp FROM event_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| AlertEvent {
                id: Some(r.get(0)),
                message: r.get(1),
                level: r.get(2),
                timestamp: r.get(3),
            })
            .collect())
    }

    /// Samples with `start <= timestamp <= end`, ascending. Used by CSV export.
    pub async fn samples_in_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<Sample>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, cpu_percent, gpu_percent, memory_percent, net_sent, net_recv, timestamp
            FROM system_load
            WHERE timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(sample_from_row).collect())
    }

    /// Delete all samples and events strictly older than `cutoff`, in one
    /// transaction. Returns (samples deleted, events deleted).
    pub async fn delete_older_than(&self, cutoff: i64) -> Result<(u64, u64), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let samples = sqlx::query("DELETE FROM system_load WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let events = sqlx::query("DELETE FROM event_log WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!("retention delete before {cutoff}: {samples} samples, {events} events");
        Ok((samples, events))
    }
}

fn sample_from_row(r: sqlx::sqlite::SqliteRow) -> Sample {
    Sample {
        id: Some(r.get(0)),
        cpu_percent: r.get(1),
        gpu_percent: r.get(2),
        memory_percent: r.get(3),
        net_sent: r.get(4),
        net_recv: r.get(5),
        timestamp: r.get(6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(ts: i64, cpu: f32) -> Sample {
        Sample {
            id: None,
            cpu_percent: cpu,
            gpu_percent: None,
            memory_percent: 40.0,
            net_sent: Some(1000.0),
            net_recv: Some(2000.0),
            timestamp: ts,
        }
    }

    fn event_at(ts: i64, message: &str) -> AlertEvent {
        AlertEvent {
            id: None,
            message: message.to_string(),
            level: "critical".to_string(),
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn insert_and_read_back_sample() {
        let store = LoadStore::memory().await.unwrap();
        let id = store.insert_sample(&sample_at(100, 55.5)).await.unwrap();
        assert!(id > 0);

        let samples = store.recent_samples(10).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].id, Some(id));
        assert_eq!(samples[0].cpu_percent, 55.5);
        assert_eq!(samples[0].gpu_percent, None);
        assert_eq!(samples[0].net_recv, Some(2000.0));
    }

    #[tokio::test]
    async fn recent_samples_are_newest_first() {
        let store = LoadStore::memory().await.unwrap();
        for ts in [100, 200, 300] {
            store.insert_sample(&sample_at(ts, 10.0)).await.unwrap();
        }

        let samples = store.recent_samples(2).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, 300);
        assert_eq!(samples[1].timestamp, 200);
    }

    #[tokio::test]
    async fn recent_events_are_newest_first() {
        let store = LoadStore::memory().await.unwrap();
        store.insert_event(&event_at(100, "first")).await.unwrap();
        store.insert_event(&event_at(200, "second")).await.unwrap();

        let events = store.recent_events(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "second");
        assert_eq!(events[1].message, "first");
    }

    #[tokio::test]
    async fn range_query_is_inclusive_and_ascending() {
        let store = LoadStore::memory().await.unwrap();
        for ts in [50, 100, 150, 200, 250] {
            store.insert_sample(&sample_at(ts, 10.0)).await.unwrap();
        }

        let samples = store.samples_in_range(100, 200).await.unwrap();
        let stamps: Vec<i64> = samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![100, 150, 200]);
    }

    #[tokio::test]
    async fn retention_delete_keeps_cutoff_and_newer() {
        let store = LoadStore::memory().await.unwrap();
        let day = 86_400;
        // one sample/event aged 6 days, one aged 1 day
        let now = 10 * day;
        store.insert_sample(&sample_at(now - 6 * day, 10.0)).await.unwrap();
        store.insert_sample(&sample_at(now - day, 20.0)).await.unwrap();
        store.insert_event(&event_at(now - 6 * day, "old")).await.unwrap();
        store.insert_event(&event_at(now - day, "fresh")).await.unwrap();

        let cutoff = now - 5 * day;
        let (samples, events) = store.delete_older_than(cutoff).await.unwrap();
        assert_eq!((samples, events), (1, 1));

        let remaining = store.recent_samples(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp, now - day);
        let remaining = store.recent_events(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "fresh");
    }

    #[tokio::test]
    async fn delete_at_exact_cutoff_is_preserved() {
        let store = LoadStore::memory().await.unwrap();
        store.insert_sample(&sample_at(500, 10.0)).await.unwrap();
        let (deleted, _) = store.delete_older_than(500).await.unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(store.recent_samples(10).await.unwrap().len(), 1);
    }
}
