//! HTTP API for the dashboard and CLI.
//!
//! Read endpoints go straight to the store; the only mutation is the
//! wholesale threshold replacement. Background-loop failures never surface
//! here, callers just see gaps in the series.

use crate::store::LoadStore;
use crate::thresholds::{ThresholdSet, ThresholdStore};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LoadStore>,
    pub thresholds: Arc<ThresholdStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/load", get(get_load))
        .route("/api/events", get(get_events))
        .route("/api/export", get(export_csv))
        .route("/api/thresholds", get(get_thresholds).post(set_thresholds))
        .with_state(state)
}

/// Structured error body, `{"error": "..."}` with a matching status code.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        log::error!("[api] store query failed: {err}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "storage error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    10
}

const MAX_LIMIT: i64 = 1000;

/// Negative limits would read as "no limit" in SQLite; cap both ends.
fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(0, MAX_LIMIT)
}

#[derive(Deserialize)]
struct RangeQuery {
    start: String,
    end: String,
}

#[derive(Serialize)]
struct LoadRow {
    cpu: f32,
    memory: f32,
    net_sent: Option<f64>,
    net_recv: Option<f64>,
    gpu_percent: Option<f32>,
    timestamp: String,
}

#[derive(Serialize)]
struct EventRow {
    message: String,
    level: String,
    timestamp: String,
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn get_load(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LoadRow>>, ApiError> {
    let samples = state.store.recent_samples(clamp_limit(query.limit)).await?;
    // GPU comes from the stored row, same as export. The old dashboard read
    // it live here, which disagreed with exported history.
    let rows = samples
        .into_iter()
        .map(|s| LoadRow {
            cpu: s.cpu_percent,
            memory: s.memory_percent,
            net_sent: s.net_sent,
            net_recv: s.net_recv,
            gpu_percent: s.gpu_percent,
            timestamp: format_ts(s.timestamp),
        })
        .collect();
    Ok(Json(rows))
}

async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<EventRow>>, ApiError> {
    let events = state.store.recent_events(clamp_limit(query.limit)).await?;
    let rows = events
        .into_iter()
        .map(|e| EventRow {
            message: e.message,
            level: e.level,
            timestamp: format_ts(e.timestamp),
        })
        .collect();
    Ok(Json(rows))
}

async fn export_csv(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let start = parse_ts(&query.start).ok_or_else(|| {
        ApiError::bad_request(format!(
            "invalid 'start' timestamp '{}': use ISO 8601 (e.g. 2025-04-15T10:00:00)",
            query.start
        ))
    })?;
    let end = parse_ts(&query.end).ok_or_else(|| {
        ApiError::bad_request(format!(
            "invalid 'end' timestamp '{}': use ISO 8601 (e.g. 2025-04-15T10:00:00)",
            query.end
        ))
    })?;

    let samples = state.store.samples_in_range(start, end).await?;

    let mut csv = String::from("timestamp,cpu_percent,gpu_percent,memory_percent,net_sent,net_recv\n");
    for s in &samples {
        let _ = writeln!(
            csv,
            "{},{},{},{},{},{}",
            format_ts(s.timestamp),
            s.cpu_percent,
            opt_field(s.gpu_percent),
            s.memory_percent,
            opt_field(s.net_sent),
            opt_field(s.net_recv),
        );
    }

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=export.csv",
            ),
        ],
        csv,
    )
        .into_response())
}

async fn get_thresholds(State(state): State<AppState>) -> Json<ThresholdSet> {
    Json(state.thresholds.get().await)
}

async fn set_thresholds(
    State(state): State<AppState>,
    Json(next): Json<ThresholdSet>,
) -> Result<Json<ThresholdSet>, ApiError> {
    state
        .thresholds
        .set(next)
        .await
        .map_err(ApiError::bad_request)?;
    Ok(Json(next))
}

fn format_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DDTHH:MM:SS` (treated as UTC).
fn parse_ts(text: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp());
    }
    text.parse::<NaiveDateTime>()
        .ok()
        .map(|naive| naive.and_utc().timestamp())
}

fn opt_field<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
