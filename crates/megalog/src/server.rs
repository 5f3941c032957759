//! Debug HTTP endpoint for the most recent record

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use megalog_core::realtime::{hex_dump, ChannelValue, SnapshotReader};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
struct ChannelsResponse {
    sequence: u64,
    received_at: DateTime<Utc>,
    values: BTreeMap<String, ChannelValue>,
    errors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    records: u64,
    last_received_at: Option<DateTime<Utc>>,
    age_ms: Option<i64>,
}

pub fn router(reader: SnapshotReader) -> Router {
    Router::new()
        .route("/", get(raw_dump))
        .route("/channels", get(channels))
        .route("/status", get(status))
        .with_state(reader)
}

/// Hex dump of the latest raw record; empty until the first record arrives
async fn raw_dump(State(reader): State<SnapshotReader>) -> String {
    reader
        .latest()
        .map(|snapshot| hex_dump(&snapshot.raw))
        .unwrap_or_default()
}

async fn channels(
    State(reader): State<SnapshotReader>,
) -> Result<Json<ChannelsResponse>, StatusCode> {
    let snapshot = reader.latest().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(ChannelsResponse {
        sequence: snapshot.sequence,
        received_at: snapshot.received_at,
        values: snapshot.record.values.clone(),
        errors: snapshot.record.errors.iter().map(ToString::to_string).collect(),
    }))
}

async fn status(State(reader): State<SnapshotReader>) -> Json<StatusResponse> {
    let latest = reader.latest();
    Json(StatusResponse {
        records: latest.as_ref().map_or(0, |s| s.sequence),
        last_received_at: latest.as_ref().map(|s| s.received_at),
        age_ms: latest
            .as_ref()
            .map(|s| (Utc::now() - s.received_at).num_milliseconds()),
    })
}
