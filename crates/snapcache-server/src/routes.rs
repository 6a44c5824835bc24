//! Commentary and snapshot endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use http::StatusCode;
use serde::Serialize;
use snapcache_core::{AnalyticsSnapshot, Snapshot, SnapshotKey, Status};
use snapcache_flight::{CommentaryService, Enqueue};

use crate::error::ApiError;

/// Path segments identifying one snapshot
type KeyPath = Path<(String, String, String)>;

/// Persisted row plus whether it answers the request's input
#[derive(Debug, Serialize)]
pub struct SnapshotView {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub fresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'static str>,
}

/// Build the commentary router
pub fn commentary_router(service: Arc<CommentaryService>) -> Router {
    Router::new()
        .route("/v1/commentary/{subject_id}/{context_id}/{audience}", routing::post(commentary))
        .route("/v1/snapshots/{subject_id}/{context_id}/{audience}", routing::get(snapshot))
        .route(
            "/v1/snapshots/{subject_id}/{context_id}/{audience}/enqueue",
            routing::post(enqueue),
        )
        .with_state(service)
}

/// Liveness probe
pub async fn health() -> &'static str {
    "ok"
}

fn parse_key(Path((subject_id, context_id, audience)): KeyPath) -> Result<SnapshotKey, ApiError> {
    Ok(SnapshotKey::parse(&subject_id, &context_id, &audience)?)
}

/// Handle `POST /v1/commentary/{subject_id}/{context_id}/{audience}`
async fn commentary(
    State(service): State<Arc<CommentaryService>>,
    path: KeyPath,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<SnapshotView>, ApiError> {
    let key = parse_key(path)?;
    let lookup = service.commentary(&key, &AnalyticsSnapshot::new(body)).await?;

    Ok(Json(SnapshotView {
        fresh: lookup.is_fresh(),
        outcome: Some(lookup.outcome.as_str()),
        snapshot: lookup.snapshot,
    }))
}

/// Handle `GET /v1/snapshots/{subject_id}/{context_id}/{audience}`
async fn snapshot(State(service): State<Arc<CommentaryService>>, path: KeyPath) -> Result<Json<SnapshotView>, ApiError> {
    let key = parse_key(path)?;
    let row = service
        .snapshot(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(key.to_string()))?;

    Ok(Json(SnapshotView {
        fresh: row.status == Status::Ready,
        outcome: None,
        snapshot: row,
    }))
}

/// Handle `POST /v1/snapshots/{subject_id}/{context_id}/{audience}/enqueue`
async fn enqueue(
    State(service): State<Arc<CommentaryService>>,
    path: KeyPath,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    let key = parse_key(path)?;

    let (status, row, fresh) = match service.enqueue(&key, &AnalyticsSnapshot::new(body)).await? {
        Enqueue::Queued(row) => (StatusCode::ACCEPTED, row, false),
        Enqueue::AlreadyReady(row) => (StatusCode::OK, row, true),
        Enqueue::Held(row) => (StatusCode::CONFLICT, row, false),
    };

    let view = SnapshotView {
        snapshot: row,
        fresh,
        outcome: None,
    };
    Ok((status, Json(view)).into_response())
}
