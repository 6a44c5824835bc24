//! Mock analytics service for integration tests

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use tokio_util::sync::CancellationToken;

type Snapshots = Arc<Mutex<HashMap<(String, String), serde_json::Value>>>;

/// Serves `/analytics/{subject_id}/{context_id}` from an in-memory map
pub struct MockAnalytics {
    addr: SocketAddr,
    shutdown: CancellationToken,
    snapshots: Snapshots,
}

impl MockAnalytics {
    pub async fn start() -> anyhow::Result<Self> {
        let snapshots = Snapshots::default();

        let app = Router::new()
            .route("/analytics/{subject_id}/{context_id}", routing::get(handle_analytics))
            .with_state(Arc::clone(&snapshots));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            snapshots,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Serve `analytics` for the pair
    pub fn set(&self, subject_id: &str, context_id: &str, analytics: serde_json::Value) {
        self.snapshots
            .lock()
            .unwrap()
            .insert((subject_id.to_owned(), context_id.to_owned()), analytics);
    }
}

impl Drop for MockAnalytics {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_analytics(
    State(snapshots): State<Snapshots>,
    Path((subject_id, context_id)): Path<(String, String)>,
) -> Response {
    let found = snapshots.lock().unwrap().get(&(subject_id, context_id)).cloned();
    match found {
        Some(analytics) => Json(analytics).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
