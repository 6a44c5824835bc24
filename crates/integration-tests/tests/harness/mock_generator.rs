//! Mock generator backend for integration tests
//!
//! Implements the OpenAI-compatible chat completions endpoint with a
//! configurable delay, failure count, and response text.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use tokio_util::sync::CancellationToken;

/// Commentary the mock returns unless told otherwise
pub const DEFAULT_COMMENTARY: &str =
    r#"{"summary": "Strong result overall.", "highlights": ["Geometry is secure"], "next_steps": ["Review algebra"]}"#;

/// Mock generator that returns predictable completions
pub struct MockGenerator {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    calls: AtomicU32,
    /// Number of requests to fail before succeeding
    fail_count: AtomicU32,
    delay: Duration,
    content: String,
}

/// Builder for a [`MockGenerator`]
#[derive(Default)]
pub struct MockGeneratorBuilder {
    fail_count: u32,
    delay: Duration,
    content: Option<String>,
}

impl MockGeneratorBuilder {
    /// Fail the first `n` requests with 500
    pub fn failing(mut self, n: u32) -> Self {
        self.fail_count = n;
        self
    }

    /// Hold every response for `delay`
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Return `content` as the completion text
    pub fn content(mut self, content: &str) -> Self {
        self.content = Some(content.to_owned());
        self
    }

    pub async fn start(self) -> anyhow::Result<MockGenerator> {
        let state = Arc::new(MockState {
            calls: AtomicU32::new(0),
            fail_count: AtomicU32::new(self.fail_count),
            delay: self.delay,
            content: self.content.unwrap_or_else(|| DEFAULT_COMMENTARY.to_owned()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

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

        Ok(MockGenerator { addr, shutdown, state })
    }
}

impl MockGenerator {
    pub fn builder() -> MockGeneratorBuilder {
        MockGeneratorBuilder::default()
    }

    /// Start a mock that answers immediately with valid commentary
    pub async fn start() -> anyhow::Result<Self> {
        Self::builder().start().await
    }

    /// Base URL for configuring the mock as the generator
    ///
    /// Includes `/v1` since the client appends `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Number of completion requests received
    pub fn calls(&self) -> u32 {
        self.state.calls.load(Ordering::SeqCst)
    }
}

impl Drop for MockGenerator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_chat_completions(
    State(state): State<Arc<MockState>>,
    Json(request): Json<serde_json::Value>,
) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let should_fail = state
        .fail_count
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if should_fail {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": {"message": "mock failure", "type": "server_error"}})),
        )
            .into_response();
    }

    Json(serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": request["model"],
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": state.content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 42, "completion_tokens": 17, "total_tokens": 59}
    }))
    .into_response()
}
