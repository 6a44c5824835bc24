//! HTTP surface for the snapcache commentary cache

mod analytics;
mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use snapcache_config::Config;
use snapcache_flight::Reconciler;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use analytics::HttpAnalytics;
pub use error::ApiError;
pub use routes::SnapshotView;
pub use state::AppState;

/// Assembled server with all routes and the optional reconciler loop
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    reconciler: Option<Arc<Reconciler>>,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any component fails to initialize
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let state = AppState::from_config(config)?;

        let mut app = Router::new();

        // Health check
        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(routes::health));
        }

        app = app.merge(routes::commentary_router(Arc::clone(&state.service)));

        app = app.layer(TraceLayer::new_for_http());

        // Only run the sweep loop when asked; `snapcache sweep` covers cron-style deployments
        let reconciler = state.reconciler.filter(|_| config.reconciler.enabled);

        Ok(Self {
            router: app,
            listen_address,
            reconciler,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered. The reconciler, if
    /// enabled, stops on the same token.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        self.serve_with_listener(listener, shutdown).await
    }

    /// Serve on an already-bound listener
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails
    pub async fn serve_with_listener(
        self,
        listener: tokio::net::TcpListener,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        let reconciler = self.reconciler.map(|reconciler| {
            let cancel = shutdown.child_token();
            tokio::spawn(async move { reconciler.run(cancel).await })
        });

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown({
                let shutdown = shutdown.clone();
                async move {
                    shutdown.cancelled().await;
                    tracing::info!("graceful shutdown initiated");
                }
            })
            .await;

        // Serving may end on error without the token firing
        shutdown.cancel();
        if let Some(handle) = reconciler
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "reconciler task failed");
        }

        served?;
        Ok(())
    }
}
