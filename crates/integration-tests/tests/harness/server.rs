//! Test server wrapper that starts snapcache on a random port

use std::net::SocketAddr;
use std::time::Duration;

use snapcache_config::Config;
use snapcache_server::Server;
use tokio_util::sync::CancellationToken;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    /// Start a test server with the given configuration
    ///
    /// Binds to port 0 for automatic port assignment. The reconciler runs
    /// when the configuration enables it.
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let server = Server::new(&config)?;
        let shutdown = CancellationToken::new();

        // Bind the listener here so we know the actual port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let token = shutdown.clone();
        tokio::spawn(async move {
            server.serve_with_listener(listener, token).await.ok();
        });

        let client = reqwest::Client::new();

        Ok(Self { addr, shutdown, client })
    }

    /// Base URL of the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Get a reference to the HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `POST /v1/commentary/...` with the given analytics
    pub async fn commentary(&self, key: &str, analytics: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/v1/commentary/{key}")))
            .json(analytics)
            .send()
            .await
            .expect("commentary request")
    }

    /// `POST /v1/snapshots/.../enqueue` with the given analytics
    pub async fn enqueue(&self, key: &str, analytics: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/v1/snapshots/{key}/enqueue")))
            .json(analytics)
            .send()
            .await
            .expect("enqueue request")
    }

    /// `GET /v1/snapshots/...`
    pub async fn snapshot(&self, key: &str) -> reqwest::Response {
        self.client
            .get(self.url(&format!("/v1/snapshots/{key}")))
            .send()
            .await
            .expect("snapshot request")
    }

    /// Poll the stored row until `status` matches or `timeout` passes
    pub async fn wait_for_status(&self, key: &str, status: &str, timeout: Duration) -> Option<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            let resp = self.snapshot(key).await;
            if resp.status() == 200 {
                let row: serde_json::Value = resp.json().await.ok()?;
                if row["status"] == status {
                    return Some(row);
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        None
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
