//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for container
//! health checks. The monitor is ready once its state store has
//! loaded and the node poller is running.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// Shared health state polled by readiness probes.
#[derive(Debug, Default)]
pub struct HealthState {
    /// Whether the state store finished loading.
    pub store_loaded: AtomicBool,
    /// Whether the node health poller is running.
    pub poller_running: AtomicBool,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the monitor is fully up.
    pub fn is_ready(&self) -> bool {
        self.store_loaded.load(Ordering::Relaxed) && self.poller_running.load(Ordering::Relaxed)
    }

    /// Report the poller as running until its task ends, for any reason.
    pub fn track_poller(self: &Arc<Self>, poller: JoinHandle<()>) -> JoinHandle<()> {
        self.poller_running.store(true, Ordering::Relaxed);
        let state = Arc::clone(self);

        tokio::spawn(async move {
            match poller.await {
                Ok(()) => info!("Node health poller exited"),
                Err(e) => error!(error = %e, "Node health poller died"),
            }
            if state.poller_running.swap(false, Ordering::Relaxed) {
                warn!("Readiness dropped: node health poller is not running");
            }
        })
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with all components.
    state: Arc<HealthState>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Run the health check server until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 only once the store and poller are up.
    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_requires_store_and_poller() {
        let state = HealthState::new();
        assert!(!state.is_ready());

        state.store_loaded.store(true, Ordering::Relaxed);
        assert!(!state.is_ready());

        state.poller_running.store(true, Ordering::Relaxed);
        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn test_dead_poller_is_not_ready() {
        let state = Arc::new(HealthState::new());
        state.store_loaded.store(true, Ordering::Relaxed);

        let (crash_tx, crash_rx) = tokio::sync::oneshot::channel::<()>();
        let tracker = state.track_poller(tokio::spawn(async move {
            let _ = crash_rx.await;
            panic!("poller crashed");
        }));
        assert!(state.is_ready());

        crash_tx.send(()).unwrap();
        tracker.await.unwrap();
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_stopped_poller_is_not_ready() {
        let state = Arc::new(HealthState::new());
        state.store_loaded.store(true, Ordering::Relaxed);

        let tracker = state.track_poller(tokio::spawn(async {}));
        tracker.await.unwrap();
        assert!(!state.is_ready());
    }
}
