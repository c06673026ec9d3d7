//! HTTP status service.
//!
//! # Endpoints
//! - `GET /status`: live connections, version and git hash as JSON
//! - `GET /metrics`: Prometheus text snapshot

use std::future::Future;
use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::net::ConnectionTracker;
use crate::observability::metrics::Gatherer;
use crate::version;

#[derive(Clone)]
pub struct StatusState {
    pub tracker: ConnectionTracker,
    pub gatherer: Arc<dyn Gatherer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub connections: u64,
    pub version: String,
    pub git_hash: String,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves and every open request has finished.
pub async fn serve<F>(listener: TcpListener, state: StatusState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!(address = ?listener.local_addr().ok(), "Status service listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("Status service stopped");
    Ok(())
}

async fn get_status(State(state): State<StatusState>) -> Json<ServerStatus> {
    Json(ServerStatus {
        connections: state.tracker.active_count(),
        version: version::RELEASE_VERSION.to_string(),
        git_hash: version::git_hash().to_string(),
    })
}

async fn get_metrics(State(state): State<StatusState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.gatherer.gather(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Gatherer for Fixed {
        fn gather(&self) -> String {
            "dbserver_connections 0\n".to_string()
        }
    }

    #[tokio::test]
    async fn serves_status_and_metrics_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let tracker = ConnectionTracker::new();
        let _conn = tracker.track();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(serve(
            listener,
            StatusState {
                tracker,
                gatherer: Arc::new(Fixed),
            },
            async move {
                let _ = rx.await;
            },
        ));

        let status: ServerStatus = reqwest::get(format!("http://{addr}/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status.connections, 1);
        assert_eq!(status.version, version::RELEASE_VERSION);

        let body = reqwest::get(format!("http://{addr}/metrics"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "dbserver_connections 0\n");

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
