use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::connection::{self, Role};
use crate::registry::RelayRegistry;

/// Relay server configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5173,
            path: "/mouse".into(),
            max_send_queue: 256,
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
        }
    }
}

impl RelayConfig {
    /// Reject timing and queue values the relay tasks cannot run with.
    pub fn validate(&self) -> Result<(), std::io::Error> {
        let invalid = |msg: &str| std::io::Error::new(std::io::ErrorKind::InvalidInput, msg.to_string());
        if self.max_send_queue == 0 {
            return Err(invalid("max_send_queue must be non-zero"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(invalid("heartbeat_interval must be non-zero"));
        }
        if self.client_timeout.is_zero() {
            return Err(invalid("client_timeout must be non-zero"));
        }
        if self.client_timeout < self.heartbeat_interval {
            return Err(invalid("client_timeout must not be shorter than heartbeat_interval"));
        }
        Ok(())
    }
}

/// Shared state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RelayRegistry>,
    pub heartbeat_interval: Duration,
}

/// Build the router: the relay socket at `path` plus `/health`.
pub fn build_router(state: AppState, path: &str) -> Router {
    Router::new()
        .route(path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and start the relay. Returns a handle that owns the background tasks.
pub async fn start(config: RelayConfig) -> Result<RelayHandle, std::io::Error> {
    config.validate()?;
    let registry = Arc::new(RelayRegistry::new(config.max_send_queue));

    let cleanup = start_cleanup_task(
        Arc::clone(&registry),
        config.heartbeat_interval,
        config.client_timeout,
    );

    let state = AppState {
        registry: Arc::clone(&registry),
        heartbeat_interval: config.heartbeat_interval,
    };
    let router = build_router(state, &config.path);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, path = %config.path, "Mouse relay started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Relay server stopped");
        }
    });

    Ok(RelayHandle {
        local_addr,
        registry,
        server,
        cleanup,
    })
}

/// Handle returned by [`start`]; keeps the server and cleanup task alive.
pub struct RelayHandle {
    pub local_addr: SocketAddr,
    registry: Arc<RelayRegistry>,
    server: tokio::task::JoinHandle<()>,
    cleanup: tokio::task::JoinHandle<()>,
}

impl RelayHandle {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn registry(&self) -> &Arc<RelayRegistry> {
        &self.registry
    }

    /// Stop accepting connections and stop the cleanup task.
    pub fn shutdown(self) {
        self.server.abort();
        self.cleanup.abort();
    }
}

/// WebSocket upgrade handler. Classification happens here, before upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    RawQuery(query): RawQuery,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let role = connection::classify(query.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, role, state))
}

async fn handle_socket(socket: WebSocket, role: Role, state: AppState) {
    match role {
        Role::Producer => {
            let id = state.registry.register_producer();
            tracing::info!(producer = %id, "OBS mouse script connected");
            connection::handle_producer(socket, id, state.registry).await;
        }
        Role::Consumer => {
            let (id, rx) = state.registry.register_consumer();
            tracing::info!(consumer = %id, "Browser client connected");
            connection::handle_consumer(socket, id, rx, state.registry, state.heartbeat_interval).await;
        }
    }
}

/// Health check: producer presence and consumer count.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "producerConnected": state.registry.producer_connected(),
        "consumers": state.registry.consumer_count(),
    }))
}

/// Start a background task that periodically drops consumers that stopped
/// answering pings.
pub fn start_cleanup_task(
    registry: Arc<RelayRegistry>,
    interval: Duration,
    timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_consumers(timeout);
            if removed > 0 {
                tracing::info!(removed, "Dead consumer cleanup");
            }
        }
    })
}
