//! `CableServer`: axum router, listener and shared state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use cable_core::SUB_PROTOCOL;
use cable_settings::CableSettings;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::bus::{self, GroupBus};
use crate::channel::ChannelRegistry;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::{serve_socket, ConnectionTracker};
use crate::websocket::session::SessionDeps;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub deps: SessionDeps,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub tracker: Arc<ConnectionTracker>,
    pub start_time: Instant,
    pub max_message_size: usize,
}

pub struct CableServer {
    settings: CableSettings,
    registry: Arc<ChannelRegistry>,
    bus: Arc<dyn GroupBus>,
    shutdown: Arc<ShutdownCoordinator>,
    tracker: Arc<ConnectionTracker>,
    start_time: Instant,
}

impl CableServer {
    pub fn new(settings: CableSettings, registry: ChannelRegistry, bus: Arc<dyn GroupBus>) -> Self {
        let tracker = Arc::new(ConnectionTracker::new());
        Self {
            settings,
            registry: Arc::new(registry),
            bus,
            shutdown: Arc::new(ShutdownCoordinator::new(Arc::clone(&tracker))),
            tracker,
            start_time: Instant::now(),
        }
    }

    /// Build the router: WebSocket endpoint, `/health` and `/broadcast/{group}`.
    pub fn router(&self) -> Router {
        let state = AppState {
            deps: SessionDeps::from_settings(
                &self.settings,
                Arc::clone(&self.registry),
                Arc::clone(&self.bus),
            ),
            shutdown: Arc::clone(&self.shutdown),
            tracker: Arc::clone(&self.tracker),
            start_time: self.start_time,
            max_message_size: self.settings.server.max_message_size,
        };

        Router::new()
            .route(&self.settings.server.path, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/broadcast/{group}", post(broadcast_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind(self.settings.server.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %err, "server error");
            }
        });

        info!(%addr, path = %self.settings.server.path, "cable server listening");
        Ok(ServerHandle {
            addr,
            path: self.settings.server.path.clone(),
            task,
        })
    }

    pub fn settings(&self) -> &CableSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<dyn GroupBus> {
        &self.bus
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    pub fn connection_count(&self) -> usize {
        self.tracker.count()
    }
}

/// A running listener.
pub struct ServerHandle {
    pub addr: SocketAddr,
    path: String,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// `ws://` URL of the cable endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, self.path)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

/// GET on the cable path: upgrade with the ActionCable sub-protocol.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.protocols([SUB_PROTOCOL])
        .max_message_size(state.max_message_size)
        .on_upgrade(move |socket| {
            serve_socket(socket, state.deps, state.shutdown.token(), state.tracker)
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.tracker.count(),
        state.deps.registry.channels(),
    ))
}

#[derive(Debug, Serialize)]
struct BroadcastResponse {
    group: String,
    delivered: usize,
}

/// POST /broadcast/{group}: publish the JSON body to a group.
async fn broadcast_handler(
    State(state): State<AppState>,
    Path(group): Path<String>,
    Json(data): Json<Value>,
) -> Response {
    match bus::broadcast(state.deps.bus.as_ref(), &group, Some(data)).await {
        Ok(delivered) => Json(BroadcastResponse { group, delivered }).into_response(),
        Err(err) => {
            warn!(group = %group, error = %err, "broadcast failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
