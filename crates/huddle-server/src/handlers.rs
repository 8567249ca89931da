//! Connection handlers for Huddle server.
//!
//! This module owns the HTTP router and the per-connection WebSocket loop.
//! Each connection handles its inbound frames one at a time and drains its
//! outbound queue into the socket.

use crate::api;
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use huddle_core::{ChatError, ConnectionId, Maintenance, Outbound, RoomManager};
use huddle_protocol::codec;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Rooms, sessions and moderation.
    pub manager: Arc<RoomManager>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state over an in-memory store.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            manager: Arc::new(RoomManager::in_memory(config.chat_config())),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let maintenance = config.maintenance_config();
    let _maintenance = Maintenance::spawn(state.manager.clone(), &maintenance);
    let room_gauge = metrics::spawn_room_gauge(state.manager.clone(), maintenance.room_sweep_interval);

    let app = router(state);

    let listener = TcpListener::bind(addr).await?;

    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    room_gauge.abort();

    info!("Huddle server stopped");
    Ok(())
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let prefix = state.config.transport.api_prefix.trim_end_matches('/');
    let app = Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler));

    let app = if prefix.is_empty() {
        app.merge(api::routes())
    } else {
        app.nest(prefix, api::routes())
    };

    app.with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    if state.manager.connections().len() >= state.config.limits.max_connections {
        warn!("Connection limit reached, rejecting upgrade");
        metrics::record_error("connection_limit");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (tx, mut outbound) = mpsc::unbounded_channel();
    let connection = state.manager.connect(tx);

    debug!(connection = %connection, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;

            // Drain what the core queued for this connection
            Some(item) = outbound.recv() => {
                let closing = matches!(item, Outbound::Close);
                let Some(message) = to_ws_message(&connection, item) else {
                    continue;
                };
                if let Message::Text(text) = &message {
                    metrics::record_message(text.len(), "outbound");
                }
                if sender.send(message).await.is_err() || closing {
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_message(text.len(), "inbound");
                        let start = Instant::now();
                        let result = state.manager.handle_text(&connection, &text).await;
                        record_outcome(result);
                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        metrics::record_message(data.len(), "inbound");
                        let start = Instant::now();
                        let result = state.manager.handle_bytes(&connection, &data).await;
                        record_outcome(result);
                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        state.manager.touch_connection(&connection);
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.manager.disconnect(&connection).await;

    debug!(connection = %connection, "WebSocket disconnected");
}

/// Map a queued item to the frame that carries it.
fn to_ws_message(connection: &ConnectionId, item: Outbound) -> Option<Message> {
    match item {
        Outbound::Event(event) => match codec::encode(&event) {
            Ok(text) => Some(Message::Text(text)),
            Err(e) => {
                error!(connection = %connection, error = %e, "Failed to encode event");
                None
            }
        },
        Outbound::Ping => Some(Message::Ping(Vec::new())),
        Outbound::Close => Some(Message::Close(None)),
    }
}

/// The client has already been told; only metrics remain.
fn record_outcome(result: Result<(), ChatError>) {
    if let Err(e) = result {
        metrics::record_error(e.kind());
    }
}
