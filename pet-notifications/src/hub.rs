//! HTTP and WebSocket surface of the notification service.
//!
//! - `GET <hub path>`: WebSocket upgrade. The bearer token is read from the
//!   `Authorization` header or the `access_token` query parameter. A missing
//!   token gives an anonymous connection that only receives broadcasts; an
//!   invalid one is refused with `401`.
//! - `GET /health`: subscriber state and live connection count.

use crate::gateway::{ConnectionRegistry, Frame};
use crate::subscriber::SubscriberState;
use axum::extract::rejection::QueryRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use pet_auth::{AuthError, BearerAuthenticator, ACCESS_TOKEN_PARAM};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Path of the liveness endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Shared state for the hub handlers.
#[derive(Clone)]
pub struct HubState {
    registry: Arc<ConnectionRegistry>,
    authenticator: Arc<BearerAuthenticator>,
    subscriber_state: watch::Receiver<SubscriberState>,
    shutdown: CancellationToken,
}

impl HubState {
    /// Create hub state.
    ///
    /// # Arguments
    ///
    /// * `registry` - Live connection registry shared with the dispatcher
    /// * `authenticator` - Validates client bearer tokens
    /// * `subscriber_state` - Subscriber lifecycle, reported by `/health`
    /// * `shutdown` - Closes open sockets when cancelled
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        authenticator: Arc<BearerAuthenticator>,
        subscriber_state: watch::Receiver<SubscriberState>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            authenticator,
            subscriber_state,
            shutdown,
        }
    }
}

/// Body of the `/health` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// `ok` while consuming, `degraded` otherwise
    pub status: String,
    /// Subscriber lifecycle state
    pub subscriber: SubscriberState,
    /// Live WebSocket connections
    pub connections: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Build the axum router (separated for testing).
///
/// # Arguments
///
/// * `hub_path` - Path of the WebSocket endpoint, e.g. `/hubs/notifications`
/// * `state` - Shared handler state
pub fn router(hub_path: &str, state: HubState) -> Router {
    Router::new()
        .route(hub_path, get(hub))
        .route(HEALTH_PATH, get(health))
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Notification hub listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(state): State<HubState>) -> Json<HealthResponse> {
    let subscriber = *state.subscriber_state.borrow();
    let status = if subscriber == SubscriberState::Consuming {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status: status.to_string(),
        subscriber,
        connections: state.registry.connection_count().await,
    })
}

async fn hub(
    State(state): State<HubState>,
    headers: HeaderMap,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let params = query.map(|Query(params)| params).unwrap_or_default();
    let query_token = params.get(ACCESS_TOKEN_PARAM).map(String::as_str);

    let claims = match state.authenticator.authenticate(authorization, query_token) {
        Ok(claims) => claims,
        Err(e) => return reject(e),
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let user_id = claims.and_then(|c| c.domain_user_id());
    upgrade.on_upgrade(move |socket| run_connection(socket, state, user_id))
}

fn reject(e: AuthError) -> Response {
    if e.is_server_error() {
        error!(error = %e, "Hub authentication failed");
    } else {
        debug!(error = %e, "Hub connection refused");
    }
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorBody {
        error: e.error_code(),
        message: e.to_string(),
    };
    (status, Json(body)).into_response()
}

// ============================================================================
// Connection task
// ============================================================================

async fn run_connection(socket: WebSocket, state: HubState, user_id: Option<String>) {
    let handle = state.registry.on_connect(user_id).await;
    let id = handle.id;
    let mut outbound = handle.outbound;
    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if !send_frame(&mut sink, &frame).await {
                    break;
                }
            }
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection_id = %id, error = %e, "WebSocket receive failed");
                    break;
                }
            },
        }
    }

    state.registry.on_disconnect(id).await;
}

async fn send_frame<S>(sink: &mut S, frame: &Frame) -> bool
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let text = match frame.to_json() {
        Ok(text) => text,
        Err(e) => {
            warn!(event = %frame.event, error = %e, "Failed to encode frame");
            return true;
        }
    };
    sink.send(Message::Text(text)).await.is_ok()
}
