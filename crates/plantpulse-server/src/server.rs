//! The gateway's HTTP/WebSocket surface.
//!
//! One axum listener serves:
//! - `POST /login` - credential check, token issue
//! - `POST /logout` - token revocation
//! - `GET /tags` - the registry, for dashboard bootstrap
//! - `GET /stream` - the push channel: WebSocket upgrade, token-first
//!   handshake, then server-to-client tag frames
//!
//! Unauthenticated upgrade attempts are answered with an explicit error
//! frame and then closed - never silently dropped.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use plantpulse_core::{GatewayConfig, RegistryError, Tag, TagRegistry, TagUpdate};
use plantpulse_protocol::{
    decode_client_message, encode_server_message, error_codes, ApiError, ClientMessage,
    ErrorFrame, LoginRequest, LoginResponse, LogoutRequest, ServerMessage,
};

use crate::auth::{AuthError, CredentialStore, SessionAuthenticator, StaticCredentialStore};
use crate::hub::BroadcastHub;

/// How long a freshly upgraded channel gets to present its token.
const AUTH_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TagRegistry>,
    pub auth: Arc<SessionAuthenticator>,
    pub hub: Arc<BroadcastHub>,
}

/// The gateway server: owns the hub and authenticator as constructed
/// dependencies, with lifecycle tied to [`run`](GatewayServer::run).
pub struct GatewayServer {
    config: GatewayConfig,
    state: AppState,
}

impl GatewayServer {
    /// Wire a server from explicit parts.
    pub fn new(
        config: GatewayConfig,
        registry: Arc<TagRegistry>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let auth = Arc::new(SessionAuthenticator::new(
            credentials,
            config.token_lifetime(),
        ));
        let hub = Arc::new(BroadcastHub::new(
            registry.clone(),
            auth.clone(),
            config.stale_after(),
        ));

        Self {
            config,
            state: AppState {
                registry,
                auth,
                hub,
            },
        }
    }

    /// Wire a server entirely from configuration: registry from the tag
    /// table, static credential store from the user table.
    pub fn from_config(config: GatewayConfig) -> Result<Self, RegistryError> {
        let registry = Arc::new(TagRegistry::from_tags(config.tags.clone())?);
        let credentials = Arc::new(StaticCredentialStore::new(config.users.clone()));
        Ok(Self::new(config, registry, credentials))
    }

    /// The broadcast hub, for wiring and tests.
    pub fn hub(&self) -> Arc<BroadcastHub> {
        self.state.hub.clone()
    }

    /// The registry this server serves.
    pub fn registry(&self) -> Arc<TagRegistry> {
        self.state.registry.clone()
    }

    /// Spawn the task pumping poller updates into the hub. Returns when the
    /// sending side (the poller) goes away.
    pub fn spawn_update_pump(&self, mut updates: mpsc::Receiver<TagUpdate>) -> JoinHandle<()> {
        let hub = self.state.hub.clone();
        tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                hub.publish(update);
            }
            info!("update channel closed, pump stopped");
        })
    }

    /// Build the axum router. Exposed separately so tests can serve it on
    /// an ephemeral listener.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/login", post(login_handler))
            .route("/logout", post(logout_handler))
            .route("/tags", get(tags_handler))
            .route("/stream", get(stream_handler))
            // The dashboard app is served from elsewhere; allow it in
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until the process stops.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        info!("gateway listening on {}", self.config.listen_addr);
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Handler for `POST /login`.
async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Response {
    match state.auth.login(&req.username, &req.secret).await {
        Ok(token) => (StatusCode::OK, Json(LoginResponse { token })).into_response(),
        Err(_) => {
            info!(username = %req.username, "login rejected");
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiError {
                    error: error_codes::INVALID_CREDENTIALS.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Handler for `POST /logout`.
async fn logout_handler(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> StatusCode {
    state.auth.revoke(&req.token);
    StatusCode::NO_CONTENT
}

/// Handler for `GET /tags`: the registry as JSON.
async fn tags_handler(State(state): State<AppState>) -> Json<Vec<Tag>> {
    Json(state.registry.all().to_vec())
}

/// Handler for `GET /stream`: upgrade and hand off to the channel task.
async fn stream_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

/// Drive one push channel: token-first handshake, subscribe, then forward
/// hub frames to the socket until either side goes away.
async fn handle_stream(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // The client must present its token as the very first frame.
    let first = match tokio::time::timeout(AUTH_HANDSHAKE_TIMEOUT, ws_rx.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return,
        Ok(Some(Ok(_))) => {
            reject(
                &mut ws_tx,
                error_codes::AUTH_REQUIRED,
                "first frame must be a text auth frame",
            )
            .await;
            return;
        }
        Ok(Some(Err(e))) => {
            debug!(error = %e, "socket error during handshake");
            return;
        }
        Err(_) => {
            reject(
                &mut ws_tx,
                error_codes::AUTH_REQUIRED,
                "no auth frame received",
            )
            .await;
            return;
        }
    };

    let token = match decode_client_message(&first) {
        Ok(ClientMessage::Auth(auth)) => auth.token,
        Err(e) => {
            reject(
                &mut ws_tx,
                error_codes::AUTH_REQUIRED,
                format!("first frame must be an auth frame: {e}"),
            )
            .await;
            return;
        }
    };

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    let session_id = match state.hub.subscribe(&token, frame_tx) {
        Ok(id) => id,
        Err(e) => {
            let code = match e {
                AuthError::ExpiredToken => error_codes::TOKEN_EXPIRED,
                _ => error_codes::INVALID_TOKEN,
            };
            warn!(error = %e, "push subscription rejected");
            reject(&mut ws_tx, code, e.to_string()).await;
            return;
        }
    };

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                match frame {
                    Some(msg) => {
                        let text = match encode_server_message(&msg) {
                            Ok(text) => text,
                            Err(e) => {
                                error!(error = %e, "frame encode failed");
                                continue;
                            }
                        };
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    // The hub dropped this session (failed delivery path)
                    None => break,
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if ws_tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    // Frames after the handshake carry no meaning
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "socket error");
                        break;
                    }
                }
            }
        }
    }

    state.hub.unsubscribe(session_id);
}

/// Send an explicit error frame, then close.
async fn reject(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: &str,
    message: impl Into<String>,
) {
    let frame = ServerMessage::Error(ErrorFrame::new(code, message));
    if let Ok(text) = encode_server_message(&frame) {
        let _ = ws_tx.send(Message::Text(text)).await;
    }
    let _ = ws_tx.close().await;
}
