use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use learning::ActionResult;
use pipeline::IntentResponse;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Query parameters accepted by the gesture intent endpoints.
#[derive(Debug, Deserialize)]
pub struct IntentParams {
    /// User the gestures belong to. Defaults to `anonymous`.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl IntentParams {
    fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or("anonymous")
    }
}

/// Request body for the HTTP intent endpoint.
///
/// The gesture message is carried inline, so a request looks exactly like one
/// WebSocket frame plus an optional `user_id`:
///
/// ```json
/// {
///   "user_id": "user-1",
///   "message": {
///     "intent": "select",
///     "intensity": 0.8,
///     "context": { "currentDocumentName": "scene.gltf" }
///   }
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct IntentRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    pub message: serde_json::Value,
}

/// Process a single gesture message over HTTP.
pub async fn handle_intent(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<IntentRequest>,
) -> ServerResult<impl IntoResponse> {
    let user_id = request.user_id.as_deref().unwrap_or("anonymous");
    let response = state.pipeline.handle_intent(user_id, &request.message).await;
    Ok(Json(response))
}

/// Upgrade to a WebSocket session streaming gesture messages.
///
/// Each text frame is one gestural JSON message; each frame gets exactly one
/// JSON response frame back, in order.
pub async fn intent_socket(
    ws: WebSocketUpgrade,
    Query(params): Query<IntentParams>,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let user_id = params.user_id().to_string();
    ws.on_upgrade(move |socket| intent_session(socket, state, user_id))
}

async fn intent_session(mut socket: WebSocket, state: Arc<ServerState>, user_id: String) {
    info!(user_id = %user_id, "gesture intent session opened");

    while let Some(frame) = socket.recv().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "websocket receive error");
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                let response = match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(raw) => state.pipeline.handle_intent(&user_id, &raw).await,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "malformed gesture frame");
                        IntentResponse {
                            status: ActionResult::Error,
                            message: format!("Invalid JSON message: {e}"),
                            modified_embedding_id: None,
                            available_gestures: None,
                        }
                    }
                };

                let payload = match serde_json::to_string(&response) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "failed to serialize response");
                        continue;
                    }
                };

                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            Message::Ping(data) => {
                if socket.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!(user_id = %user_id, "gesture intent session closed");
}
