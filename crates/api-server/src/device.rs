//! Device-facing endpoints: registration and the WebSocket session.
//!
//! Authentication happens before the upgrade, so a bad api key gets a plain
//! 401 rather than a socket that is immediately torn down. Inbound frames
//! that fail to parse are logged and dropped; a misbehaving device cannot
//! kill its own session with a malformed payload.

use crate::rest::{ApiError, AppState};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use billboard_core::error::FleetError;
use billboard_core::protocol::{DeviceMessage, RegisterRequest, ServerMessage};
use billboard_core::types::Billboard;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// POST /billboard/register. Idempotent: the agent calls it on every boot
/// to refresh its version and capabilities.
pub async fn register_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<Billboard>, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| FleetError::Auth("missing bearer token".to_string()))?;
    let billboard = state
        .billboards
        .get(&request.billboard_id)
        .ok_or_else(|| FleetError::NotFound(format!("billboard {}", request.billboard_id)))?;
    if billboard.api_key != token {
        warn!(billboard_id = %request.billboard_id, "Registration with bad api key");
        return Err(FleetError::Auth("invalid api key".to_string()).into());
    }

    let updated = state.billboards.update_registration(
        &request.billboard_id,
        &request.agent_version,
        request.capabilities,
    )?;
    info!(
        billboard_id = %request.billboard_id,
        agent_version = %request.agent_version,
        "Device registered"
    );
    metrics::counter!("device.registrations").increment(1);
    Ok(Json(updated))
}

/// GET /billboard/:id/connect — WebSocket upgrade for the device session.
pub async fn connect_device(
    State(state): State<AppState>,
    Path(billboard_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| FleetError::Auth("missing bearer token".to_string()))?
        .to_string();
    let rx = state.fleet.connect(&billboard_id, &token)?;
    Ok(ws.on_upgrade(move |socket| serve_device(state, billboard_id, rx, socket)))
}

async fn serve_device(
    state: AppState,
    billboard_id: String,
    mut rx: UnboundedReceiver<ServerMessage>,
    socket: WebSocket,
) {
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<DeviceMessage>(&text) {
                Ok(message) => state.fleet.handle_inbound(&billboard_id, message),
                Err(e) => {
                    warn!(billboard_id = %billboard_id, error = %e, "Unparseable device frame dropped");
                    metrics::counter!("device.bad_frames").increment(1);
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    writer.abort();
    state.fleet.disconnect(&billboard_id);
    info!(billboard_id = %billboard_id, "Device socket closed");
}
