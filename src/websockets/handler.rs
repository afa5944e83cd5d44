use axum::{
    extract::{ws::WebSocket, Path, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::connection_manager::Registration;
use super::socket::{Connection, ViewerMessageHandler};
use crate::shared::{AppError, AppState};

/// WebSocket endpoint that handles authentication via Sec-WebSocket-Protocol header
/// GET /ws/contests/:contest_id with JWT token in Sec-WebSocket-Protocol header
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(contest_id): Path<Uuid>,
    headers: HeaderMap,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    info!(contest_id = %contest_id, "WebSocket connection requested");

    let jwt_token = headers
        .get("sec-websocket-protocol")
        .and_then(|h| h.to_str().ok())
        .map(|raw| raw.split(',').next().unwrap_or_default().trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            warn!("Missing or invalid Sec-WebSocket-Protocol header");
            AppError::Unauthorized("Missing authentication token".to_string())
        })?;

    let claims = app_state
        .token_config
        .validate_token(&jwt_token)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
    let user_id = claims.actor_id()?;

    if app_state
        .contest_repository
        .get_contest(contest_id)
        .await?
        .is_none()
    {
        warn!(contest_id = %contest_id, "Contest not found, rejecting WebSocket connection");
        return Err(AppError::NotFound("Contest not found".to_string()));
    }

    info!(
        contest_id = %contest_id,
        user_id = %user_id,
        "WebSocket authentication successful"
    );
    Ok(ws
        .protocols([jwt_token])
        .on_upgrade(move |socket| handle_websocket_connection(socket, contest_id, user_id, app_state)))
}

/// Handle the upgraded WebSocket connection
async fn handle_websocket_connection(
    socket: WebSocket,
    contest_id: Uuid,
    user_id: Uuid,
    app_state: AppState,
) {
    let connection_id = Uuid::new_v4();
    let config = app_state.connection_config.clone();
    let (outbound_sender, outbound_receiver) = mpsc::channel::<String>(config.outbound_capacity);

    app_state
        .connection_manager
        .register(Registration {
            connection_id,
            user_id,
            contest_id,
            outbound: outbound_sender,
        })
        .await;

    let connection = Connection::new(
        connection_id,
        Box::new(socket),
        outbound_receiver,
        Arc::new(ViewerMessageHandler),
        app_state.connection_manager.clone(),
        config.ping_interval,
    );

    match connection.run().await {
        Ok(()) => {
            info!(
                connection_id = %connection_id,
                contest_id = %contest_id,
                user_id = %user_id,
                "WebSocket connection closed cleanly"
            );
        }
        Err(e) => {
            warn!(
                connection_id = %connection_id,
                contest_id = %contest_id,
                error = ?e,
                "WebSocket connection error"
            );
        }
    }

    app_state.connection_manager.unregister(connection_id).await;
}
