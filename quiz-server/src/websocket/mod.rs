use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};
use warp::ws::{Message, WebSocket};

use crate::auth::AuthService;
use crate::lobby_manager::LobbyManager;
use quiz_types::{ClientMessage, LobbyError, ServerMessage};

pub mod connection;
pub mod handlers;
pub mod rate_limiter;


use connection::ConnectionId;
pub use connection::ConnectionManager;
use handlers::MessageHandler;
use rate_limiter::RateLimiter;

/// Consecutive rate-limited frames tolerated before the socket is closed.
const MAX_RATE_LIMIT_STRIKES: u32 = 3;

pub async fn handle_connection(
    websocket: WebSocket,
    connection_manager: Arc<ConnectionManager>,
    lobby_manager: Arc<LobbyManager>,
    auth_service: Arc<AuthService>,
) {
    let connection_id = ConnectionId::new();
    info!("New WebSocket connection: {}", connection_id);

    let (mut ws_sender, mut ws_receiver) = websocket.split();

    let message_receiver = connection_manager.create_connection(connection_id).await;

    let message_handler = MessageHandler::new(
        connection_id,
        connection_manager.clone(),
        lobby_manager,
        auth_service,
    );

    let incoming_handler = {
        let message_handler = message_handler.clone();
        let connection_manager = connection_manager.clone();

        async move {
            let mut rate_limiter = RateLimiter::new();
            let mut strikes = 0;

            while let Some(result) = ws_receiver.next().await {
                let msg = match result {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("WebSocket error for {}: {}", connection_id, e);
                        break;
                    }
                };
                if msg.is_close() {
                    break;
                }

                if !rate_limiter.check_rate_limit() {
                    strikes += 1;
                    warn!(
                        "Rate limit exceeded for connection {} ({} strikes)",
                        connection_id, strikes
                    );
                    let error = LobbyError::conflict("rate limit exceeded, slow down");
                    let _ = connection_manager
                        .send_to_connection(connection_id, ServerMessage::error(&error))
                        .await;
                    if strikes >= MAX_RATE_LIMIT_STRIKES {
                        break;
                    }
                    continue;
                }
                strikes = 0;

                if let Err(e) =
                    handle_message(msg, &message_handler, &connection_manager, connection_id)
                        .await
                {
                    error!("Error handling message for {}: {}", connection_id, e);
                    break;
                }
            }
        }
    };

    let outgoing_handler = async move {
        let mut receiver = message_receiver;

        while let Some(message) = receiver.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize message: {:?}", e);
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::text(json)).await {
                warn!("Failed to send message to {}: {:?}", connection_id, e);
                break;
            }
        }

        // Sender dropped: the connection was evicted or removed.
        let _ = ws_sender.close().await;
    };

    tokio::select! {
        _ = incoming_handler => {},
        _ = outgoing_handler => {},
    }

    info!("Connection {} disconnected", connection_id);
    message_handler.handle_disconnect().await;
    connection_manager.remove_connection(connection_id).await;
}

async fn handle_message(
    msg: Message,
    message_handler: &MessageHandler,
    connection_manager: &ConnectionManager,
    connection_id: ConnectionId,
) -> Result<(), String> {
    if !msg.is_text() {
        return Ok(());
    }

    let text = msg.to_str().map_err(|_| "Invalid text message".to_string())?;

    let client_message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            let error = LobbyError::invalid_input(format!("invalid message: {}", e));
            return connection_manager
                .send_to_connection(connection_id, ServerMessage::error(&error))
                .await;
        }
    };

    message_handler
        .handle_message(client_message)
        .await
        .map_err(|e| format!("Message handling error: {}", e))
}
