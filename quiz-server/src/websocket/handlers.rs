use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::AuthService;
use crate::lobby_manager::LobbyManager;
use crate::websocket::connection::{ConnectionId, ConnectionManager};
use quiz_types::{ClientMessage, Identity, LobbyError, ServerMessage};

/// Decodes one inbound command at a time for a single connection and
/// forwards it to the lobby registry. Outbound events come from the
/// registry; the handler only answers the caller directly on failure.
#[derive(Clone)]
pub struct MessageHandler {
    connection_id: ConnectionId,
    connection_manager: Arc<ConnectionManager>,
    lobby_manager: Arc<LobbyManager>,
    auth_service: Arc<AuthService>,
}

impl MessageHandler {
    pub fn new(
        connection_id: ConnectionId,
        connection_manager: Arc<ConnectionManager>,
        lobby_manager: Arc<LobbyManager>,
        auth_service: Arc<AuthService>,
    ) -> Self {
        Self {
            connection_id,
            connection_manager,
            lobby_manager,
            auth_service,
        }
    }

    pub async fn handle_message(&self, message: ClientMessage) -> Result<(), String> {
        self.connection_manager
            .update_activity(self.connection_id)
            .await;

        match message {
            ClientMessage::Authenticate { token } => self.handle_authenticate(token).await,
            ClientMessage::LivenessCheck { ack } => {
                self.send_message(ServerMessage::LivenessAck { ack }).await
            }
            command => {
                let Some(identity) = self
                    .connection_manager
                    .identity_of(self.connection_id)
                    .await
                else {
                    return self.send_error(&LobbyError::Unauthenticated).await;
                };

                match self.dispatch(&identity, command).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        info!(
                            connection_id = %self.connection_id,
                            player_id = %identity.id,
                            "Command rejected: {}",
                            e
                        );
                        self.send_error(&e).await
                    }
                }
            }
        }
    }

    async fn dispatch(&self, identity: &Identity, command: ClientMessage) -> Result<(), LobbyError> {
        let lobbies = &self.lobby_manager;
        match command {
            ClientMessage::JoinGroup { lobby_id } => {
                lobbies
                    .join_group(self.connection_id, identity, &lobby_id)
                    .await
            }
            ClientMessage::LeaveGroup { lobby_id } => {
                lobbies.leave_group(self.connection_id, &lobby_id).await;
                Ok(())
            }
            ClientMessage::CreateLobby {
                game_type,
                settings,
            } => lobbies
                .create_lobby(identity, game_type, settings)
                .await
                .map(|_| ()),
            ClientMessage::JoinLobby { lobby_id } => {
                lobbies.join_lobby(identity, &lobby_id).await.map(|_| ())
            }
            ClientMessage::ApproveJoin {
                lobby_id,
                player_id,
            } => lobbies.approve_join(identity, &lobby_id, player_id).await,
            ClientMessage::DenyJoin {
                lobby_id,
                player_id,
            } => lobbies.deny_join(identity, &lobby_id, player_id).await,
            ClientMessage::LeaveLobby { lobby_id } => {
                lobbies.leave_lobby(identity, &lobby_id).await.map(|_| ())
            }
            ClientMessage::SetReady { lobby_id, ready } => {
                lobbies.set_ready(identity, &lobby_id, ready).await
            }
            ClientMessage::UpdateSettings { lobby_id, settings } => {
                lobbies.update_settings(identity, &lobby_id, &settings).await
            }
            ClientMessage::SendChat { lobby_id, message } => {
                lobbies.send_chat(identity, &lobby_id, &message).await
            }
            ClientMessage::SubmitAnswer {
                lobby_id,
                selected_option,
                active_powerups,
            } => lobbies
                .submit_answer(identity, &lobby_id, &selected_option, &active_powerups)
                .await
                .map(|_| ()),
            ClientMessage::ActivatePowerup { lobby_id, powerup } => lobbies
                .activate_powerup(identity, &lobby_id, powerup)
                .await
                .map(|_| ()),
            ClientMessage::AdvanceRound { lobby_id } => {
                lobbies.advance_round(identity, &lobby_id).await
            }
            ClientMessage::Finalize { lobby_id } => {
                lobbies.finalize(&lobby_id, Some(identity.id)).await
            }
            ClientMessage::Authenticate { .. } | ClientMessage::LivenessCheck { .. } => Ok(()),
        }
    }

    /// A member who disconnects keeps their seat; absence is resolved by
    /// the round deadline and they may reconnect and rejoin the group.
    pub async fn handle_disconnect(&self) {
        if let Some(identity) = self
            .connection_manager
            .identity_of(self.connection_id)
            .await
        {
            if let Some(lobby_id) = self.lobby_manager.lobby_of(&identity.id) {
                info!(
                    connection_id = %self.connection_id,
                    player_id = %identity.id,
                    lobby_id = %lobby_id,
                    "Member connection dropped, seat kept"
                );
            }
        }
    }

    async fn handle_authenticate(&self, token: String) -> Result<(), String> {
        info!("Authenticating connection {}", self.connection_id);

        match self.auth_service.verify_token(&token).await {
            Ok(identity) => {
                let evicted = self
                    .connection_manager
                    .authenticate_connection(self.connection_id, identity.clone())
                    .await?;
                if !evicted.is_empty() {
                    info!(
                        player_id = %identity.id,
                        "Evicted {} older connection(s)",
                        evicted.len()
                    );
                }
                self.send_message(ServerMessage::Authenticated { identity })
                    .await
            }
            Err(e) => {
                warn!(
                    "Authentication failed for connection {}: {}",
                    self.connection_id, e
                );
                let error = LobbyError::from(e);
                self.send_message(ServerMessage::AuthenticationFailed {
                    reason: error.to_string(),
                })
                .await
            }
        }
    }

    async fn send_error(&self, error: &LobbyError) -> Result<(), String> {
        self.send_message(ServerMessage::error(error)).await
    }

    async fn send_message(&self, message: ServerMessage) -> Result<(), String> {
        self.connection_manager
            .send_to_connection(self.connection_id, message)
            .await
    }
}
