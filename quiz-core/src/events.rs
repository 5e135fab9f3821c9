use chrono::{DateTime, Utc};
use quiz_types::{
    ChatMessage, GameSettings, JoinRequest, LobbyId, LobbyPlayer, LobbyStatus, PlayerId,
    PlayerScoreSummary, PublicQuestion, RoundReveal, ServerMessage, SessionId,
};

/// Domain events produced by lobby mutations, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    LobbyUpdated {
        lobby_id: LobbyId,
        status: LobbyStatus,
        host: PlayerId,
        players: Vec<LobbyPlayer>,
        join_requests: Vec<JoinRequest>,
    },
    SettingsUpdated {
        lobby_id: LobbyId,
        settings: GameSettings,
    },
    ChatPosted {
        lobby_id: LobbyId,
        message: ChatMessage,
    },
    JoinRequested {
        lobby_id: LobbyId,
        request: JoinRequest,
    },
    /// A pending request was denied or cancelled; only the requester hears about it.
    JoinRequestDropped {
        lobby_id: LobbyId,
        player_id: PlayerId,
    },
    RoundStarted {
        lobby_id: LobbyId,
        session_id: SessionId,
        round_index: u32,
        total_rounds: u32,
        question: PublicQuestion,
        deadline: DateTime<Utc>,
    },
    PlayerSubmitted {
        lobby_id: LobbyId,
        round_index: u32,
        player_id: PlayerId,
    },
    RoundExtended {
        lobby_id: LobbyId,
        round_index: u32,
        deadline: DateTime<Utc>,
    },
    RoundRevealed {
        lobby_id: LobbyId,
        reveal: RoundReveal,
    },
    SessionFinished {
        lobby_id: LobbyId,
        session_id: SessionId,
        results: Vec<PlayerScoreSummary>,
    },
    LobbyClosed {
        lobby_id: LobbyId,
        reason: String,
    },
}

/// Who should receive an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Group,
    Player(PlayerId),
}

impl LobbyEvent {
    pub fn lobby_id(&self) -> &LobbyId {
        match self {
            LobbyEvent::LobbyUpdated { lobby_id, .. }
            | LobbyEvent::SettingsUpdated { lobby_id, .. }
            | LobbyEvent::ChatPosted { lobby_id, .. }
            | LobbyEvent::JoinRequested { lobby_id, .. }
            | LobbyEvent::JoinRequestDropped { lobby_id, .. }
            | LobbyEvent::RoundStarted { lobby_id, .. }
            | LobbyEvent::PlayerSubmitted { lobby_id, .. }
            | LobbyEvent::RoundExtended { lobby_id, .. }
            | LobbyEvent::RoundRevealed { lobby_id, .. }
            | LobbyEvent::SessionFinished { lobby_id, .. }
            | LobbyEvent::LobbyClosed { lobby_id, .. } => lobby_id,
        }
    }

    pub fn audience(&self) -> Audience {
        match self {
            LobbyEvent::JoinRequestDropped { player_id, .. } => Audience::Player(*player_id),
            _ => Audience::Group,
        }
    }

    pub fn into_message(self) -> ServerMessage {
        match self {
            LobbyEvent::LobbyUpdated {
                lobby_id,
                status,
                host,
                players,
                join_requests,
            } => ServerMessage::LobbyUpdated {
                lobby_id,
                status,
                host,
                players,
                join_requests,
            },
            LobbyEvent::SettingsUpdated { lobby_id, settings } => {
                ServerMessage::SettingsUpdated { lobby_id, settings }
            }
            LobbyEvent::ChatPosted { lobby_id, message } => {
                ServerMessage::ChatUpdated { lobby_id, message }
            }
            LobbyEvent::JoinRequested { lobby_id, request } => {
                ServerMessage::JoinRequested { lobby_id, request }
            }
            LobbyEvent::JoinRequestDropped { lobby_id, .. } => {
                ServerMessage::JoinDenied { lobby_id }
            }
            LobbyEvent::RoundStarted {
                lobby_id,
                session_id,
                round_index,
                total_rounds,
                question,
                deadline,
            } => ServerMessage::RoundStarted {
                lobby_id,
                session_id,
                round_index,
                total_rounds,
                question,
                deadline,
            },
            LobbyEvent::PlayerSubmitted {
                lobby_id,
                round_index,
                player_id,
            } => ServerMessage::PlayerSubmitted {
                lobby_id,
                round_index,
                player_id,
            },
            LobbyEvent::RoundExtended {
                lobby_id,
                round_index,
                deadline,
            } => ServerMessage::RoundExtended {
                lobby_id,
                round_index,
                deadline,
            },
            LobbyEvent::RoundRevealed { lobby_id, reveal } => {
                ServerMessage::RoundRevealed { lobby_id, reveal }
            }
            LobbyEvent::SessionFinished {
                lobby_id,
                session_id,
                results,
            } => ServerMessage::SessionFinished {
                lobby_id,
                session_id,
                results,
            },
            LobbyEvent::LobbyClosed { lobby_id, reason } => {
                ServerMessage::LobbyClosed { lobby_id, reason }
            }
        }
    }
}
