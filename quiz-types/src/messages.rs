use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    AnswerResult, ChatMessage, ErrorKind, GameSettings, GameType, Identity, JoinRequest, LobbyId,
    LobbyPlayer, LobbySnapshot, LobbyStatus, PlayerId, PlayerScoreSummary, PowerupKind,
    PublicQuestion, RoundReveal, SessionId, SettingsPatch,
};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ClientMessage {
    Authenticate {
        token: String,
    },
    JoinGroup {
        lobby_id: LobbyId,
    },
    LeaveGroup {
        lobby_id: LobbyId,
    },
    LivenessCheck {
        ack: u64,
    },
    CreateLobby {
        game_type: GameType,
        settings: Option<SettingsPatch>,
    },
    JoinLobby {
        lobby_id: LobbyId,
    },
    ApproveJoin {
        lobby_id: LobbyId,
        player_id: PlayerId,
    },
    DenyJoin {
        lobby_id: LobbyId,
        player_id: PlayerId,
    },
    LeaveLobby {
        lobby_id: LobbyId,
    },
    SetReady {
        lobby_id: LobbyId,
        ready: bool,
    },
    UpdateSettings {
        lobby_id: LobbyId,
        settings: SettingsPatch,
    },
    SendChat {
        lobby_id: LobbyId,
        message: String,
    },
    SubmitAnswer {
        lobby_id: LobbyId,
        selected_option: String,
        #[serde(default)]
        active_powerups: Vec<PowerupKind>,
    },
    ActivatePowerup {
        lobby_id: LobbyId,
        powerup: PowerupKind,
    },
    AdvanceRound {
        lobby_id: LobbyId,
    },
    Finalize {
        lobby_id: LobbyId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ServerMessage {
    Authenticated {
        identity: Identity,
    },
    AuthenticationFailed {
        reason: String,
    },
    LobbySnapshot {
        lobby: LobbySnapshot,
    },
    JoinPending {
        lobby_id: LobbyId,
    },
    JoinDenied {
        lobby_id: LobbyId,
    },
    LobbyUpdated {
        lobby_id: LobbyId,
        status: LobbyStatus,
        host: PlayerId,
        players: Vec<LobbyPlayer>,
        join_requests: Vec<JoinRequest>,
    },
    LobbyClosed {
        lobby_id: LobbyId,
        reason: String,
    },
    SettingsUpdated {
        lobby_id: LobbyId,
        settings: GameSettings,
    },
    ChatUpdated {
        lobby_id: LobbyId,
        message: ChatMessage,
    },
    JoinRequested {
        lobby_id: LobbyId,
        request: JoinRequest,
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
    AnswerAccepted {
        lobby_id: LobbyId,
        result: AnswerResult,
    },
    HintGranted {
        lobby_id: LobbyId,
        round_index: u32,
        options: Vec<String>,
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
    ForceDisconnect {
        reason: String,
    },
    LivenessAck {
        ack: u64,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(error: &crate::LobbyError) -> Self {
        ServerMessage::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
