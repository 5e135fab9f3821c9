use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Coarse error categories surfaced to clients and mapped to HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    InvalidInput,
    NotActive,
    Unauthenticated,
    Expired,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum LobbyError {
    #[error("lobby {lobby_id} not found")]
    LobbyNotFound { lobby_id: String },
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("player is already in lobby {lobby_id}")]
    AlreadyInLobby { lobby_id: String },
    #[error("lobby is full")]
    RoomFull,
    #[error("an answer was already submitted for this round")]
    AlreadySubmitted,
    #[error("{reason}")]
    Conflict { reason: String },
    #[error("player is banned from starting or joining games")]
    Banned,
    #[error("{reason}")]
    Forbidden { reason: String },
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSettings { field: String, reason: String },
    #[error("{reason}")]
    InvalidInput { reason: String },
    #[error("{reason}")]
    NotActive { reason: String },
    #[error("authentication required")]
    Unauthenticated,
    #[error("session expired")]
    Expired,
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl LobbyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LobbyError::LobbyNotFound { .. } | LobbyError::NotFound { .. } => ErrorKind::NotFound,
            LobbyError::AlreadyInLobby { .. }
            | LobbyError::RoomFull
            | LobbyError::AlreadySubmitted
            | LobbyError::Conflict { .. } => ErrorKind::Conflict,
            LobbyError::Banned | LobbyError::Forbidden { .. } => ErrorKind::Forbidden,
            LobbyError::InvalidSettings { .. } | LobbyError::InvalidInput { .. } => {
                ErrorKind::InvalidInput
            }
            LobbyError::NotActive { .. } => ErrorKind::NotActive,
            LobbyError::Unauthenticated => ErrorKind::Unauthenticated,
            LobbyError::Expired => ErrorKind::Expired,
            LobbyError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        LobbyError::Conflict {
            reason: reason.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        LobbyError::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        LobbyError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn not_active(reason: impl Into<String>) -> Self {
        LobbyError::NotActive {
            reason: reason.into(),
        }
    }

    pub fn invalid_setting(field: &str, reason: impl Into<String>) -> Self {
        LobbyError::InvalidSettings {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(LobbyError::RoomFull.kind(), ErrorKind::Conflict);
        assert_eq!(LobbyError::AlreadySubmitted.kind(), ErrorKind::Conflict);
        assert_eq!(LobbyError::Banned.kind(), ErrorKind::Forbidden);
        assert_eq!(
            LobbyError::invalid_setting("num_questions", "too many").kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(LobbyError::not_active("no round").kind(), ErrorKind::NotActive);
        assert_eq!(LobbyError::Expired.kind(), ErrorKind::Expired);
    }

    #[test]
    fn test_invalid_settings_message_names_field() {
        let error = LobbyError::invalid_setting("time_per_question", "must be at most 60");
        assert_eq!(
            error.to_string(),
            "invalid setting `time_per_question`: must be at most 60"
        );
    }
}
