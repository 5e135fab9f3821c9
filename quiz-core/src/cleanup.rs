use chrono::{DateTime, Utc};
use quiz_types::LobbyStatus;
use std::time::Duration;

use crate::Lobby;

/// Decides which lobbies the periodic sweep may drop.
pub struct LobbyCleanup {
    pub idle_threshold: Duration, // 30 minutes without activity
}

impl Default for LobbyCleanup {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(1800),
        }
    }
}

impl LobbyCleanup {
    pub fn new(idle_threshold: Duration) -> Self {
        Self { idle_threshold }
    }

    /// Only waiting lobbies are reaped. Running sessions end through their
    /// round timers and finished lobbies hold results still to be committed.
    pub fn should_reap(&self, lobby: &Lobby, now: DateTime<Utc>) -> bool {
        if lobby.status() != LobbyStatus::Waiting {
            return false;
        }
        self.idle_for(lobby, now) >= self.idle_threshold
    }

    fn idle_for(&self, lobby: &Lobby, now: DateTime<Utc>) -> Duration {
        (now - lobby.updated_at()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn reason(&self) -> String {
        format!(
            "Lobby closed after {} minutes of inactivity",
            self.idle_threshold.as_secs() / 60
        )
    }
}
