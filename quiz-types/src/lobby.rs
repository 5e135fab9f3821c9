use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use ts_rs::TS;

use crate::{GameStateView, PlayerId};

/// Short shareable lobby code, e.g. `K7Q2XM`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(transparent)]
pub struct LobbyId(pub String);

impl LobbyId {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum LobbyStatus {
    Waiting,
    InProgress,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Versus,
    Coop,
    Solo,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Versus => "versus",
            Format::Coop => "coop",
            Format::Solo => "solo",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "versus" => Some(Format::Versus),
            "coop" => Some(Format::Coop),
            "solo" => Some(Format::Solo),
            _ => None,
        }
    }

    /// Most members a lobby of this format may hold, given the server-wide cap.
    pub fn capacity(&self, max_players: usize) -> usize {
        match self {
            Format::Solo => 1,
            Format::Versus | Format::Coop => max_players,
        }
    }

    pub fn min_players(&self) -> usize {
        match self {
            Format::Solo => 1,
            Format::Versus | Format::Coop => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Classic,
    Knowledge,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Classic => "classic",
            Mode::Knowledge => "knowledge",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "classic" => Some(Mode::Classic),
            "knowledge" => Some(Mode::Knowledge),
            _ => None,
        }
    }
}

/// Combined format and mode tag, serialized as e.g. `versus-classic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum GameType {
    VersusClassic,
    VersusKnowledge,
    CoopClassic,
    CoopKnowledge,
    SoloClassic,
    SoloKnowledge,
}

impl GameType {
    pub fn new(format: Format, mode: Mode) -> Self {
        match (format, mode) {
            (Format::Versus, Mode::Classic) => GameType::VersusClassic,
            (Format::Versus, Mode::Knowledge) => GameType::VersusKnowledge,
            (Format::Coop, Mode::Classic) => GameType::CoopClassic,
            (Format::Coop, Mode::Knowledge) => GameType::CoopKnowledge,
            (Format::Solo, Mode::Classic) => GameType::SoloClassic,
            (Format::Solo, Mode::Knowledge) => GameType::SoloKnowledge,
        }
    }

    pub fn format(&self) -> Format {
        match self {
            GameType::VersusClassic | GameType::VersusKnowledge => Format::Versus,
            GameType::CoopClassic | GameType::CoopKnowledge => Format::Coop,
            GameType::SoloClassic | GameType::SoloKnowledge => Format::Solo,
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            GameType::VersusClassic | GameType::CoopClassic | GameType::SoloClassic => {
                Mode::Classic
            }
            GameType::VersusKnowledge | GameType::CoopKnowledge | GameType::SoloKnowledge => {
                Mode::Knowledge
            }
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.format().as_str(), self.mode().as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GameSettings {
    pub name: String,
    pub num_questions: u32,
    pub time_per_question: u32,
    pub difficulty: u8,
    /// Only meaningful for classic mode. Empty means every category.
    pub categories: BTreeSet<String>,
    pub community_mode: bool,
    pub public_visible: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            name: "Quiz Lobby".to_string(),
            num_questions: 10,
            time_per_question: 20,
            difficulty: 3,
            categories: BTreeSet::new(),
            community_mode: false,
            public_visible: true,
        }
    }
}

/// Partial settings update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettingsPatch {
    pub name: Option<String>,
    pub num_questions: Option<u32>,
    pub time_per_question: Option<u32>,
    pub difficulty: Option<u8>,
    pub categories: Option<BTreeSet<String>>,
    pub community_mode: Option<bool>,
    pub public_visible: Option<bool>,
}

impl SettingsPatch {
    pub fn apply_to(&self, settings: &GameSettings) -> GameSettings {
        GameSettings {
            name: self.name.clone().unwrap_or_else(|| settings.name.clone()),
            num_questions: self.num_questions.unwrap_or(settings.num_questions),
            time_per_question: self.time_per_question.unwrap_or(settings.time_per_question),
            difficulty: self.difficulty.unwrap_or(settings.difficulty),
            categories: self
                .categories
                .clone()
                .unwrap_or_else(|| settings.categories.clone()),
            community_mode: self.community_mode.unwrap_or(settings.community_mode),
            public_visible: self.public_visible.unwrap_or(settings.public_visible),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LobbyPlayer {
    pub id: PlayerId,
    pub display_name: String,
    pub profile_picture: Option<String>,
    pub ready: bool,
    pub chat_ban: bool,
    pub joined_at: DateTime<Utc>,
    /// Monotonic admission counter used for host promotion.
    pub join_order: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JoinRequest {
    pub player_id: PlayerId,
    pub display_name: String,
    pub profile_picture: Option<String>,
    /// Carried over to the membership record on approval.
    pub chat_ban: bool,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChatMessage {
    pub id: uuid::Uuid,
    /// `None` for system narration.
    pub author: Option<PlayerId>,
    pub author_name: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub const SYSTEM_AUTHOR: &'static str = "System";

    pub fn is_system(&self) -> bool {
        self.author.is_none()
    }
}

/// Client-facing lobby document. Never carries unrevealed answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LobbySnapshot {
    pub id: LobbyId,
    pub game_type: GameType,
    pub status: LobbyStatus,
    pub host: PlayerId,
    pub players: Vec<LobbyPlayer>,
    pub settings: GameSettings,
    pub join_requests: Vec<JoinRequest>,
    pub chat: Vec<ChatMessage>,
    pub game: Option<GameStateView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public listing row for discoverable lobbies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LobbySummary {
    pub id: LobbyId,
    pub name: String,
    pub game_type: GameType,
    pub host_name: String,
    pub player_count: u32,
    pub capacity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_type_tags() {
        let json = serde_json::to_string(&GameType::VersusClassic).unwrap();
        assert_eq!(json, "\"versus-classic\"");

        let parsed: GameType = serde_json::from_str("\"coop-knowledge\"").unwrap();
        assert_eq!(parsed, GameType::CoopKnowledge);
        assert_eq!(parsed.format(), Format::Coop);
        assert_eq!(parsed.mode(), Mode::Knowledge);
        assert_eq!(parsed.to_string(), "coop-knowledge");
    }

    #[test]
    fn test_game_type_from_parts() {
        for game_type in [
            GameType::VersusClassic,
            GameType::VersusKnowledge,
            GameType::CoopClassic,
            GameType::CoopKnowledge,
            GameType::SoloClassic,
            GameType::SoloKnowledge,
        ] {
            assert_eq!(GameType::new(game_type.format(), game_type.mode()), game_type);
        }
    }

    #[test]
    fn test_settings_patch_keeps_absent_fields() {
        let settings = GameSettings::default();
        let patch = SettingsPatch {
            num_questions: Some(5),
            public_visible: Some(false),
            ..Default::default()
        };

        let merged = patch.apply_to(&settings);
        assert_eq!(merged.num_questions, 5);
        assert!(!merged.public_visible);
        assert_eq!(merged.name, settings.name);
        assert_eq!(merged.time_per_question, settings.time_per_question);
    }

    #[test]
    fn test_lobby_id_is_uppercased() {
        assert_eq!(LobbyId::new("ab12cd").as_str(), "AB12CD");
    }

    #[test]
    fn test_solo_capacity() {
        assert_eq!(Format::Solo.capacity(8), 1);
        assert_eq!(Format::Versus.capacity(8), 8);
        assert_eq!(Format::Coop.min_players(), 2);
    }
}
