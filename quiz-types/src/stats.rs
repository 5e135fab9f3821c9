use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

use crate::{AnswerOutcome, Format, GameType, LobbyId, Mode, PlayerId, SessionId};

pub const OVERALL: &str = "overall";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MatchColor {
    Win,
    Lose,
    Solo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CategoryStats {
    pub correct: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayerScoreSummary {
    pub player_id: PlayerId,
    pub display_name: String,
    pub score: u32,
    pub correct_number: u32,
    /// Competition rank, versus only.
    pub placement: Option<u32>,
}

/// One finished match as recorded in a player's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MatchHistoryEntry {
    pub session_id: SessionId,
    pub lobby_id: LobbyId,
    pub game_type: GameType,
    /// Ordinal placement ("1st", "2nd", ...) for versus, otherwise "coop" or "solo".
    pub state: String,
    pub color: MatchColor,
    pub score: u32,
    pub team_score: Option<u32>,
    pub total_played: u32,
    pub correct_number: u32,
    pub difficulty: u8,
    pub category_stats: BTreeMap<String, CategoryStats>,
    /// This player's outcome per round index.
    pub answer_history: BTreeMap<u32, AnswerOutcome>,
    /// Coop only: round index -> option text -> members who chose it.
    pub team_answer_history: Option<BTreeMap<u32, BTreeMap<String, Vec<PlayerId>>>>,
    pub players: Vec<PlayerScoreSummary>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModeKey {
    Mode(Mode),
    Overall,
}

impl ModeKey {
    pub fn as_str(&self) -> &str {
        match self {
            ModeKey::Mode(mode) => mode.as_str(),
            ModeKey::Overall => OVERALL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CategoryKey {
    Category(String),
    Overall,
}

impl CategoryKey {
    pub fn as_str(&self) -> &str {
        match self {
            CategoryKey::Category(category) => category,
            CategoryKey::Overall => OVERALL,
        }
    }
}

/// Composite leaderboard key. Only three shapes exist:
/// `[format][mode][category]`, `[format][mode][overall]` and
/// `[format][overall][overall]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatKey {
    format: Format,
    mode: ModeKey,
    category: CategoryKey,
}

impl StatKey {
    pub fn category(format: Format, mode: Mode, category: impl Into<String>) -> Self {
        let category = category.into();
        let category = if category == OVERALL {
            CategoryKey::Overall
        } else {
            CategoryKey::Category(category)
        };
        Self {
            format,
            mode: ModeKey::Mode(mode),
            category,
        }
    }

    pub fn mode_overall(format: Format, mode: Mode) -> Self {
        Self {
            format,
            mode: ModeKey::Mode(mode),
            category: CategoryKey::Overall,
        }
    }

    pub fn format_overall(format: Format) -> Self {
        Self {
            format,
            mode: ModeKey::Overall,
            category: CategoryKey::Overall,
        }
    }

    /// Rebuilds a key from its stored string parts, rejecting impossible shapes.
    pub fn parse(format: &str, mode: &str, category: &str) -> Option<Self> {
        let format = Format::parse(format)?;
        if mode == OVERALL {
            return (category == OVERALL).then(|| Self::format_overall(format));
        }
        let mode = Mode::parse(mode)?;
        Some(Self::category(format, mode, category))
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn mode(&self) -> &ModeKey {
        &self.mode
    }

    pub fn category_key(&self) -> &CategoryKey {
        &self.category
    }

    pub fn is_overall(&self) -> bool {
        self.category == CategoryKey::Overall
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.format.as_str(),
            self.mode.as_str(),
            self.category.as_str()
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatRecord {
    pub correct: u32,
    pub total: u32,
    pub score: u32,
    pub won_matches: u32,
    pub total_matches: u32,
}

impl StatRecord {
    pub fn merge(&mut self, delta: &StatRecord) {
        self.correct += delta.correct;
        self.total += delta.total;
        self.score += delta.score;
        self.won_matches += delta.won_matches;
        self.total_matches += delta.total_matches;
    }

    pub fn is_empty(&self) -> bool {
        *self == StatRecord::default()
    }
}

/// Flat, typed statistics map. Keys are always one of the three `StatKey` shapes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderboardStats {
    records: BTreeMap<StatKey, StatRecord>,
}

impl LeaderboardStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: StatKey, delta: StatRecord) {
        self.records.entry(key).or_default().merge(&delta);
    }

    pub fn merge(&mut self, other: &LeaderboardStats) {
        for (key, delta) in &other.records {
            self.add(key.clone(), *delta);
        }
    }

    pub fn get(&self, key: &StatKey) -> Option<&StatRecord> {
        self.records.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StatKey, &StatRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Nested `format -> mode -> category -> record` view for clients.
    pub fn nested(&self) -> NestedStats {
        let mut nested = NestedStats::new();
        for (key, record) in &self.records {
            nested
                .entry(key.format().as_str().to_string())
                .or_default()
                .entry(key.mode().as_str().to_string())
                .or_default()
                .insert(key.category_key().as_str().to_string(), *record);
        }
        nested
    }
}

impl FromIterator<(StatKey, StatRecord)> for LeaderboardStats {
    fn from_iter<I: IntoIterator<Item = (StatKey, StatRecord)>>(iter: I) -> Self {
        let mut stats = LeaderboardStats::new();
        for (key, record) in iter {
            stats.add(key, record);
        }
        stats
    }
}

pub type NestedStats = BTreeMap<String, BTreeMap<String, BTreeMap<String, StatRecord>>>;
