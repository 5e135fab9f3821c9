use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use ts_rs::TS;

use crate::{PlayerId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum AnswerOutcome {
    Correct,
    Wrong,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub enum PowerupKind {
    DoublePoints,
    HintBoost,
    TimeFreeze,
}

impl PowerupKind {
    pub const ALL: [PowerupKind; 3] = [
        PowerupKind::DoublePoints,
        PowerupKind::HintBoost,
        PowerupKind::TimeFreeze,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Pending,
    #[default]
    Approved,
    Rejected,
}

/// A question as stored by the question source, including its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    /// Empty for free-text questions.
    #[serde(default)]
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
    pub category: String,
    pub difficulty: u8,
    #[serde(default)]
    pub approval: ApprovalState,
    #[serde(default)]
    pub community: bool,
}

impl Question {
    pub fn is_correct(&self, selected_option: &str) -> bool {
        selected_option.trim().eq_ignore_ascii_case(self.answer.trim())
    }
}

/// Question as shown to players while the round is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PublicQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub category: String,
    pub difficulty: u8,
}

impl From<&Question> for PublicQuestion {
    fn from(question: &Question) -> Self {
        PublicQuestion {
            id: question.id.clone(),
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            category: question.category.clone(),
            difficulty: question.difficulty,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayerRoundState {
    /// Always `correct_score + streak_bonus`.
    pub score: u32,
    pub correct_score: u32,
    pub streak_bonus: u32,
    pub streak: u32,
    pub answer_history: BTreeMap<u32, AnswerOutcome>,
    pub points_history: BTreeMap<u32, u32>,
    pub selected_options: BTreeMap<u32, String>,
    pub time_submitted: BTreeMap<u32, DateTime<Utc>>,
    /// Remaining session-scoped power-up counters.
    pub powerups: BTreeMap<PowerupKind, u32>,
    /// Power-ups activated for the current round.
    pub active_powerups: BTreeSet<PowerupKind>,
}

impl PlayerRoundState {
    pub fn correct_count(&self) -> u32 {
        self.answer_history
            .values()
            .filter(|outcome| **outcome == AnswerOutcome::Correct)
            .count() as u32
    }

    pub fn has_answered(&self, round_index: u32) -> bool {
        self.answer_history.contains_key(&round_index)
    }

    /// True only for an actual submission, not a `missing` fill.
    pub fn submitted(&self, round_index: u32) -> bool {
        self.time_submitted.contains_key(&round_index)
    }

    /// Adds one round's points, keeping `score` equal to its two components.
    pub fn award(&mut self, round_index: u32, correct_score: u32, streak_bonus: u32) {
        self.correct_score += correct_score;
        self.streak_bonus += streak_bonus;
        self.score = self.correct_score + self.streak_bonus;
        self.points_history.insert(round_index, correct_score + streak_bonus);
    }
}

/// Client-facing view of an active session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GameStateView {
    pub session_id: SessionId,
    pub question_ids: Vec<String>,
    pub current_question_index: u32,
    pub current_question: Option<PublicQuestion>,
    pub round_started_at: DateTime<Utc>,
    pub round_deadline: DateTime<Utc>,
    pub answer_revealed: bool,
    /// Canonical answer, present only once the round is revealed.
    pub revealed_answer: Option<String>,
    pub explanation: Option<String>,
    pub player_states: BTreeMap<PlayerId, PlayerRoundState>,
    pub team_score: Option<u32>,
    pub team_answer_history: BTreeMap<u32, BTreeMap<String, Vec<PlayerId>>>,
}

/// Result of a single answer submission, returned to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AnswerResult {
    pub round_index: u32,
    pub outcome: AnswerOutcome,
    pub points: u32,
    pub score: u32,
    pub streak: u32,
}

/// Everything a group learns when a round closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoundReveal {
    pub round_index: u32,
    pub answer: String,
    pub explanation: Option<String>,
    pub outcomes: BTreeMap<PlayerId, AnswerOutcome>,
    pub scores: BTreeMap<PlayerId, u32>,
    pub team_score: Option<u32>,
}
