use chrono::{DateTime, Duration as ChronoDuration, Utc};
use quiz_types::{
    AnswerOutcome, AnswerResult, Format, GameStateView, LobbyError, PlayerId, PlayerRoundState,
    PowerupKind, PublicQuestion, Question, RoundReveal, SessionId,
};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::powerups::{self, PowerupAllowance, PowerupEffect};
use crate::scoring::{ScoreContext, ScoringPolicy};

/// Where the lobby sits in the round cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Idle,
    RoundActive,
    RoundRevealed,
    SessionFinalizing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamState {
    pub score: u32,
    /// Round index -> chosen option text -> members who chose it.
    pub answer_history: BTreeMap<u32, BTreeMap<String, Vec<PlayerId>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub result: AnswerResult,
    /// Every current participant has now answered this round.
    pub round_complete: bool,
    pub deadline_extended: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    NextRound {
        round_index: u32,
        question: PublicQuestion,
        deadline: DateTime<Utc>,
    },
    Finished,
}

/// State of one running session: the question sequence, per-player
/// progress and the current round's timing.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    format: Format,
    questions: Vec<Question>,
    current_index: u32,
    round_started_at: DateTime<Utc>,
    round_deadline: DateTime<Utc>,
    answer_revealed: bool,
    time_per_question: u32,
    player_states: BTreeMap<PlayerId, PlayerRoundState>,
    team: Option<TeamState>,
}

impl Session {
    pub fn new(
        session_id: SessionId,
        format: Format,
        questions: Vec<Question>,
        participants: impl IntoIterator<Item = PlayerId>,
        time_per_question: u32,
        allowance: &PowerupAllowance,
        now: DateTime<Utc>,
    ) -> Result<Self, LobbyError> {
        if questions.is_empty() {
            return Err(LobbyError::NotFound {
                what: "questions for the session".to_string(),
            });
        }

        let player_states = participants
            .into_iter()
            .map(|player_id| {
                (
                    player_id,
                    PlayerRoundState {
                        powerups: allowance.inventory(),
                        ..Default::default()
                    },
                )
            })
            .collect();

        Ok(Self {
            session_id,
            format,
            questions,
            current_index: 0,
            round_started_at: now,
            round_deadline: now + ChronoDuration::seconds(i64::from(time_per_question)),
            answer_revealed: false,
            time_per_question,
            player_states,
            team: (format == Format::Coop).then(TeamState::default),
        })
    }

    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    pub fn total_rounds(&self) -> u32 {
        self.questions.len() as u32
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.current_index as usize]
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn round_started_at(&self) -> DateTime<Utc> {
        self.round_started_at
    }

    pub fn round_deadline(&self) -> DateTime<Utc> {
        self.round_deadline
    }

    pub fn is_revealed(&self) -> bool {
        self.answer_revealed
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn player_states(&self) -> &BTreeMap<PlayerId, PlayerRoundState> {
        &self.player_states
    }

    pub fn player_state(&self, player_id: &PlayerId) -> Option<&PlayerRoundState> {
        self.player_states.get(player_id)
    }

    pub fn team(&self) -> Option<&TeamState> {
        self.team.as_ref()
    }

    pub fn phase(&self) -> RoundPhase {
        if self.answer_revealed {
            RoundPhase::RoundRevealed
        } else {
            RoundPhase::RoundActive
        }
    }

    fn ensure_round_open(&self, now: DateTime<Utc>) -> Result<(), LobbyError> {
        if self.answer_revealed {
            return Err(LobbyError::not_active("the round has already been revealed"));
        }
        if now > self.round_deadline {
            return Err(LobbyError::not_active("the round deadline has passed"));
        }
        Ok(())
    }

    pub fn submit_answer(
        &mut self,
        player_id: PlayerId,
        selected_option: &str,
        requested_powerups: &[PowerupKind],
        scoring: &dyn ScoringPolicy,
        time_freeze: Duration,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, LobbyError> {
        self.ensure_round_open(now)?;

        let round_index = self.current_index;
        let question = self.questions[round_index as usize].clone();

        let state = self
            .player_states
            .get(&player_id)
            .ok_or_else(|| LobbyError::forbidden("player is not part of this session"))?;
        if state.has_answered(round_index) {
            return Err(LobbyError::AlreadySubmitted);
        }

        let selected = selected_option.trim();
        if selected.is_empty() {
            return Err(LobbyError::invalid_input("an answer must be selected"));
        }
        let selected = if question.options.is_empty() {
            selected.to_string()
        } else {
            question
                .options
                .iter()
                .find(|option| option.trim().eq_ignore_ascii_case(selected))
                .cloned()
                .ok_or_else(|| LobbyError::invalid_input("answer is not one of the offered options"))?
        };

        // Validate every requested power-up before consuming any
        let newly_activated: BTreeSet<PowerupKind> = requested_powerups
            .iter()
            .copied()
            .filter(|kind| !state.active_powerups.contains(kind))
            .collect();
        for kind in &newly_activated {
            powerups::ensure_available(&state.powerups, *kind)?;
        }

        let mut deadline_extended = None;
        if newly_activated.contains(&PowerupKind::TimeFreeze) {
            self.round_deadline += freeze_duration(time_freeze);
            deadline_extended = Some(self.round_deadline);
        }

        let elapsed = (now - self.round_started_at).to_std().unwrap_or(Duration::ZERO);
        let context = ScoreContext {
            difficulty: question.difficulty,
            time_limit: Duration::from_secs(u64::from(self.time_per_question)),
            elapsed,
        };

        let Some(state) = self.player_states.get_mut(&player_id) else {
            return Err(LobbyError::forbidden("player is not part of this session"));
        };
        for kind in &newly_activated {
            powerups::consume(&mut state.powerups, *kind);
            state.active_powerups.insert(*kind);
        }

        let correct = question.is_correct(&selected);
        let (correct_score, streak_bonus) = if correct {
            state.streak += 1;
            let mut base = scoring.correct_score(&context);
            if state.active_powerups.contains(&PowerupKind::DoublePoints) {
                base *= 2;
            }
            (base, scoring.streak_bonus(state.streak))
        } else {
            state.streak = 0;
            (0, 0)
        };
        let points = correct_score + streak_bonus;

        let outcome = if correct {
            AnswerOutcome::Correct
        } else {
            AnswerOutcome::Wrong
        };
        state.answer_history.insert(round_index, outcome);
        state.selected_options.insert(round_index, selected.clone());
        state.time_submitted.insert(round_index, now);
        state.award(round_index, correct_score, streak_bonus);

        let result = AnswerResult {
            round_index,
            outcome,
            points,
            score: state.score,
            streak: state.streak,
        };

        // Streak bonuses stay individual
        if let Some(team) = self.team.as_mut() {
            team.score += correct_score;
            team.answer_history
                .entry(round_index)
                .or_default()
                .entry(selected)
                .or_default()
                .push(player_id);
        }

        Ok(SubmitOutcome {
            result,
            round_complete: self.all_answered(),
            deadline_extended,
        })
    }

    /// Activates a power-up ahead of answering.
    pub fn activate_powerup<R: Rng + ?Sized>(
        &mut self,
        player_id: PlayerId,
        kind: PowerupKind,
        time_freeze: Duration,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<PowerupEffect, LobbyError> {
        self.ensure_round_open(now)?;

        let round_index = self.current_index;
        let state = self
            .player_states
            .get(&player_id)
            .ok_or_else(|| LobbyError::forbidden("player is not part of this session"))?;
        if state.has_answered(round_index) {
            return Err(LobbyError::AlreadySubmitted);
        }
        if state.active_powerups.contains(&kind) {
            return Err(LobbyError::conflict("power-up is already active this round"));
        }
        powerups::ensure_available(&state.powerups, kind)?;

        let effect = match kind {
            PowerupKind::DoublePoints => PowerupEffect::DoublePointsArmed,
            PowerupKind::HintBoost => {
                let options = powerups::hint_options(self.current_question(), rng).ok_or_else(
                    || LobbyError::invalid_input("hints need a multiple-choice question"),
                )?;
                PowerupEffect::Hint { options }
            }
            PowerupKind::TimeFreeze => {
                self.round_deadline += freeze_duration(time_freeze);
                PowerupEffect::TimeExtended {
                    deadline: self.round_deadline,
                }
            }
        };

        if let Some(state) = self.player_states.get_mut(&player_id) {
            powerups::consume(&mut state.powerups, kind);
            state.active_powerups.insert(kind);
        }

        Ok(effect)
    }

    pub fn all_answered(&self) -> bool {
        !self.player_states.is_empty()
            && self
                .player_states
                .values()
                .all(|state| state.has_answered(self.current_index))
    }

    /// Closes the current round. Returns `None` if it was already closed.
    pub fn close_round(&mut self) -> Option<RoundReveal> {
        if self.answer_revealed {
            return None;
        }

        let round_index = self.current_index;
        for state in self.player_states.values_mut() {
            if !state.has_answered(round_index) {
                state.answer_history.insert(round_index, AnswerOutcome::Missing);
                state.award(round_index, 0, 0);
                state.streak = 0;
            }
        }
        self.answer_revealed = true;

        let question = self.current_question();
        Some(RoundReveal {
            round_index,
            answer: question.answer.clone(),
            explanation: question.explanation.clone(),
            outcomes: self
                .player_states
                .iter()
                .filter_map(|(id, state)| {
                    state
                        .answer_history
                        .get(&round_index)
                        .map(|outcome| (*id, *outcome))
                })
                .collect(),
            scores: self
                .player_states
                .iter()
                .map(|(id, state)| (*id, state.score))
                .collect(),
            team_score: self.team.as_ref().map(|team| team.score),
        })
    }

    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<Advance, LobbyError> {
        if !self.answer_revealed {
            return Err(LobbyError::conflict("the round has not been revealed yet"));
        }

        if self.current_index + 1 >= self.total_rounds() {
            return Ok(Advance::Finished);
        }

        self.current_index += 1;
        self.answer_revealed = false;
        self.round_started_at = now;
        self.round_deadline = now + ChronoDuration::seconds(i64::from(self.time_per_question));
        for state in self.player_states.values_mut() {
            state.active_powerups.clear();
        }

        Ok(Advance::NextRound {
            round_index: self.current_index,
            question: PublicQuestion::from(self.current_question()),
            deadline: self.round_deadline,
        })
    }

    /// Drops a departing member. Returns true when the open round is now
    /// complete because everyone left has answered.
    pub fn remove_player(&mut self, player_id: &PlayerId) -> bool {
        self.player_states.remove(player_id);
        !self.answer_revealed && self.all_answered()
    }

    /// Client view. Other players' choices for the open round are hidden from `viewer`.
    pub fn view(&self, viewer: Option<PlayerId>) -> GameStateView {
        let open_round = (!self.answer_revealed).then_some(self.current_index);
        let player_states = self
            .player_states
            .iter()
            .map(|(id, state)| {
                let mut state = state.clone();
                if let Some(round) = open_round {
                    if viewer != Some(*id) {
                        state.selected_options.remove(&round);
                    }
                }
                (*id, state)
            })
            .collect();

        let mut team_answer_history = self
            .team
            .as_ref()
            .map(|team| team.answer_history.clone())
            .unwrap_or_default();
        if let Some(round) = open_round {
            let mut choices = team_answer_history.remove(&round).unwrap_or_default();
            if let Some(viewer) = viewer {
                choices.retain(|_, members| {
                    members.retain(|member| *member == viewer);
                    !members.is_empty()
                });
                if !choices.is_empty() {
                    team_answer_history.insert(round, choices);
                }
            }
        }

        let question = self.current_question();
        GameStateView {
            session_id: self.session_id,
            question_ids: self.questions.iter().map(|q| q.id.clone()).collect(),
            current_question_index: self.current_index,
            current_question: Some(PublicQuestion::from(question)),
            round_started_at: self.round_started_at,
            round_deadline: self.round_deadline,
            answer_revealed: self.answer_revealed,
            revealed_answer: self.answer_revealed.then(|| question.answer.clone()),
            explanation: if self.answer_revealed {
                question.explanation.clone()
            } else {
                None
            },
            player_states,
            team_score: self.team.as_ref().map(|team| team.score),
            team_answer_history,
        }
    }
}

fn freeze_duration(time_freeze: Duration) -> ChronoDuration {
    ChronoDuration::from_std(time_freeze).unwrap_or_else(|_| ChronoDuration::seconds(10))
}
