use quiz_types::{ApprovalState, GameSettings, GameType, LobbyError, Mode, Question};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;

/// Eligibility rules for a lobby's question draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionFilter {
    /// `None` or an empty set means every category.
    pub categories: Option<BTreeSet<String>>,
    pub max_difficulty: u8,
    pub community_mode: bool,
}

impl QuestionFilter {
    pub fn for_lobby(game_type: GameType, settings: &GameSettings) -> Self {
        let categories = match game_type.mode() {
            Mode::Classic if !settings.categories.is_empty() => Some(settings.categories.clone()),
            _ => None,
        };
        Self {
            categories,
            max_difficulty: settings.difficulty,
            community_mode: game_type.mode() == Mode::Knowledge && settings.community_mode,
        }
    }

    pub fn matches(&self, question: &Question) -> bool {
        if question.approval != ApprovalState::Approved {
            return false;
        }
        if question.difficulty > self.max_difficulty {
            return false;
        }
        if question.community && !self.community_mode {
            return false;
        }
        match &self.categories {
            Some(categories) if !categories.is_empty() => categories.contains(&question.category),
            _ => true,
        }
    }
}

/// In-memory question bank.
#[derive(Debug, Clone, Default)]
pub struct QuestionPool {
    questions: Vec<Question>,
}

impl QuestionPool {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn categories(&self) -> BTreeSet<String> {
        self.questions
            .iter()
            .map(|question| question.category.clone())
            .collect()
    }

    /// Draws exactly `count` questions. A pool smaller than `count` is
    /// shuffled once and repeated cyclically.
    pub fn select<R: Rng + ?Sized>(
        &self,
        filter: &QuestionFilter,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<Question>, LobbyError> {
        let mut eligible: Vec<&Question> = self
            .questions
            .iter()
            .filter(|question| filter.matches(question))
            .collect();

        if eligible.is_empty() {
            return Err(LobbyError::NotFound {
                what: "questions matching the lobby settings".to_string(),
            });
        }

        eligible.shuffle(rng);

        if eligible.len() < count {
            tracing::debug!(
                "Padding question draw: {} eligible for {} rounds",
                eligible.len(),
                count
            );
        }

        Ok(eligible
            .iter()
            .cycle()
            .take(count)
            .map(|question| (*question).clone())
            .collect())
    }
}
