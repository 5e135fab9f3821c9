use anyhow::{Context, Result};
use async_trait::async_trait;
use quiz_core::{QuestionFilter, QuestionPool};
use quiz_types::{GameSettings, GameType, LobbyError, Question};
use std::path::Path;

/// Source of questions for a starting session.
#[async_trait]
pub trait QuestionProvider: Send + Sync {
    /// Draws exactly `count` eligible questions for the lobby settings.
    async fn draw(
        &self,
        game_type: GameType,
        settings: &GameSettings,
        count: usize,
    ) -> Result<Vec<Question>, LobbyError>;
}

/// Question bank loaded once into memory.
pub struct PoolQuestionProvider {
    pool: QuestionPool,
}

impl PoolQuestionProvider {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            pool: QuestionPool::new(questions),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let questions: Vec<Question> =
            serde_json::from_str(json).context("question bank is not a JSON array of questions")?;
        Ok(Self::new(questions))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read question bank {}", path.display()))?;
        let provider = Self::from_json(&json)?;
        tracing::info!(
            "Loaded {} questions across {} categories from {}",
            provider.pool.len(),
            provider.pool.categories().len(),
            path.display()
        );
        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[async_trait]
impl QuestionProvider for PoolQuestionProvider {
    async fn draw(
        &self,
        game_type: GameType,
        settings: &GameSettings,
        count: usize,
    ) -> Result<Vec<Question>, LobbyError> {
        let filter = QuestionFilter::for_lobby(game_type, settings);
        let mut rng = rand::rng();
        self.pool.select(&filter, count, &mut rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"[
        {"id": "h1", "prompt": "Year of the moon landing?", "options": ["1969", "1972"], "answer": "1969", "category": "history", "difficulty": 2},
        {"id": "s1", "prompt": "Symbol for gold?", "options": ["Au", "Ag"], "answer": "Au", "category": "science", "difficulty": 1},
        {"id": "c1", "prompt": "Community pick", "answer": "yes", "category": "science", "difficulty": 1, "community": true}
    ]"#;

    #[tokio::test]
    async fn test_draw_respects_categories() {
        let provider = PoolQuestionProvider::from_json(BANK).unwrap();
        assert_eq!(provider.len(), 3);

        let mut settings = GameSettings::default();
        settings.categories.insert("history".to_string());

        let questions = provider
            .draw(GameType::VersusClassic, &settings, 4)
            .await
            .unwrap();
        assert_eq!(questions.len(), 4);
        assert!(questions.iter().all(|q| q.category == "history"));
    }

    #[tokio::test]
    async fn test_community_questions_need_community_mode() {
        let provider = PoolQuestionProvider::from_json(BANK).unwrap();
        let mut settings = GameSettings::default();

        let questions = provider
            .draw(GameType::SoloKnowledge, &settings, 6)
            .await
            .unwrap();
        assert!(questions.iter().all(|q| !q.community));

        settings.community_mode = true;
        let questions = provider
            .draw(GameType::SoloKnowledge, &settings, 30)
            .await
            .unwrap();
        assert!(questions.iter().any(|q| q.community));
    }

    #[test]
    fn test_malformed_bank_is_rejected() {
        assert!(PoolQuestionProvider::from_json("{\"not\": \"a list\"}").is_err());
    }
}
