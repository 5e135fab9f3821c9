use quiz_types::{GameSettings, GameType, LobbyError, Mode};
use std::ops::RangeInclusive;

pub const NAME_LENGTH: RangeInclusive<usize> = 5..=30;
pub const NUM_QUESTIONS: RangeInclusive<u32> = 3..=20;
pub const TIME_PER_QUESTION: RangeInclusive<u32> = 5..=60;
pub const DIFFICULTY: RangeInclusive<u8> = 1..=5;
pub const MAX_CATEGORIES: usize = 10;

/// Checks lobby settings, failing on the first field that is out of bounds.
pub fn validate_settings(game_type: GameType, settings: &GameSettings) -> Result<(), LobbyError> {
    let name_length = settings.name.trim().chars().count();
    if !NAME_LENGTH.contains(&name_length) {
        return Err(LobbyError::invalid_setting(
            "name",
            format!(
                "must be between {} and {} characters",
                NAME_LENGTH.start(),
                NAME_LENGTH.end()
            ),
        ));
    }

    if !NUM_QUESTIONS.contains(&settings.num_questions) {
        return Err(LobbyError::invalid_setting(
            "num_questions",
            format!(
                "must be between {} and {}",
                NUM_QUESTIONS.start(),
                NUM_QUESTIONS.end()
            ),
        ));
    }

    if !TIME_PER_QUESTION.contains(&settings.time_per_question) {
        return Err(LobbyError::invalid_setting(
            "time_per_question",
            format!(
                "must be between {} and {} seconds",
                TIME_PER_QUESTION.start(),
                TIME_PER_QUESTION.end()
            ),
        ));
    }

    if !DIFFICULTY.contains(&settings.difficulty) {
        return Err(LobbyError::invalid_setting(
            "difficulty",
            format!(
                "must be between {} and {}",
                DIFFICULTY.start(),
                DIFFICULTY.end()
            ),
        ));
    }

    if game_type.mode() == Mode::Knowledge && !settings.categories.is_empty() {
        return Err(LobbyError::invalid_setting(
            "categories",
            "categories are only available in classic mode",
        ));
    }

    if settings.categories.len() > MAX_CATEGORIES {
        return Err(LobbyError::invalid_setting(
            "categories",
            format!("at most {} categories may be selected", MAX_CATEGORIES),
        ));
    }

    if settings.categories.iter().any(|category| category.trim().is_empty()) {
        return Err(LobbyError::invalid_setting(
            "categories",
            "category names cannot be blank",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_field(result: Result<(), LobbyError>) -> String {
        match result {
            Err(LobbyError::InvalidSettings { field, .. }) => field,
            other => panic!("Expected InvalidSettings, got {:?}", other),
        }
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(validate_settings(GameType::VersusClassic, &GameSettings::default()).is_ok());
        assert!(validate_settings(GameType::SoloKnowledge, &GameSettings::default()).is_ok());
    }

    #[test]
    fn test_out_of_bounds_fields_are_named() {
        let settings = GameSettings {
            num_questions: 100,
            ..Default::default()
        };
        assert_eq!(
            failing_field(validate_settings(GameType::VersusClassic, &settings)),
            "num_questions"
        );

        let settings = GameSettings {
            time_per_question: 2,
            ..Default::default()
        };
        assert_eq!(
            failing_field(validate_settings(GameType::VersusClassic, &settings)),
            "time_per_question"
        );

        let settings = GameSettings {
            difficulty: 0,
            ..Default::default()
        };
        assert_eq!(
            failing_field(validate_settings(GameType::CoopClassic, &settings)),
            "difficulty"
        );

        let settings = GameSettings {
            name: "  x ".to_string(),
            ..Default::default()
        };
        assert_eq!(
            failing_field(validate_settings(GameType::CoopClassic, &settings)),
            "name"
        );
    }

    #[test]
    fn test_first_violation_wins() {
        let settings = GameSettings {
            num_questions: 0,
            difficulty: 9,
            ..Default::default()
        };
        assert_eq!(
            failing_field(validate_settings(GameType::VersusClassic, &settings)),
            "num_questions"
        );
    }

    #[test]
    fn test_categories_rejected_for_knowledge_mode() {
        let mut settings = GameSettings::default();
        settings.categories.insert("science".to_string());

        assert!(validate_settings(GameType::SoloClassic, &settings).is_ok());
        assert_eq!(
            failing_field(validate_settings(GameType::SoloKnowledge, &settings)),
            "categories"
        );
    }
}
