#![allow(dead_code)]

use chrono::{DateTime, Utc};
use quiz_core::{Lobby, LobbyRules, QuestionFilter, QuestionPool};
use quiz_types::{
    ApprovalState, GameType, Identity, LobbyId, PlayerId, Question, SettingsPatch,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use uuid::Uuid;

/// Creates a test identity with a fresh id
pub fn create_test_identity(name: &str) -> Identity {
    Identity::new(Uuid::new_v4(), name)
}

/// Creates a multiple-choice question whose correct option is "A"
pub fn create_test_question(id: &str, category: &str, difficulty: u8) -> Question {
    Question {
        id: id.to_string(),
        prompt: format!("Prompt for {}", id),
        options: vec!["A".to_string(), "B".to_string(), "C".to_string(), "D".to_string()],
        answer: "A".to_string(),
        explanation: Some(format!("{} is answered by A", id)),
        category: category.to_string(),
        difficulty,
        approval: ApprovalState::Approved,
        community: false,
    }
}

/// A small pool spread over two categories
pub fn create_test_pool() -> QuestionPool {
    let mut questions = Vec::new();
    for i in 0..6 {
        questions.push(create_test_question(&format!("hist-{}", i), "history", 1 + (i % 3) as u8));
        questions.push(create_test_question(&format!("sci-{}", i), "science", 1 + (i % 3) as u8));
    }
    QuestionPool::new(questions)
}

/// Creates a lobby with `num_questions` rounds hosted by `host`
pub fn create_test_lobby(
    game_type: GameType,
    host: &Identity,
    num_questions: u32,
    now: DateTime<Utc>,
) -> Lobby {
    let patch = SettingsPatch {
        num_questions: Some(num_questions),
        ..Default::default()
    };
    Lobby::create(
        LobbyId::new("FLOW01"),
        game_type,
        host,
        Some(&patch),
        LobbyRules::default(),
        now,
    )
    .expect("lobby creation")
}

/// Adds members, readies everyone and starts a session drawn from the test pool
pub fn start_with_members(lobby: &mut Lobby, members: &[&Identity], now: DateTime<Utc>) {
    for member in members {
        lobby.request_join(member, now).expect("join");
    }
    for id in lobby.member_ids() {
        lobby.set_ready(id, true, now).expect("ready");
    }

    let filter = QuestionFilter::for_lobby(lobby.game_type(), lobby.settings());
    let mut rng = StdRng::seed_from_u64(7);
    let questions = create_test_pool()
        .select(&filter, lobby.settings().num_questions as usize, &mut rng)
        .expect("questions");
    lobby
        .start_session(Uuid::new_v4(), questions, now)
        .expect("start");
}

/// Plays one round with the given answers, then reveals and advances
pub fn play_round(
    lobby: &mut Lobby,
    answers: &[(PlayerId, &str)],
    now: DateTime<Utc>,
) -> quiz_core::Advance {
    let scoring = quiz_core::StandardScoring::default();
    for (player_id, option) in answers {
        lobby
            .submit_answer(*player_id, option, &[], &scoring, now)
            .expect("submit");
    }
    let round_index = lobby.session().map(|s| s.current_index()).unwrap_or_default();
    lobby.close_round(round_index, now);
    let (advance, _) = lobby.advance_round(None, now).expect("advance");
    advance
}
