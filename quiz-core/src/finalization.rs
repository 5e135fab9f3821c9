use chrono::{DateTime, Utc};
use quiz_types::{
    AnswerOutcome, CategoryStats, Format, GameType, LeaderboardStats, LobbyId, MatchColor,
    MatchHistoryEntry, PlayerId, PlayerScoreSummary, SessionId, StatKey, StatRecord,
};
use std::collections::BTreeMap;

use crate::round::Session;

/// Currency credited to each member when a session is committed.
#[derive(Debug, Clone)]
pub struct RewardPolicy {
    pub participation: u32,
    pub per_correct: u32,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            participation: 10,
            per_correct: 5,
        }
    }
}

impl RewardPolicy {
    pub fn reward(&self, correct_number: u32) -> u32 {
        self.participation + self.per_correct * correct_number
    }
}

/// Everything to persist for one member of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberResult {
    pub player_id: PlayerId,
    pub display_name: String,
    pub entry: MatchHistoryEntry,
    pub stats: LeaderboardStats,
    pub currency: u32,
}

/// Results computed once when a session enters finalization. Retries
/// commit the same values.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResults {
    pub session_id: SessionId,
    pub lobby_id: LobbyId,
    pub game_type: GameType,
    pub members: Vec<MemberResult>,
    pub summaries: Vec<PlayerScoreSummary>,
}

pub fn ordinal(position: u32) -> String {
    let suffix = match (position % 10, position % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", position, suffix)
}

/// Competition ranking: equal scores share a placement and the next
/// distinct score skips ahead (1, 1, 3).
pub fn competition_ranks(scores: &BTreeMap<PlayerId, u32>) -> BTreeMap<PlayerId, u32> {
    scores
        .iter()
        .map(|(player_id, score)| {
            let better = scores.values().filter(|other| *other > score).count() as u32;
            (*player_id, better + 1)
        })
        .collect()
}

pub fn summarize(
    lobby_id: &LobbyId,
    game_type: GameType,
    difficulty: u8,
    session: &Session,
    display_names: &BTreeMap<PlayerId, String>,
    rewards: &RewardPolicy,
    now: DateTime<Utc>,
) -> SessionResults {
    let format = game_type.format();
    let mode = game_type.mode();
    let total_played = session.total_rounds();

    let scores: BTreeMap<PlayerId, u32> = session
        .player_states()
        .iter()
        .map(|(id, state)| (*id, state.score))
        .collect();
    let ranks = (format == Format::Versus).then(|| competition_ranks(&scores));

    let mut summaries: Vec<PlayerScoreSummary> = session
        .player_states()
        .iter()
        .map(|(id, state)| PlayerScoreSummary {
            player_id: *id,
            display_name: display_names.get(id).cloned().unwrap_or_default(),
            score: state.score,
            correct_number: state.correct_count(),
            placement: ranks.as_ref().and_then(|ranks| ranks.get(id).copied()),
        })
        .collect();
    summaries.sort_by(|a, b| b.score.cmp(&a.score).then(a.display_name.cmp(&b.display_name)));

    let team_won = session.team().is_some() && {
        let team_correct = (0..total_played)
            .filter(|round| {
                session.player_states().values().any(|state| {
                    state.answer_history.get(round) == Some(&AnswerOutcome::Correct)
                })
            })
            .count() as u32;
        team_correct * 2 >= total_played
    };

    let members = session
        .player_states()
        .iter()
        .map(|(player_id, state)| {
            let placement = ranks.as_ref().and_then(|ranks| ranks.get(player_id).copied());
            let (label, color) = match format {
                Format::Versus => {
                    let placement = placement.unwrap_or(1);
                    let color = if placement == 1 {
                        MatchColor::Win
                    } else {
                        MatchColor::Lose
                    };
                    (ordinal(placement), color)
                }
                Format::Coop => {
                    let color = if team_won {
                        MatchColor::Win
                    } else {
                        MatchColor::Lose
                    };
                    ("coop".to_string(), color)
                }
                Format::Solo => ("solo".to_string(), MatchColor::Solo),
            };

            let mut category_stats: BTreeMap<String, CategoryStats> = BTreeMap::new();
            let mut category_scores: BTreeMap<String, u32> = BTreeMap::new();
            for (index, question) in session.questions().iter().enumerate() {
                let round = index as u32;
                let stats = category_stats.entry(question.category.clone()).or_default();
                stats.total += 1;
                if state.answer_history.get(&round) == Some(&AnswerOutcome::Correct) {
                    stats.correct += 1;
                }
                *category_scores.entry(question.category.clone()).or_default() +=
                    state.points_history.get(&round).copied().unwrap_or(0);
            }

            let correct_number = state.correct_count();
            let mut stats = LeaderboardStats::new();
            for (category, counts) in &category_stats {
                stats.add(
                    StatKey::category(format, mode, category.clone()),
                    StatRecord {
                        correct: counts.correct,
                        total: counts.total,
                        score: category_scores.get(category).copied().unwrap_or(0),
                        ..Default::default()
                    },
                );
            }

            let (won_matches, total_matches) = match format {
                Format::Versus => (u32::from(placement == Some(1)), 1),
                Format::Coop | Format::Solo => (0, 0),
            };
            let overall = StatRecord {
                correct: correct_number,
                total: total_played,
                score: state.score,
                won_matches,
                total_matches,
            };
            stats.add(StatKey::mode_overall(format, mode), overall);
            stats.add(StatKey::format_overall(format), overall);

            let display_name = display_names.get(player_id).cloned().unwrap_or_default();
            MemberResult {
                player_id: *player_id,
                display_name,
                entry: MatchHistoryEntry {
                    session_id: session.session_id,
                    lobby_id: lobby_id.clone(),
                    game_type,
                    state: label,
                    color,
                    score: state.score,
                    team_score: session.team().map(|team| team.score),
                    total_played,
                    correct_number,
                    difficulty,
                    category_stats,
                    answer_history: state.answer_history.clone(),
                    team_answer_history: session.team().map(|team| team.answer_history.clone()),
                    players: summaries.clone(),
                    finished_at: now,
                },
                stats,
                currency: rewards.reward(correct_number),
            }
        })
        .collect();

    SessionResults {
        session_id: session.session_id,
        lobby_id: lobby_id.clone(),
        game_type,
        members,
        summaries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::powerups::PowerupAllowance;
    use crate::scoring::StandardScoring;
    use quiz_types::{ApprovalState, Mode, Question};
    use std::time::Duration;
    use uuid::Uuid;

    const FREEZE: Duration = Duration::from_secs(10);

    fn question(id: &str, category: &str) -> Question {
        Question {
            id: id.to_string(),
            prompt: id.to_string(),
            options: vec![],
            answer: "yes".to_string(),
            explanation: None,
            category: category.to_string(),
            difficulty: 1,
            approval: ApprovalState::Approved,
            community: false,
        }
    }

    /// Plays a session where each player answers per the given script.
    fn play(format: Format, script: &[(PlayerId, Vec<&str>)], categories: &[&str]) -> Session {
        let now = Utc::now();
        let questions = categories
            .iter()
            .enumerate()
            .map(|(i, category)| question(&format!("q{}", i), category))
            .collect();
        let mut session = Session::new(
            Uuid::new_v4(),
            format,
            questions,
            script.iter().map(|(id, _)| *id),
            20,
            &PowerupAllowance::none(),
            now,
        )
        .unwrap();
        let scoring = StandardScoring::default();

        for round in 0..categories.len() {
            for (player, answers) in script {
                if let Some(answer) = answers.get(round) {
                    if !answer.is_empty() {
                        session
                            .submit_answer(*player, answer, &[], &scoring, FREEZE, now)
                            .unwrap();
                    }
                }
            }
            session.close_round();
            let _ = session.advance(now);
        }
        session
    }

    fn names(players: &[PlayerId]) -> BTreeMap<PlayerId, String> {
        players
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, format!("Player {}", i + 1)))
            .collect()
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(102), "102nd");
    }

    #[test]
    fn test_competition_ranks_share_ties() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let scores = BTreeMap::from([(a, 300), (b, 300), (c, 100)]);

        let ranks = competition_ranks(&scores);
        assert_eq!(ranks[&a], 1);
        assert_eq!(ranks[&b], 1);
        assert_eq!(ranks[&c], 3);
    }

    #[test]
    fn test_solo_session_summary() {
        let player = Uuid::new_v4();
        let session = play(
            Format::Solo,
            &[(player, vec!["yes", "yes", "yes"])],
            &["science", "science", "science"],
        );
        let lobby_id = LobbyId::new("SOLO01");

        let results = summarize(
            &lobby_id,
            GameType::SoloClassic,
            3,
            &session,
            &names(&[player]),
            &RewardPolicy::default(),
            Utc::now(),
        );

        assert_eq!(results.members.len(), 1);
        let member = &results.members[0];
        assert_eq!(member.entry.state, "solo");
        assert_eq!(member.entry.color, MatchColor::Solo);
        assert_eq!(member.entry.correct_number, 3);
        assert_eq!(member.entry.total_played, 3);
        assert_eq!(member.entry.category_stats["science"].correct, 3);
        assert_eq!(member.entry.difficulty, 3);
        assert_eq!(member.entry.answer_history.len(), 3);
        assert!(member
            .entry
            .answer_history
            .values()
            .all(|outcome| *outcome == AnswerOutcome::Correct));
        assert!(member.entry.team_answer_history.is_none());
        assert_eq!(member.currency, 25);

        // Streak bonuses: 100, 110, 120
        assert_eq!(member.entry.score, 330);

        let category = member
            .stats
            .get(&StatKey::category(Format::Solo, Mode::Classic, "science"))
            .unwrap();
        assert_eq!((category.correct, category.total, category.score), (3, 3, 330));

        let overall = member.stats.get(&StatKey::format_overall(Format::Solo)).unwrap();
        assert_eq!(overall.total_matches, 0);
        assert_eq!(overall.won_matches, 0);
        assert_eq!(member.stats.len(), 3);
    }

    #[test]
    fn test_versus_placements_and_match_counts() {
        let winner = Uuid::new_v4();
        let loser = Uuid::new_v4();
        let session = play(
            Format::Versus,
            &[(winner, vec!["yes", "yes"]), (loser, vec!["no", "yes"])],
            &["history", "art"],
        );

        let results = summarize(
            &LobbyId::new("VERSUS"),
            GameType::VersusClassic,
            1,
            &session,
            &names(&[winner, loser]),
            &RewardPolicy::default(),
            Utc::now(),
        );

        let by_id: BTreeMap<_, _> = results.members.iter().map(|m| (m.player_id, m)).collect();
        assert_eq!(by_id[&winner].entry.state, "1st");
        assert_eq!(by_id[&winner].entry.color, MatchColor::Win);
        assert_eq!(by_id[&loser].entry.state, "2nd");
        assert_eq!(by_id[&loser].entry.color, MatchColor::Lose);

        let winner_overall = by_id[&winner]
            .stats
            .get(&StatKey::mode_overall(Format::Versus, Mode::Classic))
            .unwrap();
        assert_eq!(winner_overall.won_matches, 1);
        assert_eq!(winner_overall.total_matches, 1);

        let loser_format = by_id[&loser]
            .stats
            .get(&StatKey::format_overall(Format::Versus))
            .unwrap();
        assert_eq!(loser_format.won_matches, 0);
        assert_eq!(loser_format.total_matches, 1);

        // Category keys never carry match counts
        let category = by_id[&winner]
            .stats
            .get(&StatKey::category(Format::Versus, Mode::Classic, "art"))
            .unwrap();
        assert_eq!(category.total_matches, 0);

        assert_eq!(results.summaries[0].player_id, winner);
        assert_eq!(results.summaries[0].placement, Some(1));
    }

    #[test]
    fn test_coop_summary_uses_team_result() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let session = play(
            Format::Coop,
            &[(first, vec!["yes", "no"]), (second, vec!["no", ""])],
            &["science", "science"],
        );

        let results = summarize(
            &LobbyId::new("COOP01"),
            GameType::CoopKnowledge,
            2,
            &session,
            &names(&[first, second]),
            &RewardPolicy::default(),
            Utc::now(),
        );

        for member in &results.members {
            assert_eq!(member.entry.state, "coop");
            assert_eq!(member.entry.color, MatchColor::Win);
            assert_eq!(member.entry.team_score, Some(100));
            assert_eq!(member.entry.total_played, 2);
            assert_eq!(member.entry.difficulty, 2);

            let team_history = member.entry.team_answer_history.as_ref().unwrap();
            assert_eq!(team_history[&0]["yes"], vec![first]);
            assert_eq!(team_history[&0]["no"], vec![second]);
            assert_eq!(team_history[&1]["no"], vec![first]);
            assert!(!team_history[&1].values().any(|members| members.contains(&second)));
        }

        let second_result = results
            .members
            .iter()
            .find(|m| m.player_id == second)
            .unwrap();
        assert_eq!(second_result.entry.correct_number, 0);
        assert_eq!(second_result.entry.answer_history[&0], AnswerOutcome::Wrong);
        assert_eq!(second_result.entry.answer_history[&1], AnswerOutcome::Missing);
        assert_eq!(second_result.currency, 10);
    }
}
