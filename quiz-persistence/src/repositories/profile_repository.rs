use anyhow::Result;
use quiz_types::{
    LeaderboardStats, MatchHistoryEntry, PlayerId, SessionId, StatKey, StatRecord,
};
use sea_orm::{
    ActiveValue, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use thiserror::Error;

use crate::entities::{leaderboard_stats, match_history, players, prelude::*};

#[derive(Debug, Error)]
pub enum ProfileStoreError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("failed to encode match history: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything one session adds to one player's profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileUpdate {
    pub player_id: PlayerId,
    pub display_name: String,
    pub entry: MatchHistoryEntry,
    pub stats: LeaderboardStats,
    pub currency: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub applied: usize,
    /// Members whose entry for this session was already stored.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PlayerProfile {
    pub id: String,
    pub display_name: String,
    pub currency: i64,
    pub matches_played: i32,
}

pub struct ProfileRepository {
    db: DatabaseConnection,
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

impl ProfileRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn model_to_profile(model: players::Model) -> PlayerProfile {
        PlayerProfile {
            id: model.id,
            display_name: model.display_name,
            currency: model.currency,
            matches_played: model.matches_played,
        }
    }

    fn model_to_record(model: &leaderboard_stats::Model) -> StatRecord {
        StatRecord {
            correct: to_u32(i64::from(model.correct)),
            total: to_u32(i64::from(model.total)),
            score: to_u32(model.score),
            won_matches: to_u32(i64::from(model.won_matches)),
            total_matches: to_u32(i64::from(model.total_matches)),
        }
    }

    /// Applies every member's update for `session_id` in one transaction.
    /// Members that already have an entry for the session are skipped, so a
    /// retried commit never double counts.
    pub async fn commit_session(
        &self,
        session_id: SessionId,
        updates: &[ProfileUpdate],
    ) -> std::result::Result<CommitReport, ProfileStoreError> {
        let txn = self.db.begin().await?;
        let mut report = CommitReport::default();

        for update in updates {
            let player_key = update.player_id.to_string();
            let existing = MatchHistory::find()
                .filter(match_history::Column::PlayerId.eq(player_key.clone()))
                .filter(match_history::Column::SessionId.eq(session_id.to_string()))
                .one(&txn)
                .await?;
            if existing.is_some() {
                report.skipped += 1;
                continue;
            }

            Self::credit_player(&txn, update).await?;
            Self::insert_history(&txn, session_id, update).await?;
            Self::merge_stats(&txn, &player_key, &update.stats).await?;
            report.applied += 1;
        }

        txn.commit().await?;

        tracing::info!(
            session_id = %session_id,
            applied = report.applied,
            skipped = report.skipped,
            "Committed session results"
        );
        Ok(report)
    }

    async fn credit_player<C: ConnectionTrait>(
        db: &C,
        update: &ProfileUpdate,
    ) -> std::result::Result<(), DbErr> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = chrono::Utc::now().into();
        let player_key = update.player_id.to_string();

        match Players::find_by_id(player_key.clone()).one(db).await? {
            Some(player) => {
                let updated = players::ActiveModel {
                    id: ActiveValue::Unchanged(player.id),
                    display_name: ActiveValue::Set(update.display_name.clone()),
                    currency: ActiveValue::Set(player.currency + i64::from(update.currency)),
                    matches_played: ActiveValue::Set(player.matches_played + 1),
                    created_at: ActiveValue::Unchanged(player.created_at),
                    updated_at: ActiveValue::Set(now),
                };
                Players::update(updated).exec(db).await?;
            }
            None => {
                let created = players::ActiveModel {
                    id: ActiveValue::Set(player_key),
                    display_name: ActiveValue::Set(update.display_name.clone()),
                    currency: ActiveValue::Set(i64::from(update.currency)),
                    matches_played: ActiveValue::Set(1),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                };
                Players::insert(created).exec(db).await?;
            }
        }
        Ok(())
    }

    async fn insert_history<C: ConnectionTrait>(
        db: &C,
        session_id: SessionId,
        update: &ProfileUpdate,
    ) -> std::result::Result<(), ProfileStoreError> {
        let entry_json = serde_json::to_string(&update.entry)?;
        let model = match_history::ActiveModel {
            id: ActiveValue::Set(uuid::Uuid::new_v4().to_string()),
            player_id: ActiveValue::Set(update.player_id.to_string()),
            session_id: ActiveValue::Set(session_id.to_string()),
            lobby_id: ActiveValue::Set(update.entry.lobby_id.to_string()),
            game_type: ActiveValue::Set(update.entry.game_type.to_string()),
            state: ActiveValue::Set(update.entry.state.clone()),
            score: ActiveValue::Set(to_i32(update.entry.score)),
            entry_json: ActiveValue::Set(entry_json),
            finished_at: ActiveValue::Set(update.entry.finished_at.into()),
        };
        MatchHistory::insert(model).exec(db).await?;
        Ok(())
    }

    async fn merge_stats<C: ConnectionTrait>(
        db: &C,
        player_key: &str,
        stats: &LeaderboardStats,
    ) -> std::result::Result<(), DbErr> {
        for (key, delta) in stats.iter() {
            let primary_key = (
                player_key.to_string(),
                key.format().as_str().to_string(),
                key.mode().as_str().to_string(),
                key.category_key().as_str().to_string(),
            );

            match LeaderboardEntries::find_by_id(primary_key.clone()).one(db).await? {
                Some(row) => {
                    let mut merged = Self::model_to_record(&row);
                    merged.merge(delta);
                    let updated = leaderboard_stats::ActiveModel {
                        player_id: ActiveValue::Unchanged(row.player_id),
                        format: ActiveValue::Unchanged(row.format),
                        mode: ActiveValue::Unchanged(row.mode),
                        category: ActiveValue::Unchanged(row.category),
                        correct: ActiveValue::Set(to_i32(merged.correct)),
                        total: ActiveValue::Set(to_i32(merged.total)),
                        score: ActiveValue::Set(i64::from(merged.score)),
                        won_matches: ActiveValue::Set(to_i32(merged.won_matches)),
                        total_matches: ActiveValue::Set(to_i32(merged.total_matches)),
                    };
                    LeaderboardEntries::update(updated).exec(db).await?;
                }
                None => {
                    let (player_id, format, mode, category) = primary_key;
                    let created = leaderboard_stats::ActiveModel {
                        player_id: ActiveValue::Set(player_id),
                        format: ActiveValue::Set(format),
                        mode: ActiveValue::Set(mode),
                        category: ActiveValue::Set(category),
                        correct: ActiveValue::Set(to_i32(delta.correct)),
                        total: ActiveValue::Set(to_i32(delta.total)),
                        score: ActiveValue::Set(i64::from(delta.score)),
                        won_matches: ActiveValue::Set(to_i32(delta.won_matches)),
                        total_matches: ActiveValue::Set(to_i32(delta.total_matches)),
                    };
                    LeaderboardEntries::insert(created).exec(db).await?;
                }
            }
        }
        Ok(())
    }

    pub async fn find_player(&self, player_id: PlayerId) -> Result<Option<PlayerProfile>> {
        let model = Players::find_by_id(player_id.to_string())
            .one(&self.db)
            .await?;
        Ok(model.map(Self::model_to_profile))
    }

    pub async fn leaderboard_stats(&self, player_id: PlayerId) -> Result<LeaderboardStats> {
        let rows = LeaderboardEntries::find()
            .filter(leaderboard_stats::Column::PlayerId.eq(player_id.to_string()))
            .all(&self.db)
            .await?;

        let mut stats = LeaderboardStats::new();
        for row in &rows {
            match StatKey::parse(&row.format, &row.mode, &row.category) {
                Some(key) => stats.add(key, Self::model_to_record(row)),
                None => tracing::warn!(
                    player_id = %player_id,
                    "Skipping unrecognized stat key {}/{}/{}",
                    row.format,
                    row.mode,
                    row.category
                ),
            }
        }
        Ok(stats)
    }

    /// Most recent entries first.
    pub async fn match_history(
        &self,
        player_id: PlayerId,
        limit: u64,
    ) -> Result<Vec<MatchHistoryEntry>> {
        let rows = MatchHistory::find()
            .filter(match_history::Column::PlayerId.eq(player_id.to_string()))
            .order_by_desc(match_history::Column::FinishedAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_str(&row.entry_json).map_err(|e| {
                    anyhow::anyhow!("Corrupt match history entry {}: {}", row.id, e)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_to_memory_database;
    use chrono::{Duration, Utc};
    use migration::{Migrator, MigratorTrait};
    use quiz_types::{AnswerOutcome, Format, GameType, LobbyId, MatchColor, Mode};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    async fn setup_test_db() -> ProfileRepository {
        let db = connect_to_memory_database().await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        ProfileRepository::new(db)
    }

    fn create_update(player_id: PlayerId, session_id: SessionId, correct: u32) -> ProfileUpdate {
        let mut stats = LeaderboardStats::new();
        let record = StatRecord {
            correct,
            total: 3,
            score: correct * 100,
            won_matches: 1,
            total_matches: 1,
        };
        stats.add(
            StatKey::category(Format::Versus, Mode::Classic, "history"),
            StatRecord {
                won_matches: 0,
                total_matches: 0,
                ..record
            },
        );
        stats.add(StatKey::mode_overall(Format::Versus, Mode::Classic), record);
        stats.add(StatKey::format_overall(Format::Versus), record);

        ProfileUpdate {
            player_id,
            display_name: "Player".to_string(),
            entry: MatchHistoryEntry {
                session_id,
                lobby_id: LobbyId::new("ABC123"),
                game_type: GameType::VersusClassic,
                state: "1st".to_string(),
                color: MatchColor::Win,
                score: correct * 100,
                team_score: None,
                total_played: 3,
                correct_number: correct,
                difficulty: 2,
                category_stats: BTreeMap::new(),
                answer_history: (0..3)
                    .map(|round| {
                        let outcome = if round < correct {
                            AnswerOutcome::Correct
                        } else {
                            AnswerOutcome::Wrong
                        };
                        (round, outcome)
                    })
                    .collect(),
                team_answer_history: None,
                players: Vec::new(),
                finished_at: Utc::now(),
            },
            stats,
            currency: 10 + 5 * correct,
        }
    }

    #[tokio::test]
    async fn test_commit_creates_profile() {
        let repo = setup_test_db().await;
        let player_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let report = repo
            .commit_session(session_id, &[create_update(player_id, session_id, 2)])
            .await
            .unwrap();
        assert_eq!(report.applied, 1);

        let profile = repo.find_player(player_id).await.unwrap().unwrap();
        assert_eq!(profile.currency, 20);
        assert_eq!(profile.matches_played, 1);

        let history = repo.match_history(player_id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].session_id, session_id);
        assert_eq!(history[0].correct_number, 2);
        assert_eq!(history[0].difficulty, 2);
        assert_eq!(history[0].answer_history[&2], AnswerOutcome::Wrong);
    }

    #[tokio::test]
    async fn test_commit_is_idempotent_per_session() {
        let repo = setup_test_db().await;
        let player_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let updates = [create_update(player_id, session_id, 3)];

        repo.commit_session(session_id, &updates).await.unwrap();
        let report = repo.commit_session(session_id, &updates).await.unwrap();
        assert_eq!(report, CommitReport { applied: 0, skipped: 1 });

        let profile = repo.find_player(player_id).await.unwrap().unwrap();
        assert_eq!(profile.currency, 25);
        assert_eq!(profile.matches_played, 1);

        let stats = repo.leaderboard_stats(player_id).await.unwrap();
        let overall = stats.get(&StatKey::format_overall(Format::Versus)).unwrap();
        assert_eq!(overall.correct, 3);
        assert_eq!(overall.total_matches, 1);
    }

    #[tokio::test]
    async fn test_stats_merge_across_sessions() {
        let repo = setup_test_db().await;
        let player_id = Uuid::new_v4();

        for correct in [1, 2] {
            let session_id = Uuid::new_v4();
            repo.commit_session(session_id, &[create_update(player_id, session_id, correct)])
                .await
                .unwrap();
        }

        let stats = repo.leaderboard_stats(player_id).await.unwrap();
        assert_eq!(stats.len(), 3);

        let history_key = StatKey::category(Format::Versus, Mode::Classic, "history");
        let record = stats.get(&history_key).unwrap();
        assert_eq!(record.correct, 3);
        assert_eq!(record.total, 6);
        assert_eq!(record.score, 300);

        let nested = stats.nested();
        assert_eq!(nested["versus"]["overall"]["overall"].total_matches, 2);
        assert_eq!(nested["versus"]["classic"]["history"].correct, 3);

        let profile = repo.find_player(player_id).await.unwrap().unwrap();
        assert_eq!(profile.currency, 15 + 20);
    }

    #[tokio::test]
    async fn test_match_history_newest_first_with_limit() {
        let repo = setup_test_db().await;
        let player_id = Uuid::new_v4();
        let start = Utc::now();

        for i in 0..4 {
            let session_id = Uuid::new_v4();
            let mut update = create_update(player_id, session_id, i);
            update.entry.finished_at = start + Duration::minutes(i64::from(i));
            repo.commit_session(session_id, &[update]).await.unwrap();
        }

        let history = repo.match_history(player_id, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].correct_number, 3);
        assert_eq!(history[1].correct_number, 2);
    }

    #[tokio::test]
    async fn test_unknown_player_has_empty_profile() {
        let repo = setup_test_db().await;
        let player_id = Uuid::new_v4();

        assert!(repo.find_player(player_id).await.unwrap().is_none());
        assert!(repo.leaderboard_stats(player_id).await.unwrap().is_empty());
        assert!(repo.match_history(player_id, 10).await.unwrap().is_empty());
    }
}
