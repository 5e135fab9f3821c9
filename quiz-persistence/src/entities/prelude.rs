pub use super::leaderboard_stats::Entity as LeaderboardEntries;
pub use super::match_history::Entity as MatchHistory;
pub use super::players::Entity as Players;
