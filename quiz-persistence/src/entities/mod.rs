pub mod leaderboard_stats;
pub mod match_history;
pub mod players;
pub mod prelude;
