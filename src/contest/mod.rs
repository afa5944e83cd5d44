// Leaderboard Engine and the contest query surface

// Public API - what other modules can use
pub use handlers::{get_leaderboard, get_team_rank};
pub use leaderboard::{rank_standings, LeaderboardEngine};
pub use types::{
    LeaderboardComputation, LeaderboardEntry, LeaderboardResponse, MatchRefresh, TeamRankResponse,
};

// Internal modules
mod handlers;
mod leaderboard;
pub mod models;
mod types;
