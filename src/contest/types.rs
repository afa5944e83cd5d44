use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One ranked row of a contest leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_team_id: Uuid,
    pub user_id: Uuid,
    pub team_name: String,
    pub rank: i32,
    /// Rank at the previous computation; absent for a first appearance
    pub previous_rank: Option<i32>,
    pub total_points: Decimal,
}

/// Result of ranking one contest
#[derive(Debug, Clone, Default)]
pub struct LeaderboardComputation {
    pub contest_id: Uuid,
    pub entries: Vec<LeaderboardEntry>,
    /// Entries whose rank or score changed since the previous computation
    pub deltas: Vec<LeaderboardEntry>,
}

/// Outcome of ranking every contest of one match
#[derive(Debug, Clone, Default)]
pub struct MatchRefresh {
    pub computed: Vec<LeaderboardComputation>,
    /// Contests whose ranks could not be recomputed; their persisted ranks are stale
    pub failed: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub contest_id: Uuid,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TeamRankResponse {
    pub contest_id: Uuid,
    pub user_team_id: Uuid,
    pub rank: i32,
    pub total_points: Decimal,
    pub participants: usize,
}
