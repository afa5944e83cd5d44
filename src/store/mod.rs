// Scoring Repository: durable store of matches, event ledger, roster totals and contest results.
// Each trait method is atomic; `commit_scoring` and `finalize_settlement` are single transactions.

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

mod memory;
mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::contest::models::{Contest, ContestStatus, PrizeLedgerEntry, Standing};
use crate::scoring::models::{Match, MatchEvent, MatchStatus, Roster};
use crate::shared::AppError;

/// The ledger mutation carried by a scoring commit
#[derive(Debug, Clone)]
pub enum LedgerChange {
    Insert(MatchEvent),
    Update(MatchEvent),
    Delete(Uuid),
    /// Point values re-derived for existing events (full replay)
    Rescore(Vec<MatchEvent>),
}

/// Recomputed state for one roster
#[derive(Debug, Clone, PartialEq)]
pub struct RosterUpdate {
    pub user_team_id: Uuid,
    pub total_points: Decimal,
    pub player_points: Vec<(Uuid, Decimal)>,
}

/// Everything one event mutation writes, committed together
#[derive(Debug, Clone)]
pub struct ScoringCommit {
    pub match_id: Uuid,
    pub change: LedgerChange,
    pub rosters: Vec<RosterUpdate>,
}

/// Rank assignment for one contest participant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankAssignment {
    pub participant_id: Uuid,
    pub user_team_id: Uuid,
    pub rank: i32,
}

/// Payout records for one contest, written in one transaction
#[derive(Debug, Clone)]
pub struct ContestSettlement {
    pub contest_id: Uuid,
    pub payouts: Vec<PrizeLedgerEntry>,
    /// Moves the contest to `completed`; false when some credit failed and needs a retry
    pub close_contest: bool,
}

#[async_trait]
pub trait ScoringRepository: Send + Sync {
    async fn get_match(&self, match_id: Uuid) -> Result<Option<Match>, AppError>;

    /// Compare-and-set on match status. Returns false when the match was not in `from`.
    async fn transition_match(
        &self,
        match_id: Uuid,
        from: MatchStatus,
        to: MatchStatus,
        result_summary: Option<String>,
    ) -> Result<bool, AppError>;

    async fn lock_rosters(&self, match_id: Uuid) -> Result<u64, AppError>;

    async fn is_player_in_match(&self, match_id: Uuid, player_id: Uuid) -> Result<bool, AppError>;

    async fn get_event(&self, event_id: Uuid) -> Result<Option<MatchEvent>, AppError>;

    /// Ledger for a match in creation order
    async fn list_events(&self, match_id: Uuid) -> Result<Vec<MatchEvent>, AppError>;

    /// Newest first
    async fn recent_events(&self, match_id: Uuid, limit: i64) -> Result<Vec<MatchEvent>, AppError>;

    async fn rosters_for_match(&self, match_id: Uuid) -> Result<Vec<Roster>, AppError>;

    /// Rosters of the match that contain any of `player_ids`
    async fn rosters_containing(
        &self,
        match_id: Uuid,
        player_ids: &[Uuid],
    ) -> Result<Vec<Roster>, AppError>;

    async fn commit_scoring(&self, commit: ScoringCommit) -> Result<(), AppError>;
}

#[async_trait]
pub trait ContestRepository: Send + Sync {
    async fn get_contest(&self, contest_id: Uuid) -> Result<Option<Contest>, AppError>;

    async fn contests_for_match(&self, match_id: Uuid) -> Result<Vec<Contest>, AppError>;

    async fn set_contest_status_for_match(
        &self,
        match_id: Uuid,
        from: ContestStatus,
        to: ContestStatus,
    ) -> Result<u64, AppError>;

    async fn standings(&self, contest_id: Uuid) -> Result<Vec<Standing>, AppError>;

    /// Writes participant ranks and the rosters' `final_rank`
    async fn save_ranks(&self, contest_id: Uuid, ranks: &[RankAssignment]) -> Result<(), AppError>;

    async fn has_payout(&self, reference: &str) -> Result<bool, AppError>;

    async fn finalize_settlement(&self, settlement: ContestSettlement) -> Result<(), AppError>;
}
