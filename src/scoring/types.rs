use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::models::{Match, MatchEvent};
use crate::settlement::SettlementSummary;

/// Admin input for one match event; the point value is derived from the game's rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMatchEvent {
    pub player_id: Uuid,
    pub event_type: String,
    pub round: Option<i32>,
    pub game_time_secs: Option<i32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NewMatchEvent {
    pub fn new(player_id: Uuid, event_type: impl Into<String>) -> Self {
        Self {
            player_id,
            event_type: event_type.into(),
            round: None,
            game_time_secs: None,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Fields to replace on an existing event; absent fields keep their value.
/// `round` and `game_time_secs` are cleared by an explicit `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    pub player_id: Option<Uuid>,
    pub event_type: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub round: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub game_time_secs: Option<Option<i32>>,
    pub metadata: Option<serde_json::Value>,
}

// A present key, even `null`, becomes `Some`; a missing one stays `None` through `default`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct BulkEventsRequest {
    pub events: Vec<NewMatchEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<MatchEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BulkItemError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkEventResult {
    pub applied: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

impl BulkEventResult {
    pub fn failures(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.results.iter().filter(|r| r.error.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculationSummary {
    pub match_id: Uuid,
    pub events_replayed: usize,
    /// Events whose stored point value differed from the current rules
    pub events_rescored: usize,
    pub rosters_updated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMatchSummary {
    pub match_id: Uuid,
    pub rosters_locked: u64,
    pub contests_opened: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteMatchRequest {
    pub result_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub match_id: Uuid,
    pub leaderboards_finalized: usize,
    /// Contests left unsettled because their final ranks could not be computed
    pub stale_contests: Vec<Uuid>,
    /// Why finalization stopped early; `resettle` retries from here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub settlement: SettlementSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardRoster {
    pub user_team_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub total_points: Decimal,
}

/// Live-scoring view for admins: match, newest events and roster totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveDashboard {
    #[serde(rename = "match")]
    pub match_info: Match,
    pub recent_events: Vec<MatchEvent>,
    pub rosters: Vec<DashboardRoster>,
}
