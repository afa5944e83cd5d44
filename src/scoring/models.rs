use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchStatus {
    Upcoming,
    Live,
    Completed,
}

/// A real-world esports match being fantasy-scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub game_id: Uuid,
    pub name: String,
    pub scheduled_at: DateTime<Utc>,
    pub lock_at: DateTime<Utc>,
    pub status: MatchStatus,
    pub result_summary: Option<String>,
}

impl Match {
    pub fn new(game_id: Uuid, name: impl Into<String>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id,
            name: name.into(),
            scheduled_at,
            lock_at: scheduled_at,
            status: MatchStatus::Upcoming,
            result_summary: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == MatchStatus::Live
    }

    /// Corrections to the ledger are accepted once the match has started
    pub fn accepts_corrections(&self) -> bool {
        matches!(self.status, MatchStatus::Live | MatchStatus::Completed)
    }
}

/// Read-only player record owned by the catalogue
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub game_id: Uuid,
    pub team_name: String,
    pub name: String,
    pub role: String,
    pub credits: Decimal,
}

/// One ledger line for an in-match occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub id: Uuid,
    pub match_id: Uuid,
    pub player_id: Uuid,
    pub event_type: String,
    pub points: Decimal,
    pub round: Option<i32>,
    pub game_time_secs: Option<i32>,
    pub metadata: serde_json::Value,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's fantasy roster for one match
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserTeam {
    pub id: Uuid,
    pub user_id: Uuid,
    pub match_id: Uuid,
    pub name: String,
    pub total_points: Decimal,
    pub final_rank: Option<i32>,
    pub is_locked: bool,
}

impl UserTeam {
    pub fn new(user_id: Uuid, match_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            match_id,
            name: name.into(),
            total_points: Decimal::ZERO,
            final_rank: None,
            is_locked: false,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TeamPlayer {
    pub user_team_id: Uuid,
    pub player_id: Uuid,
    pub is_captain: bool,
    pub is_vice_captain: bool,
    pub points_earned: Decimal,
}

impl TeamPlayer {
    pub fn new(user_team_id: Uuid, player_id: Uuid) -> Self {
        Self {
            user_team_id,
            player_id,
            is_captain: false,
            is_vice_captain: false,
            points_earned: Decimal::ZERO,
        }
    }

    pub fn captain(mut self) -> Self {
        self.is_captain = true;
        self
    }

    pub fn vice_captain(mut self) -> Self {
        self.is_vice_captain = true;
        self
    }
}

/// A roster together with its player rows
#[derive(Debug, Clone, Serialize)]
pub struct Roster {
    pub team: UserTeam,
    pub players: Vec<TeamPlayer>,
}

impl Roster {
    pub fn contains(&self, player_id: Uuid) -> bool {
        self.players.iter().any(|p| p.player_id == player_id)
    }
}
