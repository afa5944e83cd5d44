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
pub enum ContestStatus {
    Upcoming,
    Live,
    Completed,
    Cancelled,
}

/// A prize pool + entry fee + ranked competition bound to one match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contest {
    pub id: Uuid,
    pub match_id: Uuid,
    pub name: String,
    pub entry_fee: Decimal,
    pub total_prize_pool: Decimal,
    /// Raw schedule as configured; parsed and validated at settlement
    pub prize_distribution: Option<serde_json::Value>,
    pub max_participants: i32,
    pub allow_multi_entry: bool,
    pub status: ContestStatus,
}

impl Contest {
    pub fn new(match_id: Uuid, name: impl Into<String>, total_prize_pool: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            match_id,
            name: name.into(),
            entry_fee: Decimal::ZERO,
            total_prize_pool,
            prize_distribution: None,
            max_participants: 100,
            allow_multi_entry: false,
            status: ContestStatus::Upcoming,
        }
    }

    pub fn with_distribution(mut self, distribution: serde_json::Value) -> Self {
        self.prize_distribution = Some(distribution);
        self
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status, ContestStatus::Completed | ContestStatus::Cancelled)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContestParticipant {
    pub id: Uuid,
    pub contest_id: Uuid,
    pub user_team_id: Uuid,
    pub user_id: Uuid,
    pub rank: Option<i32>,
    pub prize_won: Option<Decimal>,
}

impl ContestParticipant {
    pub fn new(contest_id: Uuid, user_team_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            contest_id,
            user_team_id,
            user_id,
            rank: None,
            prize_won: None,
        }
    }
}

/// Participant joined with its roster's name and current total
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Standing {
    pub participant_id: Uuid,
    pub user_team_id: Uuid,
    pub user_id: Uuid,
    pub team_name: String,
    pub total_points: Decimal,
    pub rank: Option<i32>,
    pub prize_won: Option<Decimal>,
}

/// One audited payout line; `reference` is unique across the ledger
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PrizeLedgerEntry {
    pub reference: String,
    pub match_id: Uuid,
    pub contest_id: Uuid,
    pub participant_id: Uuid,
    pub user_team_id: Uuid,
    pub user_id: Uuid,
    pub rank: i32,
    pub amount: Decimal,
    pub wallet_entry_id: String,
    pub created_at: DateTime<Utc>,
}

impl PrizeLedgerEntry {
    /// Ledger key for one contest+rank+roster payout within a match
    pub fn reference_for(match_id: Uuid, contest_id: Uuid, rank: i32, user_team_id: Uuid) -> String {
        format!("prize:{}:{}:{}:{}", match_id, contest_id, rank, user_team_id)
    }
}
