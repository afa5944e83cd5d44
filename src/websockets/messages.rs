use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contest::LeaderboardEntry;

/// Message types for WebSocket communication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // Client -> Server
    Ping,

    // Server -> Client
    Connected,
    LeaderboardUpdate,
    PrizeAwarded,
    Pong,
    Error,
}

/// Metadata for WebSocket messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessageMeta {
    pub timestamp: DateTime<Utc>,
    /// Assigned by the connection manager when the message is dispatched
    pub message_id: Option<u64>,
}

/// Base structure for WebSocket messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub meta: Option<WebSocketMessageMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    pub connection_id: Uuid,
    pub contest_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardUpdatePayload {
    pub contest_id: Uuid,
    pub changes: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizeAwardedPayload {
    pub contest_id: Uuid,
    pub rank: i32,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

fn to_payload<T: Serialize>(payload: T) -> serde_json::Value {
    serde_json::to_value(payload).unwrap_or_default()
}

/// Helper functions for creating messages
impl WebSocketMessage {
    pub fn new(message_type: MessageType, payload: serde_json::Value) -> Self {
        Self {
            message_type,
            payload,
            meta: Some(WebSocketMessageMeta {
                timestamp: Utc::now(),
                message_id: None,
            }),
        }
    }

    /// Create a CONNECTED message
    pub fn connected(connection_id: Uuid, contest_id: Uuid, user_id: Uuid) -> Self {
        Self::new(
            MessageType::Connected,
            to_payload(ConnectedPayload {
                connection_id,
                contest_id,
                user_id,
            }),
        )
    }

    /// Create a LEADERBOARD_UPDATE message carrying only changed entries
    pub fn leaderboard_update(contest_id: Uuid, changes: Vec<LeaderboardEntry>) -> Self {
        Self::new(
            MessageType::LeaderboardUpdate,
            to_payload(LeaderboardUpdatePayload {
                contest_id,
                changes,
            }),
        )
    }

    /// Create a PRIZE_AWARDED message
    pub fn prize_awarded(contest_id: Uuid, rank: i32, amount: Decimal) -> Self {
        Self::new(
            MessageType::PrizeAwarded,
            to_payload(PrizeAwardedPayload {
                contest_id,
                rank,
                amount,
            }),
        )
    }

    pub fn pong() -> Self {
        Self::new(MessageType::Pong, serde_json::json!({}))
    }

    /// Create an ERROR message
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            MessageType::Error,
            to_payload(ErrorPayload {
                message: message.into(),
            }),
        )
    }

    /// Stamps the dispatch id and time, replacing any earlier metadata
    pub fn stamped(mut self, message_id: u64) -> Self {
        self.meta = Some(WebSocketMessageMeta {
            timestamp: Utc::now(),
            message_id: Some(message_id),
        });
        self
    }

    pub fn message_id(&self) -> Option<u64> {
        self.meta.as_ref().and_then(|m| m.message_id)
    }
}
