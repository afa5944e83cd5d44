//! Test assertion helpers - fluent API for verifying fan-out expectations
#![allow(dead_code)] // Test utilities may not all be used in every test

use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use fantasy_live::websockets::{MessageType, WebSocketMessage};

use super::setup::TestSetup;

// ============================================================================
// Assertion Helpers
// ============================================================================

pub struct MessageAssertion<'a> {
    setup: &'a TestSetup,
    contest_id: Uuid,
}

impl<'a> MessageAssertion<'a> {
    pub fn for_contest(setup: &'a TestSetup, contest_id: Uuid) -> Self {
        Self { setup, contest_id }
    }

    /// Asserts at least one leaderboard update was broadcast and returns the latest
    pub async fn received_leaderboard_update(self) -> LeaderboardChanges {
        let messages = self.setup.connections.broadcasts_for(self.contest_id).await;
        let latest = messages
            .iter()
            .rev()
            .find(|m| m.message_type == MessageType::LeaderboardUpdate)
            .unwrap_or_else(|| panic!("no LEADERBOARD_UPDATE for contest {}", self.contest_id));
        LeaderboardChanges::from_message(latest)
    }

    pub async fn received_no_messages(self) {
        let messages = self.setup.connections.broadcasts_for(self.contest_id).await;
        assert!(
            messages.is_empty(),
            "contest {} should not have received any messages, got {}",
            self.contest_id,
            messages.len()
        );
    }
}

/// Rank and points per user team from one LEADERBOARD_UPDATE
pub struct LeaderboardChanges {
    rows: HashMap<Uuid, (i32, Decimal)>,
}

impl LeaderboardChanges {
    fn from_message(message: &WebSocketMessage) -> Self {
        let changes = message.payload["changes"]
            .as_array()
            .expect("changes should be an array");
        let rows = changes
            .iter()
            .map(|row| {
                let team: Uuid = row["user_team_id"].as_str().unwrap().parse().unwrap();
                let rank = row["rank"].as_i64().unwrap() as i32;
                let points: Decimal = row["total_points"].as_str().unwrap().parse().unwrap();
                (team, (rank, points))
            })
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn verify_rank(&self, team_id: Uuid, rank: i32) -> &Self {
        let (actual, _) = self
            .rows
            .get(&team_id)
            .unwrap_or_else(|| panic!("team {} missing from update", team_id));
        assert_eq!(*actual, rank, "team {} has wrong rank", team_id);
        self
    }

    pub fn verify_points(&self, team_id: Uuid, points: Decimal) -> &Self {
        let (_, actual) = self
            .rows
            .get(&team_id)
            .unwrap_or_else(|| panic!("team {} missing from update", team_id));
        assert_eq!(*actual, points, "team {} has wrong points", team_id);
        self
    }
}

/// Asserts the user received exactly the given PRIZE_AWARDED amounts
pub async fn assert_prizes(setup: &TestSetup, user_id: Uuid, expected: &[Decimal]) {
    let amounts: Vec<Decimal> = setup
        .connections
        .messages_for_user(user_id)
        .await
        .iter()
        .filter(|m| m.message_type == MessageType::PrizeAwarded)
        .map(|m| m.payload["amount"].as_str().unwrap().parse().unwrap())
        .collect();
    assert_eq!(amounts, expected, "unexpected prizes for user {}", user_id);
}
