use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use fantasy_live::websockets::{ConnectionManager, MessageType, Registration, WebSocketMessage};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Records every fan-out instead of delivering it
#[derive(Clone, Default)]
pub struct RecordingConnectionManager {
    broadcasts: Arc<RwLock<HashMap<Uuid, Vec<WebSocketMessage>>>>,
    personalized: Arc<RwLock<HashMap<Uuid, Vec<WebSocketMessage>>>>,
}

impl RecordingConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn broadcasts_for(&self, contest_id: Uuid) -> Vec<WebSocketMessage> {
        self.broadcasts
            .read()
            .await
            .get(&contest_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn messages_for_user(&self, user_id: Uuid) -> Vec<WebSocketMessage> {
        self.personalized
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn count_of(&self, message_type: MessageType) -> usize {
        let broadcasts = self.broadcasts.read().await;
        let personalized = self.personalized.read().await;
        broadcasts
            .values()
            .chain(personalized.values())
            .flatten()
            .filter(|m| m.message_type == message_type)
            .count()
    }
}

#[async_trait]
impl ConnectionManager for RecordingConnectionManager {
    async fn register(&self, _registration: Registration) {}

    async fn unregister(&self, _connection_id: Uuid) {}

    async fn broadcast(&self, contest_id: Uuid, message: WebSocketMessage) {
        self.broadcasts
            .write()
            .await
            .entry(contest_id)
            .or_default()
            .push(message);
    }

    async fn send_personalized(&self, user_id: Uuid, _contest_id: Uuid, message: WebSocketMessage) {
        self.personalized
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push(message);
    }

    async fn touch(&self, _connection_id: Uuid) {}
}
