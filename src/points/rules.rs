use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::shared::AppError;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("Scoring rules are not valid JSON: {0}")]
    Malformed(String),

    #[error("Scoring rules contain no event types")]
    Empty,

    #[error("Scoring rules contain an empty event type")]
    BlankEventType,

    #[error("Scoring rules list '{0}' more than once")]
    DuplicateEventType(String),
}

impl From<RulesError> for AppError {
    fn from(e: RulesError) -> Self {
        AppError::Configuration(e.to_string())
    }
}

/// Versioned scoring document as stored in the game configuration.
/// A bare `{event_type: points}` map is the legacy form and is read as v1.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoringRulesDocument {
    Versioned(VersionedRules),
    Legacy(HashMap<String, Decimal>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "version", rename_all = "lowercase")]
enum VersionedRules {
    V1 { points: HashMap<String, Decimal> },
}

/// Event-type → point value table for one game, validated at load
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringRules {
    points: HashMap<String, Decimal>,
}

impl ScoringRules {
    pub fn new<I, S>(points: I) -> Result<Self, RulesError>
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: AsRef<str>,
    {
        let mut normalized = HashMap::new();
        for (event_type, value) in points {
            let key = normalize_event_type(event_type.as_ref());
            if key.is_empty() {
                return Err(RulesError::BlankEventType);
            }
            if normalized.insert(key.clone(), value).is_some() {
                return Err(RulesError::DuplicateEventType(key));
            }
        }
        if normalized.is_empty() {
            return Err(RulesError::Empty);
        }
        Ok(Self { points: normalized })
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, RulesError> {
        let document: ScoringRulesDocument = serde_json::from_value(value.clone())
            .map_err(|e| RulesError::Malformed(e.to_string()))?;
        match document {
            ScoringRulesDocument::Versioned(VersionedRules::V1 { points }) => Self::new(points),
            ScoringRulesDocument::Legacy(points) => Self::new(points),
        }
    }

    pub fn points_for(&self, event_type: &str) -> Option<Decimal> {
        self.points.get(&normalize_event_type(event_type)).copied()
    }
}

pub fn normalize_event_type(event_type: &str) -> String {
    event_type.trim().to_lowercase()
}

/// Read-only source of per-game scoring rules
#[async_trait]
pub trait GameConfigStore: Send + Sync {
    async fn get_scoring_rules(&self, game_id: Uuid) -> Result<ScoringRules, AppError>;
}

/// Game configuration held in memory, optionally loaded from a JSON file
/// of the form `{"<game_id>": <scoring document>}`
#[derive(Default)]
pub struct InMemoryGameConfigStore {
    rules: RwLock<HashMap<Uuid, ScoringRules>>,
}

impl InMemoryGameConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rules(&self, game_id: Uuid, rules: ScoringRules) {
        if let Ok(mut guard) = self.rules.write() {
            guard.insert(game_id, rules);
        }
    }

    #[instrument]
    pub fn from_json_file(path: &str) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Configuration(format!("Cannot read {}: {}", path, e)))?;
        let documents: HashMap<Uuid, serde_json::Value> = serde_json::from_str(&raw)
            .map_err(|e| AppError::Configuration(format!("Cannot parse {}: {}", path, e)))?;

        let store = Self::new();
        for (game_id, document) in documents {
            let rules = ScoringRules::from_json(&document)?;
            debug!(game_id = %game_id, event_types = rules.points.len(), "Loaded scoring rules");
            store.set_rules(game_id, rules);
        }
        info!(path = %path, "Scoring rules loaded from file");
        Ok(store)
    }
}

#[async_trait]
impl GameConfigStore for InMemoryGameConfigStore {
    async fn get_scoring_rules(&self, game_id: Uuid) -> Result<ScoringRules, AppError> {
        let guard = self.rules.read().map_err(|_| AppError::Internal)?;
        guard
            .get(&game_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("No scoring rules for game {}", game_id)))
    }
}
