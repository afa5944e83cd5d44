use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::TokenConfig;
use crate::config::ConnectionConfig;
use crate::contest::LeaderboardEngine;
use crate::scoring::EventIngestionService;
use crate::store::ContestRepository;
use crate::websockets::ConnectionManager;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub token_config: TokenConfig,
    pub scoring_service: Arc<EventIngestionService>,
    pub leaderboard: Arc<LeaderboardEngine>,
    pub contest_repository: Arc<dyn ContestRepository>,
    pub connection_manager: Arc<dyn ConnectionManager>,
    pub connection_config: ConnectionConfig,
}

impl AppState {
    pub fn new(
        token_config: TokenConfig,
        scoring_service: Arc<EventIngestionService>,
        leaderboard: Arc<LeaderboardEngine>,
        contest_repository: Arc<dyn ContestRepository>,
        connection_manager: Arc<dyn ConnectionManager>,
        connection_config: ConnectionConfig,
    ) -> Self {
        Self {
            token_config,
            scoring_service,
            leaderboard,
            contest_repository,
            connection_manager,
            connection_config,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Match {0} is not live")]
    MatchNotLive(Uuid),

    #[error("Player {player_id} is not declared for match {match_id}")]
    PlayerNotInMatch { match_id: Uuid, player_id: Uuid },

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    /// Stable machine-readable code returned alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            AppError::JwtError(_) => "INVALID_TOKEN",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::MatchNotLive(_) => "MATCH_NOT_LIVE",
            AppError::PlayerNotInMatch { .. } => "PLAYER_NOT_IN_MATCH",
            AppError::UnknownEventType(_) => "UNKNOWN_EVENT_TYPE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::JwtError(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_)
            | AppError::PlayerNotInMatch { .. }
            | AppError::UnknownEventType(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::MatchNotLive(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Configuration(_) | AppError::DatabaseError(_) | AppError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::DatabaseError(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::DatabaseError(msg) => format!("Database error: {}", msg),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use crate::auth::{ActorClaims, Role};
    use crate::config::{ConnectionConfig, ScoringConfig, SettlementConfig};
    use crate::points::{FantasyPointCalculator, InMemoryGameConfigStore};
    use crate::settlement::{InMemoryWalletService, PrizeDistributionEngine, WalletService};
    use crate::store::InMemoryStore;
    use crate::websockets::ConnectionManagerHandle;

    /// Everything a handler test needs: the state plus the concrete in-memory backends
    pub struct TestApp {
        pub state: AppState,
        pub store: Arc<InMemoryStore>,
        pub rules: Arc<InMemoryGameConfigStore>,
        pub wallet: Arc<InMemoryWalletService>,
        pub connections: ConnectionManagerHandle,
    }

    impl TestApp {
        pub fn admin_token(&self) -> String {
            self.token_for(Uuid::new_v4(), Role::Admin)
        }

        pub fn viewer_token(&self) -> String {
            self.token_for(Uuid::new_v4(), Role::User)
        }

        pub fn token_for(&self, user_id: Uuid, role: Role) -> String {
            let claims = ActorClaims::new(user_id, role, 1);
            self.state.token_config.create_token(&claims).unwrap()
        }
    }

    /// Builder for creating AppState with overrides for testing
    pub struct AppStateBuilder {
        store: Option<Arc<InMemoryStore>>,
        rules: Option<Arc<InMemoryGameConfigStore>>,
    }

    impl AppStateBuilder {
        pub fn new() -> Self {
            Self {
                store: None,
                rules: None,
            }
        }

        pub fn with_store(mut self, store: Arc<InMemoryStore>) -> Self {
            self.store = Some(store);
            self
        }

        pub fn with_rules(mut self, rules: Arc<InMemoryGameConfigStore>) -> Self {
            self.rules = Some(rules);
            self
        }

        pub fn build(self) -> TestApp {
            let store = self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new()));
            let rules = self
                .rules
                .unwrap_or_else(|| Arc::new(InMemoryGameConfigStore::new()));
            let wallet = Arc::new(InMemoryWalletService::new());

            let connections = ConnectionManagerHandle::spawn(ConnectionConfig::default());
            let connection_manager: Arc<dyn ConnectionManager> = Arc::new(connections.clone());

            let leaderboard = Arc::new(LeaderboardEngine::new(
                store.clone(),
                connection_manager.clone(),
            ));
            let wallet_service: Arc<dyn WalletService> = wallet.clone();
            let settlement = Arc::new(PrizeDistributionEngine::new(
                store.clone(),
                wallet_service,
                connection_manager.clone(),
                SettlementConfig::default(),
            ));
            let scoring_config = ScoringConfig::default();
            let scoring_service = Arc::new(EventIngestionService::new(
                store.clone(),
                store.clone(),
                rules.clone(),
                FantasyPointCalculator::from_config(&scoring_config),
                leaderboard.clone(),
                settlement,
                scoring_config,
            ));

            let state = AppState::new(
                TokenConfig::with_secret("test-secret"),
                scoring_service,
                leaderboard,
                store.clone(),
                connection_manager,
                ConnectionConfig::default(),
            );

            TestApp {
                state,
                store,
                rules,
                wallet,
                connections,
            }
        }
    }

    impl Default for AppStateBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(AppError::MatchNotLive(Uuid::nil()).code(), "MATCH_NOT_LIVE");
        assert_eq!(
            AppError::PlayerNotInMatch {
                match_id: Uuid::nil(),
                player_id: Uuid::nil()
            }
            .code(),
            "PLAYER_NOT_IN_MATCH"
        );
        assert_eq!(
            AppError::MatchNotLive(Uuid::nil()).status(),
            StatusCode::CONFLICT
        );
    }
}
