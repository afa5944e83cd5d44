// Library crate for the fantasy live scoring server
// This file exposes the public API for the binary and integration tests

pub mod auth;
pub mod config;
pub mod contest;
pub mod points;
pub mod scoring;
pub mod settlement;
pub mod shared;
pub mod store;
pub mod websockets;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

// Re-export commonly used types for easier access in tests
pub use contest::{LeaderboardEngine, LeaderboardEntry};
pub use points::{FantasyPointCalculator, GameConfigStore, InMemoryGameConfigStore, ScoringRules};
pub use scoring::EventIngestionService;
pub use settlement::{PrizeDistributionEngine, WalletService};
pub use shared::{AppError, AppState};
pub use store::{ContestRepository, InMemoryStore, PostgresStore, ScoringRepository};
pub use websockets::{ConnectionManager, ConnectionManagerHandle, MessageType, WebSocketMessage};

/// Builds the HTTP surface.
///
/// Admin routes require a bearer token with the admin role, query routes any valid
/// token. The viewer socket authenticates itself from `Sec-WebSocket-Protocol`.
pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/matches/:match_id/events", post(scoring::add_event))
        .route("/matches/:match_id/events/bulk", post(scoring::bulk_add_events))
        .route(
            "/events/:event_id",
            put(scoring::edit_event).delete(scoring::delete_event),
        )
        .route("/matches/:match_id/recalculate", post(scoring::recalculate_points))
        .route("/matches/:match_id/start", post(scoring::start_match))
        .route("/matches/:match_id/complete", post(scoring::complete_match))
        .route("/matches/:match_id/resettle", post(scoring::resettle_match))
        .route("/matches/:match_id/dashboard", get(scoring::match_dashboard))
        .route_layer(middleware::from_fn(auth::require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::jwt_auth));

    let queries = Router::new()
        .route("/contests/:contest_id/leaderboard", get(contest::get_leaderboard))
        .route(
            "/contests/:contest_id/teams/:user_team_id/rank",
            get(contest::get_team_rank),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::jwt_auth));

    Router::new()
        .route("/", get(|| async { "fantasy live scoring" }))
        .route("/ws/contests/:contest_id", get(websockets::websocket_handler))
        .nest("/admin", admin)
        .merge(queries)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
