use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::models::MatchEvent;
use super::types::{
    BulkEventResult, BulkEventsRequest, CompleteMatchRequest, CompletionSummary, EventPatch,
    LiveDashboard, NewMatchEvent, RecalculationSummary, StartMatchSummary,
};
use crate::auth::ActorClaims;
use crate::shared::{AppError, AppState};

/// HTTP handler for recording a single match event
///
/// POST /admin/matches/:match_id/events
/// Returns the stored event with its derived point value
#[instrument(name = "add_event", skip(state, claims, request))]
pub async fn add_event(
    State(state): State<AppState>,
    Extension(claims): Extension<ActorClaims>,
    Path(match_id): Path<Uuid>,
    Json(request): Json<NewMatchEvent>,
) -> Result<(StatusCode, Json<MatchEvent>), AppError> {
    let actor_id = claims.actor_id()?;
    info!(match_id = %match_id, event_type = %request.event_type, "Recording match event");

    let event = state
        .scoring_service
        .add_event(match_id, request, actor_id)
        .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// HTTP handler for recording a batch of events
///
/// POST /admin/matches/:match_id/events/bulk
/// Items are applied independently; the body reports each item's outcome
#[instrument(name = "bulk_add_events", skip(state, claims, request))]
pub async fn bulk_add_events(
    State(state): State<AppState>,
    Extension(claims): Extension<ActorClaims>,
    Path(match_id): Path<Uuid>,
    Json(request): Json<BulkEventsRequest>,
) -> Result<Json<BulkEventResult>, AppError> {
    let actor_id = claims.actor_id()?;
    info!(match_id = %match_id, batch = request.events.len(), "Recording event batch");

    let result = state
        .scoring_service
        .bulk_add_events(match_id, request.events, actor_id)
        .await?;

    Ok(Json(result))
}

/// PUT /admin/events/:event_id
#[instrument(name = "edit_event", skip(state, claims, patch))]
pub async fn edit_event(
    State(state): State<AppState>,
    Extension(claims): Extension<ActorClaims>,
    Path(event_id): Path<Uuid>,
    Json(patch): Json<EventPatch>,
) -> Result<Json<MatchEvent>, AppError> {
    let actor_id = claims.actor_id()?;
    let event = state
        .scoring_service
        .edit_event(event_id, patch, actor_id)
        .await?;
    Ok(Json(event))
}

/// DELETE /admin/events/:event_id
#[instrument(name = "delete_event", skip(state, claims))]
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(claims): Extension<ActorClaims>,
    Path(event_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let actor_id = claims.actor_id()?;
    state
        .scoring_service
        .delete_event(event_id, actor_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// HTTP handler for replaying a match's ledger against the current rules
///
/// POST /admin/matches/:match_id/recalculate
#[instrument(name = "recalculate_points", skip(state, claims))]
pub async fn recalculate_points(
    State(state): State<AppState>,
    Extension(claims): Extension<ActorClaims>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<RecalculationSummary>, AppError> {
    let actor_id = claims.actor_id()?;
    info!(match_id = %match_id, "Recalculating match points");

    let summary = state
        .scoring_service
        .recalculate_all_points(match_id, actor_id)
        .await?;

    Ok(Json(summary))
}

/// POST /admin/matches/:match_id/start
#[instrument(name = "start_match", skip(state))]
pub async fn start_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<StartMatchSummary>, AppError> {
    let summary = state.scoring_service.start_match(match_id).await?;
    Ok(Json(summary))
}

/// HTTP handler for completing a match
///
/// POST /admin/matches/:match_id/complete
/// Finalizes ranks and pays prizes; a repeated call is rejected with 409
#[instrument(name = "complete_match", skip(state, request))]
pub async fn complete_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    request: Option<Json<CompleteMatchRequest>>,
) -> Result<Json<CompletionSummary>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    info!(match_id = %match_id, "Completing match");

    let summary = state
        .scoring_service
        .complete_match(match_id, request.result_summary)
        .await?;

    info!(
        match_id = %match_id,
        winners = summary.settlement.winners_rewarded,
        total_distributed = %summary.settlement.total_distributed,
        "Match completed and settled"
    );

    Ok(Json(summary))
}

/// POST /admin/matches/:match_id/resettle
#[instrument(name = "resettle_match", skip(state))]
pub async fn resettle_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<CompletionSummary>, AppError> {
    let summary = state.scoring_service.resettle_match(match_id).await?;
    Ok(Json(summary))
}

/// GET /admin/matches/:match_id/dashboard
#[instrument(name = "match_dashboard", skip(state))]
pub async fn match_dashboard(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<LiveDashboard>, AppError> {
    let dashboard = state.scoring_service.dashboard(match_id).await?;
    Ok(Json(dashboard))
}
