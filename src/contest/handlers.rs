use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::types::{LeaderboardResponse, TeamRankResponse};
use crate::shared::{AppError, AppState};

/// HTTP handler for a contest's current leaderboard
///
/// GET /contests/:contest_id/leaderboard
/// Returns every participant ranked by total points
#[instrument(name = "get_leaderboard", skip(state))]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Path(contest_id): Path<Uuid>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let entries = state.leaderboard.leaderboard(contest_id).await?;
    debug!(contest_id = %contest_id, participants = entries.len(), "Leaderboard served");

    Ok(Json(LeaderboardResponse {
        contest_id,
        entries,
    }))
}

/// HTTP handler for one team's position in a contest
///
/// GET /contests/:contest_id/teams/:user_team_id/rank
#[instrument(name = "get_team_rank", skip(state))]
pub async fn get_team_rank(
    State(state): State<AppState>,
    Path((contest_id, user_team_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TeamRankResponse>, AppError> {
    let entries = state.leaderboard.leaderboard(contest_id).await?;
    let participants = entries.len();

    let entry = entries
        .into_iter()
        .find(|e| e.user_team_id == user_team_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Team {} is not entered in contest {}",
                user_team_id, contest_id
            ))
        })?;

    Ok(Json(TeamRankResponse {
        contest_id,
        user_team_id,
        rank: entry.rank,
        total_points: entry.total_points,
        participants,
    }))
}
