use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::models::{ContestStatus, Standing};
use super::types::{LeaderboardComputation, LeaderboardEntry, MatchRefresh};
use crate::shared::AppError;
use crate::store::{ContestRepository, RankAssignment};
use crate::websockets::{ConnectionManager, WebSocketMessage};

/// Standard competition ranking: points descending, equal totals share a rank and
/// the next distinct total takes its position (100, 100, 90 → 1, 1, 3). Tied rows
/// are listed by user-team id so the output order is reproducible.
pub fn rank_standings(standings: &[Standing]) -> Vec<(Standing, i32)> {
    let mut sorted = standings.to_vec();
    sorted.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.user_team_id.cmp(&b.user_team_id))
    });

    let mut ranked = Vec::with_capacity(sorted.len());
    let mut current_rank = 0;
    let mut previous_points: Option<Decimal> = None;
    for (position, standing) in sorted.into_iter().enumerate() {
        if previous_points != Some(standing.total_points) {
            current_rank = position as i32 + 1;
            previous_points = Some(standing.total_points);
        }
        ranked.push((standing, current_rank));
    }
    ranked
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SnapshotRow {
    rank: i32,
    total_points: Decimal,
}

/// Recomputes contest ranks from roster totals and publishes what changed.
///
/// The engine keeps the last computed ranking per contest in memory and diffs each
/// new computation against it, so viewers only receive rows whose rank or score moved.
pub struct LeaderboardEngine {
    contests: Arc<dyn ContestRepository>,
    connection_manager: Arc<dyn ConnectionManager>,
    snapshots: RwLock<HashMap<Uuid, HashMap<Uuid, SnapshotRow>>>,
    contest_mutexes: Arc<RwLock<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl LeaderboardEngine {
    pub fn new(
        contests: Arc<dyn ContestRepository>,
        connection_manager: Arc<dyn ConnectionManager>,
    ) -> Self {
        Self {
            contests,
            connection_manager,
            snapshots: RwLock::new(HashMap::new()),
            contest_mutexes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Ranks a contest, persists the ranks and returns the full table plus deltas
    #[instrument(skip(self))]
    pub async fn compute_ranks(&self, contest_id: Uuid) -> Result<LeaderboardComputation, AppError> {
        let contest_lock = self.contest_lock(contest_id).await;
        let _guard = contest_lock.lock().await;

        if self.contests.get_contest(contest_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Contest {} not found", contest_id)));
        }

        let standings = self.contests.standings(contest_id).await?;
        let ranked = rank_standings(&standings);

        let assignments: Vec<RankAssignment> = ranked
            .iter()
            .map(|(s, rank)| RankAssignment {
                participant_id: s.participant_id,
                user_team_id: s.user_team_id,
                rank: *rank,
            })
            .collect();
        self.contests.save_ranks(contest_id, &assignments).await?;

        let mut snapshots = self.snapshots.write().await;
        let previous = snapshots.get(&contest_id);

        let mut entries = Vec::with_capacity(ranked.len());
        let mut deltas = Vec::new();
        for (standing, rank) in ranked {
            let before = previous.and_then(|p| p.get(&standing.user_team_id)).copied();
            let entry = LeaderboardEntry {
                user_team_id: standing.user_team_id,
                user_id: standing.user_id,
                team_name: standing.team_name,
                rank,
                previous_rank: before.map(|b| b.rank).or(standing.rank),
                total_points: standing.total_points,
            };
            let changed = match before {
                Some(b) => b.rank != rank || b.total_points != entry.total_points,
                None => true,
            };
            if changed {
                deltas.push(entry.clone());
            }
            entries.push(entry);
        }

        snapshots.insert(
            contest_id,
            entries
                .iter()
                .map(|e| {
                    (
                        e.user_team_id,
                        SnapshotRow {
                            rank: e.rank,
                            total_points: e.total_points,
                        },
                    )
                })
                .collect(),
        );

        debug!(
            contest_id = %contest_id,
            participants = entries.len(),
            changed = deltas.len(),
            "Leaderboard computed"
        );
        Ok(LeaderboardComputation {
            contest_id,
            entries,
            deltas,
        })
    }

    /// Recomputes every contest of a match and fans out non-empty deltas.
    /// A failure in one contest is logged and does not stop the others.
    #[instrument(skip(self))]
    pub async fn refresh_match(&self, match_id: Uuid) -> Result<MatchRefresh, AppError> {
        let contests = self.contests.contests_for_match(match_id).await?;
        let mut refresh = MatchRefresh {
            computed: Vec::with_capacity(contests.len()),
            failed: Vec::new(),
        };

        for contest in contests {
            if contest.status == ContestStatus::Cancelled {
                continue;
            }
            match self.compute_ranks(contest.id).await {
                Ok(computation) => {
                    if !computation.deltas.is_empty() {
                        self.connection_manager
                            .broadcast(
                                contest.id,
                                WebSocketMessage::leaderboard_update(
                                    contest.id,
                                    computation.deltas.clone(),
                                ),
                            )
                            .await;
                    }
                    refresh.computed.push(computation);
                }
                Err(e) => {
                    warn!(contest_id = %contest.id, error = %e, "Leaderboard computation failed");
                    refresh.failed.push(contest.id);
                }
            }
        }
        Ok(refresh)
    }

    /// Current ranking from live totals, without persisting or publishing anything
    pub async fn leaderboard(&self, contest_id: Uuid) -> Result<Vec<LeaderboardEntry>, AppError> {
        if self.contests.get_contest(contest_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Contest {} not found", contest_id)));
        }
        let standings = self.contests.standings(contest_id).await?;
        Ok(rank_standings(&standings)
            .into_iter()
            .map(|(s, rank)| LeaderboardEntry {
                user_team_id: s.user_team_id,
                user_id: s.user_id,
                team_name: s.team_name,
                rank,
                previous_rank: s.rank,
                total_points: s.total_points,
            })
            .collect())
    }

    async fn contest_lock(&self, contest_id: Uuid) -> Arc<AsyncMutex<()>> {
        {
            let guard = self.contest_mutexes.read().await;
            if let Some(lock) = guard.get(&contest_id) {
                return lock.clone();
            }
        }

        let mut guard = self.contest_mutexes.write().await;
        guard
            .entry(contest_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
