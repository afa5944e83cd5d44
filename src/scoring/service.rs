use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::models::{Match, MatchEvent, MatchStatus, Roster};
use super::types::{
    BulkEventResult, BulkItemError, BulkItemResult, CompletionSummary, DashboardRoster, EventPatch,
    LiveDashboard, NewMatchEvent, RecalculationSummary, StartMatchSummary,
};
use crate::config::ScoringConfig;
use crate::contest::models::ContestStatus;
use crate::contest::LeaderboardEngine;
use crate::points::{normalize_event_type, FantasyPointCalculator, GameConfigStore, RosterEntry};
use crate::settlement::{PrizeDistributionEngine, SettlementSummary};
use crate::shared::AppError;
use crate::store::{ContestRepository, LedgerChange, RosterUpdate, ScoringCommit, ScoringRepository};

/// Event Ingestion Service: the only writer of the match event ledger.
///
/// Every mutation of a match runs under that match's lock: the ledger is loaded, the
/// change applied in memory, affected rosters are recomputed from the whole ledger and
/// everything is committed at once. Leaderboards are refreshed only after the commit.
pub struct EventIngestionService {
    repository: Arc<dyn ScoringRepository>,
    contests: Arc<dyn ContestRepository>,
    game_config: Arc<dyn GameConfigStore>,
    calculator: FantasyPointCalculator,
    leaderboard: Arc<LeaderboardEngine>,
    settlement: Arc<PrizeDistributionEngine>,
    config: ScoringConfig,
    match_mutexes: Arc<RwLock<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl EventIngestionService {
    pub fn new(
        repository: Arc<dyn ScoringRepository>,
        contests: Arc<dyn ContestRepository>,
        game_config: Arc<dyn GameConfigStore>,
        calculator: FantasyPointCalculator,
        leaderboard: Arc<LeaderboardEngine>,
        settlement: Arc<PrizeDistributionEngine>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            repository,
            contests,
            game_config,
            calculator,
            leaderboard,
            settlement,
            config,
            match_mutexes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[instrument(skip(self, input), fields(player_id = %input.player_id, event_type = %input.event_type))]
    pub async fn add_event(
        &self,
        match_id: Uuid,
        input: NewMatchEvent,
        actor_id: Uuid,
    ) -> Result<MatchEvent, AppError> {
        let match_lock = self.match_lock(match_id).await;
        let _guard = match_lock.lock().await;

        let m = self.live_match(match_id).await?;
        let event = self.apply_new_event(&m, input, actor_id).await?;
        info!(event_id = %event.id, points = %event.points, "Match event recorded");

        self.publish(match_id).await;
        Ok(event)
    }

    /// Applies each event independently; one bad item never blocks the rest.
    /// Leaderboards are refreshed once, after the batch, if anything applied.
    #[instrument(skip(self, inputs), fields(batch = inputs.len()))]
    pub async fn bulk_add_events(
        &self,
        match_id: Uuid,
        inputs: Vec<NewMatchEvent>,
        actor_id: Uuid,
    ) -> Result<BulkEventResult, AppError> {
        let match_lock = self.match_lock(match_id).await;
        let _guard = match_lock.lock().await;

        let m = self.live_match(match_id).await?;
        let mut results = Vec::with_capacity(inputs.len());
        let mut applied = 0;

        for (index, input) in inputs.into_iter().enumerate() {
            match self.apply_new_event(&m, input, actor_id).await {
                Ok(event) => {
                    applied += 1;
                    results.push(BulkItemResult {
                        index,
                        event: Some(event),
                        error: None,
                    });
                }
                Err(e) => {
                    debug!(index, error = %e, "Bulk item rejected");
                    results.push(BulkItemResult {
                        index,
                        event: None,
                        error: Some(BulkItemError {
                            code: e.code().to_string(),
                            message: e.to_string(),
                        }),
                    });
                }
            }
        }

        let failed = results.len() - applied;
        info!(applied, failed, "Bulk events processed");
        if applied > 0 {
            self.publish(match_id).await;
        }

        Ok(BulkEventResult {
            applied,
            failed,
            results,
        })
    }

    /// Replaces an event and recomputes every roster holding the old or new player
    #[instrument(skip(self, patch))]
    pub async fn edit_event(
        &self,
        event_id: Uuid,
        patch: EventPatch,
        actor_id: Uuid,
    ) -> Result<MatchEvent, AppError> {
        let match_id = self.find_event(event_id).await?.match_id;
        let match_lock = self.match_lock(match_id).await;
        let _guard = match_lock.lock().await;

        // Re-read under the lock; a concurrent delete may have won
        let existing = self.find_event(event_id).await?;
        let m = self.correctable_match(match_id).await?;

        let player_id = patch.player_id.unwrap_or(existing.player_id);
        if player_id != existing.player_id {
            self.ensure_player_in_match(match_id, player_id).await?;
        }
        let event_type = match patch.event_type {
            Some(t) => validated_event_type(&t)?,
            None => existing.event_type.clone(),
        };
        let rules = self.game_config.get_scoring_rules(m.game_id).await?;
        let points = self.calculator.event_points(&rules, &event_type)?;

        let updated = MatchEvent {
            player_id,
            event_type,
            points,
            round: patch.round.unwrap_or(existing.round),
            game_time_secs: patch.game_time_secs.unwrap_or(existing.game_time_secs),
            metadata: patch.metadata.unwrap_or_else(|| existing.metadata.clone()),
            updated_at: Utc::now(),
            ..existing.clone()
        };

        let ledger: Vec<MatchEvent> = self
            .repository
            .list_events(match_id)
            .await?
            .into_iter()
            .map(|e| if e.id == event_id { updated.clone() } else { e })
            .collect();
        let rosters = self
            .repository
            .rosters_containing(match_id, &[existing.player_id, player_id])
            .await?;

        self.repository
            .commit_scoring(ScoringCommit {
                match_id,
                change: LedgerChange::Update(updated.clone()),
                rosters: self.roster_updates(&rosters, &ledger),
            })
            .await?;
        info!(
            event_id = %event_id,
            actor_id = %actor_id,
            rosters = rosters.len(),
            "Match event edited"
        );

        self.publish(match_id).await;
        Ok(updated)
    }

    /// Removes an event; affected totals end up exactly as if it never existed
    #[instrument(skip(self))]
    pub async fn delete_event(&self, event_id: Uuid, actor_id: Uuid) -> Result<(), AppError> {
        let match_id = self.find_event(event_id).await?.match_id;
        let match_lock = self.match_lock(match_id).await;
        let _guard = match_lock.lock().await;

        let existing = self.find_event(event_id).await?;
        self.correctable_match(match_id).await?;

        let ledger: Vec<MatchEvent> = self
            .repository
            .list_events(match_id)
            .await?
            .into_iter()
            .filter(|e| e.id != event_id)
            .collect();
        let rosters = self
            .repository
            .rosters_containing(match_id, &[existing.player_id])
            .await?;

        self.repository
            .commit_scoring(ScoringCommit {
                match_id,
                change: LedgerChange::Delete(event_id),
                rosters: self.roster_updates(&rosters, &ledger),
            })
            .await?;
        info!(event_id = %event_id, actor_id = %actor_id, "Match event deleted");

        self.publish(match_id).await;
        Ok(())
    }

    /// Replays the whole ledger against the current rules and rebuilds every roster
    #[instrument(skip(self))]
    pub async fn recalculate_all_points(
        &self,
        match_id: Uuid,
        actor_id: Uuid,
    ) -> Result<RecalculationSummary, AppError> {
        let match_lock = self.match_lock(match_id).await;
        let _guard = match_lock.lock().await;

        let m = self.find_match(match_id).await?;
        let rules = self.game_config.get_scoring_rules(m.game_id).await?;
        let ledger = self.repository.list_events(match_id).await?;
        let rescored = self.calculator.rescore(&rules, &ledger)?;
        let events_rescored = ledger
            .iter()
            .zip(&rescored)
            .filter(|(before, after)| before.points != after.points)
            .count();

        let rosters = self.repository.rosters_for_match(match_id).await?;
        let updates = self.roster_updates(&rosters, &rescored);

        self.repository
            .commit_scoring(ScoringCommit {
                match_id,
                change: LedgerChange::Rescore(rescored),
                rosters: updates,
            })
            .await?;
        info!(
            actor_id = %actor_id,
            events = ledger.len(),
            events_rescored,
            rosters = rosters.len(),
            "Match points recalculated"
        );

        self.publish(match_id).await;
        Ok(RecalculationSummary {
            match_id,
            events_replayed: ledger.len(),
            events_rescored,
            rosters_updated: rosters.len(),
        })
    }

    /// `upcoming → live`: locks every roster and opens the match's contests
    #[instrument(skip(self))]
    pub async fn start_match(&self, match_id: Uuid) -> Result<StartMatchSummary, AppError> {
        let match_lock = self.match_lock(match_id).await;
        let _guard = match_lock.lock().await;

        if !self
            .repository
            .transition_match(match_id, MatchStatus::Upcoming, MatchStatus::Live, None)
            .await?
        {
            self.find_match(match_id).await?;
            return Err(AppError::Conflict(format!(
                "Match {} has already started",
                match_id
            )));
        }
        let rosters_locked = self.repository.lock_rosters(match_id).await?;
        let contests_opened = self
            .contests
            .set_contest_status_for_match(match_id, ContestStatus::Upcoming, ContestStatus::Live)
            .await?;
        info!(rosters_locked, contests_opened, "Match is live");

        self.publish(match_id).await;
        Ok(StartMatchSummary {
            match_id,
            rosters_locked,
            contests_opened,
        })
    }

    /// `live → completed` exactly once, then final ranks and prize settlement.
    /// A second call finds the match already completed and returns `Conflict`.
    #[instrument(skip(self, result_summary))]
    pub async fn complete_match(
        &self,
        match_id: Uuid,
        result_summary: Option<String>,
    ) -> Result<CompletionSummary, AppError> {
        let match_lock = self.match_lock(match_id).await;
        let _guard = match_lock.lock().await;

        if !self
            .repository
            .transition_match(match_id, MatchStatus::Live, MatchStatus::Completed, result_summary)
            .await?
        {
            self.find_match(match_id).await?;
            return Err(AppError::Conflict(format!("Match {} is not live", match_id)));
        }
        info!("Match completed; finalizing leaderboards");

        // The transition is committed; from here failures are reported, not returned
        Ok(self.finalize(match_id, false).await)
    }

    /// Explicit re-settlement after post-completion corrections. Payouts already in
    /// the ledger are never repeated.
    #[instrument(skip(self))]
    pub async fn resettle_match(&self, match_id: Uuid) -> Result<CompletionSummary, AppError> {
        let match_lock = self.match_lock(match_id).await;
        let _guard = match_lock.lock().await;

        let m = self.find_match(match_id).await?;
        if m.status != MatchStatus::Completed {
            return Err(AppError::Conflict(format!(
                "Match {} is not completed",
                match_id
            )));
        }

        let summary = self.finalize(match_id, true).await;
        info!(
            total_distributed = %summary.settlement.total_distributed,
            stale_contests = summary.stale_contests.len(),
            "Match re-settled"
        );
        Ok(summary)
    }

    pub async fn dashboard(&self, match_id: Uuid) -> Result<LiveDashboard, AppError> {
        let match_info = self.find_match(match_id).await?;
        let recent_events = self
            .repository
            .recent_events(match_id, self.config.dashboard_recent_events)
            .await?;

        let mut rosters: Vec<DashboardRoster> = self
            .repository
            .rosters_for_match(match_id)
            .await?
            .into_iter()
            .map(|r| DashboardRoster {
                user_team_id: r.team.id,
                user_id: r.team.user_id,
                name: r.team.name,
                total_points: r.team.total_points,
            })
            .collect();
        rosters.sort_by(|a, b| {
            b.total_points
                .cmp(&a.total_points)
                .then_with(|| a.user_team_id.cmp(&b.user_team_id))
        });

        Ok(LiveDashboard {
            match_info,
            recent_events,
            rosters,
        })
    }

    /// Validates and commits one new event. Caller holds the match lock.
    async fn apply_new_event(
        &self,
        m: &Match,
        input: NewMatchEvent,
        actor_id: Uuid,
    ) -> Result<MatchEvent, AppError> {
        let event_type = validated_event_type(&input.event_type)?;
        self.ensure_player_in_match(m.id, input.player_id).await?;

        let rules = self.game_config.get_scoring_rules(m.game_id).await?;
        let points = self.calculator.event_points(&rules, &event_type)?;

        let now = Utc::now();
        let event = MatchEvent {
            id: Uuid::new_v4(),
            match_id: m.id,
            player_id: input.player_id,
            event_type,
            points,
            round: input.round,
            game_time_secs: input.game_time_secs,
            metadata: if input.metadata.is_null() {
                serde_json::json!({})
            } else {
                input.metadata
            },
            created_by: actor_id,
            created_at: now,
            updated_at: now,
        };

        let mut ledger = self.repository.list_events(m.id).await?;
        ledger.push(event.clone());
        let rosters = self
            .repository
            .rosters_containing(m.id, &[event.player_id])
            .await?;

        self.repository
            .commit_scoring(ScoringCommit {
                match_id: m.id,
                change: LedgerChange::Insert(event.clone()),
                rosters: self.roster_updates(&rosters, &ledger),
            })
            .await?;
        Ok(event)
    }

    /// Full recomputation of each roster from the ledger, never a differential patch
    fn roster_updates(&self, rosters: &[Roster], ledger: &[MatchEvent]) -> Vec<RosterUpdate> {
        let points = self.calculator.points_by_player(ledger);
        rosters
            .iter()
            .map(|roster| {
                let player_points: Vec<_> = roster
                    .players
                    .iter()
                    .map(|p| (p.player_id, points.get(&p.player_id).copied().unwrap_or_default()))
                    .collect();
                let entries: Vec<RosterEntry> = roster
                    .players
                    .iter()
                    .zip(&player_points)
                    .map(|(p, (_, pts))| RosterEntry {
                        points: *pts,
                        is_captain: p.is_captain,
                        is_vice_captain: p.is_vice_captain,
                    })
                    .collect();
                RosterUpdate {
                    user_team_id: roster.team.id,
                    total_points: self.calculator.team_total(&entries),
                    player_points,
                }
            })
            .collect()
    }

    /// Final ranks, then settlement of every contest whose ranks are current
    async fn finalize(&self, match_id: Uuid, force: bool) -> CompletionSummary {
        let mut summary = CompletionSummary {
            match_id,
            leaderboards_finalized: 0,
            stale_contests: Vec::new(),
            error: None,
            settlement: SettlementSummary::new(match_id),
        };

        let refresh = match self.leaderboard.refresh_match(match_id).await {
            Ok(refresh) => refresh,
            Err(e) => {
                error!(error = %e, "Final leaderboard refresh failed; settlement deferred");
                summary.error = Some(e.to_string());
                return summary;
            }
        };
        summary.leaderboards_finalized = refresh.computed.len();
        summary.stale_contests = refresh.failed;

        match self
            .settlement
            .settle_match(match_id, force, &summary.stale_contests)
            .await
        {
            Ok(settlement) => summary.settlement = settlement,
            Err(e) => {
                error!(error = %e, "Settlement failed");
                summary.error = Some(e.to_string());
            }
        }
        summary
    }

    /// Fan-out happens after the commit; a failure here never undoes the write
    async fn publish(&self, match_id: Uuid) {
        if let Err(e) = self.leaderboard.refresh_match(match_id).await {
            warn!(match_id = %match_id, error = %e, "Leaderboard refresh failed after commit");
        }
    }

    async fn find_match(&self, match_id: Uuid) -> Result<Match, AppError> {
        self.repository
            .get_match(match_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Match {} not found", match_id)))
    }

    async fn live_match(&self, match_id: Uuid) -> Result<Match, AppError> {
        let m = self.find_match(match_id).await?;
        if !m.is_live() {
            return Err(AppError::MatchNotLive(match_id));
        }
        Ok(m)
    }

    async fn correctable_match(&self, match_id: Uuid) -> Result<Match, AppError> {
        let m = self.find_match(match_id).await?;
        if !m.accepts_corrections() {
            return Err(AppError::MatchNotLive(match_id));
        }
        Ok(m)
    }

    async fn find_event(&self, event_id: Uuid) -> Result<MatchEvent, AppError> {
        self.repository
            .get_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))
    }

    async fn ensure_player_in_match(&self, match_id: Uuid, player_id: Uuid) -> Result<(), AppError> {
        if !self.repository.is_player_in_match(match_id, player_id).await? {
            return Err(AppError::PlayerNotInMatch {
                match_id,
                player_id,
            });
        }
        Ok(())
    }

    async fn match_lock(&self, match_id: Uuid) -> Arc<AsyncMutex<()>> {
        {
            let guard = self.match_mutexes.read().await;
            if let Some(lock) = guard.get(&match_id) {
                return lock.clone();
            }
        }

        let mut guard = self.match_mutexes.write().await;
        guard
            .entry(match_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

fn validated_event_type(raw: &str) -> Result<String, AppError> {
    let event_type = normalize_event_type(raw);
    if event_type.is_empty() {
        return Err(AppError::Validation("event_type must not be empty".to_string()));
    }
    Ok(event_type)
}
