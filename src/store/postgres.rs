use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    ContestRepository, ContestSettlement, LedgerChange, RankAssignment, ScoringCommit,
    ScoringRepository,
};
use crate::contest::models::{Contest, ContestStatus, Standing};
use crate::points::{GameConfigStore, ScoringRules};
use crate::scoring::models::{Match, MatchEvent, MatchStatus, Roster, TeamPlayer, UserTeam};
use crate::shared::AppError;

const EVENT_COLUMNS: &str = "id, match_id, player_id, event_type, points, round, game_time_secs, metadata, created_by, created_at, updated_at";
const CONTEST_COLUMNS: &str = "id, match_id, name, entry_fee, total_prize_pool, prize_distribution, max_participants, allow_multi_entry, status";

/// PostgreSQL implementation of the scoring and contest repositories
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            warn!(error = %e, "Failed to open transaction");
            AppError::DatabaseError(e.to_string())
        })
    }

    async fn rosters_for_teams(&self, teams: Vec<UserTeam>) -> Result<Vec<Roster>, AppError> {
        let ids: Vec<Uuid> = teams.iter().map(|t| t.id).collect();
        let players: Vec<TeamPlayer> = sqlx::query_as(
            "SELECT user_team_id, player_id, is_captain, is_vice_captain, points_earned FROM team_players WHERE user_team_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("fetch roster players", e))?;

        Ok(teams
            .into_iter()
            .map(|team| Roster {
                players: players
                    .iter()
                    .filter(|p| p.user_team_id == team.id)
                    .cloned()
                    .collect(),
                team,
            })
            .collect())
    }
}

fn db_error(action: &str, e: sqlx::Error) -> AppError {
    warn!(error = %e, action, "Database operation failed");
    AppError::DatabaseError(e.to_string())
}

fn parse_status<T: FromStr>(raw: &str) -> Result<T, AppError> {
    T::from_str(raw).map_err(|_| {
        warn!(status = %raw, "Unknown status stored in database");
        AppError::DatabaseError(format!("Unknown status '{}'", raw))
    })
}

fn match_from_row(row: &PgRow) -> Result<Match, AppError> {
    let status: String = row.get("status");
    Ok(Match {
        id: row.get("id"),
        game_id: row.get("game_id"),
        name: row.get("name"),
        scheduled_at: row.get("scheduled_at"),
        lock_at: row.get("lock_at"),
        status: parse_status(&status)?,
        result_summary: row.get("result_summary"),
    })
}

fn event_from_row(row: &PgRow) -> MatchEvent {
    MatchEvent {
        id: row.get("id"),
        match_id: row.get("match_id"),
        player_id: row.get("player_id"),
        event_type: row.get("event_type"),
        points: row.get("points"),
        round: row.get("round"),
        game_time_secs: row.get("game_time_secs"),
        metadata: row.get("metadata"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn contest_from_row(row: &PgRow) -> Result<Contest, AppError> {
    let status: String = row.get("status");
    Ok(Contest {
        id: row.get("id"),
        match_id: row.get("match_id"),
        name: row.get("name"),
        entry_fee: row.get("entry_fee"),
        total_prize_pool: row.get("total_prize_pool"),
        prize_distribution: row.get("prize_distribution"),
        max_participants: row.get("max_participants"),
        allow_multi_entry: row.get("allow_multi_entry"),
        status: parse_status(&status)?,
    })
}

#[async_trait]
impl ScoringRepository for PostgresStore {
    #[instrument(skip(self))]
    async fn get_match(&self, match_id: Uuid) -> Result<Option<Match>, AppError> {
        let row = sqlx::query(
            "SELECT id, game_id, name, scheduled_at, lock_at, status, result_summary FROM matches WHERE id = $1",
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("fetch match", e))?;

        row.as_ref().map(match_from_row).transpose()
    }

    #[instrument(skip(self, result_summary))]
    async fn transition_match(
        &self,
        match_id: Uuid,
        from: MatchStatus,
        to: MatchStatus,
        result_summary: Option<String>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE matches SET status = $3, result_summary = COALESCE($4, result_summary) WHERE id = $1 AND status = $2",
        )
        .bind(match_id)
        .bind(from.as_ref())
        .bind(to.as_ref())
        .bind(result_summary)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("transition match", e))?;

        if result.rows_affected() == 0 {
            if self.get_match(match_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Match {} not found", match_id)));
            }
            debug!(match_id = %match_id, from = %from, "Match not in expected status");
            return Ok(false);
        }
        debug!(match_id = %match_id, to = %to, "Match status changed");
        Ok(true)
    }

    async fn lock_rosters(&self, match_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE user_teams SET is_locked = TRUE WHERE match_id = $1 AND is_locked = FALSE",
        )
        .bind(match_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("lock rosters", e))?;
        Ok(result.rows_affected())
    }

    async fn is_player_in_match(&self, match_id: Uuid, player_id: Uuid) -> Result<bool, AppError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM match_players WHERE match_id = $1 AND player_id = $2) AS present",
        )
        .bind(match_id)
        .bind(player_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("check match player", e))?;
        Ok(row.get("present"))
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<MatchEvent>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM match_events WHERE id = $1",
            EVENT_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("fetch event", e))?;
        Ok(row.as_ref().map(event_from_row))
    }

    async fn list_events(&self, match_id: Uuid) -> Result<Vec<MatchEvent>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM match_events WHERE match_id = $1 ORDER BY seq",
            EVENT_COLUMNS
        ))
        .bind(match_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list events", e))?;
        Ok(rows.iter().map(event_from_row).collect())
    }

    async fn recent_events(&self, match_id: Uuid, limit: i64) -> Result<Vec<MatchEvent>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM match_events WHERE match_id = $1 ORDER BY seq DESC LIMIT $2",
            EVENT_COLUMNS
        ))
        .bind(match_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list recent events", e))?;
        Ok(rows.iter().map(event_from_row).collect())
    }

    async fn rosters_for_match(&self, match_id: Uuid) -> Result<Vec<Roster>, AppError> {
        let teams: Vec<UserTeam> = sqlx::query_as(
            "SELECT id, user_id, match_id, name, total_points, final_rank, is_locked FROM user_teams WHERE match_id = $1 ORDER BY id",
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("fetch rosters", e))?;
        self.rosters_for_teams(teams).await
    }

    async fn rosters_containing(
        &self,
        match_id: Uuid,
        player_ids: &[Uuid],
    ) -> Result<Vec<Roster>, AppError> {
        let teams: Vec<UserTeam> = sqlx::query_as(
            "SELECT ut.id, ut.user_id, ut.match_id, ut.name, ut.total_points, ut.final_rank, ut.is_locked
             FROM user_teams ut
             WHERE ut.match_id = $1
               AND EXISTS (SELECT 1 FROM team_players tp WHERE tp.user_team_id = ut.id AND tp.player_id = ANY($2))
             ORDER BY ut.id",
        )
        .bind(match_id)
        .bind(player_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("fetch affected rosters", e))?;
        self.rosters_for_teams(teams).await
    }

    #[instrument(skip(self, commit), fields(match_id = %commit.match_id))]
    async fn commit_scoring(&self, commit: ScoringCommit) -> Result<(), AppError> {
        let mut tx = self.begin().await?;

        match &commit.change {
            LedgerChange::Insert(event) => {
                sqlx::query(&format!(
                    "INSERT INTO match_events ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                    EVENT_COLUMNS
                ))
                .bind(event.id)
                .bind(event.match_id)
                .bind(event.player_id)
                .bind(&event.event_type)
                .bind(event.points)
                .bind(event.round)
                .bind(event.game_time_secs)
                .bind(&event.metadata)
                .bind(event.created_by)
                .bind(event.created_at)
                .bind(event.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("insert event", e))?;
            }
            LedgerChange::Update(event) => {
                let result = sqlx::query(
                    "UPDATE match_events SET player_id = $2, event_type = $3, points = $4, round = $5, game_time_secs = $6, metadata = $7, updated_at = $8 WHERE id = $1",
                )
                .bind(event.id)
                .bind(event.player_id)
                .bind(&event.event_type)
                .bind(event.points)
                .bind(event.round)
                .bind(event.game_time_secs)
                .bind(&event.metadata)
                .bind(event.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("update event", e))?;
                if result.rows_affected() == 0 {
                    return Err(AppError::NotFound(format!("Event {} not found", event.id)));
                }
            }
            LedgerChange::Delete(event_id) => {
                let result = sqlx::query("DELETE FROM match_events WHERE id = $1")
                    .bind(event_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_error("delete event", e))?;
                if result.rows_affected() == 0 {
                    return Err(AppError::NotFound(format!("Event {} not found", event_id)));
                }
            }
            LedgerChange::Rescore(events) => {
                for event in events {
                    sqlx::query("UPDATE match_events SET points = $2 WHERE id = $1")
                        .bind(event.id)
                        .bind(event.points)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| db_error("rescore event", e))?;
                }
            }
        }

        for update in &commit.rosters {
            for (player_id, points) in &update.player_points {
                sqlx::query(
                    "UPDATE team_players SET points_earned = $3 WHERE user_team_id = $1 AND player_id = $2",
                )
                .bind(update.user_team_id)
                .bind(player_id)
                .bind(points)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("update player points", e))?;
            }
            sqlx::query("UPDATE user_teams SET total_points = $2 WHERE id = $1")
                .bind(update.user_team_id)
                .bind(update.total_points)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("update roster total", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit scoring", e))?;
        debug!(rosters = commit.rosters.len(), "Scoring commit applied");
        Ok(())
    }
}

#[async_trait]
impl ContestRepository for PostgresStore {
    async fn get_contest(&self, contest_id: Uuid) -> Result<Option<Contest>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM contests WHERE id = $1",
            CONTEST_COLUMNS
        ))
        .bind(contest_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("fetch contest", e))?;
        row.as_ref().map(contest_from_row).transpose()
    }

    async fn contests_for_match(&self, match_id: Uuid) -> Result<Vec<Contest>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM contests WHERE match_id = $1 ORDER BY id",
            CONTEST_COLUMNS
        ))
        .bind(match_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list contests", e))?;
        rows.iter().map(contest_from_row).collect()
    }

    async fn set_contest_status_for_match(
        &self,
        match_id: Uuid,
        from: ContestStatus,
        to: ContestStatus,
    ) -> Result<u64, AppError> {
        let result =
            sqlx::query("UPDATE contests SET status = $3 WHERE match_id = $1 AND status = $2")
                .bind(match_id)
                .bind(from.as_ref())
                .bind(to.as_ref())
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("update contest status", e))?;
        Ok(result.rows_affected())
    }

    async fn standings(&self, contest_id: Uuid) -> Result<Vec<Standing>, AppError> {
        sqlx::query_as(
            "SELECT cp.id AS participant_id, cp.user_team_id, cp.user_id, ut.name AS team_name, ut.total_points, cp.rank, cp.prize_won
             FROM contest_participants cp
             JOIN user_teams ut ON ut.id = cp.user_team_id
             WHERE cp.contest_id = $1
             ORDER BY cp.user_team_id",
        )
        .bind(contest_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("fetch standings", e))
    }

    #[instrument(skip(self, ranks), fields(count = ranks.len()))]
    async fn save_ranks(&self, contest_id: Uuid, ranks: &[RankAssignment]) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        for assignment in ranks {
            sqlx::query("UPDATE contest_participants SET rank = $3 WHERE id = $1 AND contest_id = $2")
                .bind(assignment.participant_id)
                .bind(contest_id)
                .bind(assignment.rank)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("save participant rank", e))?;
            sqlx::query("UPDATE user_teams SET final_rank = $2 WHERE id = $1")
                .bind(assignment.user_team_id)
                .bind(assignment.rank)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("save final rank", e))?;
        }
        tx.commit().await.map_err(|e| db_error("commit ranks", e))
    }

    async fn has_payout(&self, reference: &str) -> Result<bool, AppError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM prize_ledger WHERE reference = $1) AS present",
        )
        .bind(reference)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("check payout", e))?;
        Ok(row.get("present"))
    }

    #[instrument(skip(self, settlement), fields(contest_id = %settlement.contest_id))]
    async fn finalize_settlement(&self, settlement: ContestSettlement) -> Result<(), AppError> {
        let mut tx = self.begin().await?;

        for payout in &settlement.payouts {
            sqlx::query(
                "INSERT INTO prize_ledger (reference, match_id, contest_id, participant_id, user_team_id, user_id, rank, amount, wallet_entry_id, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(&payout.reference)
            .bind(payout.match_id)
            .bind(payout.contest_id)
            .bind(payout.participant_id)
            .bind(payout.user_team_id)
            .bind(payout.user_id)
            .bind(payout.rank)
            .bind(payout.amount)
            .bind(&payout.wallet_entry_id)
            .bind(payout.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("record payout", e))?;

            sqlx::query(
                "UPDATE contest_participants SET prize_won = COALESCE(prize_won, 0) + $2 WHERE id = $1",
            )
            .bind(payout.participant_id)
            .bind(payout.amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("update prize won", e))?;
        }

        if settlement.close_contest {
            sqlx::query("UPDATE contests SET status = $2 WHERE id = $1")
                .bind(settlement.contest_id)
                .bind(ContestStatus::Completed.as_ref())
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("close contest", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit settlement", e))?;
        debug!(payouts = settlement.payouts.len(), "Settlement recorded");
        Ok(())
    }
}

#[async_trait]
impl GameConfigStore for PostgresStore {
    async fn get_scoring_rules(&self, game_id: Uuid) -> Result<ScoringRules, AppError> {
        let row = sqlx::query("SELECT scoring_rules FROM games WHERE id = $1")
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("fetch scoring rules", e))?
            .ok_or_else(|| AppError::NotFound(format!("Game {} not found", game_id)))?;

        let document: serde_json::Value = row.get("scoring_rules");
        Ok(ScoringRules::from_json(&document)?)
    }
}
