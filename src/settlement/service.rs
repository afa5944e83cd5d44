use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::Display;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::schedule::PrizeSchedule;
use super::wallet::{CreditReason, WalletService};
use crate::config::SettlementConfig;
use crate::contest::models::{Contest, ContestStatus, PrizeLedgerEntry};
use crate::shared::AppError;
use crate::store::{ContestRepository, ContestSettlement};
use crate::websockets::{ConnectionManager, WebSocketMessage};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SettlementOutcome {
    /// Every winner credited; contest closed
    Settled,
    /// Some credits failed; contest left open for a retry
    Partial,
    /// No ranked participants; closed with nothing paid
    NoParticipants,
    NoPrizePool,
    AlreadySettled,
    Cancelled,
    /// Final ranks or the payout record failed; nothing in this contest was committed
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestSettlementReport {
    pub contest_id: Uuid,
    pub outcome: SettlementOutcome,
    pub winners_rewarded: usize,
    pub distributed: Decimal,
    pub failed_credits: usize,
    pub used_fallback: bool,
}

impl ContestSettlementReport {
    fn skipped(contest_id: Uuid, outcome: SettlementOutcome) -> Self {
        Self {
            contest_id,
            outcome,
            winners_rewarded: 0,
            distributed: Decimal::ZERO,
            failed_credits: 0,
            used_fallback: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub match_id: Uuid,
    pub contests_processed: usize,
    pub winners_rewarded: usize,
    pub total_distributed: Decimal,
    pub failed_credits: usize,
    /// Contests whose own schedule was missing or invalid
    pub fallback_contests: Vec<Uuid>,
    pub contests: Vec<ContestSettlementReport>,
}

impl SettlementSummary {
    pub(crate) fn new(match_id: Uuid) -> Self {
        Self {
            match_id,
            contests_processed: 0,
            winners_rewarded: 0,
            total_distributed: Decimal::ZERO,
            failed_credits: 0,
            fallback_contests: Vec::new(),
            contests: Vec::new(),
        }
    }

    fn record(&mut self, report: ContestSettlementReport) {
        if !matches!(
            report.outcome,
            SettlementOutcome::AlreadySettled | SettlementOutcome::Cancelled
        ) {
            self.contests_processed += 1;
        }
        self.winners_rewarded += report.winners_rewarded;
        self.total_distributed += report.distributed;
        self.failed_credits += report.failed_credits;
        if report.used_fallback {
            self.fallback_contests.push(report.contest_id);
        }
        self.contests.push(report);
    }
}

/// Pays contest winners from their final ranks.
///
/// Two gates keep settlement one-shot: contests already `completed` are skipped unless
/// re-settlement is forced, and every payout carries a ledger reference that is checked
/// before the wallet is touched.
pub struct PrizeDistributionEngine {
    contests: Arc<dyn ContestRepository>,
    wallet: Arc<dyn WalletService>,
    connection_manager: Arc<dyn ConnectionManager>,
    config: SettlementConfig,
}

impl PrizeDistributionEngine {
    pub fn new(
        contests: Arc<dyn ContestRepository>,
        wallet: Arc<dyn WalletService>,
        connection_manager: Arc<dyn ConnectionManager>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            contests,
            wallet,
            connection_manager,
            config,
        }
    }

    /// Settles every contest of a match. `force` re-opens contests that were already
    /// closed; the per-payout ledger gate still applies.
    #[instrument(skip(self))]
    pub async fn settle_match(
        &self,
        match_id: Uuid,
        force: bool,
        stale: &[Uuid],
    ) -> Result<SettlementSummary, AppError> {
        let contests = self.contests.contests_for_match(match_id).await?;
        let mut summary = SettlementSummary::new(match_id);

        for contest in contests {
            let report = match contest.status {
                ContestStatus::Cancelled => {
                    ContestSettlementReport::skipped(contest.id, SettlementOutcome::Cancelled)
                }
                ContestStatus::Completed if !force => {
                    ContestSettlementReport::skipped(contest.id, SettlementOutcome::AlreadySettled)
                }
                // Persisted ranks predate the final scores; left open for a resettle
                _ if stale.contains(&contest.id) => {
                    warn!(contest_id = %contest.id, "Final ranks unavailable; contest not settled");
                    ContestSettlementReport::skipped(contest.id, SettlementOutcome::Failed)
                }
                _ => match self.settle_contest(match_id, &contest).await {
                    Ok(report) => report,
                    Err(e) => {
                        error!(contest_id = %contest.id, error = %e, "Contest settlement failed");
                        ContestSettlementReport::skipped(contest.id, SettlementOutcome::Failed)
                    }
                },
            };
            summary.record(report);
        }

        info!(
            match_id = %match_id,
            contests_processed = summary.contests_processed,
            winners_rewarded = summary.winners_rewarded,
            total_distributed = %summary.total_distributed,
            failed_credits = summary.failed_credits,
            fallback_contests = summary.fallback_contests.len(),
            "Match settlement finished"
        );
        Ok(summary)
    }

    async fn settle_contest(
        &self,
        match_id: Uuid,
        contest: &Contest,
    ) -> Result<ContestSettlementReport, AppError> {
        let pool = contest.total_prize_pool;
        if pool <= Decimal::ZERO {
            self.close(contest.id, Vec::new()).await?;
            return Ok(ContestSettlementReport::skipped(
                contest.id,
                SettlementOutcome::NoPrizePool,
            ));
        }

        let mut ranked: Vec<_> = self
            .contests
            .standings(contest.id)
            .await?
            .into_iter()
            .filter_map(|s| s.rank.map(|rank| (s, rank)))
            .collect();
        if ranked.is_empty() {
            self.close(contest.id, Vec::new()).await?;
            return Ok(ContestSettlementReport::skipped(
                contest.id,
                SettlementOutcome::NoParticipants,
            ));
        }
        ranked.sort_by(|(a, ra), (b, rb)| ra.cmp(rb).then_with(|| a.user_team_id.cmp(&b.user_team_id)));

        let (schedule, used_fallback) =
            match PrizeSchedule::parse(contest.prize_distribution.as_ref(), pool) {
                Ok(schedule) => (schedule, false),
                Err(e) => {
                    warn!(
                        contest_id = %contest.id,
                        reason = %e,
                        split = ?self.config.fallback_split,
                        "Prize schedule unusable; settling with fallback split"
                    );
                    (PrizeSchedule::fallback(&self.config.fallback_split), true)
                }
            };

        let ranks: Vec<i32> = ranked.iter().map(|(_, rank)| *rank).collect();
        let amounts = schedule.allocate(&ranks, pool);

        // Anything paid by an earlier run stays paid; new payouts fit in what is left
        let already_paid: Decimal = ranked.iter().filter_map(|(s, _)| s.prize_won).sum();
        let mut remaining = pool - already_paid;

        let mut payouts = Vec::new();
        let mut failed_credits = 0;
        for ((standing, rank), amount) in ranked.iter().zip(amounts) {
            if amount <= Decimal::ZERO {
                continue;
            }
            let reference =
                PrizeLedgerEntry::reference_for(match_id, contest.id, *rank, standing.user_team_id);
            if self.contests.has_payout(&reference).await? {
                continue;
            }
            let amount = amount.min(remaining);
            if amount <= Decimal::ZERO {
                warn!(contest_id = %contest.id, reference = %reference, "Prize pool exhausted");
                continue;
            }

            let reason = CreditReason {
                reference: reference.clone(),
                description: format!("Prize for rank {} in {}", rank, contest.name),
            };
            match self
                .wallet
                .credit_wallet(standing.user_id, amount, &reason)
                .await
            {
                Ok(wallet_entry_id) => {
                    remaining -= amount;
                    payouts.push(PrizeLedgerEntry {
                        reference,
                        match_id,
                        contest_id: contest.id,
                        participant_id: standing.participant_id,
                        user_team_id: standing.user_team_id,
                        user_id: standing.user_id,
                        rank: *rank,
                        amount,
                        wallet_entry_id,
                        created_at: Utc::now(),
                    });
                }
                Err(e) => {
                    failed_credits += 1;
                    warn!(
                        contest_id = %contest.id,
                        user_id = %standing.user_id,
                        reference = %reference,
                        error = %e,
                        "Wallet credit failed"
                    );
                }
            }
        }

        let winners_rewarded = payouts.len();
        let distributed: Decimal = payouts.iter().map(|p| p.amount).sum();
        let notifications: Vec<(Uuid, i32, Decimal)> =
            payouts.iter().map(|p| (p.user_id, p.rank, p.amount)).collect();

        self.contests
            .finalize_settlement(ContestSettlement {
                contest_id: contest.id,
                payouts,
                close_contest: failed_credits == 0,
            })
            .await?;

        for (user_id, rank, amount) in notifications {
            self.connection_manager
                .send_personalized(
                    user_id,
                    contest.id,
                    WebSocketMessage::prize_awarded(contest.id, rank, amount),
                )
                .await;
        }

        Ok(ContestSettlementReport {
            contest_id: contest.id,
            outcome: if failed_credits == 0 {
                SettlementOutcome::Settled
            } else {
                SettlementOutcome::Partial
            },
            winners_rewarded,
            distributed,
            failed_credits,
            used_fallback,
        })
    }

    async fn close(&self, contest_id: Uuid, payouts: Vec<PrizeLedgerEntry>) -> Result<(), AppError> {
        self.contests
            .finalize_settlement(ContestSettlement {
                contest_id,
                payouts,
                close_contest: true,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::contest::LeaderboardEngine;
    use crate::scoring::models::UserTeam;
    use crate::settlement::InMemoryWalletService;
    use crate::store::InMemoryStore;
    use crate::websockets::ConnectionManagerHandle;
    use rust_decimal_macros::dec;
    use serde_json::json;

    struct World {
        store: Arc<InMemoryStore>,
        wallet: Arc<InMemoryWalletService>,
        engine: PrizeDistributionEngine,
        leaderboard: LeaderboardEngine,
        match_id: Uuid,
    }

    impl World {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let wallet = Arc::new(InMemoryWalletService::new());
            let connections: Arc<dyn ConnectionManager> =
                Arc::new(ConnectionManagerHandle::spawn(ConnectionConfig::default()));
            let engine = PrizeDistributionEngine::new(
                store.clone(),
                wallet.clone(),
                connections.clone(),
                SettlementConfig::default(),
            );
            let leaderboard = LeaderboardEngine::new(store.clone(), connections);
            Self {
                store,
                wallet,
                engine,
                leaderboard,
                match_id: Uuid::new_v4(),
            }
        }

        /// Seeds a live contest with one roster per total and computes its ranks
        async fn contest(&self, pool: Decimal, schedule: Option<serde_json::Value>, totals: &[Decimal]) -> (Contest, Vec<UserTeam>) {
            let mut contest = Contest::new(self.match_id, "Main event", pool);
            contest.status = ContestStatus::Live;
            contest.prize_distribution = schedule;
            self.store.insert_contest(contest.clone()).unwrap();

            let mut teams = Vec::new();
            for (i, total) in totals.iter().enumerate() {
                let mut team = UserTeam::new(Uuid::new_v4(), self.match_id, format!("team-{}", i));
                team.total_points = *total;
                self.store.insert_roster(team.clone(), vec![]).unwrap();
                self.store.join_contest(contest.id, team.id).unwrap();
                teams.push(team);
            }
            self.leaderboard.compute_ranks(contest.id).await.unwrap();
            (contest, teams)
        }

        fn prize(&self, contest: &Contest, team: &UserTeam) -> Decimal {
            self.store
                .participant(contest.id, team.id)
                .and_then(|p| p.prize_won)
                .unwrap_or_default()
        }
    }

    fn schedule_50_30_10() -> serde_json::Value {
        json!({"version": "v1", "tiers": [
            {"from": 1, "to": 1, "percentage": 50},
            {"from": 2, "to": 2, "percentage": 30},
            {"from": 3, "to": 3, "percentage": 10}
        ]})
    }

    #[tokio::test]
    async fn pays_winners_and_conserves_pool() {
        let world = World::new();
        let (contest, teams) = world
            .contest(dec!(1000), Some(schedule_50_30_10()), &[dec!(90), dec!(80), dec!(70), dec!(60)])
            .await;

        let summary = world.engine.settle_match(world.match_id, false, &[]).await.unwrap();

        assert_eq!(summary.contests_processed, 1);
        assert_eq!(summary.winners_rewarded, 3);
        assert_eq!(summary.total_distributed, dec!(900));
        assert_eq!(world.wallet.balance(teams[0].user_id), dec!(500));
        assert_eq!(world.prize(&contest, &teams[3]), dec!(0));
        assert!(world.store.contest(contest.id).unwrap().is_settled());
    }

    #[tokio::test]
    async fn second_run_does_not_double_pay() {
        let world = World::new();
        let (_, teams) = world
            .contest(dec!(100), Some(schedule_50_30_10()), &[dec!(3), dec!(2)])
            .await;

        world.engine.settle_match(world.match_id, false, &[]).await.unwrap();
        let again = world.engine.settle_match(world.match_id, false, &[]).await.unwrap();
        let forced = world.engine.settle_match(world.match_id, true, &[]).await.unwrap();

        assert_eq!(again.total_distributed, dec!(0));
        assert_eq!(again.contests[0].outcome, SettlementOutcome::AlreadySettled);
        assert_eq!(forced.total_distributed, dec!(0));
        assert_eq!(world.wallet.balance(teams[0].user_id), dec!(50));
        assert_eq!(world.wallet.credit_count(), 2);
    }

    #[tokio::test]
    async fn tied_winners_share_the_positions_they_occupy() {
        let world = World::new();
        let (contest, teams) = world
            .contest(dec!(1000), Some(schedule_50_30_10()), &[dec!(50), dec!(50), dec!(40)])
            .await;

        world.engine.settle_match(world.match_id, false, &[]).await.unwrap();

        assert_eq!(world.prize(&contest, &teams[0]), dec!(400));
        assert_eq!(world.prize(&contest, &teams[1]), dec!(400));
        assert_eq!(world.prize(&contest, &teams[2]), dec!(100));
    }

    #[tokio::test]
    async fn malformed_schedule_falls_back_and_is_flagged() {
        let world = World::new();
        let (contest, teams) = world
            .contest(dec!(200), Some(json!({"first": "most"})), &[dec!(9), dec!(8)])
            .await;

        let summary = world.engine.settle_match(world.match_id, false, &[]).await.unwrap();

        assert_eq!(summary.fallback_contests, vec![contest.id]);
        assert_eq!(world.wallet.balance(teams[0].user_id), dec!(100));
        assert_eq!(world.wallet.balance(teams[1].user_id), dec!(60));
    }

    #[tokio::test]
    async fn empty_contest_is_a_zero_distribution() {
        let world = World::new();
        let (contest, _) = world.contest(dec!(500), Some(schedule_50_30_10()), &[]).await;

        let summary = world.engine.settle_match(world.match_id, false, &[]).await.unwrap();

        assert_eq!(summary.contests_processed, 1);
        assert_eq!(summary.total_distributed, dec!(0));
        assert_eq!(summary.contests[0].outcome, SettlementOutcome::NoParticipants);
        assert!(world.store.contest(contest.id).unwrap().is_settled());
    }

    #[tokio::test]
    async fn failed_credit_leaves_contest_open_and_retry_pays_only_the_missing_winner() {
        let world = World::new();
        let (contest, teams) = world
            .contest(dec!(1000), Some(schedule_50_30_10()), &[dec!(3), dec!(2), dec!(1)])
            .await;
        world.wallet.fail_for(teams[1].user_id);

        let first = world.engine.settle_match(world.match_id, false, &[]).await.unwrap();
        assert_eq!(first.failed_credits, 1);
        assert_eq!(first.winners_rewarded, 2);
        assert_eq!(first.contests[0].outcome, SettlementOutcome::Partial);
        assert!(!world.store.contest(contest.id).unwrap().is_settled());

        world.wallet.recover(teams[1].user_id);
        let retry = world.engine.settle_match(world.match_id, false, &[]).await.unwrap();

        assert_eq!(retry.winners_rewarded, 1);
        assert_eq!(retry.total_distributed, dec!(300));
        assert_eq!(world.wallet.balance(teams[0].user_id), dec!(500));
        assert_eq!(world.wallet.balance(teams[1].user_id), dec!(300));
        assert!(world.store.contest(contest.id).unwrap().is_settled());
    }

    #[tokio::test]
    async fn forced_resettlement_never_exceeds_pool() {
        let world = World::new();
        let (contest, teams) = world
            .contest(dec!(100), Some(json!({"1": 100})), &[dec!(10), dec!(5)])
            .await;
        world.engine.settle_match(world.match_id, false, &[]).await.unwrap();

        // A correction flips the winner after payout
        let mut flipped = teams[1].clone();
        flipped.total_points = dec!(20);
        world.store.insert_roster(flipped, vec![]).unwrap();
        world.leaderboard.compute_ranks(contest.id).await.unwrap();

        let summary = world.engine.settle_match(world.match_id, true, &[]).await.unwrap();

        assert_eq!(summary.total_distributed, dec!(0));
        let paid = world.prize(&contest, &teams[0]) + world.prize(&contest, &teams[1]);
        assert_eq!(paid, dec!(100));
    }

    #[tokio::test]
    async fn cancelled_contest_is_skipped() {
        let world = World::new();
        let mut contest = Contest::new(world.match_id, "Called off", dec!(100));
        contest.status = ContestStatus::Cancelled;
        world.store.insert_contest(contest).unwrap();

        let summary = world.engine.settle_match(world.match_id, false, &[]).await.unwrap();
        assert_eq!(summary.contests_processed, 0);
        assert_eq!(summary.contests[0].outcome, SettlementOutcome::Cancelled);
    }

    #[tokio::test]
    async fn stale_contest_stays_open_and_unpaid() {
        let world = World::new();
        let (contest, teams) = world
            .contest(dec!(100), Some(json!({"1": 100})), &[dec!(10), dec!(5)])
            .await;

        let summary = world
            .engine
            .settle_match(world.match_id, false, &[contest.id])
            .await
            .unwrap();

        assert_eq!(summary.contests[0].outcome, SettlementOutcome::Failed);
        assert_eq!(summary.total_distributed, dec!(0));
        assert_eq!(world.wallet.balance(teams[0].user_id), dec!(0));
        assert!(!world.store.contest(contest.id).unwrap().is_settled());
    }
}
