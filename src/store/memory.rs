use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    ContestRepository, ContestSettlement, LedgerChange, RankAssignment, ScoringCommit,
    ScoringRepository,
};
use crate::contest::models::{
    Contest, ContestParticipant, ContestStatus, PrizeLedgerEntry, Standing,
};
use crate::scoring::models::{Match, MatchEvent, MatchStatus, Player, Roster, TeamPlayer, UserTeam};
use crate::shared::AppError;

#[derive(Default)]
struct Tables {
    matches: HashMap<Uuid, Match>,
    players: HashMap<Uuid, Player>,
    match_players: HashMap<Uuid, HashSet<Uuid>>,
    // Creation order is the ledger order
    events: Vec<MatchEvent>,
    user_teams: HashMap<Uuid, UserTeam>,
    team_players: Vec<TeamPlayer>,
    contests: HashMap<Uuid, Contest>,
    participants: HashMap<Uuid, ContestParticipant>,
    ledger: HashMap<String, PrizeLedgerEntry>,
    // Contests whose rank writes are refused
    rank_write_failures: HashSet<Uuid>,
}

impl Tables {
    fn roster(&self, team: &UserTeam) -> Roster {
        Roster {
            team: team.clone(),
            players: self
                .team_players
                .iter()
                .filter(|tp| tp.user_team_id == team.id)
                .cloned()
                .collect(),
        }
    }
}

/// In-memory implementation of the store for development and testing.
///
/// All tables sit behind one mutex, so every trait method is atomic the same way a
/// database transaction would be. Catalogue data (matches, players, rosters, contests)
/// is owned by other services; the `insert_*` helpers stand in for them.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    fail_next_write: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables.lock().map_err(|_| {
            warn!("In-memory store mutex poisoned");
            AppError::Internal
        })
    }

    fn check_write(&self) -> Result<(), AppError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            warn!("Simulated write failure");
            return Err(AppError::DatabaseError("simulated write failure".to_string()));
        }
        Ok(())
    }

    /// Makes the next transactional write fail, as an unavailable database would
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Refuses every rank write for one contest until [`Self::recover_ranks`]
    pub fn fail_ranks_for(&self, contest_id: Uuid) -> Result<(), AppError> {
        self.tables()?.rank_write_failures.insert(contest_id);
        Ok(())
    }

    pub fn recover_ranks(&self, contest_id: Uuid) -> Result<(), AppError> {
        self.tables()?.rank_write_failures.remove(&contest_id);
        Ok(())
    }

    pub fn insert_match(&self, m: Match) -> Result<(), AppError> {
        let mut tables = self.tables()?;
        tables.matches.insert(m.id, m);
        Ok(())
    }

    pub fn insert_player(&self, player: Player, match_id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables()?;
        tables
            .match_players
            .entry(match_id)
            .or_default()
            .insert(player.id);
        tables.players.insert(player.id, player);
        Ok(())
    }

    pub fn insert_roster(&self, team: UserTeam, players: Vec<TeamPlayer>) -> Result<(), AppError> {
        let mut tables = self.tables()?;
        if players.iter().any(|p| p.user_team_id != team.id) {
            return Err(AppError::Validation(
                "Roster rows must belong to the team".to_string(),
            ));
        }
        tables.team_players.retain(|tp| tp.user_team_id != team.id);
        tables.team_players.extend(players);
        tables.user_teams.insert(team.id, team);
        Ok(())
    }

    pub fn insert_contest(&self, contest: Contest) -> Result<(), AppError> {
        let mut tables = self.tables()?;
        tables.contests.insert(contest.id, contest);
        Ok(())
    }

    /// Enters a roster into a contest, enforcing capacity and single-entry rules
    pub fn join_contest(&self, contest_id: Uuid, user_team_id: Uuid) -> Result<ContestParticipant, AppError> {
        let mut tables = self.tables()?;
        let contest = tables
            .contests
            .get(&contest_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Contest {} not found", contest_id)))?;
        let team = tables
            .user_teams
            .get(&user_team_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("User team {} not found", user_team_id)))?;

        let entries: Vec<&ContestParticipant> = tables
            .participants
            .values()
            .filter(|p| p.contest_id == contest_id)
            .collect();
        if entries.len() as i32 >= contest.max_participants {
            return Err(AppError::Conflict("Contest is full".to_string()));
        }
        if entries.iter().any(|p| p.user_team_id == user_team_id) {
            return Err(AppError::Conflict("Team already entered".to_string()));
        }
        if !contest.allow_multi_entry && entries.iter().any(|p| p.user_id == team.user_id) {
            return Err(AppError::Conflict(
                "Contest does not allow multiple entries".to_string(),
            ));
        }

        let participant = ContestParticipant::new(contest_id, user_team_id, team.user_id);
        tables.participants.insert(participant.id, participant.clone());
        Ok(participant)
    }

    pub fn roster(&self, user_team_id: Uuid) -> Option<Roster> {
        let tables = self.tables().ok()?;
        tables.user_teams.get(&user_team_id).map(|t| tables.roster(t))
    }

    pub fn contest(&self, contest_id: Uuid) -> Option<Contest> {
        self.tables().ok()?.contests.get(&contest_id).cloned()
    }

    pub fn participant(&self, contest_id: Uuid, user_team_id: Uuid) -> Option<ContestParticipant> {
        self.tables()
            .ok()?
            .participants
            .values()
            .find(|p| p.contest_id == contest_id && p.user_team_id == user_team_id)
            .cloned()
    }

    pub fn ledger_entries(&self) -> Vec<PrizeLedgerEntry> {
        self.tables()
            .map(|t| t.ledger.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ScoringRepository for InMemoryStore {
    async fn get_match(&self, match_id: Uuid) -> Result<Option<Match>, AppError> {
        Ok(self.tables()?.matches.get(&match_id).cloned())
    }

    #[instrument(skip(self, result_summary))]
    async fn transition_match(
        &self,
        match_id: Uuid,
        from: MatchStatus,
        to: MatchStatus,
        result_summary: Option<String>,
    ) -> Result<bool, AppError> {
        self.check_write()?;
        let mut tables = self.tables()?;
        match tables.matches.get_mut(&match_id) {
            Some(m) if m.status == from => {
                m.status = to;
                if result_summary.is_some() {
                    m.result_summary = result_summary;
                }
                debug!(match_id = %match_id, from = %from, to = %to, "Match status changed");
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("Match {} not found", match_id))),
        }
    }

    async fn lock_rosters(&self, match_id: Uuid) -> Result<u64, AppError> {
        let mut tables = self.tables()?;
        let mut locked = 0;
        for team in tables.user_teams.values_mut() {
            if team.match_id == match_id && !team.is_locked {
                team.is_locked = true;
                locked += 1;
            }
        }
        Ok(locked)
    }

    async fn is_player_in_match(&self, match_id: Uuid, player_id: Uuid) -> Result<bool, AppError> {
        Ok(self
            .tables()?
            .match_players
            .get(&match_id)
            .map(|players| players.contains(&player_id))
            .unwrap_or(false))
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<MatchEvent>, AppError> {
        Ok(self
            .tables()?
            .events
            .iter()
            .find(|e| e.id == event_id)
            .cloned())
    }

    async fn list_events(&self, match_id: Uuid) -> Result<Vec<MatchEvent>, AppError> {
        Ok(self
            .tables()?
            .events
            .iter()
            .filter(|e| e.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn recent_events(&self, match_id: Uuid, limit: i64) -> Result<Vec<MatchEvent>, AppError> {
        Ok(self
            .tables()?
            .events
            .iter()
            .rev()
            .filter(|e| e.match_id == match_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn rosters_for_match(&self, match_id: Uuid) -> Result<Vec<Roster>, AppError> {
        let tables = self.tables()?;
        let mut rosters: Vec<Roster> = tables
            .user_teams
            .values()
            .filter(|t| t.match_id == match_id)
            .map(|t| tables.roster(t))
            .collect();
        rosters.sort_by_key(|r| r.team.id);
        Ok(rosters)
    }

    async fn rosters_containing(
        &self,
        match_id: Uuid,
        player_ids: &[Uuid],
    ) -> Result<Vec<Roster>, AppError> {
        let rosters = self.rosters_for_match(match_id).await?;
        Ok(rosters
            .into_iter()
            .filter(|r| player_ids.iter().any(|p| r.contains(*p)))
            .collect())
    }

    #[instrument(skip(self, commit), fields(match_id = %commit.match_id))]
    async fn commit_scoring(&self, commit: ScoringCommit) -> Result<(), AppError> {
        self.check_write()?;
        let mut tables = self.tables()?;

        // Validate everything before touching any table
        for update in &commit.rosters {
            if !tables.user_teams.contains_key(&update.user_team_id) {
                return Err(AppError::NotFound(format!(
                    "User team {} not found",
                    update.user_team_id
                )));
            }
        }

        match commit.change {
            LedgerChange::Insert(event) => tables.events.push(event),
            LedgerChange::Update(event) => {
                let slot = tables
                    .events
                    .iter_mut()
                    .find(|e| e.id == event.id)
                    .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event.id)))?;
                *slot = event;
            }
            LedgerChange::Delete(event_id) => {
                let before = tables.events.len();
                tables.events.retain(|e| e.id != event_id);
                if tables.events.len() == before {
                    return Err(AppError::NotFound(format!("Event {} not found", event_id)));
                }
            }
            LedgerChange::Rescore(rescored) => {
                let points: HashMap<Uuid, _> = rescored.iter().map(|e| (e.id, e.points)).collect();
                for event in tables.events.iter_mut() {
                    if let Some(p) = points.get(&event.id) {
                        event.points = *p;
                    }
                }
            }
        }

        for update in commit.rosters {
            for tp in tables
                .team_players
                .iter_mut()
                .filter(|tp| tp.user_team_id == update.user_team_id)
            {
                if let Some((_, points)) =
                    update.player_points.iter().find(|(p, _)| *p == tp.player_id)
                {
                    tp.points_earned = *points;
                }
            }
            if let Some(team) = tables.user_teams.get_mut(&update.user_team_id) {
                team.total_points = update.total_points;
            }
        }

        debug!("Scoring commit applied in memory");
        Ok(())
    }
}

#[async_trait]
impl ContestRepository for InMemoryStore {
    async fn get_contest(&self, contest_id: Uuid) -> Result<Option<Contest>, AppError> {
        Ok(self.tables()?.contests.get(&contest_id).cloned())
    }

    async fn contests_for_match(&self, match_id: Uuid) -> Result<Vec<Contest>, AppError> {
        let mut contests: Vec<Contest> = self
            .tables()?
            .contests
            .values()
            .filter(|c| c.match_id == match_id)
            .cloned()
            .collect();
        contests.sort_by_key(|c| c.id);
        Ok(contests)
    }

    async fn set_contest_status_for_match(
        &self,
        match_id: Uuid,
        from: ContestStatus,
        to: ContestStatus,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables()?;
        let mut changed = 0;
        for contest in tables.contests.values_mut() {
            if contest.match_id == match_id && contest.status == from {
                contest.status = to;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn standings(&self, contest_id: Uuid) -> Result<Vec<Standing>, AppError> {
        let tables = self.tables()?;
        let mut standings = Vec::new();
        for participant in tables
            .participants
            .values()
            .filter(|p| p.contest_id == contest_id)
        {
            let team = tables.user_teams.get(&participant.user_team_id).ok_or_else(|| {
                AppError::NotFound(format!("User team {} not found", participant.user_team_id))
            })?;
            standings.push(Standing {
                participant_id: participant.id,
                user_team_id: team.id,
                user_id: participant.user_id,
                team_name: team.name.clone(),
                total_points: team.total_points,
                rank: participant.rank,
                prize_won: participant.prize_won,
            });
        }
        standings.sort_by_key(|s| s.user_team_id);
        Ok(standings)
    }

    async fn save_ranks(&self, contest_id: Uuid, ranks: &[RankAssignment]) -> Result<(), AppError> {
        self.check_write()?;
        let mut tables = self.tables()?;
        if tables.rank_write_failures.contains(&contest_id) {
            warn!(contest_id = %contest_id, "Simulated rank write failure");
            return Err(AppError::DatabaseError("simulated rank write failure".to_string()));
        }
        for assignment in ranks {
            match tables.participants.get_mut(&assignment.participant_id) {
                Some(p) if p.contest_id == contest_id => p.rank = Some(assignment.rank),
                _ => {
                    return Err(AppError::NotFound(format!(
                        "Participant {} not in contest {}",
                        assignment.participant_id, contest_id
                    )))
                }
            }
            if let Some(team) = tables.user_teams.get_mut(&assignment.user_team_id) {
                team.final_rank = Some(assignment.rank);
            }
        }
        Ok(())
    }

    async fn has_payout(&self, reference: &str) -> Result<bool, AppError> {
        Ok(self.tables()?.ledger.contains_key(reference))
    }

    #[instrument(skip(self, settlement), fields(contest_id = %settlement.contest_id))]
    async fn finalize_settlement(&self, settlement: ContestSettlement) -> Result<(), AppError> {
        self.check_write()?;
        let mut tables = self.tables()?;
        if !tables.contests.contains_key(&settlement.contest_id) {
            return Err(AppError::NotFound(format!(
                "Contest {} not found",
                settlement.contest_id
            )));
        }
        if let Some(dup) = settlement
            .payouts
            .iter()
            .find(|p| tables.ledger.contains_key(&p.reference))
        {
            return Err(AppError::Conflict(format!(
                "Payout {} already recorded",
                dup.reference
            )));
        }

        for payout in settlement.payouts {
            if let Some(participant) = tables.participants.get_mut(&payout.participant_id) {
                participant.prize_won =
                    Some(participant.prize_won.unwrap_or_default() + payout.amount);
            }
            tables.ledger.insert(payout.reference.clone(), payout);
        }
        if settlement.close_contest {
            if let Some(contest) = tables.contests.get_mut(&settlement.contest_id) {
                contest.status = ContestStatus::Completed;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RosterUpdate;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn live_match() -> Match {
        let mut m = Match::new(Uuid::new_v4(), "Grand Final", Utc::now());
        m.status = MatchStatus::Live;
        m
    }

    fn event(match_id: Uuid, player_id: Uuid, points: Decimal) -> MatchEvent {
        MatchEvent {
            id: Uuid::new_v4(),
            match_id,
            player_id,
            event_type: "kill".to_string(),
            points,
            round: Some(1),
            game_time_secs: None,
            metadata: serde_json::json!({}),
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let store = InMemoryStore::new();
        let m = live_match();
        store.insert_match(m.clone()).unwrap();

        assert!(store
            .transition_match(m.id, MatchStatus::Live, MatchStatus::Completed, None)
            .await
            .unwrap());
        assert!(!store
            .transition_match(m.id, MatchStatus::Live, MatchStatus::Completed, None)
            .await
            .unwrap());
        let stored = store.get_match(m.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MatchStatus::Completed);
    }

    #[tokio::test]
    async fn commit_writes_ledger_and_totals_together() {
        let store = InMemoryStore::new();
        let m = live_match();
        let player = Uuid::new_v4();
        let team = UserTeam::new(Uuid::new_v4(), m.id, "Squad");
        store.insert_match(m.clone()).unwrap();
        store
            .insert_roster(team.clone(), vec![TeamPlayer::new(team.id, player).captain()])
            .unwrap();

        let ev = event(m.id, player, dec!(2));
        store
            .commit_scoring(ScoringCommit {
                match_id: m.id,
                change: LedgerChange::Insert(ev.clone()),
                rosters: vec![RosterUpdate {
                    user_team_id: team.id,
                    total_points: dec!(4),
                    player_points: vec![(player, dec!(2))],
                }],
            })
            .await
            .unwrap();

        assert_eq!(store.list_events(m.id).await.unwrap(), vec![ev]);
        let roster = store.roster(team.id).unwrap();
        assert_eq!(roster.team.total_points, dec!(4));
        assert_eq!(roster.players[0].points_earned, dec!(2));
    }

    #[tokio::test]
    async fn failed_commit_leaves_state_untouched() {
        let store = InMemoryStore::new();
        let m = live_match();
        store.insert_match(m.clone()).unwrap();
        store.fail_next_write();

        let result = store
            .commit_scoring(ScoringCommit {
                match_id: m.id,
                change: LedgerChange::Insert(event(m.id, Uuid::new_v4(), dec!(1))),
                rosters: vec![],
            })
            .await;

        assert!(matches!(result, Err(AppError::DatabaseError(_))));
        assert!(store.list_events(m.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_events_are_newest_first() {
        let store = InMemoryStore::new();
        let m = live_match();
        let player = Uuid::new_v4();
        let events: Vec<MatchEvent> = (1..=3).map(|i| event(m.id, player, Decimal::from(i))).collect();
        for ev in &events {
            store
                .commit_scoring(ScoringCommit {
                    match_id: m.id,
                    change: LedgerChange::Insert(ev.clone()),
                    rosters: vec![],
                })
                .await
                .unwrap();
        }

        let recent = store.recent_events(m.id, 2).await.unwrap();
        assert_eq!(recent, vec![events[2].clone(), events[1].clone()]);
    }

    #[test]
    fn join_contest_enforces_single_entry() {
        let store = InMemoryStore::new();
        let match_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let first = UserTeam::new(user, match_id, "A");
        let second = UserTeam::new(user, match_id, "B");
        store.insert_roster(first.clone(), vec![]).unwrap();
        store.insert_roster(second.clone(), vec![]).unwrap();
        let contest = Contest::new(match_id, "Mega", dec!(1000));
        store.insert_contest(contest.clone()).unwrap();

        store.join_contest(contest.id, first.id).unwrap();
        assert!(matches!(
            store.join_contest(contest.id, second.id),
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn finalize_rejects_duplicate_reference() {
        let store = InMemoryStore::new();
        let match_id = Uuid::new_v4();
        let team = UserTeam::new(Uuid::new_v4(), match_id, "A");
        store.insert_roster(team.clone(), vec![]).unwrap();
        let contest = Contest::new(match_id, "Mega", dec!(100));
        store.insert_contest(contest.clone()).unwrap();
        let participant = store.join_contest(contest.id, team.id).unwrap();

        let entry = PrizeLedgerEntry {
            reference: PrizeLedgerEntry::reference_for(match_id, contest.id, 1, team.id),
            match_id,
            contest_id: contest.id,
            participant_id: participant.id,
            user_team_id: team.id,
            user_id: team.user_id,
            rank: 1,
            amount: dec!(50),
            wallet_entry_id: "w-1".to_string(),
            created_at: Utc::now(),
        };
        let settlement = ContestSettlement {
            contest_id: contest.id,
            payouts: vec![entry],
            close_contest: true,
        };

        store.finalize_settlement(settlement.clone()).await.unwrap();
        assert!(store.finalize_settlement(settlement).await.is_err());

        let participant = store.participant(contest.id, team.id).unwrap();
        assert_eq!(participant.prize_won, Some(dec!(50)));
        assert!(store.contest(contest.id).unwrap().is_settled());
    }
}
