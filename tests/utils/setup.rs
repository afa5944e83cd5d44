#![allow(dead_code)] // Test utilities may not all be used in every test

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use fantasy_live::{
    auth::{ActorClaims, Role, TokenConfig},
    config::{ConnectionConfig, ScoringConfig, SettlementConfig},
    contest::models::Contest,
    create_router,
    scoring::models::{Match, MatchStatus, Player, TeamPlayer, UserTeam},
    settlement::InMemoryWalletService,
    AppState, ConnectionManager, EventIngestionService, FantasyPointCalculator,
    InMemoryGameConfigStore, InMemoryStore, LeaderboardEngine, PrizeDistributionEngine,
    ScoringRules,
};

use super::mocks::RecordingConnectionManager;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub store: Arc<InMemoryStore>,
    pub rules: Arc<InMemoryGameConfigStore>,
    pub wallet: Arc<InMemoryWalletService>,
    pub connections: Arc<RecordingConnectionManager>,
    pub service: Arc<EventIngestionService>,
    pub state: AppState,
    pub game_id: Uuid,
    pub match_id: Uuid,
    /// Players declared for the match, in creation order
    pub players: Vec<Uuid>,
    pub admin_id: Uuid,
}

pub struct TestSetupBuilder {
    status: MatchStatus,
    player_count: usize,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            status: MatchStatus::Live,
            player_count: 6,
        }
    }

    pub fn upcoming(mut self) -> Self {
        self.status = MatchStatus::Upcoming;
        self
    }

    pub fn with_players(mut self, count: usize) -> Self {
        self.player_count = count;
        self
    }

    pub fn build(self) -> TestSetup {
        let store = Arc::new(InMemoryStore::new());
        let rules = Arc::new(InMemoryGameConfigStore::new());
        let wallet = Arc::new(InMemoryWalletService::new());
        let connections = Arc::new(RecordingConnectionManager::new());
        let connection_manager: Arc<dyn ConnectionManager> = connections.clone();

        let game_id = Uuid::new_v4();
        rules.set_rules(
            game_id,
            ScoringRules::new([
                ("kill", dec!(2)),
                ("death", dec!(-1)),
                ("assist", dec!(1)),
                ("tower", dec!(3)),
            ])
            .unwrap(),
        );

        let mut m = Match::new(game_id, "Championship final", Utc::now());
        m.status = self.status;
        store.insert_match(m.clone()).unwrap();

        let players = (0..self.player_count)
            .map(|i| {
                let player = Player {
                    id: Uuid::new_v4(),
                    game_id,
                    team_name: if i % 2 == 0 { "Tigers" } else { "Wolves" }.to_string(),
                    name: format!("pro-{}", i),
                    role: "flex".to_string(),
                    credits: dec!(9),
                };
                store.insert_player(player.clone(), m.id).unwrap();
                player.id
            })
            .collect();

        let leaderboard = Arc::new(LeaderboardEngine::new(
            store.clone(),
            connection_manager.clone(),
        ));
        let settlement = Arc::new(PrizeDistributionEngine::new(
            store.clone(),
            wallet.clone(),
            connection_manager.clone(),
            SettlementConfig::default(),
        ));
        let scoring_config = ScoringConfig::default();
        let service = Arc::new(EventIngestionService::new(
            store.clone(),
            store.clone(),
            rules.clone(),
            FantasyPointCalculator::from_config(&scoring_config),
            leaderboard.clone(),
            settlement,
            scoring_config,
        ));

        let state = AppState::new(
            TokenConfig::with_secret("integration-secret"),
            service.clone(),
            leaderboard,
            store.clone(),
            connection_manager,
            ConnectionConfig::default(),
        );

        TestSetup {
            store,
            rules,
            wallet,
            connections,
            service,
            state,
            game_id,
            match_id: m.id,
            players,
            admin_id: Uuid::new_v4(),
        }
    }
}

impl TestSetup {
    pub fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }

    pub fn token_for(&self, user_id: Uuid, role: Role) -> String {
        self.state
            .token_config
            .create_token(&ActorClaims::new(user_id, role, 1))
            .unwrap()
    }

    pub fn admin_token(&self) -> String {
        self.token_for(self.admin_id, Role::Admin)
    }

    /// Creates a roster for a fresh user. `picks` are indexes into `players`;
    /// the first pick is captain and the second vice-captain.
    pub fn roster(&self, name: &str, picks: &[usize]) -> UserTeam {
        let team = UserTeam::new(Uuid::new_v4(), self.match_id, name);
        let players = picks
            .iter()
            .enumerate()
            .map(|(slot, &pick)| {
                let tp = TeamPlayer::new(team.id, self.players[pick]);
                match slot {
                    0 => tp.captain(),
                    1 => tp.vice_captain(),
                    _ => tp,
                }
            })
            .collect();
        self.store.insert_roster(team.clone(), players).unwrap();
        team
    }

    pub fn contest(&self, pool: Decimal, distribution: Option<serde_json::Value>) -> Contest {
        let mut contest = Contest::new(self.match_id, "Mega contest", pool);
        if let Some(distribution) = distribution {
            contest = contest.with_distribution(distribution);
        }
        self.store.insert_contest(contest.clone()).unwrap();
        contest
    }

    pub fn enter(&self, contest: &Contest, teams: &[&UserTeam]) {
        for team in teams {
            self.store.join_contest(contest.id, team.id).unwrap();
        }
    }

    pub fn total(&self, team: &UserTeam) -> Decimal {
        self.store.roster(team.id).unwrap().team.total_points
    }
}
