use fantasy_live::{
    auth::TokenConfig,
    config::AppConfig,
    create_router,
    settlement::{InMemoryWalletService, PostgresWalletService},
    AppError, AppState, ConnectionManager, ConnectionManagerHandle, ContestRepository,
    EventIngestionService, FantasyPointCalculator, GameConfigStore, InMemoryGameConfigStore,
    InMemoryStore, LeaderboardEngine, PostgresStore, PrizeDistributionEngine, ScoringRepository,
    WalletService,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Backends {
    scoring: Arc<dyn ScoringRepository>,
    contests: Arc<dyn ContestRepository>,
    game_config: Arc<dyn GameConfigStore>,
    wallet: Arc<dyn WalletService>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fantasy_live=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "Server terminated");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    info!(bind_addr = %config.bind_addr, "Starting fantasy live scoring server");

    let backends = match &config.database_url {
        Some(url) => postgres_backends(url).await?,
        None => {
            warn!("DATABASE_URL not set; using in-memory storage");
            memory_backends(config.scoring_rules_path.as_deref())?
        }
    };

    let connections = ConnectionManagerHandle::spawn(config.connections.clone());
    let connection_manager: Arc<dyn ConnectionManager> = Arc::new(connections);

    let leaderboard = Arc::new(LeaderboardEngine::new(
        backends.contests.clone(),
        connection_manager.clone(),
    ));
    let settlement = Arc::new(PrizeDistributionEngine::new(
        backends.contests.clone(),
        backends.wallet,
        connection_manager.clone(),
        config.settlement.clone(),
    ));
    let scoring_service = Arc::new(EventIngestionService::new(
        backends.scoring,
        backends.contests.clone(),
        backends.game_config,
        FantasyPointCalculator::from_config(&config.scoring),
        leaderboard.clone(),
        settlement,
        config.scoring.clone(),
    ));

    let app_state = AppState::new(
        TokenConfig::with_secret(config.jwt_secret.clone()),
        scoring_service,
        leaderboard,
        backends.contests,
        connection_manager,
        config.connections.clone(),
    );

    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| AppError::Configuration(format!("Cannot bind {}: {}", config.bind_addr, e)))?;
    info!("Server running on http://{}", config.bind_addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Configuration(format!("Server error: {}", e)))
}

async fn postgres_backends(database_url: &str) -> Result<Backends, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;
    info!("Connected to PostgreSQL and applied migrations");

    let store = Arc::new(PostgresStore::new(pool.clone()));
    Ok(Backends {
        scoring: store.clone(),
        contests: store.clone(),
        game_config: store,
        wallet: Arc::new(PostgresWalletService::new(pool)),
    })
}

fn memory_backends(scoring_rules_path: Option<&str>) -> Result<Backends, AppError> {
    let game_config = match scoring_rules_path {
        Some(path) => InMemoryGameConfigStore::from_json_file(path)?,
        None => {
            warn!("SCORING_RULES_PATH not set; no game has scoring rules");
            InMemoryGameConfigStore::new()
        }
    };

    let store = Arc::new(InMemoryStore::new());
    Ok(Backends {
        scoring: store.clone(),
        contests: store,
        game_config: Arc::new(game_config),
        wallet: Arc::new(InMemoryWalletService::new()),
    })
}
