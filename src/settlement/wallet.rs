use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::shared::AppError;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Wallet service unavailable: {0}")]
    Unavailable(String),

    #[error("Credit rejected: {0}")]
    Rejected(String),
}

impl From<WalletError> for AppError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::Unavailable(msg) => AppError::DatabaseError(msg),
            WalletError::Rejected(msg) => AppError::Validation(msg),
        }
    }
}

/// Why money is moving; `reference` identifies one logical payout
#[derive(Debug, Clone)]
pub struct CreditReason {
    pub reference: String,
    pub description: String,
}

/// External wallet collaborator. Crediting twice with the same reference must not
/// move money twice; the second call returns the first call's entry id.
#[async_trait]
pub trait WalletService: Send + Sync {
    async fn credit_wallet(
        &self,
        user_id: Uuid,
        amount: Decimal,
        reason: &CreditReason,
    ) -> Result<String, WalletError>;
}

#[derive(Default)]
struct WalletState {
    balances: HashMap<Uuid, Decimal>,
    // reference -> entry id
    entries: HashMap<String, String>,
}

/// In-memory wallet for development and testing
#[derive(Default)]
pub struct InMemoryWalletService {
    state: Mutex<WalletState>,
    failing_users: Mutex<HashSet<Uuid>>,
}

impl InMemoryWalletService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every credit for `user_id` fail until `recover` is called
    pub fn fail_for(&self, user_id: Uuid) {
        if let Ok(mut failing) = self.failing_users.lock() {
            failing.insert(user_id);
        }
    }

    pub fn recover(&self, user_id: Uuid) {
        if let Ok(mut failing) = self.failing_users.lock() {
            failing.remove(&user_id);
        }
    }

    pub fn balance(&self, user_id: Uuid) -> Decimal {
        self.state
            .lock()
            .map(|s| s.balances.get(&user_id).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn credit_count(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or_default()
    }
}

#[async_trait]
impl WalletService for InMemoryWalletService {
    #[instrument(skip(self, reason), fields(reference = %reason.reference))]
    async fn credit_wallet(
        &self,
        user_id: Uuid,
        amount: Decimal,
        reason: &CreditReason,
    ) -> Result<String, WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::Rejected("amount must be positive".to_string()));
        }
        let failing = self
            .failing_users
            .lock()
            .map(|f| f.contains(&user_id))
            .unwrap_or(false);
        if failing {
            warn!(user_id = %user_id, "Simulated wallet outage");
            return Err(WalletError::Unavailable("wallet offline".to_string()));
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| WalletError::Unavailable("wallet state poisoned".to_string()))?;
        if let Some(existing) = state.entries.get(&reason.reference) {
            debug!(entry_id = %existing, "Credit already applied");
            return Ok(existing.clone());
        }

        let entry_id = Uuid::new_v4().to_string();
        state.entries.insert(reason.reference.clone(), entry_id.clone());
        *state.balances.entry(user_id).or_default() += amount;
        debug!(user_id = %user_id, amount = %amount, "Wallet credited");
        Ok(entry_id)
    }
}

/// Wallet backed by the `wallets` and `wallet_transactions` tables
pub struct PostgresWalletService {
    pool: PgPool,
}

impl PostgresWalletService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unavailable(e: sqlx::Error) -> WalletError {
    warn!(error = %e, "Wallet database operation failed");
    WalletError::Unavailable(e.to_string())
}

#[async_trait]
impl WalletService for PostgresWalletService {
    #[instrument(skip(self, reason), fields(reference = %reason.reference))]
    async fn credit_wallet(
        &self,
        user_id: Uuid,
        amount: Decimal,
        reason: &CreditReason,
    ) -> Result<String, WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::Rejected("amount must be positive".to_string()));
        }

        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let inserted = sqlx::query(
            "INSERT INTO wallet_transactions (id, user_id, amount, kind, reference, description, created_at)
             VALUES ($1, $2, $3, 'prize', $4, $5, $6)
             ON CONFLICT (reference) DO NOTHING
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(amount)
        .bind(&reason.reference)
        .bind(&reason.description)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(unavailable)?;

        let entry_id: Uuid = match inserted {
            Some(row) => {
                sqlx::query(
                    "INSERT INTO wallets (user_id, balance) VALUES ($1, $2)
                     ON CONFLICT (user_id) DO UPDATE SET balance = wallets.balance + EXCLUDED.balance",
                )
                .bind(user_id)
                .bind(amount)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
                row.get("id")
            }
            None => {
                let row = sqlx::query("SELECT id FROM wallet_transactions WHERE reference = $1")
                    .bind(&reason.reference)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(unavailable)?;
                debug!("Credit already applied");
                row.get("id")
            }
        };

        tx.commit().await.map_err(unavailable)?;
        Ok(entry_id.to_string())
    }
}
