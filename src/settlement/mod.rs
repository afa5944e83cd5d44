// Prize Distribution Engine: pays contest winners once per match from final ranks

// Public API - what other modules can use
pub use schedule::{PrizeSchedule, ScheduleError, Share, Tier};
pub use service::{
    ContestSettlementReport, PrizeDistributionEngine, SettlementOutcome, SettlementSummary,
};
pub use wallet::{
    CreditReason, InMemoryWalletService, PostgresWalletService, WalletError, WalletService,
};

// Internal modules
mod schedule;
mod service;
mod wallet;
