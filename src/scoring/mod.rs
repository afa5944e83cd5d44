// Event Ingestion Service: the single writer of the match event ledger

// Public API - what other modules can use
pub use handlers::{
    add_event, bulk_add_events, complete_match, delete_event, edit_event, match_dashboard,
    recalculate_points, resettle_match, start_match,
};
pub use service::EventIngestionService;
pub use types::{
    BulkEventResult, BulkItemError, BulkItemResult, CompleteMatchRequest, CompletionSummary,
    DashboardRoster, EventPatch, LiveDashboard, NewMatchEvent, RecalculationSummary,
    StartMatchSummary,
};

// Internal modules
mod handlers;
pub mod models;
mod service;
mod types;
