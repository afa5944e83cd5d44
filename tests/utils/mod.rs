pub mod assertions;
pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use assertions::{assert_prizes, LeaderboardChanges, MessageAssertion};
#[allow(unused_imports)]
pub use mocks::RecordingConnectionManager;
#[allow(unused_imports)]
pub use setup::{TestSetup, TestSetupBuilder};
