pub use calculator::{FantasyPointCalculator, RosterEntry};
pub use rules::{
    normalize_event_type, GameConfigStore, InMemoryGameConfigStore, RulesError, ScoringRules,
};

mod calculator;
mod rules;
