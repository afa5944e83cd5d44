use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use super::rules::{normalize_event_type, ScoringRules};
use crate::config::ScoringConfig;
use crate::scoring::models::{MatchEvent, TeamPlayer};
use crate::shared::AppError;

/// One roster slot as seen by the calculator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RosterEntry {
    pub points: Decimal,
    pub is_captain: bool,
    pub is_vice_captain: bool,
}

impl From<&TeamPlayer> for RosterEntry {
    fn from(player: &TeamPlayer) -> Self {
        Self {
            points: player.points_earned,
            is_captain: player.is_captain,
            is_vice_captain: player.is_vice_captain,
        }
    }
}

/// Pure fantasy scoring. Both the incremental and the full-replay paths go through
/// this type, so a roster total never depends on which path produced it.
#[derive(Debug, Clone)]
pub struct FantasyPointCalculator {
    captain_multiplier: Decimal,
    vice_captain_multiplier: Decimal,
}

impl Default for FantasyPointCalculator {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

impl FantasyPointCalculator {
    pub fn new(captain_multiplier: Decimal, vice_captain_multiplier: Decimal) -> Self {
        Self {
            captain_multiplier,
            vice_captain_multiplier,
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(config.captain_multiplier, config.vice_captain_multiplier)
    }

    /// Point delta for a single occurrence of `event_type`
    pub fn event_points(&self, rules: &ScoringRules, event_type: &str) -> Result<Decimal, AppError> {
        rules
            .points_for(event_type)
            .ok_or_else(|| AppError::UnknownEventType(normalize_event_type(event_type)))
    }

    /// Raw (unmultiplied) points accumulated by one player over a ledger
    pub fn player_points(&self, events: &[MatchEvent], player_id: Uuid) -> Decimal {
        events
            .iter()
            .filter(|e| e.player_id == player_id)
            .map(|e| e.points)
            .sum()
    }

    /// Raw points for every player that appears in the ledger
    pub fn points_by_player(&self, events: &[MatchEvent]) -> HashMap<Uuid, Decimal> {
        let mut totals: HashMap<Uuid, Decimal> = HashMap::new();
        for event in events {
            *totals.entry(event.player_id).or_default() += event.points;
        }
        totals
    }

    /// Σ points + captain × (cm − 1) + vice-captain × (vcm − 1).
    /// Each multiplier is applied at most once; extra flags are ignored.
    pub fn team_total(&self, entries: &[RosterEntry]) -> Decimal {
        let base: Decimal = entries.iter().map(|e| e.points).sum();

        let captain_bonus = entries
            .iter()
            .find(|e| e.is_captain)
            .map(|c| c.points * (self.captain_multiplier - Decimal::ONE))
            .unwrap_or_default();

        let vice_captain_bonus = entries
            .iter()
            .find(|e| e.is_vice_captain && !e.is_captain)
            .map(|v| v.points * (self.vice_captain_multiplier - Decimal::ONE))
            .unwrap_or_default();

        base + captain_bonus + vice_captain_bonus
    }

    /// Re-derives every ledger line's point value from the current rules
    pub fn rescore(
        &self,
        rules: &ScoringRules,
        events: &[MatchEvent],
    ) -> Result<Vec<MatchEvent>, AppError> {
        events
            .iter()
            .map(|event| {
                let points = self.event_points(rules, &event.event_type)?;
                Ok(MatchEvent {
                    points,
                    ..event.clone()
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn entry(points: Decimal, is_captain: bool, is_vice_captain: bool) -> RosterEntry {
        RosterEntry {
            points,
            is_captain,
            is_vice_captain,
        }
    }

    fn event(player_id: Uuid, event_type: &str, points: Decimal) -> MatchEvent {
        MatchEvent {
            id: Uuid::new_v4(),
            match_id: Uuid::nil(),
            player_id,
            event_type: event_type.to_string(),
            points,
            round: None,
            game_time_secs: None,
            metadata: serde_json::Value::Null,
            created_by: Uuid::nil(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn applies_captain_and_vice_captain_multipliers() {
        let calculator = FantasyPointCalculator::default();
        let roster = vec![
            entry(dec!(20), true, false),
            entry(dec!(10), false, true),
            entry(dec!(12), false, false),
            entry(dec!(10), false, false),
            entry(dec!(8), false, false),
        ];

        assert_eq!(calculator.team_total(&roster), dec!(85));
    }

    #[rstest]
    #[case::no_flags(vec![entry(dec!(5), false, false), entry(dec!(7), false, false)], dec!(12))]
    #[case::captain_only(vec![entry(dec!(5), true, false), entry(dec!(7), false, false)], dec!(17))]
    #[case::negative_captain(vec![entry(dec!(-3), true, false), entry(dec!(4), false, true)], dec!(0))]
    #[case::double_captain_flag(vec![entry(dec!(5), true, false), entry(dec!(7), true, false)], dec!(17))]
    #[case::empty(vec![], dec!(0))]
    fn team_total_cases(#[case] roster: Vec<RosterEntry>, #[case] expected: Decimal) {
        assert_eq!(FantasyPointCalculator::default().team_total(&roster), expected);
    }

    #[test]
    fn captain_contribution_from_three_events() {
        let calculator = FantasyPointCalculator::default();
        let rules =
            ScoringRules::new([("kill", dec!(2)), ("death", dec!(-1)), ("assist", dec!(1))])
                .unwrap();
        let captain = Uuid::new_v4();
        let ledger: Vec<MatchEvent> = ["kill", "death", "assist"]
            .iter()
            .map(|t| event(captain, t, calculator.event_points(&rules, t).unwrap()))
            .collect();

        let raw = calculator.player_points(&ledger, captain);
        assert_eq!(raw, dec!(2));
        assert_eq!(calculator.team_total(&[entry(raw, true, false)]), dec!(4));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let rules = ScoringRules::new([("kill", dec!(2))]).unwrap();
        let result = FantasyPointCalculator::default().event_points(&rules, "Teabag");
        assert!(matches!(result, Err(AppError::UnknownEventType(t)) if t == "teabag"));
    }

    #[test]
    fn rescore_uses_current_rules() {
        let calculator = FantasyPointCalculator::default();
        let player = Uuid::new_v4();
        let ledger = vec![event(player, "kill", dec!(2)), event(player, "kill", dec!(2))];
        let corrected = ScoringRules::new([("kill", dec!(3))]).unwrap();

        let rescored = calculator.rescore(&corrected, &ledger).unwrap();
        assert_eq!(calculator.player_points(&rescored, player), dec!(6));
        assert_eq!(rescored[0].id, ledger[0].id);
    }

    #[test]
    fn points_by_player_groups_ledger() {
        let calculator = FantasyPointCalculator::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let ledger = vec![
            event(a, "kill", dec!(2)),
            event(b, "death", dec!(-1)),
            event(a, "assist", dec!(1)),
        ];
        let totals = calculator.points_by_player(&ledger);
        assert_eq!(totals[&a], dec!(3));
        assert_eq!(totals[&b], dec!(-1));
    }
}
