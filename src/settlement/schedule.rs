use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("Contest has no prize schedule")]
    Missing,

    #[error("Prize schedule is malformed: {0}")]
    Malformed(String),

    #[error("Invalid rank range {from}-{to}")]
    InvalidRange { from: u32, to: u32 },

    #[error("Rank {0} is covered by more than one tier")]
    Overlap(u32),

    #[error("Tier {from}-{to} must set exactly one of percentage or amount")]
    AmbiguousShare { from: u32, to: u32 },

    #[error("Tier {from}-{to} has a negative share")]
    NegativeShare { from: u32, to: u32 },

    #[error("Percentages total {0}%, above 100%")]
    PercentageOverflow(Decimal),

    #[error("Schedule pays {total}, above the prize pool of {pool}")]
    ExceedsPool { total: Decimal, pool: Decimal },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScheduleDocument {
    Versioned(VersionedSchedule),
    /// `{"1": 50, "2-5": 10}`: rank or rank range to per-rank percentage
    Legacy(HashMap<String, Decimal>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "version", rename_all = "lowercase")]
enum VersionedSchedule {
    V1 { tiers: Vec<TierDocument> },
}

#[derive(Debug, Deserialize)]
struct TierDocument {
    from: u32,
    to: u32,
    percentage: Option<Decimal>,
    amount: Option<Decimal>,
}

/// What each rank inside a tier receives
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Share {
    /// Percent of the prize pool, per rank
    Percentage(Decimal),
    /// Fixed amount, per rank
    Amount(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tier {
    pub from: u32,
    pub to: u32,
    pub share: Share,
}

impl Tier {
    fn width(&self) -> Decimal {
        Decimal::from(self.to - self.from + 1)
    }
}

/// Validated rank → prize table for one contest
#[derive(Debug, Clone, PartialEq)]
pub struct PrizeSchedule {
    tiers: Vec<Tier>,
}

/// Money is kept to cents and never rounded up
pub fn truncate_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

impl PrizeSchedule {
    pub fn new(mut tiers: Vec<Tier>, pool: Decimal) -> Result<Self, ScheduleError> {
        tiers.sort_by_key(|t| t.from);

        let mut last_to = 0;
        let mut percentage_total = Decimal::ZERO;
        let mut amount_total = Decimal::ZERO;
        for tier in &tiers {
            if tier.from == 0 || tier.from > tier.to {
                return Err(ScheduleError::InvalidRange {
                    from: tier.from,
                    to: tier.to,
                });
            }
            if tier.from <= last_to {
                return Err(ScheduleError::Overlap(tier.from));
            }
            last_to = tier.to;

            match tier.share {
                Share::Percentage(p) | Share::Amount(p) if p.is_sign_negative() => {
                    return Err(ScheduleError::NegativeShare {
                        from: tier.from,
                        to: tier.to,
                    })
                }
                Share::Percentage(p) => percentage_total += p * tier.width(),
                Share::Amount(a) => amount_total += a * tier.width(),
            }
        }

        if percentage_total > dec!(100) {
            return Err(ScheduleError::PercentageOverflow(percentage_total));
        }
        let total = truncate_money(pool * percentage_total / dec!(100)) + amount_total;
        if total > pool {
            return Err(ScheduleError::ExceedsPool { total, pool });
        }

        Ok(Self { tiers })
    }

    /// Parses a contest's raw schedule document and validates it against its pool
    pub fn parse(raw: Option<&serde_json::Value>, pool: Decimal) -> Result<Self, ScheduleError> {
        let raw = raw.filter(|v| !v.is_null()).ok_or(ScheduleError::Missing)?;
        let document: ScheduleDocument = serde_json::from_value(raw.clone())
            .map_err(|e| ScheduleError::Malformed(e.to_string()))?;

        let tiers = match document {
            ScheduleDocument::Versioned(VersionedSchedule::V1 { tiers }) => tiers
                .into_iter()
                .map(|t| {
                    let share = match (t.percentage, t.amount) {
                        (Some(p), None) => Share::Percentage(p),
                        (None, Some(a)) => Share::Amount(a),
                        _ => {
                            return Err(ScheduleError::AmbiguousShare {
                                from: t.from,
                                to: t.to,
                            })
                        }
                    };
                    Ok(Tier {
                        from: t.from,
                        to: t.to,
                        share,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            ScheduleDocument::Legacy(map) => map
                .into_iter()
                .map(|(key, percentage)| {
                    let (from, to) = parse_rank_key(&key)?;
                    Ok(Tier {
                        from,
                        to,
                        share: Share::Percentage(percentage),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        if tiers.is_empty() {
            return Err(ScheduleError::Malformed("schedule has no tiers".to_string()));
        }
        Self::new(tiers, pool)
    }

    /// Percentage split for ranks 1..=n, used when a contest's own schedule is unusable
    pub fn fallback(split: &[Decimal]) -> Self {
        Self {
            tiers: split
                .iter()
                .enumerate()
                .map(|(i, p)| Tier {
                    from: i as u32 + 1,
                    to: i as u32 + 1,
                    share: Share::Percentage(*p),
                })
                .collect(),
        }
    }

    /// Prize for finishing position `position` with no ties involved
    pub fn prize_for_position(&self, position: u32, pool: Decimal) -> Decimal {
        match self
            .tiers
            .iter()
            .find(|t| t.from <= position && position <= t.to)
            .map(|t| t.share)
        {
            Some(Share::Percentage(p)) => truncate_money(pool * p / dec!(100)),
            Some(Share::Amount(a)) => truncate_money(a),
            None => Decimal::ZERO,
        }
    }

    /// Amount for each entry of `ranks` (competition ranks, one per participant).
    ///
    /// A group of `k` participants sharing rank `r` occupies positions `r..r+k`; the
    /// prizes for those positions are pooled and split equally, truncated to cents, so
    /// the sum handed out never exceeds what the schedule would pay without ties.
    pub fn allocate(&self, ranks: &[i32], pool: Decimal) -> Vec<Decimal> {
        let mut group_sizes: HashMap<i32, u32> = HashMap::new();
        for rank in ranks {
            *group_sizes.entry(*rank).or_default() += 1;
        }

        let mut group_shares: HashMap<i32, Decimal> = HashMap::new();
        for (&rank, &size) in &group_sizes {
            if rank < 1 {
                continue;
            }
            let first = rank as u32;
            let pooled: Decimal = (first..first + size)
                .map(|position| self.prize_for_position(position, pool))
                .sum();
            group_shares.insert(rank, truncate_money(pooled / Decimal::from(size)));
        }

        ranks
            .iter()
            .map(|rank| group_shares.get(rank).copied().unwrap_or_default())
            .collect()
    }
}

fn parse_rank_key(key: &str) -> Result<(u32, u32), ScheduleError> {
    let malformed = || ScheduleError::Malformed(format!("invalid rank key '{}'", key));
    match key.split_once('-') {
        Some((from, to)) => Ok((
            from.trim().parse().map_err(|_| malformed())?,
            to.trim().parse().map_err(|_| malformed())?,
        )),
        None => {
            let rank = key.trim().parse().map_err(|_| malformed())?;
            Ok((rank, rank))
        }
    }
}
