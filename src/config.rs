use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::time::Duration;

use crate::shared::AppError;

/// Process-wide configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub scoring_rules_path: Option<String>,
    pub connections: ConnectionConfig,
    pub scoring: ScoringConfig,
    pub settlement: SettlementConfig,
}

/// Configuration for viewer connections and the liveness sweep
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How often the server pings viewers and sweeps dead connections
    pub ping_interval: Duration,
    /// How long a connection may stay silent before it is reclaimed
    pub liveness_timeout: Duration,
    /// Bounded outbound queue per viewer; a full queue marks the viewer unresponsive
    pub outbound_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            liveness_timeout: Duration::from_secs(2 * 60),
            outbound_capacity: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub captain_multiplier: Decimal,
    pub vice_captain_multiplier: Decimal,
    pub dashboard_recent_events: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            captain_multiplier: dec!(2.0),
            vice_captain_multiplier: dec!(1.5),
            dashboard_recent_events: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Percentages for ranks 1..=n used when a contest's schedule is missing or malformed
    pub fallback_split: Vec<Decimal>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            fallback_split: vec![dec!(50), dec!(30), dec!(10)],
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = ConnectionConfig::default();
        let connections = ConnectionConfig {
            ping_interval: Duration::from_secs(env_parse(
                "WS_PING_INTERVAL_SECS",
                defaults.ping_interval.as_secs(),
            )?),
            liveness_timeout: Duration::from_secs(env_parse(
                "WS_LIVENESS_TIMEOUT_SECS",
                defaults.liveness_timeout.as_secs(),
            )?),
            outbound_capacity: env_parse("WS_OUTBOUND_CAPACITY", defaults.outbound_capacity)?,
        };
        if connections.outbound_capacity == 0 {
            return Err(AppError::Configuration(
                "WS_OUTBOUND_CAPACITY must be positive".to_string(),
            ));
        }

        let scoring_defaults = ScoringConfig::default();
        let scoring = ScoringConfig {
            captain_multiplier: env_parse(
                "CAPTAIN_MULTIPLIER",
                scoring_defaults.captain_multiplier,
            )?,
            vice_captain_multiplier: env_parse(
                "VICE_CAPTAIN_MULTIPLIER",
                scoring_defaults.vice_captain_multiplier,
            )?,
            dashboard_recent_events: env_parse(
                "DASHBOARD_RECENT_EVENTS",
                scoring_defaults.dashboard_recent_events,
            )?,
        };

        let settlement = match std::env::var("FALLBACK_PRIZE_SPLIT") {
            Ok(raw) => SettlementConfig {
                fallback_split: parse_split(&raw)?,
            },
            Err(_) => SettlementConfig::default(),
        };

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            jwt_secret: std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| "your-secret-key-change-in-production".to_string()),
            scoring_rules_path: std::env::var("SCORING_RULES_PATH").ok(),
            connections,
            scoring,
            settlement,
        })
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Configuration(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

/// Parses a comma-separated percentage list such as `50,30,10`
pub fn parse_split(raw: &str) -> Result<Vec<Decimal>, AppError> {
    let split = raw
        .split(',')
        .map(|part| {
            Decimal::from_str(part.trim()).map_err(|_| {
                AppError::Configuration(format!("Invalid fallback prize percentage '{}'", part))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if split.iter().any(|p| p.is_sign_negative()) {
        return Err(AppError::Configuration(
            "Fallback prize percentages must not be negative".to_string(),
        ));
    }
    let total: Decimal = split.iter().sum();
    if total > dec!(100) {
        return Err(AppError::Configuration(format!(
            "Fallback prize split totals {}%, above 100%",
            total
        )));
    }
    Ok(split)
}
