//! Configuration structs for the sniper strategy.

use common::Error;
use serde::{Deserialize, Serialize};

/// Strategy thresholds and sizing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Starting bankroll in cents.
    #[serde(default = "default_bankroll")]
    pub bankroll_cents: i64,

    /// Minimum edge (fair probability minus market probability) to fire.
    #[serde(default = "default_min_edge")]
    pub min_edge: f64,

    /// Fraction-of-Kelly risk throttle, must be in (0, 1].
    #[serde(default = "default_kelly_multiplier")]
    pub kelly_multiplier: f64,

    /// Hard cap on the notional of a single fire, in cents.
    #[serde(default = "default_max_risk")]
    pub max_risk_per_trade_cents: i64,

    /// Bookmakers whose odds count as a fair-value reference.
    #[serde(default = "default_sharp_books")]
    pub sharp_books: Vec<String>,

    /// Minimum fuzzy-match score (0-100) for contract resolution.
    #[serde(default = "default_min_match_score")]
    pub min_match_score: u32,

    /// Do not re-fire on the same ticker within this window.
    #[serde(default = "default_fire_cooldown")]
    pub fire_cooldown_secs: u64,

    /// Max age for a cached quote before it is considered stale.
    #[serde(default = "default_price_stale")]
    pub price_stale_secs: u64,

    /// How many recent signals the ledger keeps for observability.
    #[serde(default = "default_max_signal_history")]
    pub max_signal_history: usize,
}

/// Queue, worker-pool, and refresh tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Capacity of the odds event queue (feed blocks when full).
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Capacity of the order command and completion channels.
    #[serde(default = "default_order_queue_capacity")]
    pub order_queue_capacity: usize,

    /// Number of order submission workers.
    #[serde(default = "default_submission_workers")]
    pub submission_workers: usize,

    /// How often to reload the contract catalog.
    #[serde(default = "default_catalog_refresh")]
    pub catalog_refresh_secs: u64,
}

impl StrategyConfig {
    /// Whether a bookmaker key is on the sharp allow-list.
    pub fn is_sharp(&self, key: &str) -> bool {
        self.sharp_books.iter().any(|b| b.eq_ignore_ascii_case(key))
    }

    /// Validate ranges that the math depends on.
    pub fn validate(&self) -> Result<(), Error> {
        if self.bankroll_cents <= 0 {
            return Err(Error::Config(format!(
                "bankroll_cents must be positive, got {}",
                self.bankroll_cents
            )));
        }
        if !(self.kelly_multiplier > 0.0 && self.kelly_multiplier <= 1.0) {
            return Err(Error::Config(format!(
                "kelly_multiplier must be in (0, 1], got {}",
                self.kelly_multiplier
            )));
        }
        if !self.min_edge.is_finite() || self.min_edge < 0.0 {
            return Err(Error::Config(format!(
                "min_edge must be a non-negative number, got {}",
                self.min_edge
            )));
        }
        if self.min_match_score > 100 {
            return Err(Error::Config(format!(
                "min_match_score must be at most 100, got {}",
                self.min_match_score
            )));
        }
        if self.sharp_books.is_empty() {
            return Err(Error::Config(
                "sharp_books must list at least one reference bookmaker".into(),
            ));
        }
        Ok(())
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_bankroll() -> i64 {
    2_600
}
fn default_min_edge() -> f64 {
    0.02
}
fn default_kelly_multiplier() -> f64 {
    0.15
}
fn default_max_risk() -> i64 {
    200
}
fn default_sharp_books() -> Vec<String> {
    vec!["draftkings".into(), "fanduel".into(), "pinnacle".into()]
}
fn default_min_match_score() -> u32 {
    80
}
fn default_fire_cooldown() -> u64 {
    30
}
fn default_price_stale() -> u64 {
    300
}
fn default_max_signal_history() -> usize {
    10
}
fn default_event_queue_capacity() -> usize {
    256
}
fn default_order_queue_capacity() -> usize {
    64
}
fn default_submission_workers() -> usize {
    2
}
fn default_catalog_refresh() -> u64 {
    900
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            bankroll_cents: default_bankroll(),
            min_edge: default_min_edge(),
            kelly_multiplier: default_kelly_multiplier(),
            max_risk_per_trade_cents: default_max_risk(),
            sharp_books: default_sharp_books(),
            min_match_score: default_min_match_score(),
            fire_cooldown_secs: default_fire_cooldown(),
            price_stale_secs: default_price_stale(),
            max_signal_history: default_max_signal_history(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: default_event_queue_capacity(),
            order_queue_capacity: default_order_queue_capacity(),
            submission_workers: default_submission_workers(),
            catalog_refresh_secs: default_catalog_refresh(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(StrategyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_kelly_multiplier_bounds() {
        let mut cfg = StrategyConfig::default();
        cfg.kelly_multiplier = 0.0;
        assert!(cfg.validate().is_err());
        cfg.kelly_multiplier = 1.5;
        assert!(cfg.validate().is_err());
        cfg.kelly_multiplier = 1.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_sharp_book_match_is_case_insensitive() {
        let cfg = StrategyConfig::default();
        assert!(cfg.is_sharp("Pinnacle"));
        assert!(cfg.is_sharp("draftkings"));
        assert!(!cfg.is_sharp("sketchybook"));
    }
}
