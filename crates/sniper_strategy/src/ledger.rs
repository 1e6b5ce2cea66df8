//! Ledger — bankroll accounting and bounded recent-history windows.
//!
//! Single-writer: only the pipeline task mutates the ledger. Readers
//! (heartbeat, any dashboard collaborator) take cheap cloned snapshots
//! through the shared lock.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

const MAX_LOG_LINES: usize = 10;

/// An immutable record of a fire decision.
#[derive(Debug, Clone)]
pub struct Signal {
    pub ticker: String,
    /// Fair probability minus market probability at fire time.
    pub edge: f64,
    pub count: i64,
    pub price_cents: i64,
    pub notional_cents: i64,
    pub at: DateTime<Utc>,
}

/// Bankroll plus recent signals and log lines.
#[derive(Debug)]
pub struct Ledger {
    bankroll_cents: i64,
    signals: VecDeque<Signal>,
    logs: VecDeque<String>,
    max_signals: usize,
}

impl Ledger {
    pub fn new(bankroll_cents: i64, max_signals: usize) -> Self {
        Self {
            bankroll_cents,
            signals: VecDeque::new(),
            logs: VecDeque::new(),
            max_signals: max_signals.max(1),
        }
    }

    pub fn bankroll_cents(&self) -> i64 {
        self.bankroll_cents
    }

    /// Append a log line, keeping only the most recent window.
    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push_back(message.into());
        while self.logs.len() > MAX_LOG_LINES {
            self.logs.pop_front();
        }
    }

    /// Record a fire: optimistically debit the notional and append the
    /// signal. The caller must have clamped sizing to the bankroll.
    pub fn record_fire(&mut self, signal: Signal) {
        self.bankroll_cents -= signal.notional_cents;
        debug!(
            "Ledger debit: {}¢ for {} (bankroll now {}¢)",
            signal.notional_cents, signal.ticker, self.bankroll_cents
        );
        self.signals.push_back(signal);
        while self.signals.len() > self.max_signals {
            self.signals.pop_front();
        }
    }

    /// Reverse an optimistic debit after a failed submission.
    pub fn reverse_fire(&mut self, notional_cents: i64) {
        self.bankroll_cents += notional_cents;
        debug!(
            "Ledger reversal: +{}¢ (bankroll now {}¢)",
            notional_cents, self.bankroll_cents
        );
    }

    pub fn recent_signals(&self) -> Vec<Signal> {
        self.signals.iter().cloned().collect()
    }

    pub fn recent_logs(&self) -> Vec<String> {
        self.logs.iter().cloned().collect()
    }
}

/// Ledger behind the shared lock. Written only by the pipeline task.
pub type SharedLedger = Arc<RwLock<Ledger>>;

pub fn new_shared_ledger(bankroll_cents: i64, max_signals: usize) -> SharedLedger {
    Arc::new(RwLock::new(Ledger::new(bankroll_cents, max_signals)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_signal(ticker: &str, notional: i64) -> Signal {
        Signal {
            ticker: ticker.into(),
            edge: 0.1,
            count: notional / 45,
            price_cents: 45,
            notional_cents: notional,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_fire_then_reversal_restores_bankroll() {
        let mut ledger = Ledger::new(2_600, 10);
        ledger.record_fire(make_signal("CHIEFS-WIN", 180));
        assert_eq!(ledger.bankroll_cents(), 2_420);

        ledger.reverse_fire(180);
        assert_eq!(ledger.bankroll_cents(), 2_600);
    }

    #[test]
    fn test_signal_history_is_bounded() {
        let mut ledger = Ledger::new(100_000, 5);
        for i in 0..12 {
            ledger.record_fire(make_signal(&format!("MKT-{}", i), 45));
        }
        let signals = ledger.recent_signals();
        assert_eq!(signals.len(), 5);
        assert_eq!(signals[0].ticker, "MKT-7");
        assert_eq!(signals[4].ticker, "MKT-11");
    }

    #[test]
    fn test_log_window_is_bounded() {
        let mut ledger = Ledger::new(1_000, 10);
        for i in 0..25 {
            ledger.log(format!("line {}", i));
        }
        let logs = ledger.recent_logs();
        assert_eq!(logs.len(), MAX_LOG_LINES);
        assert_eq!(logs.last().unwrap(), "line 24");
    }
}
