//! Signal pipeline — the stateful detection and execution core.
//!
//! A single consumer drains the odds event queue, resolves each event to
//! a contract, compares devigged fair value against the live Kalshi ask,
//! and fires sized limit orders through the submission channel. The same
//! loop drains the completion channel so the ledger has exactly one
//! writer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{BookMarket, OddsEvent, Side};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::StrategyConfig;
use crate::exec::{OrderCommand, OrderResult, SubmissionOutcome};
use crate::ledger::{SharedLedger, Signal};
use crate::mapper::{Contract, MarketMapper};
use crate::math;
use crate::quotes::QuoteBook;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const H2H_MARKET: &str = "h2h";
const COOLDOWN_PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Default)]
struct PipelineStats {
    events: u64,
    fires: u64,
    reversals: u64,
    unmapped: u64,
}

/// The detection loop. Owns all per-run mutable state except the price
/// cache (read-only here) and the shared ledger (written only here).
pub struct SignalPipeline {
    config: StrategyConfig,
    mapper: Arc<MarketMapper>,
    quotes: QuoteBook,
    ledger: SharedLedger,
    order_tx: mpsc::Sender<OrderCommand>,
    dry_run: bool,
    /// Last fire time per ticker, for duplicate-fire suppression.
    last_fired: HashMap<String, Instant>,
    stats: PipelineStats,
}

impl SignalPipeline {
    pub fn new(
        config: StrategyConfig,
        mapper: Arc<MarketMapper>,
        quotes: QuoteBook,
        ledger: SharedLedger,
        order_tx: mpsc::Sender<OrderCommand>,
        dry_run: bool,
    ) -> Self {
        Self {
            config,
            mapper,
            quotes,
            ledger,
            order_tx,
            dry_run,
            last_fired: HashMap::new(),
            stats: PipelineStats::default(),
        }
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Consume events until the queue closes.
    ///
    /// Dequeuing is the loop's only suspension point besides ledger lock
    /// acquisition — order I/O happens on the worker pool, never here.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<OddsEvent>,
        mut completions: mpsc::Receiver<OrderResult>,
    ) {
        info!(
            "Signal pipeline started{}",
            if self.dry_run { " (dry-run)" } else { "" }
        );

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut completions_open = true;

        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(event) => {
                            self.stats.events = self.stats.events.saturating_add(1);
                            self.handle_event(event).await;
                        }
                        None => {
                            info!("Odds event queue closed; pipeline stopping");
                            break;
                        }
                    }
                }
                maybe_result = completions.recv(), if completions_open => {
                    match maybe_result {
                        Some(result) => self.reconcile(result).await,
                        None => {
                            warn!("Completion channel closed; no further order results");
                            completions_open = false;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    self.log_heartbeat().await;
                }
            }
        }

        // Reconcile any results that already arrived before stopping.
        while let Ok(result) = completions.try_recv() {
            self.reconcile(result).await;
        }
    }

    /// Classify one event: pass, discard, or fire.
    async fn handle_event(&mut self, event: OddsEvent) {
        let Some(home_team) = event.home_team.as_deref().filter(|t| !t.is_empty()) else {
            return;
        };

        let Some(contract) = self.mapper.resolve(home_team).await else {
            self.stats.unmapped = self.stats.unmapped.saturating_add(1);
            debug!("Unmapped team: {}", home_team);
            return;
        };

        for bookmaker in &event.bookmakers {
            if !self.config.is_sharp(&bookmaker.key) {
                continue;
            }
            for market in &bookmaker.markets {
                if market.key != H2H_MARKET {
                    continue;
                }
                self.evaluate_h2h(home_team, &contract, &bookmaker.key, market)
                    .await;
            }
        }
    }

    /// Steps 5–11 for one sharp-book moneyline quote.
    async fn evaluate_h2h(
        &mut self,
        home_team: &str,
        contract: &Contract,
        book: &str,
        market: &BookMarket,
    ) {
        let ticker = contract.ticker.as_str();

        let Some(home) = market.outcomes.iter().find(|o| o.name == home_team) else {
            return;
        };
        let Some(away) = market.outcomes.iter().find(|o| o.name != home_team) else {
            return;
        };

        let (fair, _) = match math::devig_two_way(home.price, away.price) {
            Ok(pair) => pair,
            Err(e) => {
                debug!("{}: unusable odds from {}: {}", ticker, book, e);
                return;
            }
        };
        if fair <= 0.0 {
            // Degenerate market after devig — no signal.
            return;
        }

        // Never fire on a stale or unknown price.
        let Some(quote) = self
            .quotes
            .fresh(ticker, self.config.price_stale_secs)
            .await
        else {
            debug!("{}: no fresh quote", ticker);
            return;
        };
        let price_cents = quote.yes_ask;
        let market_prob = price_cents as f64 / 100.0;

        let edge = fair - market_prob;
        if edge < self.config.min_edge {
            return;
        }

        if self.on_cooldown(ticker) {
            debug!("{}: fire cooldown active", ticker);
            return;
        }

        let bankroll_cents = self.ledger.read().await.bankroll_cents();
        let payout = (1.0 - market_prob) / market_prob;
        let stake = math::kelly_stake(
            bankroll_cents as f64,
            edge,
            payout,
            self.config.kelly_multiplier,
        );
        let stake_cents = stake
            .min(self.config.max_risk_per_trade_cents as f64)
            .min(bankroll_cents as f64)
            .floor() as i64;
        let count = stake_cents / price_cents;
        if count <= 0 {
            debug!("{}: stake too small for one contract", ticker);
            return;
        }
        let notional_cents = count * price_cents;

        info!(
            "SIGNAL: {} | edge {:.2}% | fair {:.3} vs market {:.3} | {} via {}",
            ticker,
            edge * 100.0,
            fair,
            market_prob,
            home_team,
            book
        );

        if self.dry_run {
            info!("Dry-run: skipping order for {}", ticker);
            self.mark_fired(ticker);
            return;
        }

        let command = OrderCommand {
            ticker: ticker.to_string(),
            side: Side::Yes,
            count,
            price_cents,
            notional_cents,
            edge,
        };

        // Fire without waiting: the detection loop must stay hot.
        match self.order_tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("{}: order channel full; fire dropped", ticker);
                return;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("{}: order channel closed; fire dropped", ticker);
                return;
            }
        }

        self.mark_fired(ticker);
        self.stats.fires = self.stats.fires.saturating_add(1);

        // Optimistic accounting: assume the fire succeeds; a failure
        // result reverses this when it arrives.
        let signal = Signal {
            ticker: ticker.to_string(),
            edge,
            count,
            price_cents,
            notional_cents,
            at: Utc::now(),
        };
        let mut ledger = self.ledger.write().await;
        ledger.record_fire(signal);
        ledger.log(format!(
            "FIRE: {} x{} @ {}¢ (edge {:.2}%)",
            ticker,
            count,
            price_cents,
            edge * 100.0
        ));
    }

    /// Apply one submission result to the ledger.
    async fn reconcile(&mut self, result: OrderResult) {
        let command = &result.command;
        let mut ledger = self.ledger.write().await;
        match &result.outcome {
            SubmissionOutcome::Accepted { order_id } => {
                ledger.log(format!(
                    "ORDER OK: {} x{} @ {}¢ (id={})",
                    command.ticker, command.count, command.price_cents, order_id
                ));
            }
            SubmissionOutcome::Rejected { error } => {
                self.stats.reversals = self.stats.reversals.saturating_add(1);
                ledger.reverse_fire(command.notional_cents);
                ledger.log(format!(
                    "ORDER FAILED: {} — {} ({}¢ returned)",
                    command.ticker, error, command.notional_cents
                ));
                error!(
                    "Order for {} failed: {} — reversing {}¢",
                    command.ticker, error, command.notional_cents
                );
            }
        }
    }

    fn on_cooldown(&self, ticker: &str) -> bool {
        match self.last_fired.get(ticker) {
            Some(at) => at.elapsed() < Duration::from_secs(self.config.fire_cooldown_secs),
            None => false,
        }
    }

    fn mark_fired(&mut self, ticker: &str) {
        self.last_fired.insert(ticker.to_string(), Instant::now());

        // The map only grows on fires; prune expired entries once it is
        // large enough to matter.
        if self.last_fired.len() > COOLDOWN_PRUNE_THRESHOLD {
            let window = Duration::from_secs(self.config.fire_cooldown_secs);
            self.last_fired.retain(|_, at| at.elapsed() < window);
        }
    }

    async fn log_heartbeat(&mut self) {
        let bankroll = self.ledger.read().await.bankroll_cents();
        let quotes = self.quotes.len().await;
        info!(
            "HEARTBEAT: events={} fires={} reversals={} unmapped={} quotes={} bankroll={}¢",
            self.stats.events,
            self.stats.fires,
            self.stats.reversals,
            self.stats.unmapped,
            quotes,
            bankroll
        );
        self.stats = PipelineStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::new_shared_ledger;
    use common::{BookOutcome, Bookmaker, MarketInfo};
    use kalshi_client::{new_price_cache, PriceCache, PriceEntry};

    fn test_config() -> StrategyConfig {
        StrategyConfig {
            bankroll_cents: 100_000,
            min_edge: 0.05,
            kelly_multiplier: 1.0,
            max_risk_per_trade_cents: 200,
            ..StrategyConfig::default()
        }
    }

    fn chiefs_market() -> MarketInfo {
        MarketInfo {
            ticker: "CHIEFS-WIN".into(),
            title: "Kansas City Chiefs vs Las Vegas Raiders".into(),
            status: "open".into(),
            yes_bid: 43,
            yes_ask: 45,
            last_price: 44,
        }
    }

    fn chiefs_event(book: &str) -> OddsEvent {
        OddsEvent {
            home_team: Some("Kansas City Chiefs".into()),
            bookmakers: vec![Bookmaker {
                key: book.into(),
                markets: vec![BookMarket {
                    key: "h2h".into(),
                    outcomes: vec![
                        BookOutcome {
                            name: "Kansas City Chiefs".into(),
                            price: -150,
                        },
                        BookOutcome {
                            name: "Las Vegas Raiders".into(),
                            price: 130,
                        },
                    ],
                }],
            }],
        }
    }

    async fn seed_quote(cache: &PriceCache, ticker: &str, yes_ask: i64, age: Duration) {
        cache.write().await.insert(
            ticker.to_string(),
            PriceEntry {
                yes_bid: yes_ask - 2,
                yes_ask,
                last_price: yes_ask - 1,
                updated_at: Instant::now() - age,
            },
        );
    }

    async fn build_pipeline(
        config: StrategyConfig,
        dry_run: bool,
    ) -> (SignalPipeline, mpsc::Receiver<OrderCommand>) {
        let mapper = Arc::new(MarketMapper::new(config.min_match_score));
        mapper.install_catalog(vec![chiefs_market()]).await;

        let cache = new_price_cache();
        seed_quote(&cache, "CHIEFS-WIN", 45, Duration::ZERO).await;

        let ledger = new_shared_ledger(config.bankroll_cents, config.max_signal_history);
        let (order_tx, order_rx) = mpsc::channel(16);

        let pipeline = SignalPipeline::new(
            config,
            mapper,
            QuoteBook::new(cache),
            ledger,
            order_tx,
            dry_run,
        );
        (pipeline, order_rx)
    }

    #[tokio::test]
    async fn test_end_to_end_fire() {
        // -150/+130 devigs to ≈0.58 for the home side; vs a 45¢ ask the
        // edge is ≈0.13, clearing the 0.05 threshold.
        let (mut pipeline, mut order_rx) = build_pipeline(test_config(), false).await;
        let initial = pipeline.ledger().read().await.bankroll_cents();

        pipeline.handle_event(chiefs_event("pinnacle")).await;

        let command = order_rx.try_recv().expect("a fire should be dispatched");
        assert_eq!(command.ticker, "CHIEFS-WIN");
        assert_eq!(command.side, Side::Yes);
        assert!(command.count > 0);
        assert_eq!(command.price_cents, 45);
        assert!(command.edge > 0.12 && command.edge < 0.14);

        let ledger = pipeline.ledger().read().await;
        assert_eq!(
            ledger.bankroll_cents(),
            initial - command.notional_cents,
            "bankroll should be debited optimistically"
        );
        assert_eq!(ledger.recent_signals().len(), 1);
    }

    #[tokio::test]
    async fn test_no_fire_below_threshold() {
        let mut config = test_config();
        config.min_edge = 0.20;
        let (mut pipeline, mut order_rx) = build_pipeline(config, false).await;

        pipeline.handle_event(chiefs_event("pinnacle")).await;

        assert!(order_rx.try_recv().is_err());
        assert_eq!(pipeline.ledger().read().await.bankroll_cents(), 100_000);
    }

    #[tokio::test]
    async fn test_duplicate_fire_suppressed_within_cooldown() {
        let (mut pipeline, mut order_rx) = build_pipeline(test_config(), false).await;

        pipeline.handle_event(chiefs_event("pinnacle")).await;
        pipeline.handle_event(chiefs_event("pinnacle")).await;

        assert!(order_rx.try_recv().is_ok(), "first event should fire");
        assert!(
            order_rx.try_recv().is_err(),
            "second identical event within the cooldown must not fire"
        );
    }

    #[tokio::test]
    async fn test_non_sharp_book_ignored() {
        let (mut pipeline, mut order_rx) = build_pipeline(test_config(), false).await;

        pipeline.handle_event(chiefs_event("sketchybook")).await;

        assert!(order_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_home_team_discarded() {
        let (mut pipeline, mut order_rx) = build_pipeline(test_config(), false).await;

        let mut event = chiefs_event("pinnacle");
        event.home_team = None;
        pipeline.handle_event(event).await;

        assert!(order_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_fire_without_cached_price() {
        let (mut pipeline, mut order_rx) = build_pipeline(test_config(), false).await;
        pipeline.quotes.inner().write().await.clear();

        pipeline.handle_event(chiefs_event("pinnacle")).await;

        assert!(order_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_fire_on_stale_price() {
        let (mut pipeline, mut order_rx) = build_pipeline(test_config(), false).await;
        let stale = Duration::from_secs(600);
        seed_quote(pipeline.quotes.inner(), "CHIEFS-WIN", 45, stale).await;

        pipeline.handle_event(chiefs_event("pinnacle")).await;

        assert!(order_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_submission_reverses_ledger() {
        let (mut pipeline, mut order_rx) = build_pipeline(test_config(), false).await;

        pipeline.handle_event(chiefs_event("pinnacle")).await;
        let command = order_rx.try_recv().expect("fire expected");
        assert!(pipeline.ledger().read().await.bankroll_cents() < 100_000);

        pipeline
            .reconcile(OrderResult {
                command,
                outcome: SubmissionOutcome::Rejected {
                    error: "insufficient balance".into(),
                },
            })
            .await;

        assert_eq!(
            pipeline.ledger().read().await.bankroll_cents(),
            100_000,
            "a failed fire must restore the pre-fire bankroll"
        );
    }

    #[tokio::test]
    async fn test_tiny_bankroll_never_goes_negative() {
        let mut config = test_config();
        config.bankroll_cents = 40; // less than one 45¢ contract
        let (mut pipeline, mut order_rx) = build_pipeline(config, false).await;

        pipeline.handle_event(chiefs_event("pinnacle")).await;

        assert!(order_rx.try_recv().is_err(), "cannot afford a contract");
        assert_eq!(pipeline.ledger().read().await.bankroll_cents(), 40);
    }

    #[tokio::test]
    async fn test_dry_run_logs_but_does_not_fire() {
        let (mut pipeline, mut order_rx) = build_pipeline(test_config(), true).await;

        pipeline.handle_event(chiefs_event("pinnacle")).await;

        assert!(order_rx.try_recv().is_err());
        assert_eq!(pipeline.ledger().read().await.bankroll_cents(), 100_000);
    }
}
