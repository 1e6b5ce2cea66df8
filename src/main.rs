//! Sniper Bot entry point.
//!
//! Orchestrates the tasks:
//! 1. Kalshi WebSocket → price cache (continuous)
//! 2. Catalog refresh (periodic)
//! 3. Odds WebSocket → event queue (continuous)
//! 4. Order submission worker pool
//! 5. Signal pipeline consumer (continuous)

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kalshi_client::{new_price_cache, KalshiAuth, KalshiRestClient, KalshiWsClient};
use odds_client::OddsWsClient;
use sniper_strategy::{
    new_shared_ledger, spawn_submission_workers, MarketMapper, QuoteBook, SignalPipeline,
};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

mod config;

use crate::config::load_config;

#[derive(Parser)]
struct Cli {
    /// Verify credentials against the Kalshi API, then exit.
    #[arg(long)]
    check_auth: bool,

    /// Detect and log signals without submitting orders.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sniper_bot=info,sniper_strategy=info,kalshi_client=info,odds_client=info".into()
            }),
        )
        .init();

    info!("Sniper bot starting...");

    let cli = Cli::parse();
    if cli.dry_run {
        info!("Dry-run mode enabled: signals will be logged but not executed.");
    }

    let cfg = match load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Config error: {}", e);
            return;
        }
    };
    info!(
        "Environment: {}",
        if cfg.use_demo { "DEMO" } else { "PRODUCTION" }
    );
    info!(
        "Strategy: bankroll={}¢ min_edge={} kelly_multiplier={} max_risk={}¢ cooldown={}s min_match_score={}",
        cfg.strategy.bankroll_cents,
        cfg.strategy.min_edge,
        cfg.strategy.kelly_multiplier,
        cfg.strategy.max_risk_per_trade_cents,
        cfg.strategy.fire_cooldown_secs,
        cfg.strategy.min_match_score
    );

    let auth = match KalshiAuth::new(&cfg.kalshi_api_key, &cfg.kalshi_secret_key) {
        Ok(a) => a,
        Err(e) => {
            error!("Auth init failed: {}", e);
            return;
        }
    };

    let rest_client = KalshiRestClient::new(auth.clone(), cfg.use_demo);

    // Auth check.
    if cli.check_auth {
        match rest_client.get_balance().await {
            Ok(bal) => info!("Auth valid. Balance: {}¢", bal),
            Err(e) => error!("Auth failed: {}", e),
        }
        return;
    }

    // Load the contract catalog once. A failure here is fatal — the
    // pipeline cannot resolve anything without it.
    let mapper = Arc::new(MarketMapper::new(cfg.strategy.min_match_score));
    match mapper.load(&rest_client).await {
        Ok(count) => info!("Market catalog loaded: {} contracts", count),
        Err(e) => {
            error!("Catalog load failed: {}", e);
            return;
        }
    }

    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();

    // Task 1: Kalshi WebSocket → price cache.
    let price_cache = new_price_cache();
    let tickers = Arc::new(RwLock::new(mapper.tickers().await));
    let ws_client = KalshiWsClient::new(auth.clone(), cfg.use_demo, price_cache.clone());
    let ws_tickers = tickers.clone();
    task_handles.push(tokio::spawn(async move {
        ws_client.run(ws_tickers).await;
    }));

    // Task 2: periodic catalog refresh keeps the mapper index and the
    // WS subscription list current as markets open and close.
    let refresh_mapper = mapper.clone();
    let refresh_client = rest_client.clone();
    let refresh_tickers = tickers.clone();
    let refresh_secs = cfg.runtime.catalog_refresh_secs.max(60);
    task_handles.push(tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(refresh_secs)).await;
            match refresh_mapper.reload(&refresh_client).await {
                Ok(count) => {
                    *refresh_tickers.write().await = refresh_mapper.tickers().await;
                    info!("Catalog refreshed: {} contracts", count);
                }
                Err(e) => warn!("Catalog refresh failed: {}", e),
            }
        }
    }));

    // Task 3: Odds feed → bounded event queue.
    let (event_tx, event_rx) = mpsc::channel(cfg.runtime.event_queue_capacity.max(1));
    let odds_client = match OddsWsClient::new(&cfg.odds_api_key) {
        Ok(c) => c,
        Err(e) => {
            error!("Odds feed init failed: {}", e);
            return;
        }
    };
    task_handles.push(tokio::spawn(async move {
        odds_client.run(event_tx).await;
    }));

    // Task 4: Submission worker pool.
    let (order_tx, order_rx) = mpsc::channel(cfg.runtime.order_queue_capacity.max(1));
    let (completion_tx, completion_rx) = mpsc::channel(cfg.runtime.order_queue_capacity.max(1));
    task_handles.extend(spawn_submission_workers(
        cfg.runtime.submission_workers,
        rest_client.clone(),
        order_rx,
        completion_tx,
    ));

    // Task 5: the signal pipeline itself.
    let ledger = new_shared_ledger(
        cfg.strategy.bankroll_cents,
        cfg.strategy.max_signal_history,
    );
    let pipeline = SignalPipeline::new(
        cfg.strategy.clone(),
        mapper.clone(),
        QuoteBook::new(price_cache.clone()),
        ledger.clone(),
        order_tx,
        cli.dry_run,
    );
    let mut pipeline_task = tokio::spawn(pipeline.run(event_rx, completion_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            pipeline_task.abort();
            let _ = pipeline_task.await;
        }
        res = &mut pipeline_task => {
            match res {
                Ok(()) => warn!("Pipeline exited"),
                Err(e) => error!("Pipeline task failed: {}", e),
            }
        }
    }

    // Cancel everything and await with cancellation errors suppressed.
    // In-flight order submissions are abandoned rather than blocking
    // shutdown on their results.
    for handle in &task_handles {
        handle.abort();
    }
    for handle in task_handles {
        let _ = handle.await;
    }

    let bankroll = ledger.read().await.bankroll_cents();
    info!("Sniper bot stopped. Final bankroll: {}¢", bankroll);
}
