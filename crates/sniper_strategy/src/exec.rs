//! Order submission workers.
//!
//! The pipeline never awaits order I/O inline. It pushes `OrderCommand`s
//! onto a bounded channel; a small worker pool submits them over REST and
//! reports an `OrderResult` on the completion channel, which the pipeline
//! drains to reconcile the ledger.

use std::sync::Arc;

use common::{Action, OrderIntent, Side};
use kalshi_client::KalshiRestClient;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A fire decision handed to the submission workers.
#[derive(Debug, Clone)]
pub struct OrderCommand {
    pub ticker: String,
    pub side: Side,
    pub count: i64,
    pub price_cents: i64,
    pub notional_cents: i64,
    pub edge: f64,
}

/// What happened to a submitted command.
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    Accepted { order_id: String },
    Rejected { error: String },
}

/// Completion report sent back to the pipeline for reconciliation.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub command: OrderCommand,
    pub outcome: SubmissionOutcome,
}

/// Spawn the submission worker pool.
///
/// Workers share the command receiver; each submits sequentially but the
/// pool submits concurrently. Handles are returned so shutdown can abort
/// and await them.
pub fn spawn_submission_workers(
    workers: usize,
    client: KalshiRestClient,
    order_rx: mpsc::Receiver<OrderCommand>,
    completion_tx: mpsc::Sender<OrderResult>,
) -> Vec<JoinHandle<()>> {
    let shared_rx = Arc::new(Mutex::new(order_rx));

    (0..workers.max(1))
        .map(|worker_id| {
            let rx = shared_rx.clone();
            let client = client.clone();
            let tx = completion_tx.clone();
            tokio::spawn(async move {
                submission_worker(worker_id, client, rx, tx).await;
            })
        })
        .collect()
}

async fn submission_worker(
    worker_id: usize,
    client: KalshiRestClient,
    order_rx: Arc<Mutex<mpsc::Receiver<OrderCommand>>>,
    completion_tx: mpsc::Sender<OrderResult>,
) {
    loop {
        // Hold the lock only while waiting for one command; submission
        // itself runs unlocked so workers overlap on the network.
        let command = { order_rx.lock().await.recv().await };
        let Some(command) = command else {
            info!("Submission worker {} stopping: command channel closed", worker_id);
            return;
        };

        let outcome = submit(&client, &command).await;
        let result = OrderResult { command, outcome };

        if completion_tx.send(result).await.is_err() {
            warn!(
                "Submission worker {} stopping: completion channel closed",
                worker_id
            );
            return;
        }
    }
}

/// Submit one command; failures become outcomes, never panics or
/// errors across the channel boundary.
async fn submit(client: &KalshiRestClient, command: &OrderCommand) -> SubmissionOutcome {
    let intent = OrderIntent {
        ticker: command.ticker.clone(),
        side: command.side,
        action: Action::Buy,
        price_cents: command.price_cents,
        count: command.count,
        reason: format!("edge {:.4}", command.edge),
    };

    match client.create_order(&intent).await {
        Ok(resp) => {
            info!(
                "Order accepted: {} x{} @ {}¢ (id={} status={})",
                command.ticker,
                command.count,
                command.price_cents,
                resp.order.order_id,
                resp.order.status
            );
            SubmissionOutcome::Accepted {
                order_id: resp.order.order_id,
            }
        }
        Err(e) => {
            error!(
                "Order submission failed: {} x{} @ {}¢ — {}",
                command.ticker, command.count, command.price_cents, e
            );
            SubmissionOutcome::Rejected {
                error: e.to_string(),
            }
        }
    }
}
