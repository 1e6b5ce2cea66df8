//! WebSocket client for the Kalshi ticker and fill feeds.
//!
//! Connects to `wss://api.elections.kalshi.com/trade-api/ws/v2` (or the demo
//! equivalent), subscribes to the `ticker` and `fill` channels, and streams
//! price updates into a shared `PriceCache`. Endpoint can be overridden with
//! `KALSHI_WS_URL`.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{WsFillMessage, WsMessage, WsSubscribeCmd, WsSubscribeParams, WsTickerMessage};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite;
use tracing::{debug, error, info, warn};

use crate::auth::KalshiAuth;

const DEMO_WS_URL: &str = "wss://demo-api.kalshi.co/trade-api/ws/v2";
const PROD_WS_URL: &str = "wss://api.elections.kalshi.com/trade-api/ws/v2";

fn normalize_ws_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn resolve_ws_url(use_demo: bool) -> String {
    if let Ok(override_url) = std::env::var("KALSHI_WS_URL") {
        let normalized = normalize_ws_url(&override_url);
        if !normalized.is_empty() {
            info!("Using KALSHI_WS_URL override: {}", normalized);
            return normalized;
        }
        warn!("Ignoring empty KALSHI_WS_URL override");
    }

    if use_demo {
        DEMO_WS_URL.to_string()
    } else {
        PROD_WS_URL.to_string()
    }
}

fn format_error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

/// The latest quote for one market, updated by the WebSocket feed.
///
/// Last-write-wins per ticker; no history is retained.
#[derive(Debug, Clone)]
pub struct PriceEntry {
    pub yes_bid: i64,
    pub yes_ask: i64,
    pub last_price: i64,
    pub updated_at: Instant,
}

/// Thread-safe price cache — ticker → PriceEntry.
///
/// Written only by the WebSocket task; read everywhere else.
pub type PriceCache = Arc<RwLock<HashMap<String, PriceEntry>>>;

/// Create a new empty PriceCache.
pub fn new_price_cache() -> PriceCache {
    Arc::new(RwLock::new(HashMap::new()))
}

/// Kalshi WebSocket client that maintains a persistent connection
/// and updates the PriceCache on each ticker message.
pub struct KalshiWsClient {
    auth: KalshiAuth,
    ws_url: String,
    price_cache: PriceCache,
}

impl KalshiWsClient {
    pub fn new(auth: KalshiAuth, use_demo: bool, price_cache: PriceCache) -> Self {
        let ws_url = resolve_ws_url(use_demo);

        Self {
            auth,
            ws_url,
            price_cache,
        }
    }

    async fn sync_subscriptions<S>(
        write: &mut S,
        tickers: &Arc<RwLock<Vec<String>>>,
        subscribed_tickers: &mut Vec<String>,
        sub_id: &mut u64,
    ) -> Result<(), common::Error>
    where
        S: Sink<tungstenite::Message> + Unpin,
        S::Error: StdError + Send + Sync + 'static,
    {
        let latest_tickers = tickers.read().await.clone();

        if latest_tickers.is_empty() {
            if subscribed_tickers.is_empty() {
                debug!("WS subscription pending: no tickers to track yet");
            }
            return Ok(());
        }

        if *subscribed_tickers == latest_tickers {
            return Ok(());
        }

        let sub = WsSubscribeCmd {
            id: *sub_id,
            cmd: "subscribe".to_string(),
            params: WsSubscribeParams {
                channels: vec!["ticker".to_string(), "fill".to_string()],
                market_tickers: Some(latest_tickers.clone()),
            },
        };

        let sub_json = serde_json::to_string(&sub)
            .map_err(|e| common::Error::WebSocket(format_error_chain(&e)))?;

        write
            .send(tungstenite::Message::Text(sub_json))
            .await
            .map_err(|e| common::Error::WebSocket(format_error_chain(&e)))?;

        info!(
            "Subscribed to {} tickers (subscription id={})",
            latest_tickers.len(),
            *sub_id
        );

        *subscribed_tickers = latest_tickers;
        *sub_id += 1;

        Ok(())
    }

    /// Run the WebSocket event loop forever, auto-reconnecting on failure.
    ///
    /// `tickers` is a shared list of tickers to subscribe to; the caller
    /// can update it when the market catalog is reloaded.
    pub async fn run(&self, tickers: Arc<RwLock<Vec<String>>>) {
        let mut backoff = Duration::from_secs(1);

        loop {
            info!("Connecting to Kalshi WebSocket: {}", self.ws_url);

            match self.connect_and_stream(&tickers).await {
                Ok(()) => {
                    info!("WebSocket connection closed cleanly");
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    error!("WebSocket error: {}. Reconnecting in {:?}", e, backoff);
                }
            }

            sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(60));
        }
    }

    async fn connect_and_stream(
        &self,
        tickers: &Arc<RwLock<Vec<String>>>,
    ) -> Result<(), common::Error> {
        let url = url::Url::parse(&self.ws_url)
            .map_err(|e| common::Error::WebSocket(format_error_chain(&e)))?;
        let host = url.host_str().ok_or_else(|| {
            common::Error::WebSocket(format!("WebSocket URL missing host: {}", self.ws_url))
        })?;
        let host_header = if let Some(port) = url.port() {
            format!("{}:{}", host, port)
        } else {
            host.to_string()
        };

        let path_to_sign = {
            let p = url.path();
            if p.is_empty() {
                "/"
            } else {
                p
            }
        };

        let (timestamp, signature) = self.auth.sign_request("GET", path_to_sign);

        let request = tungstenite::http::Request::builder()
            .uri(self.ws_url.as_str())
            .header("KALSHI-ACCESS-KEY", &self.auth.api_key)
            .header("KALSHI-ACCESS-TIMESTAMP", &timestamp)
            .header("KALSHI-ACCESS-SIGNATURE", &signature)
            .header("Host", host_header)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .body(())
            .map_err(|e| common::Error::WebSocket(format_error_chain(&e)))?;

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| common::Error::WebSocket(format_error_chain(&e)))?;

        info!("WebSocket connected");

        let (mut write, mut read) = ws_stream.split();
        let mut sub_id = 1u64;
        let mut subscribed_tickers: Vec<String> = Vec::new();
        let mut subscription_poll = tokio::time::interval(Duration::from_secs(2));
        subscription_poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Process incoming messages and periodically refresh subscription targets.
        loop {
            tokio::select! {
                _ = subscription_poll.tick() => {
                    Self::sync_subscriptions(
                        &mut write,
                        tickers,
                        &mut subscribed_tickers,
                        &mut sub_id
                    ).await?;
                }
                msg_opt = read.next() => {
                    match msg_opt {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            self.handle_text_message(&text).await;
                        }
                        Some(Ok(tungstenite::Message::Ping(data))) => {
                            let _ = write.send(tungstenite::Message::Pong(data)).await;
                        }
                        Some(Ok(tungstenite::Message::Close(_))) => {
                            info!("WebSocket close frame received");
                            break;
                        }
                        Some(Err(e)) => {
                            return Err(common::Error::WebSocket(format_error_chain(&e)));
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_text_message(&self, text: &str) {
        let msg: WsMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                debug!(
                    "Failed to parse WS message: {} — raw: {}",
                    e,
                    &text[..text.len().min(200)]
                );
                return;
            }
        };

        match msg.msg_type.as_deref() {
            Some("ticker") => {
                if let Some(payload) = msg.msg {
                    match serde_json::from_value::<WsTickerMessage>(payload) {
                        Ok(ticker) => self.apply_ticker(ticker).await,
                        Err(e) => {
                            debug!("Failed to parse ticker payload: {}", e);
                        }
                    }
                }
            }
            Some("fill") => {
                if let Some(payload) = msg.msg {
                    match serde_json::from_value::<WsFillMessage>(payload) {
                        Ok(fill) => {
                            info!(
                                "Fill confirmed: {} x{}",
                                fill.market_ticker, fill.count
                            );
                        }
                        Err(e) => {
                            debug!("Failed to parse fill payload: {}", e);
                        }
                    }
                }
            }
            Some("error") => {
                warn!("WS error message: {}", text);
            }
            Some(other) => {
                debug!("WS message type '{}' (ignored)", other);
            }
            None => {
                debug!("WS message with no type: {}", &text[..text.len().min(200)]);
            }
        }
    }

    /// Apply one ticker update to the cache.
    ///
    /// Updates with a `yes_ask` outside [1, 99] are dropped — the feed
    /// contract guarantees the range, so a violation means garbage data.
    async fn apply_ticker(&self, ticker: WsTickerMessage) {
        if ticker.market_ticker.is_empty() {
            return;
        }
        if !(1..=99).contains(&ticker.yes_ask) {
            debug!(
                "Dropping out-of-range quote for {}: ask={}¢",
                ticker.market_ticker, ticker.yes_ask
            );
            return;
        }

        let mut cache = self.price_cache.write().await;
        cache.insert(
            ticker.market_ticker.clone(),
            PriceEntry {
                yes_bid: ticker.yes_bid,
                yes_ask: ticker.yes_ask,
                last_price: ticker.last_price,
                updated_at: Instant::now(),
            },
        );
        debug!(
            "Ticker: {} — bid={}¢ ask={}¢",
            ticker.market_ticker, ticker.yes_bid, ticker.yes_ask,
        );
    }
}
