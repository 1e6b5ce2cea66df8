//! WebSocket client for the odds-API feed.
//!
//! Streams game-odds payloads and forwards each parseable `OddsEvent`
//! into a bounded queue. Malformed payloads are dropped and logged —
//! never surfaced to the consumer. Endpoint can be overridden with
//! `ODDS_WS_URL`.

use std::error::Error as StdError;
use std::time::Duration;

use common::OddsEvent;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite;
use tracing::{debug, error, info, warn};

const DEFAULT_ODDS_WS_URL: &str = "wss://app.oddsapi.io/ws/v1";

fn resolve_odds_ws_url() -> String {
    if let Ok(override_url) = std::env::var("ODDS_WS_URL") {
        let trimmed = override_url.trim();
        if !trimmed.is_empty() {
            info!("Using ODDS_WS_URL override");
            return trimmed.to_string();
        }
        warn!("Ignoring empty ODDS_WS_URL override");
    }
    DEFAULT_ODDS_WS_URL.to_string()
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

/// Odds feed client that maintains a persistent connection and pushes
/// normalized events into the pipeline's input queue.
pub struct OddsWsClient {
    url: String,
    host: String,
}

impl OddsWsClient {
    /// Build a client for the configured feed URL.
    ///
    /// The API key is trimmed (stray whitespace from copy-paste is a
    /// recurring support issue) and attached as the `apiKey` query
    /// parameter unless the URL already carries one.
    pub fn new(api_key: &str) -> Result<Self, common::Error> {
        let raw = resolve_odds_ws_url();
        let mut url = url::Url::parse(&raw)
            .map_err(|e| common::Error::Config(format!("Invalid odds WS URL: {e}")))?;

        let clean_key = api_key.trim();
        let has_key = url.query_pairs().any(|(k, _)| k == "apiKey");
        if !clean_key.is_empty() && !has_key {
            url.query_pairs_mut().append_pair("apiKey", clean_key);
        }

        let host = url.host_str().unwrap_or("odds feed").to_string();

        Ok(Self {
            url: url.into(),
            host,
        })
    }

    /// Run the feed loop, auto-reconnecting on failure.
    ///
    /// Terminates on two conditions only: the consumer side of the queue
    /// is gone, or the server rejects the handshake with 401 (credential
    /// problem — retrying would just hammer the server).
    pub async fn run(&self, tx: mpsc::Sender<OddsEvent>) {
        let mut backoff = Duration::from_secs(5);

        loop {
            info!("Connecting to odds feed: {}", self.host);

            match self.connect_and_stream(&tx).await {
                Ok(()) => {
                    info!("Odds feed connection closed");
                    backoff = Duration::from_secs(5);
                }
                Err(FeedError::Unauthorized) => {
                    error!(
                        "Odds feed rejected credentials (401). \
                         Check ODDS_API_KEY and that the plan includes WebSocket access."
                    );
                    return;
                }
                Err(FeedError::Transport(msg)) => {
                    warn!("Odds feed error: {}. Reconnecting in {:?}", msg, backoff);
                }
            }

            if tx.is_closed() {
                info!("Odds event queue closed; stopping feed");
                return;
            }

            sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(60));
        }
    }

    async fn connect_and_stream(&self, tx: &mpsc::Sender<OddsEvent>) -> Result<(), FeedError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| match &e {
                tungstenite::Error::Http(resp) if resp.status().as_u16() == 401 => {
                    FeedError::Unauthorized
                }
                _ => FeedError::Transport(format_error_chain(&e)),
            })?;

        info!("Odds feed connected");

        let (mut write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            match msg {
                Ok(tungstenite::Message::Text(text)) => {
                    let event: OddsEvent = match serde_json::from_str(&text) {
                        Ok(e) => e,
                        Err(e) => {
                            debug!(
                                "Dropping malformed odds payload: {} — raw: {}",
                                e,
                                &text[..text.len().min(200)]
                            );
                            continue;
                        }
                    };

                    // Blocks when the queue is full — backpressure onto
                    // the socket rather than unbounded buffering.
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(tungstenite::Message::Ping(data)) => {
                    let _ = write.send(tungstenite::Message::Pong(data)).await;
                }
                Ok(tungstenite::Message::Close(_)) => {
                    info!("Odds feed close frame received");
                    break;
                }
                Err(e) => {
                    return Err(FeedError::Transport(format_error_chain(&e)));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

enum FeedError {
    /// 401 on handshake — do not reconnect.
    Unauthorized,
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odds_event_parses_feed_payload() {
        let raw = r#"{
            "home_team": "Kansas City Chiefs",
            "away_team": "Las Vegas Raiders",
            "commence_time": "2026-01-11T18:00:00Z",
            "bookmakers": [
                {
                    "key": "pinnacle",
                    "title": "Pinnacle",
                    "markets": [
                        {
                            "key": "h2h",
                            "outcomes": [
                                {"name": "Kansas City Chiefs", "price": -150},
                                {"name": "Las Vegas Raiders", "price": 130}
                            ]
                        }
                    ]
                }
            ]
        }"#;

        let event: OddsEvent = serde_json::from_str(raw).expect("payload should parse");
        assert_eq!(event.home_team.as_deref(), Some("Kansas City Chiefs"));
        assert_eq!(event.bookmakers.len(), 1);
        assert_eq!(event.bookmakers[0].markets[0].outcomes[0].price, -150);
    }

    #[test]
    fn test_odds_event_tolerates_missing_fields() {
        let event: OddsEvent = serde_json::from_str("{}").expect("empty object should parse");
        assert!(event.home_team.is_none());
        assert!(event.bookmakers.is_empty());
    }
}
