//! Domain types shared across the bot.

use serde::{Deserialize, Serialize};

// ── Kalshi Market Types ───────────────────────────────────────────────

/// A Kalshi market as returned by GET /trade-api/v2/markets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub yes_bid: i64,
    #[serde(default)]
    pub yes_ask: i64,
    #[serde(default)]
    pub last_price: i64,
}

/// Paginated response from GET /trade-api/v2/markets.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsResponse {
    pub markets: Vec<MarketInfo>,
    #[serde(default)]
    pub cursor: Option<String>,
}

// ── Odds Feed Types ───────────────────────────────────────────────────

/// One normalized message from the sportsbook odds feed.
///
/// The feed emits one event per game, carrying the current odds from
/// every bookmaker the subscription covers.
#[derive(Debug, Clone, Deserialize)]
pub struct OddsEvent {
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

/// One bookmaker's odds within an odds event.
#[derive(Debug, Clone, Deserialize)]
pub struct Bookmaker {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub markets: Vec<BookMarket>,
}

/// A bet market (e.g. `h2h` moneyline) offered by a bookmaker.
#[derive(Debug, Clone, Deserialize)]
pub struct BookMarket {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<BookOutcome>,
}

/// A single outcome with its American odds.
#[derive(Debug, Clone, Deserialize)]
pub struct BookOutcome {
    #[serde(default)]
    pub name: String,
    /// American odds, e.g. -150 or +130.
    #[serde(default)]
    pub price: i64,
}

// ── Order Types ───────────────────────────────────────────────────────

/// An order to be placed.
#[derive(Debug, Clone, Serialize)]
pub struct OrderIntent {
    /// Market ticker.
    pub ticker: String,
    /// "yes" or "no".
    pub side: Side,
    /// "buy" or "sell".
    pub action: Action,
    /// Limit price in cents (1-99).
    pub price_cents: i64,
    /// Number of contracts.
    pub count: i64,
    /// Reason for the trade (for logging).
    pub reason: String,
}

/// Order request body for the Kalshi API.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub ticker: String,
    pub side: Side,
    pub action: Action,
    pub client_order_id: String,
    pub count: i64,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yes_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_price: Option<i64>,
}

/// Response from POST /trade-api/v2/portfolio/orders.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderResponse {
    pub order: OrderInfo,
}

/// An order as returned by the Kalshi API.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderInfo {
    pub order_id: String,
    pub ticker: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub fill_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Limit,
    Market,
}

/// Balance response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Balance in cents.
    pub balance: i64,
}

// ── WebSocket Types ───────────────────────────────────────────────────

/// A WebSocket subscribe command.
#[derive(Debug, Serialize)]
pub struct WsSubscribeCmd {
    pub id: u64,
    pub cmd: String,
    pub params: WsSubscribeParams,
}

#[derive(Debug, Serialize)]
pub struct WsSubscribeParams {
    pub channels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_tickers: Option<Vec<String>>,
}

/// A ticker update message from the WebSocket.
#[derive(Debug, Clone, Deserialize)]
pub struct WsTickerMessage {
    #[serde(default)]
    pub market_ticker: String,
    #[serde(default)]
    pub yes_bid: i64,
    #[serde(default)]
    pub yes_ask: i64,
    #[serde(default)]
    pub last_price: i64,
}

/// A fill confirmation message from the WebSocket.
#[derive(Debug, Clone, Deserialize)]
pub struct WsFillMessage {
    #[serde(default)]
    pub market_ticker: String,
    #[serde(default)]
    pub count: i64,
}

/// Generic WebSocket message envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub msg: Option<serde_json::Value>,
    pub id: Option<u64>,
}
