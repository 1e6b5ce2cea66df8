//! Sportsbook odds feed client.
//!
//! Streams normalized odds events from the odds-API WebSocket into the
//! signal pipeline's input queue.

pub mod ws;

pub use ws::OddsWsClient;
