//! Sniper strategy crate.
//!
//! Turns streaming sportsbook odds into Kalshi limit orders: fuzzy
//! contract resolution, devigged fair-value math, Kelly sizing, and the
//! single-consumer signal pipeline with its submission worker pool.

pub mod config;
pub mod exec;
pub mod ledger;
pub mod mapper;
pub mod math;
pub mod pipeline;
pub mod quotes;

pub use config::{RuntimeConfig, StrategyConfig};
pub use exec::{spawn_submission_workers, OrderCommand, OrderResult, SubmissionOutcome};
pub use ledger::{new_shared_ledger, Ledger, SharedLedger, Signal};
pub use mapper::{Contract, MarketMapper};
pub use pipeline::SignalPipeline;
pub use quotes::QuoteBook;
