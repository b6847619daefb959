// src/lib.rs
pub mod auth;
pub mod config;
pub mod error;
pub mod finnhub;
pub mod models;
pub mod portfolio;
pub mod rate_limiter;
pub mod scheduler;
pub mod store;
pub mod watchlist;

// Re-export commonly used items
pub use error::{ErrorKind, ErrorNotice, Result, TrackerError};
pub use finnhub::{FinnhubClient, QuoteSource};
pub use models::*;
pub use portfolio::{aggregate, QuoteMap};
pub use rate_limiter::RateLimiter;
pub use scheduler::{CycleState, RefreshScheduler, SchedulerConfig, SchedulerEvent};
pub use store::{HoldingsStore, HttpHoldingsStore};
pub use watchlist::Watchlist;
