//! # WSSI Common Library
//!
//! Shared code for the WSSI API, the alert monitor and the operator CLI:
//! - Error types
//! - Data directory and TOML configuration resolution
//! - Subscription tiers and their daily limits
//! - Analytics artifact store (the JSON files produced upstream)
//! - Threshold severity classification
//! - Stripe configuration, client and webhook signatures
//! - SQLite pool initialization

pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod severity;
pub mod stripe;
pub mod tier;
pub mod time;

pub use error::{Error, Result};
pub use severity::{Severity, Thresholds};
pub use tier::Tier;
