//! wssi-monitor library interface
//!
//! Watches the WSSI snapshot and raises threshold alerts over e-mail, a
//! generic JSON webhook and Discord, keeping history in `alerts.db`.

pub mod channels;
pub mod check;
pub mod config;
pub mod message;
pub mod runner;
pub mod store;

pub use channels::{Channel, Delivery, Dispatcher};
pub use check::{check_thresholds, Alert, AlertKind};
pub use config::MonitorConfig;
pub use runner::{Monitor, RunSummary};
