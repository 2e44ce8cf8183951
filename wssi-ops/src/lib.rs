//! wssi-ops library interface
//!
//! Operator commands against a running WSSI API and the Stripe account
//! behind it. Every command prints a marker-delimited report on stdout and
//! maps its outcome to an exit status (see [`commands::Exit`]).

pub mod client;
pub mod commands;

pub use client::{ApiClient, OpsError};
pub use commands::Exit;
