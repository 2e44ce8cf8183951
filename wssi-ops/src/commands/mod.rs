//! Subcommand implementations
//!
//! Each command writes its operator report to `out` and returns the exit
//! status; problems with the request itself go to stderr.

pub mod analytics;
pub mod brief;
pub mod stripe;

use serde_json::Value;
use std::process::ExitCode;

/// Exit status of a subcommand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Done, and everything checked out
    Success,
    /// The API or Stripe refused, or a check did not pass
    Failure,
    /// Missing token, directory or files
    Usage,
}

impl Exit {
    pub fn code(self) -> u8 {
        match self {
            Exit::Success => 0,
            Exit::Failure => 1,
            Exit::Usage => 2,
        }
    }
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit.code())
    }
}

pub(crate) fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// String at `pointer`, or `default`
pub(crate) fn text<'a>(value: &'a Value, pointer: &str, default: &'a str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or(default)
}

/// Comma-joined string array at `pointer`, or "none"
pub(crate) fn list_or_none(value: &Value, pointer: &str) -> String {
    let items: Vec<&str> = value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Trimmed, non-empty
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
