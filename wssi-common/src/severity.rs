//! Threshold-to-severity classification
//!
//! Values are z-score style stress readings; only the magnitude matters, so a
//! strongly negative reading alerts the same as a strongly positive one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity, in ascending order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Stable,
    Watch,
    Approaching,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Stable => "stable",
            Severity::Watch => "watch",
            Severity::Approaching => "approaching",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stable" => Some(Severity::Stable),
            "watch" => Some(Severity::Watch),
            "approaching" => Some(Severity::Approaching),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three ascending cut-offs for one signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub critical: f64,
    pub approaching: f64,
    pub watch: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            critical: 2.0,
            approaching: 1.5,
            watch: 1.0,
        }
    }
}

impl Thresholds {
    /// Cut-off that produced `severity` (0.0 for stable)
    pub fn threshold_for(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::Approaching => self.approaching,
            Severity::Watch => self.watch,
            Severity::Stable => 0.0,
        }
    }
}

/// Classify `|value|` against the thresholds, most severe first
pub fn classify(value: f64, thresholds: &Thresholds) -> Severity {
    let magnitude = value.abs();
    // NaN carries no reading; an infinite magnitude is beyond every threshold
    if magnitude.is_nan() {
        return Severity::Stable;
    }
    if magnitude >= thresholds.critical {
        Severity::Critical
    } else if magnitude >= thresholds.approaching {
        Severity::Approaching
    } else if magnitude >= thresholds.watch {
        Severity::Watch
    } else {
        Severity::Stable
    }
}
