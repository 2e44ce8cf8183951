//! Subscription tiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription level controlling API quota and brief depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Basic, Tier::Pro, Tier::Enterprise];

    /// Metered API requests allowed per UTC day
    ///
    /// Free keys get the web brief only, so every metered call is rejected.
    pub fn daily_limit(&self) -> i64 {
        match self {
            Tier::Free => 0,
            Tier::Basic => 10_000,
            Tier::Pro => 100_000,
            Tier::Enterprise => 999_999_999,
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::Free)
    }

    /// Tiers purchasable through self-service checkout
    pub fn self_service_checkout(&self) -> bool {
        matches!(self, Tier::Basic | Tier::Pro)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::Free => "Free",
            Tier::Basic => "Basic",
            Tier::Pro => "Pro",
            Tier::Enterprise => "Enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "basic" => Ok(Tier::Basic),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(format!(
                "unknown tier '{}' (expected free, basic, pro or enterprise)",
                other
            )),
        }
    }
}
