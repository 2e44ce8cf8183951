//! Timestamp utilities

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Start of the next UTC day after `at`
///
/// Daily rate-limit windows and "requests today" statistics both roll over here.
pub fn next_utc_midnight(at: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = at.date_naive() + Duration::days(1);
    tomorrow.and_time(NaiveTime::MIN).and_utc()
}

/// Format as the `YYYY-MM-DD` date used by history points and brief releases
pub fn date_string(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}
