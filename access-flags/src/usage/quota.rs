use chrono::{DateTime, Days, NaiveTime, Utc};
use serde_json::Value;

use crate::api::errors::FlagError;
use crate::usage::usage_models::QuotaStatus;

pub const DAILY_LIMIT_KEY: &str = "daily_limit";

/// Start of the UTC day containing `now`.
pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Start of the next UTC day, when daily quotas reset.
pub fn next_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    let start = day_start(now);
    start.checked_add_days(Days::new(1)).unwrap_or(start)
}

/// Reads a daily limit out of flag metadata.
///
/// Accepts non-negative integers, integer-valued floats and numeric strings.
/// Anything else is a data error, which callers must turn into a denial.
pub fn parse_daily_limit(value: &Value) -> Result<i64, FlagError> {
    let limit = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match limit {
        Some(limit) if limit >= 0 => Ok(limit),
        _ => Err(FlagError::InvalidDailyLimit(value.to_string())),
    }
}

/// Quota for `daily_used` events against `daily_limit`. Allowed only while
/// `daily_used < daily_limit`.
pub fn evaluate_daily_limit(daily_limit: i64, daily_used: i64, now: DateTime<Utc>) -> QuotaStatus {
    QuotaStatus {
        daily_limit,
        daily_used,
        remaining: (daily_limit - daily_used).max(0),
        reset_at: next_reset(now),
    }
}
