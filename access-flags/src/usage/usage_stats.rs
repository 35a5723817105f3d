use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::api::errors::{ClientFacingError, FlagError};
use crate::usage::usage_models::{UsageEvent, UsageStats};

pub const DEFAULT_STATS_DAYS: u32 = 7;
pub const MAX_STATS_DAYS: u32 = 90;

/// Start of the look-back window for `days` days ending at `now`.
/// Saturates at the earliest representable time instead of overflowing.
pub fn period_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Rejects look-back windows outside `1..=MAX_STATS_DAYS`.
pub fn validate_days(days: u32) -> Result<u32, FlagError> {
    if (1..=MAX_STATS_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ClientFacingError::BadRequest(format!(
            "days must be between 1 and {MAX_STATS_DAYS}"
        ))
        .into())
    }
}

/// Aggregates a user's events by type and by game.
pub fn aggregate(
    user_id: &str,
    days: u32,
    events: &[UsageEvent],
    now: DateTime<Utc>,
) -> UsageStats {
    let mut event_counts: HashMap<String, usize> = HashMap::new();
    let mut game_counts: HashMap<String, usize> = HashMap::new();

    for event in events {
        *event_counts.entry(event.event_type.to_string()).or_default() += 1;
        if let Some(game_id) = &event.game_id {
            *game_counts.entry(game_id.clone()).or_default() += 1;
        }
    }

    UsageStats {
        user_id: user_id.to_string(),
        days,
        total_events: events.len(),
        event_counts,
        game_counts,
        period_start: period_start(now, days),
        period_end: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::flag_models::Environment;
    use crate::usage::usage_models::EventType;
    use chrono::TimeZone;
    use test_case::test_case;

    fn event(event_type: EventType, game_id: Option<&str>) -> UsageEvent {
        UsageEvent {
            user_id: "u1".to_string(),
            event_type,
            environment: Environment::Prod,
            game_id: game_id.map(str::to_string),
            feature_key: None,
            extra_info: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_aggregate() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let events = vec![
            event(EventType::ChatQuestion, Some("g1")),
            event(EventType::ChatQuestion, Some("g1")),
            event(EventType::FaqView, Some("g2")),
            event(EventType::GameOpen, None),
        ];

        let stats = aggregate("u1", 7, &events, now);

        assert_eq!(stats.total_events, 4);
        assert_eq!(stats.event_counts.get("chat_question"), Some(&2));
        assert_eq!(stats.event_counts.get("faq_view"), Some(&1));
        assert_eq!(stats.event_counts.get("game_open"), Some(&1));
        assert_eq!(stats.game_counts.get("g1"), Some(&2));
        assert_eq!(stats.game_counts.get("g2"), Some(&1));
        assert_eq!(stats.game_counts.len(), 2);
        assert_eq!(
            stats.period_start,
            Utc.with_ymd_and_hms(2026, 10, 9, 12, 0, 0).unwrap()
        );
        assert_eq!(stats.period_end, now);
    }

    #[test]
    fn test_period_start_saturates() {
        let now = Utc::now();
        assert_eq!(period_start(now, u32::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[test_case(0, false)]
    #[test_case(1, true)]
    #[test_case(90, true)]
    #[test_case(91, false)]
    #[test_case(u32::MAX, false)]
    fn test_validate_days(days: u32, valid: bool) {
        assert_eq!(validate_days(days).is_ok(), valid);
    }

    #[test]
    fn test_aggregate_empty() {
        let stats = aggregate("u1", 1, &[], Utc::now());
        assert_eq!(stats.total_events, 0);
        assert!(stats.event_counts.is_empty());
        assert!(stats.game_counts.is_empty());
    }
}
