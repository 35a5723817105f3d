use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::flags::flag_models::Environment;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    GameOpen,
    FaqView,
    ChatQuestion,
    ChatAnswer,
}

/// Which event counts against a feature's `daily_limit`.
pub const QUOTA_EVENTS: &[(&str, EventType)] = &[
    ("chat", EventType::ChatQuestion),
    ("faq", EventType::FaqView),
    ("game_access", EventType::GameOpen),
];

impl EventType {
    pub fn qualifying_for(feature_key: &str) -> Option<EventType> {
        QUOTA_EVENTS
            .iter()
            .find(|(key, _)| *key == feature_key)
            .map(|(_, event_type)| *event_type)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UsageEvent {
    pub user_id: String,
    pub event_type: EventType,
    pub environment: Environment,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub feature_key: Option<String>,
    #[serde(default)]
    pub extra_info: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct UsageEventRow {
    pub user_id: String,
    pub event_type: String,
    pub environment: String,
    pub game_id: Option<String>,
    pub feature_key: Option<String>,
    pub extra_info: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Filter for counting usage events. Unset optional fields do not narrow the count.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageQuery {
    pub user_id: String,
    pub environment: Environment,
    pub since: DateTime<Utc>,
    pub event_type: Option<EventType>,
    pub feature_key: Option<String>,
    pub game_id: Option<String>,
}

impl UsageQuery {
    pub fn matches(&self, event: &UsageEvent) -> bool {
        event.user_id == self.user_id
            && event.environment == self.environment
            && event.timestamp >= self.since
            && self.event_type.map_or(true, |t| t == event.event_type)
            && self
                .feature_key
                .as_ref()
                .map_or(true, |key| event.feature_key.as_ref() == Some(key))
            && self
                .game_id
                .as_ref()
                .map_or(true, |game| event.game_id.as_ref() == Some(game))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub daily_limit: i64,
    pub daily_used: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

impl QuotaStatus {
    pub fn has_quota(&self) -> bool {
        self.remaining > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub user_id: String,
    pub days: u32,
    pub total_events: usize,
    pub event_counts: HashMap<String, usize>,
    pub game_counts: HashMap<String, usize>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}
