use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::api::errors::FlagError;
use crate::flags::flag_models::{Environment, FlagRecord, ScopeType};
use crate::flags::flag_store::FlagStore;
use crate::usage::usage_models::{EventType, UsageEvent, UsageQuery};
use crate::usage::usage_store::UsageStore;

pub fn flag(
    scope_type: ScopeType,
    scope_id: Option<&str>,
    feature_key: &str,
    role: Option<&str>,
    environment: Environment,
    enabled: bool,
) -> FlagRecord {
    FlagRecord {
        id: None,
        scope_type,
        scope_id: scope_id.map(str::to_string),
        feature_key: feature_key.to_string(),
        role: role.map(str::to_string),
        environment,
        enabled,
        metadata: serde_json::Map::new(),
    }
}

/// Like [`flag`], with `metadata` given as a JSON object.
pub fn flag_with_metadata(
    scope_type: ScopeType,
    scope_id: Option<&str>,
    feature_key: &str,
    role: Option<&str>,
    environment: Environment,
    enabled: bool,
    metadata: Value,
) -> FlagRecord {
    let mut record = flag(scope_type, scope_id, feature_key, role, environment, enabled);
    if let Value::Object(map) = metadata {
        record.metadata = map;
    }
    record
}

pub fn usage_event(
    user_id: &str,
    event_type: EventType,
    environment: Environment,
    game_id: Option<&str>,
    timestamp: DateTime<Utc>,
) -> UsageEvent {
    UsageEvent {
        user_id: user_id.to_string(),
        event_type,
        environment,
        game_id: game_id.map(str::to_string),
        feature_key: None,
        extra_info: None,
        timestamp,
    }
}

/// Flag store over a vector of records, with a switchable outage and read counter.
pub struct InMemoryFlagStore {
    records: Mutex<Vec<FlagRecord>>,
    reads: AtomicUsize,
    failing: AtomicBool,
    corrupt: AtomicBool,
    next_id: AtomicI64,
    delay: Option<Duration>,
}

impl InMemoryFlagStore {
    pub fn new(records: Vec<FlagRecord>) -> Self {
        let store = Self {
            records: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            corrupt: AtomicBool::new(false),
            next_id: AtomicI64::new(1),
            delay: None,
        };
        store.replace(records);
        store
    }

    /// Every read sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the stored records. Records without an id are numbered in order.
    pub fn replace(&self, records: Vec<FlagRecord>) {
        let records = records
            .into_iter()
            .map(|mut record| {
                if record.id.is_none() {
                    record.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
                }
                record
            })
            .collect();
        *self.records.lock().unwrap() = records;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Reads fail as if a stored row held an unknown scope type.
    pub fn set_corrupt(&self, corrupt: bool) {
        self.corrupt.store(corrupt, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlagStore for InMemoryFlagStore {
    async fn fetch_flags(
        &self,
        feature_key: &str,
        environment: Environment,
    ) -> Result<Vec<FlagRecord>, FlagError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(FlagError::DatabaseUnavailable);
        }
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(FlagError::UnknownEnumValue(
                "scope_type".to_string(),
                "planet".to_string(),
            ));
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.feature_key == feature_key && r.environment == environment)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), FlagError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FlagError::DatabaseUnavailable);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUsageStore {
    events: Mutex<Vec<UsageEvent>>,
    failing: AtomicBool,
}

impl InMemoryUsageStore {
    pub fn new(events: Vec<UsageEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<(), FlagError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FlagError::DatabaseUnavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn record_event(&self, event: &UsageEvent) -> Result<(), FlagError> {
        self.check_available()?;
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn count_events(&self, query: &UsageQuery) -> Result<i64, FlagError> {
        self.check_available()?;
        let count = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| query.matches(event))
            .count();
        Ok(count as i64)
    }

    async fn list_events(
        &self,
        user_id: &str,
        environment: Environment,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, FlagError> {
        self.check_available()?;
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.user_id == user_id && e.environment == environment && e.timestamp >= since
            })
            .cloned()
            .collect())
    }
}
