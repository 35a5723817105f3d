use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::time::timeout;

use crate::api::errors::FlagError;
use crate::flags::flag_models::Environment;
use crate::metrics::consts::USAGE_ROWS_SKIPPED_COUNTER;
use crate::metrics::utils::inc;
use crate::usage::usage_models::{EventType, UsageEvent, UsageEventRow, UsageQuery};

const USAGE_QUERY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Append-only log of usage events, plus the aggregates quotas and stats need.
#[async_trait]
pub trait UsageStore: Send + Sync + 'static {
    async fn record_event(&self, event: &UsageEvent) -> Result<(), FlagError>;

    async fn count_events(&self, query: &UsageQuery) -> Result<i64, FlagError>;

    async fn list_events(
        &self,
        user_id: &str,
        environment: Environment,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, FlagError>;
}

#[async_trait]
impl<T: UsageStore + ?Sized> UsageStore for Arc<T> {
    async fn record_event(&self, event: &UsageEvent) -> Result<(), FlagError> {
        (**self).record_event(event).await
    }

    async fn count_events(&self, query: &UsageQuery) -> Result<i64, FlagError> {
        (**self).count_events(query).await
    }

    async fn list_events(
        &self,
        user_id: &str,
        environment: Environment,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, FlagError> {
        (**self).list_events(user_id, environment, since).await
    }
}

#[derive(Clone)]
pub struct PostgresUsageStore {
    pool: PgPool,
}

impl PostgresUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStore for PostgresUsageStore {
    #[tracing::instrument(skip_all, fields(event_type = %event.event_type))]
    async fn record_event(&self, event: &UsageEvent) -> Result<(), FlagError> {
        let query = r#"
            INSERT INTO usage_events
                (user_id, event_type, environment, game_id, feature_key, extra_info, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#;

        timeout(
            USAGE_QUERY_TIMEOUT,
            sqlx::query(query)
                .bind(&event.user_id)
                .bind(event.event_type.to_string())
                .bind(event.environment.to_string())
                .bind(&event.game_id)
                .bind(&event.feature_key)
                .bind(&event.extra_info)
                .bind(event.timestamp)
                .execute(&self.pool),
        )
        .await
        .map_err(|_| FlagError::TimeoutError(Some("client_timeout".to_string())))??;

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(user_id = %query.user_id))]
    async fn count_events(&self, query: &UsageQuery) -> Result<i64, FlagError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM usage_events WHERE user_id = ");
        builder
            .push_bind(&query.user_id)
            .push(" AND environment = ")
            .push_bind(query.environment.to_string())
            .push(" AND timestamp >= ")
            .push_bind(query.since);

        if let Some(event_type) = query.event_type {
            builder
                .push(" AND event_type = ")
                .push_bind(event_type.to_string());
        }
        if let Some(feature_key) = &query.feature_key {
            builder.push(" AND feature_key = ").push_bind(feature_key);
        }
        if let Some(game_id) = &query.game_id {
            builder.push(" AND game_id = ").push_bind(game_id);
        }

        let count: i64 = timeout(
            USAGE_QUERY_TIMEOUT,
            builder.build_query_scalar::<i64>().fetch_one(&self.pool),
        )
        .await
        .map_err(|_| FlagError::TimeoutError(Some("client_timeout".to_string())))??;

        Ok(count)
    }

    #[tracing::instrument(skip(self))]
    async fn list_events(
        &self,
        user_id: &str,
        environment: Environment,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, FlagError> {
        let query = r#"
            SELECT user_id, event_type, environment, game_id, feature_key, extra_info, timestamp
              FROM usage_events
             WHERE user_id = $1
               AND environment = $2
               AND timestamp >= $3
        "#;

        let rows = timeout(
            USAGE_QUERY_TIMEOUT,
            sqlx::query_as::<_, UsageEventRow>(query)
                .bind(user_id)
                .bind(environment.to_string())
                .bind(since)
                .fetch_all(&self.pool),
        )
        .await
        .map_err(|_| FlagError::TimeoutError(Some("client_timeout".to_string())))??;

        Ok(events_from_rows(rows))
    }
}

/// Converts stored rows. Rows with an unknown event type or environment are
/// skipped and counted.
pub fn events_from_rows(rows: Vec<UsageEventRow>) -> Vec<UsageEvent> {
    rows.into_iter()
        .filter_map(|row| match UsageEvent::try_from(row) {
            Ok(event) => Some(event),
            Err(e) => {
                inc(USAGE_ROWS_SKIPPED_COUNTER, &[], 1);
                tracing::warn!("skipping unreadable usage event: {}", e);
                None
            }
        })
        .collect()
}

impl TryFrom<UsageEventRow> for UsageEvent {
    type Error = FlagError;

    fn try_from(row: UsageEventRow) -> Result<Self, Self::Error> {
        let event_type = row
            .event_type
            .parse::<EventType>()
            .map_err(|_| FlagError::UnknownEnumValue("event_type".to_string(), row.event_type))?;
        let environment = row
            .environment
            .parse::<Environment>()
            .map_err(|_| FlagError::UnknownEnumValue("environment".to_string(), row.environment))?;

        Ok(UsageEvent {
            user_id: row.user_id,
            event_type,
            environment,
            game_id: row.game_id,
            feature_key: row.feature_key,
            extra_info: row.extra_info,
            timestamp: row.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(event_type: &str) -> UsageEventRow {
        UsageEventRow {
            user_id: "u1".to_string(),
            event_type: event_type.to_string(),
            environment: "prod".to_string(),
            game_id: Some("g1".to_string()),
            feature_key: Some("chat".to_string()),
            extra_info: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let event = UsageEvent::try_from(row("chat_question")).unwrap();
        assert_eq!(event.event_type, EventType::ChatQuestion);
        assert_eq!(event.environment, Environment::Prod);
    }

    #[test]
    fn test_unknown_event_rows_are_skipped() {
        let mut bad_environment = row("faq_view");
        bad_environment.environment = "staging".to_string();
        let rows = vec![
            row("chat_question"),
            row("score_update"),
            bad_environment,
            row("game_open"),
        ];

        let events = events_from_rows(rows);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::ChatQuestion);
        assert_eq!(events[1].event_type, EventType::GameOpen);
    }

    #[test]
    fn test_row_conversion_rejects_unknown_event() {
        assert!(matches!(
            UsageEvent::try_from(row("score_update")),
            Err(FlagError::UnknownEnumValue(_, _))
        ));
    }
}
