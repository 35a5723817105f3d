use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::time::timeout;

use crate::api::errors::FlagError;
use crate::flags::flag_models::{Environment, FlagRecord, FlagRecordRow};

const FLAG_QUERY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Read side of the flag-record table.
#[async_trait]
pub trait FlagStore: Send + Sync + 'static {
    /// Every record for `feature_key` in `environment`, across all scopes and roles.
    async fn fetch_flags(
        &self,
        feature_key: &str,
        environment: Environment,
    ) -> Result<Vec<FlagRecord>, FlagError>;

    /// Cheap connectivity check used by the readiness route.
    async fn ping(&self) -> Result<(), FlagError>;
}

#[async_trait]
impl<T: FlagStore + ?Sized> FlagStore for Arc<T> {
    async fn fetch_flags(
        &self,
        feature_key: &str,
        environment: Environment,
    ) -> Result<Vec<FlagRecord>, FlagError> {
        (**self).fetch_flags(feature_key, environment).await
    }

    async fn ping(&self) -> Result<(), FlagError> {
        (**self).ping().await
    }
}

#[derive(Clone)]
pub struct PostgresFlagStore {
    pool: PgPool,
}

impl PostgresFlagStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlagStore for PostgresFlagStore {
    #[tracing::instrument(skip(self))]
    async fn fetch_flags(
        &self,
        feature_key: &str,
        environment: Environment,
    ) -> Result<Vec<FlagRecord>, FlagError> {
        let query = r#"
            SELECT id, scope_type, scope_id, feature_key, role, environment, enabled, metadata
              FROM feature_flags
             WHERE feature_key = $1
               AND environment = $2
        "#;

        let rows = timeout(
            FLAG_QUERY_TIMEOUT,
            sqlx::query_as::<_, FlagRecordRow>(query)
                .bind(feature_key)
                .bind(environment.to_string())
                .fetch_all(&self.pool),
        )
        .await
        .map_err(|_| FlagError::TimeoutError(Some("client_timeout".to_string())))?
        .map_err(|e| {
            tracing::error!(
                "Failed to fetch feature flags for {} in {}: {}",
                feature_key,
                environment,
                e
            );
            FlagError::from(e)
        })?;

        // One unreadable row fails the whole read; a partial set could hide a disable.
        rows.into_iter().map(FlagRecord::try_from).collect()
    }

    async fn ping(&self) -> Result<(), FlagError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
