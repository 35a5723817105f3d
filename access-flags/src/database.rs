use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::api::errors::FlagError;
use crate::config::Config;

/// Builds the Postgres pool shared by the flag and usage stores.
/// Connections are opened lazily, so the service starts even when the database is down
/// and every check fails closed until it comes back.
pub fn get_pool(config: &Config) -> Result<PgPool, FlagError> {
    if config.acquire_timeout_secs == 0 {
        return Err(FlagError::Internal(
            "ACQUIRE_TIMEOUT_SECS must be at least 1 second".to_string(),
        ));
    }

    PgPoolOptions::new()
        .max_connections(config.max_pg_connections)
        .acquire_timeout(config.acquire_timeout())
        .test_before_acquire(true)
        .connect_lazy(&config.database_url)
        .map_err(|e| FlagError::DatabaseError(e, Some("Failed to create pool".to_string())))
}

/// Applies the bundled schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), FlagError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| FlagError::Internal(format!("failed to run migrations: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_acquire_timeout_is_rejected() {
        let mut config = Config::default_test_config();
        config.acquire_timeout_secs = 0;
        assert!(matches!(get_pool(&config), Err(FlagError::Internal(_))));
    }

    #[tokio::test]
    async fn test_pool_is_created_lazily() {
        let config = Config::default_test_config();
        assert!(get_pool(&config).is_ok());
    }
}
