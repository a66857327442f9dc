use crate::config::DatabaseConfig;
use crate::model::CancellationRecord;
use crate::utils::retry_on_startup;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use std::time::Duration;

const INSERT_CANCELLATION_SQL: &str = r#"
    INSERT INTO cancellations (train_id, operator, cancellation_date, cancellation_reason)
    VALUES ($1, $2, $3, $4)
"#;

#[cfg_attr(not(test), allow(dead_code))]
const CANCELLATION_COUNT_SQL: &str =
    "SELECT COUNT(*) FROM cancellations WHERE cancellation_date = $1";

#[async_trait]
pub trait CancellationStore: Send + Sync {
    /// Applies pending schema migrations; a no-op when already current.
    async fn migrate(&self) -> Result<()>;

    /// Appends a row. Not idempotent: the same notice twice is two rows.
    async fn insert_cancellation(&self, record: &CancellationRecord) -> Result<()>;

    /// Zero, not an error, when nothing was recorded that day.
    #[cfg_attr(not(test), allow(dead_code))]
    async fn cancellation_count_for_date(&self, date: NaiveDate) -> Result<i64>;

    async fn close(&self) -> Result<()>;
}

pub struct PgCancellationStore {
    pool: PgPool,
    migrations_dir: String,
}

impl PgCancellationStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = PgPoolOptions::new().max_connections(config.max_connections);
        let url = config.url.as_str();
        let pool = retry_on_startup(
            "Postgres connect",
            Duration::from_secs(config.connect_timeout_secs),
            || options.clone().connect(url),
        )
        .await
        .context("Failed to connect to database")?;

        info!("Connected to database");
        Ok(PgCancellationStore {
            pool,
            migrations_dir: config.migrations_dir.clone(),
        })
    }
}

#[async_trait]
impl CancellationStore for PgCancellationStore {
    async fn migrate(&self) -> Result<()> {
        let migrator = Migrator::new(Path::new(&self.migrations_dir))
            .await
            .with_context(|| format!("Failed to read migrations from {}", self.migrations_dir))?;

        migrator
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!(
            "Database schema is current ({} migrations known)",
            migrator.iter().count()
        );
        Ok(())
    }

    async fn insert_cancellation(&self, record: &CancellationRecord) -> Result<()> {
        let result = sqlx::query(INSERT_CANCELLATION_SQL)
            .bind(&record.train_id)
            .bind(&record.operator)
            .bind(record.cancellation_date)
            .bind(&record.reason)
            .execute(&self.pool)
            .await
            .context("Failed to insert cancellation")?;

        debug!("Inserted {} cancellation row(s) for {}", result.rows_affected(), record.train_id);
        Ok(())
    }

    async fn cancellation_count_for_date(&self, date: NaiveDate) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(CANCELLATION_COUNT_SQL)
            .bind(date)
            .fetch_one(&self.pool)
            .await
            .context("Failed to get cancellation count")
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("Database connections closed");
        Ok(())
    }
}
