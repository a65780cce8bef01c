//! Database service for wallet-service: connection pool, migrations, and the
//! santri/pool lookups shared by the ledger, withdrawal, and billing
//! operations. Ledger, balance, withdrawal, and collective operations live in
//! their own modules as further `impl Database` blocks.

use crate::models::{Pool, Santri, EPOS_POOL_NAME};
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "wallet-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Santri lookups
    // -------------------------------------------------------------------------

    /// Get a santri by id.
    #[instrument(skip(self), fields(santri_id = %santri_id))]
    pub async fn get_santri(&self, santri_id: Uuid) -> Result<Option<Santri>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_santri"])
            .start_timer();

        let santri = sqlx::query_as::<_, Santri>(
            "SELECT santri_id, name, class_name, created_utc FROM santri WHERE santri_id = $1",
        )
        .bind(santri_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get santri: {}", e)))?;

        timer.observe_duration();

        Ok(santri)
    }

    /// Resolve a santri through an active RFID tag, for ePOS terminals that
    /// only know the card uid.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn find_santri_by_rfid(&self, uid: &str) -> Result<Option<Santri>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_santri_by_rfid"])
            .start_timer();

        let santri = sqlx::query_as::<_, Santri>(
            r#"
            SELECT s.santri_id, s.name, s.class_name, s.created_utc
            FROM santri s
            JOIN rfid_tags t ON t.santri_id = s.santri_id
            WHERE t.uid = $1 AND t.active
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to resolve RFID uid: {}", e)))?;

        timer.observe_duration();

        Ok(santri)
    }

    // -------------------------------------------------------------------------
    // Pool accounts
    // -------------------------------------------------------------------------

    /// Get the ePOS settlement pool, creating it lazily with zero balance.
    #[instrument(skip(self))]
    pub async fn get_or_create_epos_pool(&self) -> Result<Pool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_or_create_epos_pool"])
            .start_timer();

        let pool = sqlx::query_as::<_, Pool>(
            r#"
            INSERT INTO epos_pools (pool_id, name, balance)
            VALUES ($1, $2, 0)
            ON CONFLICT (name) DO UPDATE SET name = epos_pools.name
            RETURNING pool_id, name, balance, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(EPOS_POOL_NAME)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get pool: {}", e)))?;

        timer.observe_duration();

        Ok(pool)
    }

    /// Lock the ePOS pool row for the duration of the enclosing transaction.
    /// The pool must already exist; callers create it lazily outside the
    /// transaction via [`Self::get_or_create_epos_pool`].
    pub(crate) async fn lock_pool(
        conn: &mut PgConnection,
        pool_id: Uuid,
    ) -> Result<Pool, AppError> {
        sqlx::query_as::<_, Pool>(
            r#"
            SELECT pool_id, name, balance, created_utc, updated_utc
            FROM epos_pools
            WHERE pool_id = $1
            FOR UPDATE
            "#,
        )
        .bind(pool_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock pool: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pool not found")))
    }

    /// Adjust a pool balance by a signed delta; the row must be locked by the
    /// enclosing transaction.
    pub(crate) async fn adjust_pool_balance(
        conn: &mut PgConnection,
        pool_id: Uuid,
        delta: Decimal,
    ) -> Result<Pool, AppError> {
        sqlx::query_as::<_, Pool>(
            r#"
            UPDATE epos_pools
            SET balance = balance + $2, updated_utc = now()
            WHERE pool_id = $1
            RETURNING pool_id, name, balance, created_utc, updated_utc
            "#,
        )
        .bind(pool_id)
        .bind(delta)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to adjust pool: {}", e)))
    }
}
