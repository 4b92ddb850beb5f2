//! SQLite record store
//!
//! All database access goes through this module. The pool holds exactly
//! one connection, so every statement, query and atomic unit of work is
//! served one after another in the order callers asked for the connection.

use futures::TryStreamExt;
use futures::future::BoxFuture;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Column, Executor, Row, Sqlite, SqlitePool, Transaction, TypeInfo, ValueRef};
use std::time::{Duration, Instant};

use super::models::{SqlValue, StoreRow};
use crate::config::DatabaseConfig;
use crate::error::{CacheError, Result};
use crate::metrics::observe_store_operation;

/// Schema script shipped with the crate
pub const BUNDLED_SCHEMA: &str = include_str!("schema.sql");

/// Acquire timeout standing in for "wait until served"
const UNBOUNDED_ACQUIRE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Record store over a single serialized SQLite connection
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database file and apply the schema script
    ///
    /// The script is `database.schema_path` when configured, otherwise
    /// [`BUNDLED_SCHEMA`].
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or the script fails
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let schema = match &config.schema_path {
            Some(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                CacheError::Schema(format!("cannot read {}: {}", path.display(), e))
            })?,
            None => BUNDLED_SCHEMA.to_string(),
        };

        Self::open_with_schema(config, &schema).await
    }

    /// Open the database file and apply `schema` instead of the configured script
    pub async fn open_with_schema(config: &DatabaseConfig, schema: &str) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CacheError::Storage(sqlx::Error::Io(e)))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let acquire_timeout = match config.acquire_timeout_ms {
            0 => UNBOUNDED_ACQUIRE,
            ms => Duration::from_millis(ms),
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.apply_schema(schema).await?;

        tracing::info!(path = %config.path.display(), "Status store opened");

        Ok(store)
    }

    /// Run a schema script; every statement in it must be idempotent
    pub async fn apply_schema(&self, script: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        (&mut *conn).execute(script).await.map_err(|e| {
            tracing::error!(error = %e, "Schema bootstrap failed");
            CacheError::Storage(e)
        })?;
        Ok(())
    }

    /// Execute a statement, returning the number of affected rows
    pub async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        let started = Instant::now();
        let mut conn = self.pool.acquire().await?;
        let affected = execute_on(&mut conn, sql, args).await?;
        observe_store_operation("execute", started);
        Ok(affected)
    }

    /// Run a query, returning every row in result order
    pub async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<StoreRow>> {
        let started = Instant::now();
        let mut conn = self.pool.acquire().await?;
        let rows = query_on(&mut conn, sql, args).await?;
        observe_store_operation("query", started);
        Ok(rows)
    }

    /// Run `body` inside one transaction
    ///
    /// Commits when the body returns `Ok`, rolls back every write made
    /// through the scope when it returns `Err`. The body owns the store's
    /// only connection while it runs, so it must go through the scope
    /// rather than through `self`.
    pub async fn run_atomic<T, F>(&self, body: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut AtomicScope) -> BoxFuture<'c, Result<T>>,
    {
        let started = Instant::now();
        let tx = self.pool.begin().await?;
        let mut scope = AtomicScope { tx };

        let result = body(&mut scope).await;
        let outcome = match result {
            Ok(value) => match scope.tx.commit().await {
                Ok(()) => Ok(value),
                Err(error) => Err(CacheError::Storage(error)),
            },
            Err(error) => {
                // The engine may already have aborted the transaction itself.
                if let Err(rollback_error) = scope.tx.rollback().await {
                    tracing::debug!(error = %rollback_error, "Rollback after failed body");
                }
                Err(error)
            }
        };

        observe_store_operation("atomic", started);
        outcome
    }

    /// Number of cached rows, optionally for one owner
    pub async fn count(&self, owner_id: Option<&str>) -> Result<u64> {
        let rows = match owner_id {
            Some(owner_id) => {
                self.query(
                    "SELECT COUNT(*) AS n FROM T_Status WHERE owner_id = ?",
                    &[owner_id.into()],
                )
                .await?
            }
            None => self.query("SELECT COUNT(*) AS n FROM T_Status", &[]).await?,
        };

        Ok(rows
            .first()
            .and_then(|row| row.get_i64("n"))
            .unwrap_or(0)
            .max(0) as u64)
    }

    /// Close the connection once queued work has drained
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Handle given to a [`Store::run_atomic`] body
pub struct AtomicScope {
    tx: Transaction<'static, Sqlite>,
}

impl AtomicScope {
    /// Execute a statement inside the transaction
    pub async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        Ok(execute_on(&mut self.tx, sql, args).await?)
    }

    /// Run a query inside the transaction
    pub async fn query(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<StoreRow>> {
        Ok(query_on(&mut self.tx, sql, args).await?)
    }
}

fn bind_args<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(value) => query.bind(*value),
            SqlValue::Real(value) => query.bind(*value),
            SqlValue::Text(value) => query.bind(value.as_str()),
            SqlValue::Blob(value) => query.bind(value.as_slice()),
        };
    }
    query
}

async fn execute_on(
    conn: &mut SqliteConnection,
    sql: &str,
    args: &[SqlValue],
) -> std::result::Result<u64, sqlx::Error> {
    let result = bind_args(sqlx::query(sql), args).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

async fn query_on(
    conn: &mut SqliteConnection,
    sql: &str,
    args: &[SqlValue],
) -> std::result::Result<Vec<StoreRow>, sqlx::Error> {
    let mut stream = bind_args(sqlx::query(sql), args).fetch(&mut *conn);
    let mut rows = Vec::new();
    while let Some(row) = stream.try_next().await? {
        rows.push(store_row(&row)?);
    }
    Ok(rows)
}

fn store_row(row: &SqliteRow) -> std::result::Result<StoreRow, sqlx::Error> {
    let mut columns = Vec::with_capacity(row.len());
    for column in row.columns() {
        let index = column.ordinal();
        let kind = {
            let raw = row.try_get_raw(index)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };

        let value = match kind.as_deref() {
            None => SqlValue::Null,
            Some("INTEGER") => SqlValue::Integer(row.try_get(index)?),
            Some("REAL") => SqlValue::Real(row.try_get(index)?),
            Some("BLOB") => SqlValue::Blob(row.try_get(index)?),
            Some(_) => SqlValue::Text(row.try_get(index)?),
        };
        columns.push((column.name().to_string(), value));
    }
    Ok(StoreRow::new(columns))
}
