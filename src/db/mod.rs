//! Persistence for the blocklist.
//!
//! A [`Backend`] executes SQL against either a local SQLite file or a
//! remote Turso database; [`Database`] layers the blocklist table and its
//! migrations on top of whichever backend the configuration selects.

mod entries;
pub mod migrations;
mod sqlite;
mod turso;

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use thiserror::Error;

pub use migrations::{MIGRATIONS, Migration};
pub use sqlite::SqliteBackend;
pub use turso::TursoBackend;

use crate::config::{DatabaseConfig, DatabaseKind};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
    #[error("remote database error: {0}")]
    Remote(String),
    #[error("invalid value in column '{column}': '{value}'")]
    InvalidValue { column: &'static str, value: String },
    #[error("database connection lock poisoned")]
    Poisoned,
    #[error("failed to create database directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DbError>;

/// A value bound to, or read from, a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Text(String),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

/// One result row, columns in SELECT order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<SqlValue>);

impl Row {
    fn value(&self, idx: usize, column: &'static str) -> Result<&SqlValue> {
        self.0.get(idx).ok_or_else(|| DbError::InvalidValue {
            column,
            value: format!("<missing column {idx}>"),
        })
    }

    pub fn text(&self, idx: usize, column: &'static str) -> Result<String> {
        match self.value(idx, column)? {
            SqlValue::Text(s) => Ok(s.clone()),
            SqlValue::Integer(i) => Ok(i.to_string()),
            SqlValue::Null => Err(DbError::InvalidValue {
                column,
                value: "NULL".to_string(),
            }),
        }
    }

    pub fn integer(&self, idx: usize, column: &'static str) -> Result<i64> {
        match self.value(idx, column)? {
            SqlValue::Integer(i) => Ok(*i),
            SqlValue::Text(s) => s.parse().map_err(|_| DbError::InvalidValue {
                column,
                value: s.clone(),
            }),
            SqlValue::Null => Err(DbError::InvalidValue {
                column,
                value: "NULL".to_string(),
            }),
        }
    }
}

/// Executes SQL statements. Implemented for local SQLite and remote Turso.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;
}

/// The blocklist database.
pub struct Database {
    backend: Box<dyn Backend>,
}

impl Database {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Opens the configured database without touching its schema.
    pub fn open(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let backend: Box<dyn Backend> = match config.kind()? {
            DatabaseKind::Sqlite => Box::new(
                SqliteBackend::open(&config.path)
                    .with_context(|| format!("Failed to open SQLite database: {}", config.path))?,
            ),
            DatabaseKind::Turso => Box::new(
                TursoBackend::new(&config.url, &config.auth_token)
                    .with_context(|| format!("Failed to open Turso database: {}", config.url))?,
            ),
        };
        Ok(Self::new(backend))
    }

    /// Opens the configured database and applies pending migrations.
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let db = Self::open(config)?;
        let applied = db
            .migrate_up()
            .await
            .context("Failed to initialize database schema")?;
        if !applied.is_empty() {
            tracing::info!(count = applied.len(), "Applied database migrations");
        }
        Ok(db)
    }

    /// A migrated, private in-memory SQLite database.
    pub async fn open_in_memory() -> Result<Self> {
        let db = Self::new(Box::new(SqliteBackend::open_in_memory()?));
        db.migrate_up().await?;
        Ok(db)
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub async fn migrate_up(&self) -> Result<Vec<&'static Migration>> {
        migrations::migrate_up(self.backend()).await
    }

    pub async fn migrate_down(&self) -> Result<Option<&'static Migration>> {
        migrations::migrate_down(self.backend()).await
    }

    pub async fn migration_status(&self) -> Result<i64> {
        migrations::current_version(self.backend()).await
    }
}
