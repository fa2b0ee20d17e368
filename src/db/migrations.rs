//! Embedded, versioned schema migrations.
//!
//! Applied versions are recorded in `schema_migrations`; `up` applies
//! everything pending in order and `down` reverts the latest version only.

use chrono::{SecondsFormat, Utc};

use super::{Backend, Result, SqlValue};

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static [&'static str],
    pub down: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    up: &[
        "CREATE TABLE IF NOT EXISTS blocklist (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            reason TEXT NOT NULL,
            evidence_url TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            blocked_by TEXT NOT NULL,
            severity TEXT NOT NULL CHECK (severity IN ('low', 'medium', 'high')),
            source TEXT NOT NULL CHECK (source IN ('manual', 'imported', 'auto-detected')),
            metadata TEXT NOT NULL DEFAULT '{}'
        )",
        "CREATE INDEX IF NOT EXISTS idx_blocklist_username ON blocklist(username)",
        "CREATE INDEX IF NOT EXISTS idx_blocklist_severity ON blocklist(severity)",
        "CREATE INDEX IF NOT EXISTS idx_blocklist_timestamp ON blocklist(timestamp)",
    ],
    down: &[
        "DROP INDEX IF EXISTS idx_blocklist_timestamp",
        "DROP INDEX IF EXISTS idx_blocklist_severity",
        "DROP INDEX IF EXISTS idx_blocklist_username",
        "DROP TABLE IF EXISTS blocklist",
    ],
}];

const CREATE_TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

async fn tracking_table_exists(backend: &dyn Backend) -> Result<bool> {
    let rows = backend
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            &[],
        )
        .await?;
    match rows.first() {
        Some(row) => Ok(row.integer(0, "count")? > 0),
        None => Ok(false),
    }
}

/// Highest applied version, 0 for an unmigrated database. Read-only.
pub async fn current_version(backend: &dyn Backend) -> Result<i64> {
    if !tracking_table_exists(backend).await? {
        return Ok(0);
    }
    let rows = backend
        .query(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            &[],
        )
        .await?;
    match rows.first() {
        Some(row) => row.integer(0, "version"),
        None => Ok(0),
    }
}

/// Applies every pending migration and returns the ones applied.
pub async fn migrate_up(backend: &dyn Backend) -> Result<Vec<&'static Migration>> {
    backend.execute(CREATE_TRACKING_TABLE, &[]).await?;
    let current = current_version(backend).await?;

    let mut applied = Vec::new();
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::debug!(version = migration.version, name = migration.name, "Applying migration");
        for statement in migration.up {
            backend.execute(statement, &[]).await?;
        }
        backend
            .execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                &[
                    SqlValue::Integer(migration.version),
                    migration.name.into(),
                    Utc::now()
                        .to_rfc3339_opts(SecondsFormat::Secs, true)
                        .into(),
                ],
            )
            .await?;
        applied.push(migration);
    }
    Ok(applied)
}

/// Reverts the most recently applied migration, if any.
pub async fn migrate_down(backend: &dyn Backend) -> Result<Option<&'static Migration>> {
    let current = current_version(backend).await?;
    let Some(migration) = MIGRATIONS.iter().find(|m| m.version == current) else {
        return Ok(None);
    };

    tracing::debug!(version = migration.version, name = migration.name, "Reverting migration");
    for statement in migration.down {
        backend.execute(statement, &[]).await?;
    }
    backend
        .execute(
            "DELETE FROM schema_migrations WHERE version = ?1",
            &[SqlValue::Integer(migration.version)],
        )
        .await?;
    Ok(Some(migration))
}
