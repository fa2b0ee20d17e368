use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use super::{Database, DbError, Row, SqlValue};
use crate::{
    blocklist::BlocklistStore,
    types::{BlocklistEntry, Severity, Source},
};

const COLUMNS: &str =
    "id, username, reason, evidence_url, timestamp, blocked_by, severity, source, metadata";

// Fixed-width fractions keep TEXT ordering identical to time ordering.
fn encode_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn entry_from_row(row: &Row) -> Result<BlocklistEntry, DbError> {
    let timestamp = row.text(4, "timestamp")?;
    let severity = row.text(6, "severity")?;
    let source = row.text(7, "source")?;

    Ok(BlocklistEntry {
        id: row.text(0, "id")?,
        username: row.text(1, "username")?,
        reason: row.text(2, "reason")?,
        evidence_url: row.text(3, "evidence_url")?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|_| DbError::InvalidValue {
                column: "timestamp",
                value: timestamp.clone(),
            })?
            .with_timezone(&Utc),
        blocked_by: row.text(5, "blocked_by")?,
        severity: severity.parse::<Severity>().map_err(|_| DbError::InvalidValue {
            column: "severity",
            value: severity.clone(),
        })?,
        source: source.parse::<Source>().map_err(|_| DbError::InvalidValue {
            column: "source",
            value: source.clone(),
        })?,
        metadata: row.text(8, "metadata")?,
    })
}

impl Database {
    async fn select_entries(
        &self,
        clause: &str,
        params: &[SqlValue],
    ) -> Result<Vec<BlocklistEntry>, DbError> {
        let sql = format!("SELECT {COLUMNS} FROM blocklist {clause}");
        self.backend()
            .query(&sql, params)
            .await?
            .iter()
            .map(entry_from_row)
            .collect()
    }
}

#[async_trait]
impl BlocklistStore for Database {
    async fn add(&self, entry: &BlocklistEntry) -> Result<()> {
        self.backend()
            .execute(
                &format!(
                    "INSERT INTO blocklist ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                &[
                    entry.id.as_str().into(),
                    entry.username.as_str().into(),
                    entry.reason.as_str().into(),
                    entry.evidence_url.as_str().into(),
                    encode_timestamp(&entry.timestamp).into(),
                    entry.blocked_by.as_str().into(),
                    entry.severity.as_str().into(),
                    entry.source.as_str().into(),
                    entry.metadata.as_str().into(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<BlocklistEntry>> {
        let mut entries = self.select_entries("WHERE id = ?1", &[id.into()]).await?;
        Ok(entries.pop())
    }

    async fn list_by_username(&self, username: &str) -> Result<Vec<BlocklistEntry>> {
        Ok(self
            .select_entries(
                "WHERE username = ?1 ORDER BY timestamp ASC",
                &[username.into()],
            )
            .await?)
    }

    async fn list_all(&self) -> Result<Vec<BlocklistEntry>> {
        Ok(self.select_entries("ORDER BY timestamp DESC", &[]).await?)
    }

    async fn remove_all_by_username(&self, username: &str) -> Result<u64> {
        Ok(self
            .backend()
            .execute(
                "DELETE FROM blocklist WHERE username = ?1",
                &[username.into()],
            )
            .await?)
    }

    async fn update(&self, entry: &BlocklistEntry) -> Result<()> {
        let affected = self
            .backend()
            .execute(
                "UPDATE blocklist SET reason = ?1, evidence_url = ?2, severity = ?3, metadata = ?4 WHERE id = ?5",
                &[
                    entry.reason.as_str().into(),
                    entry.evidence_url.as_str().into(),
                    entry.severity.as_str().into(),
                    entry.metadata.as_str().into(),
                    entry.id.as_str().into(),
                ],
            )
            .await?;
        if affected == 0 {
            anyhow::bail!("Blocklist entry {} not found", entry.id);
        }
        Ok(())
    }

    async fn is_blocked(&self, username: &str) -> Result<bool> {
        let rows = self
            .backend()
            .query(
                "SELECT COUNT(*) FROM blocklist WHERE username = ?1",
                &[username.into()],
            )
            .await?;
        match rows.first() {
            Some(row) => Ok(row.integer(0, "count")? > 0),
            None => Ok(false),
        }
    }
}
