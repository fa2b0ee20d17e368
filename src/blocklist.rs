//! The blocklist: storage contract, import reconciliation and export.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::SecondsFormat;
use clap::ValueEnum;

use crate::{
    config::{BlocklistConfig, BlocklistSource},
    http,
    types::{BlocklistEntry, Source},
};

pub const CSV_HEADER: [&str; 8] = [
    "ID",
    "Username",
    "Reason",
    "EvidenceURL",
    "Timestamp",
    "BlockedBy",
    "Severity",
    "Source",
];

/// Persistence for blocklist entries.
///
/// Implementations reject unknown severity/source values at write time.
#[async_trait]
pub trait BlocklistStore: Send + Sync {
    async fn add(&self, entry: &BlocklistEntry) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<BlocklistEntry>>;

    /// Entries for one username, oldest first.
    async fn list_by_username(&self, username: &str) -> Result<Vec<BlocklistEntry>>;

    /// Every entry, newest first.
    async fn list_all(&self) -> Result<Vec<BlocklistEntry>>;

    /// Removes every entry for `username` and returns how many went.
    async fn remove_all_by_username(&self, username: &str) -> Result<u64>;

    /// Rewrites reason, evidence URL, severity and metadata of `entry.id`.
    async fn update(&self, entry: &BlocklistEntry) -> Result<()>;

    async fn is_blocked(&self, username: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Outcome of importing one configured remote source.
#[derive(Debug)]
pub struct SourceImport {
    pub name: String,
    pub result: Result<usize>,
}

pub struct BlocklistManager<S> {
    store: S,
    export_dir: PathBuf,
    auto_export: bool,
}

impl<S: BlocklistStore> BlocklistManager<S> {
    pub fn new(store: S, config: &BlocklistConfig) -> Self {
        Self {
            store,
            export_dir: config.export_path.clone(),
            auto_export: config.auto_export,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Default export destination, `<export_path>/blocklist.<ext>`.
    pub fn default_export_path(&self, format: ExportFormat) -> PathBuf {
        self.export_dir
            .join(format!("blocklist.{}", format.extension()))
    }

    pub async fn block(&self, entry: &BlocklistEntry) -> Result<()> {
        self.store
            .add(entry)
            .await
            .with_context(|| format!("Failed to add blocklist entry for '{}'", entry.username))?;
        tracing::info!(username = %entry.username, id = %entry.id, severity = %entry.severity, "Blocked user");
        self.after_mutation().await;
        Ok(())
    }

    pub async fn unblock(&self, username: &str) -> Result<u64> {
        let removed = self
            .store
            .remove_all_by_username(username)
            .await
            .with_context(|| format!("Failed to unblock '{username}'"))?;
        tracing::info!(username, removed, "Unblocked user");
        self.after_mutation().await;
        Ok(removed)
    }

    pub async fn is_blocked(&self, username: &str) -> Result<bool> {
        self.store
            .is_blocked(username)
            .await
            .with_context(|| format!("Failed to check blocklist for '{username}'"))
    }

    pub async fn entries_for(&self, username: &str) -> Result<Vec<BlocklistEntry>> {
        self.store
            .list_by_username(username)
            .await
            .with_context(|| format!("Failed to list blocklist entries for '{username}'"))
    }

    pub async fn list(&self) -> Result<Vec<BlocklistEntry>> {
        self.store
            .list_all()
            .await
            .context("Failed to list blocklist entries")
    }

    pub async fn export<W: Write>(&self, format: ExportFormat, writer: W) -> Result<usize> {
        let entries = self.list().await?;
        match format {
            ExportFormat::Json => write_json(&entries, writer)?,
            ExportFormat::Csv => write_csv(&entries, writer)?,
        }
        Ok(entries.len())
    }

    /// Exports to `path`, creating its parent directory. Returns the
    /// number of entries written.
    pub async fn export_to_path(&self, format: ExportFormat, path: &Path) -> Result<usize> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create export file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let count = self.export(format, &mut writer).await?;
        writer
            .flush()
            .with_context(|| format!("Failed to write export file: {}", path.display()))?;
        Ok(count)
    }

    /// Merges `entries` into the store and returns how many were inserted
    /// or escalated.
    pub async fn import_entries(&self, entries: Vec<BlocklistEntry>) -> Result<usize> {
        let mut imported = 0;
        let result = self.reconcile(entries, &mut imported).await;
        if imported > 0 {
            self.after_mutation().await;
        }
        result.map(|()| imported)
    }

    pub async fn import_reader<R: Read>(&self, reader: R) -> Result<usize> {
        let entries: Vec<BlocklistEntry> =
            serde_json::from_reader(reader).context("Failed to parse blocklist JSON")?;
        self.import_entries(entries).await
    }

    pub async fn import_file(&self, path: &Path) -> Result<usize> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open import file: {}", path.display()))?;
        self.import_reader(BufReader::new(file))
            .await
            .with_context(|| format!("Failed to import {}", path.display()))
    }

    pub async fn import_url(&self, url: &str) -> Result<usize> {
        let entries = fetch_remote_entries(url).await?;
        self.import_entries(entries).await
    }

    /// Imports every configured source. A failing source is reported in
    /// its [`SourceImport`] and does not stop the others.
    pub async fn import_sources(&self, sources: &[BlocklistSource]) -> Vec<SourceImport> {
        let mut reports = Vec::with_capacity(sources.len());
        let mut changed = false;
        for source in sources {
            let mut imported = 0;
            let result = match fetch_remote_entries(&source.url).await {
                Ok(entries) => self.reconcile(entries, &mut imported).await,
                Err(e) => Err(e),
            };
            changed |= imported > 0;
            if let Err(e) = &result {
                tracing::warn!(source = %source.name, imported, "Blocklist source failed: {e:#}");
            }
            reports.push(SourceImport {
                name: source.name.clone(),
                result: result.map(|()| imported),
            });
        }
        if changed {
            self.after_mutation().await;
        }
        reports
    }

    /// Merges entries one by one. `imported` counts the writes made so far,
    /// including those before an error.
    async fn reconcile(&self, entries: Vec<BlocklistEntry>, imported: &mut usize) -> Result<()> {
        for mut incoming in entries {
            let existing = self
                .store
                .get(&incoming.id)
                .await
                .with_context(|| format!("Failed to look up blocklist entry {}", incoming.id))?;

            match existing {
                None => {
                    incoming.source = Source::Imported;
                    self.store.add(&incoming).await.with_context(|| {
                        format!("Failed to insert blocklist entry {}", incoming.id)
                    })?;
                    *imported += 1;
                }
                Some(mut current) if incoming.severity > current.severity => {
                    current.reason = incoming.reason;
                    current.evidence_url = incoming.evidence_url;
                    current.severity = incoming.severity;
                    current.metadata = incoming.metadata;
                    self.store.update(&current).await.with_context(|| {
                        format!("Failed to update blocklist entry {}", current.id)
                    })?;
                    *imported += 1;
                }
                Some(_) => {
                    tracing::debug!(id = %incoming.id, "Skipping entry without higher severity");
                }
            }
        }
        Ok(())
    }

    async fn after_mutation(&self) {
        if !self.auto_export {
            return;
        }
        let path = self.default_export_path(ExportFormat::Json);
        if let Err(e) = self.export_to_path(ExportFormat::Json, &path).await {
            tracing::warn!(path = %path.display(), "Auto-export failed: {e:#}");
        }
    }
}

pub fn write_json<W: Write>(entries: &[BlocklistEntry], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, entries).context("Failed to encode JSON")?;
    writeln!(writer)?;
    Ok(())
}

pub fn write_csv<W: Write>(entries: &[BlocklistEntry], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for entry in entries {
        csv.write_record([
            entry.id.as_str(),
            entry.username.as_str(),
            entry.reason.as_str(),
            entry.evidence_url.as_str(),
            entry
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true)
                .as_str(),
            entry.blocked_by.as_str(),
            entry.severity.as_str(),
            entry.source.as_str(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

async fn fetch_remote_entries(url: &str) -> Result<Vec<BlocklistEntry>> {
    let client = http::build_client(http::DEFAULT_TIMEOUT).context("Failed to create HTTP client")?;
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch blocklist from {url}"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("Failed to fetch blocklist from {url}: HTTP {status}");
    }

    let body = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read blocklist from {url}"))?;
    serde_json::from_slice(&body).with_context(|| format!("Failed to parse blocklist from {url}"))
}
