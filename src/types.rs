use std::{fmt, str::FromStr, sync::LazyLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static USERNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,38})(?:\[bot\])?$")
        .expect("username pattern is a valid regex")
});

/// How serious a block is. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Numeric rank used when merging entries: low=1, medium=2, high=3.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid severity '{0}', must be low/medium/high")]
pub struct InvalidSeverity(pub String);

impl FromStr for Severity {
    type Err = InvalidSeverity;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(InvalidSeverity(other.to_string())),
        }
    }
}

/// Provenance of a blocklist entry. Not ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Manual,
    Imported,
    AutoDetected,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Manual => "manual",
            Source::Imported => "imported",
            Source::AutoDetected => "auto-detected",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid source '{0}', must be manual/imported/auto-detected")]
pub struct InvalidSource(pub String);

impl FromStr for Source {
    type Err = InvalidSource;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Source::Manual),
            "imported" => Ok(Source::Imported),
            "auto-detected" => Ok(Source::AutoDetected),
            other => Err(InvalidSource(other.to_string())),
        }
    }
}

fn default_metadata() -> String {
    "{}".to_string()
}

/// One blocking decision against a GitHub account.
///
/// A username may appear in many entries (one per offending PR or per
/// import source); `id` is what identifies an entry across merges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocklistEntry {
    pub id: String,
    pub username: String,
    pub reason: String,
    pub evidence_url: String,
    pub timestamp: DateTime<Utc>,
    pub blocked_by: String,
    pub severity: Severity,
    pub source: Source,
    #[serde(default = "default_metadata")]
    pub metadata: String,
}

impl BlocklistEntry {
    pub fn new(
        username: impl Into<String>,
        reason: impl Into<String>,
        evidence_url: impl Into<String>,
        blocked_by: impl Into<String>,
        severity: Severity,
        source: Source,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            reason: reason.into(),
            evidence_url: evidence_url.into(),
            timestamp: Utc::now(),
            blocked_by: blocked_by.into(),
            severity,
            source,
            metadata: default_metadata(),
        }
    }
}

/// Pull request data as seen by the classifier. Fetched per scan, never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub files_changed: usize,
    pub additions: u64,
    pub deletions: u64,
    pub files: Vec<String>,
    pub state: String,
    pub url: String,
}

impl PullRequest {
    pub fn total_lines(&self) -> u64 {
        self.additions + self.deletions
    }
}

/// Account metadata for a PR author.
#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub login: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedAction {
    BlockAndClose,
    ManualReview,
    None,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::BlockAndClose => "block user and close PR",
            RecommendedAction::ManualReview => "manual review recommended",
            RecommendedAction::None => "no action needed",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification outcome for one pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub pr: PullRequest,
    pub is_spam: bool,
    pub is_uncertain: bool,
    pub reasons: Vec<String>,
    pub severity: Severity,
    pub recommended_action: RecommendedAction,
}

/// Scan outcome for a whole repository, partitioned in fetch order.
#[derive(Debug, Default)]
pub struct ScanResults {
    pub total: usize,
    pub spam: Vec<ScanResult>,
    pub uncertain: Vec<ScanResult>,
    pub clean: Vec<ScanResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    #[error("repository must be in format 'owner/repo', got: '{0}'")]
    InvalidFormat(String),
    #[error("repository owner cannot be empty")]
    EmptyOwner,
    #[error("repository name cannot be empty")]
    EmptyName,
}

/// A GitHub repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repo {
    pub owner: String,
    pub name: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoError> {
        let owner = owner.into();
        let name = name.into();
        if owner.trim().is_empty() {
            return Err(RepoError::EmptyOwner);
        }
        if name.trim().is_empty() {
            return Err(RepoError::EmptyName);
        }
        Ok(Self { owner, name })
    }

    pub fn parse(repo: &str) -> Result<Self, RepoError> {
        let parts: Vec<&str> = repo.trim().split('/').collect();
        if parts.len() != 2 {
            return Err(RepoError::InvalidFormat(repo.to_string()));
        }
        Self::new(parts[0], parts[1])
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for Repo {
    type Err = RepoError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Repo::parse(s)
    }
}

/// Where a GitHub-level block applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockScope {
    /// Blocks the user from every repository of the organization.
    Organization(String),
    /// Blocks the user from every repository owned by the token's account.
    Personal(String),
}

/// Checks a GitHub handle before it is written anywhere.
pub fn validate_username(username: &str) -> Result<()> {
    if !USERNAME_PATTERN.is_match(username) {
        anyhow::bail!("Invalid GitHub username: '{}'", username);
    }
    Ok(())
}

/// Source of pull request data and the GitHub-side actions prguard takes.
#[async_trait]
pub trait Forge {
    /// Returns every open pull request, in the order the API yields them.
    async fn fetch_open_pull_requests(&self, repo: &Repo) -> Result<Vec<PullRequest>>;

    async fn fetch_author(&self, login: &str) -> Result<Author>;

    /// Posts `comment` (when given) and then closes the pull request.
    async fn close_pull_request(
        &self,
        repo: &Repo,
        number: u64,
        comment: Option<&str>,
    ) -> Result<()>;

    async fn add_label(&self, repo: &Repo, number: u64, label: &str) -> Result<()>;

    async fn block_user(&self, scope: &BlockScope, username: &str) -> Result<()>;
}
