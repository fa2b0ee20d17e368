//! prguard: spam detection for GitHub pull requests.
//!
//! Scans open pull requests with a rule-based classifier, keeps a
//! blocklist of offending authors in SQLite or Turso, and shares that
//! blocklist through JSON/CSV export and merge-by-severity import.

pub mod actions;
pub mod blocklist;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod db;
pub mod github;
pub mod http;
pub mod scan;
pub mod types;

pub use blocklist::{BlocklistManager, BlocklistStore, ExportFormat};
pub use classifier::{Classifier, Scanner};
pub use cli::{Command, Invocation, parse_args};
pub use config::Config;
pub use db::Database;
pub use github::GitHub;
pub use scan::scan_repository;
pub use types::{
    Author, BlockScope, BlocklistEntry, Forge, PullRequest, RecommendedAction, Repo, RepoError,
    ScanResult, ScanResults, Severity, Source,
};
