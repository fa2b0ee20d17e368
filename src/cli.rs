use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::{
    blocklist::ExportFormat,
    types::{Repo, Severity, validate_username},
};

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

#[derive(Args, Debug, Clone, Default)]
struct ScanActionArgs {
    /// Close spam PRs (default: actions.close_prs)
    #[arg(long, overrides_with = "no_auto_close", help_heading = "Actions")]
    auto_close: bool,

    /// Do not close spam PRs, even if enabled in the config
    #[arg(long, overrides_with = "auto_close", help_heading = "Actions")]
    no_auto_close: bool,

    /// Add spam authors to the blocklist (default: actions.block_users)
    #[arg(long, overrides_with = "no_auto_block", help_heading = "Actions")]
    auto_block: bool,

    /// Do not blocklist spam authors, even if enabled in the config
    #[arg(long, overrides_with = "auto_block", help_heading = "Actions")]
    no_auto_block: bool,

    /// Also block spam authors through the GitHub API (requires auto-block)
    #[arg(long, help_heading = "Actions")]
    github_block: bool,

    /// Do not ask for confirmation before acting
    #[arg(short = 'y', long, help_heading = "Actions")]
    yes: bool,
}

fn tri_state(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl From<ScanActionArgs> for ScanActions {
    fn from(args: ScanActionArgs) -> Self {
        Self {
            auto_close: tri_state(args.auto_close, args.no_auto_close),
            auto_block: tri_state(args.auto_block, args.no_auto_block),
            github_block: args.github_block,
            assume_yes: args.yes,
        }
    }
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct ImportArgs {
    /// Path to a JSON blocklist file
    #[arg(short = 'f', long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// URL of a JSON blocklist
    #[arg(short = 'u', long, value_name = "URL")]
    url: Option<String>,

    /// Import every source listed under blocklist.sources
    #[arg(long)]
    sources: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum MigrateArgs {
    /// Apply all pending migrations
    Up,
    /// Roll back the most recent migration
    Down,
    /// Show the current schema version
    Status,
}

#[derive(Subcommand, Debug, Clone)]
enum CommandArgs {
    /// Scan a repository's open pull requests for spam
    Scan {
        #[arg(value_name = "OWNER/REPO")]
        repo: Repo,
        #[command(flatten)]
        actions: ScanActionArgs,
    },

    /// Scan every repository listed in the config
    ScanAll {
        #[command(flatten)]
        actions: ScanActionArgs,
    },

    /// Add a user to the local blocklist
    Block {
        username: String,

        /// Reason for blocking
        #[arg(short = 'r', long)]
        reason: String,

        /// URL of the offending PR or issue
        #[arg(short = 'e', long = "evidence", value_name = "URL")]
        evidence_url: String,

        /// Severity: low, medium or high
        #[arg(short = 's', long, default_value = "medium")]
        severity: Severity,

        /// Also block the user through the GitHub API (affects every repository
        /// of the org or account)
        #[arg(long)]
        github_block: bool,

        /// Do not ask for confirmation before blocking on GitHub
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Remove every blocklist entry for a user
    Unblock { username: String },

    /// Show whether a user is blocked
    Check { username: String },

    /// List all blocklist entries, newest first
    List,

    /// Export the blocklist
    Export {
        #[arg(short = 'f', long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Output path (default: <blocklist.export_path>/blocklist.<format>)
        #[arg(short = 'o', long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Merge entries from a JSON blocklist
    Import {
        #[command(flatten)]
        source: ImportArgs,
    },

    /// Close one or more pull requests
    ClosePr {
        #[arg(value_name = "OWNER/REPO")]
        repo: Repo,

        #[arg(value_name = "PR-NUMBER", required = true, value_parser = clap::value_parser!(u64).range(1..))]
        numbers: Vec<u64>,

        /// Closing comment (default: actions.comment_template)
        #[arg(short = 'c', long)]
        comment: Option<String>,

        /// Add the 'spam' label before closing
        #[arg(short = 'l', long)]
        label: bool,
    },

    /// List pull requests that need manual review
    Review {
        #[arg(value_name = "OWNER/REPO")]
        repo: Repo,
    },

    /// Manage database schema migrations
    Migrate {
        #[command(subcommand)]
        direction: MigrateArgs,
    },

    /// Create a configuration file interactively
    Init {
        /// Write to ~/.config/prguard/config.yaml instead of ./config.yaml
        #[arg(long)]
        global: bool,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "prguard",
    about = "Find spam pull requests on GitHub and keep a shareable blocklist of their authors"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
struct CliArgs {
    /// Path to the configuration file
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CommandArgs,
}

/// Follow-up actions requested for a scan. `None` defers to the config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanActions {
    pub auto_close: Option<bool>,
    pub auto_block: Option<bool>,
    pub github_block: bool,
    pub assume_yes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRequest {
    pub username: String,
    pub reason: String,
    pub evidence_url: String,
    pub severity: Severity,
    pub github_block: bool,
    pub assume_yes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    File(PathBuf),
    Url(String),
    Configured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateDirection {
    Up,
    Down,
    Status,
}

/// A validated command, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan {
        repo: Repo,
        actions: ScanActions,
    },
    ScanAll {
        actions: ScanActions,
    },
    Block(BlockRequest),
    Unblock {
        username: String,
    },
    Check {
        username: String,
    },
    List,
    Export {
        format: ExportFormat,
        output: Option<PathBuf>,
    },
    Import(ImportSource),
    ClosePr {
        repo: Repo,
        numbers: Vec<u64>,
        comment: Option<String>,
        add_label: bool,
    },
    Review {
        repo: Repo,
    },
    Migrate(MigrateDirection),
    Init {
        global: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: Option<PathBuf>,
    pub command: Command,
}

/// Usernames that only look up stored entries. Imported lists may hold
/// handles that `validate_username` would refuse, so only blank input is
/// rejected.
fn existing_username(username: String) -> Result<String> {
    let username = username.trim();
    if username.is_empty() {
        anyhow::bail!("username cannot be empty");
    }
    Ok(username.to_string())
}

fn build_command(args: CommandArgs) -> Result<Command> {
    let command = match args {
        CommandArgs::Scan { repo, actions } => Command::Scan {
            repo,
            actions: actions.into(),
        },
        CommandArgs::ScanAll { actions } => Command::ScanAll {
            actions: actions.into(),
        },
        CommandArgs::Block {
            username,
            reason,
            evidence_url,
            severity,
            github_block,
            yes,
        } => {
            validate_username(&username)?;
            if reason.trim().is_empty() {
                anyhow::bail!("--reason cannot be empty");
            }
            url::Url::parse(&evidence_url)
                .map_err(|e| anyhow::anyhow!("Invalid evidence URL '{evidence_url}': {e}"))?;
            Command::Block(BlockRequest {
                username,
                reason,
                evidence_url,
                severity,
                github_block,
                assume_yes: yes,
            })
        }
        CommandArgs::Unblock { username } => Command::Unblock {
            username: existing_username(username)?,
        },
        CommandArgs::Check { username } => Command::Check {
            username: existing_username(username)?,
        },
        CommandArgs::List => Command::List,
        CommandArgs::Export { format, output } => Command::Export { format, output },
        CommandArgs::Import { source } => Command::Import(match source {
            ImportArgs {
                file: Some(path), ..
            } => ImportSource::File(path),
            ImportArgs { url: Some(url), .. } => {
                url::Url::parse(&url)
                    .map_err(|e| anyhow::anyhow!("Invalid import URL '{url}': {e}"))?;
                ImportSource::Url(url)
            }
            _ => ImportSource::Configured,
        }),
        CommandArgs::ClosePr {
            repo,
            numbers,
            comment,
            label,
        } => Command::ClosePr {
            repo,
            numbers,
            comment,
            add_label: label,
        },
        CommandArgs::Review { repo } => Command::Review { repo },
        CommandArgs::Migrate { direction } => Command::Migrate(match direction {
            MigrateArgs::Up => MigrateDirection::Up,
            MigrateArgs::Down => MigrateDirection::Down,
            MigrateArgs::Status => MigrateDirection::Status,
        }),
        CommandArgs::Init { global } => Command::Init { global },
    };
    Ok(command)
}

/// Parses and validates command-line arguments.
///
/// Clap errors (including `--help` and `--version`) are returned as
/// [`clap::Error`] inside the `anyhow::Error` so the caller can pick the
/// exit status.
pub fn parse_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = CliArgs::try_parse_from(args)?;
    Ok(Invocation {
        config_path: cli.config,
        command: build_command(cli.command)?,
    })
}
