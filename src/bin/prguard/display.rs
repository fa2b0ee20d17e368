use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use prguard::{
    BlockScope, BlocklistEntry, Repo, ScanResult, ScanResults,
    actions::{ActionFlags, ActionOutcome},
    blocklist::SourceImport,
};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn pluralize<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 { singular } else { plural }
}

fn format_relative_time(time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    use chrono_humanize::HumanTime;
    HumanTime::from(time - now).to_string()
}

fn format_date(time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!(
        "{} ({})",
        time.format(DATE_FORMAT),
        format_relative_time(time, now)
    )
}

fn write_reasons<W: Write>(reasons: &[String], indent: &str, writer: &mut W) -> Result<()> {
    for reason in reasons {
        writeln!(writer, "{indent}- {reason}")?;
    }
    Ok(())
}

pub fn display_scan_summary<W: Write>(results: &ScanResults, writer: &mut W) -> Result<()> {
    writeln!(writer, "Total PRs: {}", results.total)?;
    writeln!(writer, "Spam detected: {}", results.spam.len())?;
    writeln!(writer, "Uncertain: {}", results.uncertain.len())?;
    writeln!(writer, "Clean: {}", results.clean.len())?;
    Ok(())
}

pub fn display_spam<W: Write>(spam: &[ScanResult], writer: &mut W) -> Result<()> {
    if spam.is_empty() {
        return Ok(());
    }
    writeln!(writer)?;
    writeln!(writer, "=== SPAM DETECTED ===")?;
    for result in spam {
        writeln!(writer)?;
        writeln!(writer, "PR #{}: {}", result.pr.number, result.pr.title)?;
        writeln!(writer, "  Author: {}", result.pr.author)?;
        writeln!(writer, "  URL: {}", result.pr.url)?;
        writeln!(writer, "  Severity: {}", result.severity)?;
        writeln!(writer, "  Reasons:")?;
        write_reasons(&result.reasons, "    ", writer)?;
        writeln!(writer, "  Recommended action: {}", result.recommended_action)?;
    }
    Ok(())
}

pub fn display_uncertain<W: Write>(uncertain: &[ScanResult], writer: &mut W) -> Result<()> {
    if uncertain.is_empty() {
        return Ok(());
    }
    writeln!(writer)?;
    writeln!(writer, "=== MANUAL REVIEW NEEDED ===")?;
    for result in uncertain {
        writeln!(writer)?;
        writeln!(writer, "PR #{}: {}", result.pr.number, result.pr.title)?;
        writeln!(writer, "  Author: {}", result.pr.author)?;
        writeln!(writer, "  URL: {}", result.pr.url)?;
        writeln!(writer, "  Reasons:")?;
        write_reasons(&result.reasons, "    ", writer)?;
    }
    Ok(())
}

pub fn display_review<W: Write>(uncertain: &[ScanResult], writer: &mut W) -> Result<()> {
    if uncertain.is_empty() {
        writeln!(writer, "No PRs need manual review - all clear!")?;
        return Ok(());
    }

    writeln!(
        writer,
        "Found {} {} needing manual review:",
        uncertain.len(),
        pluralize(uncertain.len(), "PR", "PRs")
    )?;
    for (i, result) in uncertain.iter().enumerate() {
        let pr = &result.pr;
        writeln!(writer)?;
        writeln!(writer, "{}. PR #{}: {}", i + 1, pr.number, pr.title)?;
        writeln!(writer, "   Author: {}", pr.author)?;
        writeln!(writer, "   URL: {}", pr.url)?;
        writeln!(writer, "   Files changed: {}", pr.files_changed)?;
        writeln!(writer, "   Lines: +{} -{}", pr.additions, pr.deletions)?;
        writeln!(writer, "   Suspicious indicators:")?;
        write_reasons(&result.reasons, "     ", writer)?;
        writeln!(writer, "   Recommendation: {}", result.recommended_action)?;
    }
    writeln!(writer)?;
    writeln!(
        writer,
        "To block a user: prguard block <username> --reason \"...\" --evidence <url>"
    )?;
    writeln!(writer, "To close a PR: prguard close-pr <owner>/<repo> <pr-number>")?;
    Ok(())
}

pub fn display_action_plan<W: Write>(
    spam_prs: usize,
    spam_users: usize,
    flags: ActionFlags,
    writer: &mut W,
) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "=== AUTOMATED ACTIONS ===")?;
    writeln!(writer, "About to take the following actions:")?;
    if flags.block_users {
        writeln!(
            writer,
            "  - Add {spam_users} {} to the local blocklist",
            pluralize(spam_users, "user", "users")
        )?;
        if flags.github_block {
            writeln!(
                writer,
                "  - Block {spam_users} {} via the GitHub API (ALL repositories)",
                pluralize(spam_users, "user", "users")
            )?;
        }
    }
    if flags.close_prs {
        writeln!(
            writer,
            "  - Close {spam_prs} spam {}",
            pluralize(spam_prs, "PR", "PRs")
        )?;
    }
    Ok(())
}

pub fn display_action_outcomes<W: Write>(outcomes: &[ActionOutcome], writer: &mut W) -> Result<()> {
    writeln!(writer)?;
    for outcome in outcomes {
        match outcome {
            ActionOutcome::Blocked { username } => {
                writeln!(writer, "  ✓ Blocked {username} in local blocklist")?
            }
            ActionOutcome::BlockFailed { username, error } => {
                writeln!(writer, "  ✗ Failed to block {username}: {error:#}")?
            }
            ActionOutcome::GitHubBlocked {
                username,
                organization,
            } => {
                let level = if *organization { "org" } else { "personal" };
                writeln!(writer, "    ✓ Blocked {username} on GitHub ({level} level)")?
            }
            ActionOutcome::GitHubBlockFailed { username, error } => {
                writeln!(writer, "    ⚠ Failed to block {username} on GitHub: {error:#}")?
            }
            ActionOutcome::LabelFailed { number, error } => {
                writeln!(writer, "  ⚠ PR #{number}: failed to add label: {error:#}")?
            }
            ActionOutcome::Closed { number } => writeln!(writer, "  ✓ PR #{number} closed")?,
            ActionOutcome::CloseFailed { number, error } => {
                writeln!(writer, "  ✗ PR #{number}: failed to close: {error:#}")?
            }
        }
    }
    Ok(())
}

pub fn display_action_suggestions<W: Write>(repo: &Repo, writer: &mut W) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "To take action automatically, use:")?;
    writeln!(writer, "  prguard scan {repo} --auto-close --auto-block")?;
    writeln!(writer, "  Add --github-block to also block on GitHub")?;
    Ok(())
}

pub fn display_blocked_entry<W: Write>(entry: &BlocklistEntry, writer: &mut W) -> Result<()> {
    writeln!(writer, "✓ User {} added to local blocklist", entry.username)?;
    writeln!(writer, "  ID: {}", entry.id)?;
    writeln!(writer, "  Reason: {}", entry.reason)?;
    writeln!(writer, "  Evidence: {}", entry.evidence_url)?;
    writeln!(writer, "  Severity: {}", entry.severity)?;
    Ok(())
}

pub fn display_github_block_warning<W: Write>(
    username: &str,
    scope: &BlockScope,
    writer: &mut W,
) -> Result<()> {
    writeln!(writer)?;
    match scope {
        BlockScope::Organization(org) => writeln!(
            writer,
            "⚠ WARNING: This will block {username} from ALL repositories in the '{org}' organization."
        )?,
        BlockScope::Personal(user) => writeln!(
            writer,
            "⚠ WARNING: This will block {username} from ALL repositories owned by your personal account ({user})."
        )?,
    }
    Ok(())
}

pub fn display_github_blocked<W: Write>(
    username: &str,
    scope: &BlockScope,
    writer: &mut W,
) -> Result<()> {
    match scope {
        BlockScope::Organization(org) => {
            writeln!(
                writer,
                "✓ User {username} blocked at organization level via GitHub API"
            )?;
            writeln!(writer, "  Scope: ALL repositories in '{org}' organization")?;
            writeln!(writer, "  Required permission: admin:org")?;
        }
        BlockScope::Personal(user) => {
            writeln!(
                writer,
                "✓ User {username} blocked at personal account level via GitHub API"
            )?;
            writeln!(writer, "  Scope: ALL repositories owned by '{user}'")?;
            writeln!(writer, "  Required permission: user")?;
        }
    }
    Ok(())
}

pub fn display_local_only_note<W: Write>(writer: &mut W) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "Note: User is only blocked in prguard's local database.")?;
    writeln!(writer, "To also block via GitHub API, use the --github-block flag")?;
    writeln!(writer, "(This will block them from ALL repos in your org/account)")?;
    Ok(())
}

fn write_entry_fields<W: Write>(
    entry: &BlocklistEntry,
    indent: &str,
    now: DateTime<Utc>,
    writer: &mut W,
) -> Result<()> {
    writeln!(writer, "{indent}Reason: {}", entry.reason)?;
    writeln!(writer, "{indent}Evidence: {}", entry.evidence_url)?;
    writeln!(writer, "{indent}Severity: {}", entry.severity)?;
    writeln!(writer, "{indent}Blocked by: {}", entry.blocked_by)?;
    writeln!(writer, "{indent}Source: {}", entry.source)?;
    writeln!(writer, "{indent}Date: {}", format_date(entry.timestamp, now))?;
    Ok(())
}

pub fn display_check<W: Write>(
    username: &str,
    entries: &[BlocklistEntry],
    now: DateTime<Utc>,
    writer: &mut W,
) -> Result<()> {
    if entries.is_empty() {
        writeln!(writer, "User {username} is NOT blocked")?;
        return Ok(());
    }

    writeln!(writer, "✓ User {username} is BLOCKED")?;
    for entry in entries {
        writeln!(writer)?;
        writeln!(writer, "Entry ID: {}", entry.id)?;
        write_entry_fields(entry, "  ", now, writer)?;
    }
    Ok(())
}

pub fn display_entry_list<W: Write>(
    entries: &[BlocklistEntry],
    now: DateTime<Utc>,
    writer: &mut W,
) -> Result<()> {
    if entries.is_empty() {
        writeln!(writer, "Blocklist is empty")?;
        return Ok(());
    }

    writeln!(writer, "Total entries: {}", entries.len())?;
    for (i, entry) in entries.iter().enumerate() {
        writeln!(writer)?;
        writeln!(writer, "{}. {}", i + 1, entry.username)?;
        writeln!(writer, "   ID: {}", entry.id)?;
        write_entry_fields(entry, "   ", now, writer)?;
    }
    Ok(())
}

pub fn display_imported<W: Write>(count: usize, writer: &mut W) -> Result<()> {
    writeln!(
        writer,
        "✓ Successfully imported {count} {}",
        pluralize(count, "entry", "entries")
    )?;
    Ok(())
}

pub fn display_source_imports<W: Write>(reports: &[SourceImport], writer: &mut W) -> Result<usize> {
    let mut total = 0;
    for report in reports {
        match &report.result {
            Ok(count) => {
                total += count;
                writeln!(
                    writer,
                    "  ✓ {}: {count} {}",
                    report.name,
                    pluralize(*count, "entry", "entries")
                )?;
            }
            Err(e) => writeln!(writer, "  ✗ {}: {e:#}", report.name)?,
        }
    }
    Ok(total)
}
