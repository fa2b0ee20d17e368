use std::{
    io::{BufRead, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use prguard::{
    BlocklistEntry, BlocklistManager, Command, Config, Database, Forge, GitHub, Repo, Scanner,
    Source,
    actions::{ActionFlags, collect_spam_users, close_pull_requests, execute_actions},
    cli::{BlockRequest, ImportSource, MigrateDirection, ScanActions},
    db::MIGRATIONS,
    scan_repository,
};

use crate::{display::*, init, prompt::confirm};

/// Terminal streams shared by every command.
pub struct Console<R, W> {
    pub input: R,
    pub out: W,
}

type Blocklist = BlocklistManager<Database>;

pub async fn run<R: BufRead, W: Write>(
    config_path: Option<&Path>,
    command: Command,
    console: &mut Console<R, W>,
) -> Result<()> {
    match command {
        Command::Init { global } => {
            let path = init::config_path(global)?;
            let git_user = init::detect_git_user();
            init::run(&path, git_user.as_deref(), &mut console.input, &mut console.out)?;
            Ok(())
        }
        Command::Migrate(direction) => {
            let config = Config::load(config_path)?;
            migrate(&config, direction, &mut console.out).await
        }
        Command::Scan { repo, actions } => {
            let (config, blocklist) = open_blocklist(config_path).await?;
            let forge = GitHub::new(&config.github.token)?;
            scan(&config, &forge, &blocklist, &repo, actions, console).await
        }
        Command::ScanAll { actions } => {
            let (config, blocklist) = open_blocklist(config_path).await?;
            let forge = GitHub::new(&config.github.token)?;
            scan_all(&config, &forge, &blocklist, actions, console).await
        }
        Command::Block(request) => {
            let (config, blocklist) = open_blocklist(config_path).await?;
            let forge = GitHub::new(&config.github.token)?;
            block(&config, &forge, &blocklist, request, console).await
        }
        Command::Unblock { username } => {
            let (_, blocklist) = open_blocklist(config_path).await?;
            unblock(&blocklist, &username, &mut console.out).await
        }
        Command::Check { username } => {
            let (_, blocklist) = open_blocklist(config_path).await?;
            let entries = blocklist.entries_for(&username).await?;
            display_check(&username, &entries, Utc::now(), &mut console.out)
        }
        Command::List => {
            let (_, blocklist) = open_blocklist(config_path).await?;
            let entries = blocklist.list().await?;
            display_entry_list(&entries, Utc::now(), &mut console.out)
        }
        Command::Export { format, output } => {
            let (_, blocklist) = open_blocklist(config_path).await?;
            let path = output.unwrap_or_else(|| blocklist.default_export_path(format));
            let count = blocklist.export_to_path(format, &path).await?;
            let shown = std::fs::canonicalize(&path).unwrap_or(path);
            writeln!(
                console.out,
                "✓ Exported {count} {} to {}",
                pluralize(count, "entry", "entries"),
                shown.display()
            )?;
            Ok(())
        }
        Command::Import(source) => {
            let (config, blocklist) = open_blocklist(config_path).await?;
            import(&config, &blocklist, source, &mut console.out).await
        }
        Command::ClosePr {
            repo,
            numbers,
            comment,
            add_label,
        } => {
            let config = Config::load(config_path)?;
            let forge = GitHub::new(&config.github.token)?;
            let comment = comment.unwrap_or_else(|| config.actions.comment_template.clone());
            let add_label = add_label || config.actions.add_spam_label;
            close_prs(&forge, &repo, &numbers, &comment, add_label, &mut console.out).await
        }
        Command::Review { repo } => {
            let config = Config::load(config_path)?;
            let forge = GitHub::new(&config.github.token)?;
            writeln!(console.out, "Scanning repository {repo} for PRs needing review...")?;
            writeln!(console.out)?;
            let scanner = Scanner::new(config.filters.clone());
            let results = scan_repository(&scanner, &forge, &repo, Utc::now())
                .await
                .with_context(|| format!("Scan of {repo} failed"))?;
            display_review(&results.uncertain, &mut console.out)
        }
    }
}

/// Loads the config and opens the migrated blocklist database.
async fn open_blocklist(config_path: Option<&Path>) -> Result<(Config, Blocklist)> {
    let config = Config::load(config_path)?;
    let db = Database::connect(&config.database)
        .await
        .context("Failed to initialize database")?;
    let blocklist = BlocklistManager::new(db, &config.blocklist);
    Ok((config, blocklist))
}

async fn scan<F, R, W>(
    config: &Config,
    forge: &F,
    blocklist: &Blocklist,
    repo: &Repo,
    actions: ScanActions,
    console: &mut Console<R, W>,
) -> Result<()>
where
    F: Forge + Sync,
    R: BufRead,
    W: Write,
{
    let flags = ActionFlags::resolve(
        actions.auto_close,
        actions.auto_block,
        actions.github_block,
        config,
    )?;
    scan_with_flags(config, forge, blocklist, repo, flags, actions.assume_yes, console).await
}

async fn scan_with_flags<F, R, W>(
    config: &Config,
    forge: &F,
    blocklist: &Blocklist,
    repo: &Repo,
    flags: ActionFlags,
    assume_yes: bool,
    console: &mut Console<R, W>,
) -> Result<()>
where
    F: Forge + Sync,
    R: BufRead,
    W: Write,
{
    let out = &mut console.out;
    writeln!(out, "Scanning repository {repo}...")?;
    writeln!(out)?;

    let scanner = Scanner::new(config.filters.clone());
    let results = scan_repository(&scanner, forge, repo, Utc::now())
        .await
        .with_context(|| format!("Scan of {repo} failed"))?;

    display_scan_summary(&results, out)?;
    display_spam(&results.spam, out)?;
    display_uncertain(&results.uncertain, out)?;

    if results.spam.is_empty() {
        return Ok(());
    }
    if !flags.any() {
        return display_action_suggestions(repo, out);
    }

    let users = collect_spam_users(&results.spam);
    display_action_plan(results.spam.len(), users.len(), flags, out)?;
    writeln!(out)?;
    if !assume_yes && !confirm("Continue?", &mut console.input, &mut console.out)? {
        writeln!(console.out, "Actions cancelled by user.")?;
        return Ok(());
    }

    let outcomes = execute_actions(forge, blocklist, config, repo, &results.spam, flags).await;
    display_action_outcomes(&outcomes, &mut console.out)?;
    writeln!(console.out)?;
    writeln!(console.out, "✓ Automated actions completed")?;
    Ok(())
}

async fn scan_all<F, R, W>(
    config: &Config,
    forge: &F,
    blocklist: &Blocklist,
    actions: ScanActions,
    console: &mut Console<R, W>,
) -> Result<()>
where
    F: Forge + Sync,
    R: BufRead,
    W: Write,
{
    let flags = ActionFlags::resolve(
        actions.auto_close,
        actions.auto_block,
        actions.github_block,
        config,
    )?;
    if config.repositories.is_empty() {
        bail!("No repositories configured. Add repositories to your config.yaml file");
    }

    writeln!(
        console.out,
        "Scanning {} configured {}...",
        config.repositories.len(),
        pluralize(config.repositories.len(), "repository", "repositories")
    )?;

    for repo in &config.repositories {
        writeln!(console.out)?;
        writeln!(console.out, "=== {repo} ===")?;
        if let Err(e) =
            scan_with_flags(config, forge, blocklist, repo, flags, actions.assume_yes, console)
                .await
        {
            tracing::warn!(repo = %repo, "Scan failed: {e:#}");
            writeln!(console.out, "Error scanning {repo}: {e:#}")?;
        }
    }
    Ok(())
}

async fn block<F, R, W>(
    config: &Config,
    forge: &F,
    blocklist: &Blocklist,
    request: BlockRequest,
    console: &mut Console<R, W>,
) -> Result<()>
where
    F: Forge + Sync,
    R: BufRead,
    W: Write,
{
    let scope = if request.github_block {
        Some(config.block_scope().context(
            "Cannot use --github-block: neither github.org nor github.user is configured",
        )?)
    } else {
        None
    };

    let entry = BlocklistEntry::new(
        &request.username,
        &request.reason,
        &request.evidence_url,
        config.blocked_by(),
        request.severity,
        Source::Manual,
    );
    blocklist.block(&entry).await?;
    display_blocked_entry(&entry, &mut console.out)?;

    let Some(scope) = scope else {
        return display_local_only_note(&mut console.out);
    };

    display_github_block_warning(&request.username, &scope, &mut console.out)?;
    if !request.assume_yes && !confirm("Continue?", &mut console.input, &mut console.out)? {
        writeln!(
            console.out,
            "GitHub blocking cancelled. User remains in local blocklist."
        )?;
        return Ok(());
    }

    forge
        .block_user(&scope, &request.username)
        .await
        .context("Failed to block user via GitHub API")?;
    display_github_blocked(&request.username, &scope, &mut console.out)
}

async fn unblock<W: Write>(blocklist: &Blocklist, username: &str, out: &mut W) -> Result<()> {
    if !blocklist.is_blocked(username).await? {
        writeln!(out, "User {username} is not in the blocklist")?;
        return Ok(());
    }
    let removed = blocklist.unblock(username).await?;
    writeln!(
        out,
        "✓ User {username} has been removed from the blocklist ({removed} {} deleted)",
        pluralize(removed as usize, "entry", "entries")
    )?;
    Ok(())
}

async fn import<W: Write>(
    config: &Config,
    blocklist: &Blocklist,
    source: ImportSource,
    out: &mut W,
) -> Result<()> {
    let imported = match source {
        ImportSource::File(path) => {
            writeln!(out, "Importing from file: {}", path.display())?;
            blocklist.import_file(&path).await?
        }
        ImportSource::Url(url) => {
            writeln!(out, "Importing from URL: {url}")?;
            blocklist.import_url(&url).await?
        }
        ImportSource::Configured => {
            if config.blocklist.sources.is_empty() {
                bail!("No blocklist sources configured under blocklist.sources");
            }
            writeln!(
                out,
                "Importing from {} configured {}:",
                config.blocklist.sources.len(),
                pluralize(config.blocklist.sources.len(), "source", "sources")
            )?;
            let reports = blocklist.import_sources(&config.blocklist.sources).await;
            display_source_imports(&reports, out)?
        }
    };
    display_imported(imported, out)
}

async fn close_prs<F, W>(
    forge: &F,
    repo: &Repo,
    numbers: &[u64],
    comment: &str,
    add_label: bool,
    out: &mut W,
) -> Result<()>
where
    F: Forge + Sync,
    W: Write,
{
    writeln!(
        out,
        "Closing {} {} in {repo}...",
        numbers.len(),
        pluralize(numbers.len(), "PR", "PRs")
    )?;
    let outcomes = close_pull_requests(forge, repo, numbers, Some(comment), add_label).await;
    display_action_outcomes(&outcomes, out)?;

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, prguard::actions::ActionOutcome::CloseFailed { .. }))
        .count();
    if failed > 0 {
        bail!(
            "Failed to close {failed} of {} pull {}",
            numbers.len(),
            pluralize(numbers.len(), "request", "requests")
        );
    }
    Ok(())
}

async fn migrate<W: Write>(config: &Config, direction: MigrateDirection, out: &mut W) -> Result<()> {
    let db = Database::open(&config.database)?;
    match direction {
        MigrateDirection::Up => {
            let applied = db.migrate_up().await.context("Migration failed")?;
            for migration in &applied {
                writeln!(out, "  Applied {:03}_{}", migration.version, migration.name)?;
            }
            writeln!(out, "✓ Migrations completed successfully")?;
            writeln!(out, "  Current version: {}", db.migration_status().await?)?;
        }
        MigrateDirection::Down => {
            let before = db.migration_status().await?;
            match db.migrate_down().await.context("Rollback failed")? {
                None => writeln!(out, "No migrations to roll back")?,
                Some(migration) => {
                    let after = db.migration_status().await?;
                    writeln!(
                        out,
                        "✓ Rolled back {:03}_{}",
                        migration.version, migration.name
                    )?;
                    writeln!(out, "  Version: {before} -> {after}")?;
                }
            }
        }
        MigrateDirection::Status => {
            let version = db.migration_status().await?;
            let latest = MIGRATIONS.last().map_or(0, |m| m.version);
            writeln!(out, "Database migration status")?;
            writeln!(out, "  Current version: {version}")?;
            writeln!(out, "  Latest version: {latest}")?;
            if version < latest {
                writeln!(out, "  Pending migrations: {}", latest - version)?;
            }
        }
    }
    Ok(())
}
