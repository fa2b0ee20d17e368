//! Follow-up actions on spam found by a scan: blocklisting authors and
//! closing their pull requests.

use anyhow::{Result, bail};

use crate::{
    blocklist::{BlocklistManager, BlocklistStore},
    config::Config,
    types::{BlocklistEntry, Forge, Repo, ScanResult, Severity, Source},
};

pub const SPAM_LABEL: &str = "spam";

/// Which actions a scan should take once spam is found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionFlags {
    pub close_prs: bool,
    pub block_users: bool,
    pub github_block: bool,
}

impl ActionFlags {
    /// Combines command-line flags with the `actions` config section.
    ///
    /// `None` means the flag was not given and the config value applies;
    /// an explicit `Some(false)` overrides a `true` in the config.
    pub fn resolve(
        auto_close: Option<bool>,
        auto_block: Option<bool>,
        github_block: bool,
        config: &Config,
    ) -> Result<Self> {
        let flags = Self {
            close_prs: auto_close.unwrap_or(config.actions.close_prs),
            block_users: auto_block.unwrap_or(config.actions.block_users),
            github_block,
        };
        if flags.github_block && !flags.block_users {
            bail!("--github-block requires --auto-block");
        }
        Ok(flags)
    }

    pub fn any(&self) -> bool {
        self.close_prs || self.block_users
    }
}

/// An author to blocklist, described by their first spam PR.
#[derive(Debug, Clone, PartialEq)]
pub struct SpamUser {
    pub username: String,
    pub pr_number: u64,
    pub evidence_url: String,
    pub severity: Severity,
    pub reasons: Vec<String>,
}

impl SpamUser {
    pub fn block_reason(&self) -> String {
        format!("Auto-detected spam: {}", self.reasons.join(", "))
    }
}

/// One user per author, in order of first appearance.
pub fn collect_spam_users(spam: &[ScanResult]) -> Vec<SpamUser> {
    let mut users: Vec<SpamUser> = Vec::new();
    for result in spam {
        if users.iter().any(|u| u.username == result.pr.author) {
            continue;
        }
        users.push(SpamUser {
            username: result.pr.author.clone(),
            pr_number: result.pr.number,
            evidence_url: result.pr.url.clone(),
            severity: result.severity,
            reasons: result.reasons.clone(),
        });
    }
    users
}

/// What happened to one action target.
#[derive(Debug)]
pub enum ActionOutcome {
    Blocked { username: String },
    BlockFailed { username: String, error: anyhow::Error },
    GitHubBlocked { username: String, organization: bool },
    GitHubBlockFailed { username: String, error: anyhow::Error },
    LabelFailed { number: u64, error: anyhow::Error },
    Closed { number: u64 },
    CloseFailed { number: u64, error: anyhow::Error },
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ActionOutcome::BlockFailed { .. }
                | ActionOutcome::GitHubBlockFailed { .. }
                | ActionOutcome::LabelFailed { .. }
                | ActionOutcome::CloseFailed { .. }
        )
    }
}

/// Adds each user to the blocklist and, with `github_block`, blocks them
/// on GitHub too. Failures are recorded and the loop carries on.
pub async fn block_spam_users<F, S>(
    forge: &F,
    blocklist: &BlocklistManager<S>,
    config: &Config,
    users: &[SpamUser],
    github_block: bool,
) -> Vec<ActionOutcome>
where
    F: Forge + Sync + ?Sized,
    S: BlocklistStore,
{
    let mut outcomes = Vec::new();
    let scope = config.block_scope();

    for user in users {
        let entry = BlocklistEntry::new(
            &user.username,
            user.block_reason(),
            &user.evidence_url,
            config.blocked_by(),
            user.severity,
            Source::AutoDetected,
        );
        if let Err(error) = blocklist.block(&entry).await {
            outcomes.push(ActionOutcome::BlockFailed {
                username: user.username.clone(),
                error,
            });
            continue;
        }
        outcomes.push(ActionOutcome::Blocked {
            username: user.username.clone(),
        });

        if !github_block {
            continue;
        }
        let Some(scope) = &scope else {
            outcomes.push(ActionOutcome::GitHubBlockFailed {
                username: user.username.clone(),
                error: anyhow::anyhow!("neither github.org nor github.user is configured"),
            });
            continue;
        };
        match forge.block_user(scope, &user.username).await {
            Ok(()) => outcomes.push(ActionOutcome::GitHubBlocked {
                username: user.username.clone(),
                organization: matches!(scope, crate::types::BlockScope::Organization(_)),
            }),
            Err(error) => outcomes.push(ActionOutcome::GitHubBlockFailed {
                username: user.username.clone(),
                error,
            }),
        }
    }

    outcomes
}

/// Closes pull requests with `comment`, labelling them `spam` first when
/// `add_label` is set. A failed label does not prevent the close.
pub async fn close_pull_requests<F>(
    forge: &F,
    repo: &Repo,
    numbers: &[u64],
    comment: Option<&str>,
    add_label: bool,
) -> Vec<ActionOutcome>
where
    F: Forge + Sync + ?Sized,
{
    let mut outcomes = Vec::new();
    for &number in numbers {
        if add_label {
            if let Err(error) = forge.add_label(repo, number, SPAM_LABEL).await {
                outcomes.push(ActionOutcome::LabelFailed { number, error });
            }
        }
        match forge.close_pull_request(repo, number, comment).await {
            Ok(()) => {
                tracing::info!(repo = %repo, pr = number, "Closed pull request");
                outcomes.push(ActionOutcome::Closed { number });
            }
            Err(error) => outcomes.push(ActionOutcome::CloseFailed { number, error }),
        }
    }
    outcomes
}

/// Runs the enabled actions against a scan's spam results: blocking first,
/// then closing. Callers are expected to have confirmed with the user.
pub async fn execute_actions<F, S>(
    forge: &F,
    blocklist: &BlocklistManager<S>,
    config: &Config,
    repo: &Repo,
    spam: &[ScanResult],
    flags: ActionFlags,
) -> Vec<ActionOutcome>
where
    F: Forge + Sync + ?Sized,
    S: BlocklistStore,
{
    let mut outcomes = Vec::new();

    if flags.block_users {
        let users = collect_spam_users(spam);
        outcomes.extend(block_spam_users(forge, blocklist, config, &users, flags.github_block).await);
    }

    if flags.close_prs {
        let numbers: Vec<u64> = spam.iter().map(|r| r.pr.number).collect();
        outcomes.extend(
            close_pull_requests(
                forge,
                repo,
                &numbers,
                Some(config.actions.comment_template.as_str()),
                config.actions.add_spam_label,
            )
            .await,
        );
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::BlocklistConfig,
        db::Database,
        types::{Author, BlockScope, PullRequest, RecommendedAction},
    };

    #[derive(Default)]
    struct RecordingForge {
        calls: Mutex<Vec<String>>,
        fail_close: Vec<u64>,
        fail_label: bool,
    }

    impl RecordingForge {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Forge for RecordingForge {
        async fn fetch_open_pull_requests(&self, _: &Repo) -> Result<Vec<PullRequest>> {
            Ok(Vec::new())
        }

        async fn fetch_author(&self, login: &str) -> Result<Author> {
            bail!("unknown author {login}")
        }

        async fn close_pull_request(
            &self,
            repo: &Repo,
            number: u64,
            comment: Option<&str>,
        ) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("close {repo}#{number} {}", comment.unwrap_or("-")));
            if self.fail_close.contains(&number) {
                bail!("PR #{number} is locked");
            }
            Ok(())
        }

        async fn add_label(&self, repo: &Repo, number: u64, label: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("label {repo}#{number} {label}"));
            if self.fail_label {
                bail!("label permission denied");
            }
            Ok(())
        }

        async fn block_user(&self, scope: &BlockScope, username: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("block {scope:?} {username}"));
            Ok(())
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.github.token = "token".to_string();
        config.github.org = "acme".to_string();
        config.actions.comment_template = "closing as spam".to_string();
        config
    }

    fn spam(number: u64, author: &str, reasons: &[&str]) -> ScanResult {
        ScanResult {
            pr: PullRequest {
                number,
                title: "Update README.md".to_string(),
                body: String::new(),
                author: author.to_string(),
                created_at: Utc::now(),
                files_changed: 1,
                additions: 1,
                deletions: 0,
                files: vec!["README.md".to_string()],
                state: "open".to_string(),
                url: format!("https://github.com/acme/widgets/pull/{number}"),
            },
            is_spam: true,
            is_uncertain: false,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
            severity: Severity::High,
            recommended_action: RecommendedAction::BlockAndClose,
        }
    }

    fn repo() -> Repo {
        Repo::new("acme", "widgets").unwrap()
    }

    #[test]
    fn test_flags_fall_back_to_config() {
        let mut config = config();
        config.actions.close_prs = true;

        let flags = ActionFlags::resolve(None, None, false, &config).unwrap();
        assert_eq!(
            flags,
            ActionFlags {
                close_prs: true,
                block_users: false,
                github_block: false
            }
        );
    }

    #[test]
    fn test_explicit_flags_override_config() {
        let mut config = config();
        config.actions.close_prs = true;
        config.actions.block_users = false;

        let flags = ActionFlags::resolve(Some(false), Some(true), true, &config).unwrap();
        assert_eq!(
            flags,
            ActionFlags {
                close_prs: false,
                block_users: true,
                github_block: true
            }
        );
    }

    #[test]
    fn test_github_block_requires_auto_block() {
        let err = ActionFlags::resolve(None, None, true, &config()).unwrap_err();
        assert!(err.to_string().contains("--github-block requires --auto-block"));

        let mut config = config();
        config.actions.block_users = true;
        assert!(ActionFlags::resolve(None, None, true, &config).is_ok());
        assert!(ActionFlags::resolve(None, Some(false), true, &config).is_err());
    }

    #[test]
    fn test_collect_spam_users_keeps_first_pr_per_author() {
        let results = vec![
            spam(4, "spammer", &["Contains spam phrases"]),
            spam(2, "other", &["Single-file README-only edit"]),
            spam(9, "spammer", &["Single-file README-only edit"]),
        ];

        let users = collect_spam_users(&results);

        assert_eq!(users.len(), 2);
        assert_eq!(users[0].username, "spammer");
        assert_eq!(users[0].pr_number, 4);
        assert_eq!(users[0].reasons, vec!["Contains spam phrases"]);
        assert_eq!(users[1].username, "other");
    }

    #[test]
    fn test_block_reason_joins_reasons() {
        let users = collect_spam_users(&[spam(
            1,
            "spammer",
            &["Single-file README-only edit", "Account created recently"],
        )]);
        assert_eq!(
            users[0].block_reason(),
            "Auto-detected spam: Single-file README-only edit, Account created recently"
        );
    }

    #[tokio::test]
    async fn test_execute_blocks_then_closes() {
        let forge = RecordingForge::default();
        let db = Database::open_in_memory().await.unwrap();
        let blocklist = BlocklistManager::new(db, &BlocklistConfig::default());
        let mut config = config();
        config.actions.add_spam_label = true;
        let flags = ActionFlags {
            close_prs: true,
            block_users: true,
            github_block: true,
        };
        let results = vec![
            spam(1, "spammer", &["Single-file README-only edit"]),
            spam(2, "spammer", &["Single-file README-only edit"]),
        ];

        let outcomes = execute_actions(&forge, &blocklist, &config, &repo(), &results, flags).await;

        assert!(outcomes.iter().all(|o| !o.is_failure()));
        assert_eq!(
            forge.calls(),
            vec![
                r#"block Organization("acme") spammer"#,
                "label acme/widgets#1 spam",
                "close acme/widgets#1 closing as spam",
                "label acme/widgets#2 spam",
                "close acme/widgets#2 closing as spam",
            ]
        );

        let entries = blocklist.entries_for("spammer").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, Source::AutoDetected);
        assert_eq!(entries[0].blocked_by, "acme");
        assert_eq!(
            entries[0].reason,
            "Auto-detected spam: Single-file README-only edit"
        );
        assert_eq!(
            entries[0].evidence_url,
            "https://github.com/acme/widgets/pull/1"
        );
    }

    #[tokio::test]
    async fn test_close_failures_do_not_stop_the_loop() {
        let forge = RecordingForge {
            fail_close: vec![1],
            fail_label: true,
            ..Default::default()
        };

        let outcomes = close_pull_requests(&forge, &repo(), &[1, 2], Some("bye"), true).await;

        let summary: Vec<String> = outcomes
            .iter()
            .map(|o| match o {
                ActionOutcome::LabelFailed { number, .. } => format!("label-failed {number}"),
                ActionOutcome::CloseFailed { number, .. } => format!("close-failed {number}"),
                ActionOutcome::Closed { number } => format!("closed {number}"),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(
            summary,
            vec!["label-failed 1", "close-failed 1", "label-failed 2", "closed 2"]
        );
    }

    #[tokio::test]
    async fn test_block_without_github_block_never_calls_api() {
        let forge = RecordingForge::default();
        let db = Database::open_in_memory().await.unwrap();
        let blocklist = BlocklistManager::new(db, &BlocklistConfig::default());
        let users = collect_spam_users(&[spam(3, "spammer", &["Contains spam phrases"])]);

        let outcomes = block_spam_users(&forge, &blocklist, &config(), &users, false).await;

        assert!(matches!(outcomes.as_slice(), [ActionOutcome::Blocked { username }] if username == "spammer"));
        assert!(forge.calls().is_empty());
        assert!(blocklist.is_blocked("spammer").await.unwrap());
    }
}
