use chrono::{DateTime, Utc};

use crate::{
    classifier::Classifier,
    types::{Forge, Repo, ScanResults},
};

/// Fetches every open pull request in `repo` and classifies it.
///
/// PRs are handled one at a time in the order the forge returns them and
/// partitioned into spam, uncertain and clean. An author lookup failure
/// only costs that PR its account-age signal; a listing failure aborts.
pub async fn scan_repository<C, F>(
    classifier: &C,
    forge: &F,
    repo: &Repo,
    now: DateTime<Utc>,
) -> anyhow::Result<ScanResults>
where
    C: Classifier + ?Sized,
    F: Forge + Sync + ?Sized,
{
    let prs = forge.fetch_open_pull_requests(repo).await?;

    let mut results = ScanResults {
        total: prs.len(),
        ..Default::default()
    };

    for pr in &prs {
        let author = match forge.fetch_author(&pr.author).await {
            Ok(author) => Some(author),
            Err(e) => {
                tracing::warn!(
                    pr = pr.number,
                    author = %pr.author,
                    "Failed to fetch author, skipping account age check: {e:#}"
                );
                None
            }
        };

        let result = classifier.classify(pr, author.as_ref(), now);
        if result.is_spam {
            results.spam.push(result);
        } else if result.is_uncertain {
            results.uncertain.push(result);
        } else {
            results.clean.push(result);
        }
    }

    tracing::debug!(
        repo = %repo,
        total = results.total,
        spam = results.spam.len(),
        uncertain = results.uncertain.len(),
        clean = results.clean.len(),
        "Scan complete"
    );

    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::{
        classifier::{REASON_NEW_ACCOUNT_UNCERTAIN, Scanner},
        config::FiltersConfig,
        types::{Author, BlockScope, PullRequest},
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    struct StaticForge {
        prs: Vec<PullRequest>,
        authors: HashMap<String, Author>,
        list_fails: bool,
    }

    #[async_trait]
    impl Forge for StaticForge {
        async fn fetch_open_pull_requests(&self, _: &Repo) -> Result<Vec<PullRequest>> {
            if self.list_fails {
                bail!("API rate limit exceeded");
            }
            Ok(self.prs.clone())
        }

        async fn fetch_author(&self, login: &str) -> Result<Author> {
            match self.authors.get(login) {
                Some(author) => Ok(author.clone()),
                None => bail!("user '{login}' not found"),
            }
        }

        async fn close_pull_request(&self, _: &Repo, _: u64, _: Option<&str>) -> Result<()> {
            unreachable!("scans never close pull requests")
        }

        async fn add_label(&self, _: &Repo, _: u64, _: &str) -> Result<()> {
            unreachable!("scans never label pull requests")
        }

        async fn block_user(&self, _: &BlockScope, _: &str) -> Result<()> {
            unreachable!("scans never block users")
        }
    }

    fn pr(number: u64, author: &str, files: &[&str], lines: u64) -> PullRequest {
        PullRequest {
            number,
            title: format!("PR {number}"),
            body: String::new(),
            author: author.to_string(),
            created_at: now(),
            files_changed: files.len(),
            additions: lines,
            deletions: 0,
            files: files.iter().map(|f| f.to_string()).collect(),
            state: "open".to_string(),
            url: format!("https://github.com/acme/widgets/pull/{number}"),
        }
    }

    fn author(login: &str, age_days: i64) -> (String, Author) {
        (
            login.to_string(),
            Author {
                login: login.to_string(),
                created_at: now() - Duration::days(age_days),
            },
        )
    }

    fn repo() -> Repo {
        Repo::new("acme", "widgets").unwrap()
    }

    #[tokio::test]
    async fn test_partitions_in_source_order() {
        let forge = StaticForge {
            prs: vec![
                pr(9, "veteran", &["a.rs", "b.rs"], 40),
                pr(3, "spammer", &["README.md"], 2),
                pr(5, "newbie", &["a.rs", "b.rs"], 40),
                pr(1, "veteran", &["a.rs", "b.rs", "c.rs"], 90),
                pr(4, "spammer", &["readme.txt"], 1),
            ],
            authors: HashMap::from([
                author("veteran", 900),
                author("spammer", 1),
                author("newbie", 2),
            ]),
            list_fails: false,
        };
        let scanner = Scanner::new(FiltersConfig::default());

        let results = scan_repository(&scanner, &forge, &repo(), now()).await.unwrap();

        let numbers = |rs: &[crate::types::ScanResult]| rs.iter().map(|r| r.pr.number).collect::<Vec<_>>();
        assert_eq!(results.total, 5);
        assert_eq!(numbers(&results.spam), vec![3, 4]);
        assert_eq!(numbers(&results.uncertain), vec![5]);
        assert_eq!(numbers(&results.clean), vec![9, 1]);
    }

    #[tokio::test]
    async fn test_author_lookup_failure_degrades() {
        let forge = StaticForge {
            prs: vec![
                pr(1, "ghost", &["a.rs", "b.rs"], 40),
                pr(2, "newbie", &["a.rs", "b.rs"], 40),
            ],
            authors: HashMap::from([author("newbie", 2)]),
            list_fails: false,
        };
        let scanner = Scanner::new(FiltersConfig::default());

        let results = scan_repository(&scanner, &forge, &repo(), now()).await.unwrap();

        assert_eq!(results.total, 2);
        assert_eq!(results.clean.len(), 1);
        assert_eq!(results.clean[0].pr.number, 1);
        assert_eq!(results.uncertain.len(), 1);
        assert_eq!(
            results.uncertain[0].reasons,
            vec![REASON_NEW_ACCOUNT_UNCERTAIN]
        );
    }

    #[tokio::test]
    async fn test_listing_failure_aborts() {
        let forge = StaticForge {
            prs: Vec::new(),
            authors: HashMap::new(),
            list_fails: true,
        };
        let scanner = Scanner::new(FiltersConfig::default());

        let err = scan_repository(&scanner, &forge, &repo(), now())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limit"));
    }

    #[tokio::test]
    async fn test_empty_repository() {
        let forge = StaticForge {
            prs: Vec::new(),
            authors: HashMap::new(),
            list_fails: false,
        };
        let scanner = Scanner::new(FiltersConfig::default());

        let results = scan_repository(&scanner, &forge, &repo(), now()).await.unwrap();
        assert_eq!(results.total, 0);
        assert!(results.spam.is_empty() && results.uncertain.is_empty() && results.clean.is_empty());
    }
}
