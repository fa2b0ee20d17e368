use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::{Octocrab, models::IssueState};
use serde::Deserialize;

use crate::types::{Author, BlockScope, Forge, PullRequest, Repo};

const PAGE_SIZE: u8 = 100;

/// Token fallback for configs without `github.token`: `GITHUB_TOKEN`,
/// then `GH_TOKEN`, then `gh auth token`.
pub fn get_github_token() -> Result<String> {
    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Some(token) = std::env::var(var).ok().filter(|t| !t.is_empty()) {
            return Ok(token);
        }
    }

    let output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .context("Failed to run 'gh auth token'")?;

    if !output.status.success() {
        anyhow::bail!("Failed to get GitHub token from gh CLI. Please run 'gh auth login' first");
    }

    let token = String::from_utf8(output.stdout)?.trim().to_string();

    if token.is_empty() {
        anyhow::bail!("Empty token returned from gh CLI");
    }

    Ok(token)
}

#[derive(Debug, Deserialize)]
struct UserProfile {
    login: String,
    created_at: DateTime<Utc>,
}

/// GitHub REST implementation of [`Forge`].
pub struct GitHub {
    client: Octocrab,
}

impl GitHub {
    pub fn new(token: &str) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .context("Failed to create GitHub client")?;
        Ok(Self { client })
    }

    async fn fetch_pull_request(&self, repo: &Repo, number: u64) -> Result<PullRequest> {
        let pulls = self.client.pulls(&repo.owner, &repo.name);

        let pr = pulls
            .get(number)
            .await
            .with_context(|| format!("Failed to get pull request #{number} in {repo}"))?;

        let first_page = pulls
            .list_files(number)
            .await
            .with_context(|| format!("Failed to list files of pull request #{number}"))?;
        let files: Vec<String> = self
            .client
            .all_pages(first_page)
            .await
            .with_context(|| format!("Failed to list files of pull request #{number}"))?
            .into_iter()
            .map(|entry| entry.filename)
            .collect();

        let state = match pr.state {
            Some(IssueState::Open) => "open",
            Some(IssueState::Closed) => "closed",
            _ => "unknown",
        };

        Ok(PullRequest {
            number: pr.number,
            title: pr.title.unwrap_or_default(),
            body: pr.body.unwrap_or_default(),
            author: pr.user.map(|user| user.login).unwrap_or_default(),
            created_at: pr.created_at.unwrap_or_else(Utc::now),
            files_changed: files.len(),
            additions: pr.additions.unwrap_or(0),
            deletions: pr.deletions.unwrap_or(0),
            files,
            state: state.to_string(),
            url: pr.html_url.map(|url| url.to_string()).unwrap_or_default(),
        })
    }

    /// Issues a body-less PUT; GitHub answers block requests with 204.
    async fn put_empty(&self, route: String) -> Result<()> {
        let response = self.client._put(route.as_str(), None::<&()>).await?;
        octocrab::map_github_error(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Forge for GitHub {
    async fn fetch_open_pull_requests(&self, repo: &Repo) -> Result<Vec<PullRequest>> {
        let first_page = self
            .client
            .pulls(&repo.owner, &repo.name)
            .list()
            .state(octocrab::params::State::Open)
            .per_page(PAGE_SIZE)
            .send()
            .await
            .with_context(|| format!("Failed to list pull requests for {repo}"))?;
        let listed = self
            .client
            .all_pages(first_page)
            .await
            .with_context(|| format!("Failed to list pull requests for {repo}"))?;

        tracing::debug!(repo = %repo, count = listed.len(), "Listed open pull requests");

        // The list endpoint omits file and line counts, so each PR is
        // fetched again individually.
        let mut prs = Vec::with_capacity(listed.len());
        for listed_pr in listed {
            prs.push(self.fetch_pull_request(repo, listed_pr.number).await?);
        }
        Ok(prs)
    }

    async fn fetch_author(&self, login: &str) -> Result<Author> {
        let profile: UserProfile = self
            .client
            .get(format!("/users/{login}"), None::<&()>)
            .await
            .with_context(|| format!("Failed to get user '{login}'"))?;
        Ok(Author {
            login: profile.login,
            created_at: profile.created_at,
        })
    }

    async fn close_pull_request(
        &self,
        repo: &Repo,
        number: u64,
        comment: Option<&str>,
    ) -> Result<()> {
        if let Some(body) = comment.filter(|body| !body.trim().is_empty()) {
            self.client
                .issues(&repo.owner, &repo.name)
                .create_comment(number, body)
                .await
                .with_context(|| format!("Failed to comment on pull request #{number}"))?;
        }

        let _: serde_json::Value = self
            .client
            .patch(
                format!("/repos/{}/{}/pulls/{number}", repo.owner, repo.name),
                Some(&serde_json::json!({ "state": "closed" })),
            )
            .await
            .with_context(|| format!("Failed to close pull request #{number}"))?;
        Ok(())
    }

    async fn add_label(&self, repo: &Repo, number: u64, label: &str) -> Result<()> {
        self.client
            .issues(&repo.owner, &repo.name)
            .add_labels(number, &[label.to_string()])
            .await
            .with_context(|| format!("Failed to add label '{label}' to pull request #{number}"))?;
        Ok(())
    }

    async fn block_user(&self, scope: &BlockScope, username: &str) -> Result<()> {
        let route = match scope {
            BlockScope::Organization(org) => format!("/orgs/{org}/blocks/{username}"),
            BlockScope::Personal(_) => format!("/user/blocks/{username}"),
        };
        self.put_empty(route)
            .await
            .with_context(|| format!("Failed to block user '{username}' on GitHub"))
    }
}
