use std::path::Path;

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::FiltersConfig,
    types::{Author, PullRequest, RecommendedAction, ScanResult, Severity},
};

pub const REASON_README_ONLY: &str = "Single-file README-only edit";
pub const REASON_NEW_ACCOUNT: &str = "Account created recently";
pub const REASON_NEW_ACCOUNT_UNCERTAIN: &str =
    "Account created recently (suspicious but not definitive)";
pub const REASON_MINIMAL_CHANGES: &str = "Minimal changes (below threshold)";
pub const REASON_SPAM_PHRASES: &str = "Contains spam phrases";

/// Decides whether a pull request looks like spam.
pub trait Classifier {
    fn classify(&self, pr: &PullRequest, author: Option<&Author>, now: DateTime<Utc>)
    -> ScanResult;
}

/// Rule-based classifier driven by the `filters` configuration.
#[derive(Debug, Clone)]
pub struct Scanner {
    filters: FiltersConfig,
    spam_phrases: Vec<String>,
}

impl Scanner {
    pub fn new(filters: FiltersConfig) -> Self {
        let spam_phrases = filters
            .spam_phrases
            .iter()
            .map(|phrase| phrase.to_lowercase())
            // An empty phrase would match every PR.
            .filter(|phrase| !phrase.is_empty())
            .collect();
        Self {
            filters,
            spam_phrases,
        }
    }

    fn is_whitelisted(&self, login: &str) -> bool {
        self.filters.whitelist.iter().any(|handle| handle == login)
    }

    fn is_readme_only(&self, pr: &PullRequest) -> bool {
        if !self.filters.readme_only_block || pr.files_changed != 1 {
            return false;
        }
        let [file] = pr.files.as_slice() else {
            return false;
        };
        Path::new(file)
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase().starts_with("readme"))
            .unwrap_or(false)
    }

    fn is_new_account(&self, author: &Author, now: DateTime<Utc>) -> bool {
        now - author.created_at < Duration::days(i64::from(self.filters.account_age_days))
    }

    fn is_minimal_changes(&self, pr: &PullRequest) -> bool {
        pr.files_changed < self.filters.min_files || pr.total_lines() < self.filters.min_lines
    }

    fn contains_spam_phrase(&self, pr: &PullRequest) -> bool {
        if self.spam_phrases.is_empty() {
            return false;
        }
        let text = format!("{} {}", pr.title, pr.body).to_lowercase();
        self.spam_phrases
            .iter()
            .any(|phrase| text.contains(phrase.as_str()))
    }
}

impl Classifier for Scanner {
    fn classify(
        &self,
        pr: &PullRequest,
        author: Option<&Author>,
        now: DateTime<Utc>,
    ) -> ScanResult {
        let mut result = ScanResult {
            pr: pr.clone(),
            is_spam: false,
            is_uncertain: false,
            reasons: Vec::new(),
            severity: Severity::Low,
            recommended_action: RecommendedAction::None,
        };

        if self.is_whitelisted(&pr.author) {
            return result;
        }

        if self.is_readme_only(pr) {
            result.is_spam = true;
            result.severity = Severity::High;
            result.reasons.push(REASON_README_ONLY.to_string());
        }

        if let Some(author) = author.filter(|a| self.is_new_account(a, now)) {
            tracing::trace!(pr = pr.number, author = %author.login, "New account");
            if result.is_spam {
                result.reasons.push(REASON_NEW_ACCOUNT.to_string());
            } else {
                result.is_uncertain = true;
                result
                    .reasons
                    .push(REASON_NEW_ACCOUNT_UNCERTAIN.to_string());
            }
        }

        if self.is_minimal_changes(pr) {
            if !result.is_spam {
                result.is_uncertain = true;
            }
            result.reasons.push(REASON_MINIMAL_CHANGES.to_string());
        }

        if self.contains_spam_phrase(pr) {
            result.is_spam = true;
            result.severity = result.severity.max(Severity::High);
            result.reasons.push(REASON_SPAM_PHRASES.to_string());
        }

        result.recommended_action = if result.is_spam {
            RecommendedAction::BlockAndClose
        } else if result.is_uncertain {
            RecommendedAction::ManualReview
        } else {
            RecommendedAction::None
        };

        result
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn pr(files: &[&str], additions: u64, deletions: u64) -> PullRequest {
        PullRequest {
            number: 7,
            title: "Improve docs".to_string(),
            body: String::new(),
            author: "contributor".to_string(),
            created_at: now(),
            files_changed: files.len(),
            additions,
            deletions,
            files: files.iter().map(|f| f.to_string()).collect(),
            state: "open".to_string(),
            url: "https://github.com/acme/widgets/pull/7".to_string(),
        }
    }

    fn author_aged(days: i64) -> Author {
        Author {
            login: "contributor".to_string(),
            created_at: now() - Duration::days(days),
        }
    }

    fn scanner() -> Scanner {
        Scanner::new(FiltersConfig::default())
    }

    fn scanner_with(update: impl FnOnce(&mut FiltersConfig)) -> Scanner {
        let mut filters = FiltersConfig::default();
        update(&mut filters);
        Scanner::new(filters)
    }

    #[test]
    fn test_readme_edit_by_new_account_is_spam() {
        let result = scanner().classify(&pr(&["README.md"], 1, 0), Some(&author_aged(2)), now());

        assert!(result.is_spam);
        assert_eq!(result.severity, Severity::High);
        assert_eq!(
            result.reasons,
            vec![
                REASON_README_ONLY,
                REASON_NEW_ACCOUNT,
                REASON_MINIMAL_CHANGES
            ]
        );
        assert_eq!(result.recommended_action, RecommendedAction::BlockAndClose);
        assert_eq!(
            result.recommended_action.as_str(),
            "block user and close PR"
        );
    }

    #[test]
    fn test_substantial_pr_from_old_account_is_clean() {
        let files = ["src/a.rs", "src/b.rs", "src/c.rs", "src/d.rs", "src/e.rs"];
        let result = scanner().classify(&pr(&files, 100, 0), Some(&author_aged(365)), now());

        assert!(!result.is_spam);
        assert!(!result.is_uncertain);
        assert!(result.reasons.is_empty());
        assert_eq!(result.severity, Severity::Low);
        assert_eq!(result.recommended_action.as_str(), "no action needed");
    }

    #[test]
    fn test_whitelisted_author_is_always_clean() {
        let scanner = scanner_with(|f| {
            f.whitelist = vec!["dependabot[bot]".to_string()];
            f.spam_phrases = vec!["bump".to_string()];
        });
        let mut input = pr(&["README.md"], 1, 0);
        input.author = "dependabot[bot]".to_string();
        input.title = "Bump serde".to_string();

        let result = scanner.classify(&input, Some(&author_aged(0)), now());

        assert!(!result.is_spam);
        assert!(!result.is_uncertain);
        assert!(result.reasons.is_empty());
        assert_eq!(result.recommended_action, RecommendedAction::None);
    }

    #[test]
    fn test_readme_detection_uses_base_name() {
        let scanner = scanner();
        for file in ["README", "readme.rst", "docs/ReadMe.md", "README-zh.md"] {
            let result = scanner.classify(&pr(&[file], 50, 0), None, now());
            assert!(result.is_spam, "{file} should count as a README");
        }
        for file in ["docs/guide.md", "src/readme_parser.rs/lib.rs", "CHANGELOG.md"] {
            let result = scanner.classify(&pr(&[file], 50, 0), None, now());
            assert!(!result.is_spam, "{file} should not count as a README");
        }
    }

    #[test]
    fn test_readme_among_several_files_is_not_readme_only() {
        let result = scanner().classify(&pr(&["README.md", "src/lib.rs"], 50, 0), None, now());
        assert!(!result.is_spam);
        assert!(!result.reasons.contains(&REASON_README_ONLY.to_string()));
    }

    #[test]
    fn test_zero_files_is_not_readme_edit() {
        let result = scanner().classify(&pr(&[], 0, 0), None, now());
        assert!(!result.is_spam);
        assert!(result.is_uncertain);
        assert_eq!(result.reasons, vec![REASON_MINIMAL_CHANGES]);
    }

    #[test]
    fn test_readme_only_block_disabled() {
        let scanner = scanner_with(|f| f.readme_only_block = false);
        let result = scanner.classify(&pr(&["README.md"], 50, 0), None, now());
        assert!(!result.is_spam);
        assert_eq!(result.reasons, vec![REASON_MINIMAL_CHANGES]);
    }

    #[test]
    fn test_new_account_boundary_is_strict() {
        let files = ["a.rs", "b.rs"];
        let scanner = scanner();

        let at_boundary = scanner.classify(&pr(&files, 10, 0), Some(&author_aged(7)), now());
        assert!(!at_boundary.is_uncertain);
        assert!(at_boundary.reasons.is_empty());

        let mut just_inside = author_aged(7);
        just_inside.created_at += Duration::seconds(1);
        let inside = scanner.classify(&pr(&files, 10, 0), Some(&just_inside), now());
        assert!(inside.is_uncertain);
        assert!(!inside.is_spam);
        assert_eq!(inside.reasons, vec![REASON_NEW_ACCOUNT_UNCERTAIN]);
        assert_eq!(inside.recommended_action.as_str(), "manual review recommended");
    }

    #[test]
    fn test_missing_author_skips_only_account_check() {
        let result = scanner().classify(&pr(&["a.rs"], 3, 0), None, now());
        assert!(result.is_uncertain);
        assert_eq!(result.reasons, vec![REASON_MINIMAL_CHANGES]);
    }

    #[test]
    fn test_minimal_changes_uses_or_with_exact_thresholds() {
        let scanner = scanner();
        let old = author_aged(400);

        let at_threshold = scanner.classify(&pr(&["a.rs", "b.rs"], 6, 4), Some(&old), now());
        assert!(!at_threshold.is_uncertain);
        assert!(at_threshold.reasons.is_empty());

        let few_files = scanner.classify(&pr(&["a.rs"], 500, 0), Some(&old), now());
        assert!(few_files.is_uncertain);
        assert_eq!(few_files.reasons, vec![REASON_MINIMAL_CHANGES]);

        let few_lines = scanner.classify(&pr(&["a.rs", "b.rs", "c.rs"], 5, 4), Some(&old), now());
        assert!(few_lines.is_uncertain);
        assert_eq!(few_lines.reasons, vec![REASON_MINIMAL_CHANGES]);
    }

    #[test]
    fn test_spam_phrase_matches_case_insensitively_in_title_or_body() {
        let scanner = scanner_with(|f| f.spam_phrases = vec!["Buy Followers".to_string()]);
        let old = author_aged(400);
        let files = ["a.rs", "b.rs"];

        let mut in_body = pr(&files, 20, 0);
        in_body.body = "cheap way to BUY FOLLOWERS today".to_string();
        let result = scanner.classify(&in_body, Some(&old), now());
        assert!(result.is_spam);
        assert_eq!(result.severity, Severity::High);
        assert_eq!(result.reasons, vec![REASON_SPAM_PHRASES]);

        let mut in_title = pr(&files, 20, 0);
        in_title.title = "buy followers".to_string();
        assert!(scanner.classify(&in_title, Some(&old), now()).is_spam);

        let clean = scanner.classify(&pr(&files, 20, 0), Some(&old), now());
        assert!(!clean.is_spam);
    }

    #[test]
    fn test_empty_spam_phrase_matches_nothing() {
        let scanner = scanner_with(|f| f.spam_phrases = vec![String::new()]);
        let result = scanner.classify(&pr(&["a.rs", "b.rs"], 20, 0), None, now());

        assert!(!result.is_spam);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_phrase_spans_title_and_body_boundary() {
        let scanner = scanner_with(|f| f.spam_phrases = vec!["docs please".to_string()]);
        let mut input = pr(&["a.rs", "b.rs"], 20, 0);
        input.title = "Fix docs".to_string();
        input.body = "please merge".to_string();

        assert!(scanner.classify(&input, None, now()).is_spam);
    }

    #[test]
    fn test_spam_phrase_after_uncertain_signals_keeps_uncertain_flag() {
        let scanner = scanner_with(|f| f.spam_phrases = vec!["promo".to_string()]);
        let mut input = pr(&["a.rs"], 1, 0);
        input.title = "promo code".to_string();

        let result = scanner.classify(&input, Some(&author_aged(1)), now());

        assert!(result.is_spam);
        assert!(result.is_uncertain);
        assert_eq!(
            result.reasons,
            vec![
                REASON_NEW_ACCOUNT_UNCERTAIN,
                REASON_MINIMAL_CHANGES,
                REASON_SPAM_PHRASES
            ]
        );
        assert_eq!(result.recommended_action, RecommendedAction::BlockAndClose);
    }

    #[test]
    fn test_result_carries_the_pull_request() {
        let input = pr(&["a.rs", "b.rs"], 20, 0);
        let result = scanner().classify(&input, None, now());
        assert_eq!(result.pr, input);
    }
}
