use std::{
    io::{BufRead, Write},
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, bail};
use prguard::{
    Config, Repo,
    config::{CONFIG_FILENAME, global_config_path},
};

use crate::prompt::{ask, confirm, confirm_default_yes};

pub fn config_path(global: bool) -> Result<PathBuf> {
    if global {
        global_config_path().context("Failed to determine home directory")
    } else {
        Ok(PathBuf::from(".").join(CONFIG_FILENAME))
    }
}

/// `git config github.user`, used to suggest a username.
pub fn detect_git_user() -> Option<String> {
    Command::new("git")
        .args(["config", "--get", "github.user"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Walks through the questions and returns the resulting configuration.
pub fn prompt_config<R: BufRead, W: Write>(
    git_user: Option<&str>,
    input: &mut R,
    out: &mut W,
) -> Result<Config> {
    let mut config = Config::default();

    writeln!(out, "GitHub Personal Access Token:")?;
    writeln!(out, "  Create one at: https://github.com/settings/tokens")?;
    writeln!(out, "  Required scopes: repo, admin:org (for organization blocks)")?;
    config.github.token = ask("Token: ", input, out)?;
    if config.github.token.is_empty() {
        bail!("GitHub token is required");
    }

    writeln!(out)?;
    writeln!(out, "GitHub Organization or User:")?;
    if let Some(user) = git_user {
        writeln!(out, "  Detected from git config: {user}")?;
    }
    config.github.org = ask("Enter org name (or press Enter for user mode): ", input, out)?;

    if config.github.org.is_empty() {
        if let Some(user) = git_user {
            if confirm_default_yes(&format!("Use '{user}' as username?"), input, out)? {
                config.github.user = user.to_string();
            }
        }
        if config.github.user.is_empty() {
            config.github.user = ask("GitHub username: ", input, out)?;
        }
        if config.github.user.is_empty() {
            bail!("either an organization or a username is required");
        }
    }

    writeln!(out)?;
    writeln!(out, "Repositories to monitor (optional):")?;
    writeln!(out, "  Enter repositories in 'owner/repo' format, one per line")?;
    writeln!(out, "  Press Enter on an empty line to finish")?;
    loop {
        let answer = ask("Repository (or Enter to skip): ", input, out)?;
        if answer.is_empty() {
            break;
        }
        match Repo::parse(&answer) {
            Ok(repo) => config.repositories.push(repo),
            Err(e) => writeln!(out, "  Invalid repository: {e}")?,
        }
    }

    config.apply_defaults();
    Ok(config)
}

/// Runs the wizard and writes `path`. Returns `false` when the user
/// declines to overwrite an existing file.
pub fn run<R: BufRead, W: Write>(
    path: &Path,
    git_user: Option<&str>,
    input: &mut R,
    out: &mut W,
) -> Result<bool> {
    if path.exists() {
        writeln!(out, "Config file already exists at: {}", path.display())?;
        if !confirm("Overwrite?", input, out)? {
            writeln!(out, "Initialization cancelled.")?;
            return Ok(false);
        }
    }

    let config = prompt_config(git_user, input, out)?;
    config.save(path)?;

    writeln!(out)?;
    writeln!(out, "✓ Configuration created at: {}", path.display())?;
    writeln!(out)?;
    writeln!(out, "Next steps:")?;
    writeln!(out, "  1. Review and edit the config file if needed")?;
    writeln!(out, "  2. Run: prguard scan owner/repo")?;
    writeln!(out, "  3. Or: prguard scan-all (if you added repositories)")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;

    fn answers(lines: &[&str]) -> Cursor<String> {
        Cursor::new(lines.iter().map(|l| format!("{l}\n")).collect())
    }

    #[test]
    fn test_org_mode_with_repositories() {
        let mut input = answers(&["ghp_secret", "acme", "acme/widgets", "not-a-repo", "acme/gadgets", ""]);
        let mut out = Vec::new();

        let config = prompt_config(None, &mut input, &mut out).unwrap();

        assert_eq!(config.github.token, "ghp_secret");
        assert_eq!(config.github.org, "acme");
        assert!(config.github.user.is_empty());
        assert_eq!(
            config.repositories,
            vec![
                Repo::new("acme", "widgets").unwrap(),
                Repo::new("acme", "gadgets").unwrap()
            ]
        );
        assert!(String::from_utf8(out).unwrap().contains("Invalid repository"));
    }

    #[test]
    fn test_user_mode_accepts_detected_git_user() {
        let mut input = answers(&["token", "", "", ""]);
        let mut out = Vec::new();

        let config = prompt_config(Some("octocat"), &mut input, &mut out).unwrap();

        assert!(config.github.org.is_empty());
        assert_eq!(config.github.user, "octocat");
        assert!(config.repositories.is_empty());
    }

    #[test]
    fn test_user_mode_rejecting_git_user_asks_for_name() {
        let mut input = answers(&["token", "", "n", "someone", ""]);
        let mut out = Vec::new();

        let config = prompt_config(Some("octocat"), &mut input, &mut out).unwrap();

        assert_eq!(config.github.user, "someone");
    }

    #[test]
    fn test_missing_token_fails() {
        let mut out = Vec::new();
        let err = prompt_config(None, &mut answers(&[""]), &mut out).unwrap_err();
        assert!(err.to_string().contains("token is required"));
    }

    #[test]
    fn test_missing_org_and_user_fails() {
        let mut out = Vec::new();
        assert!(prompt_config(None, &mut answers(&["token", "", ""]), &mut out).is_err());
    }

    #[test]
    fn test_run_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut out = Vec::new();

        let written = run(&path, None, &mut answers(&["token", "acme", ""]), &mut out).unwrap();

        assert!(written);
        let config = Config::parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.github.org, "acme");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_keeps_existing_file_when_declined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "existing").unwrap();
        let mut out = Vec::new();

        let written = run(&path, None, &mut answers(&["n"]), &mut out).unwrap();

        assert!(!written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing");
    }
}
