use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::{BlockScope, Repo};

pub const ENV_PREFIX: &str = "PRGUARD_";
pub const CONFIG_FILENAME: &str = "config.yaml";

const DEFAULT_COMMENT_TEMPLATE: &str = "This PR has been automatically closed due to low quality indicators.\nIf you believe this is an error, please contact the maintainers.";

/// Application configuration, loaded from YAML and overridable through
/// `PRGUARD_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub database: DatabaseConfig,
    pub repositories: Vec<Repo>,
    pub filters: FiltersConfig,
    pub blocklist: BlocklistConfig,
    pub actions: ActionsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: String,
    pub org: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Sqlite,
    Turso,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub url: String,
    pub auth_token: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: "sqlite".to_string(),
            path: String::new(),
            url: String::new(),
            auth_token: String::new(),
        }
    }
}

impl DatabaseConfig {
    pub fn kind(&self) -> Result<DatabaseKind> {
        match self.kind.as_str() {
            "sqlite" => Ok(DatabaseKind::Sqlite),
            "turso" => Ok(DatabaseKind::Turso),
            "" => anyhow::bail!("database.type is required"),
            other => anyhow::bail!(
                "database.type must be 'sqlite' or 'turso', got: '{}'",
                other
            ),
        }
    }
}

/// Thresholds and lists that drive PR classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    pub min_files: usize,
    pub min_lines: u64,
    pub account_age_days: u32,
    pub readme_only_block: bool,
    pub whitelist: Vec<String>,
    pub spam_phrases: Vec<String>,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            min_files: 2,
            min_lines: 10,
            account_age_days: 7,
            readme_only_block: true,
            whitelist: Vec::new(),
            spam_phrases: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocklistConfig {
    pub auto_export: bool,
    pub export_path: PathBuf,
    pub sources: Vec<BlocklistSource>,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            auto_export: false,
            export_path: PathBuf::from("./exports"),
            sources: Vec::new(),
        }
    }
}

/// A remote blocklist shared by another maintainer or organization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocklistSource {
    pub name: String,
    pub url: String,
    pub trusted: bool,
    pub auto_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    pub close_prs: bool,
    pub block_users: bool,
    pub add_spam_label: bool,
    pub comment_template: String,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            close_prs: false,
            block_users: false,
            add_spam_label: false,
            comment_template: DEFAULT_COMMENT_TEMPLATE.to_string(),
        }
    }
}

impl Config {
    /// Loads, overrides, defaults and validates the configuration.
    ///
    /// `explicit` must exist when given. Otherwise the first of
    /// `~/.config/prguard/config.yaml` and `./config.yaml` is used.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = find_config_path(explicit)?;
        tracing::debug!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_env_overrides(|key| std::env::var(key).ok());
        if config.github.token.is_empty() {
            if let Ok(token) = crate::github::get_github_token() {
                tracing::debug!("Using GitHub token from environment or gh CLI");
                config.github.token = token;
            }
        }
        config.apply_defaults();
        config.validate().context("Invalid configuration")?;

        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let yaml = serde_yaml::to_string(self).context("Failed to serialise config")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        // The file holds a token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).with_context(
                || format!("Failed to restrict permissions on {}", path.display()),
            )?;
        }
        Ok(())
    }

    /// Applies `PRGUARD_*` overrides; `lookup` resolves a variable name.
    /// Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.is_empty())
        };

        let overrides: [(&str, &mut String); 7] = [
            ("GITHUB_TOKEN", &mut self.github.token),
            ("GITHUB_ORG", &mut self.github.org),
            ("GITHUB_USER", &mut self.github.user),
            ("DATABASE_TYPE", &mut self.database.kind),
            ("DATABASE_PATH", &mut self.database.path),
            ("DATABASE_URL", &mut self.database.url),
            ("DATABASE_AUTH_TOKEN", &mut self.database.auth_token),
        ];
        for (name, field) in overrides {
            if let Some(value) = var(name) {
                *field = value;
            }
        }
    }

    pub fn apply_defaults(&mut self) {
        if self.database.kind == "sqlite" && self.database.path.is_empty() {
            self.database.path = default_database_path().display().to_string();
        }
        if self.blocklist.export_path.as_os_str().is_empty() {
            self.blocklist.export_path = BlocklistConfig::default().export_path;
        }
        if self.actions.comment_template.is_empty() {
            self.actions.comment_template = DEFAULT_COMMENT_TEMPLATE.to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.github.token.is_empty() {
            anyhow::bail!("github.token is required");
        }
        if self.github.org.is_empty() && self.github.user.is_empty() {
            anyhow::bail!("either github.org or github.user must be specified");
        }

        match self.database.kind()? {
            DatabaseKind::Sqlite if self.database.path.is_empty() => {
                anyhow::bail!("database.path is required for sqlite")
            }
            DatabaseKind::Turso if self.database.url.is_empty() => {
                anyhow::bail!("database.url is required for turso")
            }
            _ => {}
        }

        Ok(())
    }

    /// The actor recorded in `blocked_by` for entries created locally.
    pub fn blocked_by(&self) -> &str {
        if self.github.user.is_empty() {
            &self.github.org
        } else {
            &self.github.user
        }
    }

    /// Scope for GitHub-level blocks: the organization when configured,
    /// otherwise the personal account.
    pub fn block_scope(&self) -> Option<BlockScope> {
        if !self.github.org.is_empty() {
            Some(BlockScope::Organization(self.github.org.clone()))
        } else if !self.github.user.is_empty() {
            Some(BlockScope::Personal(self.github.user.clone()))
        } else {
            None
        }
    }
}

/// `~/.config/prguard/config.yaml`, if a home directory is known.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("prguard").join(CONFIG_FILENAME))
}

pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".local").join("prguard").join("prguard.db"))
        .unwrap_or_else(|| PathBuf::from("./prguard.db"))
}

pub fn find_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("Config file not found at specified path: {}", path.display());
    }

    let candidates: Vec<PathBuf> = global_config_path()
        .into_iter()
        .chain(std::iter::once(PathBuf::from(CONFIG_FILENAME)))
        .collect();

    candidates
        .iter()
        .find(|path| path.exists())
        .cloned()
        .with_context(|| {
            let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
            format!(
                "Config file not found in any standard location: {}. Run 'prguard init' to create one",
                searched.join(", ")
            )
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    const MINIMAL: &str = r#"
github:
  token: ghp_test
  user: maintainer
database:
  type: sqlite
  path: /tmp/prguard.db
"#;

    #[test]
    fn test_missing_sections_take_defaults() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.filters, FiltersConfig::default());
        assert_eq!(config.filters.min_files, 2);
        assert_eq!(config.filters.min_lines, 10);
        assert_eq!(config.filters.account_age_days, 7);
        assert!(config.filters.readme_only_block);
        assert_eq!(config.blocklist.export_path, PathBuf::from("./exports"));
        assert!(!config.actions.close_prs);
        assert!(config.actions.comment_template.contains("automatically closed"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config_parses() {
        let yaml = r#"
github:
  token: ghp_test
  org: acme
database:
  type: turso
  url: libsql://prguard-acme.turso.io
  auth_token: secret
repositories:
  - owner: acme
    name: widgets
filters:
  min_files: 1
  min_lines: 5
  account_age_days: 30
  readme_only_block: false
  whitelist: ["dependabot[bot]"]
  spam_phrases: ["check out my", "hacktoberfest"]
blocklist:
  auto_export: true
  export_path: /var/lib/prguard
  sources:
    - name: community
      url: https://example.com/blocklist.json
      trusted: true
actions:
  close_prs: true
  add_spam_label: true
"#;
        let config = Config::parse(yaml).unwrap();

        assert_eq!(config.database.kind().unwrap(), DatabaseKind::Turso);
        assert_eq!(config.repositories, vec![Repo::new("acme", "widgets").unwrap()]);
        assert_eq!(config.filters.min_files, 1);
        assert!(!config.filters.readme_only_block);
        assert_eq!(config.filters.spam_phrases.len(), 2);
        assert_eq!(config.blocklist.sources[0].name, "community");
        assert!(config.blocklist.sources[0].trusted);
        assert!(!config.blocklist.sources[0].auto_sync);
        assert!(config.actions.close_prs);
        assert!(!config.actions.block_users);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_replace_file_values() {
        let mut config = Config::parse(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("PRGUARD_GITHUB_TOKEN", "ghp_from_env"),
            ("PRGUARD_GITHUB_ORG", "acme"),
            ("PRGUARD_DATABASE_TYPE", "turso"),
            ("PRGUARD_DATABASE_URL", "libsql://db.turso.io"),
            ("PRGUARD_DATABASE_AUTH_TOKEN", ""),
        ]);

        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.github.token, "ghp_from_env");
        assert_eq!(config.github.org, "acme");
        assert_eq!(config.github.user, "maintainer");
        assert_eq!(config.database.kind, "turso");
        assert_eq!(config.database.url, "libsql://db.turso.io");
        assert_eq!(config.database.auth_token, "");
    }

    #[test]
    fn test_validate_rejects_missing_token() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.github.token.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("github.token"));
    }

    #[test]
    fn test_validate_requires_org_or_user() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.github.user.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_database_type() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.database.kind = "postgres".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'sqlite' or 'turso'"));
    }

    #[test]
    fn test_validate_turso_requires_url() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.database.kind = "turso".to_string();
        assert!(config.validate().is_err());
        config.database.url = "libsql://db.turso.io".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_fill_sqlite_path() {
        let mut config = Config::parse("github: {token: t, user: u}").unwrap();
        assert!(config.database.path.is_empty());
        config.apply_defaults();
        assert!(config.database.path.ends_with("prguard.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blocked_by_prefers_user() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.github.org = "acme".to_string();
        assert_eq!(config.blocked_by(), "maintainer");
        assert_eq!(
            config.block_scope(),
            Some(BlockScope::Organization("acme".to_string()))
        );

        config.github.user.clear();
        assert_eq!(config.blocked_by(), "acme");
    }

    #[test]
    fn test_save_then_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let config = Config::parse(MINIMAL).unwrap();

        config.save(&path).unwrap();
        let reloaded = Config::parse(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_explicit_missing_config_path_is_an_error() {
        let err = find_config_path(Some(Path::new("/nonexistent/prguard.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/prguard.yaml"));
    }
}
