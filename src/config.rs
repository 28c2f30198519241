use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::ArtifactMapping;
use crate::paths::Paths;

/// Top-level configuration loaded from `config.toml`.
///
/// Example TOML:
/// ```toml
/// site = "https://master.example.com"
///
/// [repository]
/// remote = "git@github.com:acme/sliders.git"
/// branch = "main"
///
/// [repository.auth]
/// mode = "https-token"
/// token = "<output of `ssgs encrypt`>"
///
/// [[artifacts]]
/// slug = "hero"
/// file = "hero.ss3"
///
/// [[secondaries]]
/// label  = "eu"
/// url    = "https://eu.example.com"
/// secret = "<output of `ssgs encrypt`>"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Identity of this site, used in commit messages and dispatch payloads.
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub artifacts: ArtifactMapping,
    #[serde(default)]
    pub secondaries: Vec<SecondarySite>,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Working directory. Defaults to `<home>/repo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Author used for export commits. Falls back to git's own config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<CommitIdentity>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            remote: String::new(),
            branch: default_branch(),
            auth: AuthConfig::default(),
            identity: None,
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Remote is used as-is; the transport brings its own keys.
    #[default]
    Ssh,
    /// Remote is rewritten to HTTPS with the stored token as credentials.
    HttpsToken,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default)]
    pub username: String,
    /// Encrypted token blob.
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

/// A downstream site that receives tokens and import/cache triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondarySite {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub url: String,
    /// Encrypted shared secret.
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

impl SecondarySite {
    pub fn new(label: &str, url: &str, secret: &str) -> Self {
        Self {
            label: label.to_string(),
            url: url.to_string(),
            secret: secret.to_string(),
            verify_tls: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Dispatches in flight at once. 1 means strictly sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_timeout() -> u64 {
    15
}

fn default_concurrency() -> usize {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Encrypted secret expected in `X-SSGS-Secret` on inbound calls.
    #[serde(default)]
    pub secret: String,
}

impl Config {
    /// Parse and normalize a TOML document.
    pub fn parse(text: &str) -> crate::Result<Self> {
        let mut cfg: Config = toml::from_str(text)?;
        cfg.secondaries = normalize_secondaries(std::mem::take(&mut cfg.secondaries));
        cfg.repository.remote = cfg.repository.remote.trim().to_string();
        cfg.repository.branch = cfg.repository.branch.trim().to_string();
        cfg.repository.auth.username = cfg.repository.auth.username.trim().to_string();
        Ok(cfg)
    }

    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn working_directory(&self, paths: &Paths) -> PathBuf {
        self.repository
            .path
            .clone()
            .unwrap_or_else(|| paths.repo.clone())
    }

    pub fn store_directory(&self, paths: &Paths) -> PathBuf {
        self.store.path.clone().unwrap_or_else(|| paths.store.clone())
    }
}

/// Drop secondaries without a label; a repeated label replaces the earlier
/// entry in place. Sites without a URL are kept so dispatch can report them.
pub fn normalize_secondaries(raw: Vec<SecondarySite>) -> Vec<SecondarySite> {
    let mut out: Vec<SecondarySite> = Vec::with_capacity(raw.len());
    for mut s in raw {
        s.label = s.label.trim().to_string();
        s.url = s.url.trim().to_string();
        if s.label.is_empty() {
            continue;
        }
        match out.iter_mut().find(|e| e.label == s.label) {
            Some(existing) => *existing = s,
            None => out.push(s),
        }
    }
    out
}

/// Load and parse `config.toml`.
///
/// # Errors
/// - the file cannot be read (the message includes the resolved path)
/// - the TOML is invalid
pub fn load_config(path: &Path) -> Result<Config> {
    let txt = fs::read_to_string(path)
        .with_context(|| format!("config not found: {}", path.display()))?;
    let cfg = Config::parse(&txt).context("failed to parse config.toml")?;
    Ok(cfg)
}

/// Write `cfg` back to `path`.
pub fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, cfg.to_toml()?)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
site = "https://master.example.com"

[repository]
remote = "  git@github.com:acme/sliders.git "
branch = "live"

[repository.auth]
mode = "https-token"
username = "deploy"
token = "blob"

[[artifacts]]
slug = "hero"
file = "hero.ss3"

[[secondaries]]
label = "eu"
url = "https://eu.example.com"
secret = "s1"

[[secondaries]]
label = "broken"
url = ""

[[secondaries]]
label = "eu"
url = "https://eu2.example.com"
verify_tls = false

[dispatch]
concurrency = 4
"#;

    #[test]
    fn parses_and_normalizes() {
        let cfg = Config::parse(SAMPLE).unwrap();
        assert_eq!(cfg.repository.remote, "git@github.com:acme/sliders.git");
        assert_eq!(cfg.repository.branch, "live");
        assert_eq!(cfg.repository.auth.mode, AuthMode::HttpsToken);
        assert_eq!(cfg.artifacts.len(), 1);
        assert_eq!(cfg.secondaries.len(), 2);
        assert_eq!(cfg.secondaries[0].url, "https://eu2.example.com");
        assert_eq!(cfg.secondaries[1].url, "");
        assert!(!cfg.secondaries[0].verify_tls);
        assert_eq!(cfg.dispatch.concurrency, 4);
        assert_eq!(cfg.dispatch.timeout_secs, 15);
    }

    #[test]
    fn defaults_for_empty_document() {
        let cfg = Config::parse("").unwrap();
        assert_eq!(cfg.repository.branch, "main");
        assert_eq!(cfg.repository.auth.mode, AuthMode::Ssh);
        assert!(cfg.artifacts.is_empty());
        assert_eq!(cfg.dispatch.concurrency, 1);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let td = tempdir().unwrap();
        let path = td.path().join("config.toml");
        let mut cfg = Config::parse(SAMPLE).unwrap();
        cfg.repository.auth.token = "new-blob".to_string();
        save_config(&path, &cfg).unwrap();

        let back = load_config(&path).unwrap();
        assert_eq!(back.repository.auth.token, "new-blob");
        assert_eq!(back.secondaries, cfg.secondaries);
        assert_eq!(back.artifacts, cfg.artifacts);
    }

    #[test]
    fn missing_file_mentions_path() {
        let td = tempdir().unwrap();
        let path = td.path().join("nope.toml");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("nope.toml"));
    }
}
