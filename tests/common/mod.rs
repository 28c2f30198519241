#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::Repository;
use ssgs::artifact::{Artifact, ArtifactMapping};
use ssgs::config::{CommitIdentity, Config};
use ssgs::journal::MemoryLog;
use ssgs::secret::SecretBox;
use ssgs::state::StateStore;
use ssgs::sync::SyncContext;

pub fn identity() -> CommitIdentity {
    CommitIdentity {
        name: "ssgs test".to_string(),
        email: "ssgs@example.com".to_string(),
    }
}

/// Empty bare repository standing in for the shared remote.
pub fn init_bare(dir: &Path) -> PathBuf {
    let path = dir.join("remote.git");
    Repository::init_bare(&path).unwrap();
    path
}

pub fn config(remote: &Path, artifacts: &[(&str, &str)]) -> Config {
    let mut cfg = Config::default();
    cfg.site = "https://master.example.com".to_string();
    cfg.repository.remote = remote.to_str().unwrap().to_string();
    cfg.repository.identity = Some(identity());
    cfg.artifacts = ArtifactMapping::from(
        artifacts
            .iter()
            .map(|(slug, file)| Artifact::new(*slug, *file))
            .collect::<Vec<_>>(),
    );
    cfg
}

/// A site rooted at `dir`: working tree in `dir/repo`, state in `dir/state.json`.
pub fn site(dir: &Path, cfg: Config) -> (SyncContext, Arc<MemoryLog>) {
    let log = Arc::new(MemoryLog::new());
    let ctx = SyncContext::new(
        cfg,
        dir.join("repo"),
        SecretBox::from_passphrase("test"),
        StateStore::new(dir.join("state.json")),
        log.clone(),
    );
    (ctx, log)
}

/// Message of the commit at the tip of `branch` in the bare remote.
pub fn tip_message(remote: &Path, branch: &str) -> Option<String> {
    let repo = Repository::open_bare(remote).unwrap();
    let reference = repo.find_reference(&format!("refs/heads/{branch}")).ok()?;
    let commit = reference.peel_to_commit().unwrap();
    commit.message().map(str::to_string)
}

pub fn tip_id(remote: &Path, branch: &str) -> Option<String> {
    let repo = Repository::open_bare(remote).unwrap();
    let oid = repo.refname_to_id(&format!("refs/heads/{branch}")).ok()?;
    Some(oid.to_string())
}

pub fn commit_count(remote: &Path, branch: &str) -> usize {
    let repo = Repository::open_bare(remote).unwrap();
    let Ok(oid) = repo.refname_to_id(&format!("refs/heads/{branch}")) else {
        return 0;
    };
    let mut walk = repo.revwalk().unwrap();
    walk.push(oid).unwrap();
    walk.count()
}
