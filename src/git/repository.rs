use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::command::{GitCommand, PROGRAM, check_branch, check_remote};
use super::remote::redact;
use crate::config::CommitIdentity;
use crate::error::{Error, Result};
use crate::journal::{Channel, SharedLog};

/// Marker kept in otherwise empty directories so they can be committed.
pub const PLACEHOLDER: &str = ".gitkeep";

/// Drives one working tree through init / fetch / checkout / reset /
/// commit / push / pull by shelling out to `git`.
///
/// Not synchronized: callers serialize operations on the same directory.
pub struct RepositoryController {
    workdir: PathBuf,
    branch: Option<String>,
    identity: Option<CommitIdentity>,
    log: SharedLog,
}

impl RepositoryController {
    /// Create a controller for `workdir`, creating the directory if needed.
    pub fn new(workdir: impl Into<PathBuf>, log: SharedLog) -> Result<Self> {
        let workdir = workdir.into();
        fs::create_dir_all(&workdir)?;
        Ok(Self {
            workdir,
            branch: None,
            identity: None,
            log,
        })
    }

    /// Author commits as `identity` instead of relying on git's config.
    pub fn with_identity(mut self, identity: Option<CommitIdentity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn is_repository(&self) -> bool {
        self.workdir.join(".git").is_dir()
    }

    /// Run one allow-listed git command in the working directory.
    ///
    /// stdout and stderr are combined, logged on the `git` channel together
    /// with the command line and exit code, and returned.
    ///
    /// # Errors
    /// - [`Error::InvalidCommand`] before anything is spawned
    /// - [`Error::GitCommandFailed`] on a nonzero exit
    pub fn run<S: AsRef<str>>(&self, argv: &[S]) -> Result<String> {
        let cmd = GitCommand::parse(argv)?;

        let mut proc = Command::new(PROGRAM);
        proc.args(cmd.args())
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(id) = &self.identity {
            proc.env("GIT_AUTHOR_NAME", &id.name)
                .env("GIT_AUTHOR_EMAIL", &id.email)
                .env("GIT_COMMITTER_NAME", &id.name)
                .env("GIT_COMMITTER_EMAIL", &id.email);
        }
        let output = proc.output()?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = if stderr.is_empty() {
            stdout.trim().to_string()
        } else {
            format!("{}\n{}", stdout, stderr).trim().to_string()
        };
        let code = output.status.code().unwrap_or(-1);
        let line = redact(&cmd.command_line());
        let combined = redact(&combined);

        if combined.is_empty() {
            self.log.log(Channel::Git, code, &line);
        } else {
            self.log
                .log(Channel::Git, code, &format!("{}\n{}", line, combined));
        }

        if !output.status.success() {
            return Err(Error::GitCommandFailed {
                command: line,
                code,
                output: combined,
            });
        }
        Ok(combined)
    }

    /// Bring the working tree to a usable state for `remote` / `branch`.
    ///
    /// Fresh directory: `init`, register `origin`, then try to track
    /// `origin/<branch>`; when the remote branch does not exist yet an
    /// untracked local branch is created instead.
    ///
    /// Existing repository: point `origin` at `remote`, fetch the branch
    /// (tolerating failure), check it out (creating it if missing) and, if
    /// the fetch worked, hard-reset to `origin/<branch>`.
    ///
    /// # Errors
    /// [`Error::InvalidCommand`] for a branch or remote git would read as an
    /// option, before anything runs.
    pub fn ensure_repo(&mut self, remote: &str, branch: &str) -> Result<()> {
        let remote = remote.trim();
        let branch = branch.trim();
        if !remote.is_empty() {
            check_remote(remote)?;
        }
        if !branch.is_empty() {
            check_branch(branch)?;
            self.branch = Some(branch.to_string());
        }

        if !self.is_repository() {
            self.run(&["git", "init"])?;
            if !remote.is_empty() {
                self.run(&["git", "remote", "add", "--", "origin", remote])?;
            }
            self.remove_placeholder();
            if !remote.is_empty() && !branch.is_empty() {
                let tracked = self
                    .run(&["git", "fetch", "--", "origin", branch])
                    .and_then(|_| {
                        let upstream = format!("origin/{branch}");
                        self.run(&["git", "checkout", "-b", branch, upstream.as_str()])
                    });
                if let Err(e) = tracked {
                    tracing::debug!("tracking origin/{} failed, starting local branch: {}", branch, e);
                    self.run(&["git", "checkout", "-b", branch])?;
                }
            }
            return Ok(());
        }

        if !remote.is_empty() {
            if self.has_origin()? {
                self.run(&["git", "remote", "set-url", "--", "origin", remote])?;
            } else {
                self.run(&["git", "remote", "add", "--", "origin", remote])?;
            }
        }

        if branch.is_empty() {
            return Ok(());
        }

        self.remove_placeholder();
        let fetched = match self.run(&["git", "fetch", "--", "origin", branch]) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("fetch origin {} failed: {}", branch, e);
                false
            }
        };

        if self.run(&["git", "checkout", branch]).is_err() {
            self.run(&["git", "checkout", "-b", branch])?;
        }

        if fetched && !remote.is_empty() {
            let upstream = format!("origin/{branch}");
            if let Err(e) = self.run(&["git", "reset", "--hard", upstream.as_str()]) {
                tracing::debug!("reset to {} skipped: {}", upstream, e);
            }
        }
        Ok(())
    }

    fn has_origin(&self) -> Result<bool> {
        let remotes = self.run(&["git", "remote"])?;
        Ok(remotes.lines().any(|l| l.trim() == "origin"))
    }

    fn remove_placeholder(&self) {
        let path = self.workdir.join(PLACEHOLDER);
        if let Ok(meta) = fs::symlink_metadata(&path)
            && meta.file_type().is_file()
            && let Err(e) = fs::remove_file(&path)
        {
            tracing::warn!("cannot remove {}: {}", path.display(), e);
        }
    }

    fn target_branch(&self, branch: Option<&str>) -> Result<String> {
        match branch.map(str::trim).filter(|b| !b.is_empty()) {
            Some(b) => {
                check_branch(b)?;
                Ok(b.to_string())
            }
            None => Ok(self.branch.clone().unwrap_or_else(|| "HEAD".to_string())),
        }
    }

    /// Stage everything and commit it. Returns `false` without committing
    /// when the tree is clean.
    pub fn commit_all(&self, message: &str) -> Result<bool> {
        self.run(&["git", "add", "."])?;
        let status = self.run(&["git", "status", "--porcelain"])?;
        if status.trim().is_empty() {
            return Ok(false);
        }
        self.run(&["git", "commit", "-m", message])?;
        Ok(true)
    }

    /// [`commit_all`](Self::commit_all), then push to `origin/<branch>`.
    /// A clean tree is a no-op: no commit, no push, `Ok(false)`.
    pub fn add_commit_push(&self, message: &str, branch: Option<&str>) -> Result<bool> {
        if !self.commit_all(message)? {
            return Ok(false);
        }
        let branch = self.target_branch(branch)?;
        self.run(&["git", "push", "--", "origin", branch.as_str()])?;
        Ok(true)
    }

    /// Fast-forward-only pull. Divergent history is an error, never a merge.
    pub fn pull(&self, branch: Option<&str>) -> Result<()> {
        let branch = self.target_branch(branch)?;
        self.run(&["git", "pull", "--ff-only", "origin", branch.as_str()])?;
        Ok(())
    }

    /// Full hash of HEAD, or `""` when there is none.
    pub fn current_commit(&self) -> String {
        self.run(&["git", "rev-parse", "HEAD"])
            .map(|out| out.trim().to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryLog;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn invalid_command_never_spawns() {
        let td = tempdir().unwrap();
        let log = Arc::new(MemoryLog::new());
        let repo = RepositoryController::new(td.path().join("w"), log.clone()).unwrap();

        for argv in [vec!["git", "log"], vec!["rm", "-rf", "/"], vec!["git", "config", "x"]] {
            assert!(matches!(repo.run(&argv), Err(Error::InvalidCommand { .. })));
        }
        assert!(log.entries().is_empty());
    }

    #[test]
    fn workdir_is_created() {
        let td = tempdir().unwrap();
        let dir = td.path().join("a/b/c");
        let repo = RepositoryController::new(&dir, Arc::new(MemoryLog::new())).unwrap();
        assert!(dir.is_dir());
        assert!(!repo.is_repository());
    }

    #[test]
    fn current_commit_is_empty_without_history() {
        let td = tempdir().unwrap();
        let mut repo = RepositoryController::new(td.path(), Arc::new(MemoryLog::new())).unwrap();
        repo.ensure_repo("", "").unwrap();
        assert_eq!(repo.current_commit(), "");
    }

    #[test]
    fn placeholder_is_removed_on_init() {
        let td = tempdir().unwrap();
        fs::write(td.path().join(PLACEHOLDER), "").unwrap();
        let mut repo = RepositoryController::new(td.path(), Arc::new(MemoryLog::new())).unwrap();
        repo.ensure_repo("", "").unwrap();
        assert!(!td.path().join(PLACEHOLDER).exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_placeholder_is_left_alone() {
        let td = tempdir().unwrap();
        let target = td.path().join("keep-me");
        fs::write(&target, "outside").unwrap();
        let work = td.path().join("w");
        fs::create_dir_all(&work).unwrap();
        std::os::unix::fs::symlink(&target, work.join(PLACEHOLDER)).unwrap();

        let mut repo = RepositoryController::new(&work, Arc::new(MemoryLog::new())).unwrap();
        repo.ensure_repo("", "").unwrap();
        let meta = fs::symlink_metadata(work.join(PLACEHOLDER)).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(fs::read_to_string(&target).unwrap(), "outside");
    }

    #[test]
    fn target_branch_prefers_argument_then_remembered() {
        let td = tempdir().unwrap();
        let mut repo = RepositoryController::new(td.path(), Arc::new(MemoryLog::new())).unwrap();
        assert_eq!(repo.target_branch(None).unwrap(), "HEAD");
        repo.branch = Some("live".into());
        assert_eq!(repo.target_branch(None).unwrap(), "live");
        assert_eq!(repo.target_branch(Some(" ")).unwrap(), "live");
        assert_eq!(repo.target_branch(Some("other")).unwrap(), "other");
        assert!(matches!(
            repo.target_branch(Some("--force")),
            Err(Error::InvalidCommand { .. })
        ));
    }
}
