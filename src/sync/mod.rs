//! Moving artifacts through the shared repository.
//!
//! The master runs [`ExportReconciler`]: export every mapped artifact into
//! the working tree, then commit and push once. A secondary runs
//! [`ImportReconciler`]: pull, then re-import whatever may have changed.
//! Both start from a [`SyncContext`], which owns everything a run needs
//! except the artifact backend.

mod export;
mod import;

use std::path::PathBuf;

use crate::cancel::CancelFlag;
use crate::config::Config;
use crate::error::Result;
use crate::git::{RepositoryController, resolve_remote};
use crate::journal::SharedLog;
use crate::secret::SecretBox;
use crate::state::StateStore;

pub use export::{ExportReconciler, ExportSummary};
pub use import::{ImportReconciler, ImportSummary};

pub struct SyncContext {
    pub config: Config,
    pub workdir: PathBuf,
    pub secrets: SecretBox,
    pub state: StateStore,
    pub log: SharedLog,
    pub cancel: CancelFlag,
}

impl SyncContext {
    pub fn new(
        config: Config,
        workdir: impl Into<PathBuf>,
        secrets: SecretBox,
        state: StateStore,
        log: SharedLog,
    ) -> Self {
        Self {
            config,
            workdir: workdir.into(),
            secrets,
            state,
            log,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn branch(&self) -> &str {
        &self.config.repository.branch
    }

    /// Resolve the remote and bring the working tree in line with it.
    /// Fails before touching the directory when the remote cannot be
    /// resolved.
    pub fn open_repository(&self) -> Result<RepositoryController> {
        let remote = resolve_remote(&self.config.repository, &self.secrets)?;
        let mut repo = RepositoryController::new(&self.workdir, self.log.clone())?
            .with_identity(self.config.repository.identity.clone());
        repo.ensure_repo(&remote, self.branch())?;
        Ok(repo)
    }
}
