use chrono::Local;
use std::fs;
use std::path::Path;

use super::SyncContext;
use crate::artifact::{Artifact, ArtifactExporter};
use crate::error::{Error, Result};
use crate::git::RepositoryController;
use crate::journal::Channel;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Slugs written into the working tree.
    pub exported: Vec<String>,
    /// Slugs the backend could not resolve.
    pub skipped: Vec<String>,
    /// Whether a commit was made and pushed.
    pub pushed: bool,
    pub cancelled: bool,
}

/// Master side of the sync.
pub struct ExportReconciler<'a> {
    ctx: &'a SyncContext,
    exporter: &'a dyn ArtifactExporter,
}

impl<'a> ExportReconciler<'a> {
    pub fn new(ctx: &'a SyncContext, exporter: &'a dyn ArtifactExporter) -> Self {
        Self { ctx, exporter }
    }

    /// Export every mapped artifact into the working tree, then make one
    /// commit and push it. A clean tree after export pushes nothing.
    ///
    /// # Errors
    /// - remote resolution or `ensure_repo` failures, before any export
    /// - [`Error::ExportFailed`] for the first artifact that cannot be
    ///   written; nothing is committed in that case
    /// - commit or push failures
    pub fn export_and_push_all(&self) -> Result<ExportSummary> {
        let repo = self.ctx.open_repository()?;
        let mut summary = ExportSummary::default();

        for artifact in self.ctx.config.artifacts.iter() {
            if self.ctx.cancel.is_cancelled() {
                self.ctx.log.log(
                    Channel::Export,
                    1,
                    &format!("Export cancelled before {}; nothing committed.", artifact.slug),
                );
                summary.cancelled = true;
                return Ok(summary);
            }
            if self.export_one(&repo, artifact)? {
                summary.exported.push(artifact.slug.clone());
            } else {
                summary.skipped.push(artifact.slug.clone());
            }
        }

        let message = format!(
            "SSGS export on {} @ {}",
            self.ctx.config.site,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        summary.pushed = repo.add_commit_push(&message, Some(self.ctx.branch()))?;
        if !summary.pushed {
            self.ctx
                .log
                .log(Channel::Export, 0, "Nothing to commit after export.");
        }
        self.ctx.state.mark_exported_now()?;
        Ok(summary)
    }

    fn resolve(&self, slug: &str) -> Option<u64> {
        match self.exporter.resolve_id(slug) {
            Ok(id) => id,
            Err(e) => {
                self.ctx.log.log(
                    Channel::Export,
                    1,
                    &format!("Failed to resolve project id for {slug}: {e}"),
                );
                None
            }
        }
    }

    /// `Ok(false)` when the slug does not resolve.
    fn export_one(&self, repo: &RepositoryController, artifact: &Artifact) -> Result<bool> {
        let slug = artifact.slug.as_str();
        let Some(id) = self.resolve(slug) else {
            self.ctx
                .log
                .log(Channel::Export, 1, &format!("Project not found for slug {slug}"));
            return Ok(false);
        };

        let dest = repo.workdir().join(&artifact.file);
        match self.write_export(id, &dest) {
            Ok(()) => {
                self.ctx.log.log(
                    Channel::Export,
                    0,
                    &format!("Exported {slug} to {}", dest.display()),
                );
                Ok(true)
            }
            Err(e) => {
                let reason = e.to_string();
                self.ctx.log.log(
                    Channel::Export,
                    1,
                    &format!("Export failed for {slug}: {reason}"),
                );
                Err(Error::ExportFailed {
                    slug: slug.to_string(),
                    reason,
                })
            }
        }
    }

    fn write_export(&self, id: u64, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.exporter.export(id)?;
        let copied = fs::copy(&tmp, dest);
        if let Err(e) = fs::remove_file(&tmp) {
            tracing::debug!("cannot remove {}: {}", tmp.display(), e);
        }
        copied?;
        Ok(())
    }
}
