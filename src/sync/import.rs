use std::collections::BTreeMap;
use std::path::Path;

use super::SyncContext;
use crate::artifact::{Artifact, ArtifactImporter};
use crate::error::{Error, Result};
use crate::journal::Channel;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// HEAD before and after the pull (`""` when there was none).
    pub before: String,
    pub after: String,
    pub imported: Vec<String>,
    /// Present and already imported at `after`.
    pub unchanged: Vec<String>,
    /// Mapped file absent from the working tree.
    pub missing: Vec<String>,
    pub failed: BTreeMap<String, String>,
    pub cancelled: bool,
}

impl ImportSummary {
    pub fn same_commit(&self) -> bool {
        !self.before.is_empty() && self.before == self.after
    }
}

/// Secondary side of the sync.
pub struct ImportReconciler<'a> {
    ctx: &'a SyncContext,
    importer: &'a dyn ArtifactImporter,
}

impl<'a> ImportReconciler<'a> {
    pub fn new(ctx: &'a SyncContext, importer: &'a dyn ArtifactImporter) -> Self {
        Self { ctx, importer }
    }

    /// Pull, then import each mapped artifact that may have changed.
    ///
    /// An artifact is imported when the pull moved HEAD, when its file was
    /// last imported at another commit, or when no id is cached for its
    /// slug. Missing files are logged and skipped.
    ///
    /// # Errors
    /// - remote resolution, `ensure_repo` or pull failures (nothing is
    ///   imported)
    /// - [`Error::ImportUnavailable`] when every artifact present in the
    ///   working tree was attempted and failed; a failure next to imported or
    ///   unchanged artifacts stays in [`ImportSummary::failed`]
    pub fn pull_and_import_all(&self) -> Result<ImportSummary> {
        let repo = self.ctx.open_repository()?;

        let mut summary = ImportSummary {
            before: repo.current_commit(),
            ..Default::default()
        };
        repo.pull(Some(self.ctx.branch()))?;
        summary.after = repo.current_commit();
        let same_commit = summary.same_commit();

        for artifact in self.ctx.config.artifacts.iter() {
            if self.ctx.cancel.is_cancelled() {
                self.ctx.log.log(
                    Channel::Import,
                    1,
                    &format!("Import cancelled before {}.", artifact.slug),
                );
                summary.cancelled = true;
                break;
            }

            let path = repo.workdir().join(&artifact.file);
            if !path.is_file() {
                self.ctx.log.log(
                    Channel::Import,
                    1,
                    &format!(
                        "Missing file for project {} at {}",
                        artifact.slug,
                        path.display()
                    ),
                );
                summary.missing.push(artifact.slug.clone());
                continue;
            }

            let existing = self.ctx.state.artifact_id(&artifact.slug)?;
            let recorded = self.ctx.state.imported_commit(&artifact.file)?;
            let stale = recorded.as_deref() != Some(summary.after.as_str());
            if same_commit && !stale && existing.is_some() {
                summary.unchanged.push(artifact.slug.clone());
                continue;
            }

            match self.import_one(artifact, &path, existing) {
                Ok(()) => {
                    self.ctx
                        .state
                        .mark_file_imported(&artifact.file, &summary.after)?;
                    summary.imported.push(artifact.slug.clone());
                }
                Err(Error::ImportUnavailable { slug, reason }) => {
                    summary.failed.insert(slug, reason);
                }
                Err(e) => return Err(e),
            }
        }

        if summary.imported.is_empty() && same_commit {
            self.ctx
                .log
                .log(Channel::Import, 0, "No changes detected after pull.");
        }

        if summary.imported.is_empty()
            && summary.unchanged.is_empty()
            && let Some((slug, reason)) = summary.failed.iter().next()
        {
            return Err(Error::ImportUnavailable {
                slug: slug.clone(),
                reason: reason.clone(),
            });
        }
        Ok(summary)
    }

    /// Replace the artifact for `artifact.slug` with the file at `path`.
    fn import_one(&self, artifact: &Artifact, path: &Path, existing: Option<u64>) -> Result<()> {
        let slug = artifact.slug.as_str();
        let log = &self.ctx.log;

        if let Some(old) = existing
            && let Err(e) = self.importer.delete(old)
        {
            log.log(
                Channel::Import,
                1,
                &format!("Failed to delete existing project {old}: {e}"),
            );
        }

        let returned = match self.importer.import(path) {
            Ok(id) => id,
            Err(e) => {
                log.log(Channel::Import, 1, &format!("Import failed for {slug}: {e}"));
                return Err(Error::ImportUnavailable {
                    slug: slug.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let id = match returned {
            Some(id) => Some(id),
            None => self.importer.resolve_id(slug).unwrap_or_else(|e| {
                log.log(
                    Channel::Import,
                    1,
                    &format!("Lookup of project id failed for {slug}: {e}"),
                );
                None
            }),
        };

        if let Some(id) = id {
            if let Err(e) = self.importer.update_alias(id, slug) {
                log.log(
                    Channel::Import,
                    1,
                    &format!("Failed to update alias for {slug}: {e}"),
                );
            }
            self.ctx.state.set_artifact_id(slug, id)?;
            if let Err(e) = self.importer.clear_cache(id) {
                log.log(
                    Channel::Import,
                    1,
                    &format!("Cache clear failed for project {id}: {e}"),
                );
            }
        }

        log.log(
            Channel::Import,
            0,
            &format!("Imported {slug} from {}", path.display()),
        );
        self.ctx.state.mark_imported_now(slug)?;
        Ok(())
    }
}
