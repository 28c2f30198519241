//! Slider artifacts and the backend that owns them.
//!
//! The sync engine never looks inside an artifact. It only needs to map a
//! slug to the backend's numeric id, ask the backend for an export file, and
//! hand an exported file back for import. Those capabilities are the traits
//! below; [`DirectoryStore`] is the backend bound by the binary.

mod mapping;
mod store;

use std::path::{Path, PathBuf};

use crate::error::Result;

pub use mapping::{Artifact, ArtifactMapping, sanitize_file, sanitize_slug};
pub use store::DirectoryStore;

/// Slug → id resolution shared by both directions.
pub trait ArtifactCatalog {
    /// Look up the id currently aliased to `slug`.
    fn resolve_id(&self, slug: &str) -> Result<Option<u64>>;
}

/// Master side: turns an artifact into a portable file.
pub trait ArtifactExporter: ArtifactCatalog {
    /// Write the artifact to a temporary file and return its path. The
    /// caller removes the file once it has been copied.
    fn export(&self, id: u64) -> Result<PathBuf>;
}

/// Secondary side: loads exported files back into the backend.
pub trait ArtifactImporter: ArtifactCatalog {
    /// Import the file at `path` as a new artifact. `Ok(None)` means the
    /// import succeeded but the backend did not report the new id.
    fn import(&self, path: &Path) -> Result<Option<u64>>;

    fn delete(&self, id: u64) -> Result<()>;

    /// Point `slug` at `id` so later lookups by slug find the new artifact.
    fn update_alias(&self, id: u64, slug: &str) -> Result<()>;

    fn clear_cache(&self, id: u64) -> Result<()>;
}
