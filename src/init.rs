use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Commented starter configuration, embedded at compile time.
pub const TEMPLATE: &str = include_str!("../assets/config.example.toml");

/// Write [`TEMPLATE`] to `path` unless a config already exists there.
///
/// Returns `true` when the file was written.
pub fn write_template(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, TEMPLATE).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(true)
}
