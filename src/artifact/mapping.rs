use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One configured artifact: a slug known to the slider backend and the file
/// it is stored as inside the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub file: String,
}

impl Artifact {
    pub fn new(slug: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            file: file.into(),
        }
    }
}

/// Ordered, de-duplicated artifact list.
///
/// Built from raw config entries: both fields are sanitized, entries that
/// end up empty are dropped, a repeated slug replaces the earlier definition
/// in place, and a repeated filename is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Artifact>", into = "Vec<Artifact>")]
pub struct ArtifactMapping {
    entries: Vec<Artifact>,
}

impl ArtifactMapping {
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|a| a.slug.as_str())
    }
}

impl From<Vec<Artifact>> for ArtifactMapping {
    fn from(raw: Vec<Artifact>) -> Self {
        let mut entries: Vec<Artifact> = Vec::with_capacity(raw.len());
        for a in raw {
            let slug = sanitize_slug(&a.slug);
            let file = sanitize_file(&a.file);
            if slug.is_empty() || file.is_empty() {
                continue;
            }
            if let Some(existing) = entries.iter_mut().find(|e| e.slug == slug) {
                existing.file = file;
            } else {
                entries.push(Artifact { slug, file });
            }
        }

        let mut seen = HashSet::new();
        entries.retain(|a| {
            let fresh = seen.insert(a.file.clone());
            if !fresh {
                tracing::warn!("dropping {}: file {} already mapped", a.slug, a.file);
            }
            fresh
        });
        Self { entries }
    }
}

impl From<ArtifactMapping> for Vec<Artifact> {
    fn from(m: ArtifactMapping) -> Self {
        m.entries
    }
}

impl FromIterator<Artifact> for ArtifactMapping {
    fn from_iter<I: IntoIterator<Item = Artifact>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

/// Lower-case, keep `[a-z0-9_-]`, collapse everything else into single
/// dashes and trim dashes at both ends.
pub fn sanitize_slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut dash = false;
    for ch in raw.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
            dash = false;
        } else if !dash {
            out.push('-');
            dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

/// Normalize a repository-relative file path. Returns `""` for anything
/// that could escape the working directory.
pub fn sanitize_file(raw: &str) -> String {
    let mut parts = Vec::new();
    for seg in raw.trim().split('/') {
        let seg: String = seg.trim().chars().filter(|c| !c.is_control()).collect();
        match seg.as_str() {
            "" | "." => continue,
            ".." => return String::new(),
            s if s.contains('\\') => return String::new(),
            _ => parts.push(seg),
        }
    }
    parts.join("/")
}
