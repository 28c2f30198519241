use std::collections::BTreeMap;
use std::fmt;

use crate::state::ActionKind;

/// A requested target that was never dispatched to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    Unknown { label: String },
    MissingUrl { label: String },
    MissingSecret { label: String },
}

impl TargetError {
    pub fn label(&self) -> &str {
        match self {
            TargetError::Unknown { label }
            | TargetError::MissingUrl { label }
            | TargetError::MissingSecret { label } => label,
        }
    }

    /// Whether the label names a configured site (and so has a status
    /// record to attach this error to).
    pub fn is_configured(&self) -> bool {
        !matches!(self, TargetError::Unknown { .. })
    }
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::Unknown { label } => write!(f, "Unknown secondary site: {label}"),
            TargetError::MissingUrl { label } => write!(f, "Missing URL for {label}."),
            TargetError::MissingSecret { label } => {
                write!(f, "No shared secret stored for {label}.")
            }
        }
    }
}

/// Outcome of one multi-target trigger.
///
/// A label lands in at most one of the three partitions. `errors` holds
/// targets rejected before dispatch; `succeeded`/`failed` hold the message
/// of each dispatched target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub succeeded: BTreeMap<String, String>,
    pub failed: BTreeMap<String, String>,
    pub errors: Vec<TargetError>,
}

impl DispatchReport {
    /// Number of targets actually dispatched to.
    pub fn queued(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.errors.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// One line for the operator: a count when everything went through,
    /// otherwise failed labels, validation errors and the successes.
    pub fn summary(&self, kind: ActionKind) -> String {
        let n = self.succeeded.len();
        let sites = if n == 1 { "site" } else { "sites" };
        if self.is_clean() {
            return match kind {
                ActionKind::Token => format!("Token delivered to {n} {sites}."),
                ActionKind::Import => format!("Import triggered on {n} {sites}."),
                ActionKind::Cache => format!("Cache cleared on {n} {sites}."),
            };
        }

        let mut parts = Vec::new();
        if !self.failed.is_empty() {
            let labels: Vec<&str> = self.failed.keys().map(String::as_str).collect();
            parts.push(format!("Failed: {}.", labels.join(", ")));
        }
        let mut seen = Vec::new();
        for msg in self.error_messages() {
            if !seen.contains(&msg) {
                seen.push(msg);
            }
        }
        if !seen.is_empty() {
            parts.push(seen.join(" "));
        }
        if n > 0 {
            let labels: Vec<&str> = self.succeeded.keys().map(String::as_str).collect();
            let lead = match kind {
                ActionKind::Token => "Delivered to",
                ActionKind::Import => "Triggered on",
                ActionKind::Cache => "Cleared on",
            };
            parts.push(format!("{lead}: {}.", labels.join(", ")));
        }
        parts.join(" ")
    }
}
