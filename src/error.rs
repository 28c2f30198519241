//! Error types shared by the library.
//!
//! The binary wraps these in `anyhow` at the command boundary; everything
//! below the commands returns [`Result`].

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The argv was not `git <allowed-subcommand> ...`. Never reaches a process.
    #[error("git command not allowed: {argv}")]
    InvalidCommand { argv: String },

    #[error("git failed ({command}, exit {code}): {output}")]
    GitCommandFailed {
        command: String,
        code: i32,
        output: String,
    },

    #[error("invalid repository URL: {0}")]
    InvalidRepositoryUrl(String),

    #[error("repository URL not configured")]
    RepositoryNotConfigured,

    #[error("HTTPS token mode selected but no token is stored")]
    MissingCredential,

    #[error("no secondary sites selected")]
    EmptyTargetSet,

    #[error("token missing")]
    EmptyToken,

    #[error("automatic import unavailable for {slug}: {reason}")]
    ImportUnavailable { slug: String, reason: String },

    #[error("export failed for {slug}: {reason}")]
    ExportFailed { slug: String, reason: String },

    /// Failure reported by an artifact backend.
    #[error("artifact backend: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    pub(crate) fn backend(msg: impl Into<String>) -> Self {
        Error::Backend(msg.into())
    }
}
