//! Git integration layer.
//!
//! Everything goes through the `git` executable with a fixed allow-list of
//! subcommands ([`command`]); nothing here links a git implementation.
//! Other modules use [`RepositoryController`] for repository state and
//! [`resolve_remote`] to turn configuration into the URL handed to git.

mod command;
mod remote;
mod repository;

pub use command::{ALLOWED_SUBCOMMANDS, GitCommand, PROGRAM};
pub use remote::{authenticated_remote, redact, resolve_remote};
pub use repository::{PLACEHOLDER, RepositoryController};
