//! Crate entry point for **ssgs** (slider git sync).
//!
//! A master site exports its slider projects into a git repository and
//! pushes them; secondary sites pull and re-import what changed. The master
//! can also call secondary sites directly to hand over a repository token,
//! trigger an import, or clear caches.
//!
//! Layering, bottom up: [`git`] drives the working tree, [`artifact`] is the
//! backend that owns projects, [`sync`] moves projects through the
//! repository, [`dispatch`] talks to secondary sites and [`receiver`] answers
//! them. The `cmd_*` functions back the `ssgs` binary.

pub mod artifact;
pub mod cancel;
mod commands;
pub mod config;
pub mod dispatch;
mod error;
pub mod git;
mod init;
pub mod journal;
pub mod logging;
pub mod paths;
mod progress;
pub mod receiver;
pub mod secret;
pub mod state;
pub mod sync;

pub use commands::{
    cmd_clear_cache, cmd_encrypt, cmd_export, cmd_home, cmd_import, cmd_init, cmd_push_token,
    cmd_receive, cmd_remote_import, cmd_status,
};
pub use error::{Error, Result};
pub use init::TEMPLATE;
