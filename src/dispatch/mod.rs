//! Outbound calls to secondary sites.
//!
//! [`DispatchClient`] performs a single authenticated POST; [`Coordinator`]
//! validates a target list, fans the action out and folds the outcomes into
//! a [`DispatchReport`].

mod client;
mod coordinator;
mod report;

pub use client::{Action, DispatchClient, DispatchOutcome, NAMESPACE, SECRET_HEADER, endpoint_url};
pub use coordinator::Coordinator;
pub use report::{DispatchReport, TargetError};
