//! Error taxonomy for the orchestration engine.
//!
//! Construction and build/start-time failures are fatal to the operation
//! that raised them; teardown-time failures are reported through the log
//! and never abort the remaining teardown steps.

use std::time::Duration;

/// A failure reported by an underlying node, link or terminal operation.
///
/// The orchestrator treats these as opaque: fatal on build/start paths,
/// warn-and-continue on stop paths.
#[derive(Debug, thiserror::Error)]
#[error("{op} failed on '{subject}': {detail}")]
pub struct ExternalError {
    /// Operation that failed, e.g. "start" or "ifconfig".
    pub op: String,
    /// Node, interface or link the operation was applied to.
    pub subject: String,
    /// Backend-specific failure description.
    pub detail: String,
}

impl ExternalError {
    pub fn new(
        op: impl Into<String>,
        subject: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        ExternalError {
            op: op.into(),
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

/// Errors surfaced by network assembly, mutation and lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// A node with this name is already registered.
    #[error("duplicate node name '{0}'")]
    DuplicateName(String),

    /// No node with this name exists in the registry.
    #[error("no node named '{0}'")]
    NotFound(String),

    /// No link joins the two named endpoints, in either order.
    #[error("no link between '{0}' and '{1}'")]
    LinkNotFound(String, String),

    /// The readiness budget expired with switches still unconnected.
    #[error("timed out after {elapsed:.1?} waiting for switches to connect ({} unready)", unready.len())]
    ReadinessTimeout {
        elapsed: Duration,
        /// Names of the switches that never reported a controller connection.
        unready: Vec<String>,
    },

    /// A required hook or option was missing or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An underlying node/link operation failed on a path that must succeed.
    #[error(transparent)]
    External(#[from] ExternalError),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, NetError>;
