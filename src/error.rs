//! Error taxonomy for the provisioning pipeline.
//!
//! Only genuinely fatal conditions live here. A pre-flight conflict and a
//! probe timeout are ordinary [`Outcome`](crate::request::Outcome) values,
//! and transient probe errors are retried inside the prober without ever
//! surfacing.

use thiserror::Error;

/// Errors that end a single node's provisioning attempt.
///
/// Every variant is contained at the per-node coordinator boundary; none of
/// them aborts sibling nodes in the same invocation.
#[derive(Debug, Error)]
pub enum VnodeError {
    /// The node reference was not a bare id or a stem-prefixed id.
    #[error("invalid node identifier {0:?}")]
    InvalidIdentifier(String),

    /// The distribution code is not in the catalog.
    #[error("unknown distribution code {0:?}")]
    UnknownDistro(String),

    /// Clone, seed packaging, or install launch failed for this node.
    #[error("provisioning {node} failed: {reason}")]
    Provisioning { node: String, reason: String },
}

impl VnodeError {
    /// Wrap an external tooling failure for the given node, flattening
    /// the cause chain into the reason.
    pub fn provisioning(node: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Provisioning {
            node: node.into(),
            reason: format!("{source:#}"),
        }
    }
}
