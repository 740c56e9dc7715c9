//! Fan-out over all requested nodes.
//!
//! Every node's coordinator runs as its own task; the aggregator waits
//! for all of them and reports results in request order, whatever order
//! they actually finished in. One node failing, or even panicking,
//! never cancels a sibling.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::error;

use crate::error::VnodeError;
use crate::lifecycle::Coordinator;
use crate::request::{Outcome, Request};

/// One entry of the requested batch: a parsed request, or a token that
/// failed to parse and is carried through to its own outcome line.
#[derive(Debug)]
pub enum BatchEntry {
    Request(Request),
    Invalid { token: String, error: VnodeError },
}

impl BatchEntry {
    /// Parse a CLI token; a bad token becomes an `Invalid` entry rather
    /// than aborting the invocation.
    pub fn parse(token: &str, default_distro: &str, force: bool) -> Self {
        match Request::parse(token, default_distro, force) {
            Ok(request) => BatchEntry::Request(request),
            Err(error) => BatchEntry::Invalid {
                token: token.to_string(),
                error,
            },
        }
    }
}

/// Final report for one requested node.
#[derive(Debug)]
pub struct NodeReport {
    /// Rendered node name, or the raw token when parsing failed.
    pub name: String,
    pub outcome: Outcome,
}

/// Run every entry's coordinator concurrently and collect outcomes.
///
/// The result is positionally aligned with `entries`: completion order
/// is not observable in the output.
pub async fn run_all(coordinator: Arc<Coordinator>, entries: Vec<BatchEntry>) -> Vec<NodeReport> {
    let mut names = Vec::with_capacity(entries.len());
    let mut tasks = Vec::with_capacity(entries.len());

    for entry in entries {
        match entry {
            BatchEntry::Request(request) => {
                names.push(request.node.to_string());
                let coordinator = Arc::clone(&coordinator);
                tasks.push(tokio::spawn(async move {
                    coordinator.provision(&request).await
                }));
            }
            BatchEntry::Invalid { token, error } => {
                names.push(token);
                tasks.push(tokio::spawn(async move {
                    Outcome::InstallFailed(error.to_string())
                }));
            }
        }
    }

    let results = join_all(tasks).await;

    names
        .into_iter()
        .zip(results)
        .map(|(name, result)| {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!(node = %name, error = %join_error, "provisioning task panicked");
                    Outcome::InstallFailed("provisioning task panicked".to_string())
                }
            };
            NodeReport { name, outcome }
        })
        .collect()
}
