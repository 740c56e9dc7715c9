//! Pre-flight conflict resolution.
//!
//! Checks whether a domain with the node's name already exists before
//! anything is launched. The check-then-act window against out-of-band
//! hypervisor changes is accepted; a launch that loses that race simply
//! fails and is reported as an install failure.

use anyhow::Result;
use tracing::{debug, info};

use crate::hypervisor::Hypervisor;
use crate::node::NodeId;

/// Decide whether provisioning may proceed for this node.
///
/// Returns `false` when a domain exists and `force` is off; the caller
/// reports that as "already running" and starts nothing. With `force`,
/// issues exactly one destroy and one undefine before giving the green
/// light.
pub async fn resolve(hypervisor: &dyn Hypervisor, node: &NodeId, force: bool) -> Result<bool> {
    let name = node.to_string();
    if !hypervisor.domain_exists(&name).await {
        debug!(node = %name, "no existing domain");
        return Ok(true);
    }
    if !force {
        info!(node = %name, "domain already exists, not forcing");
        return Ok(false);
    }
    info!(node = %name, "clearing existing domain");
    hypervisor.destroy(&name).await?;
    hypervisor.undefine(&name).await?;
    Ok(true)
}
