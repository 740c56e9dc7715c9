//! Per-node lifecycle coordination.
//!
//! The coordinator sequences one node through
//! preflight, artifact preparation, and the central race: an install
//! subprocess that never exits on its own runs in the background while
//! the readiness prober polls the node's address, all bounded by one
//! deadline. Whichever of probe success, install crash, or deadline
//! comes first decides the outcome, and the install process is
//! terminated on every path that started one.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use crate::config::Settings;
use crate::error::VnodeError;
use crate::hypervisor::{Hypervisor, InstallSpec};
use crate::preflight;
use crate::probe::{ProbeTransport, Prober};
use crate::request::{Outcome, Request};
use crate::seed;
use crate::workspace::Workspace;

/// Drives one node from request to terminal outcome.
pub struct Coordinator {
    hypervisor: Arc<dyn Hypervisor>,
    prober: Prober,
    settings: Settings,
    workspace: Workspace,
}

impl Coordinator {
    pub fn new(
        hypervisor: Arc<dyn Hypervisor>,
        transport: Arc<dyn ProbeTransport>,
        settings: Settings,
    ) -> Self {
        let prober = Prober::new(transport, &settings);
        let workspace = Workspace::new(&settings.work_dir);
        Self {
            hypervisor,
            prober,
            settings,
            workspace,
        }
    }

    /// Provision one node and report its outcome.
    ///
    /// Never returns an error: every failure is contained here and
    /// converted into an [`Outcome`], so sibling nodes are unaffected.
    pub async fn provision(&self, request: &Request) -> Outcome {
        let name = request.node.to_string();
        match self.try_provision(request).await {
            Ok(outcome) => {
                info!(node = %name, outcome = %outcome, "node finished");
                outcome
            }
            Err(error) => {
                let reason = root_cause(&error);
                error!(node = %name, %reason, "provisioning failed");
                Outcome::InstallFailed(reason)
            }
        }
    }

    async fn try_provision(&self, request: &Request) -> Result<Outcome, VnodeError> {
        let node = &request.node;
        let name = node.to_string();

        if !preflight::resolve(self.hypervisor.as_ref(), node, request.force)
            .await
            .map_err(|e| VnodeError::provisioning(&name, e))?
        {
            return Ok(Outcome::AlreadyRunning);
        }

        let spec = self
            .prepare_artifacts(request)
            .await
            .map_err(|e| VnodeError::provisioning(&name, e))?;

        // Spawn failure short-circuits the race before it starts.
        let mut handle = self
            .hypervisor
            .start_install(&spec)
            .await
            .map_err(|e| VnodeError::provisioning(&name, e))?;

        // The race. The install runs in the background for its whole
        // duration; the first of probe success, install crash, or
        // deadline decides. `biased` keeps the tie-break deterministic:
        // a probe success observable in the same step as the deadline
        // still counts as ready.
        let outcome = tokio::select! {
            biased;
            pretty = self.prober.wait_ready(node.address()) => Outcome::Ready(pretty),
            code = handle.exited() => {
                Outcome::InstallFailed(format!("install exited early (status {code})"))
            }
            () = tokio::time::sleep(self.settings.timeout) => Outcome::TimedOut,
        };

        // Unconditional, idempotent: the install must never outlive the
        // race, whichever way it went.
        handle.terminate().await;

        Ok(outcome)
    }

    /// Render configs, package the seed, and clone the disk.
    ///
    /// All paths are functions of the node name, so a re-run overwrites
    /// the same artifacts.
    async fn prepare_artifacts(&self, request: &Request) -> anyhow::Result<InstallSpec> {
        let node = &request.node;
        self.workspace
            .ensure_layout()
            .await
            .context("creating artifact directories")?;

        let configs = seed::write_configs(&self.workspace, node, request.profile.family)
            .await
            .context("rendering seed configs")?;

        let seed_path = self.workspace.seed_path(node);
        self.hypervisor
            .package_seed(&configs.network, &configs.user, &configs.meta, &seed_path)
            .await?;

        let base = self
            .settings
            .boot_dir
            .join(request.profile.base_image(request.alternative.as_deref()));
        let clone_path = self.workspace.clone_path(node);
        self.hypervisor
            .clone_image(&base, &clone_path, request.profile.disk_size)
            .await?;

        Ok(InstallSpec {
            name: node.to_string(),
            os_variant: request.profile.os_variant.to_string(),
            ram_mib: self.settings.ram_mib,
            mac: node.mac(),
            host_uplink: self.settings.host_uplink.clone(),
            seed_path,
            clone_path,
            log_path: self.workspace.log_path(node),
        })
    }
}

fn root_cause(error: &VnodeError) -> String {
    match error {
        VnodeError::Provisioning { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}
