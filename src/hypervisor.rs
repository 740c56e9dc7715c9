//! Hypervisor interface and implementations.
//!
//! The trait abstracts every external tool the coordinator drives:
//! domain control (`virsh`), image cloning (`qemu-img`), seed packaging
//! (`cloud-localds`) and install launch (`virt-install`). The real
//! implementation shells out; a mock implementation records calls and
//! scripts behavior for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::install::{self, InstallHandle};

/// Everything `virt-install` needs to launch one node.
#[derive(Debug, Clone)]
pub struct InstallSpec {
    /// Domain name (the rendered node name).
    pub name: String,
    pub os_variant: String,
    pub ram_mib: u32,
    /// MAC for the bridged interface, derived from the node id.
    pub mac: String,
    /// Host interface the bridged NIC attaches to.
    pub host_uplink: String,
    pub seed_path: PathBuf,
    pub clone_path: PathBuf,
    pub log_path: PathBuf,
}

/// External hypervisor tooling, one method per collaborator operation.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Whether a domain with this name is defined on the host.
    ///
    /// A failed query means "does not exist", not an error.
    async fn domain_exists(&self, name: &str) -> bool;

    /// Stop a running domain. Best-effort: a domain that is already
    /// stopped is not an error.
    async fn destroy(&self, name: &str) -> Result<()>;

    /// Remove a domain definition. Best-effort, like [`destroy`].
    ///
    /// [`destroy`]: Hypervisor::destroy
    async fn undefine(&self, name: &str) -> Result<()>;

    /// Create a writable qcow2 clone backed by the base image.
    async fn clone_image(&self, base: &Path, dest: &Path, size: &str) -> Result<()>;

    /// Package rendered configs into a boot seed ISO.
    async fn package_seed(
        &self,
        network: &Path,
        user: &Path,
        meta: &Path,
        iso: &Path,
    ) -> Result<()>;

    /// Spawn the install subprocess and put it under supervision.
    async fn start_install(&self, spec: &InstallSpec) -> Result<InstallHandle>;
}

/// Real implementation shelling out to the libvirt tool set.
#[derive(Debug, Default)]
pub struct VirshHypervisor;

impl VirshHypervisor {
    pub fn new() -> Self {
        Self
    }
}

/// Run a command to completion, failing on non-zero exit with the
/// tool's stderr in the error.
async fn run_checked(mut command: Command, what: &str) -> Result<()> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("running {what}"))?;
    if !output.status.success() {
        bail!(
            "{what} failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[async_trait]
impl Hypervisor for VirshHypervisor {
    async fn domain_exists(&self, name: &str) -> bool {
        let status = Command::new("virsh")
            .args(["domid", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) => status.success(),
            Err(error) => {
                warn!(%error, "virsh domid could not run, assuming no domain");
                false
            }
        }
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        info!(domain = %name, "destroying existing domain");
        let status = Command::new("virsh")
            .args(["destroy", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("running virsh destroy")?;
        if !status.success() {
            debug!(domain = %name, "virsh destroy reported failure, domain was likely stopped");
        }
        Ok(())
    }

    async fn undefine(&self, name: &str) -> Result<()> {
        let status = Command::new("virsh")
            .args(["undefine", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("running virsh undefine")?;
        if !status.success() {
            debug!(domain = %name, "virsh undefine reported failure");
        }
        Ok(())
    }

    async fn clone_image(&self, base: &Path, dest: &Path, size: &str) -> Result<()> {
        info!(base = %base.display(), clone = %dest.display(), "creating snapshot clone");
        let mut command = Command::new("qemu-img");
        command
            .args(["create", "-f", "qcow2", "-F", "qcow2", "-b"])
            .arg(base)
            .arg(dest)
            .arg(size);
        run_checked(command, "qemu-img create").await
    }

    async fn package_seed(
        &self,
        network: &Path,
        user: &Path,
        meta: &Path,
        iso: &Path,
    ) -> Result<()> {
        let mut command = Command::new("cloud-localds");
        command
            .arg("-v")
            .arg(format!("--network-config={}", network.display()))
            .arg(iso)
            .arg(user)
            .arg(meta);
        run_checked(command, "cloud-localds").await
    }

    async fn start_install(&self, spec: &InstallSpec) -> Result<InstallHandle> {
        info!(domain = %spec.name, "launching virt-install");
        let mut command = Command::new("virt-install");
        command
            .arg(format!("--name={}", spec.name))
            .arg("--graphics=none")
            .args(["--console", "pty,target_type=serial"])
            .arg(format!("--ram={}", spec.ram_mib))
            .args(["--network", "network=default"])
            .arg("--network")
            .arg(format!(
                "type=direct,source={},source_mode=bridge,model=virtio,mac={}",
                spec.host_uplink, spec.mac
            ))
            .arg("--import")
            .arg("--disk")
            .arg(format!("path={},device=cdrom", spec.seed_path.display()))
            .arg("--disk")
            .arg(format!("path={},format=qcow2", spec.clone_path.display()))
            .arg(format!("--os-variant={}", spec.os_variant))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command.spawn().context("spawning virt-install")?;
        install::supervise(&spec.name, child, &spec.log_path)
            .await
            .context("supervising virt-install")
    }
}

/// Scripted failure modes for [`MockHypervisor`].
#[derive(Debug, Clone, Default)]
struct MockBehavior {
    /// Clone fails for these node names.
    fail_clone: HashSet<String>,
    /// Spawning virt-install fails for these node names.
    fail_spawn: HashSet<String>,
    /// Install "crashes" this long after launch.
    crash_after: HashMap<String, Duration>,
}

/// Recorded external calls, for assertions.
#[derive(Debug, Default)]
pub struct MockCalls {
    pub destroys: Mutex<Vec<String>>,
    pub undefines: Mutex<Vec<String>>,
    pub clones: Mutex<Vec<String>>,
    pub seeds: Mutex<Vec<String>>,
    /// Kill signals actually delivered, per node.
    pub terminations: Mutex<HashMap<String, usize>>,
}

/// Mock hypervisor for tests and development.
///
/// Installs are simulated by a stub supervision task that counts kill
/// deliveries and can crash on a script, so race and idempotency
/// properties are observable without libvirt on the host.
#[derive(Debug, Default)]
pub struct MockHypervisor {
    existing: HashSet<String>,
    behavior: MockBehavior,
    calls: Arc<MockCalls>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a domain with this name is already defined.
    pub fn with_existing(mut self, name: &str) -> Self {
        self.existing.insert(name.to_string());
        self
    }

    /// Fail the clone step for this node.
    pub fn with_failing_clone(mut self, name: &str) -> Self {
        self.behavior.fail_clone.insert(name.to_string());
        self
    }

    /// Fail the install spawn for this node.
    pub fn with_failing_spawn(mut self, name: &str) -> Self {
        self.behavior.fail_spawn.insert(name.to_string());
        self
    }

    /// Have this node's install exit on its own after the given delay.
    pub fn with_crash_after(mut self, name: &str, delay: Duration) -> Self {
        self.behavior.crash_after.insert(name.to_string(), delay);
        self
    }

    pub async fn destroy_count(&self, name: &str) -> usize {
        self.calls
            .destroys
            .lock()
            .await
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    pub async fn undefine_count(&self, name: &str) -> usize {
        self.calls
            .undefines
            .lock()
            .await
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    pub async fn clone_count(&self) -> usize {
        self.calls.clones.lock().await.len()
    }

    /// How many kill signals were actually delivered to this node's
    /// install process.
    pub async fn termination_count(&self, name: &str) -> usize {
        self.calls
            .terminations
            .lock()
            .await
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Hypervisor for MockHypervisor {
    async fn domain_exists(&self, name: &str) -> bool {
        self.existing.contains(name)
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        self.calls.destroys.lock().await.push(name.to_string());
        Ok(())
    }

    async fn undefine(&self, name: &str) -> Result<()> {
        self.calls.undefines.lock().await.push(name.to_string());
        Ok(())
    }

    async fn clone_image(&self, _base: &Path, dest: &Path, _size: &str) -> Result<()> {
        let name = dest
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls.clones.lock().await.push(name.clone());
        if self.behavior.fail_clone.contains(&name) {
            bail!("qemu-img create failed (mock)");
        }
        Ok(())
    }

    async fn package_seed(
        &self,
        _network: &Path,
        _user: &Path,
        _meta: &Path,
        iso: &Path,
    ) -> Result<()> {
        self.calls
            .seeds
            .lock()
            .await
            .push(iso.display().to_string());
        Ok(())
    }

    async fn start_install(&self, spec: &InstallSpec) -> Result<InstallHandle> {
        if self.behavior.fail_spawn.contains(&spec.name) {
            bail!("virt-install spawn failed (mock)");
        }

        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        let (exit_tx, exit_rx) = watch::channel(None);

        let name = spec.name.clone();
        let crash_after = self.behavior.crash_after.get(&spec.name).copied();
        let calls = Arc::clone(&self.calls);
        tokio::spawn(async move {
            let crash = async {
                match crash_after {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = kill_rx.recv() => {
                    *calls.terminations.lock().await.entry(name).or_insert(0) += 1;
                    let _ = exit_tx.send(Some(0));
                }
                _ = crash => {
                    let _ = exit_tx.send(Some(1));
                }
            }
        });

        Ok(InstallHandle::from_parts(spec.name.clone(), kill_tx, exit_rx))
    }
}

/// An `InstallSpec` with placeholder paths, for mock-only tests.
pub fn mock_install_spec(name: &str) -> InstallSpec {
    InstallSpec {
        name: name.to_string(),
        os_variant: "fedora34".to_string(),
        ram_mib: 4096,
        mac: "52:54:00:00:00:05".to_string(),
        host_uplink: "eth0".to_string(),
        seed_path: PathBuf::from("/tmp/seed.iso"),
        clone_path: PathBuf::from("/tmp/clone.qcow2"),
        log_path: PathBuf::from("/tmp/install.log"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_tracks_existing_domains() {
        let hv = MockHypervisor::new().with_existing("vnode05");
        assert!(hv.domain_exists("vnode05").await);
        assert!(!hv.domain_exists("vnode06").await);
    }

    #[tokio::test]
    async fn mock_counts_destroy_and_undefine() {
        let hv = MockHypervisor::new().with_existing("vnode05");
        hv.destroy("vnode05").await.unwrap();
        hv.undefine("vnode05").await.unwrap();
        assert_eq!(hv.destroy_count("vnode05").await, 1);
        assert_eq!(hv.undefine_count("vnode05").await, 1);
        assert_eq!(hv.destroy_count("vnode06").await, 0);
    }

    #[tokio::test]
    async fn mock_install_counts_a_single_termination() {
        let hv = MockHypervisor::new();
        let handle = hv.start_install(&mock_install_spec("vnode05")).await.unwrap();
        handle.terminate().await;
        handle.terminate().await;
        assert_eq!(hv.termination_count("vnode05").await, 1);
    }

    #[tokio::test]
    async fn mock_failing_spawn_errors_immediately() {
        let hv = MockHypervisor::new().with_failing_spawn("vnode05");
        assert!(hv.start_install(&mock_install_spec("vnode05")).await.is_err());
    }
}
