//! Artifact path layout.
//!
//! Every per-node artifact lives under an explicit root, keyed by the
//! rendered node name. The same node always maps to the same paths, so
//! a re-run overwrites its own artifacts and never touches a sibling's.

use std::path::PathBuf;

use crate::node::NodeId;

/// Artifact root for one invocation.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Rendered cloud-init YAML files.
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("configs")
    }

    /// Cloned disks and seed ISOs.
    pub fn disk_dir(&self) -> PathBuf {
        self.root.join("disks")
    }

    /// Raw install output, one log per node.
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn config_file(&self, node: &NodeId, name: &str) -> PathBuf {
        self.config_dir().join(format!("{node}-{name}"))
    }

    pub fn clone_path(&self, node: &NodeId) -> PathBuf {
        self.disk_dir().join(format!("{node}.qcow2"))
    }

    pub fn seed_path(&self, node: &NodeId) -> PathBuf {
        self.disk_dir().join(format!("{node}.config.iso"))
    }

    pub fn log_path(&self, node: &NodeId) -> PathBuf {
        self.log_dir().join(format!("{node}.log"))
    }

    /// Create the directory layout; safe to call repeatedly.
    pub async fn ensure_layout(&self) -> std::io::Result<()> {
        for dir in [self.config_dir(), self.disk_dir(), self.log_dir()] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }
}
