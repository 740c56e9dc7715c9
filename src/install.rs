//! Install subprocess supervision.
//!
//! `virt-install` keeps a console attached to the guest and never exits
//! on its own while the VM is up, so nothing may ever wait on it for
//! completion. A supervision task owns the child instead: it pumps
//! output to the node's log, watches for an unexpected exit, and kills
//! the process when asked. The [`InstallHandle`] is the coordinator's
//! side of that task.

use std::path::Path;

use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Exit code reported when the process was ended by a signal.
const SIGNALED: i32 = -1;

/// Handle to a supervised install subprocess.
///
/// Owned exclusively by the coordinator that launched it. Termination
/// is idempotent: signalling a process that already exited is a no-op.
#[derive(Debug)]
pub struct InstallHandle {
    name: String,
    kill_tx: mpsc::Sender<()>,
    exit_rx: watch::Receiver<Option<i32>>,
}

impl InstallHandle {
    pub(crate) fn from_parts(
        name: String,
        kill_tx: mpsc::Sender<()>,
        exit_rx: watch::Receiver<Option<i32>>,
    ) -> Self {
        Self {
            name,
            kill_tx,
            exit_rx,
        }
    }

    /// Ask the supervision task to kill the process, then wait for the
    /// exit to be observed.
    ///
    /// Safe to call any number of times, including after the process
    /// already exited on its own: a closed channel just means there is
    /// nothing left to kill.
    pub async fn terminate(&self) {
        let _ = self.kill_tx.send(()).await;
        let mut exit_rx = self.exit_rx.clone();
        if exit_rx.wait_for(|code| code.is_some()).await.is_err() {
            debug!(node = %self.name, "install supervisor gone before exit was published");
        }
    }

    /// Resolve when the process exits without having been terminated.
    ///
    /// This is the crash path: the installer is expected to outlive the
    /// whole race, so an early exit means the install cannot succeed.
    pub async fn exited(&mut self) -> i32 {
        match self.exit_rx.wait_for(|code| code.is_some()).await {
            Ok(code) => code.unwrap_or(SIGNALED),
            Err(_) => SIGNALED,
        }
    }
}

/// Put a freshly spawned install child under supervision.
///
/// Truncates the node's previous log, then pumps the child's output
/// into it for as long as the process lives.
pub async fn supervise(
    name: &str,
    mut child: Child,
    log_path: &Path,
) -> std::io::Result<InstallHandle> {
    let log = tokio::fs::File::create(log_path).await?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, log.try_clone().await?));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, log));
    }

    let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
    let (exit_tx, exit_rx) = watch::channel(None);

    let node = name.to_string();
    tokio::spawn(async move {
        let natural_exit = tokio::select! {
            status = child.wait() => Some(status),
            _ = kill_rx.recv() => None,
        };
        let status = match natural_exit {
            Some(status) => status,
            None => {
                if let Err(error) = child.start_kill() {
                    // Already reaped between the signal and here.
                    debug!(node = %node, %error, "kill was a no-op");
                }
                child.wait().await
            }
        };
        let code = match status {
            Ok(status) => status.code().unwrap_or(SIGNALED),
            Err(error) => {
                warn!(node = %node, %error, "failed waiting on install process");
                SIGNALED
            }
        };
        debug!(node = %node, code, "install process exited");
        let _ = exit_tx.send(Some(code));
    });

    Ok(InstallHandle::from_parts(name.to_string(), kill_tx, exit_rx))
}

async fn pump(mut reader: impl AsyncRead + Unpin, mut log: tokio::fs::File) {
    let _ = tokio::io::copy(&mut reader, &mut log).await;
}
