//! Readiness probing.
//!
//! The prober retries forever; it owns no deadline. All timeout policy
//! lives in the coordinator, which races the probe against the clock
//! and cancels it. That split keeps the retry loop trivial and the
//! timeout in exactly one place.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::config::Settings;

/// Introspection command run on the guest once it answers.
pub const OS_RELEASE_COMMAND: &str = "cat /etc/os-release";

/// Key extracted from the command's key=value output.
pub const PRETTY_NAME_KEY: &str = "PRETTY_NAME";

/// Payload when the guest answers but the key is missing.
pub const UNKNOWN_PRETTY_NAME: &str = "unknown";

/// Remote command execution against a guest address.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Run a command on the target, returning its stdout.
    ///
    /// Any error is transient from the prober's point of view: refused
    /// connections, half-booted sshd, auth not yet seeded. The prober
    /// never distinguishes them.
    async fn run_command(&self, address: Ipv4Addr, command: &str) -> Result<String>;
}

/// SSH-based transport for real guests.
#[derive(Debug, Default)]
pub struct SshTransport;

impl SshTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProbeTransport for SshTransport {
    async fn run_command(&self, address: Ipv4Addr, command: &str) -> Result<String> {
        let output = Command::new("ssh")
            .args([
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-o",
                "ConnectTimeout=5",
            ])
            .arg(format!("root@{address}"))
            .arg(command)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .context("running ssh")?;
        if !output.status.success() {
            bail!(
                "ssh to {address} failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Extract the human-readable distribution label from os-release text.
///
/// Missing key yields the `"unknown"` sentinel rather than an error; a
/// guest that answers at all is ready.
pub fn pretty_name(output: &str) -> String {
    for line in output.lines() {
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == PRETTY_NAME_KEY {
                return value.trim().trim_matches('"').to_string();
            }
        }
    }
    UNKNOWN_PRETTY_NAME.to_string()
}

/// Repeatedly probes one address until it answers.
pub struct Prober {
    transport: Arc<dyn ProbeTransport>,
    settle_delay: Duration,
    retry_period: Duration,
}

impl Prober {
    pub fn new(transport: Arc<dyn ProbeTransport>, settings: &Settings) -> Self {
        Self {
            transport,
            settle_delay: settings.settle_delay,
            retry_period: settings.retry_period,
        }
    }

    /// Wait until the target answers, returning its pretty name.
    ///
    /// Never returns on its own for an unreachable target; the caller
    /// bounds total time by cancelling this future.
    pub async fn wait_ready(&self, address: Ipv4Addr) -> String {
        tokio::time::sleep(self.settle_delay).await;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(%address, attempt, "probing");
            match self.transport.run_command(address, OS_RELEASE_COMMAND).await {
                Ok(output) => return pretty_name(&output),
                Err(error) => {
                    trace!(%address, attempt, %error, "probe attempt failed");
                    tokio::time::sleep(self.retry_period).await;
                }
            }
        }
    }
}

/// Scripted reachability for one address.
#[derive(Debug, Clone)]
enum MockReachability {
    /// Succeed on the nth attempt (1-based), returning this output.
    ReadyAfter { attempts: u32, output: String },
    /// Never answer.
    Never,
}

/// Mock transport with per-address scripts, for tests.
#[derive(Debug, Default)]
pub struct MockTransport {
    scripts: HashMap<Ipv4Addr, MockReachability>,
    attempts: Mutex<HashMap<Ipv4Addr, u32>>,
}

impl MockTransport {
    /// A transport where every address is unreachable unless scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script this address to answer on its nth attempt.
    pub fn with_ready_after(mut self, address: Ipv4Addr, attempts: u32, output: &str) -> Self {
        self.scripts.insert(
            address,
            MockReachability::ReadyAfter {
                attempts,
                output: output.to_string(),
            },
        );
        self
    }

    /// Script this address to never answer (the default).
    pub fn with_never(mut self, address: Ipv4Addr) -> Self {
        self.scripts.insert(address, MockReachability::Never);
        self
    }

    /// Attempts made against this address so far.
    pub async fn attempts(&self, address: Ipv4Addr) -> u32 {
        self.attempts
            .lock()
            .await
            .get(&address)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProbeTransport for MockTransport {
    async fn run_command(&self, address: Ipv4Addr, _command: &str) -> Result<String> {
        let attempt = {
            let mut attempts = self.attempts.lock().await;
            let count = attempts.entry(address).or_insert(0);
            *count += 1;
            *count
        };
        match self.scripts.get(&address) {
            Some(MockReachability::ReadyAfter { attempts, output }) if attempt >= *attempts => {
                Ok(output.clone())
            }
            _ => bail!("connection refused (mock)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OS_RELEASE: &str = "NAME=\"Fedora Linux\"\nVERSION=\"34 (Cloud Edition)\"\nPRETTY_NAME=\"Fedora Linux 34 (Cloud Edition)\"\nID=fedora\n";

    #[test]
    fn pretty_name_extracts_and_unquotes() {
        assert_eq!(pretty_name(OS_RELEASE), "Fedora Linux 34 (Cloud Edition)");
    }

    #[test]
    fn pretty_name_missing_key_is_unknown() {
        assert_eq!(pretty_name("NAME=Fedora\nID=fedora\n"), UNKNOWN_PRETTY_NAME);
        assert_eq!(pretty_name(""), UNKNOWN_PRETTY_NAME);
    }

    #[tokio::test(start_paused = true)]
    async fn prober_waits_settle_then_retries() {
        let address = Ipv4Addr::new(192, 168, 122, 105);
        let transport = Arc::new(MockTransport::new().with_ready_after(address, 2, OS_RELEASE));
        let settings = Settings::default();
        let prober = Prober::new(Arc::clone(&transport) as Arc<dyn ProbeTransport>, &settings);

        let started = tokio::time::Instant::now();
        let pretty = prober.wait_ready(address).await;
        assert_eq!(pretty, "Fedora Linux 34 (Cloud Edition)");
        assert_eq!(transport.attempts(address).await, 2);
        // Settle delay plus one retry period.
        assert_eq!(started.elapsed(), Duration::from_secs(40));
    }
}
