//! Run settings for one invocation.
//!
//! Everything that used to be ambient (work directory, timeouts,
//! verbosity) is threaded through this value explicitly; there is no
//! global state to flip.

use std::path::PathBuf;
use std::time::Duration;

/// Per-node timeout for the whole launch-and-probe race.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Wait before the first probe attempt; guests are never reachable
/// immediately after launch.
pub const SETTLE_DELAY: Duration = Duration::from_secs(30);

/// Pause between failed probe attempts.
pub const RETRY_PERIOD: Duration = Duration::from_secs(10);

/// Guest RAM in MiB.
pub const DEFAULT_RAM_MIB: u32 = 4096;

/// Settings shared by every coordinator in one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root under which configs/, disks/ and logs/ are created.
    pub work_dir: PathBuf,
    /// Directory holding the base cloud images.
    pub boot_dir: PathBuf,
    /// Host interface the guests' second NIC bridges onto.
    pub host_uplink: String,
    pub ram_mib: u32,
    pub timeout: Duration,
    pub settle_delay: Duration,
    pub retry_period: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            boot_dir: PathBuf::from("/var/lib/libvirt/boot"),
            host_uplink: "eth0".to_string(),
            ram_mib: DEFAULT_RAM_MIB,
            timeout: DEFAULT_TIMEOUT,
            settle_delay: SETTLE_DELAY,
            retry_period: RETRY_PERIOD,
        }
    }
}
