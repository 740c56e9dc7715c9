//! vnode — provision short-lived libvirt VMs and wait for them to come up.
//!
//! One invocation takes a batch of node requests, provisions each from a
//! cloud image, and detects the moment every machine becomes reachable
//! over the network. The install subprocess (`virt-install` with an
//! attached console) never exits on its own, so each node's lifecycle is
//! a race: probe success against a deadline, with the install killed at
//! the finish line either way.
//!
//! ## Architecture
//!
//! ```text
//! batch::run_all
//! └── lifecycle::Coordinator (one per node, concurrent)
//!     ├── preflight            existing-domain conflict resolution
//!     ├── seed + hypervisor    clone disk, package boot seed
//!     ├── install              supervised virt-install subprocess
//!     └── probe                readiness polling, cancelled by the race
//! ```
//!
//! External tooling (virsh, qemu-img, cloud-localds, virt-install, ssh)
//! sits behind the [`Hypervisor`] and [`probe::ProbeTransport`] traits;
//! mock implementations of both ship in the library so the lifecycle
//! logic is testable without a libvirt host.

pub mod batch;
pub mod config;
pub mod distro;
pub mod error;
pub mod hypervisor;
pub mod install;
pub mod lifecycle;
pub mod node;
pub mod preflight;
pub mod probe;
pub mod request;
pub mod seed;
pub mod workspace;

pub use config::Settings;
pub use error::VnodeError;
pub use hypervisor::{Hypervisor, MockHypervisor, VirshHypervisor};
pub use lifecycle::Coordinator;
pub use node::NodeId;
pub use request::{Outcome, Request};
