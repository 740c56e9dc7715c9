//! Node identity and network address derivation.
//!
//! A node is identified by a stem-prefixed, zero-padded number
//! (`vnode05`). The numeric id is the single source of truth for the
//! node's network identity: both the MAC suffix assigned at install time
//! and the address the readiness probe targets are derived from it, so
//! the two can never disagree.

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::VnodeError;

/// Default name stem for rendered node names.
pub const DEFAULT_STEM: &str = "vnode";

/// Default zero-padding width for the numeric id.
pub const DEFAULT_WIDTH: usize = 2;

/// Highest accepted node id.
///
/// The padded id doubles as the last MAC octet text and the id offsets
/// into the guest network's /24, so two decimal digits is the usable
/// id space.
pub const MAX_ID: u32 = 99;

/// Offset of node addresses within the guest network.
const ADDRESS_BASE: u8 = 100;

/// One requested virtual machine, identified by stem + zero-padded id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    stem: String,
    width: usize,
    id: u32,
}

impl NodeId {
    /// Create an identifier with the default stem and width.
    pub fn new(id: u32) -> Result<Self, VnodeError> {
        Self::with_stem(id, DEFAULT_STEM, DEFAULT_WIDTH)
    }

    /// Create an identifier with an explicit stem and padding width.
    pub fn with_stem(id: u32, stem: &str, width: usize) -> Result<Self, VnodeError> {
        if id > MAX_ID {
            return Err(VnodeError::InvalidIdentifier(id.to_string()));
        }
        Ok(Self {
            stem: stem.to_string(),
            width,
            id,
        })
    }

    /// Parse a user-supplied node reference.
    ///
    /// Accepts a bare number (`"5"`, `"05"`) or a name already carrying
    /// the stem (`"vnode05"`). Parsing a rendered name yields the same
    /// identifier back.
    pub fn parse(reference: &str, stem: &str, width: usize) -> Result<Self, VnodeError> {
        let token = reference.strip_prefix(stem).unwrap_or(reference);
        let id = token
            .parse::<u32>()
            .map_err(|_| VnodeError::InvalidIdentifier(reference.to_string()))?;
        Self::with_stem(id, stem, width)
    }

    /// The raw numeric id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The id rendered with zero padding, e.g. `"05"`.
    pub fn padded_id(&self) -> String {
        format!("{:0width$}", self.id, width = self.width)
    }

    /// MAC address for the node's bridged interface.
    pub fn mac(&self) -> String {
        format!("52:54:00:00:00:{}", self.padded_id())
    }

    /// Address of the node on the guest network.
    ///
    /// Rendered into the guest's network configuration and used as the
    /// readiness probe target; both sides see the same value because
    /// both call this.
    pub fn address(&self) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 122, ADDRESS_BASE + self.id as u8)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stem, self.padded_id())
    }
}
