//! Provisioning requests and per-node outcomes.
//!
//! A request token has the form `id[:distro[-alternative]]`; the
//! invocation supplies the default distribution and the force flag.

use std::fmt;

use crate::distro::DistroProfile;
use crate::error::VnodeError;
use crate::node::{NodeId, DEFAULT_STEM, DEFAULT_WIDTH};

/// One node-provisioning request.
#[derive(Debug)]
pub struct Request {
    pub node: NodeId,
    pub profile: &'static DistroProfile,
    /// Alternative base-image tag, e.g. `beta` from `5:f34-beta`.
    pub alternative: Option<String>,
    /// Destroy and undefine a pre-existing domain with the same name.
    pub force: bool,
}

impl Request {
    /// Parse a CLI token of the form `id[:distro[-alternative]]`.
    pub fn parse(token: &str, default_distro: &str, force: bool) -> Result<Self, VnodeError> {
        let (id_part, distro_part) = match token.split_once(':') {
            Some((id, distro)) => (id, distro),
            None => (token, default_distro),
        };

        let (code, alternative) = match distro_part.split_once('-') {
            Some((code, alt)) => (code, Some(alt.to_string())),
            None => (distro_part, None),
        };

        Ok(Self {
            node: NodeId::parse(id_part, DEFAULT_STEM, DEFAULT_WIDTH)?,
            profile: DistroProfile::lookup(code)?,
            alternative,
            force,
        })
    }
}

/// Terminal result of one node's lifecycle, exactly one per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Node answered the readiness probe; carries the OS pretty name.
    Ready(String),
    /// Deadline elapsed before the node ever answered.
    TimedOut,
    /// A domain with this name already exists and force was not given.
    AlreadyRunning,
    /// Clone, seed, or install launch failed, or the installer died.
    InstallFailed(String),
}

impl Outcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(pretty) => write!(f, "READY ({pretty})"),
            Outcome::TimedOut => write!(f, "DOWN (timed out)"),
            Outcome::AlreadyRunning => write!(f, "ALREADY RUNNING"),
            Outcome::InstallFailed(reason) => write!(f, "INSTALL FAILED ({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("5", "f34", None)]
    #[case("5:f35", "f35", None)]
    #[case("vnode05:deb11", "deb11", None)]
    #[case("5:f34-beta", "f34", Some("beta"))]
    fn parse_token_forms(
        #[case] token: &str,
        #[case] expected_code: &str,
        #[case] expected_alt: Option<&str>,
    ) {
        let request = Request::parse(token, "f34", false).unwrap();
        assert_eq!(request.node.to_string(), "vnode05");
        assert_eq!(request.profile.code, expected_code);
        assert_eq!(request.alternative.as_deref(), expected_alt);
    }

    #[test]
    fn parse_uses_default_distro() {
        let request = Request::parse("7", "deb11", true).unwrap();
        assert_eq!(request.profile.code, "deb11");
        assert!(request.force);
    }

    #[test]
    fn parse_rejects_unknown_distro() {
        assert!(matches!(
            Request::parse("5:arch", "f34", false),
            Err(VnodeError::UnknownDistro(_))
        ));
    }

    #[test]
    fn parse_rejects_bad_identifier() {
        assert!(matches!(
            Request::parse("nope:f34", "f34", false),
            Err(VnodeError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn outcome_display_lines() {
        assert_eq!(
            Outcome::Ready("Fedora Linux 34".into()).to_string(),
            "READY (Fedora Linux 34)"
        );
        assert_eq!(Outcome::TimedOut.to_string(), "DOWN (timed out)");
        assert_eq!(Outcome::AlreadyRunning.to_string(), "ALREADY RUNNING");
    }
}
