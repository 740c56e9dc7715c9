//! Distribution profile catalog.
//!
//! A profile describes one cloud image family: where its base image
//! lives, which libvirt OS variant to declare, and how the guest names
//! its network interfaces. The catalog is static; an unknown code is a
//! configuration error, never a silent default.

use crate::error::VnodeError;

/// Operating system family of a distribution.
///
/// Closed set on purpose: interface naming below is an exhaustive match,
/// so adding a family is a compile-checked extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Fedora,
    Debian,
}

impl OsFamily {
    /// Guest NIC names (guest-network interface, bridged interface).
    ///
    /// These must match what the guest's device naming actually
    /// produces, or the rendered network configuration binds to
    /// nothing.
    pub fn interfaces(self) -> (&'static str, &'static str) {
        match self {
            OsFamily::Fedora => ("enp1s0", "enp2s0"),
            OsFamily::Debian => ("eth0", "eth1"),
        }
    }
}

/// Static descriptor of one provisionable distribution.
#[derive(Debug)]
pub struct DistroProfile {
    /// Short code used in CLI tokens, e.g. `f34`.
    pub code: &'static str,
    pub family: OsFamily,
    /// Value for `virt-install --os-variant`.
    pub os_variant: &'static str,
    /// Size of the per-node clone, qemu-img syntax.
    pub disk_size: &'static str,
    image: &'static str,
}

static CATALOG: &[DistroProfile] = &[
    DistroProfile {
        code: "f34",
        family: OsFamily::Fedora,
        os_variant: "fedora34",
        disk_size: "10G",
        image: "Fedora-Cloud-Base-34-1.2.x86_64.qcow2",
    },
    DistroProfile {
        code: "f35",
        family: OsFamily::Fedora,
        os_variant: "fedora35",
        disk_size: "10G",
        image: "Fedora-Cloud-Base-35-1.2.x86_64.qcow2",
    },
    DistroProfile {
        code: "deb11",
        family: OsFamily::Debian,
        os_variant: "debian11",
        disk_size: "10G",
        image: "debian-11-genericcloud-amd64.qcow2",
    },
];

impl DistroProfile {
    /// Look up a profile by short code.
    pub fn lookup(code: &str) -> Result<&'static DistroProfile, VnodeError> {
        CATALOG
            .iter()
            .find(|profile| profile.code == code)
            .ok_or_else(|| VnodeError::UnknownDistro(code.to_string()))
    }

    /// Base image filename, optionally for an alternative build.
    ///
    /// An alternative tag is spliced in before the extension, so
    /// `f34` + `beta` selects `Fedora-Cloud-Base-34-1.2.x86_64-beta.qcow2`.
    pub fn base_image(&self, alternative: Option<&str>) -> String {
        match alternative {
            None => self.image.to_string(),
            Some(tag) => match self.image.rsplit_once('.') {
                Some((name, ext)) => format!("{name}-{tag}.{ext}"),
                None => format!("{}-{tag}", self.image),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_code() {
        let profile = DistroProfile::lookup("f34").unwrap();
        assert_eq!(profile.os_variant, "fedora34");
        assert_eq!(profile.family, OsFamily::Fedora);
    }

    #[test]
    fn lookup_unknown_code_is_an_error() {
        let err = DistroProfile::lookup("arch").unwrap_err();
        assert!(err.to_string().contains("arch"));
    }

    #[test]
    fn base_image_without_alternative() {
        let profile = DistroProfile::lookup("f34").unwrap();
        assert_eq!(
            profile.base_image(None),
            "Fedora-Cloud-Base-34-1.2.x86_64.qcow2"
        );
    }

    #[test]
    fn base_image_with_alternative() {
        let profile = DistroProfile::lookup("f34").unwrap();
        assert_eq!(
            profile.base_image(Some("beta")),
            "Fedora-Cloud-Base-34-1.2.x86_64-beta.qcow2"
        );
    }

    #[test]
    fn interface_names_follow_family() {
        assert_eq!(OsFamily::Fedora.interfaces(), ("enp1s0", "enp2s0"));
        assert_eq!(OsFamily::Debian.interfaces(), ("eth0", "eth1"));
    }
}
