//! Cloud-init seed config rendering.
//!
//! Renders the three YAML documents cloud-localds packages into the boot
//! seed: instance metadata, user data, and the network layout. The
//! network document is where the id-derived address and MAC meet the
//! family-specific interface names, so the generated configuration
//! matches what the guest actually calls its NICs.

use std::path::PathBuf;

use crate::distro::OsFamily;
use crate::node::NodeId;
use crate::workspace::Workspace;

/// Gateway and nameserver on the guest network.
const GATEWAY: &str = "192.168.122.1";

/// Paths of the rendered config files for one node.
#[derive(Debug)]
pub struct SeedConfigs {
    pub meta: PathBuf,
    pub user: PathBuf,
    pub network: PathBuf,
}

/// cloud-init instance metadata.
pub fn meta_data(node: &NodeId) -> String {
    format!("instance-id: {node}\nlocal-hostname: {node}\n")
}

/// cloud-init user data: hostname and a login usable on the console.
pub fn user_data(node: &NodeId) -> String {
    format!(
        "#cloud-config\n\
         hostname: {node}\n\
         fqdn: {node}.local\n\
         ssh_pwauth: true\n\
         password: {node}\n\
         chpasswd:\n\
         \x20 expire: false\n"
    )
}

/// cloud-init network configuration, version 2.
///
/// The first interface gets the id-derived static address the readiness
/// probe will target; the second is matched by its assigned MAC and
/// bridges onto the host uplink via DHCP.
pub fn network_config(node: &NodeId, family: OsFamily) -> String {
    let (primary, secondary) = family.interfaces();
    let address = node.address();
    let mac = node.mac();
    format!(
        "version: 2\n\
         ethernets:\n\
         \x20 {primary}:\n\
         \x20   addresses:\n\
         \x20     - {address}/24\n\
         \x20   gateway4: {GATEWAY}\n\
         \x20   nameservers:\n\
         \x20     addresses:\n\
         \x20       - {GATEWAY}\n\
         \x20 {secondary}:\n\
         \x20   dhcp4: true\n\
         \x20   match:\n\
         \x20     macaddress: \"{mac}\"\n"
    )
}

/// Write the three config files for a node, overwriting previous runs.
pub async fn write_configs(
    workspace: &Workspace,
    node: &NodeId,
    family: OsFamily,
) -> std::io::Result<SeedConfigs> {
    let configs = SeedConfigs {
        meta: workspace.config_file(node, "meta.yaml"),
        user: workspace.config_file(node, "user.yaml"),
        network: workspace.config_file(node, "network.yaml"),
    };
    tokio::fs::write(&configs.meta, meta_data(node)).await?;
    tokio::fs::write(&configs.user, user_data(node)).await?;
    tokio::fs::write(&configs.network, network_config(node, family)).await?;
    Ok(configs)
}
