//! Deployment settings persisted in `settings.json`

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Current settings file version
pub const SETTINGS_VERSION: u32 = 1;

/// Settings for connecting to the DHCP server and deploying to it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    pub version: u32,

    /// SSH port (default: 22)
    pub ssh_port: u16,

    /// Connection + authentication timeout in seconds
    pub connect_timeout_secs: u64,

    /// Upper bound for a single remote command in seconds
    pub command_timeout_secs: u64,

    /// Strict host key checking (default: false, matching the legacy accept-any behavior)
    /// - true: the server key must already be present in known_hosts
    /// - false: any server key is accepted
    pub strict_host_key_checking: bool,

    /// known_hosts file used in strict mode (default: ~/.ssh/known_hosts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_hosts_path: Option<PathBuf>,

    /// Remote file locations and service names
    pub dhcp: DhcpTargets,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            ssh_port: 22,
            connect_timeout_secs: 30,
            command_timeout_secs: 60,
            strict_host_key_checking: false,
            known_hosts_path: None,
            dhcp: DhcpTargets::default(),
        }
    }
}

/// Remote side of an ISC DHCP server installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DhcpTargets {
    /// dhcpd configuration file
    pub config_path: String,
    /// Interface-selection file read by the service init script
    pub interfaces_path: String,
    /// systemd unit restarted after the rewrite
    pub service_name: String,
    /// Interface written into `interfaces_path`
    pub interface_name: String,
}

impl Default for DhcpTargets {
    fn default() -> Self {
        Self {
            config_path: "/etc/dhcp/dhcpd.conf".to_string(),
            interfaces_path: "/etc/default/isc-dhcp-server".to_string(),
            service_name: "isc-dhcp-server".to_string(),
            interface_name: "enp0s3".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: DeploySettings =
            serde_json::from_str(r#"{"ssh_port": 2222, "dhcp": {"interface_name": "eth0"}}"#)
                .unwrap();

        assert_eq!(settings.ssh_port, 2222);
        assert_eq!(settings.command_timeout_secs, 60);
        assert!(!settings.strict_host_key_checking);
        assert_eq!(settings.dhcp.interface_name, "eth0");
        assert_eq!(settings.dhcp.config_path, "/etc/dhcp/dhcpd.conf");
    }
}
