//! SSH Configuration

use std::fmt;
use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::config::DeploySettings;

/// Password-authenticated SSH connection target
#[derive(Clone)]
pub struct SshConfig {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Password for authentication (also used for sudo)
    pub password: Zeroizing<String>,

    /// Connection + authentication timeout in seconds
    pub timeout_secs: u64,

    /// Strict host key checking
    /// - true: the key must already be in known_hosts
    /// - false: accept any server key (legacy behavior, no pinning)
    pub strict_host_key_checking: bool,

    /// known_hosts file for strict mode
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// Target built from the stored login and the deployment settings
    pub fn from_settings(
        host: &str,
        username: &str,
        password: Zeroizing<String>,
        settings: &DeploySettings,
    ) -> Self {
        Self {
            host: host.to_string(),
            port: settings.ssh_port,
            username: username.to_string(),
            password,
            timeout_secs: settings.connect_timeout_secs,
            strict_host_key_checking: settings.strict_host_key_checking,
            known_hosts_path: settings.known_hosts_path.clone(),
        }
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout_secs", &self.timeout_secs)
            .field("strict_host_key_checking", &self.strict_host_key_checking)
            .finish()
    }
}
