//! SSH Client implementation using russh

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::keys::PublicKey;
use russh::*;
use tracing::{debug, info, warn};

use super::config::SshConfig;
use super::error::{ConnectError, SshError};
use super::known_hosts::{HostKeyVerification, KnownHostsStore};
use super::session::{RemoteSession, SessionConnector, SshSession};

/// Opens password-authenticated sessions
pub struct SshClient {
    config: SshConfig,
}

impl SshClient {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Connect and authenticate, bounded by the configured timeout
    pub async fn connect(self) -> Result<SshSession, ConnectError> {
        let timeout_secs = self.config.timeout_secs;

        tokio::time::timeout(Duration::from_secs(timeout_secs), self.connect_inner())
            .await
            .map_err(|_| {
                warn!("SSH connection timed out after {}s", timeout_secs);
                ConnectError::Timeout(timeout_secs)
            })?
    }

    async fn connect_inner(self) -> Result<SshSession, ConnectError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!("Connecting to SSH server at {}", addr);

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| ConnectError::Unreachable(format!("Failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| ConnectError::Unreachable("No address found".to_string()))?;

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler::new(
            self.config.host.clone(),
            self.config.port,
            self.config.strict_host_key_checking,
            self.config.known_hosts_path.clone(),
        );

        let mut handle = client::connect(Arc::new(ssh_config), socket_addr, handler)
            .await
            .map_err(|e| match e {
                SshError::HostKeyRejected(msg) => ConnectError::HostKeyRejected(msg),
                other => ConnectError::Unreachable(other.to_string()),
            })?;

        debug!("SSH handshake completed");

        let authenticated = handle
            .authenticate_password(&self.config.username, self.config.password.as_str())
            .await
            .map_err(|e| ConnectError::Unreachable(e.to_string()))?;

        if !authenticated.success() {
            warn!("SSH authentication rejected for user {}", self.config.username);
            let _ = handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await;
            return Err(ConnectError::AuthRejected);
        }

        info!("SSH authentication successful");

        Ok(SshSession::new(handle))
    }
}

/// `SessionConnector` backed by russh
#[derive(Debug, Default, Clone, Copy)]
pub struct RusshConnector;

#[async_trait]
impl SessionConnector for RusshConnector {
    async fn connect(&self, config: &SshConfig) -> Result<Box<dyn RemoteSession>, ConnectError> {
        let session = SshClient::new(config.clone()).connect().await?;
        Ok(Box::new(session))
    }
}

/// Client handler for russh callbacks
///
/// Decides whether to trust the server's host key:
/// - strict: the key must already be in known_hosts
/// - non-strict: any key is accepted (no pinning)
pub struct ClientHandler {
    host: String,
    port: u16,
    strict: bool,
    known_hosts_path: Option<std::path::PathBuf>,
}

impl ClientHandler {
    pub fn new(
        host: String,
        port: u16,
        strict: bool,
        known_hosts_path: Option<std::path::PathBuf>,
    ) -> Self {
        Self {
            host,
            port,
            strict,
            known_hosts_path,
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = KnownHostsStore::fingerprint(server_public_key);

        if !self.strict {
            warn!(
                "Accepting host key for {}:{} without verification (fingerprint: {})",
                self.host, self.port, fingerprint
            );
            return Ok(true);
        }

        let path = self
            .known_hosts_path
            .clone()
            .unwrap_or_else(KnownHostsStore::default_path);
        let known_hosts = KnownHostsStore::load(&path)?;

        match known_hosts.verify(&self.host, self.port, server_public_key) {
            HostKeyVerification::Verified => {
                info!("Host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            HostKeyVerification::Unknown { fingerprint } => {
                warn!(
                    "Unknown host key for {}:{} (fingerprint: {}). Strict mode enabled, rejecting.",
                    self.host, self.port, fingerprint
                );
                Err(SshError::HostKeyRejected(format!(
                    "unknown host {}:{} (fingerprint {}); add it to known_hosts or disable strict mode",
                    self.host, self.port, fingerprint
                )))
            }
            HostKeyVerification::Changed {
                expected_fingerprint,
                actual_fingerprint,
            } => {
                warn!(
                    "HOST KEY CHANGED for {}:{}! Expected {}, got {}. POSSIBLE MITM ATTACK!",
                    self.host, self.port, expected_fingerprint, actual_fingerprint
                );
                Err(SshError::HostKeyRejected(format!(
                    "key for {}:{} has changed (expected {}, actual {})",
                    self.host, self.port, expected_fingerprint, actual_fingerprint
                )))
            }
        }
    }
}
