//! Known hosts lookup for strict host key checking
//!
//! Read-only view of an OpenSSH `known_hosts` file. Nothing is ever written
//! back: in strict mode an unknown host is rejected, not learned.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use russh::keys::{PublicKey, PublicKeyBase64};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::error::SshError;

/// Result of host key verification
#[derive(Debug, Clone, PartialEq)]
pub enum HostKeyVerification {
    /// Key matches a known_hosts entry
    Verified,
    /// No entry for this host and key type
    Unknown { fingerprint: String },
    /// Entry exists with a different key (potential MITM)
    Changed {
        expected_fingerprint: String,
        actual_fingerprint: String,
    },
}

/// Entry in known_hosts: (key_type, base64_key)
#[derive(Clone, Debug)]
struct HostKeyEntry {
    key_type: String,
    key_data: String,
}

pub struct KnownHostsStore {
    /// host lookup key -> keys (one per key type)
    hosts: HashMap<String, Vec<HostKeyEntry>>,
}

impl KnownHostsStore {
    /// Default location: ~/.ssh/known_hosts
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".ssh").join("known_hosts"))
            .unwrap_or_else(|| PathBuf::from("~/.ssh/known_hosts"))
    }

    /// Load from `path`; a missing file is an empty store
    pub fn load(path: &Path) -> Result<Self, SshError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let store = Self::parse(&contents);
                info!(
                    "Loaded {} known hosts from {:?}",
                    store.hosts.len(),
                    path
                );
                Ok(store)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Known hosts file {:?} not found", path);
                Ok(Self {
                    hosts: HashMap::new(),
                })
            }
            Err(e) => Err(SshError::IoError(e)),
        }
    }

    fn parse(contents: &str) -> Self {
        let mut hosts: HashMap<String, Vec<HostKeyEntry>> = HashMap::new();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // hostname[,alias] keytype base64key [comment]
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 || parts[0].starts_with('@') {
                continue;
            }

            let entry = HostKeyEntry {
                key_type: parts[1].to_string(),
                key_data: parts[2].to_string(),
            };

            for hostname in parts[0].split(',') {
                // Hashed hostnames (|1|...) are not supported
                if hostname.starts_with('|') {
                    continue;
                }
                hosts
                    .entry(hostname.to_lowercase())
                    .or_default()
                    .push(entry.clone());
            }
        }

        Self { hosts }
    }

    /// known_hosts spelling of host:port
    fn make_key(host: &str, port: u16) -> String {
        let host = host.to_lowercase();
        if port == 22 {
            host
        } else {
            format!("[{}]:{}", host, port)
        }
    }

    fn fingerprint_bytes(bytes: &[u8]) -> String {
        let hash = Sha256::digest(bytes);
        format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
    }

    /// SHA256 fingerprint of a public key, in OpenSSH notation
    pub fn fingerprint(key: &PublicKey) -> String {
        Self::fingerprint_bytes(&key.public_key_bytes())
    }

    /// Verify a server's public key
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> HostKeyVerification {
        let key_b64 = BASE64.encode(key.public_key_bytes());
        self.verify_encoded(host, port, key.algorithm().as_str(), &key_b64)
    }

    /// Verify a key given as known_hosts key type + base64 blob
    pub fn verify_encoded(
        &self,
        host: &str,
        port: u16,
        key_type: &str,
        key_b64: &str,
    ) -> HostKeyVerification {
        let lookup_key = Self::make_key(host, port);
        let fingerprint = BASE64
            .decode(key_b64)
            .map(|bytes| Self::fingerprint_bytes(&bytes))
            .unwrap_or_else(|_| "unknown".to_string());

        let Some(entries) = self.hosts.get(&lookup_key) else {
            debug!("Unknown host: {}", lookup_key);
            return HostKeyVerification::Unknown { fingerprint };
        };

        match entries.iter().find(|e| e.key_type == key_type) {
            Some(entry) if entry.key_data == key_b64 => {
                debug!("Host key verified for {} (type: {})", lookup_key, key_type);
                HostKeyVerification::Verified
            }
            Some(entry) => {
                let expected_fingerprint = BASE64
                    .decode(&entry.key_data)
                    .map(|bytes| Self::fingerprint_bytes(&bytes))
                    .unwrap_or_else(|_| "unknown".to_string());
                warn!(
                    "HOST KEY CHANGED for {} (type: {})! Expected {}, got {}",
                    lookup_key, key_type, expected_fingerprint, fingerprint
                );
                HostKeyVerification::Changed {
                    expected_fingerprint,
                    actual_fingerprint: fingerprint,
                }
            }
            None => {
                debug!(
                    "Host {} known but no {} key stored",
                    lookup_key, key_type
                );
                HostKeyVerification::Unknown { fingerprint }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const KEY_A: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";
    const KEY_B: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";

    fn store() -> KnownHostsStore {
        KnownHostsStore::parse(&format!(
            "# comment\n\
             dhcp.lan,192.168.101.86 ssh-ed25519 {KEY_A}\n\
             [gateway.lan]:2222 ssh-ed25519 {KEY_A} root@gateway\n\
             |1|hashed= ssh-ed25519 {KEY_B}\n"
        ))
    }

    #[test]
    fn test_make_key() {
        assert_eq!(KnownHostsStore::make_key("Dhcp.LAN", 22), "dhcp.lan");
        assert_eq!(
            KnownHostsStore::make_key("server.com", 2222),
            "[server.com]:2222"
        );
    }

    #[test]
    fn test_verified_by_alias_and_port() {
        let store = store();
        assert_eq!(
            store.verify_encoded("192.168.101.86", 22, "ssh-ed25519", KEY_A),
            HostKeyVerification::Verified
        );
        assert_eq!(
            store.verify_encoded("gateway.lan", 2222, "ssh-ed25519", KEY_A),
            HostKeyVerification::Verified
        );
        // Same host on the default port is a different entry
        assert!(matches!(
            store.verify_encoded("gateway.lan", 22, "ssh-ed25519", KEY_A),
            HostKeyVerification::Unknown { .. }
        ));
    }

    #[test]
    fn test_changed_key() {
        let result = store().verify_encoded("dhcp.lan", 22, "ssh-ed25519", KEY_B);
        match result {
            HostKeyVerification::Changed {
                expected_fingerprint,
                actual_fingerprint,
            } => {
                assert!(expected_fingerprint.starts_with("SHA256:"));
                assert_ne!(expected_fingerprint, actual_fingerprint);
            }
            other => panic!("expected Changed, got {:?}", other),
        }
    }

    #[test]
    fn test_other_key_type_is_unknown() {
        assert!(matches!(
            store().verify_encoded("dhcp.lan", 22, "ssh-rsa", KEY_B),
            HostKeyVerification::Unknown { .. }
        ));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = tempdir().unwrap();
        let store = KnownHostsStore::load(&temp.path().join("known_hosts")).unwrap();
        assert!(matches!(
            store.verify_encoded("dhcp.lan", 22, "ssh-ed25519", KEY_A),
            HostKeyVerification::Unknown { .. }
        ));
    }
}
