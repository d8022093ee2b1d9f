//! Credential Vault - encrypted local storage for the DHCP server login
//!
//! The record is three base64 lines (username, password, host), each
//! encrypted independently under the installation key. The record is only
//! ever replaced as a whole.
//!
//! All file access goes through one process-wide lock so a reader never
//! observes a half-written record.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use zeroize::Zeroizing;

use super::cipher::{decrypt_field, encrypt_field, CipherError};
use super::keystore::{KeyStore, KeyStoreError, SymmetricKey};
use super::storage::credentials_file;

/// Vault errors
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Key(#[from] KeyStoreError),

    #[error("Server configuration not found")]
    NotConfigured,

    #[error("Failed to decrypt stored credentials: {0}")]
    DecryptFailed(#[source] CipherError),

    #[error("Failed to encrypt credentials: {0}")]
    EncryptFailed(#[source] CipherError),

    #[error("Credential record is malformed")]
    InvalidFormat,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// What the vault currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultStatus {
    /// No key or no record yet
    Unconfigured,
    /// Key and record present and the record decrypts
    Configured,
    /// Files present but unreadable under the current key
    Corrupt,
}

/// Non-secret view of the stored server login
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerIdentity {
    pub username: String,
    pub host: String,
}

/// Full stored login, for deployment only
pub struct ServerCredentials {
    pub username: String,
    pub password: Zeroizing<String>,
    pub host: String,
}

impl std::fmt::Debug for ServerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("host", &self.host)
            .finish()
    }
}

struct EncryptedRecord {
    username: String,
    password: String,
    host: String,
}

impl EncryptedRecord {
    fn parse(contents: &str) -> Result<Self, VaultError> {
        let lines: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        match lines.as_slice() {
            [username, password, host] => Ok(Self {
                username: username.to_string(),
                password: password.to_string(),
                host: host.to_string(),
            }),
            _ => Err(VaultError::InvalidFormat),
        }
    }

    fn serialize(&self) -> String {
        format!("{}\n{}\n{}", self.username, self.password, self.host)
    }
}

pub struct CredentialVault {
    keys: KeyStore,
    record_path: PathBuf,
    lock: Mutex<()>,
}

impl CredentialVault {
    /// Vault rooted at `data_dir`
    pub fn new(data_dir: &Path) -> Self {
        let vault = Self {
            keys: KeyStore::new(data_dir),
            record_path: credentials_file(data_dir),
            lock: Mutex::new(()),
        };

        tracing::debug!("CredentialVault initialized: path={:?}", vault.record_path);
        vault
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Encrypt and persist the server login, replacing any previous one
    pub fn save(&self, username: &str, password: &str, host: &str) -> Result<(), VaultError> {
        let _guard = self.lock.lock();

        let key = self.keys.get_or_create_key()?;
        let record = EncryptedRecord {
            username: encrypt_field(username, &*key).map_err(VaultError::EncryptFailed)?,
            password: encrypt_field(password, &*key).map_err(VaultError::EncryptFailed)?,
            host: encrypt_field(host, &*key).map_err(VaultError::EncryptFailed)?,
        };

        self.write_record(&record.serialize())?;

        tracing::info!("Server credentials saved for host (length: {})", host.len());
        Ok(())
    }

    /// Load the non-secret fields
    ///
    /// Anything short of a readable record (missing files, wrong key,
    /// corrupted data) is reported as `None` so the caller can ask for the
    /// login again.
    pub fn load(&self) -> Option<ServerIdentity> {
        let _guard = self.lock.lock();

        match self.read_record() {
            Ok(Some((record, key))) => {
                let decrypted = decrypt_field(&record.username, &*key).and_then(|username| {
                    decrypt_field(&record.host, &*key).map(|host| ServerIdentity {
                        username: username.to_string(),
                        host: host.to_string(),
                    })
                });
                match decrypted {
                    Ok(identity) => Some(identity),
                    Err(e) => {
                        tracing::warn!("Stored credentials unreadable: {}", e);
                        None
                    }
                }
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Stored credentials unreadable: {}", e);
                None
            }
        }
    }

    /// Load every field, including the password
    pub fn load_for_deployment(&self) -> Result<ServerCredentials, VaultError> {
        let _guard = self.lock.lock();

        let (record, key) = self.read_record()?.ok_or(VaultError::NotConfigured)?;

        let username = decrypt_field(&record.username, &*key).map_err(VaultError::DecryptFailed)?;
        let password = decrypt_field(&record.password, &*key).map_err(VaultError::DecryptFailed)?;
        let host = decrypt_field(&record.host, &*key).map_err(VaultError::DecryptFailed)?;

        Ok(ServerCredentials {
            username: username.to_string(),
            password,
            host: host.to_string(),
        })
    }

    /// Current state, decided from one locked read of both files
    pub fn status(&self) -> VaultStatus {
        let _guard = self.lock.lock();

        match self.read_record() {
            Ok(None) => VaultStatus::Unconfigured,
            Ok(Some((record, key))) => {
                let readable = [&record.username, &record.password, &record.host]
                    .iter()
                    .all(|field| decrypt_field(field, &*key).is_ok());
                if readable {
                    VaultStatus::Configured
                } else {
                    VaultStatus::Corrupt
                }
            }
            Err(_) => VaultStatus::Corrupt,
        }
    }

    /// Remove the stored record; no-op if absent. The key is kept.
    pub fn delete(&self) -> Result<(), VaultError> {
        let _guard = self.lock.lock();

        match fs::remove_file(&self.record_path) {
            Ok(()) => {
                tracing::info!("Credential record deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Credential record did not exist");
                Ok(())
            }
            Err(e) => Err(VaultError::Io(e)),
        }
    }

    /// Record plus key, or `None` when either file is missing
    fn read_record(
        &self,
    ) -> Result<Option<(EncryptedRecord, SymmetricKey)>, VaultError> {
        let contents = match fs::read_to_string(&self.record_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(VaultError::Io(e)),
        };

        let Some(key) = self.keys.load()? else {
            return Ok(None);
        };

        Ok(Some((EncryptedRecord::parse(&contents)?, key)))
    }

    fn write_record(&self, contents: &str) -> Result<(), VaultError> {
        if let Some(parent) = self.record_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.record_path.with_extension("tmp");
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&temp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.record_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::storage::key_file;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let vault = CredentialVault::new(temp_dir.path());

        vault.save("admin1", "s3cr3t pass", "192.168.101.86").unwrap();

        let identity = vault.load().unwrap();
        assert_eq!(
            identity,
            ServerIdentity {
                username: "admin1".to_string(),
                host: "192.168.101.86".to_string(),
            }
        );

        let creds = vault.load_for_deployment().unwrap();
        assert_eq!(creds.username, "admin1");
        assert_eq!(creds.password.as_str(), "s3cr3t pass");
        assert_eq!(creds.host, "192.168.101.86");
        assert_eq!(vault.status(), VaultStatus::Configured);
    }

    #[test]
    fn test_record_layout() {
        let temp_dir = TempDir::new().unwrap();
        let vault = CredentialVault::new(temp_dir.path());
        vault.save("u", "p", "h").unwrap();

        let contents = fs::read_to_string(vault.record_path()).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(!temp_dir.path().join("credentials.tmp").exists());
    }

    #[test]
    fn test_repeated_save_uses_fresh_ivs() {
        let temp_dir = TempDir::new().unwrap();
        let vault = CredentialVault::new(temp_dir.path());

        vault.save("admin", "admin", "10.0.0.1").unwrap();
        let first = fs::read(vault.record_path()).unwrap();
        vault.save("admin", "admin", "10.0.0.1").unwrap();
        let second = fs::read(vault.record_path()).unwrap();

        assert_ne!(first, second);

        // Identical plaintext in two fields still encrypts differently
        let contents = String::from_utf8(second).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_ne!(lines[0], lines[1]);
    }

    #[test]
    fn test_fresh_install_is_unconfigured() {
        let temp_dir = TempDir::new().unwrap();
        let vault = CredentialVault::new(temp_dir.path());

        assert!(vault.load().is_none());
        assert_eq!(vault.status(), VaultStatus::Unconfigured);
        assert!(matches!(
            vault.load_for_deployment(),
            Err(VaultError::NotConfigured)
        ));
        // Reading never creates the key
        assert!(!key_file(temp_dir.path()).exists());
    }

    #[test]
    fn test_replaced_key_degrades_load_but_fails_deployment() {
        let temp_dir = TempDir::new().unwrap();
        let vault = CredentialVault::new(temp_dir.path());
        vault.save("admin", "secret-password-long", "host.example").unwrap();

        fs::write(key_file(temp_dir.path()), [0x99u8; 32]).unwrap();

        assert!(vault.load().is_none());
        assert_eq!(vault.status(), VaultStatus::Corrupt);
        assert!(vault.load_for_deployment().is_err());
    }

    #[test]
    fn test_garbled_record() {
        let temp_dir = TempDir::new().unwrap();
        let vault = CredentialVault::new(temp_dir.path());
        vault.save("admin", "pw", "host").unwrap();

        fs::write(vault.record_path(), "only-one-line").unwrap();

        assert!(vault.load().is_none());
        assert!(matches!(
            vault.load_for_deployment(),
            Err(VaultError::InvalidFormat)
        ));

        fs::write(vault.record_path(), "!!!\n@@@\n###").unwrap();
        assert!(matches!(
            vault.load_for_deployment(),
            Err(VaultError::DecryptFailed(_))
        ));
    }

    #[test]
    fn test_truncated_key_surfaces_on_save() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(key_file(temp_dir.path()), [1u8; 8]).unwrap();
        let vault = CredentialVault::new(temp_dir.path());

        assert!(matches!(
            vault.save("a", "b", "c"),
            Err(VaultError::Key(KeyStoreError::Corrupt { len: 8 }))
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let vault = CredentialVault::new(temp_dir.path());

        vault.delete().unwrap();
        vault.save("a", "b", "c").unwrap();
        vault.delete().unwrap();
        assert!(vault.load().is_none());
        vault.delete().unwrap();
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    /// Printable text with no line breaks, padded with stray whitespace
    const FIELD: &str = "[ \t]{0,3}\\PC{0,40}[ \t]{0,3}";

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn roundtrip_any_printable_fields(
            username in FIELD,
            password in FIELD,
            host in FIELD,
        ) {
            let temp_dir = TempDir::new().unwrap();
            let vault = CredentialVault::new(temp_dir.path());
            vault.save(&username, &password, &host).unwrap();

            let identity = vault.load();
            prop_assert_eq!(
                identity,
                Some(ServerIdentity {
                    username: username.clone(),
                    host: host.clone(),
                })
            );

            let creds = vault.load_for_deployment().unwrap();
            prop_assert_eq!(&creds.username, &username);
            prop_assert_eq!(creds.password.as_str(), password.as_str());
            prop_assert_eq!(&creds.host, &host);
        }
    }
}
