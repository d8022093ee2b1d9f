//! Configuration Management Module
//!
//! Handles the application data directory, deployment settings, and the
//! encrypted credential vault for the DHCP server login.

pub mod cipher;
pub mod keystore;
pub mod settings;
pub mod storage;
pub mod vault;

pub use cipher::CipherError;
pub use keystore::{KeyStore, KeyStoreError, SymmetricKey, KEY_LEN};
pub use settings::{DeploySettings, DhcpTargets, SETTINGS_VERSION};
pub use storage::{data_dir, SettingsStorage, StorageError};
pub use vault::{CredentialVault, ServerCredentials, ServerIdentity, VaultError, VaultStatus};
