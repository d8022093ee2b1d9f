//! Symmetric key storage
//!
//! One 32-byte key per installation, created on first use and read back
//! unchanged afterwards. An existing key is never regenerated: doing so would
//! orphan every record encrypted under it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand::RngCore;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::storage::key_file;

/// Key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

pub type SymmetricKey = Zeroizing<[u8; KEY_LEN]>;

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("Key file is corrupt: expected {KEY_LEN} bytes, found {len}")]
    Corrupt { len: usize },

    #[error("Failed to write key file: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("Failed to read key file: {0}")]
    ReadFailed(#[source] io::Error),
}

pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    /// Key store for the key file inside `data_dir`
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: key_file(data_dir),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the key, or `None` if it has not been created yet
    pub fn load(&self) -> Result<Option<SymmetricKey>, KeyStoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KeyStoreError::ReadFailed(e)),
        };

        if bytes.len() != KEY_LEN {
            tracing::error!("Key file {:?} has {} bytes", self.path, bytes.len());
            return Err(KeyStoreError::Corrupt { len: bytes.len() });
        }

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&bytes);
        Ok(Some(key))
    }

    /// Return the existing key, creating it on first call
    pub fn get_or_create_key(&self) -> Result<SymmetricKey, KeyStoreError> {
        if let Some(key) = self.load()? {
            return Ok(key);
        }

        match self.create() {
            Ok(key) => Ok(key),
            // Lost a creation race with another caller; theirs wins.
            Err(KeyStoreError::WriteFailed(e)) if e.kind() == io::ErrorKind::AlreadyExists => self
                .load()?
                .ok_or(KeyStoreError::ReadFailed(io::Error::from(io::ErrorKind::NotFound))),
            Err(e) => Err(e),
        }
    }

    fn create(&self) -> Result<SymmetricKey, KeyStoreError> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        rand::rngs::OsRng.fill_bytes(&mut *key);

        self.publish(&*key, |file, bytes| file.write_all(bytes))?;

        tracing::info!("Generated new symmetric key at {:?}", self.path);
        Ok(key)
    }

    /// Write `key` to a private temp sibling, then link it into place
    ///
    /// The key file only ever appears complete. Linking fails with
    /// `AlreadyExists` if another caller published first. The temp file is
    /// removed whether or not publishing succeeded.
    fn publish<F>(&self, key: &[u8], write: F) -> Result<(), KeyStoreError>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(KeyStoreError::WriteFailed)?;
        }

        let mut temp_name = self.path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        let temp_path = self.path.with_file_name(temp_name);

        let result = write_temp(&temp_path, key, write)
            .and_then(|()| fs::hard_link(&temp_path, &self.path));

        if let Err(e) = fs::remove_file(&temp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove temp key file {:?}: {}", temp_path, e);
            }
        }

        result.map_err(KeyStoreError::WriteFailed)
    }
}

fn write_temp<F>(path: &Path, key: &[u8], write: F) -> io::Result<()>
where
    F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
{
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    write(&mut file, key)?;
    file.sync_all()
}
