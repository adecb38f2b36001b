use std::path::PathBuf;

use localstore_core::{Result, StoreError};
use tracing::debug;

use crate::{
    crypto_codec::CryptoCodec,
    directory::{DirectoryResolver, DEFAULT_STORAGE_ID},
    file_store::{FileStore, StorageKind},
    key_pair::{KeyPairManager, DEFAULT_KEY_BITS},
};

/// Smallest RSA modulus the builder accepts.
pub const MIN_KEY_BITS: usize = 1024;

/// Configures and opens a [`FileStore`].
///
/// ```no_run
/// use localstore_core::store::Store;
/// use localstore_storage::{StorageKind, StoreBuilder};
///
/// # fn example() -> localstore_core::Result<()> {
/// let store = StoreBuilder::new("settings.ls", StorageKind::Encrypted)
///     .with_storage_id("com.example.app")
///     .with_save_on_write(true)
///     .build()?;
/// store.put("window.width", 1280)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StoreBuilder {
    filename: String,
    kind: StorageKind,
    save_on_write: bool,
    storage_id: String,
    directory_path: Option<PathBuf>,
    key_bits: usize,
}

impl StoreBuilder {
    pub fn new(filename: impl Into<String>, kind: StorageKind) -> Self {
        Self {
            filename: filename.into(),
            kind,
            save_on_write: false,
            storage_id: DEFAULT_STORAGE_ID.to_string(),
            directory_path: None,
            key_bits: DEFAULT_KEY_BITS,
        }
    }

    /// Persist synchronously on every mutation. Off by default.
    pub fn with_save_on_write(mut self, save_on_write: bool) -> Self {
        self.save_on_write = save_on_write;
        self
    }

    /// Namespace for directory resolution.
    pub fn with_storage_id(mut self, storage_id: impl Into<String>) -> Self {
        self.storage_id = storage_id.into();
        self
    }

    /// Root directory override; disables the per-user application data root.
    pub fn with_directory_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.directory_path = Some(path.into());
        self
    }

    /// RSA modulus size for newly generated keypairs (encrypted kind only).
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Validates the configuration, resolves (and creates) the storage
    /// directory and opens the store, loading any existing backing file.
    pub fn build(self) -> Result<FileStore> {
        self.validate()?;

        let resolver = DirectoryResolver::new(self.storage_id, self.directory_path);
        let dir = resolver.create_or_get()?;
        debug!(dir = %dir.display(), file = %self.filename, kind = ?self.kind, "opening store");

        let crypto = match self.kind {
            StorageKind::Plain => None,
            StorageKind::Encrypted => Some(CryptoCodec::new(KeyPairManager::new(
                &dir,
                &self.filename,
                self.key_bits,
            ))),
        };

        Ok(FileStore::open(
            self.filename,
            resolver,
            dir,
            self.save_on_write,
            crypto,
        ))
    }

    fn validate(&self) -> Result<()> {
        validate_name("filename", &self.filename)?;
        validate_name("storage id", &self.storage_id)?;
        if self.kind == StorageKind::Encrypted && self.key_bits < MIN_KEY_BITS {
            return Err(StoreError::InvalidConfig {
                reason: format!("key size must be at least {MIN_KEY_BITS} bits"),
            });
        }
        Ok(())
    }
}

fn validate_name(what: &str, value: &str) -> Result<()> {
    let invalid = |reason: &str| StoreError::InvalidConfig {
        reason: format!("{what} {reason}"),
    };
    if value.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(invalid("must be a single path component"));
    }
    Ok(())
}
