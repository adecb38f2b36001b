use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
};

use localstore_core::{Result, StoreError};
use rand::rngs::OsRng;
use rsa::{
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    RsaPrivateKey, RsaPublicKey,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// RSA modulus size used unless the builder overrides it.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Repairs allowed before giving up. Reset by any successful crypto call.
pub const MAX_REPAIR_ATTEMPTS: u32 = 2;

const PRIVATE_KEY_EXTENSION: &str = "rsa";
const PUBLIC_KEY_EXTENSION: &str = "rsa.pub";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPairState {
    Absent,
    Generating,
    Present,
    Repairing,
}

#[derive(Debug, Error)]
pub enum KeyError {
    /// Key file exists but does not hold a decodable key.
    #[error("invalid key material in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
    /// The cipher rejected the input (block size or padding).
    #[error("cipher failure: {0}")]
    Cipher(rsa::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl KeyError {
    /// Whether regenerating the pair could plausibly fix this.
    pub fn is_repairable(&self) -> bool {
        matches!(self, KeyError::Invalid { .. } | KeyError::Cipher(_))
    }
}

struct Slots {
    state: KeyPairState,
    private: Option<RsaPrivateKey>,
    public: Option<RsaPublicKey>,
}

/// Owns the RSA keypair persisted beside a storage file as
/// `<filename>.rsa` (PKCS#8 DER) and `<filename>.rsa.pub` (SPKI DER).
///
/// A pair with either file missing counts as absent. Loaded keys are cached;
/// generation and repair replace the cache.
pub struct KeyPairManager {
    private_path: PathBuf,
    public_path: PathBuf,
    bits: usize,
    attempts_left: AtomicU32,
    generations: AtomicU64,
    slots: Mutex<Slots>,
}

impl KeyPairManager {
    pub fn new(dir: &Path, filename: &str, bits: usize) -> Self {
        let private_path = dir.join(format!("{filename}.{PRIVATE_KEY_EXTENSION}"));
        let public_path = dir.join(format!("{filename}.{PUBLIC_KEY_EXTENSION}"));
        let state = if private_path.is_file() && public_path.is_file() {
            KeyPairState::Present
        } else {
            KeyPairState::Absent
        };

        Self {
            private_path,
            public_path,
            bits,
            attempts_left: AtomicU32::new(MAX_REPAIR_ATTEMPTS),
            generations: AtomicU64::new(0),
            slots: Mutex::new(Slots {
                state,
                private: None,
                public: None,
            }),
        }
    }

    pub fn private_key_path(&self) -> &Path {
        &self.private_path
    }

    pub fn public_key_path(&self) -> &Path {
        &self.public_path
    }

    pub fn state(&self) -> Result<KeyPairState> {
        Ok(self.lock()?.state)
    }

    pub fn key_pair_exists(&self) -> bool {
        self.private_path.is_file() && self.public_path.is_file()
    }

    /// Generates a fresh pair unless both files are present.
    /// Returns whether a pair was generated.
    pub fn generate_if_absent(&self) -> Result<bool> {
        let mut slots = self.lock()?;
        if self.key_pair_exists() {
            slots.state = KeyPairState::Present;
            return Ok(false);
        }
        slots.state = KeyPairState::Generating;
        self.generate_locked(&mut slots)?;
        Ok(true)
    }

    /// Removes both key files; missing files are fine.
    pub fn delete(&self) -> Result<()> {
        let mut slots = self.lock()?;
        self.delete_locked(&mut slots)
    }

    /// Deletes and regenerates the pair, consuming one repair attempt.
    ///
    /// Once the budget is spent the counter resets and `KeyExhausted` is
    /// returned without touching the key files.
    pub fn repair(&self) -> Result<()> {
        let previous = match self.attempts_left.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |left| Some(left.saturating_sub(1)),
        ) {
            Ok(left) | Err(left) => left,
        };
        if previous.saturating_sub(1) == 0 {
            self.reset_attempts();
            warn!(
                key = %self.private_path.display(),
                "key repair budget exhausted"
            );
            return Err(StoreError::KeyExhausted);
        }

        let mut slots = self.lock()?;
        slots.state = KeyPairState::Repairing;
        info!(key = %self.private_path.display(), "regenerating key pair");
        remove_if_present(&self.public_path)?;
        remove_if_present(&self.private_path)?;
        self.generate_locked(&mut slots)
    }

    pub fn reset_attempts(&self) {
        self.attempts_left.store(MAX_REPAIR_ATTEMPTS, Ordering::SeqCst);
    }

    pub fn attempts_left(&self) -> u32 {
        self.attempts_left.load(Ordering::SeqCst)
    }

    /// Number of pairs this manager has generated.
    pub fn generations(&self) -> u64 {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn public_key(&self) -> std::result::Result<RsaPublicKey, KeyError> {
        let mut slots = self.lock()?;
        if let Some(key) = &slots.public {
            return Ok(key.clone());
        }
        let bytes = read_key_file(&self.public_path)?;
        let key = RsaPublicKey::from_public_key_der(&bytes).map_err(|e| KeyError::Invalid {
            path: self.public_path.clone(),
            reason: e.to_string(),
        })?;
        slots.public = Some(key.clone());
        Ok(key)
    }

    pub fn private_key(&self) -> std::result::Result<RsaPrivateKey, KeyError> {
        let mut slots = self.lock()?;
        if let Some(key) = &slots.private {
            return Ok(key.clone());
        }
        let bytes = read_key_file(&self.private_path)?;
        let key = RsaPrivateKey::from_pkcs8_der(&bytes).map_err(|e| KeyError::Invalid {
            path: self.private_path.clone(),
            reason: e.to_string(),
        })?;
        slots.private = Some(key.clone());
        Ok(key)
    }

    fn generate_locked(&self, slots: &mut Slots) -> Result<()> {
        let result = self.write_new_pair();
        match result {
            Ok((private, public)) => {
                slots.private = Some(private);
                slots.public = Some(public);
                slots.state = KeyPairState::Present;
                Ok(())
            }
            Err(err) => {
                slots.private = None;
                slots.public = None;
                slots.state = KeyPairState::Absent;
                Err(err)
            }
        }
    }

    fn write_new_pair(&self) -> Result<(RsaPrivateKey, RsaPublicKey)> {
        debug!(bits = self.bits, key = %self.private_path.display(), "generating key pair");
        if let Some(parent) = self.private_path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let private = RsaPrivateKey::new(&mut OsRng, self.bits).map_err(StoreError::crypto)?;
        let public = RsaPublicKey::from(&private);

        let private_der = private.to_pkcs8_der().map_err(StoreError::crypto)?;
        let public_der = public.to_public_key_der().map_err(StoreError::crypto)?;

        write_key_file(&self.private_path, private_der.as_bytes(), true)?;
        write_key_file(&self.public_path, public_der.as_bytes(), false)?;
        self.generations.fetch_add(1, Ordering::SeqCst);
        Ok((private, public))
    }

    fn delete_locked(&self, slots: &mut Slots) -> Result<()> {
        remove_if_present(&self.public_path)?;
        remove_if_present(&self.private_path)?;
        slots.private = None;
        slots.public = None;
        slots.state = KeyPairState::Absent;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slots>> {
        self.slots
            .lock()
            .map_err(|err| StoreError::crypto(format!("key slots lock poisoned: {err}")))
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| StoreError::io(path, e))
}

fn write_key_file(path: &Path, bytes: &[u8], private: bool) -> Result<()> {
    fs::write(path, bytes).map_err(|e| StoreError::io(path, e))?;

    #[cfg(unix)]
    {
        if private {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)
                .map_err(|e| StoreError::io(path, e))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).map_err(|e| StoreError::io(path, e))?;
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StoreError::io(path, err)),
    }
}

#[cfg(test)]
pub(crate) const TEST_KEY_BITS: usize = 1024;
