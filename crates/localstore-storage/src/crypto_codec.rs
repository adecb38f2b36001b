use localstore_core::{Result, StoreError};
use rand::rngs::OsRng;
use rsa::Pkcs1v15Encrypt;
use tracing::{instrument, warn};

use crate::key_pair::{KeyError, KeyPairManager};

/// Seals a whole serialized payload as a single RSA (PKCS#1 v1.5) block.
///
/// Payloads are capped by the modulus size: `bits / 8 - 11` bytes.
/// Key or cipher failures repair the keypair and retry; the manager's
/// repair budget bounds the retries and surfaces `KeyExhausted`.
pub struct CryptoCodec {
    keys: KeyPairManager,
}

impl CryptoCodec {
    pub fn new(keys: KeyPairManager) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &KeyPairManager {
        &self.keys
    }

    #[instrument(skip_all, fields(len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        loop {
            self.keys.generate_if_absent()?;
            match self.try_encrypt(plaintext.as_bytes()) {
                Ok(ciphertext) => {
                    self.keys.reset_attempts();
                    return Ok(ciphertext);
                }
                Err(err) if err.is_repairable() => {
                    warn!(error = %err, "public key is invalid, regenerating key pair");
                    self.keys.repair()?;
                }
                Err(err) => return Err(into_store_error(err)),
            }
        }
    }

    #[instrument(skip_all, fields(len = ciphertext.len()))]
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<String> {
        let plaintext = loop {
            self.keys.generate_if_absent()?;
            match self.try_decrypt(ciphertext) {
                Ok(plaintext) => {
                    self.keys.reset_attempts();
                    break plaintext;
                }
                Err(err) if err.is_repairable() => {
                    warn!(error = %err, "private key is invalid, regenerating key pair");
                    self.keys.repair()?;
                }
                Err(err) => return Err(into_store_error(err)),
            }
        };

        String::from_utf8(plaintext)
            .map_err(|e| StoreError::crypto(format!("decrypted payload is not utf-8: {e}")))
    }

    fn try_encrypt(&self, plaintext: &[u8]) -> std::result::Result<Vec<u8>, KeyError> {
        let key = self.keys.public_key()?;
        key.encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext)
            .map_err(KeyError::Cipher)
    }

    fn try_decrypt(&self, ciphertext: &[u8]) -> std::result::Result<Vec<u8>, KeyError> {
        let key = self.keys.private_key()?;
        key.decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(KeyError::Cipher)
    }
}

fn into_store_error(err: KeyError) -> StoreError {
    match err {
        KeyError::Store(inner) => inner,
        other => StoreError::crypto(other),
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use super::*;
    use crate::key_pair::{MAX_REPAIR_ATTEMPTS, TEST_KEY_BITS};

    fn codec(dir: &Path) -> CryptoCodec {
        CryptoCodec::new(KeyPairManager::new(dir, "secure.ls", TEST_KEY_BITS))
    }

    #[test]
    fn round_trip_generates_keys_on_demand() {
        let dir = tempfile::tempdir().expect("tempdir");
        let codec = codec(dir.path());
        let payload = "a=1\nb=two words\n";

        let ciphertext = codec.encrypt(payload).expect("encrypt");
        assert!(codec.keys().key_pair_exists());
        assert_ne!(ciphertext, payload.as_bytes());
        assert_eq!(codec.decrypt(&ciphertext).expect("decrypt"), payload);
    }

    #[test]
    fn fresh_codec_reads_persisted_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ciphertext = codec(dir.path()).encrypt("k=v\n").expect("encrypt");

        let reader = codec(dir.path());
        assert_eq!(reader.decrypt(&ciphertext).expect("decrypt"), "k=v\n");
        assert_eq!(reader.keys().generations(), 0);
    }

    #[test]
    fn corrupted_public_key_is_repaired_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        codec(dir.path()).keys().generate_if_absent().expect("generate");
        let public_path = dir.path().join("secure.ls.rsa.pub");
        fs::write(&public_path, b"not a key").expect("corrupt");

        let codec = codec(dir.path());
        let ciphertext = codec.encrypt("k=v\n").expect("encrypt after repair");
        assert_eq!(codec.keys().generations(), 1);
        assert_eq!(codec.keys().attempts_left(), MAX_REPAIR_ATTEMPTS);
        assert_eq!(codec.decrypt(&ciphertext).expect("decrypt"), "k=v\n");
    }

    #[test]
    fn corrupted_private_key_exhausts_budget_after_one_regeneration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ciphertext = codec(dir.path()).encrypt("k=v\n").expect("encrypt");
        let private_path = dir.path().join("secure.ls.rsa");
        fs::write(&private_path, b"garbage").expect("corrupt");

        let codec = codec(dir.path());
        let err = codec.decrypt(&ciphertext).expect_err("old payload is lost");
        assert!(matches!(err, StoreError::KeyExhausted));
        assert_eq!(codec.keys().generations(), 1);
        assert_eq!(codec.keys().attempts_left(), MAX_REPAIR_ATTEMPTS);

        // the regenerated pair is usable for new data
        let fresh = codec.encrypt("k=v2\n").expect("encrypt");
        assert_eq!(codec.decrypt(&fresh).expect("decrypt"), "k=v2\n");
    }

    #[test]
    fn oversized_payload_surfaces_key_exhausted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let codec = codec(dir.path());
        let max = TEST_KEY_BITS / 8 - 11;

        codec.encrypt(&"x".repeat(max)).expect("largest block fits");
        let err = codec
            .encrypt(&"x".repeat(max + 1))
            .expect_err("one byte too many");
        assert!(matches!(err, StoreError::KeyExhausted));
    }

    #[test]
    fn missing_key_files_are_regenerated_before_encrypting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let codec = codec(dir.path());
        codec.encrypt("a=b\n").expect("encrypt");
        codec.keys().delete().expect("delete");

        let ciphertext = codec.encrypt("a=c\n").expect("encrypt");
        assert_eq!(codec.keys().generations(), 2);
        assert_eq!(codec.decrypt(&ciphertext).expect("decrypt"), "a=c\n");
    }
}
