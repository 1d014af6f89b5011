//! Sealed key files: `salt || nonce || ciphertext || tag`, AES-256-GCM-SIV
//! under an argon2id passphrase-derived key.

use std::fs;
use std::path::PathBuf;

use aes_gcm_siv::aead::AeadMutInPlace;
use aes_gcm_siv::{Aes256GcmSiv, KeyInit, Nonce, Tag};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::EotsManagerError;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const SEED_LEN: usize = 32;
const TAG_LEN: usize = 16;
const SEALED_LEN: usize = SALT_LEN + NONCE_LEN + SEED_LEN + TAG_LEN;

/// Directory of sealed seed files, one per named key.
pub struct Keystore {
    dir: PathBuf,
}

impl Keystore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, EotsManagerError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn seed_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.seed"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.seed_path(name).exists()
    }

    /// Seals a fresh seed under the passphrase. Refuses to overwrite.
    pub fn seal(
        &self,
        name: &str,
        passphrase: &str,
        seed: &[u8; SEED_LEN],
    ) -> Result<(), EotsManagerError> {
        let path = self.seed_path(name);
        if path.exists() {
            return Err(EotsManagerError::KeyNameExists(name.to_string()));
        }

        let mut buf = [0u8; SEALED_LEN];
        OsRng.fill_bytes(&mut buf[..SALT_LEN + NONCE_LEN]);

        let salt: [u8; SALT_LEN] = buf[..SALT_LEN].try_into().expect("fixed split");
        let sek = derive_encryption_key(passphrase, &salt)?;

        let (salt_and_nonce, rest) = buf.split_at_mut(SALT_LEN + NONCE_LEN);
        let (plaintext, _) = rest.split_at_mut(SEED_LEN);
        plaintext.copy_from_slice(seed);

        let mut cipher = Aes256GcmSiv::new_from_slice(&*sek).expect("32-byte key");
        let nonce = Nonce::from_slice(&salt_and_nonce[SALT_LEN..]);
        let tag = cipher
            .encrypt_in_place_detached(nonce, &[], plaintext)
            .expect("seed fits in one aead block");
        buf[SEALED_LEN - TAG_LEN..].copy_from_slice(tag.as_slice());

        fs::write(&path, buf)?;
        Ok(())
    }

    /// Opens a sealed seed. A failed tag check is reported as a bad
    /// passphrase; a truncated file as a missing key.
    pub fn open(
        &self,
        name: &str,
        passphrase: &str,
    ) -> Result<Zeroizing<[u8; SEED_LEN]>, EotsManagerError> {
        let path = self.seed_path(name);
        let bytes = fs::read(&path)
            .map_err(|_| EotsManagerError::KeyFileMissing(name.to_string()))?;
        if bytes.len() != SEALED_LEN {
            return Err(EotsManagerError::KeyFileMissing(name.to_string()));
        }

        let salt: [u8; SALT_LEN] = bytes[..SALT_LEN].try_into().expect("checked len");
        let sek = derive_encryption_key(passphrase, &salt)?;

        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        seed.copy_from_slice(&bytes[SALT_LEN + NONCE_LEN..SALT_LEN + NONCE_LEN + SEED_LEN]);

        let mut cipher = Aes256GcmSiv::new_from_slice(&*sek).expect("32-byte key");
        let nonce = Nonce::from_slice(&bytes[SALT_LEN..SALT_LEN + NONCE_LEN]);
        let tag = Tag::from_slice(&bytes[SEALED_LEN - TAG_LEN..]);
        cipher
            .decrypt_in_place_detached(nonce, &[], &mut *seed, tag)
            .map_err(|_| EotsManagerError::BadPassphrase)?;

        Ok(seed)
    }
}

fn derive_encryption_key(
    passphrase: &str,
    salt: &[u8; SALT_LEN],
) -> Result<Zeroizing<[u8; 32]>, EotsManagerError> {
    // OWASP-recommended argon2id parameters.
    let params = Params::new(19_456, 2, 1, Some(32)).map_err(EotsManagerError::Kdf)?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut sek = Zeroizing::new([0u8; 32]);
    argon
        .hash_password_into(passphrase.as_bytes(), salt, &mut *sek)
        .map_err(EotsManagerError::Kdf)?;
    Ok(sek)
}
