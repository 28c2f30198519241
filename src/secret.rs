//! Symmetric encryption for secrets kept in the config file (repository
//! token, shared secrets of secondary sites, the receiver secret).
//!
//! Stored form is `base64(nonce || ciphertext)` using AES-256-GCM. Decryption
//! never fails loudly: anything that does not decrypt is treated as "not
//! configured" and comes back as an empty string.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;

use crate::error::Result;

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct SecretBox {
    key: [u8; 32],
}

impl SecretBox {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive the key from a passphrase with SHA-256.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        Self::new(digest.into())
    }

    /// Read the hex-encoded key at `path`, generating and storing a fresh
    /// one if the file does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let bytes = hex::decode(text.trim())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                let key: [u8; 32] = bytes.try_into().map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "secret key must be 32 bytes")
                })?;
                Ok(Self::new(key))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let key: [u8; 32] = Aes256Gcm::generate_key(OsRng).into();
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, hex::encode(key))?;
                restrict_permissions(path)?;
                tracing::info!("generated secret key at {}", path.display());
                Ok(Self::new(key))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }

    /// Encrypt `value`. The empty string stays empty.
    pub fn encrypt(&self, value: &str) -> String {
        if value.is_empty() {
            return String::new();
        }
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        match self.cipher().encrypt(&nonce, value.as_bytes()) {
            Ok(ct) => {
                let mut blob = nonce.to_vec();
                blob.extend_from_slice(&ct);
                STANDARD.encode(blob)
            }
            Err(_) => String::new(),
        }
    }

    /// Decrypt a stored blob, or return `""` if it is empty, malformed, or
    /// was sealed with another key.
    pub fn decrypt(&self, blob: &str) -> String {
        let blob = blob.trim();
        if blob.is_empty() {
            return String::new();
        }
        let Ok(raw) = STANDARD.decode(blob) else {
            return String::new();
        };
        if raw.len() <= NONCE_LEN {
            return String::new();
        }
        let (nonce, ct) = raw.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ct)
            .ok()
            .and_then(|plain| String::from_utf8(plain).ok())
            .unwrap_or_default()
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
