//! Password-based authenticated encryption for vault secrets.
//!
//! AES-256-GCM with a key derived per secret from the password and a random
//! 16-byte salt via PBKDF2-HMAC-SHA256. Each encryption uses a fresh 12-byte
//! nonce. The GCM tag is appended to the ciphertext.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

use crate::{Error, Result};

/// Salt length in bytes
pub const SALT_LENGTH: usize = 16;

/// Nonce length in bytes (96 bits for AES-GCM)
pub const NONCE_LENGTH: usize = 12;

/// Key length in bytes (256 bits for AES-256)
const KEY_LENGTH: usize = 32;

/// PBKDF2 iteration count
pub const PBKDF2_ITERATIONS: u32 = 4096;

/// Output of [`encrypt`]: everything needed to decrypt except the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Generate a random salt for a new secret.
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from a password and salt.
pub fn derive_key(password: &str, salt: &[u8]) -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Encrypt a plaintext under a derived key with a fresh random nonce.
pub fn encrypt(key: &[u8; KEY_LENGTH], plaintext: &[u8]) -> Result<Sealed> {
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Other(format!("failed to create cipher: {}", e)))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| Error::Other("encryption failed".to_string()))?;

    Ok(Sealed {
        ciphertext,
        nonce: nonce_bytes.to_vec(),
    })
}

/// Decrypt and authenticate.
///
/// Any failure (wrong key, wrong nonce length, tampered data) is reported as
/// [`Error::InvalidPassword`] without distinguishing the cause.
pub fn decrypt(key: &[u8; KEY_LENGTH], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LENGTH {
        return Err(Error::InvalidPassword);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::InvalidPassword)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::InvalidPassword)
}
