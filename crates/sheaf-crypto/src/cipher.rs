//! The opaque box cipher.
//!
//! Symmetric encryption and key management live outside Sheaf. The chunk
//! accessor hands stored boxes to a [`Cipher`] together with the per-chunk IV
//! recorded in the chunk pointer and never looks at the key material.

use rand::RngCore;

/// Size of the per-chunk initialization vector recorded in chunk pointers.
pub const IV_SIZE: usize = 16;

/// Symmetric cipher applied to stored boxes.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plain: &[u8], iv: &[u8; IV_SIZE]) -> Result<Vec<u8>, CipherError>;

    fn decrypt(&self, data: &[u8], iv: &[u8; IV_SIZE]) -> Result<Vec<u8>, CipherError>;
}

/// A fresh random IV.
pub fn random_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Errors reported by a [`Cipher`] implementation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
}
