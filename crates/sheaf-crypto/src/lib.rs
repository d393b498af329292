//! Cryptographic seams for Sheaf.
//!
//! Provides the digest algorithms used for data and box hashes, the commit
//! signer/verifier service traits (with an Ed25519 implementation), and the
//! opaque [`Cipher`] trait that box encryption is delegated to.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod cipher;
pub mod hasher;
pub mod signer;

pub use cipher::{random_iv, Cipher, CipherError, IV_SIZE};
pub use hasher::{ContentHasher, HashAlgorithm};
pub use signer::{
    CommitSigner, CommitVerifier, Ed25519Verifier, Signature, SignatureError, SigningKey,
    VerifyingKey,
};
