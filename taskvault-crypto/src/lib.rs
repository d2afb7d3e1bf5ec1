//! Key management and payload encryption core for TaskVault.
//!
//! Provides the zero-knowledge vault primitives:
//! - Argon2id for key derivation from passwords and recovery codes
//! - XChaCha20-Poly1305 for authenticated encryption (24-byte random nonces)
//! - Secure key management with zeroization
//!
//! # Architecture
//!
//! The encryption uses a two-tier key system:
//!
//! 1. **Master Key**: Derived from the user's password using Argon2id (or
//!    generated randomly). It is never stored — it's derived each time the
//!    user unlocks.
//!
//! 2. **DEK (Data Encryption Key)**: A random key that encrypts the vault
//!    payload. The DEK is wrapped (encrypted) with the master key and stored
//!    alongside the encrypted data.
//!
//! This architecture allows:
//! - Changing the password without re-encrypting the payload
//! - A recovery code as an independent path to the same DEK
//! - Key-version rotation by rewrapping rather than re-encrypting
//!
//! The server persists only wrapped DEKs and encrypted payloads; it never
//! observes plaintext secrets or usable key material.

mod cipher;
mod dek;
mod error;
mod key;
pub mod payload;
pub mod recovery;

pub use cipher::{ALGORITHM, NONCE_SIZE, TAG_SIZE, generate_nonce};
pub use dek::{
    DEFAULT_KEY_VERSION, DekMetadata, KdfInfo, KeyPurpose, WrapOptions, WrappedDek, generate_dek,
    rotate_dek, unwrap_dek, wrap_dek,
};
pub use error::{CryptoError, CryptoResult, ErrorKind};
pub use key::{
    Dek, KEY_SIZE, KdfParams, MasterKey, RecoveryKey, SALT_SIZE, Salt, derive_master_key,
    generate_master_key, generate_salt, scrub, wipe, wipe_all,
};
