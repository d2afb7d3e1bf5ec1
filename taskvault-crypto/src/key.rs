//! Key material types, Argon2id derivation, and best-effort memory wiping.
//!
//! All three key roles — DEK, master key, recovery key — are 32-byte values
//! behind zeroize-on-drop newtypes. Length validation happens at
//! construction, so every function that accepts a typed key can rely on the
//! size invariant instead of re-checking it.

use argon2::{Algorithm, Argon2, Params as Argon2Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Size (bytes) of every symmetric key in the system.
pub const KEY_SIZE: usize = 32;
/// Size (bytes) of Argon2id salts.
pub const SALT_SIZE: usize = 16;

/// A 16-byte KDF salt. Not secret, but length-validated like everything else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generates a fresh random salt.
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: &[u8; SALT_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidSaltLength {
                    expected: SALT_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(*bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

macro_rules! key_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; KEY_SIZE]);

        impl $name {
            pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self(bytes)
            }

            /// Validates the slice is exactly [`KEY_SIZE`] bytes.
            pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
                let bytes: &[u8; KEY_SIZE] =
                    bytes
                        .try_into()
                        .map_err(|_| CryptoError::InvalidKeyLength {
                            expected: KEY_SIZE,
                            actual: bytes.len(),
                        })?;
                Ok(Self(*bytes))
            }

            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

key_newtype! {
    /// Data encryption key: directly encrypts the vault payload.
    ///
    /// Ephemeral — lives only for the duration of a single encrypt/decrypt
    /// or wrap/unwrap call and is zeroized on drop.
    Dek
}

key_newtype! {
    /// Key that wraps/unwraps DEKs; either random or password-derived.
    /// Never persisted.
    MasterKey
}

key_newtype! {
    /// Alternate wrap key derived from a recovery code. Never persisted.
    RecoveryKey
}

/// Argon2id tuning parameters.
///
/// The defaults target interactive logins (~100 ms–1 s depending on
/// hardware). Derivation is the only expensive call in this crate; callers
/// on async runtimes must dispatch it to a blocking pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Cheap profile for unit tests. Never use in production.
    pub fn for_tests() -> Self {
        Self {
            memory_kib: 8 * 1024,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Generates a random 32-byte master key.
pub fn generate_master_key() -> MasterKey {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    let key = MasterKey::from_bytes(bytes);
    bytes.zeroize();
    key
}

/// Generates a fresh KDF salt.
pub fn generate_salt() -> Salt {
    Salt::random()
}

/// Derives a 32-byte master key from a password via Argon2id.
///
/// Deterministic for identical `(password, salt, params)` inputs.
pub fn derive_master_key(
    password: &str,
    salt: &Salt,
    params: &KdfParams,
) -> CryptoResult<MasterKey> {
    let mut out = derive_key_material(password.as_bytes(), salt, params)?;
    let key = MasterKey::from_bytes(out);
    out.zeroize();
    Ok(key)
}

/// Shared Argon2id derivation for the password and recovery paths.
pub(crate) fn derive_key_material(
    secret: &[u8],
    salt: &Salt,
    params: &KdfParams,
) -> CryptoResult<[u8; KEY_SIZE]> {
    let argon_params = Argon2Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::Internal(format!("invalid Argon2 parameters: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(secret, salt.as_bytes(), &mut out)
        .map_err(|e| CryptoError::Internal(format!("Argon2id derivation failed: {e}")))?;
    Ok(out)
}

/// Zeroes a caller-owned buffer. Never fails.
///
/// This is best-effort hygiene: without OS support there is no guarantee the
/// bytes were not previously copied elsewhere (swap, registers, moves). Use
/// the typed key wrappers where possible — they wipe on drop automatically.
pub fn wipe(buf: &mut [u8]) {
    buf.zeroize();
}

/// Overwrites a buffer with random bytes, then zeroes it.
///
/// The random pre-pass is defense against a compiler eliding a plain zero
/// store. If the RNG is unavailable the pass is skipped and logged; the
/// zeroing below still runs.
pub fn scrub(buf: &mut [u8]) {
    if let Err(err) = OsRng.try_fill_bytes(buf) {
        warn!("random scrub pass unavailable, zeroing only: {err}");
    }
    buf.zeroize();
}

/// Zeroes every buffer in the iterator.
pub fn wipe_all<'a, I>(bufs: I)
where
    I: IntoIterator<Item = &'a mut [u8]>,
{
    for buf in bufs {
        buf.zeroize();
    }
}
