//! DEK generation, wrapping, unwrapping, and single-key rotation.
//!
//! A wrapped DEK is the persisted artifact: the DEK encrypted under a master
//! or recovery key, with its nonce, detached tag, and metadata, all base64 on
//! the wire. The DEK itself never leaves a call's scope unencrypted.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::cipher::{self, ALGORITHM, NONCE_SIZE, TAG_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{Dek, KEY_SIZE, MasterKey};

/// Key version assigned when the caller does not specify one.
pub const DEFAULT_KEY_VERSION: u32 = 1;

/// Which secret a wrapped DEK was sealed under.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPurpose {
    #[default]
    Password,
    Recovery,
}

/// KDF parameters recorded alongside a password-wrapped DEK so the master
/// key can be re-derived at unwrap time. The salt is base64.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfInfo {
    pub algorithm: String,
    pub salt: String,
    pub iterations: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DekMetadata {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub algorithm: String,
    #[serde(default)]
    pub purpose: KeyPurpose,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kdf: Option<KdfInfo>,
}

/// A DEK encrypted under a master or recovery key. Persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedDek {
    #[serde(rename = "encryptedDEK")]
    pub encrypted_dek: String,
    pub nonce: String,
    pub tag: String,
    pub metadata: DekMetadata,
}

/// Options for [`wrap_dek`].
#[derive(Clone, Debug, Default)]
pub struct WrapOptions {
    /// Key version recorded in metadata. Defaults to [`DEFAULT_KEY_VERSION`].
    pub version: Option<u32>,
    /// Additional authenticated data binding the wrap to caller context.
    /// Unwrap must supply the identical bytes.
    pub aad: Option<Vec<u8>>,
    /// Caller-supplied nonce. Must be exactly 24 bytes. Leave `None` to get
    /// a fresh random nonce, which is what every production path should do.
    pub nonce: Option<Vec<u8>>,
    pub purpose: KeyPurpose,
    /// KDF provenance for password-derived master keys.
    pub kdf: Option<KdfInfo>,
}

/// Generates a fresh random DEK with its metadata.
///
/// The only failure mode is an unavailable OS RNG, which aborts the process.
pub fn generate_dek(version: Option<u32>) -> (Dek, DekMetadata) {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    let dek = Dek::from_bytes(bytes);
    bytes.zeroize();

    let metadata = DekMetadata {
        version: version.unwrap_or(DEFAULT_KEY_VERSION),
        created_at: Utc::now(),
        algorithm: ALGORITHM.to_string(),
        purpose: KeyPurpose::Password,
        kdf: None,
    };
    (dek, metadata)
}

/// Wraps (encrypts) a DEK under a master key.
///
/// Key sizes are enforced by the `Dek`/`MasterKey` types. A supplied nonce
/// is length-validated; otherwise a fresh random 24-byte nonce is drawn.
pub fn wrap_dek(dek: &Dek, master_key: &MasterKey, opts: &WrapOptions) -> CryptoResult<WrappedDek> {
    wrap_with_key(dek, master_key.as_bytes(), opts)
}

/// Unwraps a DEK previously produced by [`wrap_dek`].
///
/// `aad` must match the bytes supplied at wrap time (or be absent on both
/// sides). Tag verification failure yields [`CryptoError::Authentication`]
/// without revealing whether the key, AAD, or ciphertext was at fault.
pub fn unwrap_dek(
    wrapped: &WrappedDek,
    master_key: &MasterKey,
    aad: Option<&[u8]>,
) -> CryptoResult<(Dek, DekMetadata)> {
    unwrap_with_key(wrapped, master_key.as_bytes(), aad)
}

/// Unwraps with the old master key and rewraps with the new one.
///
/// The intermediate DEK is zeroized on every exit path — it lives in a
/// zeroize-on-drop wrapper, so early returns and errors are covered.
/// Metadata is carried over except for the version (bumped to `new_version`
/// when given) and the KDF record, which described the old master key and is
/// dropped.
pub fn rotate_dek(
    wrapped: &WrappedDek,
    old_master_key: &MasterKey,
    new_master_key: &MasterKey,
    new_version: Option<u32>,
) -> CryptoResult<WrappedDek> {
    let (dek, metadata) = unwrap_dek(wrapped, old_master_key, None)?;

    let opts = WrapOptions {
        version: Some(new_version.unwrap_or(metadata.version)),
        purpose: metadata.purpose,
        ..WrapOptions::default()
    };
    wrap_dek(&dek, new_master_key, &opts)
}

/// Shared wrap path for master and recovery keys.
pub(crate) fn wrap_with_key(
    dek: &Dek,
    key: &[u8; KEY_SIZE],
    opts: &WrapOptions,
) -> CryptoResult<WrappedDek> {
    let nonce: [u8; NONCE_SIZE] = match &opts.nonce {
        Some(supplied) => {
            supplied
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidNonceLength {
                    expected: NONCE_SIZE,
                    actual: supplied.len(),
                })?
        }
        None => cipher::generate_nonce(),
    };

    let aad = opts.aad.as_deref().unwrap_or(&[]);
    let (ciphertext, tag) = cipher::seal(key, &nonce, aad, dek.as_bytes())?;

    Ok(WrappedDek {
        encrypted_dek: BASE64.encode(&ciphertext),
        nonce: BASE64.encode(nonce),
        tag: BASE64.encode(tag),
        metadata: DekMetadata {
            version: opts.version.unwrap_or(DEFAULT_KEY_VERSION),
            created_at: Utc::now(),
            algorithm: ALGORITHM.to_string(),
            purpose: opts.purpose,
            kdf: opts.kdf.clone(),
        },
    })
}

/// Shared unwrap path for master and recovery keys.
pub(crate) fn unwrap_with_key(
    wrapped: &WrappedDek,
    key: &[u8; KEY_SIZE],
    aad: Option<&[u8]>,
) -> CryptoResult<(Dek, DekMetadata)> {
    if wrapped.metadata.algorithm != ALGORITHM {
        return Err(CryptoError::UnsupportedAlgorithm(
            wrapped.metadata.algorithm.clone(),
        ));
    }

    let ciphertext = BASE64
        .decode(&wrapped.encrypted_dek)
        .map_err(|_| CryptoError::InvalidEncoding {
            field: "encryptedDEK",
        })?;
    let nonce_bytes = BASE64
        .decode(&wrapped.nonce)
        .map_err(|_| CryptoError::InvalidEncoding { field: "nonce" })?;
    let tag_bytes = BASE64
        .decode(&wrapped.tag)
        .map_err(|_| CryptoError::InvalidEncoding { field: "tag" })?;

    let nonce: [u8; NONCE_SIZE] =
        nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: nonce_bytes.len(),
            })?;
    let tag: [u8; TAG_SIZE] =
        tag_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidTagLength {
                expected: TAG_SIZE,
                actual: tag_bytes.len(),
            })?;

    let mut plaintext = cipher::open(key, &nonce, aad.unwrap_or(&[]), &ciphertext, &tag)?;

    if plaintext.len() != KEY_SIZE {
        let actual = plaintext.len();
        plaintext.zeroize();
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual,
        });
    }

    let dek = Dek::from_slice(&plaintext)?;
    plaintext.zeroize();

    Ok((dek, wrapped.metadata.clone()))
}
