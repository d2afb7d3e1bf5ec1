//! Vault payload codec: serialize → compress → encrypt, and the reverse.
//!
//! The payload is the vault's entire logical content (entries, boards,
//! metadata). It is structurally validated both before encryption and after
//! decryption, so a tampered-but-authenticated blob from a buggy writer
//! cannot smuggle malformed data past the boundary.
//!
//! Compression is opportunistic: zstd is applied only when it shrinks the
//! serialized form by at least 10%, otherwise the plaintext is stored
//! uncompressed and the `compressed` flag records the decision. On decrypt,
//! decompression is bounded by `max_payload_size` before any bytes are
//! handed back, which closes off decompression-bomb amplification.

use std::io::Read;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::cipher::{self, ALGORITHM, NONCE_SIZE, TAG_SIZE};
use crate::dek::{KdfInfo, WrapOptions, WrappedDek, generate_dek, unwrap_dek, wrap_dek};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{Dek, KdfParams, Salt, derive_master_key};

/// Version of the encrypted payload envelope format.
pub const PAYLOAD_FORMAT_VERSION: u32 = 1;
/// Default cap on the decompressed payload (50 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 50 * 1024 * 1024;
/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryStatus {
    Todo,
    InProgress,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPriority {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub id: String,
    pub title: String,
    pub status: EntryStatus,
    pub priority: EntryPriority,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadCounts {
    pub entries: u64,
    pub boards: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMetadata {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    pub counts: PayloadCounts,
}

/// The vault's logical content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VaultPayload {
    pub entries: Vec<VaultEntry>,
    pub boards: Vec<Board>,
    pub metadata: PayloadMetadata,
}

impl VaultPayload {
    /// Parses from JSON bytes. Unknown enum values (e.g. an `"archived"`
    /// status) and missing required fields are validation failures.
    pub fn from_json_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| CryptoError::InvalidPayload(e.to_string()))
    }

    pub fn to_json_bytes(&self) -> CryptoResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CryptoError::Internal(e.to_string()))
    }

    /// Structural findings beyond what the type system enforces.
    /// Empty means the payload is valid.
    pub fn structural_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.metadata.version < 1 {
            issues.push(format!(
                "metadata.version must be >= 1, got {}",
                self.metadata.version
            ));
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.id.is_empty() {
                issues.push(format!("entries[{i}].id is empty"));
            }
            if entry.title.is_empty() {
                issues.push(format!("entries[{i}].title is empty"));
            }
        }
        for (i, board) in self.boards.iter().enumerate() {
            if board.id.is_empty() {
                issues.push(format!("boards[{i}].id is empty"));
            }
            if board.name.is_empty() {
                issues.push(format!("boards[{i}].name is empty"));
            }
        }
        if self.metadata.counts.entries != self.entries.len() as u64 {
            issues.push(format!(
                "metadata.counts.entries is {}, actual {}",
                self.metadata.counts.entries,
                self.entries.len()
            ));
        }
        if self.metadata.counts.boards != self.boards.len() as u64 {
            issues.push(format!(
                "metadata.counts.boards is {}, actual {}",
                self.metadata.counts.boards,
                self.boards.len()
            ));
        }

        issues
    }

    pub fn validate(&self) -> CryptoResult<()> {
        let issues = self.structural_issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(CryptoError::InvalidPayload(issues.join("; ")))
        }
    }
}

/// The persisted encrypted payload envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedVaultPayload {
    pub encrypted_data: String,
    pub nonce: String,
    pub tag: String,
    pub compressed: bool,
    pub algorithm: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct EncryptOptions {
    pub compress: bool,
    pub compression_level: i32,
    pub aad: Option<Vec<u8>>,
    /// Store compressed even when the gain is below the 10% threshold.
    pub force_compression: bool,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            compress: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            aad: None,
            force_compression: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DecryptOptions {
    pub aad: Option<Vec<u8>>,
    /// Hard cap on the decompressed (or raw) plaintext size.
    pub max_payload_size: usize,
    /// When false, structural findings after decryption become warnings
    /// instead of errors.
    pub strict_validation: bool,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            aad: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            strict_validation: true,
        }
    }
}

/// Result of a successful decryption.
#[derive(Debug)]
pub struct DecryptedPayload {
    pub payload: VaultPayload,
    /// plaintext size / compressed size; `None` when stored uncompressed.
    pub compression_ratio: Option<f64>,
    /// Wall-clock time for decrypt + decompress + parse.
    pub decryption_time: Duration,
    pub warnings: Vec<String>,
}

/// Encrypts a validated payload under a DEK.
pub fn encrypt_payload(
    payload: &VaultPayload,
    dek: &Dek,
    opts: &EncryptOptions,
) -> CryptoResult<EncryptedVaultPayload> {
    payload.validate()?;

    let mut plain = payload.to_json_bytes()?;

    let (mut body, compressed) = if opts.compress {
        let candidate = zstd::bulk::compress(&plain, opts.compression_level)
            .map_err(|e| CryptoError::Internal(format!("zstd compression failed: {e}")))?;
        // Keep compression only for a >=10% size win, unless forced.
        if opts.force_compression || candidate.len() * 10 <= plain.len() * 9 {
            (candidate, true)
        } else {
            (plain.clone(), false)
        }
    } else {
        (plain.clone(), false)
    };

    let nonce = cipher::generate_nonce();
    let aad = opts.aad.as_deref().unwrap_or(&[]);
    let sealed = cipher::seal(dek.as_bytes(), &nonce, aad, &body);

    plain.zeroize();
    body.zeroize();

    let (ciphertext, tag) = sealed?;

    Ok(EncryptedVaultPayload {
        encrypted_data: BASE64.encode(&ciphertext),
        nonce: BASE64.encode(nonce),
        tag: BASE64.encode(tag),
        compressed,
        algorithm: ALGORITHM.to_string(),
        version: PAYLOAD_FORMAT_VERSION,
        created_at: Utc::now(),
    })
}

/// Decrypts, decompresses (bounded), parses, and re-validates a payload.
pub fn decrypt_payload(
    encrypted: &EncryptedVaultPayload,
    dek: &Dek,
    opts: &DecryptOptions,
) -> CryptoResult<DecryptedPayload> {
    let start = Instant::now();

    if encrypted.algorithm != ALGORITHM {
        return Err(CryptoError::UnsupportedAlgorithm(
            encrypted.algorithm.clone(),
        ));
    }

    let ciphertext =
        BASE64
            .decode(&encrypted.encrypted_data)
            .map_err(|_| CryptoError::InvalidEncoding {
                field: "encryptedData",
            })?;
    let nonce_bytes = BASE64
        .decode(&encrypted.nonce)
        .map_err(|_| CryptoError::InvalidEncoding { field: "nonce" })?;
    let tag_bytes = BASE64
        .decode(&encrypted.tag)
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

    let aad = opts.aad.as_deref().unwrap_or(&[]);
    let mut decrypted = cipher::open(dek.as_bytes(), &nonce, aad, &ciphertext, &tag)?;

    let (mut plain, compression_ratio) = if encrypted.compressed {
        let inflated = inflate_bounded(&decrypted, opts.max_payload_size);
        decrypted.zeroize();
        let inflated = inflated?;
        let ratio = inflated.len() as f64 / ciphertext.len() as f64;
        (inflated, Some(ratio))
    } else {
        if decrypted.len() > opts.max_payload_size {
            decrypted.zeroize();
            return Err(CryptoError::PayloadTooLarge {
                limit: opts.max_payload_size,
            });
        }
        (decrypted, None)
    };

    let parsed = VaultPayload::from_json_bytes(&plain);
    plain.zeroize();
    let payload = parsed?;

    let mut warnings = Vec::new();
    let issues = payload.structural_issues();
    if !issues.is_empty() {
        if opts.strict_validation {
            return Err(CryptoError::InvalidPayload(issues.join("; ")));
        }
        warnings.extend(issues);
    }

    Ok(DecryptedPayload {
        payload,
        compression_ratio,
        decryption_time: start.elapsed(),
        warnings,
    })
}

/// Streams zstd decompression with a hard output cap, so an adversarial
/// frame fails before its claimed size is ever materialized.
fn inflate_bounded(compressed: &[u8], max_size: usize) -> CryptoResult<Vec<u8>> {
    let decoder = zstd::Decoder::new(compressed)
        .map_err(|e| CryptoError::Internal(format!("zstd decoder init failed: {e}")))?;

    let mut out = Vec::new();
    let mut limited = decoder.take(max_size as u64 + 1);
    limited
        .read_to_end(&mut out)
        .map_err(|e| CryptoError::Internal(format!("zstd decompression failed: {e}")))?;

    if out.len() > max_size {
        out.zeroize();
        return Err(CryptoError::PayloadTooLarge { limit: max_size });
    }
    Ok(out)
}

/// Output of the password-path encryption convenience.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordEncryptedVault {
    pub wrapped_dek: WrappedDek,
    pub encrypted_payload: EncryptedVaultPayload,
}

/// Derives a master key from `password`+`salt`, generates a fresh DEK,
/// encrypts the payload with it, and wraps the DEK for storage.
///
/// The ephemeral DEK and master key are zeroized on every exit path —
/// both live in zeroize-on-drop wrappers scoped to this call.
pub fn encrypt_vault_with_password(
    payload: &VaultPayload,
    password: &str,
    salt: &Salt,
    params: &KdfParams,
    opts: &EncryptOptions,
) -> CryptoResult<PasswordEncryptedVault> {
    let master_key = derive_master_key(password, salt, params)?;
    let (dek, _metadata) = generate_dek(None);

    let encrypted_payload = encrypt_payload(payload, &dek, opts)?;

    let wrap_opts = WrapOptions {
        aad: opts.aad.clone(),
        kdf: Some(KdfInfo {
            algorithm: "argon2id".to_string(),
            salt: BASE64.encode(salt.as_bytes()),
            iterations: params.iterations,
        }),
        ..WrapOptions::default()
    };
    let wrapped_dek = wrap_dek(&dek, &master_key, &wrap_opts)?;

    Ok(PasswordEncryptedVault {
        wrapped_dek,
        encrypted_payload,
    })
}

/// Re-derives the master key from `password` and the stored KDF salt,
/// unwraps the DEK, and decrypts the payload.
///
/// `params` must match the profile used at encryption time; only the salt
/// and iteration count travel with the wrapped DEK.
pub fn decrypt_vault_with_password(
    encrypted: &EncryptedVaultPayload,
    wrapped_dek: &WrappedDek,
    password: &str,
    params: &KdfParams,
    opts: &DecryptOptions,
) -> CryptoResult<DecryptedPayload> {
    let kdf = wrapped_dek
        .metadata
        .kdf
        .as_ref()
        .ok_or(CryptoError::KeyDerivation)?;

    let salt_bytes = BASE64
        .decode(&kdf.salt)
        .map_err(|_| CryptoError::KeyDerivation)?;
    let salt = Salt::from_slice(&salt_bytes).map_err(|_| CryptoError::KeyDerivation)?;

    let master_key = derive_master_key(password, &salt, params)?;
    let (dek, _metadata) = unwrap_dek(wrapped_dek, &master_key, opts.aad.as_deref())?;

    decrypt_payload(encrypted, &dek, opts)
}

/// Decrypts with `old_dek` and re-encrypts with `new_dek`, preserving the
/// original compression decision. Payload-level rotation, independent of
/// DEK-wrapping rotation.
pub fn reencrypt_payload(
    encrypted: &EncryptedVaultPayload,
    old_dek: &Dek,
    new_dek: &Dek,
    aad: Option<&[u8]>,
) -> CryptoResult<EncryptedVaultPayload> {
    let decrypted = decrypt_payload(
        encrypted,
        old_dek,
        &DecryptOptions {
            aad: aad.map(<[u8]>::to_vec),
            ..DecryptOptions::default()
        },
    )?;

    encrypt_payload(
        &decrypted.payload,
        new_dek,
        &EncryptOptions {
            compress: encrypted.compressed,
            force_compression: encrypted.compressed,
            aad: aad.map(<[u8]>::to_vec),
            ..EncryptOptions::default()
        },
    )
}

/// Size/algorithm report for an encrypted payload. Best-effort: the
/// original plaintext size is not derivable from the ciphertext alone.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionStats {
    pub ciphertext_size: usize,
    /// Nonce + tag bytes.
    pub overhead_size: usize,
    pub compressed: bool,
    pub algorithm: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

pub fn encryption_stats(encrypted: &EncryptedVaultPayload) -> CryptoResult<EncryptionStats> {
    let ciphertext =
        BASE64
            .decode(&encrypted.encrypted_data)
            .map_err(|_| CryptoError::InvalidEncoding {
                field: "encryptedData",
            })?;

    Ok(EncryptionStats {
        ciphertext_size: ciphertext.len(),
        overhead_size: NONCE_SIZE + TAG_SIZE,
        compressed: encrypted.compressed,
        algorithm: encrypted.algorithm.clone(),
        version: encrypted.version,
        created_at: encrypted.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> VaultPayload {
        VaultPayload {
            entries: vec![VaultEntry {
                id: "e1".to_string(),
                title: "write the report".to_string(),
                status: EntryStatus::Todo,
                priority: EntryPriority::Low,
            }],
            boards: vec![Board {
                id: "b1".to_string(),
                name: "inbox".to_string(),
                columns: vec!["todo".to_string(), "done".to_string()],
            }],
            metadata: PayloadMetadata {
                version: 1,
                last_sync_at: None,
                counts: PayloadCounts {
                    entries: 1,
                    boards: 1,
                },
            },
        }
    }

    #[test]
    fn validate_accepts_sample() {
        assert!(sample_payload().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_entry_id() {
        let mut payload = sample_payload();
        payload.entries[0].id.clear();
        let err = payload.validate().unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPayload(_)));
    }

    #[test]
    fn validate_flags_count_mismatch() {
        let mut payload = sample_payload();
        payload.metadata.counts.entries = 7;
        assert_eq!(payload.structural_issues().len(), 1);
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&EntryStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let raw = br#"{
            "entries": [{"id": "e1", "title": "t", "status": "archived", "priority": "low"}],
            "boards": [],
            "metadata": {"version": 1, "counts": {"entries": 1, "boards": 0}}
        }"#;
        let err = VaultPayload::from_json_bytes(raw).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }
}
