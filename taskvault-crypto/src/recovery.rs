//! Recovery-code escrow: a human-readable code as an alternate path to the DEK.
//!
//! The code is 32 characters from the RFC 4648 Base32 alphabet (`A–Z2–7`,
//! which excludes the visually ambiguous 0/1/8/9), giving ~160 bits of
//! entropy. It is shown to the user exactly once; the server keeps only the
//! KDF salt and the recovery-wrapped DEK.
//!
//! Every derivation failure — bad format, undecodable salt, KDF refusal —
//! collapses to the one generic [`CryptoError::KeyDerivation`], so an
//! attacker probing the recovery endpoint learns nothing about which input
//! was wrong. The staged [`recover_dek`] workflow reports which *stage*
//! failed for support diagnostics, which reveals input well-formedness but
//! never secret correctness.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;
use zeroize::Zeroize;

use crate::dek::{self, KeyPurpose, WrapOptions, WrappedDek};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{Dek, KdfParams, RecoveryKey, Salt, derive_key_material};

/// Base32 alphabet without 0/1/8/9.
pub const RECOVERY_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
/// Unformatted code length in characters.
pub const RECOVERY_CODE_LEN: usize = 32;
/// Characters per hyphen-separated group.
const GROUP_LEN: usize = 8;
/// Recovery code format version.
pub const RECOVERY_CODE_VERSION: u32 = 1;

/// A freshly generated recovery code with its KDF salt.
///
/// Only `salt` (and the resulting wrapped DEK) may be persisted server-side;
/// the code itself goes to the user once and is never stored.
#[derive(Clone)]
pub struct RecoveryCode {
    /// Formatted as `XXXXXXXX-XXXXXXXX-XXXXXXXX-XXXXXXXX`.
    pub code: String,
    /// The same 32 characters without separators.
    pub raw_code: String,
    /// Base64-encoded KDF salt.
    pub salt: String,
    pub created_at: DateTime<Utc>,
    pub version: u32,
}

impl std::fmt::Debug for RecoveryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCode")
            .field("code", &"[REDACTED]")
            .field("salt", &self.salt)
            .field("created_at", &self.created_at)
            .field("version", &self.version)
            .finish()
    }
}

/// Generates a recovery code and a fresh KDF salt.
pub fn generate_recovery_code() -> RecoveryCode {
    let mut bytes = [0u8; RECOVERY_CODE_LEN];
    OsRng.fill_bytes(&mut bytes);

    // 32-entry alphabet: masking to 5 bits keeps the draw uniform.
    let raw_code: String = bytes
        .iter()
        .map(|b| RECOVERY_CODE_ALPHABET[(b & 0x1f) as usize] as char)
        .collect();
    bytes.zeroize();

    let code = raw_code
        .as_bytes()
        .chunks(GROUP_LEN)
        .map(|group| std::str::from_utf8(group).expect("alphabet is ASCII"))
        .collect::<Vec<_>>()
        .join("-");

    RecoveryCode {
        code,
        raw_code,
        salt: BASE64.encode(Salt::random().as_bytes()),
        created_at: Utc::now(),
        version: RECOVERY_CODE_VERSION,
    }
}

/// Strips separators and checks length and alphabet membership.
/// Accepts both the formatted and the raw form.
fn normalize_code(code: &str) -> Option<String> {
    let raw: String = code.chars().filter(|&c| c != '-').collect();
    if raw.len() != RECOVERY_CODE_LEN {
        return None;
    }
    if !raw
        .bytes()
        .all(|b| RECOVERY_CODE_ALPHABET.contains(&b))
    {
        return None;
    }
    Some(raw)
}

/// Derives the 32-byte recovery key from a code and its base64 salt.
///
/// Format and salt checks run before the expensive Argon2id call; every
/// failure maps to the same generic error.
pub fn derive_recovery_key(
    code: &str,
    salt_b64: &str,
    params: Option<&KdfParams>,
) -> CryptoResult<RecoveryKey> {
    let raw = normalize_code(code).ok_or(CryptoError::KeyDerivation)?;

    let salt_bytes = BASE64
        .decode(salt_b64)
        .map_err(|_| CryptoError::KeyDerivation)?;
    let salt = Salt::from_slice(&salt_bytes).map_err(|_| CryptoError::KeyDerivation)?;

    let defaults = KdfParams::default();
    let mut material = derive_key_material(
        raw.as_bytes(),
        &salt,
        params.unwrap_or(&defaults),
    )?;
    let key = RecoveryKey::from_bytes(material);
    material.zeroize();
    Ok(key)
}

/// Wraps a DEK under a recovery key. Identical AEAD path to the master-key
/// wrap, with `metadata.purpose = "recovery"`.
pub fn wrap_dek_with_recovery_key(
    dek: &Dek,
    recovery_key: &RecoveryKey,
    aad: Option<&[u8]>,
) -> CryptoResult<WrappedDek> {
    let opts = WrapOptions {
        aad: aad.map(<[u8]>::to_vec),
        purpose: KeyPurpose::Recovery,
        ..WrapOptions::default()
    };
    dek::wrap_with_key(dek, recovery_key.as_bytes(), &opts)
}

/// Outcome of a recovery-key unwrap attempt.
///
/// Deliberately not a `Result`: callers implement their own lockout/retry
/// policy without exception-driven control flow.
#[derive(Debug)]
pub struct RecoveryUnwrap {
    pub success: bool,
    pub dek: Option<Dek>,
}

/// Unwraps a recovery-wrapped DEK. Never errors; failure is reported in the
/// outcome and the cause is not disclosed.
pub fn unwrap_dek_with_recovery_key(
    wrapped: &WrappedDek,
    recovery_key: &RecoveryKey,
    aad: Option<&[u8]>,
) -> RecoveryUnwrap {
    match dek::unwrap_with_key(wrapped, recovery_key.as_bytes(), aad) {
        Ok((dek, _metadata)) => RecoveryUnwrap {
            success: true,
            dek: Some(dek),
        },
        Err(err) => {
            debug!("recovery unwrap failed: {:?}", err.kind());
            RecoveryUnwrap {
                success: false,
                dek: None,
            }
        }
    }
}

/// Everything a caller needs to set up recovery escrow for a DEK.
#[derive(Debug)]
pub struct RecoveryEscrow {
    pub recovery_code: RecoveryCode,
    pub wrapped_dek: WrappedDek,
    /// User-facing guidance, surfaced verbatim by the UI.
    pub instructions: Vec<String>,
}

/// One-call escrow setup: generate a code, derive its key, wrap the DEK.
pub fn generate_recovery_code_for_dek(
    dek: &Dek,
    params: Option<&KdfParams>,
) -> CryptoResult<RecoveryEscrow> {
    let recovery_code = generate_recovery_code();
    let recovery_key = derive_recovery_key(&recovery_code.code, &recovery_code.salt, params)?;
    let wrapped_dek = wrap_dek_with_recovery_key(dek, &recovery_key, None)?;

    Ok(RecoveryEscrow {
        recovery_code,
        wrapped_dek,
        instructions: vec![
            "Write this recovery code down and store it offline.".to_string(),
            "Anyone holding the code can decrypt your vault; treat it like a password."
                .to_string(),
            "The code is shown only once and cannot be retrieved later.".to_string(),
        ],
    })
}

/// Result of a non-raising recovery-code check.
#[derive(Debug)]
pub struct RecoveryCodeCheck {
    pub valid: bool,
    pub key: Option<RecoveryKey>,
}

/// Runs the same checks as [`derive_recovery_key`] but reports instead of
/// raising.
pub fn validate_recovery_code(
    code: &str,
    salt_b64: &str,
    params: Option<&KdfParams>,
) -> RecoveryCodeCheck {
    match derive_recovery_key(code, salt_b64, params) {
        Ok(key) => RecoveryCodeCheck {
            valid: true,
            key: Some(key),
        },
        Err(_) => RecoveryCodeCheck {
            valid: false,
            key: None,
        },
    }
}

/// Stages of the end-to-end recovery workflow, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryStage {
    FormatCheck,
    SaltCheck,
    KeyDerivation,
    Unwrap,
}

/// Diagnostic record of a recovery attempt.
///
/// Exposes which stage failed — useful for support tooling — without ever
/// revealing which secret was incorrect: an `Unwrap` failure covers wrong
/// code, wrong salt pairing, and tampered ciphertext alike.
#[derive(Debug)]
pub struct RecoveryAttempt {
    pub stages_passed: Vec<RecoveryStage>,
    pub failed_stage: Option<RecoveryStage>,
    pub dek: Option<Dek>,
}

impl RecoveryAttempt {
    pub fn succeeded(&self) -> bool {
        self.failed_stage.is_none() && self.dek.is_some()
    }

    fn failed_at(stages_passed: Vec<RecoveryStage>, stage: RecoveryStage) -> Self {
        debug!("recovery attempt failed at stage {stage:?}");
        Self {
            stages_passed,
            failed_stage: Some(stage),
            dek: None,
        }
    }
}

/// Full recovery workflow: format check → salt check → key derivation →
/// unwrap.
pub fn recover_dek(
    code: &str,
    salt_b64: &str,
    wrapped: &WrappedDek,
    params: Option<&KdfParams>,
) -> RecoveryAttempt {
    let mut passed = Vec::with_capacity(4);

    let Some(raw) = normalize_code(code) else {
        return RecoveryAttempt::failed_at(passed, RecoveryStage::FormatCheck);
    };
    passed.push(RecoveryStage::FormatCheck);

    let salt = BASE64
        .decode(salt_b64)
        .ok()
        .and_then(|bytes| Salt::from_slice(&bytes).ok());
    let Some(salt) = salt else {
        return RecoveryAttempt::failed_at(passed, RecoveryStage::SaltCheck);
    };
    passed.push(RecoveryStage::SaltCheck);

    let defaults = KdfParams::default();
    let Ok(mut material) =
        derive_key_material(raw.as_bytes(), &salt, params.unwrap_or(&defaults))
    else {
        return RecoveryAttempt::failed_at(passed, RecoveryStage::KeyDerivation);
    };
    let recovery_key = RecoveryKey::from_bytes(material);
    material.zeroize();
    passed.push(RecoveryStage::KeyDerivation);

    let outcome = unwrap_dek_with_recovery_key(wrapped, &recovery_key, None);
    if !outcome.success {
        return RecoveryAttempt::failed_at(passed, RecoveryStage::Unwrap);
    }
    passed.push(RecoveryStage::Unwrap);

    RecoveryAttempt {
        stages_passed: passed,
        failed_stage: None,
        dek: outcome.dek,
    }
}
