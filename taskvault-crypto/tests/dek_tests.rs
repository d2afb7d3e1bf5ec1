//! Adversarial and round-trip tests for DEK wrapping.
//!
//! Covers wrong-key unwrapping, ciphertext/nonce/tag tampering, AAD binding,
//! nonce freshness, and single-key rotation. These validate the guarantees
//! the rotation planner and payload codec rely on.

use std::collections::HashSet;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use taskvault_crypto::{
    ALGORITHM, CryptoError, DEFAULT_KEY_VERSION, ErrorKind, KeyPurpose, NONCE_SIZE, WrapOptions,
    generate_dek, generate_master_key, rotate_dek, unwrap_dek, wrap_dek,
};

// ── Round trips ──

#[test]
fn wrap_unwrap_roundtrip() {
    let (dek, _) = generate_dek(None);
    let master = generate_master_key();

    let wrapped = wrap_dek(&dek, &master, &WrapOptions::default()).unwrap();
    let (unwrapped, metadata) = unwrap_dek(&wrapped, &master, None).unwrap();

    assert_eq!(unwrapped.as_bytes(), dek.as_bytes());
    assert_eq!(metadata.version, DEFAULT_KEY_VERSION);
    assert_eq!(metadata.algorithm, ALGORITHM);
    assert_eq!(metadata.purpose, KeyPurpose::Password);
}

#[test]
fn double_wrap_yields_fresh_nonce_and_ciphertext() {
    let (dek, _) = generate_dek(None);
    let master = generate_master_key();

    let a = wrap_dek(&dek, &master, &WrapOptions::default()).unwrap();
    let b = wrap_dek(&dek, &master, &WrapOptions::default()).unwrap();

    assert_ne!(a.nonce, b.nonce);
    assert_ne!(a.encrypted_dek, b.encrypted_dek);

    let (dek_a, _) = unwrap_dek(&a, &master, None).unwrap();
    let (dek_b, _) = unwrap_dek(&b, &master, None).unwrap();
    assert_eq!(dek_a.as_bytes(), dek.as_bytes());
    assert_eq!(dek_b.as_bytes(), dek.as_bytes());
}

#[test]
fn nonces_and_ciphertexts_never_collide() {
    let (dek, _) = generate_dek(None);
    let master = generate_master_key();

    let mut nonces = HashSet::new();
    let mut ciphertexts = HashSet::new();
    for _ in 0..1000 {
        let wrapped = wrap_dek(&dek, &master, &WrapOptions::default()).unwrap();
        assert!(nonces.insert(wrapped.nonce), "nonce collision");
        assert!(
            ciphertexts.insert(wrapped.encrypted_dek),
            "ciphertext collision"
        );
    }
}

// ── Wrong key / tampering ──

#[test]
fn wrong_master_key_fails_with_authentication() {
    let (dek, _) = generate_dek(None);
    let master = generate_master_key();
    let other = generate_master_key();

    let wrapped = wrap_dek(&dek, &master, &WrapOptions::default()).unwrap();
    let err = unwrap_dek(&wrapped, &other, None).unwrap_err();

    assert!(matches!(err, CryptoError::Authentication));
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[test]
fn tampered_ciphertext_is_detected() {
    let (dek, _) = generate_dek(None);
    let master = generate_master_key();
    let wrapped = wrap_dek(&dek, &master, &WrapOptions::default()).unwrap();

    let mut ct = BASE64.decode(&wrapped.encrypted_dek).unwrap();
    ct[0] ^= 0x01;
    let mut tampered = wrapped.clone();
    tampered.encrypted_dek = BASE64.encode(&ct);

    assert!(matches!(
        unwrap_dek(&tampered, &master, None),
        Err(CryptoError::Authentication)
    ));
}

#[test]
fn tampered_nonce_is_detected() {
    let (dek, _) = generate_dek(None);
    let master = generate_master_key();
    let wrapped = wrap_dek(&dek, &master, &WrapOptions::default()).unwrap();

    let mut nonce = BASE64.decode(&wrapped.nonce).unwrap();
    nonce[23] ^= 0x80;
    let mut tampered = wrapped.clone();
    tampered.nonce = BASE64.encode(&nonce);

    assert!(matches!(
        unwrap_dek(&tampered, &master, None),
        Err(CryptoError::Authentication)
    ));
}

#[test]
fn tampered_tag_is_detected() {
    let (dek, _) = generate_dek(None);
    let master = generate_master_key();
    let wrapped = wrap_dek(&dek, &master, &WrapOptions::default()).unwrap();

    let mut tag = BASE64.decode(&wrapped.tag).unwrap();
    tag[15] ^= 0x01;
    let mut tampered = wrapped.clone();
    tampered.tag = BASE64.encode(&tag);

    assert!(matches!(
        unwrap_dek(&tampered, &master, None),
        Err(CryptoError::Authentication)
    ));
}

// ── AAD binding ──

#[test]
fn aad_must_match_between_wrap_and_unwrap() {
    let (dek, _) = generate_dek(None);
    let master = generate_master_key();

    let opts = WrapOptions {
        aad: Some(b"user:42".to_vec()),
        ..WrapOptions::default()
    };
    let wrapped = wrap_dek(&dek, &master, &opts).unwrap();

    // Same AAD succeeds.
    let (unwrapped, _) = unwrap_dek(&wrapped, &master, Some(b"user:42")).unwrap();
    assert_eq!(unwrapped.as_bytes(), dek.as_bytes());

    // Different or omitted AAD fails.
    assert!(unwrap_dek(&wrapped, &master, Some(b"user:43")).is_err());
    assert!(unwrap_dek(&wrapped, &master, None).is_err());
}

// ── Input validation ──

#[test]
fn supplied_nonce_must_be_24_bytes() {
    let (dek, _) = generate_dek(None);
    let master = generate_master_key();

    let opts = WrapOptions {
        nonce: Some(vec![0u8; 12]),
        ..WrapOptions::default()
    };
    let err = wrap_dek(&dek, &master, &opts).unwrap_err();

    assert!(matches!(
        err,
        CryptoError::InvalidNonceLength {
            expected: NONCE_SIZE,
            actual: 12
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn unknown_algorithm_is_rejected_before_decryption() {
    let (dek, _) = generate_dek(None);
    let master = generate_master_key();
    let mut wrapped = wrap_dek(&dek, &master, &WrapOptions::default()).unwrap();
    wrapped.metadata.algorithm = "aes-256-gcm".to_string();

    assert!(matches!(
        unwrap_dek(&wrapped, &master, None),
        Err(CryptoError::UnsupportedAlgorithm(_))
    ));
}

#[test]
fn garbage_base64_is_a_validation_error() {
    let (dek, _) = generate_dek(None);
    let master = generate_master_key();
    let mut wrapped = wrap_dek(&dek, &master, &WrapOptions::default()).unwrap();
    wrapped.tag = "!!not-base64!!".to_string();

    let err = unwrap_dek(&wrapped, &master, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// ── Rotation ──

#[test]
fn rotation_moves_the_dek_to_the_new_key() {
    let (dek, _) = generate_dek(None);
    let old_key = generate_master_key();
    let new_key = generate_master_key();

    let wrapped = wrap_dek(&dek, &old_key, &WrapOptions::default()).unwrap();
    let rotated = rotate_dek(&wrapped, &old_key, &new_key, Some(2)).unwrap();

    let (unwrapped, metadata) = unwrap_dek(&rotated, &new_key, None).unwrap();
    assert_eq!(unwrapped.as_bytes(), dek.as_bytes());
    assert_eq!(metadata.version, 2);

    // The old key no longer opens the rotated artifact.
    assert!(unwrap_dek(&rotated, &old_key, None).is_err());
}

#[test]
fn rotation_with_wrong_old_key_fails() {
    let (dek, _) = generate_dek(None);
    let old_key = generate_master_key();
    let wrong = generate_master_key();
    let new_key = generate_master_key();

    let wrapped = wrap_dek(&dek, &old_key, &WrapOptions::default()).unwrap();
    assert!(matches!(
        rotate_dek(&wrapped, &wrong, &new_key, None),
        Err(CryptoError::Authentication)
    ));
}

// ── Wire shape ──

#[test]
fn wrapped_dek_serializes_to_the_documented_shape() {
    let (dek, _) = generate_dek(Some(3));
    let master = generate_master_key();
    let opts = WrapOptions {
        version: Some(3),
        ..WrapOptions::default()
    };
    let wrapped = wrap_dek(&dek, &master, &opts).unwrap();

    let json: serde_json::Value = serde_json::to_value(&wrapped).unwrap();
    assert!(json.get("encryptedDEK").is_some());
    assert!(json.get("nonce").is_some());
    assert!(json.get("tag").is_some());
    assert_eq!(json["metadata"]["version"], 3);
    assert_eq!(json["metadata"]["algorithm"], "xchacha20-poly1305");
    assert_eq!(json["metadata"]["purpose"], "password");
    assert!(json["metadata"]["createdAt"].is_string());

    // Component sizes are exact on the wire.
    assert_eq!(BASE64.decode(&wrapped.nonce).unwrap().len(), 24);
    assert_eq!(BASE64.decode(&wrapped.tag).unwrap().len(), 16);
    assert_eq!(BASE64.decode(&wrapped.encrypted_dek).unwrap().len(), 32);
}
