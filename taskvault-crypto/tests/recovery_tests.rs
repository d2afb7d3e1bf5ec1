//! End-to-end tests for the recovery-code escrow path.

use taskvault_crypto::recovery::{
    RECOVERY_CODE_ALPHABET, RECOVERY_CODE_VERSION, RecoveryStage, derive_recovery_key,
    generate_recovery_code, generate_recovery_code_for_dek, recover_dek,
    unwrap_dek_with_recovery_key, validate_recovery_code, wrap_dek_with_recovery_key,
};
use taskvault_crypto::{KdfParams, KeyPurpose, generate_dek};

fn test_params() -> KdfParams {
    KdfParams::for_tests()
}

// ── Code generation ──

#[test]
fn code_has_four_groups_of_eight() {
    let rc = generate_recovery_code();
    let groups: Vec<&str> = rc.code.split('-').collect();

    assert_eq!(groups.len(), 4);
    for group in &groups {
        assert_eq!(group.len(), 8);
        assert!(group.bytes().all(|b| RECOVERY_CODE_ALPHABET.contains(&b)));
    }
    assert_eq!(rc.raw_code, groups.concat());
    assert_eq!(rc.version, RECOVERY_CODE_VERSION);
}

#[test]
fn codes_and_salts_are_unique() {
    let a = generate_recovery_code();
    let b = generate_recovery_code();
    assert_ne!(a.code, b.code);
    assert_ne!(a.salt, b.salt);
}

#[test]
fn debug_output_redacts_the_code() {
    let rc = generate_recovery_code();
    let rendered = format!("{rc:?}");
    assert!(rendered.contains("REDACTED"));
    assert!(!rendered.contains(&rc.raw_code));
}

// ── Derivation ──

#[test]
fn derivation_is_deterministic_and_format_insensitive() {
    let params = test_params();
    let rc = generate_recovery_code();

    let from_formatted = derive_recovery_key(&rc.code, &rc.salt, Some(&params)).unwrap();
    let from_raw = derive_recovery_key(&rc.raw_code, &rc.salt, Some(&params)).unwrap();

    assert_eq!(from_formatted.as_bytes(), from_raw.as_bytes());
}

#[test]
fn different_salt_yields_a_different_key() {
    let params = test_params();
    let rc = generate_recovery_code();
    let other = generate_recovery_code();

    let a = derive_recovery_key(&rc.code, &rc.salt, Some(&params)).unwrap();
    let b = derive_recovery_key(&rc.code, &other.salt, Some(&params)).unwrap();
    assert_ne!(a.as_bytes(), b.as_bytes());
}

// ── Escrow round trip ──

#[test]
fn escrow_roundtrip_recovers_the_dek() {
    let params = test_params();
    let (dek, _) = generate_dek(None);

    let escrow = generate_recovery_code_for_dek(&dek, Some(&params)).unwrap();
    assert_eq!(escrow.wrapped_dek.metadata.purpose, KeyPurpose::Recovery);
    assert!(!escrow.instructions.is_empty());

    let key = derive_recovery_key(
        &escrow.recovery_code.code,
        &escrow.recovery_code.salt,
        Some(&params),
    )
    .unwrap();
    let outcome = unwrap_dek_with_recovery_key(&escrow.wrapped_dek, &key, None);

    assert!(outcome.success);
    assert_eq!(outcome.dek.unwrap().as_bytes(), dek.as_bytes());
}

#[test]
fn wrong_code_reports_failure_without_erroring() {
    let params = test_params();
    let (dek, _) = generate_dek(None);

    let escrow = generate_recovery_code_for_dek(&dek, Some(&params)).unwrap();
    let other = generate_recovery_code();

    let wrong_key =
        derive_recovery_key(&other.code, &escrow.recovery_code.salt, Some(&params)).unwrap();
    let outcome = unwrap_dek_with_recovery_key(&escrow.wrapped_dek, &wrong_key, None);

    assert!(!outcome.success);
    assert!(outcome.dek.is_none());
}

#[test]
fn wrong_salt_fails_the_roundtrip() {
    let params = test_params();
    let (dek, _) = generate_dek(None);

    let escrow = generate_recovery_code_for_dek(&dek, Some(&params)).unwrap();
    let other = generate_recovery_code();

    let key = derive_recovery_key(&escrow.recovery_code.code, &other.salt, Some(&params)).unwrap();
    let outcome = unwrap_dek_with_recovery_key(&escrow.wrapped_dek, &key, None);
    assert!(!outcome.success);
}

#[test]
fn manual_wrap_and_unwrap_with_recovery_key() {
    let params = test_params();
    let (dek, _) = generate_dek(None);
    let rc = generate_recovery_code();

    let key = derive_recovery_key(&rc.code, &rc.salt, Some(&params)).unwrap();
    let wrapped = wrap_dek_with_recovery_key(&dek, &key, Some(b"user:1")).unwrap();
    assert_eq!(wrapped.metadata.purpose, KeyPurpose::Recovery);

    let outcome = unwrap_dek_with_recovery_key(&wrapped, &key, Some(b"user:1"));
    assert!(outcome.success);

    // AAD binding applies on the recovery path too.
    let mismatched = unwrap_dek_with_recovery_key(&wrapped, &key, None);
    assert!(!mismatched.success);
}

// ── Non-raising validation ──

#[test]
fn validate_recovery_code_reports_instead_of_raising() {
    let params = test_params();
    let rc = generate_recovery_code();

    let ok = validate_recovery_code(&rc.code, &rc.salt, Some(&params));
    assert!(ok.valid);
    assert!(ok.key.is_some());

    let bad_format = validate_recovery_code("short", &rc.salt, Some(&params));
    assert!(!bad_format.valid);
    assert!(bad_format.key.is_none());

    let bad_salt = validate_recovery_code(&rc.code, "%%%", Some(&params));
    assert!(!bad_salt.valid);
}

// ── Staged workflow ──

#[test]
fn staged_recovery_succeeds_end_to_end() {
    let params = test_params();
    let (dek, _) = generate_dek(None);
    let escrow = generate_recovery_code_for_dek(&dek, Some(&params)).unwrap();

    let attempt = recover_dek(
        &escrow.recovery_code.code,
        &escrow.recovery_code.salt,
        &escrow.wrapped_dek,
        Some(&params),
    );

    assert!(attempt.succeeded());
    assert_eq!(attempt.stages_passed.len(), 4);
    assert_eq!(attempt.dek.unwrap().as_bytes(), dek.as_bytes());
}

#[test]
fn staged_recovery_reports_the_failing_stage() {
    let params = test_params();
    let (dek, _) = generate_dek(None);
    let escrow = generate_recovery_code_for_dek(&dek, Some(&params)).unwrap();

    let bad_format = recover_dek("nope", &escrow.recovery_code.salt, &escrow.wrapped_dek, None);
    assert_eq!(bad_format.failed_stage, Some(RecoveryStage::FormatCheck));
    assert!(bad_format.stages_passed.is_empty());

    let bad_salt = recover_dek(
        &escrow.recovery_code.code,
        "@@not-base64@@",
        &escrow.wrapped_dek,
        Some(&params),
    );
    assert_eq!(bad_salt.failed_stage, Some(RecoveryStage::SaltCheck));
    assert_eq!(bad_salt.stages_passed, vec![RecoveryStage::FormatCheck]);

    let other = generate_recovery_code();
    let wrong_code = recover_dek(
        &other.code,
        &escrow.recovery_code.salt,
        &escrow.wrapped_dek,
        Some(&params),
    );
    assert_eq!(wrong_code.failed_stage, Some(RecoveryStage::Unwrap));
    assert!(wrong_code.dek.is_none());
}
