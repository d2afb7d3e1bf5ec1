//! XChaCha20-Poly1305 sealing and opening with detached tags.
//!
//! The extended 24-byte nonce is large enough to be drawn randomly per call
//! without birthday-bound concerns, which is what every wrap/encrypt path in
//! this crate does. Ciphertext and Poly1305 tag are kept as separate fields
//! on the wire, so the seal/open helpers split and rejoin them here.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{CryptoError, CryptoResult};
use crate::key::KEY_SIZE;

/// Size (bytes) of XChaCha20-Poly1305 nonces.
pub const NONCE_SIZE: usize = 24;
/// Size (bytes) of Poly1305 authentication tags.
pub const TAG_SIZE: usize = 16;

/// AEAD identifier recorded in persisted metadata.
pub const ALGORITHM: &str = "xchacha20-poly1305";

/// Generates a fresh random 24-byte nonce.
///
/// OS RNG failure aborts the process; there is no meaningful recovery from
/// a dead entropy source.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts `plaintext` under `key`/`nonce`/`aad`, returning the ciphertext
/// and the detached 16-byte tag.
pub(crate) fn seal(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> CryptoResult<(Vec<u8>, [u8; TAG_SIZE])> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let mut sealed = cipher
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Internal("AEAD encryption failed".to_string()))?;

    let split = sealed.len() - TAG_SIZE;
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&sealed[split..]);
    sealed.truncate(split);

    Ok((sealed, tag))
}

/// Decrypts a detached-tag ciphertext.
///
/// Any verification failure maps to the single [`CryptoError::Authentication`]
/// variant: wrong key, mismatched AAD, and tampered data are not
/// distinguishable by the caller.
pub(crate) fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8; TAG_SIZE],
) -> CryptoResult<Vec<u8>> {
    let mut joined = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    joined.extend_from_slice(ciphertext);
    joined.extend_from_slice(tag);

    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: joined.as_slice(),
                aad,
            },
        )
        .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = [7u8; KEY_SIZE];
        let nonce = generate_nonce();
        let (ct, tag) = seal(&key, &nonce, b"ctx", b"plaintext").unwrap();
        assert_eq!(tag.len(), TAG_SIZE);

        let pt = open(&key, &nonce, b"ctx", &ct, &tag).unwrap();
        assert_eq!(pt, b"plaintext");
    }

    #[test]
    fn tampered_tag_fails() {
        let key = [7u8; KEY_SIZE];
        let nonce = generate_nonce();
        let (ct, mut tag) = seal(&key, &nonce, b"", b"data").unwrap();
        tag[0] ^= 0x01;

        assert!(matches!(
            open(&key, &nonce, b"", &ct, &tag),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn aad_mismatch_fails() {
        let key = [7u8; KEY_SIZE];
        let nonce = generate_nonce();
        let (ct, tag) = seal(&key, &nonce, b"aad-a", b"data").unwrap();

        assert!(open(&key, &nonce, b"aad-b", &ct, &tag).is_err());
        assert!(open(&key, &nonce, b"", &ct, &tag).is_err());
    }
}
