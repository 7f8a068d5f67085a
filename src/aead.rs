//! AEAD: AES-256-GCM

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use getrandom::getrandom;

use crate::error::CryptoError;
use crate::wire::NONCE_BYTES;

/// Fill `buf` from the OS RNG.
pub(crate) fn random_bytes(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom(buf).map_err(|_| CryptoError::Randomness)
}

/// Generate a random 12-byte nonce. Used during encryption only.
pub(crate) fn nonce() -> Result<[u8; NONCE_BYTES], CryptoError> {
    let mut n = [0u8; NONCE_BYTES];
    random_bytes(&mut n)?;
    Ok(n)
}

pub(crate) fn aead_seal(
    key: &[u8; 32],
    nonce: &[u8; NONCE_BYTES],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailure)?;
    let n = Nonce::from_slice(nonce);
    let payload = Payload { msg: plaintext, aad };
    cipher.encrypt(n, payload).map_err(|_| CryptoError::EncryptionFailure)
}

/// Any failure here is reported as `AuthenticationFailure`.
pub(crate) fn aead_open(
    key: &[u8; 32],
    nonce: &[u8; NONCE_BYTES],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AuthenticationFailure)?;
    let n = Nonce::from_slice(nonce);
    let payload = Payload { msg: ciphertext, aad };
    cipher
        .decrypt(n, payload)
        .map_err(|_| CryptoError::AuthenticationFailure)
}

/// Seal into the combined layout `nonce[12] || ct || tag[16]`.
pub(crate) fn seal_combined(
    key: &[u8; 32],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let n = nonce()?;
    let ct = aead_seal(key, &n, plaintext, aad)?;
    let mut out = Vec::with_capacity(NONCE_BYTES + ct.len());
    out.extend_from_slice(&n);
    out.extend_from_slice(&ct);
    Ok(out)
}

pub(crate) fn open_combined(
    key: &[u8; 32],
    combined: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let (nonce, ct) = split_nonce(combined).ok_or(CryptoError::AuthenticationFailure)?;
    aead_open(key, nonce, ct, aad)
}

pub(crate) fn split_nonce(combined: &[u8]) -> Option<(&[u8; NONCE_BYTES], &[u8])> {
    if combined.len() < NONCE_BYTES + crate::wire::AEAD_TAG_BYTES {
        return None;
    }
    let (n, ct) = combined.split_at(NONCE_BYTES);
    Some((n.try_into().ok()?, ct))
}
