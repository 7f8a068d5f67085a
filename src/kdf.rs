//! KDF and hashing
//!
//! Message key:
//!   info = PROTOCOL_ID || b"|msg|" || ct_hash
//!   key  = HKDF-SHA256(shared_secret, salt=None, info=info, len=32)
//!
//! Lock key (private key at rest):
//!   info = PROTOCOL_ID || b"|lock|"
//!   key  = HKDF-SHA256(passphrase, salt=salt[16], info=info, len=32)
//!
//! Passphrases are machine-generated (32 random bytes, base64), so a fast KDF
//! is sufficient here.

use hkdf::Hkdf;
use sha2::{Digest as _, Sha256};
use sha3::Sha3_256;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::wire::{AES_KEY_BYTES, PROTOCOL_ID};

pub(crate) fn ct_hash(kem_ct: &[u8]) -> [u8; 32] {
    let h = Sha3_256::digest(kem_ct);
    let mut out = [0u8; 32];
    out.copy_from_slice(&h);
    out
}

pub(crate) fn derive_message_key(
    shared_secret: &[u8],
    ct_hash: &[u8; 32],
) -> Result<Zeroizing<[u8; AES_KEY_BYTES]>, CryptoError> {
    let mut info = Vec::with_capacity(PROTOCOL_ID.len() + 5 + 32);
    info.extend_from_slice(PROTOCOL_ID);
    info.extend_from_slice(b"|msg|");
    info.extend_from_slice(ct_hash);
    expand(None, shared_secret, &info)
}

pub(crate) fn derive_lock_key(
    passphrase: &[u8],
    salt: &[u8],
) -> Result<Zeroizing<[u8; AES_KEY_BYTES]>, CryptoError> {
    let mut info = Vec::with_capacity(PROTOCOL_ID.len() + 6);
    info.extend_from_slice(PROTOCOL_ID);
    info.extend_from_slice(b"|lock|");
    expand(Some(salt), passphrase, &info)
}

fn expand(
    salt: Option<&[u8]>,
    ikm: &[u8],
    info: &[u8],
) -> Result<Zeroizing<[u8; AES_KEY_BYTES]>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut out = Zeroizing::new([0u8; AES_KEY_BYTES]);
    hk.expand(info, &mut out[..])
        .map_err(|_| CryptoError::EncryptionFailure)?;
    Ok(out)
}

/// Lowercase hex SHA-256 of a public key packet.
pub(crate) fn fingerprint(public_packet: &[u8]) -> String {
    hex::encode(Sha256::digest(public_packet))
}
