//! Symmetric cipher utility.
//!
//! AES-256-GCM keyed by a 32-byte [`SymmetricKey`] and bound to an
//! [`AssociatedData`] usage context. Ciphertexts use the combined layout
//! `nonce[12] || ct || tag[16]`.
//!
//! ```
//! use pass_crypto::{symmetric, AssociatedData, SymmetricKey};
//!
//! let key = SymmetricKey::generate().unwrap();
//! let sealed = symmetric::seal(b"hello", &key, AssociatedData::ItemContent).unwrap();
//! let opened = symmetric::open(&sealed, &key, AssociatedData::ItemContent).unwrap();
//! assert_eq!(opened, b"hello");
//! assert!(symmetric::open(&sealed, &key, AssociatedData::VaultContent).is_err());
//! ```

use core::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::aad::{AssociatedData, LOCAL_AAD};
use crate::aead;
use crate::error::CryptoError;
use crate::wire::AES_KEY_BYTES;

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// 256-bit symmetric key. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; AES_KEY_BYTES]);

impl SymmetricKey {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; AES_KEY_BYTES];
        aead::random_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; AES_KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Fails unless `bytes` is exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; AES_KEY_BYTES] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("symmetric key must be 32 bytes"))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; AES_KEY_BYTES] {
        &self.0
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

// ---------------------------------------------------------------------------
// Byte variants
// ---------------------------------------------------------------------------

pub fn seal(
    plaintext: &[u8],
    key: &SymmetricKey,
    context: AssociatedData,
) -> Result<Vec<u8>, CryptoError> {
    aead::seal_combined(key.as_bytes(), plaintext, context.as_bytes())
}

/// Fails with `AuthenticationFailure` on a context mismatch or corrupted input.
pub fn open(
    ciphertext: &[u8],
    key: &SymmetricKey,
    context: AssociatedData,
) -> Result<Vec<u8>, CryptoError> {
    aead::open_combined(key.as_bytes(), ciphertext, context.as_bytes())
}

// ---------------------------------------------------------------------------
// String variants (UTF-8 + base64 transport)
// ---------------------------------------------------------------------------

pub fn seal_string(
    plaintext: &str,
    key: &SymmetricKey,
    context: AssociatedData,
) -> Result<String, CryptoError> {
    let sealed = seal(plaintext.as_bytes(), key, context)?;
    Ok(BASE64.encode(sealed))
}

pub fn open_string(
    ciphertext_b64: &str,
    key: &SymmetricKey,
    context: AssociatedData,
) -> Result<String, CryptoError> {
    let sealed = decode_base64(ciphertext_b64)?;
    let plain = open(&sealed, key, context)?;
    String::from_utf8(plain).map_err(|_| CryptoError::Utf8)
}

// ---------------------------------------------------------------------------
// Device-local variants
// ---------------------------------------------------------------------------

/// Seal a blob under the device-local key. Not interchangeable with [`seal`].
pub fn seal_local(plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
    aead::seal_combined(key.as_bytes(), plaintext, LOCAL_AAD)
}

pub fn open_local(ciphertext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
    aead::open_combined(key.as_bytes(), ciphertext, LOCAL_AAD)
}

// ---------------------------------------------------------------------------
// Base64 helpers
// ---------------------------------------------------------------------------

pub fn encode_base64(bytes: impl AsRef<[u8]>) -> String {
    BASE64.encode(bytes)
}

pub fn decode_base64(s: &str) -> Result<Vec<u8>, CryptoError> {
    BASE64
        .decode(s.trim())
        .map_err(|_| CryptoError::Base64DecodeFailure)
}
