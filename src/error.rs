//! Error types for pass-crypto.

use thiserror::Error;

/// Every failure a primitive in this crate can report.
///
/// Decrypt-side failures deliberately carry no detail about which check
/// failed; callers only learn the kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// AEAD tag mismatch, wrong context, truncated or corrupted ciphertext.
    #[error("authentication failed")]
    AuthenticationFailure,

    #[error("base64 decoding failed")]
    Base64DecodeFailure,

    #[error("key has no fingerprint")]
    FingerprintError,

    #[error("malformed message")]
    MalformedMessage,

    /// Asymmetric decryption failed: no key in the keyring could open it.
    #[error("decryption failed")]
    DecryptionFailure,

    /// A signed message whose signature no verification key accepts, or a
    /// message that carries no signature where one is required.
    #[error("signature verification failed")]
    SignatureMismatch,

    #[error("encryption failed")]
    EncryptionFailure,

    /// Key bytes could not be parsed or the passphrase did not unlock them.
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),

    #[error("armor error: {0}")]
    Armor(String),

    #[error("decrypted data is not valid UTF-8")]
    Utf8,

    #[error("system randomness unavailable")]
    Randomness,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
