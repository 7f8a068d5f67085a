//! Error types for the keystore.

use crate::types::{RotationId, ShareId};
use pass_crypto::CryptoError;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level keystore error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeystoreError {
    #[error("no key for share {share_id} at rotation {key_rotation}")]
    KeysNotFound { share_id: ShareId, key_rotation: i64 },

    #[error("share {0} has no keys")]
    NoKeysAvailable(ShareId),

    #[error("authentication failed")]
    AuthenticationFailure,

    #[error("base64 decoding failed")]
    Base64DecodeFailure,

    #[error("no vault or item key for rotation {0}")]
    KeyNotFound(RotationId),

    #[error("vault signing key could not be verified")]
    VaultVerificationFailure,

    #[error("vault key could not be verified")]
    VaultKeyVerificationFailure,

    #[error("{0} signature verification failed")]
    SignatureVerificationFailure(SignatureKind),

    #[error("item content could not be decrypted")]
    ContentDecryptionFailure,

    #[error("key has no fingerprint")]
    FingerprintError,

    #[error("malformed message")]
    MalformedMessage,

    #[error("decryption failed")]
    DecryptionFailure,

    #[error("decrypted key has {actual} bytes, expected {expected}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("user key {0} is missing or inactive")]
    InactiveUserKey(String),

    #[error("item content could not be parsed: {0}")]
    ContentParse(String),

    #[error("locally encrypted content is corrupted")]
    CorruptedEncryptedContent,

    #[error("local symmetric key unavailable: {0}")]
    SymmetricKeyUnavailable(String),

    #[error("datasource error: {0}")]
    Datasource(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("crypto error: {0}")]
    Crypto(CryptoError),
}

/// Which signature failed in the item pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    ShareKey,
    ItemKey,
    User,
}

impl std::fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureKind::ShareKey => write!(f, "share key"),
            SignatureKind::ItemKey => write!(f, "item key"),
            SignatureKind::User => write!(f, "user"),
        }
    }
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No key material for the request. Surfaced, never retried locally.
    MissingKeys,
    /// AEAD tag mismatch. A hint to force-refresh keys after a rotation.
    Authentication,
    /// Trust failure. Content must be hidden, not shown.
    UntrustedContent,
    /// Undecodable input.
    MalformedInput,
    /// A collaborator (datasource, key provider) failed.
    Collaborator,
}

impl KeystoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::KeysNotFound { .. }
            | Self::NoKeysAvailable(_)
            | Self::KeyNotFound(_)
            | Self::InactiveUserKey(_) => ErrorClass::MissingKeys,
            Self::AuthenticationFailure => ErrorClass::Authentication,
            Self::VaultVerificationFailure
            | Self::VaultKeyVerificationFailure
            | Self::SignatureVerificationFailure(_) => ErrorClass::UntrustedContent,
            Self::Base64DecodeFailure
            | Self::FingerprintError
            | Self::MalformedMessage
            | Self::DecryptionFailure
            | Self::ContentDecryptionFailure
            | Self::InvalidKeyLength { .. }
            | Self::ContentParse(_)
            | Self::CorruptedEncryptedContent
            | Self::InvalidConfig(_)
            | Self::Crypto(_) => ErrorClass::MalformedInput,
            Self::SymmetricKeyUnavailable(_) | Self::Datasource(_) => ErrorClass::Collaborator,
        }
    }

    pub fn is_untrusted_content(&self) -> bool {
        self.class() == ErrorClass::UntrustedContent
    }
}

impl From<CryptoError> for KeystoreError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::AuthenticationFailure => Self::AuthenticationFailure,
            CryptoError::Base64DecodeFailure => Self::Base64DecodeFailure,
            CryptoError::FingerprintError => Self::FingerprintError,
            CryptoError::MalformedMessage => Self::MalformedMessage,
            CryptoError::DecryptionFailure => Self::DecryptionFailure,
            other => Self::Crypto(other),
        }
    }
}

impl From<serde_json::Error> for KeystoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::ContentParse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KeystoreError>;
