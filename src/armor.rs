//! ASCII armor for binary key material, messages and signatures.
//!
//! PEM blocks with one tag per kind:
//!
//! ```text
//! -----BEGIN PASS MESSAGE-----
//! <base64>
//! -----END PASS MESSAGE-----
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArmorKind {
    Message,
    Signature,
    PublicKey,
    PrivateKey,
}

impl ArmorKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ArmorKind::Message => "PASS MESSAGE",
            ArmorKind::Signature => "PASS SIGNATURE",
            ArmorKind::PublicKey => "PASS PUBLIC KEY",
            ArmorKind::PrivateKey => "PASS PRIVATE KEY",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        [
            ArmorKind::Message,
            ArmorKind::Signature,
            ArmorKind::PublicKey,
            ArmorKind::PrivateKey,
        ]
        .into_iter()
        .find(|k| k.tag() == tag)
    }
}

impl fmt::Display for ArmorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

pub fn armor(bytes: &[u8], kind: ArmorKind) -> String {
    pem::encode(&pem::Pem::new(kind.tag(), bytes))
}

/// Parse an armored block of any known kind.
pub fn dearmor(armored: &str) -> Result<(ArmorKind, Vec<u8>), CryptoError> {
    let block = pem::parse(armored).map_err(|e| CryptoError::Armor(e.to_string()))?;
    let kind = ArmorKind::from_tag(block.tag())
        .ok_or_else(|| CryptoError::Armor(format!("unknown armor tag {:?}", block.tag())))?;
    Ok((kind, block.into_contents()))
}

/// Parse an armored block, requiring `expected` kind.
pub fn unarmor(armored: &str, expected: ArmorKind) -> Result<Vec<u8>, CryptoError> {
    let (kind, bytes) = dearmor(armored)?;
    if kind != expected {
        return Err(CryptoError::Armor(format!("expected {}, found {}", expected, kind)));
    }
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Typed armored strings
// ---------------------------------------------------------------------------

macro_rules! armored_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

armored_string!(
    /// Armored public or private key.
    ArmoredKey
);
armored_string!(ArmoredMessage);
armored_string!(ArmoredSignature);

impl ArmoredMessage {
    pub fn from_binary(bytes: &[u8]) -> Self {
        Self(armor(bytes, ArmorKind::Message))
    }
}

impl ArmoredSignature {
    pub fn from_binary(bytes: &[u8]) -> Self {
        Self(armor(bytes, ArmorKind::Signature))
    }
}
