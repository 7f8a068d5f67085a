//! Core types: identifiers, wire-form keys, decrypted keys, vault/share/item records.

use pass_crypto::{ArmoredKey, SymmetricKey};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(UserId);
string_id!(ShareId);
string_id!(
    /// Server item identifier.
    ItemId
);
string_id!(VaultId);
string_id!(AddressId);
string_id!(
    /// Identifies one rotation of the legacy asymmetric vault/item keys.
    RotationId
);

impl ItemId {
    /// Random hex identifier (16 bytes).
    pub fn generate() -> Self {
        Self(random_hex())
    }
}

impl RotationId {
    pub fn generate() -> Self {
        Self(random_hex())
    }
}

pub(crate) fn random_hex() -> String {
    let mut bytes = [0u8; 16];
    rand_core::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// Wire-form symmetric keys
// ---------------------------------------------------------------------------

/// A share key at one rotation, as delivered by the server.
///
/// `key` is a base64 binary message encrypted to the user key `user_key_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShareKey {
    pub key_rotation: i64,
    pub key: String,
    #[serde(rename = "UserKeyID")]
    pub user_key_id: String,
    pub create_time: i64,
}

/// A server share key whose plaintext has been re-sealed under the local key.
///
/// `encrypted_key` is base64 of `seal_local(raw 32-byte share key)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymmetricallyEncryptedShareKey {
    pub encrypted_key: String,
    pub share_id: ShareId,
    pub user_id: UserId,
    pub share_key: ShareKey,
}

/// An item key as delivered by the server.
///
/// `key` is base64 of an AEAD ciphertext under the share key of
/// `key_rotation`, sealed with the item-key context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemKey {
    pub key_rotation: i64,
    pub key: String,
}

// ---------------------------------------------------------------------------
// Decrypted keys
// ---------------------------------------------------------------------------

/// Anything carrying a rotation number and 32 bytes of key material.
pub trait RotatedKey {
    fn key_rotation(&self) -> i64;
    fn key_data(&self) -> &SymmetricKey;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedShareKey {
    pub share_id: ShareId,
    pub key_rotation: i64,
    pub key_data: SymmetricKey,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedItemKey {
    pub share_id: ShareId,
    pub item_id: ItemId,
    pub key_rotation: i64,
    pub key_data: SymmetricKey,
}

impl RotatedKey for DecryptedShareKey {
    fn key_rotation(&self) -> i64 {
        self.key_rotation
    }

    fn key_data(&self) -> &SymmetricKey {
        &self.key_data
    }
}

impl RotatedKey for DecryptedItemKey {
    fn key_rotation(&self) -> i64 {
        self.key_rotation
    }

    fn key_data(&self) -> &SymmetricKey {
        &self.key_data
    }
}

// ---------------------------------------------------------------------------
// Legacy asymmetric vault hierarchy
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VaultKey {
    #[serde(rename = "RotationID")]
    pub rotation_id: RotationId,
    pub rotation: i64,
    /// Armored private key.
    pub key: ArmoredKey,
    /// Base64 binary message, encrypted to the address key.
    pub key_passphrase: Option<String>,
    /// Base64 binary signature by the share signing key over this key's fingerprint.
    pub key_signature: String,
    pub create_time: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyItemKey {
    #[serde(rename = "RotationID")]
    pub rotation_id: RotationId,
    pub key: ArmoredKey,
    /// Base64 binary message, encrypted to the vault key.
    pub key_passphrase: Option<String>,
    pub key_signature: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Share {
    #[serde(rename = "ShareID")]
    pub share_id: ShareId,
    #[serde(rename = "VaultID")]
    pub vault_id: VaultId,
    #[serde(rename = "AddressID")]
    pub address_id: AddressId,
    /// Armored signing key of the vault. Only its public half is used here.
    pub signing_key: ArmoredKey,
    /// Base64 binary message, encrypted to the address key.
    pub signing_key_passphrase: Option<String>,
    /// Base64 binary signature by the address key over the signing key fingerprint.
    pub acceptance_signature: String,
    pub content: Option<String>,
    pub content_key_rotation: Option<i64>,
    pub create_time: i64,
}

// ---------------------------------------------------------------------------
// Item revisions
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    Active = 1,
    Trashed = 2,
}

impl From<i16> for ItemState {
    /// Unknown values decode as `Active`.
    fn from(value: i16) -> Self {
        match value {
            2 => ItemState::Trashed,
            _ => ItemState::Active,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::Active => write!(f, "ACTIVE"),
            ItemState::Trashed => write!(f, "TRASHED"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemRevision {
    #[serde(rename = "ItemID")]
    pub item_id: ItemId,
    pub revision: i64,
    pub content_format_version: i16,
    /// Rotation of the vault/item keys this revision was encrypted under.
    #[serde(rename = "RotationID")]
    pub rotation_id: RotationId,
    /// Base64 binary message encrypted to the vault key.
    pub content: String,
    /// Base64 binary message (vault key) wrapping the address-key signature.
    pub user_signature: String,
    /// Base64 binary message (vault key) wrapping the item-key signature.
    pub item_key_signature: String,
    pub state: i16,
    pub signature_email: String,
    pub alias_email: Option<String>,
    pub create_time: i64,
    pub modify_time: i64,
    pub revision_time: i64,
}

impl ItemRevision {
    pub fn item_state(&self) -> ItemState {
        ItemState::from(self.state)
    }
}

// ---------------------------------------------------------------------------
// User keys
// ---------------------------------------------------------------------------

/// One of the user's own asymmetric keys. Server share keys are encrypted to these.
#[derive(Clone)]
pub struct UserKey {
    pub key_id: String,
    pub private_key: ArmoredKey,
    pub passphrase: String,
    pub active: bool,
}

impl fmt::Debug for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserKey")
            .field("key_id", &self.key_id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_state_decoding() {
        assert_eq!(ItemState::from(1), ItemState::Active);
        assert_eq!(ItemState::from(2), ItemState::Trashed);
        assert_eq!(ItemState::from(99), ItemState::Active);
    }

    #[test]
    fn test_share_key_wire_names() {
        let json = r#"{"KeyRotation":3,"Key":"AAAA","UserKeyID":"uk","CreateTime":10}"#;
        let key: ShareKey = serde_json::from_str(json).unwrap();
        assert_eq!(key.key_rotation, 3);
        assert_eq!(key.user_key_id, "uk");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(ItemId::generate(), ItemId::generate());
        assert_eq!(RotationId::generate().as_str().len(), 32);
    }
}
