//! Item content model: the plaintext a revision decrypts to.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ItemId, ShareId};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub name: String,
    pub note: String,
    pub item_uuid: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemData {
    Login {
        username: String,
        password: String,
        #[serde(default)]
        urls: Vec<String>,
        #[serde(default)]
        totp_uri: String,
    },
    Alias,
    Note,
    CreditCard {
        cardholder_name: String,
        card_type: CardType,
        number: String,
        verification_number: String,
        expiration_date: String,
        #[serde(default)]
        pin: String,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    #[default]
    Unspecified,
    Other,
    Visa,
    Mastercard,
    AmericanExpress,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomFieldKind {
    Text,
    Hidden,
    Totp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub title: String,
    pub kind: CustomFieldKind,
    pub content: String,
}

/// Serialized form of an item's plaintext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemContentPayload {
    pub metadata: ItemMetadata,
    pub content: ItemData,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

impl ItemContentPayload {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn is_login(&self) -> bool {
        matches!(self.content, ItemData::Login { .. })
    }
}

/// Decrypted content attached to the share and item it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemContent {
    pub share_id: ShareId,
    pub item_id: ItemId,
    pub name: String,
    pub note: String,
    pub item_uuid: String,
    pub content: ItemData,
    pub custom_fields: Vec<CustomField>,
}

impl ItemContent {
    pub fn new(share_id: ShareId, item_id: ItemId, payload: ItemContentPayload) -> Self {
        let ItemContentPayload {
            metadata,
            content,
            custom_fields,
        } = payload;
        Self {
            share_id,
            item_id,
            name: metadata.name,
            note: metadata.note,
            item_uuid: metadata.item_uuid,
            content,
            custom_fields,
        }
    }

    pub fn payload(&self) -> ItemContentPayload {
        ItemContentPayload {
            metadata: ItemMetadata {
                name: self.name.clone(),
                note: self.note.clone(),
                item_uuid: self.item_uuid.clone(),
            },
            content: self.content.clone(),
            custom_fields: self.custom_fields.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeystoreError;

    fn login() -> ItemContentPayload {
        ItemContentPayload {
            metadata: ItemMetadata {
                name: "Bank".into(),
                note: "".into(),
                item_uuid: "0f3c".into(),
            },
            content: ItemData::Login {
                username: "ada".into(),
                password: "hunter2".into(),
                urls: vec!["https://bank.example".into()],
                totp_uri: "".into(),
            },
            custom_fields: vec![CustomField {
                title: "PIN".into(),
                kind: CustomFieldKind::Hidden,
                content: "0000".into(),
            }],
        }
    }

    #[test]
    fn test_json_shape() {
        let json = String::from_utf8(login().to_json().unwrap()).unwrap();
        assert!(json.contains(r#""type":"login""#));
        assert!(json.contains(r#""kind":"hidden""#));
        assert_eq!(ItemContentPayload::from_json(json.as_bytes()).unwrap(), login());
    }

    #[test]
    fn test_parse_minimal_note() {
        let p = ItemContentPayload::from_json(
            br#"{"metadata":{"name":"n","note":"text","item_uuid":"u"},"content":{"type":"note"}}"#,
        )
        .unwrap();
        assert_eq!(p.content, ItemData::Note);
        assert!(p.custom_fields.is_empty());
        assert!(!p.is_login());
    }

    #[test]
    fn test_parse_garbage_is_content_parse_error() {
        assert!(matches!(
            ItemContentPayload::from_json(b"not json"),
            Err(KeystoreError::ContentParse(_))
        ));
    }

    #[test]
    fn test_item_content_payload_roundtrip() {
        let content = ItemContent::new(ShareId::new("s"), ItemId::new("i"), login());
        assert_eq!(content.name, "Bank");
        assert_eq!(content.payload(), login());
    }
}
