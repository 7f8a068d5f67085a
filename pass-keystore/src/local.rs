//! Device-local re-encryption.
//!
//! Secrets from the server are decrypted once through the full asymmetric
//! chain, then sealed under the local symmetric key so later reads are one
//! AEAD open. The local key is fetched per call and never held here.

use std::sync::Arc;

use pass_crypto::symmetric::{decode_base64, encode_base64, open_local, seal_local};
use pass_crypto::{CryptoEngine, SymmetricKey};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditAction, AuditEvent, AuditSinkSync};
use crate::content::{ItemContent, ItemContentPayload};
use crate::error::{KeystoreError, Result};
use crate::pipeline::{ItemDecryptor, VaultContext};
use crate::repository::SymmetricKeyProvider;
use crate::types::*;

pub const SHARE_KEY_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Share keys
// ---------------------------------------------------------------------------

impl SymmetricallyEncryptedShareKey {
    /// Seal a raw share key under the local key.
    pub fn seal(
        user_id: UserId,
        share_id: ShareId,
        share_key: ShareKey,
        raw_key: &[u8],
        local_key: &SymmetricKey,
    ) -> Result<Self> {
        check_key_len(raw_key)?;
        Ok(Self {
            encrypted_key: encode_base64(seal_local(raw_key, local_key)?),
            share_id,
            user_id,
            share_key,
        })
    }

    pub fn open(&self, local_key: &SymmetricKey) -> Result<DecryptedShareKey> {
        let sealed = decode_base64(&self.encrypted_key)?;
        let raw = zeroize::Zeroizing::new(open_local(&sealed, local_key)?);
        check_key_len(&raw)?;
        Ok(DecryptedShareKey {
            share_id: self.share_id.clone(),
            key_rotation: self.share_key.key_rotation,
            key_data: SymmetricKey::from_slice(&raw)?,
        })
    }
}

fn check_key_len(raw: &[u8]) -> Result<()> {
    if raw.len() != SHARE_KEY_BYTES {
        return Err(KeystoreError::InvalidKeyLength {
            expected: SHARE_KEY_BYTES,
            actual: raw.len(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// A server revision whose verified content is sealed under the local key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymmetricallyEncryptedItem {
    pub share_id: ShareId,
    pub item: ItemRevision,
    /// Base64 of the local-sealed content JSON.
    pub encrypted_content: String,
    pub is_login_item: bool,
}

impl SymmetricallyEncryptedItem {
    pub fn seal(
        share_id: ShareId,
        item: ItemRevision,
        payload: &ItemContentPayload,
        local_key: &SymmetricKey,
    ) -> Result<Self> {
        let json = zeroize::Zeroizing::new(payload.to_json()?);
        Ok(Self {
            share_id,
            item,
            encrypted_content: encode_base64(seal_local(&json, local_key)?),
            is_login_item: payload.is_login(),
        })
    }

    pub fn decrypt_content(&self, local_key: &SymmetricKey) -> Result<ItemContent> {
        let sealed = decode_base64(&self.encrypted_content)
            .map_err(|_| KeystoreError::CorruptedEncryptedContent)?;
        let json = zeroize::Zeroizing::new(open_local(&sealed, local_key)?);
        let payload = ItemContentPayload::from_json(&json)?;
        Ok(ItemContent::new(
            self.share_id.clone(),
            self.item.item_id.clone(),
            payload,
        ))
    }
}

// ---------------------------------------------------------------------------
// Re-encryptor
// ---------------------------------------------------------------------------

/// Verify a server revision once, then keep it only in locally sealed form.
pub struct LocalReencryptor<E: CryptoEngine> {
    decryptor: Arc<ItemDecryptor<E>>,
    symmetric_key: Arc<dyn SymmetricKeyProvider>,
    audit: Arc<dyn AuditSinkSync>,
}

impl<E: CryptoEngine> LocalReencryptor<E> {
    pub fn new(
        decryptor: Arc<ItemDecryptor<E>>,
        symmetric_key: Arc<dyn SymmetricKeyProvider>,
        audit: Arc<dyn AuditSinkSync>,
    ) -> Self {
        Self {
            decryptor,
            symmetric_key,
            audit,
        }
    }

    pub async fn reencrypt(
        &self,
        item: ItemRevision,
        vault: &VaultContext<E::Keyring>,
    ) -> Result<SymmetricallyEncryptedItem> {
        let payload = self.decryptor.decrypt(&item, vault)?;
        let local_key = self.symmetric_key.symmetric_key().await?;
        let share_id = vault.share.share_id.clone();
        let sealed = SymmetricallyEncryptedItem::seal(share_id, item, &payload, &local_key)?;
        self.audit.record(AuditEvent::item_event(
            &sealed.share_id,
            &sealed.item.item_id,
            AuditAction::ItemReencrypted,
        ));
        Ok(sealed)
    }
}
