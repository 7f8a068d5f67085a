//! Creating key material: new vaults, item revisions, and new-format item keys.
//!
//! Everything produced here is exactly what [`ItemDecryptor`](crate::pipeline::ItemDecryptor)
//! and [`KeyManager`](crate::manager::KeyManager) consume.

use chrono::Utc;
use pass_crypto::symmetric::{decode_base64, encode_base64, open, seal};
use pass_crypto::{ArmoredKey, AssociatedData, CryptoEngine, CryptoUtils, DecryptionKey, SymmetricKey};

use crate::content::ItemContentPayload;
use crate::error::{KeystoreError, Result};
use crate::types::*;

/// The user's address key, unlocked by its passphrase.
#[derive(Clone, Debug)]
pub struct AddressKey {
    pub address_id: AddressId,
    pub key: DecryptionKey,
}

/// Key hierarchy of a freshly created vault.
#[derive(Clone, Debug)]
pub struct ProvisionedVault {
    pub share: Share,
    pub vault_key: VaultKey,
    pub item_key: LegacyItemKey,
}

pub struct VaultProvisioner<E: CryptoEngine> {
    crypto: CryptoUtils<E>,
}

impl<E: CryptoEngine> VaultProvisioner<E> {
    pub fn new(engine: E) -> Self {
        Self {
            crypto: CryptoUtils::new(engine),
        }
    }

    /// Generate the signing, vault and item keys of a new vault and bind them
    /// to `address`.
    pub fn create_vault(
        &self,
        address: &AddressKey,
        share_id: ShareId,
        vault_id: VaultId,
        vault_name: &str,
    ) -> Result<ProvisionedVault> {
        let engine = self.crypto.engine();
        let address_keyring = engine.build_keyring(std::slice::from_ref(&address.key))?;
        let address_public = engine.public_key(&address.key.private_key)?;
        let now = Utc::now().timestamp();

        // signing key, accepted by the address key
        let (signing_key, signing_passphrase) =
            self.crypto.generate_key_pair("VaultSigningKey", "vault_signing@pass")?;
        let signing_keyring =
            engine.build_keyring(&[DecryptionKey::new(signing_key.clone(), signing_passphrase.clone())])?;
        let acceptance_signature = self.sign_fingerprint(&signing_key, &address_keyring)?;
        let signing_key_passphrase =
            self.crypto.encrypt_field(signing_passphrase.as_bytes(), &address_public)?;

        // vault key, signed by the signing key
        let (vault_key, vault_passphrase) = self.crypto.generate_key_pair("VaultKey", "vault@pass")?;
        let vault_public = engine.public_key(&vault_key)?;
        let vault_key_signature = self.sign_fingerprint(&vault_key, &signing_keyring)?;
        let vault_key_passphrase =
            self.crypto.encrypt_field(vault_passphrase.as_bytes(), &address_public)?;

        // item key, passphrase readable by the vault key
        let (item_key, item_passphrase) = self.crypto.generate_key_pair("ItemKey", "item@pass")?;
        let item_key_signature = self.sign_fingerprint(&item_key, &signing_keyring)?;
        let item_key_passphrase = self.crypto.encrypt_field(item_passphrase.as_bytes(), &vault_public)?;

        let rotation_id = RotationId::generate();
        let content = self.crypto.encrypt_field(vault_name.as_bytes(), &vault_public)?;

        Ok(ProvisionedVault {
            share: Share {
                share_id,
                vault_id,
                address_id: address.address_id.clone(),
                signing_key,
                signing_key_passphrase: Some(signing_key_passphrase),
                acceptance_signature,
                content: Some(content),
                content_key_rotation: Some(1),
                create_time: now,
            },
            vault_key: VaultKey {
                rotation_id: rotation_id.clone(),
                rotation: 1,
                key: vault_key,
                key_passphrase: Some(vault_key_passphrase),
                key_signature: vault_key_signature,
                create_time: now,
            },
            item_key: LegacyItemKey {
                rotation_id,
                key: item_key,
                key_passphrase: Some(item_key_passphrase),
                key_signature: item_key_signature,
            },
        })
    }

    /// Encrypt `payload` as a revision of `vault`, signed by the item key and by `author`.
    pub fn create_item_revision(
        &self,
        vault: &ProvisionedVault,
        author: &AddressKey,
        item_id: ItemId,
        payload: &ItemContentPayload,
        signature_email: &str,
    ) -> Result<ItemRevision> {
        let engine = self.crypto.engine();
        let author_keyring = engine.build_keyring(std::slice::from_ref(&author.key))?;

        let vault_passphrase = self.crypto.decrypt_passphrase(
            required(&vault.vault_key.key_passphrase)?,
            &author_keyring,
        )?;
        let vault_keyring =
            engine.build_keyring(&[DecryptionKey::new(vault.vault_key.key.clone(), vault_passphrase)])?;
        let item_passphrase = self
            .crypto
            .decrypt_passphrase(required(&vault.item_key.key_passphrase)?, &vault_keyring)?;
        let item_keyring =
            engine.build_keyring(&[DecryptionKey::new(vault.item_key.key.clone(), item_passphrase)])?;

        let vault_public = engine.public_key(&vault.vault_key.key)?;
        let plaintext = zeroize::Zeroizing::new(payload.to_json()?);

        let item_signature = self.crypto.sign_binary(&plaintext, &item_keyring)?;
        let user_signature = self.crypto.sign_binary(&plaintext, &author_keyring)?;
        let now = Utc::now().timestamp();

        Ok(ItemRevision {
            item_id,
            revision: 1,
            content_format_version: 1,
            rotation_id: vault.vault_key.rotation_id.clone(),
            content: self.crypto.encrypt_field(&plaintext, &vault_public)?,
            user_signature: self.crypto.encrypt_field(&user_signature, &vault_public)?,
            item_key_signature: self.crypto.encrypt_field(&item_signature, &vault_public)?,
            state: 1,
            signature_email: signature_email.to_string(),
            alias_email: None,
            create_time: now,
            modify_time: now,
            revision_time: now,
        })
    }

    /// Base64 detached signature over the key's fingerprint.
    fn sign_fingerprint(&self, key: &ArmoredKey, signer: &E::Keyring) -> Result<String> {
        let fingerprint = self.crypto.fingerprint(key)?;
        Ok(encode_base64(self.crypto.sign_binary(fingerprint.as_bytes(), signer)?))
    }
}

fn required(passphrase: &Option<String>) -> Result<&str> {
    passphrase.as_deref().ok_or(KeystoreError::DecryptionFailure)
}

// ---------------------------------------------------------------------------
// New-format symmetric item keys
// ---------------------------------------------------------------------------

impl ItemKey {
    /// Seal `item_key` under `share_key` for the server.
    pub fn wrap(share_key: &DecryptedShareKey, item_key: &SymmetricKey) -> Result<Self> {
        let sealed = seal(item_key.as_bytes(), &share_key.key_data, AssociatedData::ItemKey)?;
        Ok(Self {
            key_rotation: share_key.key_rotation,
            key: encode_base64(sealed),
        })
    }
}

/// Base64 of the content JSON sealed under the item key.
pub fn encrypt_item_content(payload: &ItemContentPayload, item_key: &DecryptedItemKey) -> Result<String> {
    let json = zeroize::Zeroizing::new(payload.to_json()?);
    let sealed = seal(&json, &item_key.key_data, AssociatedData::ItemContent)?;
    Ok(encode_base64(sealed))
}

pub fn decrypt_item_content(content_b64: &str, item_key: &DecryptedItemKey) -> Result<ItemContentPayload> {
    let sealed = decode_base64(content_b64)?;
    let json = zeroize::Zeroizing::new(open(&sealed, &item_key.key_data, AssociatedData::ItemContent)?);
    ItemContentPayload::from_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ItemData, ItemMetadata};
    use pass_crypto::NativeEngine;

    fn address() -> AddressKey {
        let utils = CryptoUtils::new(NativeEngine::new());
        let (key, passphrase) = utils.generate_key_pair("Ada", "ada@example.com").unwrap();
        AddressKey {
            address_id: AddressId::new("addr"),
            key: DecryptionKey::new(key, passphrase),
        }
    }

    fn payload() -> ItemContentPayload {
        ItemContentPayload {
            metadata: ItemMetadata {
                name: "Wifi".into(),
                note: "".into(),
                item_uuid: "u1".into(),
            },
            content: ItemData::Note,
            custom_fields: vec![],
        }
    }

    // === Vaults ===

    #[test]
    fn test_create_vault_binds_keys() {
        let engine = NativeEngine::new();
        let utils = CryptoUtils::new(engine);
        let address = address();
        let vault = VaultProvisioner::new(engine)
            .create_vault(&address, ShareId::new("s"), VaultId::new("v"), "Personal")
            .unwrap();

        assert_eq!(vault.vault_key.rotation_id, vault.item_key.rotation_id);
        assert_eq!(vault.share.address_id, address.address_id);

        // acceptance signature is the address key over the signing-key fingerprint
        let fp = utils.fingerprint(&vault.share.signing_key).unwrap();
        let sig = decode_base64(&vault.share.acceptance_signature).unwrap();
        assert!(utils.verify_detached_signature(
            &utils.armor_signature(&sig),
            fp.as_bytes(),
            &address.key.private_key,
            None,
        ));

        // vault name is readable with the vault key
        let ring = engine.build_keyring(&[address.key.clone()]).unwrap();
        let vault_pass = utils
            .decrypt_passphrase(vault.vault_key.key_passphrase.as_deref().unwrap(), &ring)
            .unwrap();
        let vault_ring = engine
            .build_keyring(&[DecryptionKey::new(vault.vault_key.key.clone(), vault_pass)])
            .unwrap();
        let name = utils
            .decrypt_field(vault.share.content.as_deref().unwrap(), &vault_ring)
            .unwrap();
        assert_eq!(name, b"Personal");
    }

    #[test]
    fn test_item_revision_missing_passphrase() {
        let engine = NativeEngine::new();
        let address = address();
        let provisioner = VaultProvisioner::new(engine);
        let mut vault = provisioner
            .create_vault(&address, ShareId::new("s"), VaultId::new("v"), "Personal")
            .unwrap();
        vault.vault_key.key_passphrase = None;
        assert_eq!(
            provisioner
                .create_item_revision(&vault, &address, ItemId::generate(), &payload(), "ada@example.com")
                .unwrap_err(),
            KeystoreError::DecryptionFailure
        );
    }

    // === New-format item keys ===

    #[test]
    fn test_item_key_wrap_and_content() {
        let share_key = DecryptedShareKey {
            share_id: ShareId::new("s"),
            key_rotation: 5,
            key_data: SymmetricKey::generate().unwrap(),
        };
        let raw = SymmetricKey::generate().unwrap();
        let wrapped = ItemKey::wrap(&share_key, &raw).unwrap();
        assert_eq!(wrapped.key_rotation, 5);

        let sealed = decode_base64(&wrapped.key).unwrap();
        let opened = open(&sealed, &share_key.key_data, AssociatedData::ItemKey).unwrap();
        assert_eq!(opened, raw.as_bytes());

        let item_key = DecryptedItemKey {
            share_id: ShareId::new("s"),
            item_id: ItemId::new("i"),
            key_rotation: 5,
            key_data: raw,
        };
        let content = encrypt_item_content(&payload(), &item_key).unwrap();
        assert_eq!(decrypt_item_content(&content, &item_key).unwrap(), payload());
    }

    #[test]
    fn test_item_content_not_openable_as_item_key() {
        let item_key = DecryptedItemKey {
            share_id: ShareId::new("s"),
            item_id: ItemId::new("i"),
            key_rotation: 1,
            key_data: SymmetricKey::generate().unwrap(),
        };
        let content = encrypt_item_content(&payload(), &item_key).unwrap();
        let sealed = decode_base64(&content).unwrap();
        assert!(open(&sealed, &item_key.key_data, AssociatedData::ItemKey).is_err());
    }
}
