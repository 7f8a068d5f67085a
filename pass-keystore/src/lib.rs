//! # Pass Keystore
//!
//! Key management for a password manager's share/item key hierarchy.
//!
//! - [`KeyManager`] resolves server-encrypted share keys (cached per user,
//!   share and rotation) and item keys (always fresh).
//! - [`ItemDecryptor`] runs the legacy asymmetric chain for an item revision:
//!   signing-key acceptance, vault key, content, item-key and user signatures.
//! - [`local`] re-seals verified secrets under the device-local key.
//! - [`VaultProvisioner`] creates the key material the other two consume.
//!
//! Built on top of `pass-crypto`.
//!
//! ## Quick Start
//!
//! ```rust
//! use pass_keystore::*;
//! use pass_crypto::SymmetricKey;
//! use std::sync::Arc;
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let local = SymmetricKey::generate().unwrap();
//!     let repo = Arc::new(InMemoryShareKeyRepository::new());
//!     repo.insert(
//!         SymmetricallyEncryptedShareKey::seal(
//!             UserId::new("user"),
//!             ShareId::new("share"),
//!             ShareKey {
//!                 key_rotation: 1,
//!                 key: String::new(),
//!                 user_key_id: "uk".into(),
//!                 create_time: 0,
//!             },
//!             &[7u8; 32],
//!             &local,
//!         )
//!         .unwrap(),
//!     )
//!     .await
//!     .unwrap();
//!
//!     let manager = KeyManager::new(
//!         repo,
//!         Arc::new(InMemoryItemKeys::new()),
//!         Arc::new(StaticSymmetricKeyProvider::new(local)),
//!         Arc::new(TracingAuditSink),
//!     );
//!
//!     let key = manager
//!         .get_latest_share_key(&UserId::new("user"), &ShareId::new("share"))
//!         .await
//!         .unwrap();
//!     assert_eq!(key.key_rotation, 1);
//! });
//! ```

pub mod audit;
pub mod config;
pub mod content;
pub mod error;
pub mod local;
pub mod manager;
pub mod pipeline;
pub mod provision;
pub mod repository;
pub mod types;

pub use audit::{AuditAction, AuditEvent, AuditSinkSync, InMemoryAuditSink, TracingAuditSink};
pub use config::{ManagerConfig, PipelineConfig, UserSignatureCheck, VerifyTimeSource};
pub use content::{CardType, CustomField, CustomFieldKind, ItemContent, ItemContentPayload, ItemData, ItemMetadata};
pub use error::{ErrorClass, KeystoreError, SignatureKind};
pub use local::{LocalReencryptor, SymmetricallyEncryptedItem};
pub use manager::KeyManager;
pub use pipeline::{ItemDecryptor, PipelineStep, PipelineTrace, VaultContext};
pub use provision::{decrypt_item_content, encrypt_item_content, AddressKey, ProvisionedVault, VaultProvisioner};
pub use repository::{
    InMemoryItemKeys, InMemoryRemoteShareKeys, InMemoryShareKeyRepository, InMemoryShareKeyStore,
    ItemKeyDatasource, LocalShareKeyDatasource, RemoteShareKeyDatasource, ShareKeyRepository,
    ShareKeyStore, StaticSymmetricKeyProvider, StaticUserKeys, SymmetricKeyProvider, UserKeyProvider,
};
pub use types::*;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pass_crypto::symmetric::{decode_base64, encode_base64};
    use pass_crypto::{CryptoEngine, CryptoUtils, DecryptionKey, Keyring, NativeEngine, SymmetricKey};
    use std::sync::Arc;

    struct Vault {
        provisioner: VaultProvisioner<NativeEngine>,
        address: AddressKey,
        provisioned: ProvisionedVault,
    }

    fn address_key(name: &str) -> AddressKey {
        let utils = CryptoUtils::new(NativeEngine::new());
        let (key, passphrase) = utils
            .generate_key_pair(name, &format!("{}@example.com", name))
            .unwrap();
        AddressKey {
            address_id: AddressId::new(format!("addr-{}", name)),
            key: DecryptionKey::new(key, passphrase),
        }
    }

    fn new_vault() -> Vault {
        let provisioner = VaultProvisioner::new(NativeEngine::new());
        let address = address_key("ada");
        let provisioned = provisioner
            .create_vault(&address, ShareId::new("share"), VaultId::new("vault"), "Personal")
            .unwrap();
        Vault {
            provisioner,
            address,
            provisioned,
        }
    }

    fn context(vault: &Vault) -> VaultContext<Keyring> {
        let engine = NativeEngine::new();
        VaultContext {
            share: vault.provisioned.share.clone(),
            vault_keys: vec![vault.provisioned.vault_key.clone()],
            item_keys: vec![vault.provisioned.item_key.clone()],
            address_keyring: engine.build_keyring(&[vault.address.key.clone()]).unwrap(),
            verify_keys: vec![engine.public_key(&vault.address.key.private_key).unwrap()],
        }
    }

    fn login() -> ItemContentPayload {
        ItemContentPayload {
            metadata: ItemMetadata {
                name: "Mail".into(),
                note: "".into(),
                item_uuid: "uuid-1".into(),
            },
            content: ItemData::Login {
                username: "ada".into(),
                password: "correct horse".into(),
                urls: vec!["https://mail.example".into()],
                totp_uri: "".into(),
            },
            custom_fields: vec![],
        }
    }

    fn revision(vault: &Vault) -> ItemRevision {
        vault
            .provisioner
            .create_item_revision(
                &vault.provisioned,
                &vault.address,
                ItemId::new("item"),
                &login(),
                "ada@example.com",
            )
            .unwrap()
    }

    fn decryptor(config: PipelineConfig) -> (ItemDecryptor<NativeEngine>, Arc<InMemoryAuditSink>) {
        let audit = Arc::new(InMemoryAuditSink::new());
        (ItemDecryptor::new(NativeEngine::new(), config, audit.clone()), audit)
    }

    // === Pipeline ===

    #[test]
    fn test_valid_item_runs_every_step() {
        let vault = new_vault();
        let (decryptor, _) = decryptor(PipelineConfig::default());
        let (result, trace) = decryptor.decrypt_traced(&revision(&vault), &context(&vault));
        assert_eq!(result.unwrap(), login());
        assert_eq!(
            trace.steps(),
            &[
                PipelineStep::LocateKeys,
                PipelineStep::VerifySigningKey,
                PipelineStep::UnlockVaultKey,
                PipelineStep::BuildVaultKeyring,
                PipelineStep::DecryptContent,
                PipelineStep::VerifyItemKeySignature,
                PipelineStep::VerifyUserSignature,
                PipelineStep::ParseContent,
            ]
        );
    }

    #[test]
    fn test_unknown_rotation() {
        let vault = new_vault();
        let (decryptor, _) = decryptor(PipelineConfig::default());
        let mut item = revision(&vault);
        item.rotation_id = RotationId::new("other");
        assert_eq!(
            decryptor.decrypt(&item, &context(&vault)).unwrap_err(),
            KeystoreError::KeyNotFound(RotationId::new("other"))
        );
    }

    #[test]
    fn test_acceptance_by_foreign_address_rejected() {
        let vault = new_vault();
        let (decryptor, audit) = decryptor(PipelineConfig::default());

        // acceptance signature made by someone else's address key
        let mallory = address_key("mallory");
        let engine = NativeEngine::new();
        let utils = CryptoUtils::new(engine);
        let ring = engine.build_keyring(&[mallory.key.clone()]).unwrap();
        let fp = utils.fingerprint(&vault.provisioned.share.signing_key).unwrap();
        let mut ctx = context(&vault);
        ctx.share.acceptance_signature = encode_base64(utils.sign_binary(fp.as_bytes(), &ring).unwrap());

        let (result, trace) = decryptor.decrypt_traced(&revision(&vault), &ctx);
        assert_eq!(result.unwrap_err(), KeystoreError::VaultVerificationFailure);
        assert_eq!(trace.last(), Some(PipelineStep::VerifySigningKey));
        assert!(!trace.reached(PipelineStep::DecryptContent));

        let events = futures::executor::block_on(audit.events());
        assert_eq!(
            events.last().unwrap().action,
            AuditAction::ItemRejected {
                step: PipelineStep::VerifySigningKey
            }
        );
    }

    #[test]
    fn test_vault_key_signature_mismatch() {
        let vault = new_vault();
        let other = new_vault();
        let (decryptor, _) = decryptor(PipelineConfig::default());
        let mut ctx = context(&vault);
        ctx.vault_keys[0].key_signature = other.provisioned.vault_key.key_signature.clone();
        assert_eq!(
            decryptor.decrypt(&revision(&vault), &ctx).unwrap_err(),
            KeystoreError::VaultKeyVerificationFailure
        );
    }

    #[test]
    fn test_item_key_signature_swapped() {
        let vault = new_vault();
        let (decryptor, _) = decryptor(PipelineConfig::default());
        let mut item = revision(&vault);
        // the user signature is a valid signature, just not by the item key
        item.item_key_signature = item.user_signature.clone();
        let (result, trace) = decryptor.decrypt_traced(&item, &context(&vault));
        assert_eq!(
            result.unwrap_err(),
            KeystoreError::SignatureVerificationFailure(SignatureKind::ItemKey)
        );
        assert!(!trace.reached(PipelineStep::ParseContent));
    }

    #[test]
    fn test_unknown_author_rejected_unless_skipped() {
        let vault = new_vault();
        let stranger = address_key("stranger");
        let mut ctx = context(&vault);
        ctx.verify_keys = vec![NativeEngine::new()
            .public_key(&stranger.key.private_key)
            .unwrap()];
        let item = revision(&vault);

        let (enforcing, _) = decryptor(PipelineConfig::default());
        assert_eq!(
            enforcing.decrypt(&item, &ctx).unwrap_err(),
            KeystoreError::SignatureVerificationFailure(SignatureKind::User)
        );

        let (skipping, _) = decryptor(PipelineConfig {
            user_signature: UserSignatureCheck::Skip,
            ..PipelineConfig::default()
        });
        let (result, trace) = skipping.decrypt_traced(&item, &ctx);
        assert_eq!(result.unwrap(), login());
        assert!(!trace.reached(PipelineStep::VerifyUserSignature));
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        #[test]
        fn test_content_tamper_never_returns_content(
            idx in proptest::prelude::any::<proptest::sample::Index>(),
            bit in 0u8..8,
        ) {
            let vault = new_vault();
            let (decryptor, _) = decryptor(PipelineConfig::default());
            let item = revision(&vault);
            let mut bytes = decode_base64(&item.content).unwrap();
            let i = idx.index(bytes.len());
            bytes[i] ^= 1 << bit;
            let mut bad = item.clone();
            bad.content = encode_base64(&bytes);

            let (result, trace) = decryptor.decrypt_traced(&bad, &context(&vault));
            proptest::prop_assert!(matches!(
                result,
                Err(KeystoreError::ContentDecryptionFailure)
                    | Err(KeystoreError::SignatureVerificationFailure(_))
            ));
            proptest::prop_assert!(!trace.reached(PipelineStep::ParseContent));
        }
    }

    // === Local re-encryption ===

    #[tokio::test]
    async fn test_reencrypt_then_read_locally() {
        let vault = new_vault();
        let local = SymmetricKey::generate().unwrap();
        let audit = Arc::new(InMemoryAuditSink::new());
        let reencryptor = LocalReencryptor::new(
            Arc::new(ItemDecryptor::new(NativeEngine::new(), PipelineConfig::default(), audit.clone())),
            Arc::new(StaticSymmetricKeyProvider::new(local.clone())),
            audit.clone(),
        );

        let sealed = reencryptor.reencrypt(revision(&vault), &context(&vault)).await.unwrap();
        assert!(sealed.is_login_item);
        assert_eq!(sealed.share_id, ShareId::new("share"));
        let content = sealed.decrypt_content(&local).unwrap();
        assert_eq!(content.payload(), login());
        assert!(audit
            .events()
            .await
            .iter()
            .any(|e| e.action == AuditAction::ItemReencrypted));
    }

    #[tokio::test]
    async fn test_reencrypt_rejected_item_is_not_sealed() {
        let vault = new_vault();
        let local = SymmetricKey::generate().unwrap();
        let audit = Arc::new(InMemoryAuditSink::new());
        let reencryptor = LocalReencryptor::new(
            Arc::new(ItemDecryptor::new(NativeEngine::new(), PipelineConfig::default(), audit.clone())),
            Arc::new(StaticSymmetricKeyProvider::new(local)),
            audit,
        );
        let mut ctx = context(&vault);
        ctx.share.signing_key_passphrase = None;
        assert_eq!(
            reencryptor.reencrypt(revision(&vault), &ctx).await.unwrap_err(),
            KeystoreError::VaultVerificationFailure
        );
    }

    // === Batch ===

    #[tokio::test]
    async fn test_decrypt_batch_keeps_order_and_isolates_failures() {
        let vault = new_vault();
        let (decryptor, _) = decryptor(PipelineConfig::default());
        let decryptor = Arc::new(decryptor);

        let mut items: Vec<ItemRevision> = (0..5).map(|_| revision(&vault)).collect();
        items[2].rotation_id = RotationId::new("gone");

        let results = decryptor
            .decrypt_batch(items, Arc::new(context(&vault)), 2)
            .await;
        assert_eq!(results.len(), 5);
        for (i, r) in results.iter().enumerate() {
            if i == 2 {
                assert!(matches!(r, Err(KeystoreError::KeyNotFound(_))));
            } else {
                assert_eq!(r.as_ref().unwrap(), &login());
            }
        }
    }
}
