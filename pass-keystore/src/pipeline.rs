//! Item content decryption and verification.
//!
//! A revision is trusted only after the whole chain checks out:
//!
//! ```text
//! address keyring ──accepts──▶ share signing key ──signs──▶ vault key
//!                                         │                    │
//!                                         └──signs──▶ item key  └──decrypts──▶ content
//! ```
//!
//! Steps run strictly in order and the first failure is terminal. Content
//! never leaves [`ItemDecryptor::decrypt`] unless the signing-key acceptance,
//! the item-key signature and (when enforced) the user signature all verify.

use std::sync::Arc;

use futures::future::join_all;
use pass_crypto::symmetric::decode_base64;
use pass_crypto::{ArmoredKey, CryptoEngine, CryptoUtils, DecryptionKey};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditAction, AuditEvent, AuditSinkSync};
use crate::config::{PipelineConfig, UserSignatureCheck};
use crate::content::ItemContentPayload;
use crate::error::{KeystoreError, Result, SignatureKind};
use crate::types::*;

// ---------------------------------------------------------------------------
// Steps and trace
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStep {
    LocateKeys,
    VerifySigningKey,
    UnlockVaultKey,
    BuildVaultKeyring,
    DecryptContent,
    VerifyItemKeySignature,
    VerifyUserSignature,
    ParseContent,
}

/// Steps entered during one run, in order. The last one is where a failure happened.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineTrace {
    steps: Vec<PipelineStep>,
}

impl PipelineTrace {
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn reached(&self, step: PipelineStep) -> bool {
        self.steps.contains(&step)
    }

    pub fn last(&self) -> Option<PipelineStep> {
        self.steps.last().copied()
    }

    fn enter(&mut self, step: PipelineStep) {
        self.steps.push(step);
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything about a vault an item revision is checked against.
pub struct VaultContext<K> {
    pub share: Share,
    pub vault_keys: Vec<VaultKey>,
    pub item_keys: Vec<LegacyItemKey>,
    /// The current user's unlocked address keys.
    pub address_keyring: K,
    /// Verification keys of the revision's author.
    pub verify_keys: Vec<ArmoredKey>,
}

// ---------------------------------------------------------------------------
// Decryptor
// ---------------------------------------------------------------------------

pub struct ItemDecryptor<E: CryptoEngine> {
    crypto: CryptoUtils<E>,
    config: PipelineConfig,
    audit: Arc<dyn AuditSinkSync>,
}

impl<E: CryptoEngine> ItemDecryptor<E> {
    pub fn new(engine: E, config: PipelineConfig, audit: Arc<dyn AuditSinkSync>) -> Self {
        Self {
            crypto: CryptoUtils::new(engine),
            config,
            audit,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn decrypt(
        &self,
        item: &ItemRevision,
        vault: &VaultContext<E::Keyring>,
    ) -> Result<ItemContentPayload> {
        self.decrypt_traced(item, vault).0
    }

    /// Like [`decrypt`](Self::decrypt), also returning the steps that ran.
    pub fn decrypt_traced(
        &self,
        item: &ItemRevision,
        vault: &VaultContext<E::Keyring>,
    ) -> (Result<ItemContentPayload>, PipelineTrace) {
        let mut trace = PipelineTrace::default();
        let result = self.run(item, vault, &mut trace);

        let share_id = &vault.share.share_id;
        match &result {
            Ok(_) => self.audit.record(AuditEvent::item_event(
                share_id,
                &item.item_id,
                AuditAction::ItemVerified,
            )),
            Err(e) => {
                let step = trace.last().unwrap_or(PipelineStep::LocateKeys);
                self.audit.record(
                    AuditEvent::item_event(share_id, &item.item_id, AuditAction::ItemRejected { step })
                        .with_detail(e.to_string())
                        .with_failure(),
                );
            }
        }
        (result, trace)
    }

    fn run(
        &self,
        item: &ItemRevision,
        vault: &VaultContext<E::Keyring>,
        trace: &mut PipelineTrace,
    ) -> Result<ItemContentPayload> {
        let verify_time = self.config.verify_time.resolve();

        trace.enter(PipelineStep::LocateKeys);
        let vault_key = vault
            .vault_keys
            .iter()
            .find(|k| k.rotation_id == item.rotation_id)
            .ok_or_else(|| KeystoreError::KeyNotFound(item.rotation_id.clone()))?;
        let item_key = vault
            .item_keys
            .iter()
            .find(|k| k.rotation_id == item.rotation_id)
            .ok_or_else(|| KeystoreError::KeyNotFound(item.rotation_id.clone()))?;

        trace.enter(PipelineStep::VerifySigningKey);
        self.verify_signing_key(&vault.share, &vault.address_keyring, verify_time)
            .ok_or(KeystoreError::VaultVerificationFailure)?;

        trace.enter(PipelineStep::UnlockVaultKey);
        let vault_passphrase = self
            .unlock_vault_key(&vault.share, vault_key, &vault.address_keyring, verify_time)
            .ok_or(KeystoreError::VaultKeyVerificationFailure)?;

        trace.enter(PipelineStep::BuildVaultKeyring);
        let vault_keyring = self
            .crypto
            .engine()
            .build_keyring(&[DecryptionKey::new(vault_key.key.clone(), vault_passphrase)])
            .map_err(|_| KeystoreError::VaultKeyVerificationFailure)?;

        trace.enter(PipelineStep::DecryptContent);
        let plaintext = zeroize::Zeroizing::new(
            self.crypto
                .decrypt_field(&item.content, &vault_keyring)
                .map_err(|_| KeystoreError::ContentDecryptionFailure)?,
        );

        trace.enter(PipelineStep::VerifyItemKeySignature);
        let item_public = self
            .crypto
            .engine()
            .public_key(&item_key.key)
            .map_err(|_| KeystoreError::SignatureVerificationFailure(SignatureKind::ItemKey))?;
        let signature = self
            .crypto
            .decrypt_field(&item.item_key_signature, &vault_keyring)
            .map_err(|_| KeystoreError::SignatureVerificationFailure(SignatureKind::ItemKey))?;
        if !self.crypto.verify_detached_signature(
            &self.crypto.armor_signature(&signature),
            &plaintext,
            &item_public,
            verify_time,
        ) {
            return Err(KeystoreError::SignatureVerificationFailure(SignatureKind::ItemKey));
        }

        if self.config.user_signature == UserSignatureCheck::Enforce {
            trace.enter(PipelineStep::VerifyUserSignature);
            let signature = self
                .crypto
                .decrypt_field(&item.user_signature, &vault_keyring)
                .map_err(|_| KeystoreError::SignatureVerificationFailure(SignatureKind::User))?;
            let signature = self.crypto.armor_signature(&signature);
            // Author keys may have rotated since signing; validity windows are not checked.
            let verified = vault.verify_keys.iter().any(|key| {
                self.crypto
                    .verify_detached_signature(&signature, &plaintext, key, None)
            });
            if !verified {
                return Err(KeystoreError::SignatureVerificationFailure(SignatureKind::User));
            }
        }

        trace.enter(PipelineStep::ParseContent);
        ItemContentPayload::from_json(&plaintext)
    }

    fn verify_signing_key(
        &self,
        share: &Share,
        address_keyring: &E::Keyring,
        verify_time: Option<u64>,
    ) -> Option<()> {
        let encrypted = share.signing_key_passphrase.as_deref()?;
        self.crypto.decrypt_passphrase(encrypted, address_keyring).ok()?;

        let fingerprint = self.crypto.fingerprint(&share.signing_key).ok()?;
        let signature = decode_base64(&share.acceptance_signature).ok()?;
        self.crypto
            .verify_detached_signature_with_keyring(
                &self.crypto.armor_signature(&signature),
                fingerprint.as_bytes(),
                address_keyring,
                verify_time,
            )
            .then_some(())
    }

    fn unlock_vault_key(
        &self,
        share: &Share,
        vault_key: &VaultKey,
        address_keyring: &E::Keyring,
        verify_time: Option<u64>,
    ) -> Option<String> {
        let fingerprint = self.crypto.fingerprint(&vault_key.key).ok()?;
        let signature = decode_base64(&vault_key.key_signature).ok()?;
        let signed = self.crypto.verify_detached_signature(
            &self.crypto.armor_signature(&signature),
            fingerprint.as_bytes(),
            &share.signing_key,
            verify_time,
        );
        if !signed {
            return None;
        }
        let encrypted = vault_key.key_passphrase.as_deref()?;
        self.crypto.decrypt_passphrase(encrypted, address_keyring).ok()
    }
}

impl<E: CryptoEngine + 'static> ItemDecryptor<E>
where
    E::Keyring: 'static,
{
    /// Decrypt many revisions of one vault, `chunk_size` at a time in parallel.
    ///
    /// Results come back in input order. One item failing does not affect the others.
    pub async fn decrypt_batch(
        self: &Arc<Self>,
        items: Vec<ItemRevision>,
        vault: Arc<VaultContext<E::Keyring>>,
        chunk_size: usize,
    ) -> Vec<Result<ItemContentPayload>> {
        let mut results = Vec::with_capacity(items.len());
        for chunk in items.chunks(chunk_size.max(1)) {
            let tasks = chunk.iter().cloned().map(|item| {
                let this = Arc::clone(self);
                let vault = Arc::clone(&vault);
                tokio::task::spawn_blocking(move || this.decrypt(&item, &vault))
            });
            for joined in join_all(tasks).await {
                results.push(joined.unwrap_or_else(|e| {
                    Err(KeystoreError::Datasource(format!("decrypt task failed: {}", e)))
                }));
            }
        }
        results
    }
}
