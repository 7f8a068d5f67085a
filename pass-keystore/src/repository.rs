//! Collaborators: where encrypted key material comes from.
//!
//! The key manager only sees [`ShareKeyRepository`], [`ItemKeyDatasource`]
//! and [`SymmetricKeyProvider`]. [`ShareKeyStore`] is the repository used in
//! production wiring: local store first, remote refresh when empty or on
//! request (a rotation the local store does not know yet), each
//! remote key unwrapped with the user's keys and re-sealed under the local
//! key before it is stored.
//!
//! In-memory implementations are provided for testing and ephemeral use.

use crate::audit::{AuditAction, AuditEvent, AuditSinkSync};
use crate::error::{KeystoreError, Result, SignatureKind};
use crate::types::*;

use async_trait::async_trait;
use pass_crypto::{CryptoEngine, CryptoError, CryptoUtils, DecryptionKey, SymmetricKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

// ---------------------------------------------------------------------------
// Traits consumed by the key manager
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ShareKeyRepository: Send + Sync {
    /// All known rotations of the share's keys, not just the latest.
    async fn get_keys(
        &self,
        user_id: &UserId,
        share_id: &ShareId,
    ) -> Result<Vec<SymmetricallyEncryptedShareKey>>;

    /// Re-fetch from the source of truth so that newly published rotations
    /// become visible. Sources with nothing behind them return `get_keys`.
    async fn refresh_keys(
        &self,
        user_id: &UserId,
        share_id: &ShareId,
    ) -> Result<Vec<SymmetricallyEncryptedShareKey>> {
        self.get_keys(user_id, share_id).await
    }
}

#[async_trait]
pub trait ItemKeyDatasource: Send + Sync {
    /// The item's key at its highest rotation.
    async fn get_latest_key(
        &self,
        user_id: &UserId,
        share_id: &ShareId,
        item_id: &ItemId,
    ) -> Result<ItemKey>;
}

/// Supplies the device-local key. May prompt for biometrics or a PIN.
#[async_trait]
pub trait SymmetricKeyProvider: Send + Sync {
    async fn symmetric_key(&self) -> Result<SymmetricKey>;
}

// ---------------------------------------------------------------------------
// Traits beneath the repository
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RemoteShareKeyDatasource: Send + Sync {
    async fn get_keys(&self, user_id: &UserId, share_id: &ShareId) -> Result<Vec<ShareKey>>;
}

#[async_trait]
pub trait LocalShareKeyDatasource: Send + Sync {
    async fn get_keys(
        &self,
        user_id: &UserId,
        share_id: &ShareId,
    ) -> Result<Vec<SymmetricallyEncryptedShareKey>>;
    async fn upsert_keys(&self, keys: &[SymmetricallyEncryptedShareKey]) -> Result<()>;
    /// Returns how many keys were removed.
    async fn remove_all_keys(&self, user_id: &UserId) -> Result<usize>;
}

/// The user's own keys, unlocked with their passphrases.
#[async_trait]
pub trait UserKeyProvider: Send + Sync {
    async fn user_keys(&self, user_id: &UserId) -> Result<Vec<UserKey>>;
}

// ---------------------------------------------------------------------------
// Share key store (repository implementation)
// ---------------------------------------------------------------------------

pub struct ShareKeyStore<E: CryptoEngine> {
    local: Arc<dyn LocalShareKeyDatasource>,
    remote: Arc<dyn RemoteShareKeyDatasource>,
    user_keys: Arc<dyn UserKeyProvider>,
    symmetric_key: Arc<dyn SymmetricKeyProvider>,
    crypto: CryptoUtils<E>,
    audit: Arc<dyn AuditSinkSync>,
}

impl<E: CryptoEngine> ShareKeyStore<E> {
    pub fn new(
        local: Arc<dyn LocalShareKeyDatasource>,
        remote: Arc<dyn RemoteShareKeyDatasource>,
        user_keys: Arc<dyn UserKeyProvider>,
        symmetric_key: Arc<dyn SymmetricKeyProvider>,
        engine: E,
        audit: Arc<dyn AuditSinkSync>,
    ) -> Self {
        Self {
            local,
            remote,
            user_keys,
            symmetric_key,
            crypto: CryptoUtils::new(engine),
            audit,
        }
    }

    /// Drop every locally stored key of `user_id`.
    pub async fn delete_user_keys(&self, user_id: &UserId) -> Result<()> {
        let count = self.local.remove_all_keys(user_id).await?;
        self.audit.record(
            AuditEvent::system_event(AuditAction::LocalKeysDeleted { count }).with_user(user_id),
        );
        Ok(())
    }

    /// Decrypt a server share key with the user's keys. The key must be
    /// signed by one of those same keys.
    fn unwrap_remote(&self, key: &ShareKey, user_keys: &[UserKey]) -> Result<Vec<u8>> {
        let owner = user_keys
            .iter()
            .find(|k| k.key_id == key.user_key_id)
            .filter(|k| k.active)
            .ok_or_else(|| KeystoreError::InactiveUserKey(key.user_key_id.clone()))?;

        let ordered = std::iter::once(owner).chain(user_keys.iter().filter(|k| k.key_id != owner.key_id));
        let mut decryption_keys = Vec::with_capacity(user_keys.len());
        let mut verify_keys = Vec::with_capacity(user_keys.len());
        for k in ordered {
            decryption_keys.push(DecryptionKey::new(k.private_key.clone(), k.passphrase.clone()));
            verify_keys.push(self.crypto.engine().public_key(&k.private_key)?);
        }
        let keyring = self.crypto.engine().build_keyring(&decryption_keys)?;

        self.crypto
            .decrypt_and_verify_field(&key.key, &keyring, &verify_keys, None)
            .map_err(|e| match e {
                CryptoError::SignatureMismatch => {
                    KeystoreError::SignatureVerificationFailure(SignatureKind::ShareKey)
                }
                other => other.into(),
            })
    }
}

#[async_trait]
impl<E: CryptoEngine> ShareKeyRepository for ShareKeyStore<E> {
    async fn get_keys(
        &self,
        user_id: &UserId,
        share_id: &ShareId,
    ) -> Result<Vec<SymmetricallyEncryptedShareKey>> {
        let keys = self.local.get_keys(user_id, share_id).await?;
        if !keys.is_empty() {
            return Ok(keys);
        }
        self.refresh_keys(user_id, share_id).await
    }

    /// Fetch from remote, unwrap, re-seal locally and store. Returns the stored keys.
    async fn refresh_keys(
        &self,
        user_id: &UserId,
        share_id: &ShareId,
    ) -> Result<Vec<SymmetricallyEncryptedShareKey>> {
        let remote_keys = self.remote.get_keys(user_id, share_id).await?;
        let user_keys = self.user_keys.user_keys(user_id).await?;
        let local_key = self.symmetric_key.symmetric_key().await?;

        let mut sealed = Vec::with_capacity(remote_keys.len());
        for key in remote_keys {
            let raw = self.unwrap_remote(&key, &user_keys)?;
            sealed.push(SymmetricallyEncryptedShareKey::seal(
                user_id.clone(),
                share_id.clone(),
                key,
                &raw,
                &local_key,
            )?);
        }

        self.local.upsert_keys(&sealed).await?;
        self.audit.record(AuditEvent::share_event(
            user_id,
            share_id,
            AuditAction::ShareKeysRefreshed { count: sealed.len() },
        ));
        Ok(sealed)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// In-memory local store, keyed by (user, share, rotation).
pub struct InMemoryShareKeyStore {
    keys: RwLock<HashMap<(UserId, ShareId, i64), SymmetricallyEncryptedShareKey>>,
}

impl InMemoryShareKeyStore {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }
}

impl Default for InMemoryShareKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalShareKeyDatasource for InMemoryShareKeyStore {
    async fn get_keys(
        &self,
        user_id: &UserId,
        share_id: &ShareId,
    ) -> Result<Vec<SymmetricallyEncryptedShareKey>> {
        let keys = self.keys.read().await;
        let mut out: Vec<_> = keys
            .values()
            .filter(|k| &k.user_id == user_id && &k.share_id == share_id)
            .cloned()
            .collect();
        out.sort_by_key(|k| k.share_key.key_rotation);
        Ok(out)
    }

    async fn upsert_keys(&self, new_keys: &[SymmetricallyEncryptedShareKey]) -> Result<()> {
        let mut keys = self.keys.write().await;
        for k in new_keys {
            keys.insert(
                (k.user_id.clone(), k.share_id.clone(), k.share_key.key_rotation),
                k.clone(),
            );
        }
        Ok(())
    }

    async fn remove_all_keys(&self, user_id: &UserId) -> Result<usize> {
        let mut keys = self.keys.write().await;
        let before = keys.len();
        keys.retain(|(u, _, _), _| u != user_id);
        Ok(before - keys.len())
    }
}

/// Repository over a fixed set of already re-sealed keys.
#[derive(Default)]
pub struct InMemoryShareKeyRepository {
    store: InMemoryShareKeyStore,
}

impl InMemoryShareKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: SymmetricallyEncryptedShareKey) -> Result<()> {
        self.store.upsert_keys(&[key]).await
    }
}

#[async_trait]
impl ShareKeyRepository for InMemoryShareKeyRepository {
    async fn get_keys(
        &self,
        user_id: &UserId,
        share_id: &ShareId,
    ) -> Result<Vec<SymmetricallyEncryptedShareKey>> {
        self.store.get_keys(user_id, share_id).await
    }
}

/// Remote share keys served from memory.
#[derive(Default)]
pub struct InMemoryRemoteShareKeys {
    keys: RwLock<HashMap<ShareId, Vec<ShareKey>>>,
}

impl InMemoryRemoteShareKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, share_id: ShareId, key: ShareKey) {
        self.keys.write().await.entry(share_id).or_default().push(key);
    }
}

#[async_trait]
impl RemoteShareKeyDatasource for InMemoryRemoteShareKeys {
    async fn get_keys(&self, _user_id: &UserId, share_id: &ShareId) -> Result<Vec<ShareKey>> {
        Ok(self.keys.read().await.get(share_id).cloned().unwrap_or_default())
    }
}

/// Latest item keys served from memory.
#[derive(Default)]
pub struct InMemoryItemKeys {
    keys: RwLock<HashMap<(ShareId, ItemId), ItemKey>>,
}

impl InMemoryItemKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the item's latest key (a rotation).
    pub async fn set_latest(&self, share_id: ShareId, item_id: ItemId, key: ItemKey) {
        self.keys.write().await.insert((share_id, item_id), key);
    }
}

#[async_trait]
impl ItemKeyDatasource for InMemoryItemKeys {
    async fn get_latest_key(
        &self,
        _user_id: &UserId,
        share_id: &ShareId,
        item_id: &ItemId,
    ) -> Result<ItemKey> {
        self.keys
            .read()
            .await
            .get(&(share_id.clone(), item_id.clone()))
            .cloned()
            .ok_or_else(|| KeystoreError::Datasource(format!("no item key for {}/{}", share_id, item_id)))
    }
}

/// Always hands out the same key.
pub struct StaticSymmetricKeyProvider {
    key: SymmetricKey,
}

impl StaticSymmetricKeyProvider {
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl SymmetricKeyProvider for StaticSymmetricKeyProvider {
    async fn symmetric_key(&self) -> Result<SymmetricKey> {
        Ok(self.key.clone())
    }
}

/// Fixed user keys for every user id.
pub struct StaticUserKeys {
    keys: Vec<UserKey>,
}

impl StaticUserKeys {
    pub fn new(keys: Vec<UserKey>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl UserKeyProvider for StaticUserKeys {
    async fn user_keys(&self, _user_id: &UserId) -> Result<Vec<UserKey>> {
        Ok(self.keys.clone())
    }
}
