//! Key manager: turns server-encrypted share and item keys into usable keys.
//!
//! Decrypted share keys are cached per `(user, share, rotation)` for the
//! process lifetime. Entries are never evicted one by one; the cache is only
//! wiped wholesale (logout) or per user (account removal). Item keys rotate
//! more often and are fetched fresh on every call.

use std::collections::HashMap;
use std::sync::Arc;

use pass_crypto::symmetric::{decode_base64, open};
use pass_crypto::{AssociatedData, SymmetricKey};
use tokio::sync::RwLock;

use crate::audit::{AuditAction, AuditEvent, AuditSinkSync};
use crate::config::ManagerConfig;
use crate::error::{KeystoreError, Result};
use crate::repository::{ItemKeyDatasource, ShareKeyRepository, SymmetricKeyProvider};
use crate::types::*;

type CacheKey = (UserId, ShareId, i64);

fn find_rotation<'a>(
    keys: &'a [SymmetricallyEncryptedShareKey],
    share_id: &ShareId,
    key_rotation: i64,
) -> Option<&'a SymmetricallyEncryptedShareKey> {
    keys.iter()
        .find(|k| &k.share_id == share_id && k.share_key.key_rotation == key_rotation)
}

pub struct KeyManager {
    share_keys: Arc<dyn ShareKeyRepository>,
    item_keys: Arc<dyn ItemKeyDatasource>,
    symmetric_key: Arc<dyn SymmetricKeyProvider>,
    audit: Arc<dyn AuditSinkSync>,
    config: ManagerConfig,
    cache: RwLock<HashMap<CacheKey, DecryptedShareKey>>,
}

impl KeyManager {
    pub fn new(
        share_keys: Arc<dyn ShareKeyRepository>,
        item_keys: Arc<dyn ItemKeyDatasource>,
        symmetric_key: Arc<dyn SymmetricKeyProvider>,
        audit: Arc<dyn AuditSinkSync>,
    ) -> Self {
        Self::with_config(share_keys, item_keys, symmetric_key, audit, ManagerConfig::default())
    }

    pub fn with_config(
        share_keys: Arc<dyn ShareKeyRepository>,
        item_keys: Arc<dyn ItemKeyDatasource>,
        symmetric_key: Arc<dyn SymmetricKeyProvider>,
        audit: Arc<dyn AuditSinkSync>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            share_keys,
            item_keys,
            symmetric_key,
            audit,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    // === Share keys ===

    /// The share key at `key_rotation`.
    pub async fn get_share_key(
        &self,
        user_id: &UserId,
        share_id: &ShareId,
        key_rotation: i64,
    ) -> Result<DecryptedShareKey> {
        let cache_key = (user_id.clone(), share_id.clone(), key_rotation);
        if let Some(key) = self.cache.read().await.get(&cache_key) {
            return Ok(key.clone());
        }

        let keys = self.share_keys.get_keys(user_id, share_id).await?;
        self.record_fetch(user_id, share_id, &keys);
        if let Some(encrypted) = find_rotation(&keys, share_id, key_rotation) {
            return self.decrypt_and_cache(user_id, encrypted).await;
        }

        // a rotation published after the last refresh; ask once more
        let keys = self.share_keys.refresh_keys(user_id, share_id).await?;
        self.record_fetch(user_id, share_id, &keys);
        let encrypted = find_rotation(&keys, share_id, key_rotation).ok_or_else(|| {
            KeystoreError::KeysNotFound {
                share_id: share_id.clone(),
                key_rotation,
            }
        })?;
        self.decrypt_and_cache(user_id, encrypted).await
    }

    /// The share key with the highest rotation.
    ///
    /// Always refreshes: new content is sealed with this key, so a stale
    /// rotation here would outlive the rotation on the server.
    pub async fn get_latest_share_key(
        &self,
        user_id: &UserId,
        share_id: &ShareId,
    ) -> Result<DecryptedShareKey> {
        let keys = self.share_keys.refresh_keys(user_id, share_id).await?;
        self.record_fetch(user_id, share_id, &keys);
        let latest = keys
            .iter()
            .filter(|k| &k.share_id == share_id)
            .max_by_key(|k| k.share_key.key_rotation)
            .ok_or_else(|| KeystoreError::NoKeysAvailable(share_id.clone()))?;
        self.decrypt_and_cache(user_id, latest).await
    }

    fn record_fetch(&self, user_id: &UserId, share_id: &ShareId, keys: &[SymmetricallyEncryptedShareKey]) {
        self.audit.record(AuditEvent::share_event(
            user_id,
            share_id,
            AuditAction::ShareKeysFetched { count: keys.len() },
        ));
    }

    async fn decrypt_and_cache(
        &self,
        user_id: &UserId,
        encrypted: &SymmetricallyEncryptedShareKey,
    ) -> Result<DecryptedShareKey> {
        let key_rotation = encrypted.share_key.key_rotation;
        let local_key = self.symmetric_key.symmetric_key().await?;
        let decrypted = match encrypted.open(&local_key) {
            Ok(key) => key,
            Err(e) => {
                self.audit.record(
                    AuditEvent::share_event(
                        user_id,
                        &encrypted.share_id,
                        AuditAction::ShareKeyDecryptFailed { key_rotation },
                    )
                    .with_detail(e.to_string())
                    .with_failure(),
                );
                return Err(e);
            }
        };

        let mut cache = self.cache.write().await;
        if let Some(max) = self.config.max_cached_keys {
            if cache.len() >= max {
                let entries = cache.len();
                cache.clear();
                self.audit
                    .record(AuditEvent::system_event(AuditAction::CacheCleared { entries }));
            }
        }
        cache.insert(
            (user_id.clone(), encrypted.share_id.clone(), key_rotation),
            decrypted.clone(),
        );
        drop(cache);

        self.audit.record(AuditEvent::share_event(
            user_id,
            &encrypted.share_id,
            AuditAction::ShareKeyCached { key_rotation },
        ));
        Ok(decrypted)
    }

    // === Item keys ===

    /// The item's latest key, unwrapped with the share key of the same rotation.
    ///
    /// Never cached.
    pub async fn get_latest_item_key(
        &self,
        user_id: &UserId,
        share_id: &ShareId,
        item_id: &ItemId,
    ) -> Result<DecryptedItemKey> {
        let item_key = self
            .item_keys
            .get_latest_key(user_id, share_id, item_id)
            .await?;
        let key_rotation = item_key.key_rotation;
        self.audit.record(AuditEvent::item_event(
            share_id,
            item_id,
            AuditAction::ItemKeyFetched { key_rotation },
        ));

        let share_key = self.get_share_key(user_id, share_id, key_rotation).await?;
        let sealed = decode_base64(&item_key.key)?;
        let raw = match open(&sealed, &share_key.key_data, AssociatedData::ItemKey) {
            Ok(raw) => zeroize::Zeroizing::new(raw),
            Err(e) => {
                self.audit.record(
                    AuditEvent::item_event(
                        share_id,
                        item_id,
                        AuditAction::ItemKeyDecryptFailed { key_rotation },
                    )
                    .with_failure(),
                );
                return Err(e.into());
            }
        };
        let key_data = SymmetricKey::from_slice(&raw).map_err(|_| KeystoreError::InvalidKeyLength {
            expected: 32,
            actual: raw.len(),
        })?;

        self.audit.record(AuditEvent::item_event(
            share_id,
            item_id,
            AuditAction::ItemKeyDecrypted { key_rotation },
        ));
        Ok(DecryptedItemKey {
            share_id: share_id.clone(),
            item_id: item_id.clone(),
            key_rotation,
            key_data,
        })
    }

    // === Cache lifecycle ===

    /// Drop every cached key (logout).
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let entries = cache.len();
        cache.clear();
        drop(cache);
        self.audit
            .record(AuditEvent::system_event(AuditAction::CacheCleared { entries }));
    }

    /// Drop the cached keys of one user (account removal).
    pub async fn clear_user(&self, user_id: &UserId) {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|(u, _, _), _| u != user_id);
        let entries = before - cache.len();
        drop(cache);
        self.audit.record(
            AuditEvent::system_event(AuditAction::CacheCleared { entries }).with_user(user_id),
        );
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::repository::{InMemoryItemKeys, InMemoryShareKeyRepository, StaticSymmetricKeyProvider};

    struct Fixture {
        manager: KeyManager,
        repo: Arc<InMemoryShareKeyRepository>,
        items: Arc<InMemoryItemKeys>,
        local: SymmetricKey,
        audit: Arc<InMemoryAuditSink>,
    }

    fn fixture(config: ManagerConfig) -> Fixture {
        let local = SymmetricKey::generate().unwrap();
        let repo = Arc::new(InMemoryShareKeyRepository::new());
        let items = Arc::new(InMemoryItemKeys::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let manager = KeyManager::with_config(
            repo.clone(),
            items.clone(),
            Arc::new(StaticSymmetricKeyProvider::new(local.clone())),
            audit.clone(),
            config,
        );
        Fixture {
            manager,
            repo,
            items,
            local,
            audit,
        }
    }

    async fn add_share_key(f: &Fixture, user: &str, share: &str, rotation: i64) -> SymmetricKey {
        let raw = SymmetricKey::generate().unwrap();
        let sealed = SymmetricallyEncryptedShareKey::seal(
            UserId::new(user),
            ShareId::new(share),
            ShareKey {
                key_rotation: rotation,
                key: String::new(),
                user_key_id: "uk".into(),
                create_time: 0,
            },
            raw.as_bytes(),
            &f.local,
        )
        .unwrap();
        f.repo.insert(sealed).await.unwrap();
        raw
    }

    // === Share keys ===

    #[tokio::test]
    async fn test_get_share_key_caches() {
        let f = fixture(ManagerConfig::default());
        let raw = add_share_key(&f, "u", "s", 2).await;

        let key = f
            .manager
            .get_share_key(&UserId::new("u"), &ShareId::new("s"), 2)
            .await
            .unwrap();
        assert_eq!(key.key_data, raw);
        assert_eq!(f.manager.cached_len().await, 1);
    }

    #[tokio::test]
    async fn test_get_share_key_missing_rotation() {
        let f = fixture(ManagerConfig::default());
        add_share_key(&f, "u", "s", 1).await;
        let err = f
            .manager
            .get_share_key(&UserId::new("u"), &ShareId::new("s"), 9)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            KeystoreError::KeysNotFound {
                share_id: ShareId::new("s"),
                key_rotation: 9
            }
        );
        assert_eq!(f.manager.cached_len().await, 0);
    }

    #[tokio::test]
    async fn test_latest_share_key_empty() {
        let f = fixture(ManagerConfig::default());
        let err = f
            .manager
            .get_latest_share_key(&UserId::new("u"), &ShareId::new("s"))
            .await
            .unwrap_err();
        assert_eq!(err, KeystoreError::NoKeysAvailable(ShareId::new("s")));
    }

    #[tokio::test]
    async fn test_wrong_local_key_caches_nothing() {
        let f = fixture(ManagerConfig::default());
        let other = SymmetricKey::generate().unwrap();
        let sealed = SymmetricallyEncryptedShareKey::seal(
            UserId::new("u"),
            ShareId::new("s"),
            ShareKey {
                key_rotation: 1,
                key: String::new(),
                user_key_id: "uk".into(),
                create_time: 0,
            },
            &[3u8; 32],
            &other,
        )
        .unwrap();
        f.repo.insert(sealed).await.unwrap();

        let err = f
            .manager
            .get_share_key(&UserId::new("u"), &ShareId::new("s"), 1)
            .await
            .unwrap_err();
        assert_eq!(err, KeystoreError::AuthenticationFailure);
        assert_eq!(f.manager.cached_len().await, 0);
        assert!(f
            .audit
            .events()
            .await
            .iter()
            .any(|e| e.action == AuditAction::ShareKeyDecryptFailed { key_rotation: 1 } && !e.success));
    }

    // === Item keys ===

    #[tokio::test]
    async fn test_item_key_unwraps_with_same_rotation() {
        let f = fixture(ManagerConfig::default());
        add_share_key(&f, "u", "s", 1).await;
        let share_key_2 = add_share_key(&f, "u", "s", 2).await;

        let item_raw = SymmetricKey::generate().unwrap();
        let wrapped = ItemKey::wrap(
            &DecryptedShareKey {
                share_id: ShareId::new("s"),
                key_rotation: 2,
                key_data: share_key_2,
            },
            &item_raw,
        )
        .unwrap();
        f.items
            .set_latest(ShareId::new("s"), ItemId::new("i"), wrapped)
            .await;

        let key = f
            .manager
            .get_latest_item_key(&UserId::new("u"), &ShareId::new("s"), &ItemId::new("i"))
            .await
            .unwrap();
        assert_eq!(key.key_rotation, 2);
        assert_eq!(key.key_data, item_raw);
    }

    #[tokio::test]
    async fn test_item_key_bad_base64() {
        let f = fixture(ManagerConfig::default());
        add_share_key(&f, "u", "s", 1).await;
        f.items
            .set_latest(
                ShareId::new("s"),
                ItemId::new("i"),
                ItemKey {
                    key_rotation: 1,
                    key: "***".into(),
                },
            )
            .await;
        let err = f
            .manager
            .get_latest_item_key(&UserId::new("u"), &ShareId::new("s"), &ItemId::new("i"))
            .await
            .unwrap_err();
        assert_eq!(err, KeystoreError::Base64DecodeFailure);
    }

    // === Cache lifecycle ===

    #[tokio::test]
    async fn test_clear_user_keeps_other_users() {
        let f = fixture(ManagerConfig::default());
        add_share_key(&f, "alice", "s", 1).await;
        add_share_key(&f, "bob", "s", 1).await;
        for user in ["alice", "bob"] {
            f.manager
                .get_share_key(&UserId::new(user), &ShareId::new("s"), 1)
                .await
                .unwrap();
        }
        assert_eq!(f.manager.cached_len().await, 2);

        f.manager.clear_user(&UserId::new("alice")).await;
        assert_eq!(f.manager.cached_len().await, 1);

        f.manager.clear().await;
        assert_eq!(f.manager.cached_len().await, 0);
    }

    #[tokio::test]
    async fn test_max_cached_keys_clears_wholesale() {
        let f = fixture(ManagerConfig {
            max_cached_keys: Some(2),
        });
        for rotation in 1..=3 {
            add_share_key(&f, "u", "s", rotation).await;
        }
        for rotation in 1..=2 {
            f.manager
                .get_share_key(&UserId::new("u"), &ShareId::new("s"), rotation)
                .await
                .unwrap();
        }
        assert_eq!(f.manager.cached_len().await, 2);

        f.manager
            .get_share_key(&UserId::new("u"), &ShareId::new("s"), 3)
            .await
            .unwrap();
        assert_eq!(f.manager.cached_len().await, 1);
    }
}
