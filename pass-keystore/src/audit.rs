//! Audit logging: key-management operations emit structured events.
//!
//! The share-key cache-hit path never records anything.

use crate::pipeline::PipelineStep;
use crate::types::{ItemId, ShareId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    ShareKeysFetched { count: usize },
    ShareKeysRefreshed { count: usize },
    ShareKeyCached { key_rotation: i64 },
    ShareKeyDecryptFailed { key_rotation: i64 },
    ItemKeyFetched { key_rotation: i64 },
    ItemKeyDecrypted { key_rotation: i64 },
    ItemKeyDecryptFailed { key_rotation: i64 },
    ItemVerified,
    ItemRejected { step: PipelineStep },
    ItemReencrypted,
    CacheCleared { entries: usize },
    LocalKeysDeleted { count: usize },
}

/// Verbosity an event is logged at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditLevel {
    Trace,
    Info,
    Error,
}

impl AuditAction {
    pub fn level(&self) -> AuditLevel {
        match self {
            AuditAction::ShareKeysFetched { .. }
            | AuditAction::ShareKeysRefreshed { .. }
            | AuditAction::ItemKeyFetched { .. }
            | AuditAction::ItemKeyDecrypted { .. }
            | AuditAction::ItemVerified
            | AuditAction::ItemReencrypted => AuditLevel::Trace,
            AuditAction::ShareKeyCached { .. }
            | AuditAction::CacheCleared { .. }
            | AuditAction::LocalKeysDeleted { .. } => AuditLevel::Info,
            AuditAction::ShareKeyDecryptFailed { .. }
            | AuditAction::ItemKeyDecryptFailed { .. }
            | AuditAction::ItemRejected { .. } => AuditLevel::Error,
        }
    }
}

/// A structured audit event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<UserId>,
    pub share_id: Option<ShareId>,
    pub item_id: Option<ItemId>,
    pub action: AuditAction,
    pub success: bool,
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn share_event(user_id: &UserId, share_id: &ShareId, action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: Some(user_id.clone()),
            share_id: Some(share_id.clone()),
            item_id: None,
            action,
            success: true,
            detail: None,
        }
    }

    pub fn item_event(share_id: &ShareId, item_id: &ItemId, action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: None,
            share_id: Some(share_id.clone()),
            item_id: Some(item_id.clone()),
            action,
            success: true,
            detail: None,
        }
    }

    /// An event with no specific share or item.
    pub fn system_event(action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: None,
            share_id: None,
            item_id: None,
            action,
            success: true,
            detail: None,
        }
    }

    pub fn with_user(mut self, user_id: &UserId) -> Self {
        self.user_id = Some(user_id.clone());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.success = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Audit sink trait
// ---------------------------------------------------------------------------

/// Where audit events go.
///
/// Synchronous so it can be called while holding no lock and without awaiting.
pub trait AuditSinkSync: Send + Sync {
    fn record(&self, event: AuditEvent);
}

// ---------------------------------------------------------------------------
// Built-in sinks
// ---------------------------------------------------------------------------

/// Logs events via the `tracing` crate at the action's level.
pub struct TracingAuditSink;

macro_rules! emit {
    ($level:expr, $event:expr) => {
        tracing::event!(
            $level,
            user_id = ?$event.user_id,
            share_id = ?$event.share_id,
            item_id = ?$event.item_id,
            action = ?$event.action,
            success = $event.success,
            detail = ?$event.detail,
            "keystore"
        )
    };
}

impl AuditSinkSync for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event.action.level() {
            AuditLevel::Trace => emit!(tracing::Level::TRACE, event),
            AuditLevel::Info => emit!(tracing::Level::INFO, event),
            AuditLevel::Error => emit!(tracing::Level::ERROR, event),
        }
    }
}

/// Collects events in memory (for testing).
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSinkSync for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        // best effort: never block the caller
        if let Ok(mut events) = self.events.try_lock() {
            events.push(event);
        }
    }
}
