//! Configuration for the key manager and the item pipeline.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{KeystoreError, Result};

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// What to do with an item's user signature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSignatureCheck {
    /// Verify against the author's verification keys; fail the item otherwise.
    #[default]
    Enforce,
    /// Leave the user signature alone: neither decrypted nor verified.
    /// Authenticity then rests on the item-key signature only.
    Skip,
}

/// Clock used for signature validity checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyTimeSource {
    #[default]
    Now,
    /// Fixed unix time (seconds), e.g. server time.
    Fixed(u64),
    /// Do not check key validity windows.
    Skip,
}

impl VerifyTimeSource {
    pub fn resolve(&self) -> Option<u64> {
        match self {
            VerifyTimeSource::Now => u64::try_from(Utc::now().timestamp()).ok(),
            VerifyTimeSource::Fixed(t) => Some(*t),
            VerifyTimeSource::Skip => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub user_signature: UserSignatureCheck,
    pub verify_time: VerifyTimeSource,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| KeystoreError::InvalidConfig(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Key manager
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// When the share-key cache would exceed this many entries it is cleared
    /// wholesale before the insert. `None` = unbounded.
    pub max_cached_keys: Option<usize>,
}

impl ManagerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| KeystoreError::InvalidConfig(e.to_string()))
    }
}
