//! Keyrings: unlocked private keys used for decrypt / sign / verify.

use core::fmt;

use zeroize::Zeroize;

use crate::armor::{self, ArmorKind, ArmoredKey};
use crate::error::CryptoError;
use crate::key::{PrivateKey, PublicKey};
use crate::wire::ED25519_SIGNATURE_BYTES;

/// Armored private key plus the passphrase that unlocks it.
#[derive(Clone)]
pub struct DecryptionKey {
    pub private_key: ArmoredKey,
    pub passphrase: String,
}

impl DecryptionKey {
    pub fn new(private_key: ArmoredKey, passphrase: impl Into<String>) -> Self {
        Self {
            private_key,
            passphrase: passphrase.into(),
        }
    }

    pub fn unlock(&self) -> Result<PrivateKey, CryptoError> {
        let locked = armor::unarmor(self.private_key.as_str(), ArmorKind::PrivateKey)?;
        PrivateKey::unlock(&locked, self.passphrase.as_bytes())
    }
}

impl Drop for DecryptionKey {
    fn drop(&mut self) {
        self.passphrase.zeroize();
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionKey").finish_non_exhaustive()
    }
}

pub struct Keyring {
    keys: Vec<PrivateKey>,
}

impl Keyring {
    /// Unlock every key that can be unlocked.
    ///
    /// Keys whose passphrase is wrong are skipped; an empty result is an error.
    pub fn unlock(keys: &[DecryptionKey]) -> Result<Self, CryptoError> {
        let unlocked: Vec<PrivateKey> = keys.iter().filter_map(|k| k.unlock().ok()).collect();
        if unlocked.is_empty() {
            return Err(CryptoError::InvalidKey("no key in keyring could be unlocked"));
        }
        Ok(Self { keys: unlocked })
    }

    pub fn from_keys(keys: Vec<PrivateKey>) -> Self {
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn public_keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.keys.iter().map(PrivateKey::public_key)
    }

    /// Try every key in turn.
    pub fn decrypt(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.keys
            .iter()
            .find_map(|k| k.decrypt(message).ok())
            .ok_or(CryptoError::DecryptionFailure)
    }

    /// Decrypt a signed message with whichever key opens it.
    ///
    /// Returns the plaintext and the unchecked signature.
    pub fn decrypt_signed(&self, message: &[u8]) -> Result<(Vec<u8>, [u8; ED25519_SIGNATURE_BYTES]), CryptoError> {
        for key in &self.keys {
            match key.decrypt_signed(message) {
                Err(CryptoError::DecryptionFailure) => continue,
                other => return other,
            }
        }
        Err(CryptoError::DecryptionFailure)
    }

    /// The first key; signs on behalf of the ring.
    pub fn primary(&self) -> Result<&PrivateKey, CryptoError> {
        self.keys
            .first()
            .ok_or(CryptoError::InvalidKey("empty keyring"))
    }

    /// Sign with the primary key.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.primary()?.sign(data).to_vec())
    }

    /// True if any key in the ring verifies the signature.
    pub fn verify(&self, data: &[u8], signature: &[u8], verify_time: Option<u64>) -> bool {
        self.public_keys()
            .any(|pk| pk.verify(data, signature, verify_time))
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring").field("keys", &self.keys.len()).finish()
    }
}
