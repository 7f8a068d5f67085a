//! Asymmetric crypto engine seam.
//!
//! Everything above this trait (the primitive utility, the verification
//! pipeline) only talks to `CryptoEngine`. [`NativeEngine`] implements it with
//! the hybrid KEM + Ed25519 keys in this crate; tests wrap it to observe call
//! order.

use crate::armor::{self, ArmorKind, ArmoredKey, ArmoredMessage, ArmoredSignature};
use crate::error::CryptoError;
use crate::key::{self, PrivateKey, PublicKey};
use crate::keyring::{DecryptionKey, Keyring};
use crate::symmetric::encode_base64;
use crate::{aead, wire};

pub const PASSPHRASE_BYTES: usize = 32;

pub trait CryptoEngine: Send + Sync {
    type Keyring: Send + Sync;

    /// New key pair locked under `passphrase`, armored.
    fn generate_key(&self, name: &str, email: &str, passphrase: &str)
        -> Result<ArmoredKey, CryptoError>;

    /// Random passphrase suitable for locking a generated key.
    fn random_passphrase(&self) -> Result<String, CryptoError>;

    /// Fingerprint of an armored public or private key.
    fn fingerprint(&self, key: &ArmoredKey) -> Result<String, CryptoError>;

    /// Armored public half of an armored public or private key.
    fn public_key(&self, key: &ArmoredKey) -> Result<ArmoredKey, CryptoError>;

    fn build_keyring(&self, keys: &[DecryptionKey]) -> Result<Self::Keyring, CryptoError>;

    fn encrypt(&self, plaintext: &[u8], recipient: &ArmoredKey)
        -> Result<ArmoredMessage, CryptoError>;

    fn decrypt(&self, message: &ArmoredMessage, keyring: &Self::Keyring)
        -> Result<Vec<u8>, CryptoError>;

    /// Sign with the keyring's primary key, then encrypt to `recipient`.
    fn encrypt_and_sign(
        &self,
        plaintext: &[u8],
        recipient: &ArmoredKey,
        signer: &Self::Keyring,
    ) -> Result<ArmoredMessage, CryptoError>;

    /// Decrypt a signed message and check its signature against any of
    /// `verify_keys`. Unsigned or foreign-signed messages are `SignatureMismatch`.
    fn decrypt_and_verify(
        &self,
        message: &ArmoredMessage,
        keyring: &Self::Keyring,
        verify_keys: &[ArmoredKey],
        verify_time: Option<u64>,
    ) -> Result<Vec<u8>, CryptoError>;

    fn sign_detached(&self, data: &[u8], keyring: &Self::Keyring)
        -> Result<ArmoredSignature, CryptoError>;

    /// Verify against one public key. `Ok(false)` on mismatch.
    fn verify_detached(
        &self,
        signature: &ArmoredSignature,
        data: &[u8],
        public_key: &ArmoredKey,
        verify_time: Option<u64>,
    ) -> Result<bool, CryptoError>;

    /// Verify against any key of a keyring. `Ok(false)` on mismatch.
    fn verify_detached_with_keyring(
        &self,
        signature: &ArmoredSignature,
        data: &[u8],
        keyring: &Self::Keyring,
        verify_time: Option<u64>,
    ) -> Result<bool, CryptoError>;

    fn armor(&self, bytes: &[u8], kind: ArmorKind) -> String {
        armor::armor(bytes, kind)
    }

    fn unarmor(&self, armored: &str, kind: ArmorKind) -> Result<Vec<u8>, CryptoError> {
        armor::unarmor(armored, kind)
    }

    /// Split a binary message into `(key_packet, data_packet)`.
    fn split_message(&self, message: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let (k, d) = wire::split_message(message)?;
        Ok((k.to_vec(), d.to_vec()))
    }
}

// ---------------------------------------------------------------------------
// Native engine
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }

    fn parse_public(&self, key: &ArmoredKey) -> Result<PublicKey, CryptoError> {
        let (kind, bytes) = armor::dearmor(key.as_str())?;
        match kind {
            ArmorKind::PublicKey => PublicKey::from_bytes(&bytes),
            ArmorKind::PrivateKey => key::public_from_locked(&bytes),
            _ => Err(CryptoError::InvalidKey("not a key")),
        }
    }
}

impl CryptoEngine for NativeEngine {
    type Keyring = Keyring;

    fn generate_key(
        &self,
        name: &str,
        email: &str,
        passphrase: &str,
    ) -> Result<ArmoredKey, CryptoError> {
        let key = PrivateKey::generate(name, email)?;
        let locked = key.lock(passphrase.as_bytes())?;
        Ok(ArmoredKey::new(armor::armor(&locked, ArmorKind::PrivateKey)))
    }

    fn random_passphrase(&self) -> Result<String, CryptoError> {
        let mut bytes = zeroize::Zeroizing::new([0u8; PASSPHRASE_BYTES]);
        aead::random_bytes(bytes.as_mut_slice())?;
        Ok(encode_base64(bytes.as_slice()))
    }

    fn fingerprint(&self, key: &ArmoredKey) -> Result<String, CryptoError> {
        Ok(self.parse_public(key)?.fingerprint())
    }

    fn public_key(&self, key: &ArmoredKey) -> Result<ArmoredKey, CryptoError> {
        let public = self.parse_public(key)?;
        Ok(ArmoredKey::new(armor::armor(&public.to_bytes(), ArmorKind::PublicKey)))
    }

    fn build_keyring(&self, keys: &[DecryptionKey]) -> Result<Keyring, CryptoError> {
        Keyring::unlock(keys)
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &ArmoredKey,
    ) -> Result<ArmoredMessage, CryptoError> {
        let public = self.parse_public(recipient)?;
        let message = public.encrypt(plaintext)?;
        Ok(ArmoredMessage::from_binary(&message))
    }

    fn decrypt(
        &self,
        message: &ArmoredMessage,
        keyring: &Keyring,
    ) -> Result<Vec<u8>, CryptoError> {
        let binary = armor::unarmor(message.as_str(), ArmorKind::Message)
            .map_err(|_| CryptoError::MalformedMessage)?;
        keyring.decrypt(&binary)
    }

    fn encrypt_and_sign(
        &self,
        plaintext: &[u8],
        recipient: &ArmoredKey,
        signer: &Keyring,
    ) -> Result<ArmoredMessage, CryptoError> {
        let public = self.parse_public(recipient)?;
        let message = public.encrypt_signed(plaintext, signer.primary()?)?;
        Ok(ArmoredMessage::from_binary(&message))
    }

    fn decrypt_and_verify(
        &self,
        message: &ArmoredMessage,
        keyring: &Keyring,
        verify_keys: &[ArmoredKey],
        verify_time: Option<u64>,
    ) -> Result<Vec<u8>, CryptoError> {
        let binary = armor::unarmor(message.as_str(), ArmorKind::Message)
            .map_err(|_| CryptoError::MalformedMessage)?;
        let (plaintext, signature) = keyring.decrypt_signed(&binary)?;
        let verified = verify_keys.iter().any(|key| {
            self.parse_public(key)
                .map(|public| public.verify(&plaintext, &signature, verify_time))
                .unwrap_or(false)
        });
        if !verified {
            return Err(CryptoError::SignatureMismatch);
        }
        Ok(plaintext)
    }

    fn sign_detached(
        &self,
        data: &[u8],
        keyring: &Keyring,
    ) -> Result<ArmoredSignature, CryptoError> {
        Ok(ArmoredSignature::from_binary(&keyring.sign(data)?))
    }

    fn verify_detached(
        &self,
        signature: &ArmoredSignature,
        data: &[u8],
        public_key: &ArmoredKey,
        verify_time: Option<u64>,
    ) -> Result<bool, CryptoError> {
        let public = self.parse_public(public_key)?;
        let sig = armor::unarmor(signature.as_str(), ArmorKind::Signature)?;
        Ok(public.verify(data, &sig, verify_time))
    }

    fn verify_detached_with_keyring(
        &self,
        signature: &ArmoredSignature,
        data: &[u8],
        keyring: &Keyring,
        verify_time: Option<u64>,
    ) -> Result<bool, CryptoError> {
        let sig = armor::unarmor(signature.as_str(), ArmorKind::Signature)?;
        Ok(keyring.verify(data, &sig, verify_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_key(engine: &NativeEngine) -> (ArmoredKey, String) {
        let passphrase = engine.random_passphrase().unwrap();
        let key = engine.generate_key("Bob", "bob@example.com", &passphrase).unwrap();
        (key, passphrase)
    }

    #[test]
    fn test_fingerprint_same_for_private_and_public() {
        let engine = NativeEngine::new();
        let (key, _) = engine_key(&engine);
        let public = engine.public_key(&key).unwrap();
        assert_eq!(
            engine.fingerprint(&key).unwrap(),
            engine.fingerprint(&public).unwrap()
        );
        assert_eq!(engine.fingerprint(&key).unwrap().len(), 64);
    }

    #[test]
    fn test_encrypt_to_private_key_armor() {
        let engine = NativeEngine::new();
        let (key, passphrase) = engine_key(&engine);
        let ring = engine
            .build_keyring(&[DecryptionKey::new(key.clone(), passphrase)])
            .unwrap();
        let msg = engine.encrypt(b"payload", &key).unwrap();
        assert_eq!(engine.decrypt(&msg, &ring).unwrap(), b"payload");
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let engine = NativeEngine::new();
        let (key, passphrase) = engine_key(&engine);
        let ring = engine
            .build_keyring(&[DecryptionKey::new(key.clone(), passphrase)])
            .unwrap();
        let sig = engine.sign_detached(b"data", &ring).unwrap();
        assert!(engine.verify_detached(&sig, b"data", &key, None).unwrap());
        assert!(!engine.verify_detached(&sig, b"tampered", &key, None).unwrap());
        assert!(engine
            .verify_detached_with_keyring(&sig, b"data", &ring, None)
            .unwrap());
    }

    #[test]
    fn test_decrypt_and_verify() {
        let engine = NativeEngine::new();
        let (key, passphrase) = engine_key(&engine);
        let (other, other_passphrase) = engine_key(&engine);
        let ring = engine
            .build_keyring(&[DecryptionKey::new(key.clone(), passphrase)])
            .unwrap();
        let stranger = engine
            .build_keyring(&[DecryptionKey::new(other.clone(), other_passphrase)])
            .unwrap();
        let own = [engine.public_key(&key).unwrap()];

        let signed = engine.encrypt_and_sign(b"share key", &key, &ring).unwrap();
        assert_eq!(
            engine.decrypt_and_verify(&signed, &ring, &own, None).unwrap(),
            b"share key"
        );

        let foreign = engine.encrypt_and_sign(b"share key", &key, &stranger).unwrap();
        assert_eq!(
            engine.decrypt_and_verify(&foreign, &ring, &own, None).unwrap_err(),
            CryptoError::SignatureMismatch
        );

        let unsigned = engine.encrypt(b"share key", &key).unwrap();
        assert_eq!(
            engine.decrypt_and_verify(&unsigned, &ring, &own, None).unwrap_err(),
            CryptoError::SignatureMismatch
        );
        assert!(engine.decrypt_and_verify(&signed, &ring, &[], None).is_err());
    }

    #[test]
    fn test_random_passphrase_unique() {
        let engine = NativeEngine::new();
        assert_ne!(
            engine.random_passphrase().unwrap(),
            engine.random_passphrase().unwrap()
        );
    }

    #[test]
    fn test_decrypt_non_message_is_malformed() {
        let engine = NativeEngine::new();
        let (key, passphrase) = engine_key(&engine);
        let ring = engine
            .build_keyring(&[DecryptionKey::new(key.clone(), passphrase)])
            .unwrap();
        let not_msg = ArmoredMessage::new(armor::armor(b"x", ArmorKind::Signature));
        assert_eq!(
            engine.decrypt(&not_msg, &ring).unwrap_err(),
            CryptoError::MalformedMessage
        );
    }
}
