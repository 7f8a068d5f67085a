//! Crypto primitive utility.
//!
//! Thin, contract-enforcing layer over a [`CryptoEngine`]: normalizes engine
//! failures into the error kinds callers branch on, and handles the
//! base64/armor conversions between wire fields and engine inputs.

use crate::armor::{ArmorKind, ArmoredKey, ArmoredMessage, ArmoredSignature};
use crate::engine::CryptoEngine;
use crate::error::CryptoError;
use crate::symmetric::{decode_base64, encode_base64};
use crate::wire;

/// Key packet and data packet of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitMessage {
    pub key_packet: Vec<u8>,
    pub data_packet: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct CryptoUtils<E> {
    engine: E,
}

impl<E: CryptoEngine> CryptoUtils<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns the armored private key and the passphrase that locks it.
    pub fn generate_key_pair(
        &self,
        name: &str,
        email: &str,
    ) -> Result<(ArmoredKey, String), CryptoError> {
        let passphrase = self.engine.random_passphrase()?;
        let key = self.engine.generate_key(name, email, &passphrase)?;
        Ok((key, passphrase))
    }

    pub fn fingerprint(&self, key: &ArmoredKey) -> Result<String, CryptoError> {
        match self.engine.fingerprint(key) {
            Ok(fp) if !fp.is_empty() => Ok(fp),
            _ => Err(CryptoError::FingerprintError),
        }
    }

    pub fn split_message(&self, message: &ArmoredMessage) -> Result<SplitMessage, CryptoError> {
        let binary = self
            .engine
            .unarmor(message.as_str(), ArmorKind::Message)
            .map_err(|_| CryptoError::MalformedMessage)?;
        let (key_packet, data_packet) = self
            .engine
            .split_message(&binary)
            .map_err(|_| CryptoError::MalformedMessage)?;
        Ok(SplitMessage { key_packet, data_packet })
    }

    /// Inverse of [`split_message`](Self::split_message).
    pub fn join_message(&self, parts: &SplitMessage) -> Result<ArmoredMessage, CryptoError> {
        let binary = wire::join_message(&parts.key_packet, &parts.data_packet)?;
        Ok(self.armor_message(&binary))
    }

    pub fn armor(&self, bytes: &[u8], kind: ArmorKind) -> String {
        self.engine.armor(bytes, kind)
    }

    pub fn armor_message(&self, bytes: &[u8]) -> ArmoredMessage {
        ArmoredMessage::new(self.armor(bytes, ArmorKind::Message))
    }

    pub fn armor_signature(&self, bytes: &[u8]) -> ArmoredSignature {
        ArmoredSignature::new(self.armor(bytes, ArmorKind::Signature))
    }

    pub fn unarmor(&self, armored: &str, kind: ArmorKind) -> Result<Vec<u8>, CryptoError> {
        self.engine.unarmor(armored, kind)
    }

    /// Armored block to the base64 of its binary contents (wire field form).
    pub fn unarmor_and_base64(&self, armored: &str, kind: ArmorKind) -> Result<String, CryptoError> {
        Ok(encode_base64(self.unarmor(armored, kind)?))
    }

    /// Never fails: malformed input counts as a mismatch.
    pub fn verify_detached_signature(
        &self,
        signature: &ArmoredSignature,
        plaintext: &[u8],
        public_key: &ArmoredKey,
        verify_time: Option<u64>,
    ) -> bool {
        self.engine
            .verify_detached(signature, plaintext, public_key, verify_time)
            .unwrap_or(false)
    }

    pub fn verify_detached_signature_with_keyring(
        &self,
        signature: &ArmoredSignature,
        plaintext: &[u8],
        keyring: &E::Keyring,
        verify_time: Option<u64>,
    ) -> bool {
        self.engine
            .verify_detached_with_keyring(signature, plaintext, keyring, verify_time)
            .unwrap_or(false)
    }

    /// Decrypt a base64 wire field (binary message) with `keyring`.
    pub fn decrypt_field(&self, field_b64: &str, keyring: &E::Keyring) -> Result<Vec<u8>, CryptoError> {
        let binary = decode_base64(field_b64)?;
        self.engine.decrypt(&self.armor_message(&binary), keyring)
    }

    /// Any failure, including bad base64 or non-UTF-8 output, is `DecryptionFailure`.
    pub fn decrypt_passphrase(
        &self,
        encrypted_passphrase_b64: &str,
        keyring: &E::Keyring,
    ) -> Result<String, CryptoError> {
        let plain = self
            .decrypt_field(encrypted_passphrase_b64, keyring)
            .map_err(|_| CryptoError::DecryptionFailure)?;
        String::from_utf8(plain).map_err(|_| CryptoError::DecryptionFailure)
    }

    /// Encrypt to `recipient`, returning the base64 binary message.
    pub fn encrypt_field(&self, plaintext: &[u8], recipient: &ArmoredKey) -> Result<String, CryptoError> {
        let armored = self.engine.encrypt(plaintext, recipient)?;
        self.unarmor_and_base64(armored.as_str(), ArmorKind::Message)
    }

    /// Sign-then-encrypt to `recipient`, returning the base64 binary message.
    pub fn encrypt_and_sign_field(
        &self,
        plaintext: &[u8],
        recipient: &ArmoredKey,
        signer: &E::Keyring,
    ) -> Result<String, CryptoError> {
        let armored = self.engine.encrypt_and_sign(plaintext, recipient, signer)?;
        self.unarmor_and_base64(armored.as_str(), ArmorKind::Message)
    }

    /// Decrypt a signed base64 wire field, requiring a signature by one of `verify_keys`.
    pub fn decrypt_and_verify_field(
        &self,
        field_b64: &str,
        keyring: &E::Keyring,
        verify_keys: &[ArmoredKey],
        verify_time: Option<u64>,
    ) -> Result<Vec<u8>, CryptoError> {
        let binary = decode_base64(field_b64)?;
        self.engine
            .decrypt_and_verify(&self.armor_message(&binary), keyring, verify_keys, verify_time)
    }

    /// Detached signature as raw binary.
    pub fn sign_binary(&self, data: &[u8], keyring: &E::Keyring) -> Result<Vec<u8>, CryptoError> {
        let sig = self.engine.sign_detached(data, keyring)?;
        self.unarmor(sig.as_str(), ArmorKind::Signature)
    }
}
