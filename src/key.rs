//! Asymmetric keys.
//!
//! A key pair carries an encryption subkey (hybrid KEM, see [`crate::kem`])
//! and an Ed25519 signing subkey, plus its creation time and user id.
//!
//! Public packet:
//!   version[1] || created_at[8] || uid_len[2] || uid || kem_pk[1216] || ed25519_vk[32]
//!
//! Locked private packet:
//!   pub_len[2] || public_packet || salt[16] || nonce[12] || aead_ct
//!   aead_ct = AES-256-GCM(lock_key, kem_sk[2432] || ed25519_sk[32], aad = public_packet)
//!
//! Messages encrypted to a public key use the wire format in [`crate::wire`].
//! The AEAD associated data is `header || ct_hash`.

use std::time::{SystemTime, UNIX_EPOCH};

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

use crate::aead;
use crate::error::CryptoError;
use crate::kdf;
use crate::kem::{HybridX25519MlKem768, KemProvider, KemPublicKey, KemSecretKey};
use crate::wire::{
    self, Reader, ED25519_KEY_BYTES, ED25519_SIGNATURE_BYTES, KEM_PUBLIC_KEY_BYTES,
    KEM_SECRET_KEY_BYTES, NONCE_BYTES, FLAGS_V1, FLAG_SIGNED, HEADER_BYTES,
};

pub const KEY_PACKET_VERSION: u8 = 0x01;
pub const SALT_BYTES: usize = 16;
pub const MAX_USER_ID_BYTES: usize = 1024;

const SECRET_BYTES: usize = KEM_SECRET_KEY_BYTES + ED25519_KEY_BYTES;

fn message_aad(flags: u8, ct_hash: &[u8; 32]) -> [u8; HEADER_BYTES + 32] {
    let mut aad = [0u8; HEADER_BYTES + 32];
    aad[..HEADER_BYTES].copy_from_slice(&wire::header(flags));
    aad[HEADER_BYTES..].copy_from_slice(ct_hash);
    aad
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Public key
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PublicKey {
    created_at: u64,
    user_id: String,
    encryption: KemPublicKey,
    verifying: VerifyingKey,
}

impl PublicKey {
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let uid = self.user_id.as_bytes();
        let mut out =
            Vec::with_capacity(1 + 8 + 2 + uid.len() + KEM_PUBLIC_KEY_BYTES + ED25519_KEY_BYTES);
        out.push(KEY_PACKET_VERSION);
        out.extend_from_slice(&self.created_at.to_be_bytes());
        // uid length is capped at MAX_USER_ID_BYTES on construction
        out.extend_from_slice(&(uid.len() as u16).to_be_bytes());
        out.extend_from_slice(uid);
        out.extend_from_slice(&self.encryption.to_bytes());
        out.extend_from_slice(self.verifying.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut r = Reader::new(bytes);
        if r.u8()? != KEY_PACKET_VERSION {
            return Err(CryptoError::InvalidKey("unsupported key packet version"));
        }
        let created_at = r.u64()?;
        let uid_len = r.u16()? as usize;
        if uid_len > MAX_USER_ID_BYTES {
            return Err(CryptoError::InvalidKey("user id too long"));
        }
        let user_id = String::from_utf8(r.take(uid_len)?.to_vec())
            .map_err(|_| CryptoError::InvalidKey("user id is not UTF-8"))?;
        let encryption = KemPublicKey::from_bytes(r.take(KEM_PUBLIC_KEY_BYTES)?)?;
        let vk_bytes: [u8; ED25519_KEY_BYTES] = r
            .take(ED25519_KEY_BYTES)?
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("bad verifying key"))?;
        let verifying = VerifyingKey::from_bytes(&vk_bytes)
            .map_err(|_| CryptoError::InvalidKey("bad verifying key"))?;
        if !r.rest().is_empty() {
            return Err(CryptoError::InvalidKey("trailing bytes in public key packet"));
        }
        Ok(Self { created_at, user_id, encryption, verifying })
    }

    pub fn fingerprint(&self) -> String {
        kdf::fingerprint(&self.to_bytes())
    }

    /// Encrypt to this key. Returns a binary message.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.seal_message(FLAGS_V1, plaintext)
    }

    /// Sign `plaintext` with `signer`, then encrypt both to this key.
    pub fn encrypt_signed(&self, plaintext: &[u8], signer: &PrivateKey) -> Result<Vec<u8>, CryptoError> {
        let mut payload = Zeroizing::new(Vec::with_capacity(ED25519_SIGNATURE_BYTES + plaintext.len()));
        payload.extend_from_slice(&signer.sign(plaintext));
        payload.extend_from_slice(plaintext);
        self.seal_message(FLAG_SIGNED, &payload)
    }

    fn seal_message(&self, flags: u8, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (shared_secret, kem_ct) = HybridX25519MlKem768::encapsulate(&self.encryption)?;
        let ct_hash = kdf::ct_hash(&kem_ct);
        let session_key = kdf::derive_message_key(&shared_secret, &ct_hash)?;
        let nonce = aead::nonce()?;
        let aead_ct = aead::aead_seal(&session_key, &nonce, payload, &message_aad(flags, &ct_hash))?;
        wire::encode_message(flags, &kem_ct, &nonce, &aead_ct)
    }

    /// Verify a detached signature.
    ///
    /// With `verify_time = Some(t)`, a key created after `t` is treated as not
    /// yet valid. `None` skips the time check.
    pub fn verify(&self, data: &[u8], signature: &[u8], verify_time: Option<u64>) -> bool {
        if let Some(t) = verify_time {
            if self.created_at > t {
                return false;
            }
        }
        let Ok(sig_bytes) = <[u8; ED25519_SIGNATURE_BYTES]>::try_from(signature) else {
            return false;
        };
        let sig = Signature::from_bytes(&sig_bytes);
        self.verifying.verify_strict(data, &sig).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Private key
// ---------------------------------------------------------------------------

pub struct PrivateKey {
    public: PublicKey,
    encryption: KemSecretKey,
    signing: SigningKey,
}

impl PrivateKey {
    pub fn generate(name: &str, email: &str) -> Result<Self, CryptoError> {
        let user_id = format!("{} <{}>", name, email);
        if user_id.len() > MAX_USER_ID_BYTES {
            return Err(CryptoError::InvalidKey("user id too long"));
        }

        let (kem_pk, kem_sk) = HybridX25519MlKem768::keygen();
        let mut seed = Zeroizing::new([0u8; ED25519_KEY_BYTES]);
        aead::random_bytes(seed.as_mut_slice())?;
        let signing = SigningKey::from_bytes(&seed);

        Ok(Self {
            public: PublicKey {
                created_at: unix_now(),
                user_id,
                encryption: kem_pk,
                verifying: signing.verifying_key(),
            },
            encryption: kem_sk,
            signing,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Decrypt an unsigned message. Signed messages are refused here.
    pub fn decrypt(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (flags, payload) = self.open_message(message)?;
        if flags != FLAGS_V1 {
            return Err(CryptoError::DecryptionFailure);
        }
        Ok(payload)
    }

    /// Decrypt a signed message into `(plaintext, signature)`.
    ///
    /// The signature is returned unchecked. An authentic message that was
    /// never signed is `SignatureMismatch`.
    pub fn decrypt_signed(
        &self,
        message: &[u8],
    ) -> Result<(Vec<u8>, [u8; ED25519_SIGNATURE_BYTES]), CryptoError> {
        let (flags, mut payload) = self.open_message(message)?;
        if flags != FLAG_SIGNED {
            return Err(CryptoError::SignatureMismatch);
        }
        if payload.len() < ED25519_SIGNATURE_BYTES {
            return Err(CryptoError::DecryptionFailure);
        }
        let plaintext = payload.split_off(ED25519_SIGNATURE_BYTES);
        let signature = payload
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::DecryptionFailure)?;
        Ok((plaintext, signature))
    }

    fn open_message(&self, message: &[u8]) -> Result<(u8, Vec<u8>), CryptoError> {
        let parts = wire::decode_message(message).map_err(|_| CryptoError::DecryptionFailure)?;
        let shared_secret = HybridX25519MlKem768::decapsulate(&self.encryption, parts.kem_ciphertext)?;
        let ct_hash = kdf::ct_hash(parts.kem_ciphertext);
        let session_key = kdf::derive_message_key(&shared_secret, &ct_hash)
            .map_err(|_| CryptoError::DecryptionFailure)?;
        let payload = aead::aead_open(
            &session_key,
            parts.nonce,
            parts.aead_ciphertext,
            &message_aad(parts.flags, &ct_hash),
        )
        .map_err(|_| CryptoError::DecryptionFailure)?;
        Ok((parts.flags, payload))
    }

    pub fn sign(&self, data: &[u8]) -> [u8; ED25519_SIGNATURE_BYTES] {
        self.signing.sign(data).to_bytes()
    }

    /// Serialize with secret material sealed under `passphrase`.
    pub fn lock(&self, passphrase: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let public = self.public.to_bytes();
        let mut salt = [0u8; SALT_BYTES];
        aead::random_bytes(&mut salt)?;
        let lock_key = kdf::derive_lock_key(passphrase, &salt)?;

        let mut secret = Zeroizing::new(Vec::with_capacity(SECRET_BYTES));
        secret.extend_from_slice(self.encryption.to_bytes().as_slice());
        secret.extend_from_slice(&self.signing.to_bytes());
        let sealed = aead::seal_combined(&lock_key, &secret, &public)?;

        let mut out = Vec::with_capacity(2 + public.len() + SALT_BYTES + sealed.len());
        out.extend_from_slice(&(public.len() as u16).to_be_bytes());
        out.extend_from_slice(&public);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    pub fn unlock(locked: &[u8], passphrase: &[u8]) -> Result<Self, CryptoError> {
        let (public_bytes, salt, sealed) = split_locked(locked)?;
        let public = PublicKey::from_bytes(public_bytes)?;
        let lock_key = kdf::derive_lock_key(passphrase, salt)?;
        let secret = Zeroizing::new(
            aead::open_combined(&lock_key, sealed, public_bytes)
                .map_err(|_| CryptoError::InvalidKey("passphrase does not unlock key"))?,
        );
        if secret.len() != SECRET_BYTES {
            return Err(CryptoError::InvalidKey("bad secret key length"));
        }

        let encryption = KemSecretKey::from_bytes(&secret[..KEM_SECRET_KEY_BYTES])?;
        let seed: Zeroizing<[u8; ED25519_KEY_BYTES]> = Zeroizing::new(
            secret[KEM_SECRET_KEY_BYTES..]
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("bad signing key"))?,
        );
        let signing = SigningKey::from_bytes(&seed);

        if signing.verifying_key() != public.verifying
            || encryption.public_key().to_bytes() != public.encryption.to_bytes()
        {
            return Err(CryptoError::InvalidKey("secret does not match public key"));
        }

        Ok(Self { public, encryption, signing })
    }
}

/// Read the public half of a locked private key without the passphrase.
pub fn public_from_locked(locked: &[u8]) -> Result<PublicKey, CryptoError> {
    let (public_bytes, _, _) = split_locked(locked)?;
    PublicKey::from_bytes(public_bytes)
}

fn split_locked(locked: &[u8]) -> Result<(&[u8], &[u8], &[u8]), CryptoError> {
    let mut r = Reader::new(locked);
    let pub_len = r.u16()? as usize;
    let public = r.take(pub_len)?;
    let salt = r.take(SALT_BYTES)?;
    let sealed = r.rest();
    if sealed.len() < NONCE_BYTES + wire::AEAD_TAG_BYTES {
        return Err(CryptoError::InvalidKey("truncated key packet"));
    }
    Ok((public, salt, sealed))
}
