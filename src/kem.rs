//! Hybrid KEM: X25519 + ML-KEM-768
//!
//! Encryption subkey of every asymmetric key. A message's session key is
//! derived from the combined shared secret, so decryption needs both halves.
//!
//! Key serialization:
//!   PublicKey  = x25519_pk[32] || mlkem_ek[1184]   (1216 bytes)
//!   SecretKey  = x25519_sk[32] || mlkem_dk[2400]   (2432 bytes)
//!
//! KEM ciphertext (on wire):
//!   x25519_ephemeral_pk[32] || mlkem_ct[1088]      (1120 bytes)
//!
//! Combined shared secret (fed to KDF):
//!   x25519_dh[32] || mlkem_ss[32]                  (64 bytes)

use core::convert::TryFrom;

use ml_kem::{
    kem::{Decapsulate, Encapsulate},
    Ciphertext, EncodedSizeUser, KemCore, MlKem768, MlKem768Params,
};
use rand_core::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::wire::{
    KEM_CIPHERTEXT_BYTES, KEM_PUBLIC_KEY_BYTES, KEM_SECRET_KEY_BYTES, MLKEM_PUBLIC_KEY_BYTES,
    MLKEM_SECRET_KEY_BYTES, SHARED_SECRET_BYTES, X25519_KEY_BYTES,
};

type Ek = ml_kem::kem::EncapsulationKey<MlKem768Params>;
type Dk = ml_kem::kem::DecapsulationKey<MlKem768Params>;

type MlKemCt = Ciphertext<MlKem768>;

// ---------------------------------------------------------------------------
// Public key (hybrid)
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct KemPublicKey {
    x25519: X25519PublicKey,
    mlkem: Ek,
}

impl KemPublicKey {
    pub fn to_bytes(&self) -> [u8; KEM_PUBLIC_KEY_BYTES] {
        let mut out = [0u8; KEM_PUBLIC_KEY_BYTES];
        out[..X25519_KEY_BYTES].copy_from_slice(self.x25519.as_bytes());
        out[X25519_KEY_BYTES..].copy_from_slice(self.mlkem.as_bytes().as_slice());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEM_PUBLIC_KEY_BYTES {
            return Err(CryptoError::InvalidKey("bad encryption public key length"));
        }

        let x25519_bytes: [u8; X25519_KEY_BYTES] = bytes[..X25519_KEY_BYTES]
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("bad x25519 public key"))?;
        let mlkem_bytes: [u8; MLKEM_PUBLIC_KEY_BYTES] = bytes[X25519_KEY_BYTES..]
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("bad ml-kem public key"))?;

        Ok(Self {
            x25519: X25519PublicKey::from(x25519_bytes),
            mlkem: Ek::from_bytes(&mlkem_bytes.into()),
        })
    }
}

// ---------------------------------------------------------------------------
// Secret key (hybrid)
// ---------------------------------------------------------------------------

pub struct KemSecretKey {
    x25519: StaticSecret,
    mlkem: Dk,
}

impl KemSecretKey {
    pub fn to_bytes(&self) -> Zeroizing<[u8; KEM_SECRET_KEY_BYTES]> {
        let mut out = Zeroizing::new([0u8; KEM_SECRET_KEY_BYTES]);
        out[..X25519_KEY_BYTES].copy_from_slice(&self.x25519.to_bytes());
        out[X25519_KEY_BYTES..].copy_from_slice(self.mlkem.as_bytes().as_slice());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEM_SECRET_KEY_BYTES {
            return Err(CryptoError::InvalidKey("bad encryption secret key length"));
        }

        let x25519_bytes: Zeroizing<[u8; X25519_KEY_BYTES]> = Zeroizing::new(
            bytes[..X25519_KEY_BYTES]
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("bad x25519 secret key"))?,
        );
        let mlkem_bytes: Zeroizing<[u8; MLKEM_SECRET_KEY_BYTES]> = Zeroizing::new(
            bytes[X25519_KEY_BYTES..]
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("bad ml-kem secret key"))?,
        );

        Ok(Self {
            x25519: StaticSecret::from(*x25519_bytes),
            mlkem: Dk::from_bytes(&(*mlkem_bytes).into()),
        })
    }

    pub fn public_key(&self) -> KemPublicKey {
        KemPublicKey {
            x25519: X25519PublicKey::from(&self.x25519),
            mlkem: self.mlkem.encapsulation_key().clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// KEM provider trait + hybrid implementation
// ---------------------------------------------------------------------------

pub trait KemProvider {
    fn keygen() -> (KemPublicKey, KemSecretKey);
    /// Returns (combined_shared_secret, kem_ciphertext_bytes).
    fn encapsulate(pk: &KemPublicKey) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), CryptoError>;
    /// Returns combined_shared_secret.
    fn decapsulate(sk: &KemSecretKey, ct: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}

pub struct HybridX25519MlKem768;

impl KemProvider for HybridX25519MlKem768 {
    fn keygen() -> (KemPublicKey, KemSecretKey) {
        let x25519_sk = StaticSecret::random_from_rng(OsRng);
        let x25519_pk = X25519PublicKey::from(&x25519_sk);

        // generate returns (dk, ek)
        let (mlkem_dk, mlkem_ek) = MlKem768::generate(&mut OsRng);

        (
            KemPublicKey { x25519: x25519_pk, mlkem: mlkem_ek },
            KemSecretKey { x25519: x25519_sk, mlkem: mlkem_dk },
        )
    }

    fn encapsulate(pk: &KemPublicKey) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), CryptoError> {
        let x25519_eph = EphemeralSecret::random_from_rng(OsRng);
        let x25519_eph_pk = X25519PublicKey::from(&x25519_eph);
        let x25519_ss = x25519_eph.diffie_hellman(&pk.x25519);

        let (mlkem_ct, mlkem_ss) = pk
            .mlkem
            .encapsulate(&mut OsRng)
            .map_err(|_| CryptoError::EncryptionFailure)?;

        let mut combined_ss = Zeroizing::new(Vec::with_capacity(SHARED_SECRET_BYTES * 2));
        combined_ss.extend_from_slice(x25519_ss.as_bytes());
        combined_ss.extend_from_slice(mlkem_ss.as_slice());

        let mut kem_ct = Vec::with_capacity(KEM_CIPHERTEXT_BYTES);
        kem_ct.extend_from_slice(x25519_eph_pk.as_bytes());
        kem_ct.extend_from_slice(mlkem_ct.as_slice());

        Ok((combined_ss, kem_ct))
    }

    fn decapsulate(sk: &KemSecretKey, ct: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if ct.len() != KEM_CIPHERTEXT_BYTES {
            return Err(CryptoError::DecryptionFailure);
        }

        let x25519_epk_bytes: [u8; X25519_KEY_BYTES] = ct[..X25519_KEY_BYTES]
            .try_into()
            .map_err(|_| CryptoError::DecryptionFailure)?;
        let x25519_epk = X25519PublicKey::from(x25519_epk_bytes);

        let mlkem_ct =
            MlKemCt::try_from(&ct[X25519_KEY_BYTES..]).map_err(|_| CryptoError::DecryptionFailure)?;

        let x25519_ss = sk.x25519.diffie_hellman(&x25519_epk);
        let mlkem_ss = sk
            .mlkem
            .decapsulate(&mlkem_ct)
            .map_err(|_| CryptoError::DecryptionFailure)?;

        let mut combined_ss = Zeroizing::new(Vec::with_capacity(SHARED_SECRET_BYTES * 2));
        combined_ss.extend_from_slice(x25519_ss.as_bytes());
        combined_ss.extend_from_slice(mlkem_ss.as_slice());

        Ok(combined_ss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encapsulate_decapsulate_agree() {
        let (pk, sk) = HybridX25519MlKem768::keygen();
        let (ss, ct) = HybridX25519MlKem768::encapsulate(&pk).unwrap();
        assert_eq!(ct.len(), KEM_CIPHERTEXT_BYTES);
        let ss2 = HybridX25519MlKem768::decapsulate(&sk, &ct).unwrap();
        assert_eq!(*ss, *ss2);
    }

    #[test]
    fn test_secret_key_bytes_roundtrip() {
        let (pk, sk) = HybridX25519MlKem768::keygen();
        let restored = KemSecretKey::from_bytes(&*sk.to_bytes()).unwrap();
        assert_eq!(restored.public_key().to_bytes(), pk.to_bytes());
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(KemPublicKey::from_bytes(&[0u8; 10]).is_err());
        assert!(KemSecretKey::from_bytes(&[0u8; 10]).is_err());
        let (_, sk) = HybridX25519MlKem768::keygen();
        assert_eq!(
            HybridX25519MlKem768::decapsulate(&sk, &[0u8; 5]).unwrap_err(),
            CryptoError::DecryptionFailure
        );
    }
}
