//! # pass-crypto
//!
//! Primitives for a password manager's key hierarchy.
//!
//! - [`symmetric`]: AES-256-GCM seal/open bound to an [`AssociatedData`]
//!   usage context (item content, item key, vault content, ...).
//! - [`CryptoEngine`]: the asymmetric seam (key generation, keyrings,
//!   encrypt/decrypt, detached signatures, armor). [`NativeEngine`] backs it
//!   with hybrid X25519 + ML-KEM-768 encryption and Ed25519 signatures.
//! - [`CryptoUtils`]: the contract layer callers use on top of an engine.
//!
//! ## Quick Start
//!
//! ```rust
//! use pass_crypto::{CryptoUtils, DecryptionKey, NativeEngine, CryptoEngine};
//!
//! let utils = CryptoUtils::new(NativeEngine::new());
//! let (key, passphrase) = utils.generate_key_pair("Ada", "ada@example.com").unwrap();
//! let keyring = utils
//!     .engine()
//!     .build_keyring(&[DecryptionKey::new(key.clone(), passphrase)])
//!     .unwrap();
//!
//! let field = utils.encrypt_field(b"vault passphrase", &key).unwrap();
//! assert_eq!(utils.decrypt_passphrase(&field, &keyring).unwrap(), "vault passphrase");
//! ```

#![deny(unsafe_code)]

mod aead;
mod kdf;

pub mod aad;
pub mod armor;
pub mod engine;
pub mod error;
pub mod kem;
pub mod key;
pub mod keyring;
pub mod symmetric;
pub mod utils;

#[doc(hidden)]
pub mod wire;

pub use aad::AssociatedData;
pub use armor::{ArmorKind, ArmoredKey, ArmoredMessage, ArmoredSignature};
pub use engine::{CryptoEngine, NativeEngine};
pub use error::CryptoError;
pub use keyring::{DecryptionKey, Keyring};
pub use symmetric::SymmetricKey;
pub use utils::{CryptoUtils, SplitMessage};
