//! Wire format (v1)
//!
//! Message:
//!   version[1] || suite_kem[1] || suite_aead[1] || flags[1] || kem_ct_len[2]
//!   || kem_ct[1120] || nonce[12] || aead_ct[16+]
//!
//! A message splits into two packets:
//!   key packet  = header[6] || kem_ct[1120]   (session key, addressed to the recipient)
//!   data packet = nonce[12] || aead_ct[16+]   (content under the session key)
//!
//! kem_ct = x25519_ephemeral_pk[32] || mlkem768_ciphertext[1088]
//!
//! The whole header is bound into the AEAD associated data, so a flipped flag
//! fails authentication. A signed message (`FLAG_SIGNED`) carries
//! `signature[64] || plaintext` as its AEAD plaintext.

use crate::error::CryptoError;

/// Protocol identifier for KDF domain separation.
pub const PROTOCOL_ID: &[u8] = b"pass-crypto-v1";

pub const PROTOCOL_VERSION: u8 = 0x01;

/// Suite identifiers (on-wire)
pub const SUITE_KEM_HYBRID_X25519_MLKEM768: u8 = 0xA3;
pub const SUITE_AEAD_AES256GCM: u8 = 0xB1;

/// Flags
pub const FLAGS_V1: u8 = 0x00;
pub const FLAG_SIGNED: u8 = 0x01;

// ---------------------------------------------------------------------------
// Component sizes
// ---------------------------------------------------------------------------

pub const X25519_KEY_BYTES: usize = 32;

pub const MLKEM_CIPHERTEXT_BYTES: usize = 1088;
pub const MLKEM_PUBLIC_KEY_BYTES: usize = 1184;
pub const MLKEM_SECRET_KEY_BYTES: usize = 2400;

pub const ED25519_KEY_BYTES: usize = 32;
pub const ED25519_SIGNATURE_BYTES: usize = 64;

/// Hybrid KEM ciphertext: x25519_ephemeral_pk[32] || mlkem_ct[1088]
pub const KEM_CIPHERTEXT_BYTES: usize = X25519_KEY_BYTES + MLKEM_CIPHERTEXT_BYTES; // 1120

/// Hybrid public key: x25519_pk[32] || mlkem_ek[1184]
pub const KEM_PUBLIC_KEY_BYTES: usize = X25519_KEY_BYTES + MLKEM_PUBLIC_KEY_BYTES; // 1216

/// Hybrid secret key: x25519_sk[32] || mlkem_dk[2400]
pub const KEM_SECRET_KEY_BYTES: usize = X25519_KEY_BYTES + MLKEM_SECRET_KEY_BYTES; // 2432

pub const SHARED_SECRET_BYTES: usize = 32;

pub const NONCE_BYTES: usize = 12;
pub const AEAD_TAG_BYTES: usize = 16;
pub const AES_KEY_BYTES: usize = 32;

/// version + suite_kem + suite_aead + flags + kem_ct_len(u16)
pub const HEADER_BYTES: usize = 1 + 1 + 1 + 1 + 2; // 6

pub const KEY_PACKET_BYTES: usize = HEADER_BYTES + KEM_CIPHERTEXT_BYTES; // 1126

pub const MIN_DATA_PACKET_BYTES: usize = NONCE_BYTES + AEAD_TAG_BYTES; // 28

pub const MIN_MESSAGE_BYTES: usize = KEY_PACKET_BYTES + MIN_DATA_PACKET_BYTES; // 1154

/// Borrowed view of a parsed message.
#[derive(Debug, Clone, Copy)]
pub struct MessageParts<'a> {
    pub version: u8,
    pub suite_kem: u8,
    pub suite_aead: u8,
    pub flags: u8,
    pub kem_ct_len: u16,
    pub kem_ciphertext: &'a [u8; KEM_CIPHERTEXT_BYTES],
    pub nonce: &'a [u8; NONCE_BYTES],
    pub aead_ciphertext: &'a [u8],
}

pub fn decode_message(data: &[u8]) -> Result<MessageParts<'_>, CryptoError> {
    if data.len() < MIN_MESSAGE_BYTES {
        return Err(CryptoError::MalformedMessage);
    }

    let version = data[0];
    let suite_kem = data[1];
    let suite_aead = data[2];
    let flags = data[3];
    let kem_ct_len = u16::from_be_bytes([data[4], data[5]]);

    if version != PROTOCOL_VERSION
        || suite_kem != SUITE_KEM_HYBRID_X25519_MLKEM768
        || suite_aead != SUITE_AEAD_AES256GCM
        || (flags != FLAGS_V1 && flags != FLAG_SIGNED)
        || kem_ct_len as usize != KEM_CIPHERTEXT_BYTES
    {
        return Err(CryptoError::MalformedMessage);
    }

    let kem_end = HEADER_BYTES + KEM_CIPHERTEXT_BYTES;
    let nonce_end = kem_end + NONCE_BYTES;

    let kem_ciphertext: &[u8; KEM_CIPHERTEXT_BYTES] = data[HEADER_BYTES..kem_end]
        .try_into()
        .map_err(|_| CryptoError::MalformedMessage)?;
    let nonce: &[u8; NONCE_BYTES] = data[kem_end..nonce_end]
        .try_into()
        .map_err(|_| CryptoError::MalformedMessage)?;

    Ok(MessageParts {
        version,
        suite_kem,
        suite_aead,
        flags,
        kem_ct_len,
        kem_ciphertext,
        nonce,
        aead_ciphertext: &data[nonce_end..],
    })
}

/// Message header for `flags`.
pub fn header(flags: u8) -> [u8; HEADER_BYTES] {
    let [len_hi, len_lo] = (KEM_CIPHERTEXT_BYTES as u16).to_be_bytes();
    [
        PROTOCOL_VERSION,
        SUITE_KEM_HYBRID_X25519_MLKEM768,
        SUITE_AEAD_AES256GCM,
        flags,
        len_hi,
        len_lo,
    ]
}

pub fn encode_message(
    flags: u8,
    kem_ct: &[u8],
    nonce: &[u8; NONCE_BYTES],
    aead_ct: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if kem_ct.len() != KEM_CIPHERTEXT_BYTES || aead_ct.len() < AEAD_TAG_BYTES {
        return Err(CryptoError::EncryptionFailure);
    }

    let mut out = Vec::with_capacity(KEY_PACKET_BYTES + NONCE_BYTES + aead_ct.len());
    out.extend_from_slice(&header(flags));
    out.extend_from_slice(kem_ct);
    out.extend_from_slice(nonce);
    out.extend_from_slice(aead_ct);
    Ok(out)
}

/// Split a binary message into `(key_packet, data_packet)`.
pub fn split_message(data: &[u8]) -> Result<(&[u8], &[u8]), CryptoError> {
    decode_message(data)?;
    Ok(data.split_at(KEY_PACKET_BYTES))
}

/// Inverse of [`split_message`]. Validates the result.
pub fn join_message(key_packet: &[u8], data_packet: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut out = Vec::with_capacity(key_packet.len() + data_packet.len());
    out.extend_from_slice(key_packet);
    out.extend_from_slice(data_packet);
    if key_packet.len() != KEY_PACKET_BYTES {
        return Err(CryptoError::MalformedMessage);
    }
    decode_message(&out)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Length-prefixed field helpers (used by key packets)
// ---------------------------------------------------------------------------

/// Sequential reader over a packet. Every read failure is `InvalidKey`.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], CryptoError> {
        if self.data.len() < n {
            return Err(CryptoError::InvalidKey("truncated key packet"));
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, CryptoError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, CryptoError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, CryptoError> {
        let b: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("truncated key packet"))?;
        Ok(u64::from_be_bytes(b))
    }

    pub(crate) fn rest(self) -> &'a [u8] {
        self.data
    }
}
