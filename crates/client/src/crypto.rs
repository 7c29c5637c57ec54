//! Payload protection for event submissions.
//!
//! Provides HMAC-SHA1 signing for [`ProtectionMode::Sign`] and AES-256-CFB
//! encryption with HKDF-SHA256 key derivation for [`ProtectionMode::Encrypt`].
//! Each encrypted message carries a fresh random IV, transmitted as
//! `IV || ciphertext`.
//!
//! [`ProtectionMode::Sign`]: crate::config::ProtectionMode::Sign
//! [`ProtectionMode::Encrypt`]: crate::config::ProtectionMode::Encrypt

use aes::Aes256;
use cfb_mode::cipher::generic_array::GenericArray;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::{ClientError, Result};

type HmacSha1 = Hmac<Sha1>;
type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// AES block size; the per-message IV is exactly one block.
const IV_LEN: usize = 16;

/// Compute the HMAC-SHA1 signature of the raw (unencoded) payload bytes.
///
/// Returns a hex digest suitable for the `signature` form field. The
/// collector recomputes this over the decoded payload to verify
/// authenticity. SHA-1 is what the collector's verification side speaks;
/// it is keyed here, not used as a bare digest.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha1 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Derive a 256-bit cipher key from the configured secret using HKDF-SHA256.
///
/// Uses a fixed salt (`beacon-collect-v1`) and info string
/// (`payload-encryption-key`) to produce a deterministic key for any given
/// secret, so arbitrary-length secrets are usable as key material.
pub fn derive_key(secret: &str) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(b"beacon-collect-v1"), secret.as_bytes());
    let mut key = [0u8; 32];
    hk.expand(b"payload-encryption-key", &mut key)
        .expect("32 bytes is a valid HKDF output length");
    key
}

/// Encrypt a payload with AES-256-CFB under an HKDF-derived key.
///
/// A fresh random 16-byte IV is generated per message and prepended to the
/// ciphertext, so the output format is `IV || ciphertext`. Callers
/// base64-encode the result for the wire.
pub fn encrypt_payload(secret: &str, body: &[u8]) -> Result<Vec<u8>> {
    let key = derive_key(secret);

    let mut iv = [0u8; IV_LEN];
    use rand::RngCore;
    rand::thread_rng().fill_bytes(&mut iv);

    let mut buf = body.to_vec();
    Aes256CfbEnc::new(&key.into(), &iv.into()).encrypt(&mut buf);

    let mut out = Vec::with_capacity(IV_LEN + buf.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf);
    Ok(out)
}

/// Decrypt a payload produced by [`encrypt_payload`].
///
/// Expects `IV || ciphertext`. Used in tests and as a reference
/// implementation for collector-side consumers.
pub fn decrypt_payload(secret: &str, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < IV_LEN {
        return Err(ClientError::Crypto(
            "ciphertext too short: missing IV".to_string(),
        ));
    }

    let (iv, ciphertext) = data.split_at(IV_LEN);
    let key = derive_key(secret);

    // split_at guarantees the IV slice is exactly one block
    let mut buf = ciphertext.to_vec();
    Aes256CfbDec::new(&key.into(), GenericArray::from_slice(iv)).decrypt(&mut buf);
    Ok(buf)
}
