//! Payload encryption for sensitive MinIO admin requests.
//!
//! MinIO requires request bodies that carry secrets (such as `add-user`) to
//! be encrypted with a key derived from the admin's secret key.  The
//! ciphertext layout is:
//!
//! ```text
//! salt (32) | AEAD id (1) | nonce (8) | sealed stream
//! ```
//!
//! The key is Argon2id(secret, salt) and the stream is a single final
//! ChaCha20-Poly1305 fragment in the DARE stream format: the associated data
//! is a flag byte followed by a tag sealed at sequence number 0, and data
//! fragments start at sequence number 1.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

use crate::error::BackendError;

const SALT_LEN: usize = 32;
const NONCE_PREFIX_LEN: usize = 8;
const ARGON2ID_CHACHA20POLY1305: u8 = 0x01;
const FINAL_FRAGMENT: u8 = 0x80;

/// Length of everything before the sealed stream.
pub(crate) const HEADER_LEN: usize = SALT_LEN + 1 + NONCE_PREFIX_LEN;

/// Poly1305 tag size.
pub(crate) const TAG_LEN: usize = 16;

pub(crate) fn encrypt_data(password: &str, data: &[u8]) -> Result<Vec<u8>, BackendError> {
    let mut rng = rand::rng();
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    let mut nonce = [0u8; 12];
    rng.fill_bytes(&mut nonce[..NONCE_PREFIX_LEN]);

    let params = Params::new(64 * 1024, 1, 4, Some(32)).map_err(BackendError::client)?;
    let mut key = [0u8; 32];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), &salt, &mut key)
        .map_err(BackendError::client)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));

    nonce[NONCE_PREFIX_LEN..].copy_from_slice(&0u32.to_le_bytes());
    let ad_tag = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: &[], aad: &[] })
        .map_err(BackendError::client)?;
    let mut associated_data = Vec::with_capacity(1 + TAG_LEN);
    associated_data.push(FINAL_FRAGMENT);
    associated_data.extend_from_slice(&ad_tag);

    nonce[NONCE_PREFIX_LEN..].copy_from_slice(&1u32.to_le_bytes());
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: data,
                aad: &associated_data,
            },
        )
        .map_err(BackendError::client)?;

    let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
    out.extend_from_slice(&salt);
    out.push(ARGON2ID_CHACHA20POLY1305);
    out.extend_from_slice(&nonce[..NONCE_PREFIX_LEN]);
    out.extend_from_slice(&sealed);
    Ok(out)
}
