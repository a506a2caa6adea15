//! Field-level encryption and pseudonymous user hashing.
//!
//! Tokens are URL-safe base64 of `nonce(12) || ciphertext || tag(16)` under
//! AES-256-GCM. The key comes from `ENCRYPTION_KEY` (base64 of 32 bytes).

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use transcargo_core::{Error, Result};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Symmetric cipher for personal-data fields.
pub struct FieldCipher {
    key: Option<Vec<u8>>,
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher")
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl FieldCipher {
    /// Build from the configured key. A missing or malformed key is not an
    /// error here; operations report it when they need the key.
    pub fn new(encoded_key: Option<&str>) -> Self {
        let key = encoded_key.and_then(decode_key);
        if encoded_key.is_some() && key.is_none() {
            tracing::warn!("ENCRYPTION_KEY is not valid base64");
        }
        Self { key }
    }

    pub fn is_configured(&self) -> bool {
        self.key.as_ref().is_some_and(|k| k.len() == KEY_LEN)
    }

    /// Serialize `data` to JSON and encrypt it.
    pub fn encrypt<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        let plaintext = serde_json::to_vec(data)?;
        self.seal(&plaintext)
    }

    /// Decrypt a token produced by [`FieldCipher::encrypt`].
    pub fn decrypt<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let plaintext = self.open(token)?;
        serde_json::from_slice(&plaintext).map_err(|_| Error::InvalidCiphertext)
    }

    pub fn encrypt_text(&self, text: &str) -> Result<String> {
        self.seal(text.as_bytes())
    }

    pub fn decrypt_text(&self, token: &str) -> Result<String> {
        let plaintext = self.open(token)?;
        String::from_utf8(plaintext).map_err(|_| Error::InvalidCiphertext)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| Error::Configuration("ENCRYPTION_KEY is not set".into()))?;
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            Error::Configuration(format!("ENCRYPTION_KEY must decode to {} bytes", KEY_LEN))
        })?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| Error::Internal("encryption failed".into()))?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&ciphertext);
        Ok(URL_SAFE.encode(token))
    }

    fn open(&self, token: &str) -> Result<Vec<u8>> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| Error::Configuration("ENCRYPTION_KEY is not set".into()))?;
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::InvalidCiphertext)?;

        let raw = URL_SAFE
            .decode(token.trim().as_bytes())
            .map_err(|_| Error::InvalidCiphertext)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::InvalidCiphertext);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| Error::InvalidCiphertext)
    }
}

/// Generate a fresh key suitable for `ENCRYPTION_KEY`.
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    URL_SAFE.encode(key)
}

fn decode_key(encoded: &str) -> Option<Vec<u8>> {
    let trimmed = encoded.trim().as_bytes();
    [&URL_SAFE, &URL_SAFE_NO_PAD, &STANDARD, &STANDARD_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(trimmed).ok())
}

// ---------------------------------------------------------------
// Pseudonymization
// ---------------------------------------------------------------

/// Keep a leading `+` and the digits; drop everything else.
pub fn normalize_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    let mut out = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    out
}

/// Stable pseudonymous identifier for a data subject: lower-case hex SHA-256
/// of `"{normalized email}|{normalized phone}"`.
pub fn pseudonymize(email: &str, phone: &str) -> String {
    let normalized = format!("{}|{}", email.trim().to_lowercase(), normalize_phone(phone));
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Whether `s` looks like a value produced by [`pseudonymize`].
pub fn is_user_hash(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
