//! # Payload Encryption
//!
//! AES-256-GCM sealing of serialized records before they reach the buffer.
//!
//! Envelope layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! A fresh random nonce is drawn from the OS for every call.

use crate::error::EncryptionError;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;

/// Required key length in bytes.
pub const KEY_LEN: usize = 32;

/// Nonce length prefixed to every envelope.
pub const NONCE_LEN: usize = 12;

/// Authenticated encryptor holding a fixed key.
pub struct PayloadEncryptor {
    cipher: Aes256Gcm,
}

impl PayloadEncryptor {
    /// Builds an encryptor from raw key bytes.
    pub fn new(key: &[u8]) -> Result<Self, EncryptionError> {
        if key.len() != KEY_LEN {
            return Err(EncryptionError::InvalidKey(format!(
                "encryption key must be {} bytes long, got {}",
                KEY_LEN,
                key.len()
            )));
        }

        Ok(PayloadEncryptor {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        })
    }

    /// Builds an encryptor from a standard base64 encoded key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, EncryptionError> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|_| EncryptionError::InvalidKey("key is not valid base64".to_string()))?;
        Self::new(&key)
    }

    /// Seals `plaintext` into a nonce-prefixed envelope.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| EncryptionError::Seal)?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    /// Opens an envelope produced by [`PayloadEncryptor::encrypt`].
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if envelope.len() < NONCE_LEN {
            return Err(EncryptionError::AuthenticationFailure);
        }

        let (nonce, ciphertext) = envelope.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| EncryptionError::AuthenticationFailure)
    }
}

impl fmt::Debug for PayloadEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadEncryptor")
            .field("cipher", &"AES-256-GCM")
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Turns a serialized record into the line persisted by the buffer.
///
/// Chosen once at startup; request handlers never check an encryption flag.
#[derive(Debug)]
pub enum RecordSealer {
    /// Records are written as-is.
    Plain,
    /// Records are written as base64 encoded envelopes.
    Encrypted(PayloadEncryptor),
}

impl RecordSealer {
    /// Returns `record` ready for appending, newline included.
    pub fn seal_line(&self, record: Vec<u8>) -> Result<Vec<u8>, EncryptionError> {
        let mut line = match self {
            RecordSealer::Plain => record,
            RecordSealer::Encrypted(encryptor) => {
                let envelope = encryptor.encrypt(&record)?;
                STANDARD.encode(envelope).into_bytes()
            }
        };
        line.push(b'\n');
        Ok(line)
    }

    /// Recovers the serialized record from one persisted line.
    pub fn open_line(&self, line: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        match self {
            RecordSealer::Plain => Ok(line.to_vec()),
            RecordSealer::Encrypted(encryptor) => {
                let envelope = STANDARD
                    .decode(line)
                    .map_err(|_| EncryptionError::InvalidEncoding)?;
                encryptor.decrypt(&envelope)
            }
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, RecordSealer::Encrypted(_))
    }
}
