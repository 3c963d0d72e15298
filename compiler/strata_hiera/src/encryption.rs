//! Envelope encryption for values written to protected levels.
//!
//! A fresh AES-256-GCM data key encrypts the plaintext and is itself wrapped
//! with the level's RSA public key (PKCS#1 v1.5). The stored form is
//!
//! ```text
//! ENC[PKCS1-AES256GCM,<base64(len:u16be | wrapped key | nonce | ciphertext)>]
//! ```
//!
//! Values are only ever encrypted here; reading hands the envelope back
//! verbatim.

use std::path::Path;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};

use crate::document::EncryptionSettings;
use crate::errors::HieraError;

/// Scheme marker inside the `ENC[...]` wrapper.
pub const ENVELOPE_SCHEME: &str = "PKCS1-AES256GCM";

/// Encrypts plaintext into `ENC[...]` envelopes.
#[derive(Clone, Debug)]
pub struct Encryptor {
    key: RsaPublicKey,
}

impl Encryptor {
    /// Accepts both `PUBLIC KEY` (SPKI) and `RSA PUBLIC KEY` (PKCS#1) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, HieraError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| HieraError::Encryption(format!("invalid public key: {e}")))?;
        Ok(Encryptor { key })
    }

    pub fn load(settings: &EncryptionSettings) -> Result<Self, HieraError> {
        Self::from_path(&settings.public_key)
    }

    fn from_path(path: &Path) -> Result<Self, HieraError> {
        let pem = std::fs::read_to_string(path).map_err(|e| HieraError::io(path, e))?;
        Self::from_pem(&pem)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, HieraError> {
        let data_key = Aes256Gcm::generate_key(OsRng);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = Aes256Gcm::new(&data_key)
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| HieraError::Encryption(e.to_string()))?;
        let wrapped = self
            .key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, data_key.as_slice())
            .map_err(|e| HieraError::Encryption(e.to_string()))?;
        let wrapped_len = u16::try_from(wrapped.len())
            .map_err(|_| HieraError::Encryption("wrapped key too large".to_string()))?;

        let mut envelope =
            Vec::with_capacity(2 + wrapped.len() + nonce.len() + ciphertext.len());
        envelope.extend_from_slice(&wrapped_len.to_be_bytes());
        envelope.extend_from_slice(&wrapped);
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(format!("ENC[{ENVELOPE_SCHEME},{}]", STANDARD.encode(envelope)))
    }
}
