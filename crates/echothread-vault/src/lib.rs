// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SecretBox: authenticated symmetric encryption of small blobs at rest.
//!
//! Tokens, cookie jars, and settings are sealed with AES-256-GCM under one
//! process-wide key derived from the `COOKIE_ENCRYPTION_KEY` environment
//! variable. The key is loaded exactly once at startup; its absence is a
//! fatal configuration error.

pub mod crypto;
pub mod kdf;

use echothread_core::EchoError;
use zeroize::Zeroizing;

/// Environment variable holding the encryption passphrase.
pub const KEY_ENV_VAR: &str = "COOKIE_ENCRYPTION_KEY";

/// Process-wide sealer for at-rest secrets.
pub struct SecretBox {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").field("key", &"[redacted]").finish()
    }
}

impl SecretBox {
    /// Builds a SecretBox from the `COOKIE_ENCRYPTION_KEY` env var.
    pub fn from_env() -> Result<Self, EchoError> {
        let passphrase = std::env::var(KEY_ENV_VAR).map_err(|_| {
            EchoError::Config(format!(
                "{KEY_ENV_VAR} is required; set it to a strong passphrase"
            ))
        })?;
        if passphrase.is_empty() {
            return Err(EchoError::Config(format!("{KEY_ENV_VAR} must not be empty")));
        }
        Ok(Self::from_passphrase(&passphrase))
    }

    /// Builds a SecretBox from an explicit passphrase.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self {
            key: kdf::derive_key(passphrase.as_bytes()),
        }
    }

    /// Encrypts `plaintext` into a self-contained envelope.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, EchoError> {
        crypto::seal(&self.key, plaintext)
    }

    /// Decrypts an envelope produced by [`seal`](Self::seal).
    ///
    /// Fails with [`EchoError::Auth`] on tamper or key mismatch.
    pub fn open(&self, envelope: &[u8]) -> Result<Vec<u8>, EchoError> {
        crypto::open(&self.key, envelope)
    }

    /// Seals a UTF-8 string.
    pub fn seal_str(&self, plaintext: &str) -> Result<Vec<u8>, EchoError> {
        self.seal(plaintext.as_bytes())
    }

    /// Opens an envelope expected to hold UTF-8.
    pub fn open_str(&self, envelope: &[u8]) -> Result<String, EchoError> {
        let bytes = self.open(envelope)?;
        String::from_utf8(bytes)
            .map_err(|_| EchoError::Auth("decrypted value is not valid UTF-8".to_string()))
    }
}
