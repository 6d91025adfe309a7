//! Secret resolution and OAuth token encryption.
//!
//! Config values such as the OpenAI API key or the Google client secret can
//! come from three places, checked in this order:
//!
//! 1. **Direct value** in the config file (`apiKey: "sk-..."`)
//! 2. **File reference** (`apiKeyFile: /run/secrets/openai`)
//! 3. **Env var reference** (`apiKeyEnvVar: OPENAI_API_KEY`)
//!
//! Access and refresh tokens are stored encrypted with AES-256-GCM; see
//! [`TokenEncryptor`].

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use secrecy::SecretString;
use std::fs;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Token encryption failed: {0}")]
    EncryptionError(String),

    #[error("Token decryption failed: {0}")]
    DecryptionError(String),

    #[error("Invalid token key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from the first non-empty source: direct value, then
/// file contents (trimmed, `~` expanded), then environment variable.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    fn non_empty(s: Option<&str>) -> Option<&str> {
        s.filter(|v| !v.is_empty())
    }

    if let Some(value) = non_empty(direct) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = non_empty(file_path) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|source| {
            SecretError::FileReadError {
                path: expanded.clone(),
                source,
            }
        })?;
        return Ok(SecretString::from(content.trim().to_string()));
    }

    if let Some(name) = non_empty(env_var) {
        return match std::env::var(name) {
            Ok(value) => Ok(SecretString::from(value.trim().to_string())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but an unconfigured secret is `Ok(None)`.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Expands a leading `~` or `~/` to the home directory. `~user` is not supported.
pub fn expand_home(path: &str) -> String {
    if path != "~" && !path.starts_with("~/") {
        return path.to_string();
    }
    match dirs::home_dir() {
        Some(home) => format!("{}{}", home.display(), &path[1..]),
        None => path.to_string(),
    }
}

/// Environment variable holding the token encryption key.
pub const TOKEN_KEY_ENV_VAR: &str = "CLEANBOX_TOKEN_KEY";

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Encrypts OAuth tokens at rest.
///
/// Ciphertext is hex-encoded `nonce || ciphertext+tag`, with a fresh random
/// nonce per call. The key is 32 bytes given as 64 hex characters.
pub struct TokenEncryptor {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEncryptor").finish_non_exhaustive()
    }
}

impl TokenEncryptor {
    /// Reads the key from `CLEANBOX_TOKEN_KEY`.
    pub fn from_env() -> Result<Self> {
        let key_hex = std::env::var(TOKEN_KEY_ENV_VAR).map_err(|_| {
            SecretError::InvalidKey(format!("environment variable {} not set", TOKEN_KEY_ENV_VAR))
        })?;
        Self::from_hex_key(key_hex.trim())
    }

    pub fn from_hex_key(key_hex: &str) -> Result<Self> {
        let key = hex_decode(key_hex).map_err(SecretError::InvalidKey)?;
        if key.len() != 32 {
            return Err(SecretError::InvalidKey(format!(
                "expected 32 bytes (64 hex chars), got {} bytes",
                key.len()
            )));
        }
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| SecretError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce_bytes)
            .map_err(|e| SecretError::EncryptionError(format!("no randomness: {}", e)))?;

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| SecretError::EncryptionError(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(hex_encode(&out))
    }

    pub fn decrypt(&self, ciphertext_hex: &str) -> Result<String> {
        let raw = hex_decode(ciphertext_hex).map_err(SecretError::DecryptionError)?;
        if raw.len() < NONCE_LEN {
            return Err(SecretError::DecryptionError("ciphertext too short".to_string()));
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| SecretError::DecryptionError(e.to_string()))?;
        String::from_utf8(plain).map_err(|e| SecretError::DecryptionError(e.to_string()))
    }

    /// Encrypts an optional token, passing `None` through.
    pub fn encrypt_optional(&self, plaintext: Option<&str>) -> Result<Option<String>> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    pub fn decrypt_optional(&self, ciphertext_hex: Option<&str>) -> Result<Option<String>> {
        ciphertext_hex.map(|c| self.decrypt(c)).transpose()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    bytes
        .iter()
        .flat_map(|b| [DIGITS[(b >> 4) as usize] as char, DIGITS[(b & 0x0f) as usize] as char])
        .collect()
}

fn hex_decode(hex: &str) -> std::result::Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err("hex string must have even length".to_string());
    }
    if !hex.is_ascii() {
        return Err("hex string must be ASCII".to_string());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| format!("invalid hex at position {}: {}", i, e))
        })
        .collect()
}
