//! Cryptographic primitives for parameter records.
//!
//! Provides key derivation, authenticated encryption, and the salt and
//! site-key fingerprints derived from the configured salt text.

pub mod aead;
pub mod kdf;

pub use aead::{decrypt, encrypt};
pub use kdf::{KdfParams, derive_key};

use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};

use crate::config::Settings;
use crate::error::Result;

/// Length of the process-wide salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the nonce (24 bytes for XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;
/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;

/// Derives the process-wide salt from the configured salt text.
pub fn process_salt(settings: &Settings) -> Result<[u8; SALT_LEN]> {
    let encoded = settings.text_encoding.encode(&settings.salt)?;
    let digest = Sha256::digest(&encoded);

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&digest[..SALT_LEN]);
    Ok(salt)
}

/// Storage lookup key for `site`.
///
/// Depends on the site text, the text encoding and the salt, so changing
/// either setting requires re-fingerprinting every stored record.
pub fn site_key(site: &str, settings: &Settings) -> Result<String> {
    let salt = process_salt(settings)?;
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(settings.text_encoding.encode(site)?);
    Ok(STANDARD.encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::TextEncoding;

    #[test]
    fn site_key_is_deterministic() {
        let settings = Settings::default();
        let a = site_key("example.com", &settings).unwrap();
        let b = site_key("example.com", &settings).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn site_key_is_case_sensitive() {
        let settings = Settings::default();
        assert_ne!(
            site_key("Example.com", &settings).unwrap(),
            site_key("example.com", &settings).unwrap()
        );
    }

    #[test]
    fn site_key_depends_on_salt_and_encoding() {
        let base = Settings::default();
        let salted = Settings {
            salt: "other".into(),
            ..Settings::default()
        };
        let utf16 = Settings {
            text_encoding: TextEncoding::Utf16Le,
            ..Settings::default()
        };

        let k = site_key("example.com", &base).unwrap();
        assert_ne!(k, site_key("example.com", &salted).unwrap());
        assert_ne!(k, site_key("example.com", &utf16).unwrap());
    }
}
