//! Encrypted record blob format.
//!
//! Provides version-aware parsing and serialization of the text-safe blob
//! stored per site and written one per line into export files.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::crypto::NONCE_LEN;
use crate::error::{CryptnosError, Result};

pub mod v1;

/// Length of version field.
pub const VER_LEN: usize = 1;
/// Latest format version
pub const CURRENT_VERSION: u8 = v1::VERSION_V1;

/// A decoded blob: everything except the key needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBlob {
    version: u8,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl RecordBlob {
    /// Creates a new blob in the current format version.
    pub fn new(nonce: [u8; NONCE_LEN], ciphertext: Vec<u8>) -> Self {
        Self {
            version: CURRENT_VERSION,
            nonce,
            ciphertext,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

/// Parses a base64 blob, dispatching on its version byte.
///
/// # Errors
///
/// `CorruptData` if the text is not base64, is too short, or names an
/// unsupported version.
pub fn parse(text: &str) -> Result<RecordBlob> {
    let data = STANDARD
        .decode(text.trim())
        .map_err(|_| CryptnosError::corrupt("record is not valid base64"))?;

    if data.len() < VER_LEN {
        return Err(CryptnosError::corrupt("record too short"));
    }

    match data[0] {
        v1::VERSION_V1 => v1::parse(&data),
        v => Err(CryptnosError::corrupt(format!("unsupported record version {v}"))),
    }
}

/// Serializes a blob to its base64 text form.
pub fn serialize(blob: &RecordBlob) -> Result<String> {
    let bytes = match blob.version() {
        v1::VERSION_V1 => v1::serialize(blob)?,
        v => return Err(CryptnosError::corrupt(format!("unsupported record version {v}"))),
    };
    Ok(STANDARD.encode(bytes))
}
