//! Record format v1.
//!
//! ```text
//! VERSION (1) | NONCE (24) | CIPHERTEXT (plaintext record + 16 byte tag)
//! ```

use super::{RecordBlob, VER_LEN};
use crate::crypto::NONCE_LEN;
use crate::error::{CryptnosError, Result};

pub const VERSION_V1: u8 = 1;

const TAG_LEN: usize = 16;
const HEADER_LEN: usize = VER_LEN + NONCE_LEN;

/// Parses raw v1 bytes.
///
/// # Errors
///
/// `CorruptData` if the data cannot hold a nonce and an AEAD tag.
pub fn parse(data: &[u8]) -> Result<RecordBlob> {
    if data.len() < HEADER_LEN + TAG_LEN {
        return Err(CryptnosError::corrupt("record too short for v1"));
    }

    let nonce: [u8; NONCE_LEN] = data[VER_LEN..HEADER_LEN]
        .try_into()
        .map_err(|_| CryptnosError::corrupt("invalid nonce length"))?;
    let ciphertext = data[HEADER_LEN..].to_vec();

    Ok(RecordBlob {
        version: VERSION_V1,
        nonce,
        ciphertext,
    })
}

/// Serializes a blob to raw v1 bytes.
pub fn serialize(blob: &RecordBlob) -> Result<Vec<u8>> {
    if blob.version() != VERSION_V1 {
        return Err(CryptnosError::corrupt("wrong version for v1 serializer"));
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + blob.ciphertext().len());
    buf.push(VERSION_V1);
    buf.extend_from_slice(blob.nonce());
    buf.extend_from_slice(blob.ciphertext());
    Ok(buf)
}
