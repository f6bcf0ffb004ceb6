//! Text encodings used for every byte/text conversion.

use std::fmt;
use std::str::FromStr;

use crate::error::{CryptnosError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
    Ascii,
}

impl TextEncoding {
    pub const ALL: [TextEncoding; 5] = [
        TextEncoding::Utf8,
        TextEncoding::Utf16Le,
        TextEncoding::Utf16Be,
        TextEncoding::Latin1,
        TextEncoding::Ascii,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16Le => "UTF-16LE",
            TextEncoding::Utf16Be => "UTF-16BE",
            TextEncoding::Latin1 => "ISO-8859-1",
            TextEncoding::Ascii => "US-ASCII",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();

        match normalized.as_str() {
            "UTF8" => Ok(TextEncoding::Utf8),
            "UTF16LE" => Ok(TextEncoding::Utf16Le),
            "UTF16BE" | "UTF16" => Ok(TextEncoding::Utf16Be),
            "ISO88591" | "LATIN1" => Ok(TextEncoding::Latin1),
            "USASCII" | "ASCII" => Ok(TextEncoding::Ascii),
            _ => Err(CryptnosError::invalid(format!(
                "unknown text encoding '{name}'"
            ))),
        }
    }

    /// Encodes `text`; characters the encoding cannot represent are rejected.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            TextEncoding::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            TextEncoding::Latin1 => self.encode_single_byte(text, 0xFF),
            TextEncoding::Ascii => self.encode_single_byte(text, 0x7F),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|_| CryptnosError::corrupt("invalid UTF-8 text")),
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
                if bytes.len() % 2 != 0 {
                    return Err(CryptnosError::corrupt("odd length UTF-16 text"));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| match self {
                        TextEncoding::Utf16Le => u16::from_le_bytes([pair[0], pair[1]]),
                        _ => u16::from_be_bytes([pair[0], pair[1]]),
                    })
                    .collect();
                String::from_utf16(&units).map_err(|_| CryptnosError::corrupt("invalid UTF-16 text"))
            }
            TextEncoding::Latin1 => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
            TextEncoding::Ascii => {
                if !bytes.is_ascii() {
                    return Err(CryptnosError::corrupt("non-ASCII byte in ASCII text"));
                }
                Ok(bytes.iter().map(|b| char::from(*b)).collect())
            }
        }
    }

    fn encode_single_byte(&self, text: &str, max: u32) -> Result<Vec<u8>> {
        text.chars()
            .map(|c| {
                let code = u32::from(c);
                if code <= max {
                    Ok(code as u8)
                } else {
                    Err(CryptnosError::invalid(format!(
                        "character '{c}' cannot be represented in {}",
                        self.name()
                    )))
                }
            })
            .collect()
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = CryptnosError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}
