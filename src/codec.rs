//! Passphrase-protected encoding of [`SiteParameters`].
//!
//! A record is serialized to `site|hash|iterations|charTypes|charLimit`,
//! encrypted with XChaCha20-Poly1305 under an Argon2id key derived from the
//! passphrase and the process-wide salt, and wrapped as a base64 blob. The
//! passphrase itself is never part of the output.

use std::fmt;

use zeroize::Zeroizing;

use crate::config::Settings;
use crate::crypto::{self, KEY_LEN};
use crate::error::{CryptnosError, Result};
use crate::format::{self, RecordBlob};
use crate::params::SiteParameters;

/// An encrypted record and the key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    pub site_key: String,
    pub blob: String,
}

/// Holds the derived key so a batch of records pays for Argon2 only once.
pub struct RecordCipher {
    key: Zeroizing<[u8; KEY_LEN]>,
    settings: Settings,
}

impl fmt::Debug for RecordCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCipher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RecordCipher {
    pub fn new(passphrase: &str, settings: &Settings) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(CryptnosError::invalid("passphrase cannot be empty"));
        }

        let salt = crypto::process_salt(settings)?;
        let secret = Zeroizing::new(settings.text_encoding.encode(passphrase)?);
        let key = crypto::derive_key(&secret, &salt, settings.kdf)?;

        Ok(Self {
            key,
            settings: settings.clone(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn site_key(&self, site: &str) -> Result<String> {
        crypto::site_key(site, &self.settings)
    }

    pub fn encode(&self, params: &SiteParameters) -> Result<EncodedRecord> {
        let record = params.to_record();
        let plaintext = Zeroizing::new(self.settings.text_encoding.encode(&record)?);

        let (ciphertext, nonce) = crypto::encrypt(&self.key, &plaintext)?;
        let blob = format::serialize(&RecordBlob::new(nonce, ciphertext))?;

        Ok(EncodedRecord {
            site_key: self.site_key(params.site())?,
            blob,
        })
    }

    /// Opens a blob.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` when the blob does not open under this key,
    /// `CorruptData` when the blob or the decrypted record is malformed.
    pub fn decode(&self, blob: &str) -> Result<SiteParameters> {
        let parsed = format::parse(blob)?;
        let plaintext = crypto::decrypt(&self.key, parsed.nonce(), parsed.ciphertext())?;
        let record = Zeroizing::new(self.settings.text_encoding.decode(&plaintext)?);
        SiteParameters::from_record(&record, &self.settings)
    }
}

/// Encrypts `params` under `passphrase`.
pub fn encode(params: &SiteParameters, passphrase: &str, settings: &Settings) -> Result<EncodedRecord> {
    RecordCipher::new(passphrase, settings)?.encode(params)
}

/// Decrypts a blob produced by [`encode`].
pub fn decode(blob: &str, passphrase: &str, settings: &Settings) -> Result<SiteParameters> {
    RecordCipher::new(passphrase, settings)?.decode(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::TextEncoding;
    use crate::hash::HashAlgorithm;
    use crate::password::CharTypes;
    use base64::{Engine, engine::general_purpose::STANDARD};

    fn sample(settings: &Settings) -> SiteParameters {
        SiteParameters::new(
            "example.com",
            HashAlgorithm::Sha512,
            42,
            CharTypes::AlphanumericUnderscore,
            20,
            settings,
        )
        .unwrap()
    }

    #[test]
    fn encode_decode_roundtrip() {
        let settings = Settings::for_tests();
        let params = sample(&settings);

        let encoded = encode(&params, "correct horse", &settings).unwrap();
        let decoded = decode(&encoded.blob, "correct horse", &settings).unwrap();

        assert_eq!(decoded, params);
        assert_eq!(encoded.site_key, crypto::site_key("example.com", &settings).unwrap());
    }

    #[test]
    fn roundtrip_under_utf16_with_unicode_site() {
        let settings = Settings {
            text_encoding: TextEncoding::Utf16Be,
            ..Settings::for_tests()
        };
        let params = SiteParameters::new(
            "bücher.de",
            HashAlgorithm::Md5,
            1,
            CharTypes::Numeric,
            0,
            &settings,
        )
        .unwrap();

        let cipher = RecordCipher::new("pässwörd", &settings).unwrap();
        let encoded = cipher.encode(&params).unwrap();
        assert_eq!(cipher.decode(&encoded.blob).unwrap(), params);
    }

    #[test]
    fn blob_never_contains_plaintext() {
        let settings = Settings::for_tests();
        let encoded = encode(&sample(&settings), "correct horse", &settings).unwrap();
        let raw = STANDARD.decode(&encoded.blob).unwrap();

        assert!(!encoded.blob.contains("example.com"));
        assert!(!raw.windows(11).any(|w| w == b"example.com"));
        assert!(!raw.windows(13).any(|w| w == b"correct horse"));
    }

    #[test]
    fn same_record_encrypts_differently_each_time() {
        let settings = Settings::for_tests();
        let cipher = RecordCipher::new("pw", &settings).unwrap();
        let a = cipher.encode(&sample(&settings)).unwrap();
        let b = cipher.encode(&sample(&settings)).unwrap();
        assert_ne!(a.blob, b.blob);
        assert_eq!(a.site_key, b.site_key);
    }

    #[test]
    fn wrong_passphrase_is_authentication_failure() {
        let settings = Settings::for_tests();
        let encoded = encode(&sample(&settings), "passphrase A", &settings).unwrap();

        assert!(matches!(
            decode(&encoded.blob, "passphrase B", &settings),
            Err(CryptnosError::AuthenticationFailed)
        ));
    }

    #[test]
    fn different_salt_is_authentication_failure() {
        let settings = Settings::for_tests();
        let encoded = encode(&sample(&settings), "pw", &settings).unwrap();
        let other = Settings {
            salt: "pepper".into(),
            ..Settings::for_tests()
        };

        assert!(matches!(
            decode(&encoded.blob, "pw", &other),
            Err(CryptnosError::AuthenticationFailed)
        ));
    }

    #[test]
    fn garbage_is_corrupt_not_authentication() {
        let settings = Settings::for_tests();
        assert!(matches!(
            decode("%%% not a record %%%", "pw", &settings),
            Err(CryptnosError::CorruptData(_))
        ));
    }

    #[test]
    fn well_encrypted_but_malformed_record_is_corrupt() {
        let settings = Settings::for_tests();
        let cipher = RecordCipher::new("pw", &settings).unwrap();

        let (ciphertext, nonce) = crypto::encrypt(&cipher.key, b"only|three|fields").unwrap();
        let blob = format::serialize(&RecordBlob::new(nonce, ciphertext)).unwrap();

        assert!(matches!(cipher.decode(&blob), Err(CryptnosError::CorruptData(_))));
    }

    #[test]
    fn record_above_max_iterations_is_corrupt() {
        let settings = Settings::for_tests();
        let cipher = RecordCipher::new("pw", &settings).unwrap();

        let (ciphertext, nonce) = crypto::encrypt(&cipher.key, b"example.com|SHA-1|9999|0|0").unwrap();
        let blob = format::serialize(&RecordBlob::new(nonce, ciphertext)).unwrap();

        assert!(matches!(cipher.decode(&blob), Err(CryptnosError::CorruptData(_))));
    }

    #[test]
    fn empty_passphrase_is_rejected() {
        assert!(matches!(
            RecordCipher::new("", &Settings::for_tests()),
            Err(CryptnosError::InvalidParameter(_))
        ));
    }

    #[test]
    fn unencodable_site_fails_before_encryption() {
        let settings = Settings {
            text_encoding: TextEncoding::Ascii,
            ..Settings::for_tests()
        };
        let params = SiteParameters::new(
            "bücher.de",
            HashAlgorithm::Sha1,
            1,
            CharTypes::AllCharacters,
            0,
            &settings,
        )
        .unwrap();

        assert!(matches!(
            encode(&params, "pw", &settings),
            Err(CryptnosError::InvalidParameter(_))
        ));
    }
}
