//! Saved per-site generation parameters.

use zeroize::Zeroizing;

use crate::config::Settings;
use crate::error::{CryptnosError, Result};
use crate::hash::HashAlgorithm;
use crate::password::{self, CharTypes, DeriveRequest};

/// Separates fields in the plaintext record; forbidden inside a site token.
pub const DELIMITER: char = '|';
const FIELD_COUNT: usize = 5;

/// Everything needed to regenerate a site's password except the passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteParameters {
    site: String,
    hash: HashAlgorithm,
    iterations: u32,
    char_types: CharTypes,
    char_limit: usize,
}

impl SiteParameters {
    /// Validates and builds a record. An out-of-range `char_limit` is
    /// coerced to 0 (no limit).
    pub fn new(
        site: &str,
        hash: HashAlgorithm,
        iterations: u32,
        char_types: CharTypes,
        char_limit: usize,
        settings: &Settings,
    ) -> Result<Self> {
        validate_site(site)?;

        if iterations < 1 || iterations > settings.max_iterations {
            return Err(CryptnosError::invalid(format!(
                "iterations must be between 1 and {}",
                settings.max_iterations
            )));
        }

        Ok(Self {
            site: site.to_string(),
            hash,
            iterations,
            char_types,
            char_limit: coerce_char_limit(char_limit, hash),
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn char_types(&self) -> CharTypes {
        self.char_types
    }

    pub fn char_limit(&self) -> usize {
        self.char_limit
    }

    /// Regenerates the site password with `passphrase`.
    pub fn generate(&self, passphrase: &str, settings: &Settings) -> Result<Zeroizing<String>> {
        password::derive_password(
            &self.site,
            passphrase,
            self.hash,
            self.iterations,
            self.char_types,
            self.char_limit,
            settings,
        )
    }

    /// Derivation request for these parameters, for background runs.
    pub fn request(&self, passphrase: &str) -> DeriveRequest {
        DeriveRequest {
            site: self.site.clone(),
            passphrase: Zeroizing::new(passphrase.to_string()),
            hash: self.hash,
            iterations: self.iterations,
            char_types: self.char_types,
            char_limit: self.char_limit,
        }
    }

    /// `site|hash|iterations|charTypes|charLimit`
    pub fn to_record(&self) -> Zeroizing<String> {
        Zeroizing::new(format!(
            "{site}{d}{hash}{d}{iter}{d}{types}{d}{limit}",
            site = self.site,
            hash = self.hash.name(),
            iter = self.iterations,
            types = self.char_types.code(),
            limit = self.char_limit,
            d = DELIMITER,
        ))
    }

    /// Parses a plaintext record. Any structural problem, including an
    /// iteration count above `settings.max_iterations`, is `CorruptData`.
    pub fn from_record(record: &str, settings: &Settings) -> Result<Self> {
        let fields: Vec<&str> = record.split(DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return Err(CryptnosError::corrupt(format!(
                "expected {FIELD_COUNT} fields, found {}",
                fields.len()
            )));
        }

        let site = fields[0];
        if site.is_empty() {
            return Err(CryptnosError::corrupt("empty site in record"));
        }

        let hash = HashAlgorithm::from_name(fields[1])
            .map_err(|_| CryptnosError::corrupt(format!("unknown hash '{}'", fields[1])))?;

        let iterations: u32 = fields[2]
            .parse()
            .map_err(|_| CryptnosError::corrupt("iterations is not a number"))?;
        if iterations < 1 || iterations > settings.max_iterations {
            return Err(CryptnosError::corrupt(format!(
                "iterations {iterations} outside 1..={}",
                settings.max_iterations
            )));
        }

        let char_types = fields[3]
            .parse::<u8>()
            .ok()
            .and_then(CharTypes::from_code)
            .ok_or_else(|| CryptnosError::corrupt(format!("unknown char types '{}'", fields[3])))?;

        let char_limit: usize = fields[4]
            .parse()
            .map_err(|_| CryptnosError::corrupt("char limit is not a number"))?;

        Ok(Self {
            site: site.to_string(),
            hash,
            iterations,
            char_types,
            char_limit: coerce_char_limit(char_limit, hash),
        })
    }
}

pub fn validate_site(site: &str) -> Result<()> {
    if site.is_empty() {
        return Err(CryptnosError::invalid("site cannot be empty"));
    }
    if site.contains(DELIMITER) {
        return Err(CryptnosError::invalid(format!(
            "site cannot contain '{DELIMITER}'"
        )));
    }
    if site.contains(['\n', '\r']) {
        return Err(CryptnosError::invalid("site cannot contain line breaks"));
    }
    Ok(())
}

fn coerce_char_limit(char_limit: usize, hash: HashAlgorithm) -> usize {
    if char_limit > hash.encoded_len() {
        tracing::warn!(
            char_limit,
            max = hash.encoded_len(),
            %hash,
            "char limit out of range, using no limit"
        );
        0
    } else {
        char_limit
    }
}
