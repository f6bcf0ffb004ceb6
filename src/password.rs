//! Deterministic password derivation.
//!
//! The byte-level construction is a compatibility contract; changing any
//! step changes every password a user has ever generated:
//!
//! ```text
//! input = encode(site) ++ encode(passphrase)
//! d1    = H(input)
//! dk    = H(d(k-1))                 for k in 2..=iterations
//! text  = base64_padded(d_iterations)
//! out   = truncate(char_filter(text), char_limit)
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use base64::{Engine, engine::general_purpose::STANDARD};
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::error::{CryptnosError, Result};
use crate::hash::HashAlgorithm;
use crate::progress::{Progress, Reporter};

const BASE64_ALPHABET: &[u8; 65] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/=";

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const ALPHABETIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const NUMERIC: &[u8] = b"0123456789";

/// Which character classes survive in the generated password.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CharTypes {
    /// Base64 text as is, including `+`, `/` and `=`.
    #[default]
    AllCharacters,
    /// Letters and digits; everything else becomes `_`.
    AlphanumericUnderscore,
    /// Mixed-case letters and digits.
    Alphanumeric,
    /// Mixed-case letters only.
    Alphabetic,
    /// Digits only.
    Numeric,
}

impl CharTypes {
    pub const ALL: [CharTypes; 5] = [
        CharTypes::AllCharacters,
        CharTypes::AlphanumericUnderscore,
        CharTypes::Alphanumeric,
        CharTypes::Alphabetic,
        CharTypes::Numeric,
    ];

    /// Numeric code stored in parameter records.
    pub fn code(&self) -> u8 {
        match self {
            CharTypes::AllCharacters => 0,
            CharTypes::AlphanumericUnderscore => 1,
            CharTypes::Alphanumeric => 2,
            CharTypes::Alphabetic => 3,
            CharTypes::Numeric => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CharTypes::AllCharacters => "all",
            CharTypes::AlphanumericUnderscore => "alnum-underscore",
            CharTypes::Alphanumeric => "alnum",
            CharTypes::Alphabetic => "alpha",
            CharTypes::Numeric => "numeric",
        }
    }

    /// Maps every character of `encoded` into the allowed class. Output has
    /// the same length as the input.
    pub fn apply(&self, encoded: &str) -> String {
        let allowed: &[u8] = match self {
            CharTypes::AllCharacters => return encoded.to_string(),
            CharTypes::AlphanumericUnderscore => {
                return encoded
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                    .collect();
            }
            CharTypes::Alphanumeric => ALPHANUMERIC,
            CharTypes::Alphabetic => ALPHABETIC,
            CharTypes::Numeric => NUMERIC,
        };

        encoded
            .bytes()
            .map(|b| {
                if allowed.contains(&b) {
                    char::from(b)
                } else {
                    let index = BASE64_ALPHABET.iter().position(|a| *a == b).unwrap_or(0);
                    char::from(allowed[index % allowed.len()])
                }
            })
            .collect()
    }
}

impl fmt::Display for CharTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CharTypes {
    type Err = CryptnosError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return Self::from_code(code)
                .ok_or_else(|| CryptnosError::invalid(format!("unknown char types code {code}")));
        }
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CryptnosError::invalid(format!("unknown char types '{s}'")))
    }
}

/// Everything the derivation depends on apart from the settings.
#[derive(Clone)]
pub struct DeriveRequest {
    pub site: String,
    pub passphrase: Zeroizing<String>,
    pub hash: HashAlgorithm,
    pub iterations: u32,
    pub char_types: CharTypes,
    pub char_limit: usize,
}

impl fmt::Debug for DeriveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeriveRequest")
            .field("site", &self.site)
            .field("hash", &self.hash)
            .field("iterations", &self.iterations)
            .field("char_types", &self.char_types)
            .field("char_limit", &self.char_limit)
            .finish_non_exhaustive()
    }
}

/// Derives the password for `site`.
///
/// # Errors
///
/// `InvalidParameter` for an empty passphrase or site, iterations outside
/// `1..=settings.max_iterations`, a char limit above the encoded length of
/// `hash`, or text the configured encoding cannot represent.
pub fn derive_password(
    site: &str,
    passphrase: &str,
    hash: HashAlgorithm,
    iterations: u32,
    char_types: CharTypes,
    char_limit: usize,
    settings: &Settings,
) -> Result<Zeroizing<String>> {
    let request = DeriveRequest {
        site: site.to_string(),
        passphrase: Zeroizing::new(passphrase.to_string()),
        hash,
        iterations,
        char_types,
        char_limit,
    };
    derive_with_progress(&request, settings, &Reporter::silent())
}

/// Same as [`derive_password`], reporting each completed iteration.
pub fn derive_with_progress(
    request: &DeriveRequest,
    settings: &Settings,
    reporter: &Reporter,
) -> Result<Zeroizing<String>> {
    validate(request, settings)?;

    if settings.is_slow(request.iterations) {
        tracing::warn!(
            iterations = request.iterations,
            threshold = settings.iteration_warning,
            "iteration count above warning threshold"
        );
    }

    let enc = settings.text_encoding;
    let mut input = Zeroizing::new(enc.encode(&request.site)?);
    input.extend_from_slice(&enc.encode(&request.passphrase)?);

    let mut digest = Zeroizing::new(request.hash.digest(&input));
    reporter.send(Progress::Iteration {
        current: 1,
        total: request.iterations,
    });
    for current in 2..=request.iterations {
        digest = Zeroizing::new(request.hash.digest(&digest));
        reporter.send(Progress::Iteration {
            current,
            total: request.iterations,
        });
    }

    let encoded = Zeroizing::new(STANDARD.encode(digest.as_slice()));
    let mut password = Zeroizing::new(request.char_types.apply(&encoded));
    if request.char_limit > 0 {
        password.truncate(request.char_limit);
    }

    tracing::debug!(hash = %request.hash, iterations = request.iterations, "derived password");
    Ok(password)
}

/// Runs the derivation on a worker thread, streaming iteration progress.
pub fn spawn_derive(
    request: DeriveRequest,
    settings: Settings,
) -> (
    JoinHandle<Result<Zeroizing<String>>>,
    mpsc::Receiver<Progress>,
) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let reporter = Reporter::new(tx);
        derive_with_progress(&request, &settings, &reporter)
    });
    (handle, rx)
}

fn validate(request: &DeriveRequest, settings: &Settings) -> Result<()> {
    if request.site.is_empty() {
        return Err(CryptnosError::invalid("site cannot be empty"));
    }
    if request.passphrase.is_empty() {
        return Err(CryptnosError::invalid("passphrase cannot be empty"));
    }
    if request.iterations < 1 {
        return Err(CryptnosError::invalid("iterations must be >= 1"));
    }
    if request.iterations > settings.max_iterations {
        return Err(CryptnosError::invalid(format!(
            "iterations must be <= {}",
            settings.max_iterations
        )));
    }
    if request.char_limit > request.hash.encoded_len() {
        return Err(CryptnosError::invalid(format!(
            "char limit {} exceeds {} characters for {}",
            request.char_limit,
            request.hash.encoded_len(),
            request.hash
        )));
    }
    Ok(())
}
