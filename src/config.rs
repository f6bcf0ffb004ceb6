//! Runtime configuration.
//!
//! Settings are passed explicitly into every derivation, encoding and
//! fingerprinting call. Nothing in the library reads ambient state except
//! [`Settings::from_env`].

use crate::crypto::KdfParams;
use crate::encoding::TextEncoding;
use crate::error::{CryptnosError, Result};

pub const ENV_ENCODING: &str = "CRYPTNOS_ENCODING";
pub const ENV_SALT: &str = "CRYPTNOS_SALT";
pub const ENV_ITERATION_WARNING: &str = "CRYPTNOS_ITERATION_WARNING";
pub const ENV_MAX_ITERATIONS: &str = "CRYPTNOS_MAX_ITERATIONS";
pub const ENV_KDF_MEM: &str = "CRYPTNOS_KDF_MEM";
pub const ENV_KDF_TIME: &str = "CRYPTNOS_KDF_TIME";

pub const DEFAULT_SALT: &str = "cryptnos";
pub const DEFAULT_ITERATION_WARNING: u32 = 100;
pub const DEFAULT_MAX_ITERATIONS: u32 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Encoding for every text to byte conversion.
    pub text_encoding: TextEncoding,
    /// Text the process-wide salt is derived from.
    pub salt: String,
    /// Iteration counts above this run on a worker with progress reports.
    pub iteration_warning: u32,
    /// Hard upper bound on iterations.
    pub max_iterations: u32,
    /// Argon2id parameters for record encryption keys.
    pub kdf: KdfParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            text_encoding: TextEncoding::default(),
            salt: DEFAULT_SALT.to_string(),
            iteration_warning: DEFAULT_ITERATION_WARNING,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            kdf: KdfParams::default(),
        }
    }
}

impl Settings {
    /// Builds settings from `CRYPTNOS_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(enc) = lookup(ENV_ENCODING) {
            settings.text_encoding = enc.parse()?;
        }
        if let Some(salt) = lookup(ENV_SALT) {
            settings.salt = salt;
        }
        if let Some(v) = lookup(ENV_ITERATION_WARNING) {
            settings.iteration_warning = parse_number(ENV_ITERATION_WARNING, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_ITERATIONS) {
            settings.max_iterations = parse_number(ENV_MAX_ITERATIONS, &v)?;
        }

        let default_kdf = KdfParams::default();
        let mem = lookup(ENV_KDF_MEM)
            .map(|v| parse_number(ENV_KDF_MEM, &v))
            .transpose()?
            .unwrap_or(default_kdf.mem_cost_kib());
        let time = lookup(ENV_KDF_TIME)
            .map(|v| parse_number(ENV_KDF_TIME, &v))
            .transpose()?
            .unwrap_or(default_kdf.time_cost());
        settings.kdf = KdfParams::new(mem, time, default_kdf.parallelism())?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.salt.is_empty() {
            return Err(CryptnosError::invalid("salt text cannot be empty"));
        }
        if self.max_iterations < 1 {
            return Err(CryptnosError::invalid("maximum iterations must be >= 1"));
        }
        self.kdf.validate()
    }

    /// True when `iterations` is slow enough to warrant a background run.
    pub fn is_slow(&self, iterations: u32) -> bool {
        iterations > self.iteration_warning
    }

    /// True when a change between `self` and `other` invalidates stored
    /// site keys and encryption keys.
    pub fn requires_refresh(&self, other: &Settings) -> bool {
        self.text_encoding != other.text_encoding || self.salt != other.salt || self.kdf != other.kdf
    }
}

fn parse_number(name: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| CryptnosError::invalid(format!("{name} must be a positive integer, got '{value}'")))
}


#[cfg(test)]
impl Settings {
    /// Default settings with a cheap KDF so tests stay fast.
    pub(crate) fn for_tests() -> Self {
        Settings {
            kdf: KdfParams::new(64, 1, 1).expect("valid test kdf"),
            ..Settings::default()
        }
    }
}
