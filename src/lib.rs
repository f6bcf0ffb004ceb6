//! Deterministic per-site password generation with passphrase-protected
//! parameter storage.
//!
//! A password is a pure function of the site token, the passphrase and a
//! handful of parameters (see [`password`]). Only the parameters are ever
//! stored, encrypted under the passphrase (see [`codec`]).

pub mod codec;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod format;
pub mod hash;
pub mod params;
pub mod password;
pub mod progress;
pub mod storage;
pub mod store;
pub mod transfer;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use zeroize::Zeroizing;

pub use crate::codec::{EncodedRecord, RecordCipher};
pub use crate::config::Settings;
pub use crate::crypto::KdfParams;
pub use crate::encoding::TextEncoding;
pub use crate::error::{CryptnosError, Result};
pub use crate::hash::HashAlgorithm;
pub use crate::params::SiteParameters;
pub use crate::password::{CharTypes, DeriveRequest, derive_password};
pub use crate::progress::{CancelFlag, Progress, Reporter, TransferState};
pub use crate::storage::Storage;
pub use crate::store::{FileStore, MemoryStore, ParamStore, SharedStore};
pub use crate::transfer::{CommitOptions, CommitReport, ImportSession};

/// Generator plus a parameter store, bound to one set of [`Settings`].
#[derive(Debug)]
pub struct Cryptnos<S: ParamStore> {
    store: S,
    settings: Settings,
}

impl Cryptnos<FileStore> {
    /// Opens the JSON store at `path`, or at [`default_store_path`].
    pub fn open(path: Option<PathBuf>, settings: Settings) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None => default_store_path()?,
        };
        Self::new(FileStore::open(Storage::new(path))?, settings)
    }
}

impl<S: ParamStore> Cryptnos<S> {
    pub fn new(store: S, settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { store, settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn cipher(&self, passphrase: &str) -> Result<RecordCipher> {
        RecordCipher::new(passphrase, &self.settings)
    }

    /// Derives the password for `params` without touching the store.
    pub fn generate(&self, params: &SiteParameters, passphrase: &str) -> Result<Zeroizing<String>> {
        params.generate(passphrase, &self.settings)
    }

    /// Refuses a passphrase that does not open the records already stored,
    /// so one store never holds records under two passphrases.
    fn check_passphrase(&self, cipher: &RecordCipher) -> Result<()> {
        if let Some((_, blob)) = self.store.list_all()?.first() {
            if let Err(CryptnosError::AuthenticationFailed) = cipher.decode(blob) {
                return Err(CryptnosError::AuthenticationFailed);
            }
        }
        Ok(())
    }

    /// Encrypts and stores `params`. Returns `true` when a record for the
    /// same site was replaced.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` when `passphrase` does not open the records
    /// already in the store; nothing is written.
    pub fn save(&mut self, params: &SiteParameters, passphrase: &str) -> Result<bool> {
        let cipher = self.cipher(passphrase)?;
        self.check_passphrase(&cipher)?;

        let encoded = cipher.encode(params)?;
        let replaced = self.store.contains(&encoded.site_key)?;
        self.store.put(&encoded.site_key, &encoded.blob)?;

        tracing::debug!(replaced, "saved site parameters");
        Ok(replaced)
    }

    /// Looks up and decrypts the parameters saved for `site`.
    pub fn load(&self, site: &str, passphrase: &str) -> Result<Option<SiteParameters>> {
        let key = crypto::site_key(site, &self.settings)?;
        match self.store.get(&key)? {
            Some(blob) => self.cipher(passphrase)?.decode(&blob).map(Some),
            None => Ok(None),
        }
    }

    pub fn remove(&mut self, site: &str) -> Result<bool> {
        let key = crypto::site_key(site, &self.settings)?;
        self.store.delete(&key)
    }

    pub fn clear(&mut self) -> Result<usize> {
        self.store.delete_all()
    }

    pub fn count(&self) -> Result<usize> {
        self.store.count()
    }

    /// Decrypts every stored record, sorted by site.
    ///
    /// Site names only exist inside the encrypted blobs, so listing needs
    /// the passphrase.
    pub fn sites(&self, passphrase: &str) -> Result<Vec<SiteParameters>> {
        let cipher = self.cipher(passphrase)?;
        self.decode_all(&cipher)
    }

    fn decode_all(&self, cipher: &RecordCipher) -> Result<Vec<SiteParameters>> {
        let mut out = self
            .store
            .list_all()?
            .iter()
            .map(|(_, blob)| cipher.decode(blob))
            .collect::<Result<Vec<_>>>()?;
        out.sort_by(|a, b| a.site().cmp(b.site()));
        Ok(out)
    }

    /// Writes saved records to an export file.
    ///
    /// Records are decrypted with `passphrase` and re-encrypted with
    /// `export_passphrase`, or `passphrase` when none is given. `sites`
    /// limits the export to the named sites.
    pub fn export(
        &self,
        path: &Path,
        passphrase: &str,
        export_passphrase: Option<&str>,
        sites: Option<&[String]>,
        reporter: &Reporter,
        cancel: &CancelFlag,
    ) -> Result<usize> {
        let records = self.selection(passphrase, sites)?;
        let cipher = self.cipher(export_passphrase.unwrap_or(passphrase))?;
        transfer::export_to_file(path, &records, &cipher, reporter, cancel)
    }

    /// Decrypts the records for `sites`, or every record when `None`.
    /// A named site without a stored record is `InvalidParameter`.
    pub fn selection(&self, passphrase: &str, sites: Option<&[String]>) -> Result<Vec<SiteParameters>> {
        let Some(sites) = sites else {
            return self.sites(passphrase);
        };

        let mut out = Vec::with_capacity(sites.len());
        for site in sites {
            match self.load(site, passphrase)? {
                Some(params) => out.push(params),
                None => {
                    return Err(CryptnosError::invalid(format!(
                        "no saved parameters for '{site}'"
                    )));
                }
            }
        }
        Ok(out)
    }

    /// Decodes an export file with `file_passphrase`. Nothing is written
    /// until [`Cryptnos::commit`].
    pub fn import(
        &self,
        path: &Path,
        file_passphrase: &str,
        reporter: &Reporter,
        cancel: &CancelFlag,
    ) -> Result<ImportSession> {
        let cipher = self.cipher(file_passphrase)?;
        transfer::import_from_file(path, &cipher, reporter, cancel)
    }

    /// Sites from `session` that already have a stored record.
    pub fn collisions(&self, session: &ImportSession) -> Result<Vec<String>> {
        session.collisions(&self.store, &self.settings)
    }

    /// Stores the selected records of `session` under `passphrase`.
    pub fn commit(
        &mut self,
        session: &mut ImportSession,
        passphrase: &str,
        options: &CommitOptions,
        reporter: &Reporter,
        cancel: &CancelFlag,
    ) -> Result<CommitReport> {
        let cipher = self.cipher(passphrase)?;
        self.check_passphrase(&cipher)?;
        session.commit(&mut self.store, &cipher, options, reporter, cancel)
    }

    /// Re-encrypts and re-fingerprints every record for `new_settings`.
    ///
    /// All records are decoded before anything is written, so a wrong
    /// passphrase leaves the store untouched. New keys are written first and
    /// stale keys removed afterwards. Returns the number of records moved.
    pub fn refresh_site_keys(&mut self, passphrase: &str, new_settings: Settings) -> Result<usize> {
        new_settings.validate()?;
        if !self.settings.requires_refresh(&new_settings) {
            self.settings = new_settings;
            return Ok(0);
        }

        let old_keys: Vec<String> = self.store.list_all()?.into_iter().map(|(k, _)| k).collect();
        let records = self.sites(passphrase)?;

        let new_cipher = RecordCipher::new(passphrase, &new_settings)?;
        let encoded = records
            .iter()
            .map(|p| new_cipher.encode(p))
            .collect::<Result<Vec<_>>>()?;

        let new_keys: HashSet<&str> = encoded.iter().map(|e| e.site_key.as_str()).collect();
        for record in &encoded {
            self.store.put(&record.site_key, &record.blob)?;
        }
        for key in old_keys.iter().filter(|k| !new_keys.contains(k.as_str())) {
            self.store.delete(key)?;
        }

        self.settings = new_settings;
        tracing::info!(records = encoded.len(), "refreshed site keys");
        Ok(encoded.len())
    }
}

/// Platform data directory location of the parameter store.
pub fn default_store_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "cryptnos")
        .ok_or_else(|| CryptnosError::StoreIo("could not determine platform directories".into()))?;

    Ok(project_dirs.data_dir().join("parameters.json"))
}
