use thiserror::Error;

/// Errors produced by the derivation, encoding, storage and transfer layers.
#[derive(Debug, Error)]
pub enum CryptnosError {
    #[error("unsupported hash algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Decryption failed, almost always because of a wrong passphrase.
    #[error("wrong passphrase or tampered record")]
    AuthenticationFailed,

    #[error("corrupt data: {0}")]
    CorruptData(String),

    #[error("store I/O failure: {0}")]
    StoreIo(String),

    #[error("import failed: {imported} record(s) imported, {failed} line(s) failed")]
    PartialImportFailure { imported: usize, failed: usize },

    #[error("crypto backend failure: {0}")]
    Crypto(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl CryptnosError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CryptnosError::InvalidParameter(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        CryptnosError::CorruptData(msg.into())
    }

    pub(crate) fn store_io(err: impl std::fmt::Display) -> Self {
        CryptnosError::StoreIo(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CryptnosError>;
