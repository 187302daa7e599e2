//! Error taxonomy shared by every component of the decryption core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the page codec, database pipeline, image codec and
/// batch orchestrator. Each per-file pipeline run surfaces exactly one
/// variant; callers must not assume any I/O happened on `InvalidKey`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Hex parse failure, wrong key length, or a page-1 MAC mismatch when
    /// validation is enabled.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Authentication failure on a page. Fatal on any page after the
    /// first; treated as "wrong key" on page 1 when validation is skipped.
    #[error("MAC verification failed on page {page}")]
    MacMismatch { page: u32 },

    /// Structural problems with the input that are not a key/MAC issue:
    /// wrong file size, truncated image header, header field overrun,
    /// unsupported V4 signature.
    #[error("corrupt input: {reason}")]
    CorruptInput { reason: String },

    /// A cryptographic primitive returned an error on well-formed input.
    #[error("cryptographic primitive failure: {0}")]
    CryptoFailure(String),

    /// Filesystem error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image signature is a recognized-but-unimplemented V4 variant.
    #[error("unsupported image container version")]
    UnsupportedVersion,

    /// PKCS#7 unpadding of the AES image segment failed.
    #[error("bad PKCS#7 padding in image AES segment")]
    BadPadding,
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
