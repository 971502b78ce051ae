//! Error types for kdbx2-core

use thiserror::Error;

/// Result type alias for kdbx2-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the public database operations.
///
/// Anything that goes wrong below the argument-validation layer is wrapped
/// into [`Error::Unreadable`] (read path) or [`Error::Unwriteable`] (write
/// path) carrying the underlying [`ErrorKind`]. Callers that want to
/// distinguish a wrong password from a corrupt file inspect the kind via
/// [`Error::kind`].
#[derive(Error, Debug)]
pub enum Error {
    /// Null or contradictory caller inputs; a programmer error, not a
    /// property of the database file.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The database could not be read.
    #[error("could not read keepass database: {0}")]
    Unreadable(#[source] ErrorKind),

    /// The database could not be written.
    #[error("could not write keepass database: {0}")]
    Unwriteable(#[source] ErrorKind),
}

impl Error {
    /// The underlying failure, if this is a read or write error.
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            Error::Unreadable(kind) | Error::Unwriteable(kind) => Some(kind),
            Error::InvalidArgument(_) => None,
        }
    }

    pub(crate) fn unreadable(kind: ErrorKind) -> Self {
        Error::Unreadable(kind)
    }

    pub(crate) fn unwriteable(kind: ErrorKind) -> Self {
        Error::Unwriteable(kind)
    }
}

/// The specific failure behind an [`Error::Unreadable`] or
/// [`Error::Unwriteable`].
#[derive(Error, Debug)]
pub enum ErrorKind {
    /// Signature matched but the file major version is not 3 (KDBX v2).
    #[error("unsupported database version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    /// Truncated header, duplicated field, or a missing required field.
    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    /// Outer cipher UUID is not AES-256-CBC or the inner random stream id is
    /// not Salsa20.
    #[error("unsupported cipher or inner stream algorithm")]
    UnsupportedCipher,

    /// Wrong key material, a corrupt file, or tampering. PKCS#7 failures and
    /// stream-start mismatches are deliberately indistinguishable.
    #[error("wrong key or corrupt database")]
    CannotDecrypt,

    /// Hashed-block index or hash mismatch in the decrypted content stream.
    #[error("corrupt content block: {0}")]
    CorruptBlock(String),

    /// GZIP failed on otherwise well-decrypted data.
    #[error("invalid compressed payload: {0}")]
    Decompression(#[source] std::io::Error),

    /// Key-file XML malformed, or the Base64 payload could not be decoded.
    #[error("invalid key file: {0}")]
    InvalidKeyFile(String),

    /// The decrypted payload is not a well-formed KeePass XML document.
    #[error("malformed database document: {0}")]
    Xml(String),

    /// The credential tree is missing the pieces a database file requires.
    #[error("invalid database model: {0}")]
    WriteValidation(String),

    /// The caller-supplied sink failed.
    #[error("i/o error: {0}")]
    Io(#[source] std::io::Error),
}
