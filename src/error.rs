//! Error taxonomy of the reader and writer.

use std::fmt;
use std::io;

use thiserror::Error;
use uuid::Uuid;

use crate::model::Database;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while reading or writing a database.
///
/// [`Error::kind`] maps each variant onto the coarse categories callers
/// usually branch on (format, crypto, integrity, I/O, XML payload).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Not a KeePass database.")]
    InvalidSignature,

    #[error(
        "The selected file is an old KeePass 1 database (.kdb).\n\n\
         You can import it by clicking on Database > 'Import KeePass 1 database...'.\n\
         This is a one-way migration. You won't be able to open the imported \
         database with the old KeePassX 0.4 version."
    )]
    Kdb1Database,

    #[error("Unsupported KeePass KDBX 2 or 3 database version.")]
    UnsupportedVersion,

    #[error("Invalid header field: {0}")]
    InvalidHeaderField(&'static str),

    #[error("missing database headers")]
    MissingHeaders,

    #[error("Unsupported cipher")]
    UnsupportedCipher,

    #[error("Unsupported compression algorithm")]
    UnsupportedCompression,

    #[error("Invalid inner random stream cipher")]
    InvalidRandomStream,

    #[error("Unable to calculate master key")]
    KeyTransform,

    #[error("Unable to issue challenge-response.")]
    ChallengeResponse,

    #[error("Wrong key or database file is corrupt.")]
    WrongKey,

    #[error("invalid padding")]
    InvalidPadding,

    #[error("block index out of order")]
    BlockIndexMismatch,

    #[error("block hash mismatch")]
    BlockHashMismatch,

    #[error("block size invalid")]
    BlockSizeInvalid,

    #[error("Header doesn't match hash")]
    HeaderHashMismatch,

    #[error("XML error: {0}")]
    Xml(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Coarse category of an [`Error`], mirroring the format's error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Crypto,
    Integrity,
    Io,
    Xml,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidSignature
            | Error::Kdb1Database
            | Error::UnsupportedVersion
            | Error::InvalidHeaderField(_)
            | Error::MissingHeaders
            | Error::UnsupportedCompression
            | Error::InvalidRandomStream => ErrorKind::Format,
            Error::UnsupportedCipher
            | Error::KeyTransform
            | Error::ChallengeResponse
            | Error::InvalidPadding => ErrorKind::Crypto,
            Error::WrongKey
            | Error::BlockIndexMismatch
            | Error::BlockHashMismatch
            | Error::BlockSizeInvalid
            | Error::HeaderHashMismatch => ErrorKind::Integrity,
            Error::Xml(_) => ErrorKind::Xml,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Wrap into an `io::Error` so the value survives a `Read`/`Write`
    /// stream boundary; [`Error::from_io`] unwraps it on the other side.
    pub(crate) fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, self)
    }

    /// Recover an [`Error`] smuggled through [`Error::into_io`], falling
    /// back to plain [`Error::Io`].
    pub(crate) fn from_io(err: io::Error) -> Error {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(err) => Error::Io(err),
        }
    }

    /// Re-create the stream-layer variants from a shared reference; used
    /// when a smuggled error can only be observed through `&io::Error`.
    pub(crate) fn replicate(&self) -> Option<Error> {
        Some(match self {
            Error::InvalidPadding => Error::InvalidPadding,
            Error::BlockIndexMismatch => Error::BlockIndexMismatch,
            Error::BlockHashMismatch => Error::BlockHashMismatch,
            Error::BlockSizeInvalid => Error::BlockSizeInvalid,
            Error::WrongKey => Error::WrongKey,
            _ => return None,
        })
    }
}

/// A failed [`crate::Kdbx3Reader::read_database`] call.
///
/// When the failure happened inside the XML payload and the caller opted in
/// via `keep_partial_database_on_xml_error`, the partially built database is
/// carried along so it can still be inspected.
#[derive(Debug)]
pub struct ReadError {
    pub error: Error,
    pub database: Option<Box<Database>>,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<Error> for ReadError {
    fn from(error: Error) -> Self {
        ReadError { error, database: None }
    }
}

/// Non-fatal findings reported by the lenient parser (and a few that both
/// modes report).
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Warning {
    #[error("group without uuid, assigned {0}")]
    GroupUuidRepaired(Uuid),

    #[error("entry without uuid, assigned {0}")]
    EntryUuidRepaired(Uuid),

    #[error("history item uuid rewritten to {0}")]
    HistoryUuidRepaired(Uuid),

    #[error("incomplete deleted object dropped")]
    DeletedObjectDropped,

    #[error("{element} references unknown uuid {uuid}")]
    UnresolvedReference { element: String, uuid: Uuid },

    #[error("attachment {key:?} references unknown binary {id:?}")]
    UnresolvedBinaryRef { key: String, id: String },

    #[error("icon id {requested} out of range, clamped to {used}")]
    IconIdClamped { requested: i64, used: i32 },

    #[error("unknown header field id {0}")]
    UnknownHeaderField(u8),
}
