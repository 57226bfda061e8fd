//! Read and write KDBX v3 (KeePass 2.x) password databases.
//!
//! The container is a layered wrapper around an XML payload: an outer
//! header with typed fields, an AES-256-CBC cipher stream keyed through
//! the AES-KDF, a self-authenticating hashed-block stream, optional gzip,
//! and a Salsa20 "inner random stream" masking the protected string values
//! inside the XML.
//!
//! ```no_run
//! use std::fs::File;
//! use kdbx3::{CompositeKey, Kdbx3Reader};
//!
//! let mut key = CompositeKey::new();
//! key.set_user_password("secret");
//! let file = File::open("passwords.kdbx").unwrap();
//! let db = Kdbx3Reader::new().read_database(file, &key).unwrap();
//! println!("{}", db.metadata().database_name);
//! ```

#[macro_use]
extern crate log;

mod error;
pub mod format;
mod header;
mod kdf;
mod key;
mod model;
mod random_stream;
mod reader;
mod streams;
mod utils;
mod writer;
mod xml;

pub use error::{Error, ErrorKind, ReadError, Result, Warning};
pub use kdf::AesKdf;
pub use key::{ChallengeResponseKey, CompositeKey};
pub use model::{
    epoch, Attachments, Attribute, AutoType, AutoTypeAssociation, Color, CustomIcon, Database,
    DeletedObject, Entry, EntryAttributes, Group, GroupId, MemoryProtection, Metadata, Times,
    TriState, NOTES_FIELD, PASSWORD_FIELD, TITLE_FIELD, URL_FIELD, USER_NAME_FIELD,
};
pub use random_stream::InnerRandomStream;
pub use reader::{Kdbx3Reader, ReaderConfig};
pub use writer::Kdbx3Writer;
pub use xml::chars::{decode_lossy, is_valid_xml_char, strip_invalid_chars};
pub use xml::{read_xml, write_xml, Kdbx3XmlReader};
