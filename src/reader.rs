//! The container read path: header, key derivation, stream stack, payload.

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use zeroize::Zeroizing;

use crate::error::{Error, ErrorKind, ReadError, Result, Warning};
use crate::format::Compression;
use crate::header::{read_header, HeaderData};
use crate::key::CompositeKey;
use crate::model::Database;
use crate::random_stream::InnerRandomStream;
use crate::streams::{cipher_to_algorithm, HashedBlockReader, StoreDataStream, SymmetricCipherStream};
use crate::utils::sha256;
use crate::xml::Kdbx3XmlReader;

/// Knobs of the read path.
#[derive(Clone, Copy, Debug)]
pub struct ReaderConfig {
    /// Fail on the anomalies the lenient mode would repair.
    pub strict_mode: bool,
    /// Hand back the partially-built database when the XML payload (and
    /// only the XML payload) fails, so a UI can offer what was recovered.
    pub keep_partial_database_on_xml_error: bool,
    /// Keep a copy of the decrypted XML around for debugging.
    pub capture_raw_xml: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            keep_partial_database_on_xml_error: false,
            capture_raw_xml: false,
        }
    }
}

/// Reader for the KDBX 3 container. One instance can be reused; warnings
/// and captured XML belong to the most recent call.
pub struct Kdbx3Reader {
    config: ReaderConfig,
    warnings: Vec<Warning>,
    raw_xml: Option<Vec<u8>>,
}

impl Kdbx3Reader {
    pub fn new() -> Self {
        Self::with_config(ReaderConfig::default())
    }

    pub fn with_config(config: ReaderConfig) -> Self {
        Self {
            config,
            warnings: Vec::new(),
            raw_xml: None,
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// The decrypted payload of the last call, when
    /// [`ReaderConfig::capture_raw_xml`] was set.
    pub fn raw_xml(&self) -> Option<&[u8]> {
        self.raw_xml.as_deref()
    }

    /// Read a database from `device`, blocking until done.
    ///
    /// Runs entirely on the caller's thread; the AES-KDF rounds dominate,
    /// so callers wanting a responsive UI should call this from a worker.
    pub fn read_database<R: Read>(
        &mut self,
        device: R,
        key: &CompositeKey,
    ) -> std::result::Result<Database, ReadError> {
        self.warnings.clear();
        self.raw_xml = None;

        let mut db = Database::new();
        let mut header_stream = StoreDataStream::new(device);
        let header = read_header(&mut header_stream, &mut db, &mut self.warnings)
            .map_err(ReadError::from)?;
        let header_bytes = header_stream.stored_data().to_vec();
        let device = header_stream.into_inner();

        let cipher_stream = self
            .open_payload(device, &db, key, &header)
            .map_err(ReadError::from)?;

        let mut random_stream =
            InnerRandomStream::new(header.random_stream_id, &header.protected_stream_key)
                .map_err(ReadError::from)?;

        let hashed = HashedBlockReader::new(cipher_stream);
        let outcome = match db.compression() {
            Compression::Gzip => {
                self.parse_xml(GzDecoder::new(hashed), &mut db, &mut random_stream)
            }
            Compression::None => self.parse_xml(hashed, &mut db, &mut random_stream),
        };

        match outcome {
            Ok(header_hash) => {
                if let Some(expected) = header_hash {
                    if sha256(&[&header_bytes]) != expected {
                        return Err(Error::HeaderHashMismatch.into());
                    }
                }
                Ok(db)
            }
            Err(error) => {
                let database = (error.kind() == ErrorKind::Xml
                    && self.config.keep_partial_database_on_xml_error)
                    .then(|| Box::new(db));
                Err(ReadError { error, database })
            }
        }
    }

    /// Derive the final key and stack the cipher stream, verifying the
    /// stream start bytes.
    fn open_payload<R: Read>(
        &mut self,
        device: R,
        db: &Database,
        key: &CompositeKey,
        header: &HeaderData,
    ) -> Result<SymmetricCipherStream<R>> {
        let raw_key = key.raw_key();
        let transformed = db.kdf().transform_key(&raw_key)?;
        let challenge = key.challenge(&header.master_seed)?;
        let final_key = Zeroizing::new(sha256(&[
            &header.master_seed,
            &challenge,
            &transformed,
        ]));

        let cipher = cipher_to_algorithm(db.cipher())?;
        let mut cipher_stream =
            SymmetricCipherStream::new(device, cipher, &final_key, &header.encryption_iv)?;

        let mut real_start = vec![0; 32];
        cipher_stream
            .read_exact(&mut real_start)
            .map_err(Error::from_io)?;
        if real_start != header.stream_start_bytes {
            // Deliberately the same message for a wrong key and a corrupt
            // file; the format cannot tell them apart here.
            return Err(Error::WrongKey);
        }
        debug!("stream start bytes verified");
        Ok(cipher_stream)
    }

    /// Run the XML reader over the decompressed payload. Returns the
    /// declared header hash, if any.
    fn parse_xml<R: Read>(
        &mut self,
        mut source: R,
        db: &mut Database,
        random_stream: &mut InnerRandomStream,
    ) -> Result<Option<Vec<u8>>> {
        let mut xml_reader = Kdbx3XmlReader::new(self.config.strict_mode, Some(random_stream));
        let result = if self.config.capture_raw_xml {
            let mut buf = Vec::new();
            source.read_to_end(&mut buf).map_err(Error::from_io)?;
            let result = xml_reader.read(Cursor::new(&buf[..]), db);
            self.raw_xml = Some(buf);
            result
        } else {
            xml_reader.read(source, db)
        };
        self.warnings.extend(xml_reader.take_warnings());
        result.map(|()| xml_reader.header_hash().map(<[u8]>::to_vec))
    }
}

impl Default for Kdbx3Reader {
    fn default() -> Self {
        Self::new()
    }
}
