//! The container write path, mirroring the reader. Exists primarily so a
//! database can be saved and so round-trips are verifiable.

use std::io::Write;

use flate2::write::GzEncoder;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::format::Compression;
use crate::header::{write_header, HeaderData};
use crate::key::CompositeKey;
use crate::model::Database;
use crate::random_stream::InnerRandomStream;
use crate::streams::{cipher_to_algorithm, HashedBlockWriter, SymmetricCipherWriter};
use crate::utils::sha256;
use crate::xml::write_xml;

pub struct Kdbx3Writer;

impl Kdbx3Writer {
    /// Encrypt and write `db` to `sink` under `key`.
    ///
    /// Header secrets (master seed, IV, protected stream key, start bytes)
    /// and the KDF seed are regenerated on every save. The SHA-256 of the
    /// emitted header is embedded as `Meta/HeaderHash`.
    pub fn write_database<W: Write>(
        sink: &mut W,
        db: &mut Database,
        key: &CompositeKey,
    ) -> Result<()> {
        db.kdf_mut().randomize_seed();
        let header = HeaderData::generate();

        let mut header_bytes = Vec::new();
        write_header(&mut header_bytes, db, &header)?;
        sink.write_all(&header_bytes)?;
        let header_hash = sha256(&[&header_bytes]);

        let raw_key = key.raw_key();
        let transformed = db.kdf().transform_key(&raw_key)?;
        let challenge = key.challenge(&header.master_seed)?;
        let final_key = Zeroizing::new(sha256(&[
            &header.master_seed,
            &challenge,
            &transformed,
        ]));

        let mut random_stream =
            InnerRandomStream::new(header.random_stream_id, &header.protected_stream_key)?;
        let mut xml = Vec::new();
        write_xml(&mut xml, db, Some(&mut random_stream), Some(&header_hash))?;

        let payload = match db.compression() {
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&xml)?;
                encoder.finish()?
            }
            Compression::None => xml,
        };

        let mut blocks = HashedBlockWriter::new(Vec::new());
        blocks.write_all(&payload)?;
        let blocks = blocks.finish()?;

        let cipher = cipher_to_algorithm(db.cipher())?;
        let mut cipher_stream =
            SymmetricCipherWriter::new(sink, cipher, &final_key, &header.encryption_iv)?;
        cipher_stream
            .write_all(&header.stream_start_bytes)
            .map_err(Error::from_io)?;
        cipher_stream.write_all(&blocks).map_err(Error::from_io)?;
        cipher_stream.finish().map_err(Error::from_io)?;
        Ok(())
    }
}
