//! Outer header: signatures, version gate and the typed TLV fields.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use rand::Rng;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{Error, Result, Warning};
use crate::format::{
    Compression, HeaderFieldId, RandomStreamId, FILE_VERSION, FILE_VERSION_CRITICAL_MASK,
    FILE_VERSION_MIN, SIGNATURE_1, SIGNATURE_2, SIGNATURE_2_KDB1,
};
use crate::model::Database;
use crate::streams::cipher_to_algorithm;

/// Header fields that never enter the data model: everything the payload
/// decryption pipeline needs.
pub struct HeaderData {
    pub master_seed: Zeroizing<Vec<u8>>,
    pub encryption_iv: Vec<u8>,
    pub stream_start_bytes: Vec<u8>,
    pub protected_stream_key: Zeroizing<Vec<u8>>,
    pub random_stream_id: RandomStreamId,
}

impl HeaderData {
    /// Fresh random header secrets for a save.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut master_seed = vec![0; 32];
        rng.fill(&mut master_seed[..]);
        let mut encryption_iv = vec![0; 16];
        rng.fill(&mut encryption_iv[..]);
        let mut stream_start_bytes = vec![0; 32];
        rng.fill(&mut stream_start_bytes[..]);
        let mut protected_stream_key = vec![0; 32];
        rng.fill(&mut protected_stream_key[..]);
        Self {
            master_seed: Zeroizing::new(master_seed),
            encryption_iv,
            stream_start_bytes,
            protected_stream_key: Zeroizing::new(protected_stream_key),
            random_stream_id: RandomStreamId::Salsa20,
        }
    }
}

fn fixed<const N: usize>(data: Vec<u8>, what: &'static str) -> Result<[u8; N]> {
    data.try_into().map_err(|_| Error::InvalidHeaderField(what))
}

/// Fixed-width little-endian field payloads; anything of the wrong size is
/// a header error, not a short read.
fn field_u32(data: Vec<u8>, what: &'static str) -> Result<u32> {
    fixed(data, what).map(u32::from_le_bytes)
}

fn field_u64(data: Vec<u8>, what: &'static str) -> Result<u64> {
    fixed(data, what).map(u64::from_le_bytes)
}

/// Parse everything up to and including the `EndOfHeader` field.
///
/// Cipher, compression and KDF parameters land in `db`; the transient
/// crypto material is returned. Unknown field ids are skipped with a
/// warning.
pub fn read_header<R: Read>(
    input: &mut R,
    db: &mut Database,
    warnings: &mut Vec<Warning>,
) -> Result<HeaderData> {
    let signature1 = input.read_u32::<LittleEndian>()?;
    if signature1 != SIGNATURE_1 {
        return Err(Error::InvalidSignature);
    }
    let signature2 = input.read_u32::<LittleEndian>()?;
    if signature2 == SIGNATURE_2_KDB1 {
        return Err(Error::Kdb1Database);
    }
    if signature2 != SIGNATURE_2 {
        return Err(Error::InvalidSignature);
    }

    let version = input.read_u32::<LittleEndian>()? & FILE_VERSION_CRITICAL_MASK;
    let max_version = FILE_VERSION & FILE_VERSION_CRITICAL_MASK;
    if !(FILE_VERSION_MIN..=max_version).contains(&version) {
        return Err(Error::UnsupportedVersion);
    }

    let mut master_seed = None;
    let mut encryption_iv = None;
    let mut stream_start_bytes = None;
    let mut protected_stream_key = None;
    let mut cipher_seen = false;
    let mut random_stream_id = RandomStreamId::Salsa20;

    loop {
        let field_id = input.read_u8()?;
        let field_len = input.read_u16::<LittleEndian>()?;
        let mut field_data = vec![0; field_len as usize];
        input.read_exact(&mut field_data)?;
        debug!("header field {} ({} bytes)", field_id, field_len);

        let field_id = match HeaderFieldId::from_u8(field_id) {
            Some(id) => id,
            None => {
                warn!("unknown header field read: id={}", field_id);
                warnings.push(Warning::UnknownHeaderField(field_id));
                continue;
            }
        };
        match field_id {
            HeaderFieldId::EndOfHeader => break,
            HeaderFieldId::Comment => (),
            HeaderFieldId::CipherId => {
                let uuid = Uuid::from_slice(&field_data)
                    .map_err(|_| Error::InvalidHeaderField("cipher uuid length"))?;
                cipher_to_algorithm(uuid)?;
                db.set_cipher(uuid);
                cipher_seen = true;
            }
            HeaderFieldId::CompressionFlags => {
                let id = field_u32(field_data, "compression flags length")?;
                let compression =
                    Compression::from_u32(id).ok_or(Error::UnsupportedCompression)?;
                db.set_compression(compression);
            }
            HeaderFieldId::MasterSeed => {
                if field_data.len() != 32 {
                    return Err(Error::InvalidHeaderField("master seed size"));
                }
                master_seed = Some(Zeroizing::new(field_data));
            }
            HeaderFieldId::TransformSeed => {
                db.kdf_mut().set_seed(fixed(field_data, "transform seed size")?);
            }
            HeaderFieldId::TransformRounds => {
                db.kdf_mut()
                    .set_rounds(field_u64(field_data, "transform rounds size")?);
            }
            HeaderFieldId::EncryptionIv => {
                encryption_iv = Some(field_data);
            }
            HeaderFieldId::ProtectedStreamKey => {
                protected_stream_key = Some(Zeroizing::new(field_data));
            }
            HeaderFieldId::StreamStartBytes => {
                if field_data.len() != 32 {
                    return Err(Error::InvalidHeaderField("start bytes size"));
                }
                stream_start_bytes = Some(field_data);
            }
            HeaderFieldId::InnerRandomStreamId => {
                let id = field_u32(field_data, "random stream id size")?;
                random_stream_id = match RandomStreamId::from_u32(id) {
                    Some(RandomStreamId::ArcFourVariant) | None => {
                        return Err(Error::InvalidRandomStream)
                    }
                    Some(id) => id,
                };
            }
        }
    }

    match (master_seed, encryption_iv, stream_start_bytes, protected_stream_key, cipher_seen) {
        (Some(master_seed), Some(encryption_iv), Some(stream_start_bytes), Some(protected_stream_key), true) => {
            Ok(HeaderData {
                master_seed,
                encryption_iv,
                stream_start_bytes,
                protected_stream_key,
                random_stream_id,
            })
        }
        _ => Err(Error::MissingHeaders),
    }
}

fn write_field<W: Write>(output: &mut W, id: HeaderFieldId, data: &[u8]) -> Result<()> {
    output.write_u8(id.to_u8().unwrap())?;
    output.write_u16::<LittleEndian>(data.len() as u16)?;
    output.write_all(data)?;
    Ok(())
}

/// Mirror of [`read_header`] used by the writer.
pub fn write_header<W: Write>(output: &mut W, db: &Database, header: &HeaderData) -> Result<()> {
    output.write_u32::<LittleEndian>(SIGNATURE_1)?;
    output.write_u32::<LittleEndian>(SIGNATURE_2)?;
    output.write_u32::<LittleEndian>(FILE_VERSION)?;

    write_field(output, HeaderFieldId::CipherId, db.cipher().as_bytes())?;
    write_field(
        output,
        HeaderFieldId::CompressionFlags,
        &db.compression().to_u32().unwrap().to_le_bytes(),
    )?;
    write_field(output, HeaderFieldId::MasterSeed, &header.master_seed)?;
    write_field(output, HeaderFieldId::TransformSeed, db.kdf().seed())?;
    write_field(
        output,
        HeaderFieldId::TransformRounds,
        &db.kdf().rounds().to_le_bytes(),
    )?;
    write_field(output, HeaderFieldId::EncryptionIv, &header.encryption_iv)?;
    write_field(
        output,
        HeaderFieldId::ProtectedStreamKey,
        &header.protected_stream_key,
    )?;
    write_field(
        output,
        HeaderFieldId::StreamStartBytes,
        &header.stream_start_bytes,
    )?;
    write_field(
        output,
        HeaderFieldId::InnerRandomStreamId,
        &header.random_stream_id.to_u32().unwrap().to_le_bytes(),
    )?;
    write_field(output, HeaderFieldId::EndOfHeader, b"\r\n\r\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn read(bytes: &[u8]) -> Result<(Database, HeaderData, Vec<Warning>)> {
        let mut db = Database::new();
        let mut warnings = Vec::new();
        let header = read_header(&mut Cursor::new(bytes), &mut db, &mut warnings)?;
        Ok((db, header, warnings))
    }

    fn sample_header_bytes() -> Vec<u8> {
        let mut db = Database::new();
        db.kdf_mut().set_seed([3; 32]);
        db.kdf_mut().set_rounds(1000);
        let header = HeaderData::generate();
        let mut out = Vec::new();
        write_header(&mut out, &db, &header).unwrap();
        out
    }

    #[test]
    fn test_round_trip() {
        let bytes = sample_header_bytes();
        let (db, header, warnings) = read(&bytes).unwrap();
        assert_eq!(db.cipher(), crate::format::CIPHER_AES256_CBC);
        assert_eq!(db.compression(), Compression::Gzip);
        assert_eq!(db.kdf().seed(), &[3; 32]);
        assert_eq!(db.kdf().rounds(), 1000);
        assert_eq!(header.master_seed.len(), 32);
        assert_eq!(header.encryption_iv.len(), 16);
        assert_eq!(header.random_stream_id, RandomStreamId::Salsa20);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_bad_signatures() {
        assert!(matches!(
            read(&[0u8; 12]),
            Err(Error::InvalidSignature)
        ));

        let mut bytes = sample_header_bytes();
        // Second signature word of a KeePass 1 file.
        bytes[4..8].copy_from_slice(&0xB54BFB65u32.to_le_bytes());
        assert!(matches!(read(&bytes), Err(Error::Kdb1Database)));
    }

    #[test]
    fn test_version_gate() {
        let mut bytes = sample_header_bytes();
        bytes[8..12].copy_from_slice(&0x0004_0000u32.to_le_bytes());
        assert!(matches!(read(&bytes), Err(Error::UnsupportedVersion)));

        let mut bytes = sample_header_bytes();
        bytes[8..12].copy_from_slice(&0x0001_0000u32.to_le_bytes());
        assert!(matches!(read(&bytes), Err(Error::UnsupportedVersion)));

        // Non-critical minor bits are ignored.
        let mut bytes = sample_header_bytes();
        bytes[8..12].copy_from_slice(&0x0003_00FFu32.to_le_bytes());
        assert!(read(&bytes).is_ok());
    }

    #[test]
    fn test_unknown_field_is_skipped() {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(SIGNATURE_1).unwrap();
        bytes.write_u32::<LittleEndian>(SIGNATURE_2).unwrap();
        bytes.write_u32::<LittleEndian>(FILE_VERSION).unwrap();
        bytes.write_u8(42).unwrap();
        bytes.write_u16::<LittleEndian>(3).unwrap();
        bytes.extend(b"xyz");
        // Continue with a complete header.
        let full = sample_header_bytes();
        bytes.extend(&full[12..]);

        let (_, _, warnings) = read(&bytes).unwrap();
        assert_eq!(warnings, vec![Warning::UnknownHeaderField(42)]);
    }

    #[test]
    fn test_missing_required_field() {
        let mut db = Database::new();
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(SIGNATURE_1).unwrap();
        bytes.write_u32::<LittleEndian>(SIGNATURE_2).unwrap();
        bytes.write_u32::<LittleEndian>(FILE_VERSION).unwrap();
        write_field(&mut bytes, HeaderFieldId::CipherId, db.cipher().as_bytes()).unwrap();
        write_field(&mut bytes, HeaderFieldId::EndOfHeader, b"").unwrap();
        let mut warnings = Vec::new();
        assert!(matches!(
            read_header(&mut Cursor::new(bytes), &mut db, &mut warnings),
            Err(Error::MissingHeaders)
        ));
    }

    #[test]
    fn test_wrong_width_field_is_rejected() {
        let mut db = Database::new();
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(SIGNATURE_1).unwrap();
        bytes.write_u32::<LittleEndian>(SIGNATURE_2).unwrap();
        bytes.write_u32::<LittleEndian>(FILE_VERSION).unwrap();
        // TransformRounds is a u64; four bytes must not parse.
        write_field(&mut bytes, HeaderFieldId::TransformRounds, &1000u32.to_le_bytes()).unwrap();
        let mut warnings = Vec::new();
        assert!(matches!(
            read_header(&mut Cursor::new(bytes), &mut db, &mut warnings),
            Err(Error::InvalidHeaderField(_))
        ));
    }

    #[test]
    fn test_arc4_stream_refused() {
        let mut db = Database::new();
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(SIGNATURE_1).unwrap();
        bytes.write_u32::<LittleEndian>(SIGNATURE_2).unwrap();
        bytes.write_u32::<LittleEndian>(FILE_VERSION).unwrap();
        write_field(
            &mut bytes,
            HeaderFieldId::InnerRandomStreamId,
            &1u32.to_le_bytes(),
        )
        .unwrap();
        let mut warnings = Vec::new();
        assert!(matches!(
            read_header(&mut Cursor::new(bytes), &mut db, &mut warnings),
            Err(Error::InvalidRandomStream)
        ));
    }
}
