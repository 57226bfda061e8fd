//! Constants describing the KDBX v3 container layout.

use hex_literal::hex;
use num_derive::{FromPrimitive, ToPrimitive};
use uuid::{uuid, Uuid};

/// First magic word of every KeePass 2.x database.
pub const SIGNATURE_1: u32 = 0x9AA2D903;
/// Second magic word of a KDBX 2/3 database.
pub const SIGNATURE_2: u32 = 0xB54BFB67;
/// Second magic word of a legacy KeePass 1.x (.kdb) database.
pub const SIGNATURE_2_KDB1: u32 = 0xB54BFB65;

/// Newest file version this crate understands (KDBX 3.1).
pub const FILE_VERSION: u32 = 0x0003_0001;
/// Oldest accepted file version (KDBX 2.0).
pub const FILE_VERSION_MIN: u32 = 0x0002_0000;
/// Only the major half of the version word is critical.
pub const FILE_VERSION_CRITICAL_MASK: u32 = 0xFFFF_0000;

pub const CIPHER_AES256_CBC: Uuid = uuid!("31c1f2e6-bf71-4350-be58-05216afc5aff");
pub const CIPHER_TWOFISH_CBC: Uuid = uuid!("ad68f29f-576f-4bb9-a36a-d47af965346c");
pub const CIPHER_CHACHA20: Uuid = uuid!("d6038a2b-8b6f-4cb5-a524-339a31dbb59a");

/// KDF identifier for the KDBX 3 AES key transform.
pub const KDF_AES_KDBX3: Uuid = uuid!("c9d9f39a-628a-4460-bf74-0d08c18a4fea");

/// Nonce of the Salsa20 inner random stream, fixed by the format.
pub const INNER_STREAM_SALSA20_NONCE: [u8; 8] = hex!("E830094B97205D2A");

/// Typed header field ids, `{u8 id, u16 LE len, u8[len] data}` records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum HeaderFieldId {
    EndOfHeader = 0,
    Comment = 1,
    CipherId = 2,
    CompressionFlags = 3,
    MasterSeed = 4,
    TransformSeed = 5,
    TransformRounds = 6,
    EncryptionIv = 7,
    ProtectedStreamKey = 8,
    StreamStartBytes = 9,
    InnerRandomStreamId = 10,
}

/// Payload compression selected by the `CompressionFlags` header field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Compression {
    None = 0,
    #[default]
    Gzip = 1,
}

/// Inner-random-stream algorithm ids. `ArcFourVariant` is recognised but
/// always refused, as is anything unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum RandomStreamId {
    None = 0,
    ArcFourVariant = 1,
    Salsa20 = 2,
}

/// Number of stock icons; `IconID` values are clamped into this range.
pub const ICON_COUNT: i32 = 69;

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn test_header_field_ids() {
        assert_eq!(HeaderFieldId::from_u8(0), Some(HeaderFieldId::EndOfHeader));
        assert_eq!(HeaderFieldId::from_u8(9), Some(HeaderFieldId::StreamStartBytes));
        assert_eq!(HeaderFieldId::from_u8(11), None);
    }

    #[test]
    fn test_version_mask() {
        assert_eq!(FILE_VERSION & FILE_VERSION_CRITICAL_MASK, 0x0003_0000);
        assert!(FILE_VERSION_MIN <= FILE_VERSION & FILE_VERSION_CRITICAL_MASK);
    }
}
