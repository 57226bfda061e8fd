//! Inner random stream that un-masks protected XML values.
//!
//! Protected values are XORed with a single Salsa20 keystream in document
//! order. Every protected value must pass through [`InnerRandomStream::
//! apply_keystream`] exactly once, in order, even when its entry ends up
//! being discarded; skipping one silently corrupts all later values.

use ring::digest::{Context, SHA256};
use salsa20::cipher::{KeyIvInit, StreamCipher};
use salsa20::{Key as Salsa20Key, Salsa20};

use crate::error::{Error, Result};
use crate::format::{RandomStreamId, INNER_STREAM_SALSA20_NONCE};

pub enum InnerRandomStream {
    /// Stream id 0: values are stored in the clear.
    None,
    Salsa20(Salsa20),
}

impl InnerRandomStream {
    /// Build the stream from the header's id and protected stream key.
    /// ArcFour and unknown ids are refused at header-parse time already;
    /// this refuses them again for standalone use.
    pub fn new(id: RandomStreamId, protected_stream_key: &[u8]) -> Result<Self> {
        match id {
            RandomStreamId::None => Ok(Self::None),
            RandomStreamId::ArcFourVariant => Err(Error::InvalidRandomStream),
            RandomStreamId::Salsa20 => {
                let mut context = Context::new(&SHA256);
                context.update(protected_stream_key);
                let key = context.finish().as_ref().to_owned();
                let key = Salsa20Key::from_slice(&key[0..32]);
                Ok(Self::Salsa20(Salsa20::new(
                    key,
                    &INNER_STREAM_SALSA20_NONCE.into(),
                )))
            }
        }
    }

    /// XOR `buf` with the next `buf.len()` keystream bytes.
    pub fn apply_keystream(&mut self, buf: &mut [u8]) {
        match self {
            Self::None => (),
            Self::Salsa20(c) => c.apply_keystream(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_null_stream() {
        let mut c = InnerRandomStream::new(RandomStreamId::None, &[]).unwrap();
        let mut buf = [0x61, 0x62, 0x63, 0x64];
        c.apply_keystream(&mut buf);
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn test_arc4_refused() {
        assert!(matches!(
            InnerRandomStream::new(RandomStreamId::ArcFourVariant, &[0; 32]),
            Err(Error::InvalidRandomStream)
        ));
    }

    const SALSA20_KEY: [u8; 32] = hex!(
        "578b10cfc954562053f926dfdbfa26d1"
        "7edc7c7e5f7bedeff88ecc22a8469a08"
    );

    const SALSA20_CIPHERTEXT: [u8; 6] = [0x10, 0xE8, 0xFC, 0x22, 0xCF, 0xE4];
    const SALSA20_PLAINTEXT: &str = "hidden";

    #[test]
    fn test_salsa20() {
        let mut c = InnerRandomStream::new(RandomStreamId::Salsa20, &SALSA20_KEY).unwrap();
        let mut ciphertext = SALSA20_CIPHERTEXT;
        c.apply_keystream(&mut ciphertext);
        let actual = String::from_utf8(ciphertext.to_vec()).expect("Valid utf-8");
        assert_eq!(actual, SALSA20_PLAINTEXT);
    }

    #[test]
    fn test_salsa20_order_dependence() {
        // Masking the same value at a different stream position must give a
        // different ciphertext; this is what makes document order binding.
        let mut c = InnerRandomStream::new(RandomStreamId::Salsa20, &SALSA20_KEY).unwrap();
        let mut first = *b"secret";
        c.apply_keystream(&mut first);

        let mut c = InnerRandomStream::new(RandomStreamId::Salsa20, &SALSA20_KEY).unwrap();
        let mut skipped = [0u8; 11];
        c.apply_keystream(&mut skipped);
        let mut second = *b"secret";
        c.apply_keystream(&mut second);

        assert_ne!(first, second);
    }
}
