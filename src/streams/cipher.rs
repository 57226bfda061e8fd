use std::collections::VecDeque;
use std::io::{self, Read, Write};

use openssl::symm::{Cipher, Crypter, Mode};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::format::CIPHER_AES256_CBC;

const CHUNK_SIZE: usize = 4096;

/// Check a cipher UUID from the header. AES-256-CBC is the only algorithm
/// KDBX 3 files are written with; everything else is refused.
pub fn cipher_to_algorithm(uuid: Uuid) -> Result<Cipher> {
    if uuid == CIPHER_AES256_CBC {
        Ok(Cipher::aes_256_cbc())
    } else {
        Err(Error::UnsupportedCipher)
    }
}

/// Decrypt-on-read adaptor over the raw ciphertext stream.
///
/// PKCS#7 padding is checked when the underlying stream runs dry; a short
/// read mid-block or bad padding surfaces as a decryption error.
pub struct SymmetricCipherStream<R: Read> {
    crypter: Crypter,
    inner: R,
    plain: VecDeque<u8>,
    chunk: Vec<u8>,
    finished: bool,
}

impl<R: Read> SymmetricCipherStream<R> {
    pub fn new(inner: R, cipher: Cipher, key: &[u8], iv: &[u8]) -> Result<Self> {
        let mut crypter =
            Crypter::new(cipher, Mode::Decrypt, key, Some(iv)).map_err(|_| Error::InvalidPadding)?;
        crypter.pad(true);
        Ok(Self {
            crypter,
            inner,
            plain: VecDeque::new(),
            chunk: vec![0; CHUNK_SIZE],
            finished: false,
        })
    }

    fn fill(&mut self) -> io::Result<()> {
        while self.plain.is_empty() && !self.finished {
            let count = self.inner.read(&mut self.chunk)?;
            // One extra block of head room, as the crypter requires.
            let mut out = vec![0; count + 16];
            let produced = if count == 0 {
                self.finished = true;
                self.crypter
                    .finalize(&mut out)
                    .map_err(|_| Error::InvalidPadding.into_io())?
            } else {
                self.crypter
                    .update(&self.chunk[..count], &mut out)
                    .map_err(|_| Error::InvalidPadding.into_io())?
            };
            self.plain.extend(&out[..produced]);
        }
        Ok(())
    }
}

impl<R: Read> Read for SymmetricCipherStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill()?;
        let mut index = 0;
        while index < buf.len() {
            match self.plain.pop_front() {
                Some(val) => {
                    buf[index] = val;
                    index += 1;
                }
                None => break,
            }
        }
        Ok(index)
    }
}

/// Encrypt-on-write counterpart used by the database writer. The final
/// padded block is only emitted by [`SymmetricCipherWriter::finish`].
pub struct SymmetricCipherWriter<W: Write> {
    crypter: Crypter,
    inner: W,
    block_size: usize,
}

impl<W: Write> SymmetricCipherWriter<W> {
    pub fn new(inner: W, cipher: Cipher, key: &[u8], iv: &[u8]) -> Result<Self> {
        let mut crypter =
            Crypter::new(cipher, Mode::Encrypt, key, Some(iv)).map_err(|_| Error::InvalidPadding)?;
        crypter.pad(true);
        Ok(Self {
            crypter,
            inner,
            block_size: cipher.block_size(),
        })
    }

    pub fn finish(mut self) -> io::Result<W> {
        let mut out = vec![0; 2 * self.block_size];
        let produced = self
            .crypter
            .finalize(&mut out)
            .map_err(|_| Error::InvalidPadding.into_io())?;
        self.inner.write_all(&out[..produced])?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for SymmetricCipherWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut out = vec![0; data.len() + self.block_size];
        let produced = self
            .crypter
            .update(data, &mut out)
            .map_err(|_| Error::InvalidPadding.into_io())?;
        self.inner.write_all(&out[..produced])?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::format::CIPHER_CHACHA20;

    const KEY: [u8; 32] = [0x42; 32];
    const IV: [u8; 16] = [0x24; 16];

    fn encrypt(plaintext: &[u8]) -> Vec<u8> {
        let mut writer =
            SymmetricCipherWriter::new(Vec::new(), Cipher::aes_256_cbc(), &KEY, &IV).unwrap();
        writer.write_all(plaintext).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_cipher_to_algorithm() {
        assert!(cipher_to_algorithm(CIPHER_AES256_CBC).is_ok());
        assert!(matches!(
            cipher_to_algorithm(CIPHER_CHACHA20),
            Err(Error::UnsupportedCipher)
        ));
        assert!(matches!(
            cipher_to_algorithm(Uuid::nil()),
            Err(Error::UnsupportedCipher)
        ));
    }

    #[test]
    fn test_round_trip() {
        let plaintext = b"the quick brown fox jumps over the lazy dog";
        let ciphertext = encrypt(plaintext);
        assert_eq!(ciphertext.len() % 16, 0);
        assert!(ciphertext.len() > plaintext.len());

        let mut stream = SymmetricCipherStream::new(
            Cursor::new(ciphertext),
            Cipher::aes_256_cbc(),
            &KEY,
            &IV,
        )
        .unwrap();
        let mut decrypted = Vec::new();
        stream.read_to_end(&mut decrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_padding_error() {
        let ciphertext = encrypt(b"some plaintext that spans multiple AES blocks....");
        let mut wrong_key = KEY;
        wrong_key[0] ^= 1;
        let mut stream = SymmetricCipherStream::new(
            Cursor::new(ciphertext),
            Cipher::aes_256_cbc(),
            &wrong_key,
            &IV,
        )
        .unwrap();
        let mut decrypted = Vec::new();
        // Either the padding check fires, or garbage comes back. Both are
        // possible since random padding bytes can form a valid PKCS#7 tail.
        match stream.read_to_end(&mut decrypted) {
            Ok(_) => assert_ne!(decrypted, b"some plaintext that spans multiple AES blocks...."),
            Err(err) => {
                assert!(matches!(Error::from_io(err), Error::InvalidPadding));
            }
        }
    }

    #[test]
    fn test_truncated_ciphertext() {
        let mut ciphertext = encrypt(b"0123456789abcdef0123456789abcdef");
        ciphertext.truncate(ciphertext.len() - 5);
        let mut stream = SymmetricCipherStream::new(
            Cursor::new(ciphertext),
            Cipher::aes_256_cbc(),
            &KEY,
            &IV,
        )
        .unwrap();
        let mut decrypted = Vec::new();
        assert!(stream.read_to_end(&mut decrypted).is_err());
    }
}
