use std::io::{self, Read};

/// Read-through tee that remembers every byte handed out.
///
/// The header parser runs on top of this so the final integrity check can
/// hash exactly the bytes it consumed.
pub struct StoreDataStream<R: Read> {
    inner: R,
    stored: Vec<u8>,
}

impl<R: Read> StoreDataStream<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            stored: Vec::new(),
        }
    }

    /// All bytes successfully read so far.
    pub fn stored_data(&self) -> &[u8] {
        &self.stored
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for StoreDataStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.stored.extend(&buf[..count]);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_stores_exactly_what_was_read() {
        let mut stream = StoreDataStream::new(Cursor::new(b"abcdefgh".to_vec()));
        let mut buf = [0; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(stream.stored_data(), b"abcde");

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(stream.stored_data(), b"abcdefgh");

        let mut inner = stream.into_inner();
        let mut tail = Vec::new();
        inner.read_to_end(&mut tail).unwrap();
        assert!(tail.is_empty());
    }
}
