use std::cmp;
use std::collections::VecDeque;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Error;
use crate::utils::sha256;

/// Record layout: `{ blockIndex: u32 LE, blockHash: 32B, blockSize: u32 LE,
/// payload: blockSize bytes }`, terminated by a zero-size record with an
/// all-zero hash.
pub struct HashedBlockReader<R: Read> {
    inner: R,
    index: u32,
    buf: VecDeque<u8>,
    complete: bool,
}

impl<R: Read> HashedBlockReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            index: 0,
            buf: VecDeque::new(),
            complete: false,
        }
    }

    fn load_next_block(&mut self) -> io::Result<()> {
        let block_index = self.inner.read_u32::<LittleEndian>()?;
        if block_index != self.index {
            return Err(Error::BlockIndexMismatch.into_io());
        }
        self.index += 1;

        let mut block_hash = [0; 32];
        self.inner.read_exact(&mut block_hash)?;
        let block_size = self.inner.read_u32::<LittleEndian>()?;

        if block_size == 0 {
            if block_hash != [0; 32] {
                return Err(Error::BlockSizeInvalid.into_io());
            }
            self.complete = true;
            return Ok(());
        }

        let mut block = vec![0; block_size as usize];
        self.inner.read_exact(&mut block)?;
        if sha256(&[&block]) != block_hash {
            return Err(Error::BlockHashMismatch.into_io());
        }
        self.buf = block.into();
        Ok(())
    }
}

impl<R: Read> Read for HashedBlockReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.buf.is_empty() && !self.complete {
            self.load_next_block()?;
        }
        let mut index = 0;
        while index < buf.len() {
            match self.buf.pop_front() {
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

pub struct HashedBlockWriter<W: Write> {
    inner: W,
    index: u32,
    block_size: u32,
    buf: Vec<u8>,
}

impl<W: Write> HashedBlockWriter<W> {
    const DEFAULT_BLOCK_SIZE: u32 = 1024 * 1024;

    pub fn new(inner: W) -> Self {
        Self {
            inner,
            index: 0,
            block_size: Self::DEFAULT_BLOCK_SIZE,
            buf: Vec::new(),
        }
    }

    fn write_block(&mut self) -> io::Result<()> {
        self.inner.write_u32::<LittleEndian>(self.index)?;
        self.index += 1;
        self.inner.write_all(&sha256(&[&self.buf]))?;
        self.inner.write_u32::<LittleEndian>(self.buf.len() as u32)?;
        self.inner.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }

    /// Flush the trailing partial block and emit the terminator record.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.buf.is_empty() {
            self.write_block()?;
        }
        self.inner.write_u32::<LittleEndian>(self.index)?;
        self.inner.write_all(&[0; 32])?;
        self.inner.write_u32::<LittleEndian>(0)?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for HashedBlockWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let remaining = cmp::min(self.block_size as usize - self.buf.len(), buf.len());
        self.buf.extend(&buf[..remaining]);
        if self.buf.len() >= self.block_size as usize {
            self.write_block()?;
        }
        Ok(remaining)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
