use crate::error::{Result, WireError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Cursor over a received datagram. All multi-byte reads are big-endian.
#[derive(Debug, Clone)]
pub struct WireReader {
    buffer: Bytes,
}

impl WireReader {
    pub fn new(buffer: Bytes) -> Self {
        Self { buffer }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    pub fn has_remaining(&self) -> bool {
        self.buffer.has_remaining()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let remaining = self.buffer.remaining();
        if remaining < needed {
            return Err(WireError::UnexpectedEof { needed, remaining });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buffer.get_u8())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buffer.get_u32())
    }

    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        self.ensure(out.len())?;
        self.buffer.copy_to_slice(out);
        Ok(())
    }

    /// Advances past `count` bytes without interpreting them.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.ensure(count)?;
        self.buffer.advance(count);
        Ok(())
    }

    /// Consumes and returns everything left in the buffer. Zero-copy: the
    /// returned `Bytes` shares the datagram's allocation.
    pub fn read_rest(&mut self) -> Bytes {
        self.buffer.split_off(0)
    }
}

/// Growable datagram builder. All multi-byte writes are big-endian.
#[derive(Debug, Default)]
pub struct WireWriter {
    buffer: BytesMut,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.put_slice(bytes);
    }

    pub fn write_zeros(&mut self, count: usize) {
        self.buffer.put_bytes(0, count);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }
}
