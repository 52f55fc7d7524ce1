//! Sequential little-endian access over a byte region.
//!
//! Every read checks the remaining length first so that a short buffer
//! surfaces as `NitroError::TruncatedRead` with the offending position,
//! instead of a bare I/O error.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{NitroError, NitroResult};

/// Reader over a borrowed byte slice.
pub struct ByteReader<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    /// Reader positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> NitroResult<Self> {
        let mut reader = Self::new(data);
        reader.seek(pos)?;
        Ok(reader)
    }

    pub fn position(&self) -> usize {
        self.inner.position() as usize
    }

    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes left between the position and the end.
    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    /// Non-failing check used by record loops.
    pub fn has_remaining(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    fn ensure(&self, needed: usize) -> NitroResult<()> {
        if self.has_remaining(needed) {
            Ok(())
        } else {
            Err(NitroError::TruncatedRead {
                offset: self.position(),
                needed,
                remaining: self.remaining(),
            })
        }
    }

    pub fn read_u8(&mut self) -> NitroResult<u8> {
        self.ensure(1)?;
        Ok(self.inner.read_u8()?)
    }

    pub fn read_u16(&mut self) -> NitroResult<u16> {
        self.ensure(2)?;
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> NitroResult<u32> {
        self.ensure(4)?;
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read_bytes(&mut self, n: usize) -> NitroResult<&'a [u8]> {
        self.ensure(n)?;
        let start = self.position();
        let data: &'a [u8] = *self.inner.get_ref();
        self.inner.set_position((start + n) as u64);
        Ok(&data[start..start + n])
    }

    pub fn skip(&mut self, n: usize) -> NitroResult<()> {
        self.ensure(n)?;
        self.inner.set_position((self.position() + n) as u64);
        Ok(())
    }

    /// Jump to an absolute position. Seeking exactly to the end is allowed.
    pub fn seek(&mut self, pos: usize) -> NitroResult<()> {
        if pos > self.len() {
            return Err(NitroError::TruncatedRead {
                offset: pos,
                needed: 0,
                remaining: 0,
            });
        }
        self.inner.set_position(pos as u64);
        Ok(())
    }
}

/// Writer over a fixed mutable slice. It never grows the slice.
pub struct ByteWriter<'a> {
    inner: Cursor<&'a mut [u8]>,
}

impl<'a> ByteWriter<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    pub fn at(data: &'a mut [u8], pos: usize) -> NitroResult<Self> {
        let len = data.len();
        if pos > len {
            return Err(NitroError::TruncatedRead {
                offset: pos,
                needed: 0,
                remaining: 0,
            });
        }
        let mut writer = Self::new(data);
        writer.inner.set_position(pos as u64);
        Ok(writer)
    }

    pub fn position(&self) -> usize {
        self.inner.position() as usize
    }

    fn ensure(&self, needed: usize) -> NitroResult<()> {
        let remaining = self.inner.get_ref().len().saturating_sub(self.position());
        if remaining >= needed {
            Ok(())
        } else {
            Err(NitroError::TruncatedRead {
                offset: self.position(),
                needed,
                remaining,
            })
        }
    }

    pub fn write_u8(&mut self, value: u8) -> NitroResult<()> {
        self.ensure(1)?;
        Ok(self.inner.write_u8(value)?)
    }

    pub fn write_u16(&mut self, value: u16) -> NitroResult<()> {
        self.ensure(2)?;
        Ok(self.inner.write_u16::<LittleEndian>(value)?)
    }

    pub fn write_u32(&mut self, value: u32) -> NitroResult<()> {
        self.ensure(4)?;
        Ok(self.inner.write_u32::<LittleEndian>(value)?)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> NitroResult<()> {
        self.ensure(bytes.len())?;
        let start = self.position();
        self.inner.get_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        self.inner.set_position((start + bytes.len()) as u64);
        Ok(())
    }
}

/// Read a single little-endian u32 at `offset`.
pub fn read_u32_at(data: &[u8], offset: usize) -> NitroResult<u32> {
    ByteReader::at(data, offset)?.read_u32()
}

/// Write a single little-endian u32 at `offset`.
pub fn write_u32_at(data: &mut [u8], offset: usize, value: u32) -> NitroResult<()> {
    ByteWriter::at(data, offset)?.write_u32(value)
}
