use std::{error, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Underflow,
    Overflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Underflow => "input underflow",
            Self::Overflow => "output overflow",
        })
    }
}

impl error::Error for Error {}

/// Big-endian reader over a borrowed byte range.
#[derive(Debug, Clone)]
pub struct ReadCursor<'input> {
    buffer: &'input [u8],
    offset: usize,
}

impl<'input> ReadCursor<'input> {
    #[must_use]
    pub fn new(buffer: &'input [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    /// All consumption funnels through here.
    fn take(&mut self, count: usize) -> Result<&'input [u8], Error> {
        let end = self.offset.checked_add(count).ok_or(Error::Underflow)?;
        let bytes = self.buffer.get(self.offset..end).ok_or(Error::Underflow)?;
        self.offset = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_fixed16(&mut self) -> Result<[u8; 16], Error> {
        Ok(self.take(16)?.try_into().unwrap())
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'input [u8], Error> {
        self.take(count)
    }
}

/// Big-endian writer over a caller-provided byte range. Compound size
/// prefixes are reserved with [`Self::skip`] and filled in afterwards with
/// [`Self::patch_u32`].
#[derive(Debug)]
pub struct WriteCursor<'buffer> {
    buffer: &'buffer mut [u8],
    offset: usize,
}

impl<'buffer> WriteCursor<'buffer> {
    pub fn new(buffer: &'buffer mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// All advancement funnels through here.
    fn reserve(&mut self, count: usize) -> Result<&mut [u8], Error> {
        let end = self.offset.checked_add(count).ok_or(Error::Overflow)?;
        let bytes = self
            .buffer
            .get_mut(self.offset..end)
            .ok_or(Error::Overflow)?;
        self.offset = end;
        Ok(bytes)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), Error> {
        self.reserve(1)?[0] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), Error> {
        self.reserve(2)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.reserve(4)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), Error> {
        self.reserve(8)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), Error> {
        self.reserve(value.len())?.copy_from_slice(value);
        Ok(())
    }

    /// Length-prefixed write at 1-byte width. Callers pick the prefix width
    /// before calling, so `value` is known to fit. Checks the combined size
    /// up front so a failure consumes nothing.
    pub fn write_v8(&mut self, value: &[u8]) -> Result<(), Error> {
        if self.buffer.len() - self.offset < 1 + value.len() {
            return Err(Error::Overflow);
        }
        self.write_u8(value.len() as u8)?;
        self.write_bytes(value)
    }

    /// Length-prefixed write at 4-byte width.
    pub fn write_v32(&mut self, value: &[u8]) -> Result<(), Error> {
        if self.buffer.len() - self.offset < 4 + value.len() {
            return Err(Error::Overflow);
        }
        self.write_u32(value.len() as u32)?;
        self.write_bytes(value)
    }

    /// Reserve `count` bytes and return their position for back-patching.
    pub fn skip(&mut self, count: usize) -> Result<usize, Error> {
        let position = self.offset;
        self.reserve(count)?;
        Ok(position)
    }

    /// Write `value` at an absolute position without moving the cursor.
    pub fn patch_u32(&mut self, position: usize, value: u32) -> Result<(), Error> {
        let bytes = self
            .buffer
            .get_mut(position..position + 4)
            .ok_or(Error::Overflow)?;
        bytes.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }
}

#[test]
fn test_read_cursor() {
    let mut c = ReadCursor::new(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);
    assert_eq!(0x01, c.read_u8().unwrap());
    assert_eq!(0x0203, c.read_u16().unwrap());
    assert_eq!(0x04050607, c.read_u32().unwrap());
    assert_eq!(7, c.offset());
    assert_eq!(2, c.remaining());
    assert_eq!(Err(Error::Underflow), c.read_u32());
    // a failed read consumes nothing
    assert_eq!(7, c.offset());
    assert_eq!(&[0x08, 0x09], c.read_bytes(2).unwrap());
    assert_eq!(Err(Error::Underflow), c.read_u8());
}

#[test]
fn test_read_u64() {
    let mut c = ReadCursor::new(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
    assert_eq!(0x1122334455667788, c.read_u64().unwrap());
    assert_eq!(0, c.remaining());
}

#[test]
fn test_write_cursor() {
    let mut buf = [0u8; 8];
    let mut c = WriteCursor::new(&mut buf);
    c.write_u8(0xab).unwrap();
    c.write_u16(0x0102).unwrap();
    c.write_u32(0x03040506).unwrap();
    assert_eq!(7, c.offset());
    assert_eq!(Err(Error::Overflow), c.write_u16(0x0708));
    // a failed write consumes nothing
    assert_eq!(7, c.offset());
    c.write_u8(0xcd).unwrap();
    assert_eq!([0xab, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xcd], buf);
}

#[test]
fn test_write_backpatch() {
    let mut buf = [0u8; 10];
    let mut c = WriteCursor::new(&mut buf);
    c.write_u8(0xd0).unwrap();
    let start = c.skip(4).unwrap();
    c.write_u32(2).unwrap();
    c.write_u8(0x41).unwrap();
    let size = (c.offset() - start - 4) as u32;
    c.patch_u32(start, size).unwrap();
    assert_eq!([0xd0, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x02, 0x41], buf);
}

#[test]
fn test_write_var() {
    let mut buf = [0u8; 8];
    let mut c = WriteCursor::new(&mut buf);
    c.write_v8(b"abc").unwrap();
    assert_eq!(Err(Error::Overflow), c.write_v32(b"xy"));
    assert_eq!(4, c.offset());
    assert_eq!(&buf[..4], &[3, b'a', b'b', b'c']);
}
