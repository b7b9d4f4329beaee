//! Bounds-checked random-access reads over a window of a host file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::contract::ParseError;

/// Open the host file read-only and capture its size once.
///
/// The size is treated as immutable for the duration of a parse; failure to
/// open or stat the input is an environment problem, not a format violation.
pub fn open_input(path: &Path) -> Result<(File, u64), ParseError> {
    let file = File::open(path).map_err(|e| ParseError::io(0, e))?;
    let file_size = file.metadata().map_err(|e| ParseError::io(0, e))?.len();
    Ok((file, file_size))
}

/// A read-only cursor over the window `[base_offset, file_size)` of a
/// seekable source.
///
/// Every read is checked against the end of the window before touching the
/// underlying reader: running out of window is a non-fatal
/// `"not enough data"` at the current absolute offset, while a genuine read
/// failure below the bounds check is fatal. Positions reported in errors are
/// absolute file offsets.
#[derive(Debug)]
pub struct ByteCursor<R> {
    inner: R,
    base: u64,
    file_size: u64,
    pos: u64,
}

impl<R: Read + Seek> ByteCursor<R> {
    /// Position the cursor at `base_offset` inside a source of `file_size`
    /// bytes.
    pub fn new(mut inner: R, base_offset: u64, file_size: u64) -> Result<Self, ParseError> {
        if base_offset > file_size {
            return Err(ParseError::new(base_offset, "offset past end of file"));
        }
        inner
            .seek(SeekFrom::Start(base_offset))
            .map_err(|e| ParseError::io(base_offset, e))?;
        Ok(Self {
            inner,
            base: base_offset,
            file_size,
            pos: base_offset,
        })
    }

    /// The offset the parse started from.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Total size of the host file.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Current absolute file offset.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Bytes consumed so far, relative to the base offset.
    pub fn consumed(&self) -> u64 {
        self.pos - self.base
    }

    /// Bytes left before the end of the host file.
    pub fn remaining(&self) -> u64 {
        self.file_size - self.pos
    }

    fn check(&self, wanted: u64) -> Result<(), ParseError> {
        if wanted > self.remaining() {
            return Err(ParseError::new(self.pos, "not enough data"));
        }
        Ok(())
    }

    /// Seek to an absolute offset inside the file.
    pub fn seek_to(&mut self, offset: u64) -> Result<(), ParseError> {
        if offset > self.file_size {
            return Err(ParseError::new(offset, "not enough data"));
        }
        self.inner
            .seek(SeekFrom::Start(offset))
            .map_err(|e| ParseError::io(offset, e))?;
        self.pos = offset;
        Ok(())
    }

    /// Skip `n` bytes forward.
    pub fn skip(&mut self, n: u64) -> Result<(), ParseError> {
        self.check(n)?;
        self.seek_to(self.pos + n)
    }

    /// Fill `buf` completely or fail with a short-read error.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ParseError> {
        self.check(buf.len() as u64)?;
        self.inner
            .read_exact(buf)
            .map_err(|e| ParseError::io(self.pos, e))?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    /// Read up to `buf.len()` bytes, clamped to the end of the window.
    /// Returns the number of bytes actually read; zero means the window is
    /// exhausted.
    pub fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize, ParseError> {
        let want = (buf.len() as u64).min(self.remaining()) as usize;
        let buf = &mut buf[..want];
        let mut filled = 0;
        while filled < want {
            let n = self
                .inner
                .read(&mut buf[filled..])
                .map_err(|e| ParseError::io(self.pos + filled as u64, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.pos += filled as u64;
        Ok(filled)
    }

    /// Read one byte.
    pub fn u8(&mut self) -> Result<u8, ParseError> {
        self.check(1)?;
        let v = self.inner.read_u8().map_err(|e| ParseError::io(self.pos, e))?;
        self.pos += 1;
        Ok(v)
    }

    /// Read a little-endian `u16`.
    pub fn u16_le(&mut self) -> Result<u16, ParseError> {
        self.check(2)?;
        let v = self
            .inner
            .read_u16::<LittleEndian>()
            .map_err(|e| ParseError::io(self.pos, e))?;
        self.pos += 2;
        Ok(v)
    }

    /// Read a big-endian `u16`.
    pub fn u16_be(&mut self) -> Result<u16, ParseError> {
        self.check(2)?;
        let v = self
            .inner
            .read_u16::<BigEndian>()
            .map_err(|e| ParseError::io(self.pos, e))?;
        self.pos += 2;
        Ok(v)
    }

    /// Read a little-endian `u32`.
    pub fn u32_le(&mut self) -> Result<u32, ParseError> {
        self.check(4)?;
        let v = self
            .inner
            .read_u32::<LittleEndian>()
            .map_err(|e| ParseError::io(self.pos, e))?;
        self.pos += 4;
        Ok(v)
    }

    /// Read a big-endian `u32`.
    pub fn u32_be(&mut self) -> Result<u32, ParseError> {
        self.check(4)?;
        let v = self
            .inner
            .read_u32::<BigEndian>()
            .map_err(|e| ParseError::io(self.pos, e))?;
        self.pos += 4;
        Ok(v)
    }

    /// Read a little-endian `u64`.
    pub fn u64_le(&mut self) -> Result<u64, ParseError> {
        self.check(8)?;
        let v = self
            .inner
            .read_u64::<LittleEndian>()
            .map_err(|e| ParseError::io(self.pos, e))?;
        self.pos += 8;
        Ok(v)
    }

    /// Read a big-endian `u64`.
    pub fn u64_be(&mut self) -> Result<u64, ParseError> {
        self.check(8)?;
        let v = self
            .inner
            .read_u64::<BigEndian>()
            .map_err(|e| ParseError::io(self.pos, e))?;
        self.pos += 8;
        Ok(v)
    }
}
