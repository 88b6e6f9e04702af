//! Memory-mapped byte source for MaxMind DB files.
//!
//! [`ByteSource`] owns the bytes of one database, either memory-mapped from
//! disk or held in an owned buffer. All reads go through a [`ByteView`], a
//! cheap `Copy` handle that performs the one hard bound the format needs:
//! a read may extend at most [`OVERREAD_MARGIN`] bytes past the logical end
//! of the file. Bytes in that margin read as zero.
//!
//! Fixed-width integer decoding relies on the margin: a 3-byte `uint32` at
//! the very end of the file is read as a 4-byte big-endian word and shifted
//! right, so the extra byte never reaches the caller.
//!
//! # Example
//!
//! ```no_run
//! use seismo_mmdb::mmap::ByteSource;
//!
//! let source = ByteSource::open("GeoLite2-Country.mmdb")?;
//! let view = source.view();
//! println!("First byte: {:#04x}", view.read_u8(0)?);
//! println!("Size: {} bytes", source.size());
//! # Ok::<(), seismo_mmdb::MmdbError>(())
//! ```

use crate::error::{MmdbError, Result};
use log::debug;
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::path::Path;

/// Maximum number of bytes any fixed-width read may extend past a value.
///
/// A `uint64` with a one-byte payload is read as 8 bytes, overreading by 7.
pub const OVERREAD_MARGIN: usize = 7;

/// Storage for database data - either owned or memory-mapped
enum Storage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v.as_slice(),
            Storage::Mmap(m) => &m[..],
        }
    }
}

/// Exclusively-owned, read-only bytes of one database file.
///
/// The mapping is released by [`ByteSource::close`] or on drop. After
/// closing, every read through a view fails with [`MmdbError::Closed`].
pub struct ByteSource {
    storage: Option<Storage>,
    size: usize,
    name: String,
}

impl ByteSource {
    /// Open and memory-map a file.
    ///
    /// I/O failures (missing file, permissions) are passed through as
    /// [`MmdbError::Io`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;

        // Zero-length files cannot be mapped on every platform
        let storage = if len == 0 {
            Storage::Owned(Vec::new())
        } else {
            // SAFETY: the mapping is read-only. Concurrent modification of
            // the file by another process is outside our control, as with
            // every mmap-based reader.
            Storage::Mmap(unsafe { Mmap::map(&file)? })
        };
        let size = storage.as_slice().len();
        debug!("mapped {} ({} bytes)", path.display(), size);

        Ok(Self {
            storage: Some(storage),
            size,
            name: path.display().to_string(),
        })
    }

    /// Wrap an in-memory buffer
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            storage: Some(Storage::Owned(data)),
            size,
            name: "<memory>".to_string(),
        }
    }

    /// Logical size of the database in bytes (excluding the overread margin)
    pub fn size(&self) -> usize {
        self.size
    }

    /// Path the source was opened from, or `<memory>`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`ByteSource::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.storage.is_none()
    }

    /// Release the mapping. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.storage.take().is_some() {
            debug!("closed {}", self.name);
        }
    }

    /// Bounded random-access view over the bytes
    pub fn view(&self) -> ByteView<'_> {
        ByteView {
            bytes: self.storage.as_ref().map(Storage::as_slice),
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSource")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Borrowed, bounds-checked reader over a [`ByteSource`].
///
/// All multi-byte integers are big-endian, as the MMDB format requires.
#[derive(Clone, Copy)]
pub struct ByteView<'a> {
    /// `None` once the source has been closed
    bytes: Option<&'a [u8]>,
}

impl<'a> ByteView<'a> {
    /// View over a plain slice (no backing [`ByteSource`])
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes: Some(bytes) }
    }

    /// Logical size of the underlying bytes; 0 once closed
    pub fn size(&self) -> usize {
        self.bytes.map_or(0, <[u8]>::len)
    }

    fn bytes(&self, offset: usize) -> Result<&'a [u8]> {
        self.bytes.ok_or(MmdbError::Closed { offset })
    }

    /// Read `N` bytes, zero-filling whatever falls inside the overread margin
    fn window<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let bytes = self.bytes(offset)?;
        let end = offset
            .checked_add(N)
            .filter(|&end| end <= bytes.len() + OVERREAD_MARGIN)
            .ok_or(MmdbError::OutOfBounds {
                offset,
                width: N,
                size: bytes.len(),
            })?;

        let mut out = [0u8; N];
        if end <= bytes.len() {
            out.copy_from_slice(&bytes[offset..end]);
        } else if offset < bytes.len() {
            let available = &bytes[offset..];
            out[..available.len()].copy_from_slice(available);
        }
        Ok(out)
    }

    /// Read one byte
    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.window::<1>(offset)?[0])
    }

    /// Read a big-endian `u16`
    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        self.window(offset).map(u16::from_be_bytes)
    }

    /// Read a big-endian `u32`
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.window(offset).map(u32::from_be_bytes)
    }

    /// Read a big-endian `u64`
    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        self.window(offset).map(u64::from_be_bytes)
    }

    /// Read a big-endian two's-complement `i32`
    pub fn read_i32(&self, offset: usize) -> Result<i32> {
        self.window(offset).map(i32::from_be_bytes)
    }

    /// Read a big-endian IEEE 754 single
    pub fn read_f32(&self, offset: usize) -> Result<f32> {
        self.window(offset).map(f32::from_be_bytes)
    }

    /// Read a big-endian IEEE 754 double
    pub fn read_f64(&self, offset: usize) -> Result<f64> {
        self.window(offset).map(f64::from_be_bytes)
    }

    /// Borrow `length` bytes starting at `offset`.
    ///
    /// Variable-length payloads never extend into the overread margin.
    pub fn read_bytes(&self, offset: usize, length: usize) -> Result<&'a [u8]> {
        let bytes = self.bytes(offset)?;
        offset
            .checked_add(length)
            .filter(|&end| end <= bytes.len())
            .map(|end| &bytes[offset..end])
            .ok_or(MmdbError::OutOfBounds {
                offset,
                width: length,
                size: bytes.len(),
            })
    }

    /// Borrow `length` bytes as UTF-8 text
    pub fn read_utf8(&self, offset: usize, length: usize) -> Result<&'a str> {
        let bytes = self.read_bytes(offset, length)?;
        std::str::from_utf8(bytes).map_err(|e| {
            MmdbError::DecodeError(format!("invalid UTF-8 string at offset {}: {}", offset, e))
        })
    }
}

impl fmt::Debug for ByteView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteView")
            .field("size", &self.size())
            .field("closed", &self.bytes.is_none())
            .finish()
    }
}
