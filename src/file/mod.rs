//! Raw access to module image bytes.
//!
//! A [`File`] owns the bytes of a serialized module image, either memory-mapped from disk or held
//! in an owned buffer, and hands out bounds-checked slices of it. Decoding of the image itself is
//! done by [`crate::metadata::image`]; this layer only deals with storage and byte cursors.
//!
//! # Key Components
//!
//! - [`File`] - Owner of the image bytes
//! - [`parser::Parser`] - Cursor with ECMA-335 compressed integer support
//! - [`io`] - Little-endian read/write helpers and compressed integer encoders
//!
//! # Usage Examples
//!
//! ```rust
//! use cilmixin::File;
//!
//! let file = File::from_mem(vec![0x43, 0x4D, 0x49, 0x4D]);
//! assert_eq!(file.len(), 4);
//! assert_eq!(file.data_slice(0, 2)?, b"CM");
//! # Ok::<(), cilmixin::Error>(())
//! ```

pub mod io;
pub mod parser;

use std::{fs, path::Path};

use memmap2::Mmap;

use crate::{Error::OutOfBounds, Result};

/// Where the bytes of a [`File`] live.
#[derive(Debug)]
enum Storage {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

/// The bytes of one serialized module image.
#[derive(Debug)]
pub struct File {
    storage: Storage,
}

impl File {
    /// Memory-maps the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn from_file(path: &Path) -> Result<File> {
        let file = fs::File::open(path)?;
        // read-only mapping, never written through
        let mmap = unsafe { Mmap::map(&file) }?;
        Ok(File {
            storage: Storage::Mapped(mmap),
        })
    }

    /// Wraps an owned buffer.
    #[must_use]
    pub fn from_mem(data: Vec<u8>) -> File {
        File {
            storage: Storage::Owned(data),
        }
    }

    /// Returns the number of bytes in the image.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Returns `true` if the image holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// Returns the complete image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(data) => data.as_slice(),
            Storage::Mapped(mmap) => &mmap[..],
        }
    }

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).ok_or(OutOfBounds)?;
        self.data().get(offset..end).ok_or(OutOfBounds)
    }
}
