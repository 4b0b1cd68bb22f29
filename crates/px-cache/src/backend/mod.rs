//! Pixel storage backends.
//!
//! # Architecture
//!
//! ```text
//! Cache
//!   +-- MemoryBackend (heap, zero-copy windows)
//!   +-- MapBackend    (memory-mapped file, zero-copy windows)
//!   +-- DiskBackend   (positional file I/O, staged windows only)
//! ```
//!
//! Every backend stores `pixel_count` pixel packets in row-major order,
//! followed by `pixel_count` index packets when the cache has an index
//! channel. File backed stores use the same layout starting at a base offset,
//! which is also the persisted cache file format.
//!
//! Backends are shared between threads. Callers must only touch disjoint
//! element ranges concurrently. Write leases keep authentic windows apart;
//! reads overlapping a write are the caller's concern.

mod disk;
mod map;
mod memory;

pub(crate) use disk::DiskBackend;
pub(crate) use map::MapBackend;
pub(crate) use memory::MemoryBackend;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use px_core::{Error, INDEX_PACKET_SIZE, IndexPacket, PIXEL_PACKET_SIZE, PixelPacket, Result};
use tempfile::NamedTempFile;

/// Where a cache keeps its pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageType {
    /// Storage has not been allocated yet.
    #[default]
    Undefined,
    /// Heap memory.
    Memory,
    /// Memory-mapped file.
    Map,
    /// File accessed with positional reads and writes.
    Disk,
    /// Dimensions only, no pixel storage.
    Ping,
}

impl StorageType {
    /// Returns `true` if windows can point straight into the store.
    #[inline]
    pub const fn is_addressable(&self) -> bool {
        matches!(self, Self::Memory | Self::Map)
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "Undefined",
            Self::Memory => "Memory",
            Self::Map => "Map",
            Self::Disk => "Disk",
            Self::Ping => "Ping",
        };
        f.write_str(name)
    }
}

/// Bytes needed for `pixel_count` pixels and optional indexes.
pub(crate) fn store_length(pixel_count: usize, has_indexes: bool) -> Option<usize> {
    let pixels = pixel_count.checked_mul(PIXEL_PACKET_SIZE)?;
    if has_indexes {
        pixels.checked_add(pixel_count.checked_mul(INDEX_PACKET_SIZE)?)
    } else {
        Some(pixels)
    }
}

/// Base pointers of an addressable store.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DirectStore {
    pub pixels: NonNull<PixelPacket>,
    pub indexes: Option<NonNull<IndexPacket>>,
}

// SAFETY: the pointers address a store owned by a `Cache` that outlives every
// nexus holding a copy; concurrent writes are restricted to disjoint ranges
// by write leases.
unsafe impl Send for DirectStore {}
unsafe impl Sync for DirectStore {}

/// Storage behind a pixel cache.
///
/// Offsets and lengths are in elements (pixels or indexes), not bytes.
pub(crate) trait CacheBackend: Send + Sync {
    /// Storage class of this backend.
    fn storage_type(&self) -> StorageType;

    /// Returns `true` if an index channel follows the pixels.
    fn has_indexes(&self) -> bool;

    /// Copies pixels starting at `offset` into `dst`.
    fn read_pixels(&self, offset: usize, dst: &mut [PixelPacket]) -> Result<()>;

    /// Copies `src` into the store starting at `offset`.
    fn write_pixels(&self, offset: usize, src: &[PixelPacket]) -> Result<()>;

    /// Copies indexes starting at `offset` into `dst`.
    fn read_indexes(&self, offset: usize, dst: &mut [IndexPacket]) -> Result<()>;

    /// Copies `src` into the index channel starting at `offset`.
    fn write_indexes(&self, offset: usize, src: &[IndexPacket]) -> Result<()>;

    /// Base pointers for zero-copy windows, `None` if not addressable.
    fn direct(&self) -> Option<DirectStore> {
        None
    }

    /// Pushes outstanding writes to the backing file.
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Backing file, if any.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Rejects element ranges past the end of a store.
#[inline]
pub(crate) fn check_range(offset: usize, len: usize, extent: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= extent => Ok(()),
        _ => Err(Error::CacheOutOfRange {
            offset,
            len,
            extent,
        }),
    }
}

/// File behind a Map or Disk backend.
pub(crate) enum BackingFile {
    /// Anonymous cache file, deleted on drop.
    Temporary(NamedTempFile),
    /// Persisted cache file, kept on drop.
    Persistent {
        /// File location
        path: PathBuf,
        /// Open handle
        file: File,
    },
}

impl BackingFile {
    /// Creates a sparse temporary file of `len` bytes.
    pub fn temporary(dir: Option<&Path>, len: u64) -> Result<Self> {
        let tmp = match dir {
            Some(dir) => tempfile::Builder::new().prefix("px-cache-").tempfile_in(dir)?,
            None => tempfile::Builder::new().prefix("px-cache-").tempfile()?,
        };
        tmp.as_file().set_len(len)?;
        Ok(Self::Temporary(tmp))
    }

    /// Opens (or creates) a persisted cache file, growing it to at least `min_len` bytes.
    pub fn persistent(path: &Path, min_len: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() < min_len {
            file.set_len(min_len)?;
        }
        Ok(Self::Persistent {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn file(&self) -> &File {
        match self {
            Self::Temporary(tmp) => tmp.as_file(),
            Self::Persistent { file, .. } => file,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Temporary(tmp) => tmp.path(),
            Self::Persistent { path, .. } => path,
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent { .. })
    }
}

/// Reads exactly `buf.len()` bytes at `offset`.
#[cfg(unix)]
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

/// Writes all of `buf` at `offset`.
#[cfg(unix)]
pub(crate) fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
pub(crate) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "cache file shorter than expected",
                ));
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
pub(crate) fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write cache file",
                ));
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
