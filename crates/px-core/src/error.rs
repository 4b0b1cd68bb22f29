//! Error types for pixel cache and colorspace operations.
//!
//! Every failure carries two classifications on top of its message:
//!
//! - an [`ErrorDomain`] naming the subsystem that reported it
//!   (resource limits, the cache, corrupt input, caller options, delegates)
//! - a [`Severity`] telling the caller whether the result is still usable
//!   ([`Severity::Warning`]), the operation failed but the process can go on
//!   ([`Severity::Error`]), or a core control structure could not be built
//!   ([`Severity::Fatal`])
//!
//! # Usage
//!
//! ```rust
//! use px_core::{Error, ErrorDomain, Result, Severity};
//!
//! fn check(columns: usize, rows: usize) -> Result<()> {
//!     if columns == 0 || rows == 0 {
//!         return Err(Error::invalid_dimensions(columns, rows, "zero extent"));
//!     }
//!     Ok(())
//! }
//!
//! let err = check(0, 10).unwrap_err();
//! assert_eq!(err.domain(), ErrorDomain::Option);
//! assert_eq!(err.severity(), Severity::Error);
//! ```
//!
//! # Dependencies
//!
//! - [`thiserror`] - derive for [`std::error::Error`] and [`std::fmt::Display`]

use std::fmt;

use thiserror::Error;

use crate::region::Region;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Subsystem that reported an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    /// Allocation or disk-space exhaustion, resource ceilings.
    ResourceLimit,
    /// Region and I/O failures inside the pixel cache.
    Cache,
    /// Malformed pixel data detected while filling the cache.
    CorruptImage,
    /// Invalid caller arguments.
    Option,
    /// Failures of external collaborators.
    Delegate,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResourceLimit => "ResourceLimit",
            Self::Cache => "Cache",
            Self::CorruptImage => "CorruptImage",
            Self::Option => "Option",
            Self::Delegate => "Delegate",
        };
        f.write_str(name)
    }
}

/// How bad an error is for the caller.
///
/// Ordered so that `Warning < Error < Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Result is usable but may be degraded.
    Warning,
    /// Operation failed; the image may be partially written.
    Error,
    /// A core control structure could not be created.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Fatal => "FatalError",
        };
        f.write_str(name)
    }
}

/// Errors reported by the pixel cache, cache views and transforms.
#[derive(Debug, Error)]
pub enum Error {
    /// No storage strategy could hold the requested cache.
    ///
    /// Every ceiling (memory, map, disk) was exceeded.
    #[error("cache resources exhausted: {columns}x{rows} needs {requested} bytes ({reason})")]
    CacheResourcesExhausted {
        /// Requested columns
        columns: usize,
        /// Requested rows
        rows: usize,
        /// Bytes requested
        requested: u64,
        /// Which ceilings were hit
        reason: String,
    },

    /// Memory allocation failed.
    ///
    /// `fatal` is set when the allocation was for a control structure with no
    /// degraded fallback (lookup tables, colormaps).
    #[error("failed to allocate {requested} bytes: {reason}")]
    AllocationFailed {
        /// Bytes requested
        requested: usize,
        /// Failure reason
        reason: String,
        /// Whether the failure is unrecoverable
        fatal: bool,
    },

    /// Requested region is empty or lies entirely outside the image.
    #[error("invalid region ({}, {}, {}x{}) for image {columns}x{rows}", .region.x, .region.y, .region.width, .region.height)]
    InvalidRegion {
        /// The requested region
        region: Region,
        /// Image columns
        columns: usize,
        /// Image rows
        rows: usize,
    },

    /// Another nexus holds a conflicting lease on the region.
    #[error("region ({}, {}, {}x{}) is checked out by another nexus", .region.x, .region.y, .region.width, .region.height)]
    RegionBusy {
        /// The contested region
        region: Region,
    },

    /// Authentic access was requested through a read-only view.
    #[error("pixels are not authentic: {0}")]
    PixelsNotAuthentic(String),

    /// The cache holds no pixel storage (ping image).
    #[error("pixel cache is not open")]
    CacheNotOpen,

    /// An operation was attempted on a range past the end of the backing store.
    #[error("cache offset {offset}+{len} exceeds extent {extent}")]
    CacheOutOfRange {
        /// Element offset
        offset: usize,
        /// Element count
        len: usize,
        /// Store extent in elements
        extent: usize,
    },

    /// The operation was cancelled by a progress monitor.
    #[error("{tag} cancelled by progress monitor")]
    Cancelled {
        /// Progress tag of the cancelled operation
        tag: String,
    },

    /// A colormap index points past the end of the colormap.
    #[error("invalid colormap index {index} (colormap has {colors} entries)")]
    InvalidColormapIndex {
        /// Offending index
        index: usize,
        /// Colormap length
        colors: usize,
    },

    /// Invalid image dimensions.
    #[error("invalid dimensions: {columns}x{rows} ({reason})")]
    InvalidDimensions {
        /// Requested columns
        columns: usize,
        /// Requested rows
        rows: usize,
        /// Why they are invalid
        reason: String,
    },

    /// Conversion between two colorspaces is not available.
    #[error("unsupported colorspace conversion: {from} -> {to}")]
    UnsupportedConversion {
        /// Source colorspace
        from: String,
        /// Target colorspace
        to: String,
    },

    /// Generic invalid-argument error.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// External collaborator failure.
    #[error("delegate failed: {0}")]
    Delegate(String),

    /// I/O error on a mapped or disk backed cache.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates an [`Error::CacheResourcesExhausted`] error.
    #[inline]
    pub fn resources_exhausted(
        columns: usize,
        rows: usize,
        requested: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self::CacheResourcesExhausted {
            columns,
            rows,
            requested,
            reason: reason.into(),
        }
    }

    /// Creates a recoverable [`Error::AllocationFailed`] error.
    #[inline]
    pub fn allocation_failed(requested: usize, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            requested,
            reason: reason.into(),
            fatal: false,
        }
    }

    /// Creates a fatal [`Error::AllocationFailed`] error.
    #[inline]
    pub fn fatal_allocation(requested: usize, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            requested,
            reason: reason.into(),
            fatal: true,
        }
    }

    /// Creates an [`Error::InvalidRegion`] error.
    #[inline]
    pub fn invalid_region(region: Region, columns: usize, rows: usize) -> Self {
        Self::InvalidRegion {
            region,
            columns,
            rows,
        }
    }

    /// Creates an [`Error::RegionBusy`] error.
    #[inline]
    pub fn region_busy(region: Region) -> Self {
        Self::RegionBusy { region }
    }

    /// Creates an [`Error::InvalidDimensions`] error.
    #[inline]
    pub fn invalid_dimensions(columns: usize, rows: usize, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            columns,
            rows,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::UnsupportedConversion`] error.
    #[inline]
    pub fn unsupported_conversion(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        Self::UnsupportedConversion {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Creates an [`Error::InvalidArgument`] error.
    #[inline]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates an [`Error::Cancelled`] error.
    #[inline]
    pub fn cancelled(tag: impl Into<String>) -> Self {
        Self::Cancelled { tag: tag.into() }
    }

    /// Subsystem that reported this error.
    pub fn domain(&self) -> ErrorDomain {
        match self {
            Self::CacheResourcesExhausted { .. } | Self::AllocationFailed { .. } => {
                ErrorDomain::ResourceLimit
            }
            Self::InvalidRegion { .. }
            | Self::RegionBusy { .. }
            | Self::PixelsNotAuthentic(_)
            | Self::CacheNotOpen
            | Self::CacheOutOfRange { .. }
            | Self::Cancelled { .. }
            | Self::Io(_) => ErrorDomain::Cache,
            Self::InvalidColormapIndex { .. } => ErrorDomain::CorruptImage,
            Self::InvalidDimensions { .. }
            | Self::UnsupportedConversion { .. }
            | Self::InvalidArgument(_) => ErrorDomain::Option,
            Self::Delegate(_) => ErrorDomain::Delegate,
        }
    }

    /// Severity tier of this error.
    pub fn severity(&self) -> Severity {
        match self {
            Self::AllocationFailed { fatal: true, .. } => Severity::Fatal,
            Self::InvalidColormapIndex { .. } | Self::Cancelled { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Returns `true` for [`Severity::Fatal`] errors.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Returns `true` for region related cache errors.
    #[inline]
    pub fn is_region_error(&self) -> bool {
        matches!(self, Self::InvalidRegion { .. } | Self::RegionBusy { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains() {
        assert_eq!(
            Error::resources_exhausted(10, 10, 800, "disk").domain(),
            ErrorDomain::ResourceLimit
        );
        assert_eq!(Error::CacheNotOpen.domain(), ErrorDomain::Cache);
        assert_eq!(
            Error::InvalidColormapIndex { index: 9, colors: 2 }.domain(),
            ErrorDomain::CorruptImage
        );
        assert_eq!(Error::invalid_argument("x").domain(), ErrorDomain::Option);
        assert_eq!(Error::Delegate("gs".into()).domain(), ErrorDomain::Delegate);
    }

    #[test]
    fn test_severity() {
        assert_eq!(Error::allocation_failed(64, "oom").severity(), Severity::Error);
        assert!(Error::fatal_allocation(64, "oom").is_fatal());
        assert_eq!(Error::cancelled("Transform/Image").severity(), Severity::Warning);
        assert!(Severity::Warning < Severity::Error && Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_messages() {
        let err = Error::invalid_region(Region::new(-3, 4, 0, 2), 10, 10);
        let msg = err.to_string();
        assert!(msg.contains("-3"));
        assert!(msg.contains("10x10"));
        assert!(err.is_region_error());

        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(err.domain(), ErrorDomain::Cache);
    }
}
