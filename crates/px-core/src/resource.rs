//! Resource limits and accounting.
//!
//! A [`ResourceManager`] is an explicit, shared context that every pixel cache
//! reserves its storage against. Reservations are RAII guards: dropping a
//! [`Reservation`] returns its bytes to the pool.
//!
//! # Environment Variables
//!
//! [`ResourceLimits::from_env`] starts from the defaults and applies:
//!
//! - `PX_AREA_LIMIT` - largest pixel count kept in memory
//! - `PX_MEMORY_LIMIT` - heap bytes for pixel caches
//! - `PX_MAP_LIMIT` - bytes of memory-mapped caches
//! - `PX_DISK_LIMIT` - bytes of disk caches
//! - `PX_THREAD_LIMIT` - worker threads
//! - `PX_TEMPORARY_PATH` - directory for cache files
//!
//! Sizes accept `B`, `KB`, `MB`, `GB`, `TB` (binary multiples, `KiB` etc. are
//! accepted too) and the word `unlimited`.
//!
//! # Usage
//!
//! ```rust
//! use px_core::{ResourceKind, ResourceLimits, ResourceManager};
//!
//! let limits = ResourceLimits::unlimited().with_memory(1024);
//! let manager = ResourceManager::new(limits);
//!
//! let first = manager.try_acquire(ResourceKind::Memory, 1000).unwrap();
//! assert!(manager.try_acquire(ResourceKind::Memory, 100).is_none());
//! drop(first);
//! assert!(manager.try_acquire(ResourceKind::Memory, 100).is_some());
//! ```

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Default safety margin - use at most 80% of system memory.
pub const SAFE_MEMORY_FRACTION: f64 = 0.80;

/// Fallback when system memory cannot be detected (8 GB).
const FALLBACK_MEMORY: u64 = 8 * 1024 * 1024 * 1024;

static SYSTEM_MEMORY: OnceLock<u64> = OnceLock::new();

/// Detect total system RAM in bytes.
pub fn system_memory() -> u64 {
    *SYSTEM_MEMORY.get_or_init(|| {
        sys_info::mem_info()
            .map(|m| m.total * 1024) // KB to bytes
            .unwrap_or(FALLBACK_MEMORY)
    })
}

/// Number of logical CPUs.
pub fn system_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Kind of resource tracked by a [`ResourceManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Pixel count of a single in-memory cache.
    Area,
    /// Heap bytes.
    Memory,
    /// Memory-mapped file bytes.
    Map,
    /// Disk file bytes.
    Disk,
    /// Worker threads.
    Thread,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Area => "area",
            Self::Memory => "memory",
            Self::Map => "map",
            Self::Disk => "disk",
            Self::Thread => "thread",
        };
        f.write_str(name)
    }
}

/// Resource ceilings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Largest pixel count kept in memory.
    pub area: u64,
    /// Heap bytes for pixel caches.
    pub memory: u64,
    /// Bytes of memory-mapped caches.
    pub map: u64,
    /// Bytes of disk caches.
    pub disk: u64,
    /// Worker threads.
    pub threads: usize,
    /// Directory for cache files, `None` for the system temp directory.
    pub temporary_path: Option<PathBuf>,
}

impl Default for ResourceLimits {
    /// Memory is 80% of system RAM, map twice that, area and disk unlimited.
    fn default() -> Self {
        let memory = (system_memory() as f64 * SAFE_MEMORY_FRACTION) as u64;
        Self {
            area: u64::MAX,
            memory,
            map: memory.saturating_mul(2),
            disk: u64::MAX,
            threads: system_threads(),
            temporary_path: None,
        }
    }
}

impl ResourceLimits {
    /// No ceilings at all.
    pub fn unlimited() -> Self {
        Self {
            area: u64::MAX,
            memory: u64::MAX,
            map: u64::MAX,
            disk: u64::MAX,
            threads: system_threads(),
            temporary_path: None,
        }
    }

    /// Defaults with `PX_*` environment overrides applied.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut limits = Self::default();
        if let Some(v) = env_size("PX_AREA_LIMIT") {
            limits.area = v;
        }
        if let Some(v) = env_size("PX_MEMORY_LIMIT") {
            limits.memory = v;
        }
        if let Some(v) = env_size("PX_MAP_LIMIT") {
            limits.map = v;
        }
        if let Some(v) = env_size("PX_DISK_LIMIT") {
            limits.disk = v;
        }
        if let Some(v) = env_size("PX_THREAD_LIMIT") {
            limits.threads = (v as usize).max(1);
        }
        if let Ok(path) = env::var("PX_TEMPORARY_PATH") {
            if !path.is_empty() {
                limits.temporary_path = Some(PathBuf::from(path));
            }
        }
        debug!(?limits, "resource limits from environment");
        limits
    }

    /// Sets the area ceiling in pixels.
    pub fn with_area(mut self, pixels: u64) -> Self {
        self.area = pixels;
        self
    }

    /// Sets the memory ceiling in bytes.
    pub fn with_memory(mut self, bytes: u64) -> Self {
        self.memory = bytes;
        self
    }

    /// Sets the map ceiling in bytes.
    pub fn with_map(mut self, bytes: u64) -> Self {
        self.map = bytes;
        self
    }

    /// Sets the disk ceiling in bytes.
    pub fn with_disk(mut self, bytes: u64) -> Self {
        self.disk = bytes;
        self
    }

    /// Sets the worker thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Sets the directory for cache files.
    pub fn with_temporary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.temporary_path = Some(path.into());
        self
    }

    /// Ceiling for one resource kind.
    pub fn limit(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Area => self.area,
            ResourceKind::Memory => self.memory,
            ResourceKind::Map => self.map,
            ResourceKind::Disk => self.disk,
            ResourceKind::Thread => self.threads as u64,
        }
    }
}

/// Shared accounting of resource usage against [`ResourceLimits`].
///
/// Handed to images as `Arc<ResourceManager>`; there is no global instance.
#[derive(Debug)]
pub struct ResourceManager {
    limits: ResourceLimits,
    memory: AtomicU64,
    map: AtomicU64,
    disk: AtomicU64,
}

impl ResourceManager {
    /// Creates a shared manager.
    pub fn new(limits: ResourceLimits) -> Arc<Self> {
        Arc::new(Self {
            limits,
            memory: AtomicU64::new(0),
            map: AtomicU64::new(0),
            disk: AtomicU64::new(0),
        })
    }

    /// Manager configured from the environment.
    pub fn from_env() -> Arc<Self> {
        Self::new(ResourceLimits::from_env())
    }

    /// The configured ceilings.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    fn counter(&self, kind: ResourceKind) -> Option<&AtomicU64> {
        match kind {
            ResourceKind::Memory => Some(&self.memory),
            ResourceKind::Map => Some(&self.map),
            ResourceKind::Disk => Some(&self.disk),
            ResourceKind::Area | ResourceKind::Thread => None,
        }
    }

    /// Bytes currently reserved for a kind (zero for area/thread).
    pub fn in_use(&self, kind: ResourceKind) -> u64 {
        self.counter(kind)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Remaining budget for a kind.
    pub fn available(&self, kind: ResourceKind) -> u64 {
        self.limits.limit(kind).saturating_sub(self.in_use(kind))
    }

    /// Returns `true` if an in-memory cache of `pixels` is allowed.
    pub fn fits_area(&self, pixels: u64) -> bool {
        pixels <= self.limits.area
    }

    /// Atomically reserves `bytes` of `kind`.
    ///
    /// Returns `None` when the reservation would exceed the ceiling. Area and
    /// thread kinds are not accounted and always succeed.
    pub fn try_acquire(self: &Arc<Self>, kind: ResourceKind, bytes: u64) -> Option<Reservation> {
        let limit = self.limits.limit(kind);
        if let Some(counter) = self.counter(kind) {
            counter
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                    used.checked_add(bytes).filter(|total| *total <= limit)
                })
                .ok()?;
        } else if bytes > limit {
            return None;
        }
        trace!(%kind, bytes, "reserved");
        Some(Reservation {
            manager: Arc::clone(self),
            kind,
            bytes,
        })
    }

    /// Like [`try_acquire`](Self::try_acquire) but reports a resource error.
    pub fn acquire(self: &Arc<Self>, kind: ResourceKind, bytes: u64) -> Result<Reservation> {
        self.try_acquire(kind, bytes).ok_or_else(|| {
            Error::allocation_failed(
                bytes as usize,
                format!(
                    "{kind} limit {} exceeded ({} in use)",
                    format_bytes(self.limits.limit(kind)),
                    format_bytes(self.in_use(kind))
                ),
            )
        })
    }

    fn release(&self, kind: ResourceKind, bytes: u64) {
        if let Some(counter) = self.counter(kind) {
            let prev = counter.fetch_sub(bytes, Ordering::AcqRel);
            if prev < bytes {
                warn!(%kind, bytes, prev, "resource release underflow");
                counter.store(0, Ordering::Release);
            }
        }
        trace!(%kind, bytes, "released");
    }
}

/// A held share of a resource budget; released on drop.
#[derive(Debug)]
pub struct Reservation {
    manager: Arc<ResourceManager>,
    kind: ResourceKind,
    bytes: u64,
}

impl Reservation {
    /// Reserved resource kind.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Reserved byte count.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.manager.release(self.kind, self.bytes);
    }
}

/// Parses a size such as `512`, `64KB`, `1.5GiB` or `unlimited`.
pub fn parse_size(text: &str) -> Result<u64> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("unlimited") || text.eq_ignore_ascii_case("inf") {
        return Ok(u64::MAX);
    }
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid size '{text}'")))?;
    let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" | "P" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        other => {
            return Err(Error::invalid_argument(format!(
                "invalid size suffix '{other}' in '{text}'"
            )));
        }
    };
    Ok((value * multiplier as f64).min(u64::MAX as f64) as u64)
}

fn env_size(name: &str) -> Option<u64> {
    let value = env::var(name).ok()?;
    match parse_size(&value) {
        Ok(v) => Some(v),
        Err(err) => {
            warn!(name, %err, "ignoring resource override");
            None
        }
    }
}

/// Format bytes as human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == u64::MAX {
        "unlimited".to_string()
    } else if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
