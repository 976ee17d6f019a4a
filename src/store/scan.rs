//! Background directory enumeration.
//!
//! A scan lists the immediate children of the watched folder, keeps the
//! regular files accepted by the [`FileTypeFilter`], and delivers a
//! [`ScanReport`] through a callback from tokio's blocking pool. Every
//! submission gets a fresh [`ScanId`]; the store uses it to discard results
//! from scans that were superseded while running.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::runtime::Handle;
use unicase::UniCase;

use crate::error::{LightboxError, Result};
use crate::record::FileAttributes;
use crate::types::FileTypeFilter;

/// Issue-order identifier of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanId(u64);

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scan#{}", self.0)
    }
}

/// One file observed by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub attributes: FileAttributes,
}

/// The files observed by one enumeration pass, sorted by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSnapshot {
    entries: Vec<ScannedFile>,
}

impl ScanSnapshot {
    pub fn new(mut entries: Vec<ScannedFile>) -> Self {
        entries.sort_by(|a, b| {
            let name_a = a.path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            let name_b = b.path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            UniCase::new(&*name_a)
                .cmp(&UniCase::new(&*name_b))
                .then_with(|| a.path.cmp(&b.path))
        });
        entries.dedup_by(|a, b| a.path == b.path);
        ScanSnapshot { entries }
    }

    pub fn entries(&self) -> &[ScannedFile] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| entry.path == path)
    }
}

/// Result of a scan as delivered to the issuer.
///
/// When enumeration failed, `snapshot` is empty and `error` says why.
#[derive(Debug)]
pub struct ScanReport {
    pub id: ScanId,
    pub snapshot: ScanSnapshot,
    pub error: Option<LightboxError>,
}

/// Handle to a submitted scan.
#[derive(Debug, Clone)]
pub struct ScanHandle {
    id: ScanId,
    cancelled: Arc<AtomicBool>,
}

impl ScanHandle {
    pub fn id(&self) -> ScanId {
        self.id
    }

    /// Ask the scan to stop early and never deliver its result.
    ///
    /// Best effort: the worker checks the flag between entries and before
    /// delivery.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Runs directory scans off the calling task.
pub struct ScanExecutor {
    runtime: Handle,
    filter: Arc<FileTypeFilter>,
    next_id: AtomicU64,
}

impl ScanExecutor {
    pub fn new(runtime: Handle, filter: FileTypeFilter) -> Self {
        ScanExecutor {
            runtime,
            filter: Arc::new(filter),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn filter(&self) -> &FileTypeFilter {
        &self.filter
    }

    /// Enumerate `path` in the background and hand the report to `deliver`.
    ///
    /// Returns immediately. `deliver` runs on a worker thread, at most once,
    /// and not at all if the scan is cancelled first.
    pub fn submit<F>(&self, path: &Path, deliver: F) -> ScanHandle
    where
        F: FnOnce(ScanReport) + Send + 'static,
    {
        let id = ScanId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = ScanHandle {
            id,
            cancelled: Arc::clone(&cancelled),
        };

        let path = path.to_path_buf();
        let filter = Arc::clone(&self.filter);
        self.runtime.spawn_blocking(move || {
            let report = match enumerate_directory(&path, &filter, &cancelled) {
                Ok(snapshot) => ScanReport {
                    id,
                    snapshot,
                    error: None,
                },
                Err(error) => ScanReport {
                    id,
                    snapshot: ScanSnapshot::default(),
                    error: Some(error),
                },
            };
            if cancelled.load(Ordering::Acquire) {
                tracing::debug!("{id} cancelled, dropping its result");
                return;
            }
            deliver(report);
        });

        handle
    }
}

/// List the image files directly inside `dir`.
///
/// Failing to open or read the directory is an error, so a partial listing
/// never reaches the model. Entries that vanish or cannot be inspected
/// mid-scan are skipped. Stops early, returning what it has, once
/// `cancelled` is set.
pub fn enumerate_directory(
    dir: &Path,
    filter: &FileTypeFilter,
    cancelled: &AtomicBool,
) -> Result<ScanSnapshot> {
    let entries = std::fs::read_dir(dir).map_err(|source| LightboxError::ScanEnumeration {
        path: dir.to_path_buf(),
        source,
    })?;
    collect_images(dir, entries.map(|entry| entry.map(|e| e.path())), filter, cancelled)
}

fn collect_images<I>(
    dir: &Path,
    paths: I,
    filter: &FileTypeFilter,
    cancelled: &AtomicBool,
) -> Result<ScanSnapshot>
where
    I: IntoIterator<Item = io::Result<PathBuf>>,
{
    let mut files = Vec::new();
    for path in paths {
        if cancelled.load(Ordering::Acquire) {
            break;
        }
        let path = path.map_err(|source| LightboxError::ScanEnumeration {
            path: dir.to_path_buf(),
            source,
        })?;
        if !filter.accepts(&path) {
            continue;
        }
        // Follows symlinks, so a link to an image counts as a regular file.
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!("skipping {}: {e}", path.display());
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        let attributes = FileAttributes::from_metadata(&path, &metadata);
        files.push(ScannedFile { path, attributes });
    }

    Ok(ScanSnapshot::new(files))
}
