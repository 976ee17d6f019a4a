use std::path::PathBuf;

use crate::record::Dimensions;
use crate::store::scan::ScanId;

/// Notification broadcast by a [`CollectionStore`](super::CollectionStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The file list, tag groups or untagged list changed.
    Changed(CollectionChange),
    /// Watching or scanning entered or left a degraded state.
    StatusChanged(StoreStatus),
    MetadataLoaded {
        path: PathBuf,
        dimensions: Dimensions,
    },
    MetadataFailed {
        path: PathBuf,
        reason: String,
    },
    PreviewLoaded {
        path: PathBuf,
    },
    PreviewFailed {
        path: PathBuf,
        reason: String,
    },
}

/// What caused a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChangeCause {
    /// Reconciliation of a directory scan.
    Scan,
    /// An explicit call such as insert, remove or move.
    #[default]
    Edit,
}

/// A path and its position in the ordered file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedPath {
    pub index: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedPath {
    pub from: usize,
    pub to: usize,
    pub path: PathBuf,
}

/// Net difference produced by one mutation of the collection.
///
/// Removal indexes refer to the file list before the change, in ascending
/// order. Insertion indexes refer to the list after the change, also
/// ascending. Applying removals then insertions to a copy of the old list
/// yields the new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionChange {
    pub cause: ChangeCause,
    pub removed: Vec<IndexedPath>,
    pub inserted: Vec<IndexedPath>,
    pub moved: Vec<MovedPath>,
    /// Records kept in place whose file changed on disk.
    pub refreshed: Vec<PathBuf>,
    /// Tag groups created by this change, in creation order.
    pub tags_created: Vec<String>,
}

impl CollectionChange {
    pub fn new(cause: ChangeCause) -> Self {
        CollectionChange {
            cause,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.inserted.is_empty()
            && self.moved.is_empty()
            && self.refreshed.is_empty()
            && self.tags_created.is_empty()
    }

    pub fn removed_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.removed.iter().map(|entry| &entry.path)
    }

    pub fn inserted_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.inserted.iter().map(|entry| &entry.path)
    }
}

/// Health of the folder watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Active,
    /// The watch could not be established; no live updates.
    Degraded(String),
    /// The store was opened without a watcher.
    Disabled,
    Stopped,
}

/// Progress of directory scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning(ScanId),
    Complete(ScanId),
    /// The folder could not be read; the model was left untouched.
    Failed { id: ScanId, reason: String },
}

impl ScanState {
    pub fn is_failed(&self) -> bool {
        matches!(self, ScanState::Failed { .. })
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self, ScanState::Scanning(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub watch: WatchState,
    pub scan: ScanState,
}

impl StoreStatus {
    /// True when live updates are flowing and the last scan succeeded.
    pub fn is_healthy(&self) -> bool {
        self.watch == WatchState::Active && !self.scan.is_failed()
    }
}
