//! The per-file model entity.
//!
//! A `FileRecord` is identified by its path for its whole lifetime. File
//! attributes come from the directory scan; pixel dimensions and the preview
//! thumbnail are loaded lazily and may be populated from background tasks,
//! so those slots use interior mutability. Nothing here touches the
//! collection's indexes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;
use jiff::Timestamp;
use parking_lot::{Mutex, RwLock};

use crate::error::{LightboxError, Result};
use crate::types::FileType;

/// Default edge length, in pixels, of generated previews.
pub const DEFAULT_PREVIEW_MAX_PIXEL_SIZE: u32 = 160;

/// Shared handle to a generated preview thumbnail.
pub type Preview = Arc<RgbaImage>;

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.width, self.height)
    }
}

/// Raw filesystem attributes observed for a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    pub file_type: FileType,
    pub size: u64,
    pub modified: Option<Timestamp>,
}

impl FileAttributes {
    /// Read attributes for `path` from the filesystem.
    pub fn read(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }

    pub(crate) fn from_metadata(path: &Path, metadata: &std::fs::Metadata) -> Self {
        FileAttributes {
            file_type: FileType::of(path),
            size: metadata.len(),
            modified: metadata
                .modified()
                .ok()
                .and_then(|time| Timestamp::try_from(time).ok()),
        }
    }
}

/// State of a lazily loaded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    Unloaded,
    Loaded(T),
    /// The last load attempt failed; the message is kept for display.
    Failed(String),
}

impl<T> LoadState<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded(_))
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            LoadState::Loaded(value) => Some(value),
            _ => None,
        }
    }
}

/// One tracked image file.
pub struct FileRecord {
    path: PathBuf,
    tag_names: Vec<String>,
    attributes: RwLock<FileAttributes>,
    /// Bumped by every refresh; loads started under an older value are not cached.
    generation: AtomicU64,
    metadata: Mutex<LoadState<Dimensions>>,
    preview: Mutex<LoadState<Preview>>,
}

impl FileRecord {
    /// Create a record. Duplicate tag names are dropped, keeping first
    /// occurrences in order.
    pub fn new(path: impl Into<PathBuf>, attributes: FileAttributes, tag_names: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(tag_names.len());
        for name in tag_names {
            if !name.is_empty() && !unique.contains(&name) {
                unique.push(name);
            }
        }
        FileRecord {
            path: path.into(),
            tag_names: unique,
            attributes: RwLock::new(attributes),
            generation: AtomicU64::new(0),
            metadata: Mutex::new(LoadState::Unloaded),
            preview: Mutex::new(LoadState::Unloaded),
        }
    }

    /// Create a record for an existing file, reading its attributes from disk.
    pub fn open(path: impl Into<PathBuf>, tag_names: Vec<String>) -> Result<Self> {
        let path = path.into();
        let attributes = FileAttributes::read(&path)?;
        Ok(Self::new(path, attributes, tag_names))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name without its extension; the display sort key.
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn tag_names(&self) -> &[String] {
        &self.tag_names
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tag_names.iter().any(|tag| tag == name)
    }

    pub fn is_untagged(&self) -> bool {
        self.tag_names.is_empty()
    }

    pub fn attributes(&self) -> FileAttributes {
        self.attributes.read().clone()
    }

    pub fn file_type(&self) -> FileType {
        self.attributes.read().file_type.clone()
    }

    pub fn size(&self) -> u64 {
        self.attributes.read().size
    }

    pub fn modified(&self) -> Option<Timestamp> {
        self.attributes.read().modified
    }

    pub fn type_description(&self) -> String {
        self.attributes.read().file_type.description()
    }

    /// Replace the attributes when `observed` is newer than what we hold.
    ///
    /// A refreshed record drops its loaded metadata and preview so the next
    /// request reads the new file contents. Returns whether a refresh happened.
    pub(crate) fn refresh(&self, observed: &FileAttributes) -> bool {
        let newer = {
            let current = self.attributes.read();
            match (current.modified, observed.modified) {
                (Some(known), Some(seen)) => seen > known,
                (None, Some(_)) => true,
                _ => false,
            }
        };
        if !newer {
            return false;
        }
        *self.attributes.write() = observed.clone();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.metadata.lock() = LoadState::Unloaded;
        *self.preview.lock() = LoadState::Unloaded;
        true
    }

    /// Number of refreshes this record has seen.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn metadata_state(&self) -> LoadState<Dimensions> {
        self.metadata.lock().clone()
    }

    /// Pixel dimensions, loading them on first access.
    ///
    /// Returns `None` while unknown. A failed load is not retried here; use
    /// [`FileRecord::load_metadata`] to retry explicitly.
    pub fn dimensions(&self) -> Option<Dimensions> {
        let state = self.metadata.lock().clone();
        match state {
            LoadState::Loaded(dimensions) => Some(dimensions),
            LoadState::Failed(_) => None,
            LoadState::Unloaded => self.load_metadata().ok(),
        }
    }

    pub fn pixels_wide(&self) -> Option<u32> {
        self.dimensions().map(|d| d.width)
    }

    pub fn pixels_high(&self) -> Option<u32> {
        self.dimensions().map(|d| d.height)
    }

    /// "W x H", or "unknown" when the dimensions cannot be read.
    pub fn dimensions_description(&self) -> String {
        self.dimensions()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Read the pixel dimensions from the image header.
    ///
    /// Already-loaded dimensions are returned without touching the file.
    /// Blocking: call from a worker thread when used off the main task.
    pub fn load_metadata(&self) -> Result<Dimensions> {
        self.load_slot(&self.metadata, || {
            image::image_dimensions(&self.path).map(|(width, height)| Dimensions { width, height })
        })
        .map_err(|source| LightboxError::MetadataLoad {
            path: self.path.clone(),
            source,
        })
    }

    pub fn preview_state(&self) -> LoadState<Preview> {
        self.preview.lock().clone()
    }

    pub fn preview(&self) -> Option<Preview> {
        self.preview.lock().loaded().cloned()
    }

    /// Decode the image and build a thumbnail whose longer edge is at most
    /// `max_pixel_size`. Blocking.
    pub fn load_preview(&self, max_pixel_size: u32) -> Result<Preview> {
        self.load_slot(&self.preview, || {
            image::open(&self.path).map(|img| {
                let thumbnail = img.thumbnail(max_pixel_size, max_pixel_size);
                Arc::new(thumbnail.to_rgba8())
            })
        })
        .map_err(|source| LightboxError::PreviewLoad {
            path: self.path.clone(),
            source,
        })
    }

    /// Run `load` unless `slot` already holds a value, and record the outcome.
    ///
    /// The outcome is only stored if no refresh happened while `load` ran;
    /// otherwise it describes the old file contents and is returned uncached.
    fn load_slot<T, E>(
        &self,
        slot: &Mutex<LoadState<T>>,
        load: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        T: Clone,
        E: fmt::Display,
    {
        if let LoadState::Loaded(value) = &*slot.lock() {
            return Ok(value.clone());
        }

        let generation = self.generation();
        let outcome = load();

        let mut slot = slot.lock();
        if self.generation() != generation {
            tracing::debug!("{} changed while loading, not caching", self.path.display());
            return outcome;
        }
        match &outcome {
            Ok(value) => {
                // A concurrent load may have won; keep the first value.
                if let LoadState::Loaded(existing) = &*slot {
                    return Ok(existing.clone());
                }
                *slot = LoadState::Loaded(value.clone());
            }
            Err(e) => {
                if !slot.is_loaded() {
                    *slot = LoadState::Failed(e.to_string());
                }
            }
        }
        outcome
    }
}

impl fmt::Debug for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRecord")
            .field("path", &self.path)
            .field("tag_names", &self.tag_names)
            .field("attributes", &*self.attributes.read())
            .field("generation", &self.generation())
            .field("metadata", &*self.metadata.lock())
            .field("preview_loaded", &self.preview.lock().is_loaded())
            .finish()
    }
}
