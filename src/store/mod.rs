use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};

use crate::config::Config;
use crate::error::{LightboxError, Result};
use crate::record::{Dimensions, FileRecord};
use crate::tag::{TagCatalog, TagGroup};

pub mod events;
pub mod model;
pub mod scan;
pub mod watcher;

pub use events::{
    ChangeCause, CollectionChange, IndexedPath, MovedPath, ScanState, StoreEvent, StoreStatus,
    WatchState,
};
pub use model::Collection;
pub use scan::{ScanExecutor, ScanHandle, ScanId, ScanReport, ScanSnapshot, ScannedFile};
pub use watcher::DirectoryWatcher;

/// Capacity of the notification channel; slow subscribers see `Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Work posted to a store's inbox by background activity.
#[derive(Debug)]
pub enum StoreMessage {
    /// The watcher saw the folder change and the debounce window closed.
    FolderChanged,
    ScanFinished(ScanReport),
    /// `generation` is the record's generation when the load started.
    MetadataLoaded {
        path: PathBuf,
        generation: u64,
        result: Result<Dimensions>,
    },
    PreviewLoaded {
        path: PathBuf,
        generation: u64,
        result: Result<()>,
    },
}

/// Live collection of the image files in one folder.
///
/// The store is the only writer of its [`Collection`]. The directory watcher,
/// scans, and metadata loads run elsewhere and post [`StoreMessage`]s to the
/// store's inbox; the owning task applies them with [`process_next`],
/// [`process_pending`] or [`run_until`]. Every applied change is announced
/// on a broadcast channel obtained from [`subscribe`].
///
/// [`process_next`]: CollectionStore::process_next
/// [`process_pending`]: CollectionStore::process_pending
/// [`run_until`]: CollectionStore::run_until
/// [`subscribe`]: CollectionStore::subscribe
pub struct CollectionStore {
    root: PathBuf,
    config: Config,
    model: Collection,
    catalog: TagCatalog,
    scanner: ScanExecutor,
    current_scan: Option<ScanHandle>,
    watcher: Option<DirectoryWatcher>,
    runtime: Handle,
    inbox_tx: mpsc::UnboundedSender<StoreMessage>,
    inbox_rx: mpsc::UnboundedReceiver<StoreMessage>,
    events: broadcast::Sender<StoreEvent>,
    status: StoreStatus,
}

impl CollectionStore {
    /// Open a store for `root`, watch it, and start the first scan.
    ///
    /// A folder that cannot be watched (for instance because it does not
    /// exist) does not fail the call: the store runs with
    /// [`WatchState::Degraded`] and the scan reports the problem.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let mut store = Self::new(root.into(), config)?;
        store.start_watching();
        store.start_or_restart_scan();
        Ok(store)
    }

    /// Open a store that scans `root` once and never watches it.
    pub fn open_unwatched(root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let mut store = Self::new(root.into(), config)?;
        store.start_or_restart_scan();
        Ok(store)
    }

    fn new(root: PathBuf, config: Config) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| LightboxError::NoRuntime)?;
        if root.exists() && !root.is_dir() {
            return Err(LightboxError::NotADirectory(root));
        }

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(CollectionStore {
            scanner: ScanExecutor::new(runtime.clone(), config.file_type_filter()),
            catalog: config.tag_catalog(),
            root,
            config,
            model: Collection::new(),
            current_scan: None,
            watcher: None,
            runtime,
            inbox_tx,
            inbox_rx,
            events,
            status: StoreStatus {
                watch: WatchState::Disabled,
                scan: ScanState::Idle,
            },
        })
    }

    fn start_watching(&mut self) {
        let inbox = self.inbox_tx.clone();
        let started = DirectoryWatcher::start(&self.root, self.config.debounce(), move || {
            let _ = inbox.send(StoreMessage::FolderChanged);
        });
        match started {
            Ok(watcher) => {
                tracing::debug!("watching {}", self.root.display());
                self.watcher = Some(watcher);
                self.set_watch_state(WatchState::Active);
            }
            Err(e) => {
                tracing::warn!("live updates disabled: {e}");
                self.set_watch_state(WatchState::Degraded(e.to_string()));
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> &StoreStatus {
        &self.status
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// The underlying model, read-only.
    pub fn collection(&self) -> &Collection {
        &self.model
    }

    pub fn files(&self) -> &[Arc<FileRecord>] {
        self.model.files()
    }

    pub fn len(&self) -> usize {
        self.model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_empty()
    }

    pub fn file_record(&self, path: &Path) -> Option<&Arc<FileRecord>> {
        self.model.get(path)
    }

    pub fn tags(&self) -> impl Iterator<Item = &TagGroup> + '_ {
        self.model.tags()
    }

    pub fn tag(&self, name: &str) -> Option<&TagGroup> {
        self.model.tag(name)
    }

    pub fn untagged(&self) -> &[Arc<FileRecord>] {
        self.model.untagged()
    }

    /// Id of the scan whose result the store is waiting for.
    pub fn current_scan_id(&self) -> Option<ScanId> {
        self.current_scan.as_ref().map(ScanHandle::id)
    }

    /// Cancel the outstanding scan, if any, and start a new one.
    ///
    /// Only the result of the newest scan is ever applied.
    pub fn start_or_restart_scan(&mut self) -> ScanId {
        if let Some(previous) = self.current_scan.take() {
            tracing::debug!("{} superseded", previous.id());
            previous.cancel();
        }

        let inbox = self.inbox_tx.clone();
        let handle = self.scanner.submit(&self.root, move |report| {
            let _ = inbox.send(StoreMessage::ScanFinished(report));
        });
        let id = handle.id();
        self.current_scan = Some(handle);
        self.set_scan_state(ScanState::Scanning(id));
        id
    }

    /// Cancel the outstanding scan and forget it.
    pub fn stop_scanning(&mut self) {
        if let Some(scan) = self.current_scan.take() {
            scan.cancel();
            self.set_scan_state(ScanState::Idle);
        }
    }

    /// Stop live updates. Folder change signals already queued are ignored.
    pub fn stop_watching(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.detach();
            watcher.stop();
            self.set_watch_state(WatchState::Stopped);
        }
    }

    pub fn add_file_record(&mut self, record: impl Into<Arc<FileRecord>>) -> Result<()> {
        let change = self.model.push(record.into())?;
        self.emit_change(change);
        Ok(())
    }

    pub fn insert_file_record(
        &mut self,
        record: impl Into<Arc<FileRecord>>,
        index: usize,
    ) -> Result<()> {
        let change = self.model.insert(record.into(), index)?;
        self.emit_change(change);
        Ok(())
    }

    pub fn remove_file_record(&mut self, path: &Path) -> Option<Arc<FileRecord>> {
        let (record, change) = self.model.remove(path)?;
        self.emit_change(change);
        Some(record)
    }

    pub fn remove_file_record_at(&mut self, index: usize) -> Result<Arc<FileRecord>> {
        let (record, change) = self.model.remove_at(index)?;
        self.emit_change(change);
        Ok(record)
    }

    /// Move the record at `from` so that it ends up at `to`.
    pub fn move_file_record(&mut self, from: usize, to: usize) -> Result<()> {
        let change = self.model.move_record(from, to)?;
        self.emit_change(change);
        Ok(())
    }

    /// Return the tag named `name`, creating it first if needed.
    pub fn add_tag(&mut self, name: &str) -> &TagGroup {
        let (tag, created) = self.model.add_tag(name);
        if created {
            let mut change = CollectionChange::new(ChangeCause::Edit);
            change.tags_created.push(name.to_string());
            let _ = self.events.send(StoreEvent::Changed(change));
        }
        tag
    }

    /// Remove every record; tag groups are kept.
    pub fn clear(&mut self) {
        let change = self.model.clear();
        self.emit_change(change);
    }

    /// Load the pixel dimensions of a tracked file in the background.
    ///
    /// The outcome is announced as [`StoreEvent::MetadataLoaded`] or
    /// [`StoreEvent::MetadataFailed`] once the store processes it.
    pub fn request_metadata(&self, path: &Path) -> Result<()> {
        let record = self.tracked(path)?;
        let inbox = self.inbox_tx.clone();
        self.runtime.spawn_blocking(move || {
            let generation = record.generation();
            let result = record.load_metadata();
            let _ = inbox.send(StoreMessage::MetadataLoaded {
                path: record.path().to_path_buf(),
                generation,
                result,
            });
        });
        Ok(())
    }

    /// Generate the preview of a tracked file in the background.
    pub fn request_preview(&self, path: &Path) -> Result<()> {
        let record = self.tracked(path)?;
        let max_pixel_size = self.config.preview_max_pixel_size;
        let inbox = self.inbox_tx.clone();
        self.runtime.spawn_blocking(move || {
            let generation = record.generation();
            let result = record.load_preview(max_pixel_size).map(|_| ());
            let _ = inbox.send(StoreMessage::PreviewLoaded {
                path: record.path().to_path_buf(),
                generation,
                result,
            });
        });
        Ok(())
    }

    fn tracked(&self, path: &Path) -> Result<Arc<FileRecord>> {
        self.model
            .get(path)
            .cloned()
            .ok_or_else(|| LightboxError::NotTracked(path.to_path_buf()))
    }

    /// Wait for the next inbox message.
    pub async fn next_message(&mut self) -> Option<StoreMessage> {
        self.inbox_rx.recv().await
    }

    /// Apply one inbox message.
    pub fn handle(&mut self, message: StoreMessage) {
        match message {
            StoreMessage::FolderChanged => {
                if self.watcher.is_some() {
                    self.start_or_restart_scan();
                } else {
                    tracing::debug!("ignoring folder change after watching stopped");
                }
            }
            StoreMessage::ScanFinished(report) => self.apply_scan_report(report),
            StoreMessage::MetadataLoaded {
                path,
                generation,
                result,
            } => {
                if !self.is_current_load(&path, generation) {
                    return;
                }
                let event = match result {
                    Ok(dimensions) => StoreEvent::MetadataLoaded { path, dimensions },
                    Err(e) => {
                        tracing::warn!("{e}");
                        StoreEvent::MetadataFailed {
                            path,
                            reason: e.to_string(),
                        }
                    }
                };
                let _ = self.events.send(event);
            }
            StoreMessage::PreviewLoaded {
                path,
                generation,
                result,
            } => {
                if !self.is_current_load(&path, generation) {
                    return;
                }
                let event = match result {
                    Ok(()) => StoreEvent::PreviewLoaded { path },
                    Err(e) => {
                        tracing::warn!("{e}");
                        StoreEvent::PreviewFailed {
                            path,
                            reason: e.to_string(),
                        }
                    }
                };
                let _ = self.events.send(event);
            }
        }
    }

    /// Whether a load started at `generation` still describes the tracked file.
    fn is_current_load(&self, path: &Path, generation: u64) -> bool {
        match self.model.get(path) {
            Some(record) if record.generation() == generation => true,
            Some(_) => {
                tracing::debug!("{} was refreshed while loading", path.display());
                false
            }
            None => false,
        }
    }

    /// Wait for one message and apply it. Returns false if the inbox closed.
    pub async fn process_next(&mut self) -> bool {
        match self.next_message().await {
            Some(message) => {
                self.handle(message);
                true
            }
            None => false,
        }
    }

    /// Apply every message already queued, without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(message) = self.inbox_rx.try_recv() {
            self.handle(message);
            processed += 1;
        }
        processed
    }

    /// Process messages until `done` returns true for the store.
    pub async fn run_until<P>(&mut self, mut done: P)
    where
        P: FnMut(&CollectionStore) -> bool,
    {
        while !done(self) {
            if !self.process_next().await {
                return;
            }
        }
    }

    fn apply_scan_report(&mut self, report: ScanReport) {
        if self.current_scan_id() != Some(report.id) {
            tracing::debug!("discarding stale result of {}", report.id);
            return;
        }
        self.current_scan = None;

        if let Some(error) = report.error {
            tracing::warn!("{error}");
            self.set_scan_state(ScanState::Failed {
                id: report.id,
                reason: error.to_string(),
            });
            return;
        }

        let change = self.model.reconcile(&report.snapshot, &self.catalog);
        tracing::debug!(
            "{} applied: {} added, {} removed, {} refreshed",
            report.id,
            change.inserted.len(),
            change.removed.len(),
            change.refreshed.len()
        );
        self.set_scan_state(ScanState::Complete(report.id));
        self.emit_change(change);
    }

    fn emit_change(&self, change: CollectionChange) {
        if change.is_empty() {
            return;
        }
        let _ = self.events.send(StoreEvent::Changed(change));
    }

    fn set_watch_state(&mut self, watch: WatchState) {
        let notable = self.status.watch != watch;
        self.status.watch = watch;
        if notable {
            let _ = self.events.send(StoreEvent::StatusChanged(self.status.clone()));
        }
    }

    /// Only entering or leaving the failed state is announced.
    fn set_scan_state(&mut self, scan: ScanState) {
        let notable = self.status.scan.is_failed() || scan.is_failed();
        self.status.scan = scan;
        if notable {
            let _ = self.events.send(StoreEvent::StatusChanged(self.status.clone()));
        }
    }
}

impl Drop for CollectionStore {
    fn drop(&mut self) {
        if let Some(scan) = self.current_scan.take() {
            scan.cancel();
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.detach();
            watcher.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use jiff::Timestamp;
    use tempfile::TempDir;
    use tokio::time::timeout;

    use super::*;
    use crate::record::{FileAttributes, LoadState};
    use crate::types::FileType;

    fn test_config() -> Config {
        Config {
            debounce_ms: 50,
            ..Config::default()
        }
    }

    async fn settle<P>(store: &mut CollectionStore, done: P)
    where
        P: FnMut(&CollectionStore) -> bool,
    {
        timeout(Duration::from_secs(10), store.run_until(done))
            .await
            .expect("store should reach the expected state");
    }

    fn scan_complete(store: &CollectionStore) -> bool {
        matches!(store.status().scan, ScanState::Complete(_))
    }

    fn drain(rx: &mut broadcast::Receiver<StoreEvent>) -> Vec<StoreEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn changes(events: &[StoreEvent]) -> Vec<&CollectionChange> {
        events
            .iter()
            .filter_map(|event| match event {
                StoreEvent::Changed(change) => Some(change),
                _ => None,
            })
            .collect()
    }

    fn names(records: &[Arc<FileRecord>]) -> Vec<String> {
        records.iter().map(|r| r.file_name()).collect()
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::new(width, height).save(&path).unwrap();
        path
    }

    fn detached_record(path: &str, tags: &[&str]) -> FileRecord {
        FileRecord::new(
            path,
            FileAttributes {
                file_type: FileType::of(Path::new(path)),
                size: 1,
                modified: Some(Timestamp::from_second(1_000).unwrap()),
            },
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_open_scans_existing_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("Beach.jpg"), b"jpeg").unwrap();
        fs::write(tmp.path().join("abstract.png"), b"png").unwrap();
        fs::write(tmp.path().join("readme.txt"), b"text").unwrap();

        let mut config = test_config();
        config
            .tags
            .insert("Beach".to_string(), vec!["Water".to_string()]);
        let mut store = CollectionStore::open_unwatched(tmp.path(), config).unwrap();
        let mut rx = store.subscribe();
        assert_eq!(store.status().watch, WatchState::Disabled);
        assert!(store.status().scan.is_scanning());

        settle(&mut store, scan_complete).await;

        assert_eq!(names(store.files()), vec!["abstract.png", "Beach.jpg"]);
        assert_eq!(names(store.untagged()), vec!["abstract.png"]);
        assert_eq!(names(store.tag("Water").unwrap().members()), vec!["Beach.jpg"]);
        assert!(store.current_scan_id().is_none());

        let events = drain(&mut rx);
        let changed = changes(&events);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].cause, ChangeCause::Scan);
        assert_eq!(changed[0].inserted.len(), 2);
        assert_eq!(changed[0].tags_created, vec!["Water"]);
    }

    #[tokio::test]
    async fn test_rescan_of_unchanged_folder_emits_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.png"), b"png").unwrap();

        let mut store = CollectionStore::open_unwatched(tmp.path(), test_config()).unwrap();
        settle(&mut store, scan_complete).await;
        let before = Arc::clone(&store.files()[0]);
        let mut rx = store.subscribe();

        let second = store.start_or_restart_scan();
        settle(&mut store, move |s| s.status().scan == ScanState::Complete(second)).await;

        assert!(drain(&mut rx).is_empty());
        assert!(Arc::ptr_eq(&before, &store.files()[0]));
    }

    #[tokio::test]
    async fn test_stale_scan_result_is_discarded() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("real.png"), b"png").unwrap();

        let mut store = CollectionStore::open_unwatched(tmp.path(), test_config()).unwrap();
        let stale = store.current_scan_id().unwrap();
        let fresh = store.start_or_restart_scan();
        assert!(fresh > stale);
        let mut rx = store.subscribe();

        let ghost = tmp.path().join("ghost.png");
        store.handle(StoreMessage::ScanFinished(ScanReport {
            id: stale,
            snapshot: ScanSnapshot::new(vec![ScannedFile {
                path: ghost.clone(),
                attributes: FileAttributes {
                    file_type: FileType::of(&ghost),
                    size: 1,
                    modified: None,
                },
            }]),
            error: None,
        }));
        assert!(store.is_empty());
        assert!(drain(&mut rx).is_empty());
        assert_eq!(store.current_scan_id(), Some(fresh));

        settle(&mut store, scan_complete).await;
        assert_eq!(names(store.files()), vec!["real.png"]);
        assert!(store.file_record(&ghost).is_none());
    }

    #[tokio::test]
    async fn test_late_result_of_superseded_scan_is_ignored() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("real.png"), b"png").unwrap();

        let mut store = CollectionStore::open_unwatched(tmp.path(), test_config()).unwrap();
        let superseded = store.current_scan_id().unwrap();
        let fresh = store.start_or_restart_scan();
        settle(&mut store, move |s| s.status().scan == ScanState::Complete(fresh)).await;
        let before = Arc::clone(&store.files()[0]);
        let mut rx = store.subscribe();

        // The first scan saw an empty folder and reports only now.
        store.handle(StoreMessage::ScanFinished(ScanReport {
            id: superseded,
            snapshot: ScanSnapshot::default(),
            error: None,
        }));

        assert!(drain(&mut rx).is_empty());
        assert_eq!(names(store.files()), vec!["real.png"]);
        assert!(Arc::ptr_eq(&before, &store.files()[0]));
        assert_eq!(store.status().scan, ScanState::Complete(fresh));
    }

    #[tokio::test]
    async fn test_scan_failure_leaves_model_untouched() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("photos");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.png"), b"png").unwrap();

        let mut store = CollectionStore::open_unwatched(&root, test_config()).unwrap();
        settle(&mut store, scan_complete).await;
        let mut rx = store.subscribe();

        fs::remove_dir_all(&root).unwrap();
        store.start_or_restart_scan();
        settle(&mut store, |s| s.status().scan.is_failed()).await;

        assert_eq!(store.len(), 1);
        let events = drain(&mut rx);
        assert!(changes(&events).is_empty());
        assert!(
            events
                .iter()
                .any(|e| matches!(e, StoreEvent::StatusChanged(status) if status.scan.is_failed()))
        );
        assert!(!store.status().is_healthy());
    }

    #[tokio::test]
    async fn test_missing_directory_runs_degraded() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("not-there");

        let mut store = CollectionStore::open(&missing, test_config()).unwrap();
        assert!(matches!(store.status().watch, WatchState::Degraded(_)));

        settle(&mut store, |s| s.status().scan.is_failed()).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_open_rejects_regular_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.png");
        fs::write(&file, b"png").unwrap();

        assert!(matches!(
            CollectionStore::open(&file, test_config()),
            Err(LightboxError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_open_outside_runtime_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            CollectionStore::open_unwatched(tmp.path(), test_config()),
            Err(LightboxError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn test_watch_tracks_added_and_removed_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.png"), b"png").unwrap();

        let mut store = CollectionStore::open(tmp.path(), test_config()).unwrap();
        assert_eq!(store.status().watch, WatchState::Active);
        settle(&mut store, scan_complete).await;

        let added = tmp.path().join("b.png");
        fs::write(&added, b"png").unwrap();
        let watched = added.clone();
        settle(&mut store, move |s| s.file_record(&watched).is_some()).await;
        assert_eq!(names(store.files()), vec!["a.png", "b.png"]);

        fs::remove_file(tmp.path().join("a.png")).unwrap();
        let removed = tmp.path().join("a.png");
        settle(&mut store, move |s| s.file_record(&removed).is_none()).await;
        assert_eq!(names(store.files()), vec!["b.png"]);
        store.collection().verify_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_stop_watching_ignores_queued_changes() {
        let tmp = TempDir::new().unwrap();
        let mut store = CollectionStore::open(tmp.path(), test_config()).unwrap();
        settle(&mut store, scan_complete).await;

        store.stop_watching();
        assert_eq!(store.status().watch, WatchState::Stopped);

        store.handle(StoreMessage::FolderChanged);
        assert!(store.current_scan_id().is_none());
        assert!(!store.status().scan.is_scanning());
    }

    #[tokio::test]
    async fn test_stop_scanning_forgets_current_scan() {
        let tmp = TempDir::new().unwrap();
        let mut store = CollectionStore::open_unwatched(tmp.path(), test_config()).unwrap();
        let id = store.current_scan_id().unwrap();

        store.stop_scanning();
        assert!(store.current_scan_id().is_none());
        assert_eq!(store.status().scan, ScanState::Idle);

        store.handle(StoreMessage::ScanFinished(ScanReport {
            id,
            snapshot: ScanSnapshot::default(),
            error: None,
        }));
        assert_eq!(store.status().scan, ScanState::Idle);
    }

    #[tokio::test]
    async fn test_edits_emit_one_change_each() {
        let tmp = TempDir::new().unwrap();
        let mut store = CollectionStore::open_unwatched(tmp.path(), test_config()).unwrap();
        settle(&mut store, scan_complete).await;
        let mut rx = store.subscribe();

        store.add_file_record(detached_record("/p/a.png", &[])).unwrap();
        store.add_file_record(detached_record("/p/b.png", &["Snow"])).unwrap();
        store
            .insert_file_record(detached_record("/p/c.png", &[]), 0)
            .unwrap();
        store.move_file_record(0, 2).unwrap();
        let removed = store.remove_file_record(Path::new("/p/b.png")).unwrap();
        assert_eq!(removed.path(), Path::new("/p/b.png"));
        assert!(matches!(
            store.add_file_record(detached_record("/p/a.png", &[])),
            Err(LightboxError::DuplicateRecord(_))
        ));

        let events = drain(&mut rx);
        let changed = changes(&events);
        assert_eq!(changed.len(), 5);
        assert!(changed.iter().all(|c| c.cause == ChangeCause::Edit));
        assert_eq!(changed[1].tags_created, vec!["Snow"]);
        assert_eq!(
            changed[3].moved,
            vec![MovedPath {
                from: 0,
                to: 2,
                path: PathBuf::from("/p/c.png")
            }]
        );
        assert_eq!(
            changed[4].removed,
            vec![IndexedPath {
                index: 1,
                path: PathBuf::from("/p/b.png")
            }]
        );
        assert_eq!(names(store.files()), vec!["a.png", "c.png"]);
        assert!(store.tag("Snow").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_tag_announces_creation_once() {
        let tmp = TempDir::new().unwrap();
        let mut store = CollectionStore::open_unwatched(tmp.path(), test_config()).unwrap();
        let mut rx = store.subscribe();

        let first: *const TagGroup = store.add_tag("Vacation");
        let second: *const TagGroup = store.add_tag("Vacation");
        assert!(std::ptr::eq(first, second));
        assert_eq!(store.add_tag("Vacation").name(), "Vacation");
        assert!(store.add_tag("Vacation").is_empty());

        let events = drain(&mut rx);
        let changed = changes(&events);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].tags_created, vec!["Vacation"]);
        assert!(store.tag("Vacation").is_some());
    }

    #[tokio::test]
    async fn test_clear_empties_the_collection() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.png"), b"png").unwrap();
        fs::write(tmp.path().join("b.png"), b"png").unwrap();
        let mut store = CollectionStore::open_unwatched(tmp.path(), test_config()).unwrap();
        settle(&mut store, scan_complete).await;
        let mut rx = store.subscribe();

        store.clear();
        assert!(store.is_empty());
        let events = drain(&mut rx);
        assert_eq!(changes(&events)[0].removed.len(), 2);
    }

    #[tokio::test]
    async fn test_request_metadata_and_preview() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(tmp.path(), "wide.png", 320, 200);

        let mut store = CollectionStore::open_unwatched(tmp.path(), test_config()).unwrap();
        settle(&mut store, scan_complete).await;
        let mut rx = store.subscribe();

        store.request_metadata(&path).unwrap();
        timeout(Duration::from_secs(5), store.process_next())
            .await
            .unwrap();
        store.request_preview(&path).unwrap();
        // Poll instead of awaiting the inbox.
        timeout(Duration::from_secs(5), async {
            while store.process_pending() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let record = store.file_record(&path).unwrap();
        assert_eq!(record.dimensions_description(), "320 x 200");
        let preview = record.preview().unwrap();
        assert_eq!((preview.width(), preview.height()), (160, 100));

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                StoreEvent::MetadataLoaded {
                    path: path.clone(),
                    dimensions: Dimensions {
                        width: 320,
                        height: 200
                    },
                },
                StoreEvent::PreviewLoaded { path },
            ]
        );
    }

    #[tokio::test]
    async fn test_load_finished_before_refresh_is_not_announced() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(tmp.path(), "a.png", 40, 30);

        let mut store = CollectionStore::open_unwatched(tmp.path(), test_config()).unwrap();
        settle(&mut store, scan_complete).await;
        let started_at = store.file_record(&path).unwrap().generation();

        write_png(tmp.path(), "a.png", 20, 10);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(std::time::SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        let rescan = store.start_or_restart_scan();
        settle(&mut store, move |s| s.status().scan == ScanState::Complete(rescan)).await;
        let record = Arc::clone(store.file_record(&path).unwrap());
        assert_eq!(record.generation(), started_at + 1);
        let mut rx = store.subscribe();

        let old = Dimensions {
            width: 40,
            height: 30,
        };
        store.handle(StoreMessage::MetadataLoaded {
            path: path.clone(),
            generation: started_at,
            result: Ok(old),
        });
        store.handle(StoreMessage::PreviewLoaded {
            path: path.clone(),
            generation: started_at,
            result: Ok(()),
        });
        assert!(drain(&mut rx).is_empty());

        store.request_metadata(&path).unwrap();
        timeout(Duration::from_secs(5), store.process_next())
            .await
            .unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![StoreEvent::MetadataLoaded {
                path,
                dimensions: Dimensions {
                    width: 20,
                    height: 10
                },
            }]
        );
    }

    #[tokio::test]
    async fn test_request_metadata_failure_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        fs::write(&path, b"not a png").unwrap();

        let mut store = CollectionStore::open_unwatched(tmp.path(), test_config()).unwrap();
        settle(&mut store, scan_complete).await;
        let mut rx = store.subscribe();

        store.request_metadata(&path).unwrap();
        store.process_next().await;

        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [StoreEvent::MetadataFailed { path: failed, .. }] if *failed == path
        ));
        let record = store.file_record(&path).unwrap();
        assert!(matches!(record.metadata_state(), LoadState::Failed(_)));
        assert_eq!(record.dimensions_description(), "unknown");
    }

    #[tokio::test]
    async fn test_request_for_untracked_path_fails() {
        let tmp = TempDir::new().unwrap();
        let store = CollectionStore::open_unwatched(tmp.path(), test_config()).unwrap();
        assert!(matches!(
            store.request_metadata(&tmp.path().join("nope.png")),
            Err(LightboxError::NotTracked(_))
        ));
    }
}
