//! Filesystem watcher for a collection folder.
//!
//! Watches one directory (non-recursively) with `notify::RecommendedWatcher`
//! and bridges raw events over a bounded channel to a dedicated debounce
//! thread. A burst of events collapses into one call of the registered
//! handler once the folder has been quiet for the debounce window.
//!
//! The handler runs on the debounce thread. The collection store registers a
//! handler that only posts a message to its own inbox, so the watcher never
//! touches the model.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::error::{LightboxError, Result};

/// Capacity of the bounded channel bridging `notify` events to the debounce
/// thread. When it is full a signal is already pending, so extra events are
/// dropped.
const CHANNEL_CAPACITY: usize = 512;

/// How often an idle debounce thread checks for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

type ChangeHandler = Box<dyn Fn() + Send + 'static>;

/// Handler slot shared with the debounce thread.
///
/// The lock is held for the whole invocation, which is what lets
/// [`DirectoryWatcher::detach`] act as a barrier.
type HandlerSlot = Arc<Mutex<Option<ChangeHandler>>>;

/// Watches a directory and reports debounced changes to a handler.
///
/// Dropping the watcher stops it.
pub struct DirectoryWatcher {
    path: PathBuf,
    handler: HandlerSlot,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    /// Dropping the `RecommendedWatcher` deregisters the OS watch; it is
    /// kept here only to stay alive until shutdown.
    watcher: Option<notify::RecommendedWatcher>,
}

impl DirectoryWatcher {
    /// Start watching `path` and return immediately.
    ///
    /// `handler` is called on the watcher's own thread, never concurrently
    /// with itself, once per burst of changes.
    ///
    /// # Errors
    ///
    /// Returns `LightboxError::WatchStart` if the OS watch cannot be set up
    /// (missing directory, permissions, exhausted watch descriptors) or the
    /// thread cannot be spawned.
    pub fn start<F>(path: &Path, debounce: Duration, handler: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let watch_error = |source: notify::Error| LightboxError::WatchStart {
            path: path.to_path_buf(),
            source,
        };

        let (bridge_tx, bridge_rx) = std::sync::mpsc::sync_channel::<()>(CHANNEL_CAPACITY);
        let mut watcher = notify::RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if is_relevant(&event.kind) {
                        signal(&bridge_tx);
                    }
                }
                Err(e) => {
                    tracing::warn!("filesystem watcher error: {e}");
                }
            },
            notify::Config::default(),
        )
        .map_err(watch_error)?;
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        let handler: ChangeHandler = Box::new(handler);
        let handler: HandlerSlot = Arc::new(Mutex::new(Some(handler)));
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread = {
            let handler = Arc::clone(&handler);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("lightbox-watcher".to_string())
                .spawn(move || run_debounce_loop(&bridge_rx, debounce, &handler, &shutdown))
                .map_err(|e| watch_error(notify::Error::io(e)))?
        };

        tracing::debug!("watching {}", path.display());
        Ok(DirectoryWatcher {
            path: path.to_path_buf(),
            handler,
            shutdown,
            thread: Some(thread),
            watcher: Some(watcher),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unregister the handler.
    ///
    /// When this returns, any invocation that was running has finished and
    /// no further invocation can start. Must not be called from inside the
    /// handler.
    pub fn detach(&self) {
        *self.handler.lock() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Stop watching and join the watcher thread.
    ///
    /// No handler invocation happens after this returns.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        // Dropping the notify watcher also drops the bridge sender, which
        // wakes the debounce thread with a disconnect.
        self.watcher.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("watcher thread for {} panicked", self.path.display());
            }
            tracing::debug!("stopped watching {}", self.path.display());
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Access events (opening or reading a file) do not change the folder and
/// are produced by our own metadata and preview loads.
fn is_relevant(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}

fn signal(tx: &SyncSender<()>) {
    match tx.try_send(()) {
        Ok(()) | Err(TrySendError::Full(())) => {}
        Err(TrySendError::Disconnected(())) => {
            tracing::trace!("debounce thread gone, dropping folder event");
        }
    }
}

/// Debounce loop run on the watcher thread.
///
/// Waits for a first event, then keeps absorbing events until none arrives
/// for `debounce`, then invokes the handler once. Returns on shutdown or
/// when the bridge disconnects, without invoking the handler for a pending
/// burst.
fn run_debounce_loop(
    rx: &Receiver<()>,
    debounce: Duration,
    handler: &Mutex<Option<ChangeHandler>>,
    shutdown: &AtomicBool,
) {
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }

        let mut coalesced = 1usize;
        loop {
            match rx.recv_timeout(debounce) {
                Ok(()) => coalesced += 1,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
            if shutdown.load(Ordering::Acquire) {
                return;
            }
        }

        if shutdown.load(Ordering::Acquire) {
            return;
        }
        tracing::debug!(coalesced, "folder change settled");
        invoke(handler);
    }
}

fn invoke(handler: &Mutex<Option<ChangeHandler>>) {
    let slot = handler.lock();
    if let Some(handler) = slot.as_ref() {
        handler();
    }
}
