pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod record;
pub mod store;
pub mod tag;
pub mod types;

pub use config::Config;
pub use error::{LightboxError, Result};
pub use record::{Dimensions, FileAttributes, FileRecord, LoadState, Preview};
pub use store::{
    ChangeCause, Collection, CollectionChange, CollectionStore, DirectoryWatcher, ScanExecutor,
    ScanState, StoreEvent, StoreMessage, StoreStatus, WatchState,
};
pub use tag::{TagCatalog, TagGroup};
pub use types::{FileType, FileTypeFilter};
