use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LightboxError {
    #[error("cannot watch {}: {source}", .path.display())]
    WatchStart {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("cannot read folder {}: {source}", .path.display())]
    ScanEnumeration {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read image metadata for {}: {source}", .path.display())]
    MetadataLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("cannot build preview for {}: {source}", .path.display())]
    PreviewLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("'{}' is already in the collection", .0.display())]
    DuplicateRecord(PathBuf),

    #[error("'{}' is not in the collection", .0.display())]
    NotTracked(PathBuf),

    #[error("index {index} is out of range for a collection of {len} files")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("'{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("a tokio runtime is required to open a collection store")]
    NoRuntime,

    #[error("collection invariant violated: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),
}

pub type Result<T> = std::result::Result<T, LightboxError>;
