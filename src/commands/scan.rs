use std::path::Path;

use super::{FormatOptions, load_folder_config, print_collection};
use crate::error::{LightboxError, Result};
use crate::store::{CollectionStore, ScanState};

/// Scan a folder once and print its images grouped by tag
pub async fn cmd_scan(dir: &Path, show_dimensions: bool) -> Result<()> {
    let config = load_folder_config(dir)?;
    let mut store = CollectionStore::open_unwatched(dir, config)?;
    store.run_until(|s| !s.status().scan.is_scanning()).await;

    if let ScanState::Failed { reason, .. } = &store.status().scan {
        return Err(LightboxError::Io(std::io::Error::other(reason.clone())));
    }

    if show_dimensions {
        let paths: Vec<_> = store
            .files()
            .iter()
            .map(|record| record.path().to_path_buf())
            .collect();
        for path in &paths {
            store.request_metadata(path)?;
        }
        let mut pending = paths.len();
        while pending > 0 && store.process_next().await {
            pending -= 1;
        }
    }

    print_collection(
        &store,
        &FormatOptions {
            show_dimensions,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serial_test::serial;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    #[serial]
    async fn test_cmd_scan_rejects_missing_folder() {
        let tmp = TempDir::new().unwrap();
        let result = cmd_scan(&tmp.path().join("missing"), false).await;
        assert!(matches!(result, Err(LightboxError::NotADirectory(_))));
    }

    #[tokio::test]
    #[serial]
    async fn test_cmd_scan_lists_folder() {
        let tmp = TempDir::new().unwrap();
        image::RgbImage::new(4, 3)
            .save(tmp.path().join("tiny.png"))
            .unwrap();
        fs::write(tmp.path().join("notes.txt"), b"text").unwrap();

        cmd_scan(tmp.path(), true).await.unwrap();
    }
}
