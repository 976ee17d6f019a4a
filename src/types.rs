use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use image::ImageFormat;

/// Extensions recognized as images when no configuration overrides them.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &[
    "bmp", "gif", "heic", "heif", "ico", "jpeg", "jpg", "png", "tif", "tiff", "webp",
];

/// Classifier for a tracked file, derived from its extension.
///
/// The extension is stored lowercased and without the leading dot. Files
/// without an extension classify as the empty type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileType(String);

impl FileType {
    /// Classify a path by its extension.
    pub fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        FileType(ext)
    }

    /// The normalized extension this type was derived from.
    pub fn extension(&self) -> &str {
        &self.0
    }

    /// MIME type for recognized image formats.
    pub fn mime_type(&self) -> &'static str {
        match ImageFormat::from_extension(&self.0) {
            Some(format) => format.to_mime_type(),
            None => match self.0.as_str() {
                "heic" | "heif" => "image/heif",
                _ => "application/octet-stream",
            },
        }
    }

    /// Human readable description, e.g. "PNG image".
    pub fn description(&self) -> String {
        match self.0.as_str() {
            "" => "Document".to_string(),
            "jpg" | "jpeg" => "JPEG image".to_string(),
            "tif" | "tiff" => "TIFF image".to_string(),
            "heic" | "heif" => "HEIF image".to_string(),
            other if ImageFormat::from_extension(other).is_some() => {
                format!("{} image", other.to_ascii_uppercase())
            }
            other => format!("{} file", other.to_ascii_uppercase()),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Predicate deciding which directory entries are image files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeFilter {
    extensions: BTreeSet<String>,
}

impl FileTypeFilter {
    /// Build a filter from extensions. Leading dots and case are ignored.
    pub fn from_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        FileTypeFilter { extensions }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        self.accepts_type(&FileType::of(path))
    }

    pub fn accepts_type(&self, file_type: &FileType) -> bool {
        self.extensions.contains(file_type.extension())
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl Default for FileTypeFilter {
    fn default() -> Self {
        Self::from_extensions(DEFAULT_IMAGE_EXTENSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_is_lowercased() {
        let file_type = FileType::of(Path::new("/photos/Beach.JPG"));
        assert_eq!(file_type.extension(), "jpg");
        assert_eq!(file_type.mime_type(), "image/jpeg");
        assert_eq!(file_type.description(), "JPEG image");
    }

    #[test]
    fn test_file_type_without_extension() {
        let file_type = FileType::of(Path::new("/photos/README"));
        assert_eq!(file_type.extension(), "");
        assert_eq!(file_type.mime_type(), "application/octet-stream");
        assert_eq!(file_type.description(), "Document");
    }

    #[test]
    fn test_png_description() {
        let file_type = FileType::of(Path::new("a.png"));
        assert_eq!(file_type.description(), "PNG image");
        assert_eq!(file_type.mime_type(), "image/png");
    }

    #[test]
    fn test_default_filter_accepts_common_images() {
        let filter = FileTypeFilter::default();
        assert!(filter.accepts(Path::new("/x/a.png")));
        assert!(filter.accepts(Path::new("/x/b.JPEG")));
        assert!(filter.accepts(Path::new("/x/c.webp")));
        assert!(!filter.accepts(Path::new("/x/notes.txt")));
        assert!(!filter.accepts(Path::new("/x/.lightbox.yaml")));
        assert!(!filter.accepts(Path::new("/x/noext")));
    }

    #[test]
    fn test_filter_normalizes_extensions() {
        let filter = FileTypeFilter::from_extensions([".PNG", " gif ", ""]);
        assert_eq!(filter.extensions().collect::<Vec<_>>(), vec!["gif", "png"]);
        assert!(filter.accepts(Path::new("a.png")));
        assert!(!filter.accepts(Path::new("a.jpg")));
    }
}
