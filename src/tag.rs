use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use unicase::UniCase;

use crate::record::FileRecord;

/// A tag label and the records carrying it, in display order.
#[derive(Debug)]
pub struct TagGroup {
    name: String,
    members: Vec<Arc<FileRecord>>,
}

impl TagGroup {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        TagGroup {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members sorted by file stem, case-insensitively.
    pub fn members(&self) -> &[Arc<FileRecord>] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.members.iter().any(|member| member.path() == path)
    }

    /// Insert in display order. Returns the insertion index.
    pub(crate) fn insert(&mut self, record: Arc<FileRecord>) -> usize {
        insert_sorted(&mut self.members, record)
    }

    pub(crate) fn remove(&mut self, path: &Path) -> Option<usize> {
        let index = self.members.iter().position(|member| member.path() == path)?;
        self.members.remove(index);
        Some(index)
    }

    pub(crate) fn clear(&mut self) {
        self.members.clear();
    }
}

impl fmt::Display for TagGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{Tag: {}}}", self.name)
    }
}

/// Display order for records: file stem, case-insensitive, then full path.
pub(crate) fn display_order(a: &FileRecord, b: &FileRecord) -> Ordering {
    UniCase::new(a.file_stem())
        .cmp(&UniCase::new(b.file_stem()))
        .then_with(|| a.path().cmp(b.path()))
}

/// Alphabetical tag order: case-insensitive, ties broken by exact comparison.
pub(crate) fn tag_order(a: &str, b: &str) -> Ordering {
    UniCase::new(a).cmp(&UniCase::new(b)).then_with(|| a.cmp(b))
}

/// Insert `record` after every member that sorts before or equal to it.
pub(crate) fn insert_sorted(list: &mut Vec<Arc<FileRecord>>, record: Arc<FileRecord>) -> usize {
    let index = list.partition_point(|member| display_order(member, &record) != Ordering::Greater);
    list.insert(index, record);
    index
}

/// Source of tag names for newly discovered files, keyed by file stem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagCatalog {
    by_stem: HashMap<String, Vec<String>>,
}

impl TagCatalog {
    pub fn new(entries: &BTreeMap<String, Vec<String>>) -> Self {
        TagCatalog {
            by_stem: entries
                .iter()
                .map(|(stem, tags)| (stem.clone(), tags.clone()))
                .collect(),
        }
    }

    /// Tag names assigned to the file at `path`; empty when none are known.
    pub fn tags_for(&self, path: &Path) -> Vec<String> {
        path.file_stem()
            .and_then(|stem| self.by_stem.get(stem.to_string_lossy().as_ref()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_stem.is_empty()
    }
}
