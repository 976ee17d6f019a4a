//! The in-memory collection model.
//!
//! `Collection` holds the ordered file list and the three indexes derived
//! from it (path lookup, tag groups, untagged list). It performs no I/O and
//! is owned by a single writer; every mutation returns the
//! [`CollectionChange`] it produced.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{LightboxError, Result};
use crate::record::FileRecord;
use crate::store::events::{ChangeCause, CollectionChange, IndexedPath, MovedPath};
use crate::store::scan::ScanSnapshot;
use crate::tag::{TagCatalog, TagGroup, display_order, insert_sorted, tag_order};

#[derive(Debug, Default)]
pub struct Collection {
    files: Vec<Arc<FileRecord>>,
    by_path: HashMap<PathBuf, Arc<FileRecord>>,
    /// Tag names in alphabetical order.
    tag_order: Vec<String>,
    /// Boxed so that `&TagGroup` handed out stays at the same address while
    /// the map grows.
    tags: HashMap<String, Box<TagGroup>>,
    untagged: Vec<Arc<FileRecord>>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in display order.
    pub fn files(&self) -> &[Arc<FileRecord>] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&Arc<FileRecord>> {
        self.by_path.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn position(&self, path: &Path) -> Option<usize> {
        self.files.iter().position(|record| record.path() == path)
    }

    /// Records without tags, sorted by file stem.
    pub fn untagged(&self) -> &[Arc<FileRecord>] {
        &self.untagged
    }

    /// Tag groups in alphabetical order.
    pub fn tags(&self) -> impl Iterator<Item = &TagGroup> + '_ {
        self.tag_order
            .iter()
            .filter_map(|name| self.tags.get(name).map(|tag| &**tag))
    }

    pub fn tag_names(&self) -> &[String] {
        &self.tag_order
    }

    pub fn tag(&self, name: &str) -> Option<&TagGroup> {
        self.tags.get(name).map(|tag| &**tag)
    }

    /// Return the tag group named `name`, creating it if needed.
    ///
    /// The flag is true when the group was created by this call.
    pub fn add_tag(&mut self, name: &str) -> (&TagGroup, bool) {
        let (tag, created) = self.ensure_tag(name);
        (&*tag, created)
    }

    /// Append a record at the end of the list.
    pub fn push(&mut self, record: Arc<FileRecord>) -> Result<CollectionChange> {
        let len = self.files.len();
        self.insert(record, len)
    }

    /// Insert a record at `index` (which may equal the length).
    pub fn insert(&mut self, record: Arc<FileRecord>, index: usize) -> Result<CollectionChange> {
        if index > self.files.len() {
            return Err(LightboxError::IndexOutOfRange {
                index,
                len: self.files.len(),
            });
        }
        if self.by_path.contains_key(record.path()) {
            return Err(LightboxError::DuplicateRecord(record.path().to_path_buf()));
        }

        let mut change = CollectionChange::new(ChangeCause::Edit);
        self.index_record(&record, &mut change);
        change.inserted.push(IndexedPath {
            index,
            path: record.path().to_path_buf(),
        });
        self.files.insert(index, record);

        self.assert_consistent();
        Ok(change)
    }

    /// Remove the record for `path`, if tracked.
    pub fn remove(&mut self, path: &Path) -> Option<(Arc<FileRecord>, CollectionChange)> {
        let index = self.position(path)?;
        self.remove_at(index).ok()
    }

    pub fn remove_at(&mut self, index: usize) -> Result<(Arc<FileRecord>, CollectionChange)> {
        if index >= self.files.len() {
            return Err(LightboxError::IndexOutOfRange {
                index,
                len: self.files.len(),
            });
        }

        let record = self.files.remove(index);
        self.unindex_record(&record);
        let mut change = CollectionChange::new(ChangeCause::Edit);
        change.removed.push(IndexedPath {
            index,
            path: record.path().to_path_buf(),
        });

        self.assert_consistent();
        Ok((record, change))
    }

    /// Move the record at `from` so that it ends up at index `to`.
    ///
    /// Tag groups and the untagged list keep their own ordering and are not
    /// affected. Moving a record onto itself produces an empty change.
    pub fn move_record(&mut self, from: usize, to: usize) -> Result<CollectionChange> {
        let len = self.files.len();
        for index in [from, to] {
            if index >= len {
                return Err(LightboxError::IndexOutOfRange { index, len });
            }
        }

        let mut change = CollectionChange::new(ChangeCause::Edit);
        if from == to {
            return Ok(change);
        }
        let record = self.files.remove(from);
        change.moved.push(MovedPath {
            from,
            to,
            path: record.path().to_path_buf(),
        });
        self.files.insert(to, record);

        self.assert_consistent();
        Ok(change)
    }

    /// Remove every record. Tag groups survive, emptied.
    pub fn clear(&mut self) -> CollectionChange {
        let mut change = CollectionChange::new(ChangeCause::Edit);
        change.removed = self
            .files
            .iter()
            .enumerate()
            .map(|(index, record)| IndexedPath {
                index,
                path: record.path().to_path_buf(),
            })
            .collect();

        self.files.clear();
        self.by_path.clear();
        self.untagged.clear();
        for tag in self.tags.values_mut() {
            tag.clear();
        }

        self.assert_consistent();
        change
    }

    /// Merge a scan snapshot into the model.
    ///
    /// Records whose path is missing from the snapshot are evicted first;
    /// then new paths get fresh records appended in snapshot order, with tag
    /// names from `catalog`. Records present in both keep their identity and
    /// any loaded metadata, unless the snapshot shows a newer modification
    /// time, in which case they are refreshed in place.
    ///
    /// Reconciling the same snapshot twice yields an empty change the second
    /// time.
    pub fn reconcile(&mut self, snapshot: &ScanSnapshot, catalog: &TagCatalog) -> CollectionChange {
        let mut change = CollectionChange::new(ChangeCause::Scan);
        let present: HashSet<&Path> = snapshot
            .entries()
            .iter()
            .map(|entry| entry.path.as_path())
            .collect();

        let evicted: Vec<(usize, Arc<FileRecord>)> = self
            .files
            .iter()
            .enumerate()
            .filter(|(_, record)| !present.contains(record.path()))
            .map(|(index, record)| (index, Arc::clone(record)))
            .collect();
        if !evicted.is_empty() {
            self.files.retain(|record| present.contains(record.path()));
            for (index, record) in evicted {
                self.unindex_record(&record);
                change.removed.push(IndexedPath {
                    index,
                    path: record.path().to_path_buf(),
                });
            }
        }

        for entry in snapshot.entries() {
            if let Some(existing) = self.by_path.get(&entry.path) {
                if existing.refresh(&entry.attributes) {
                    change.refreshed.push(entry.path.clone());
                }
                continue;
            }

            let record = Arc::new(FileRecord::new(
                entry.path.clone(),
                entry.attributes.clone(),
                catalog.tags_for(&entry.path),
            ));
            self.index_record(&record, &mut change);
            change.inserted.push(IndexedPath {
                index: self.files.len(),
                path: entry.path.clone(),
            });
            self.files.push(record);
        }

        self.assert_consistent();
        change
    }

    /// Check every structural invariant of the model.
    ///
    /// - the path index holds exactly the records of the file list
    /// - the untagged list holds exactly the records without tags, sorted
    /// - tag names are sorted and match the tag index
    /// - tag membership and record tag names agree in both directions
    pub fn verify_invariants(&self) -> Result<()> {
        let violation = |message: String| Err(LightboxError::InvariantViolation(message));

        if self.files.len() != self.by_path.len() {
            return violation(format!(
                "file list has {} records but path index has {}",
                self.files.len(),
                self.by_path.len()
            ));
        }
        for record in &self.files {
            match self.by_path.get(record.path()) {
                Some(indexed) if Arc::ptr_eq(indexed, record) => {}
                _ => {
                    return violation(format!(
                        "{} is listed but not indexed",
                        record.path().display()
                    ));
                }
            }
        }

        let expected_untagged = self.files.iter().filter(|r| r.is_untagged()).count();
        if expected_untagged != self.untagged.len() {
            return violation(format!(
                "{expected_untagged} untagged records but untagged list has {}",
                self.untagged.len()
            ));
        }
        for record in &self.untagged {
            if !record.is_untagged() || !self.tracks(record) {
                return violation(format!(
                    "{} does not belong in the untagged list",
                    record.path().display()
                ));
            }
        }
        if !is_display_sorted(&self.untagged) {
            return violation("untagged list is out of order".to_string());
        }

        if self.tag_order.len() != self.tags.len()
            || self.tag_order.iter().any(|name| !self.tags.contains_key(name))
        {
            return violation("tag list and tag index disagree".to_string());
        }
        if self
            .tag_order
            .windows(2)
            .any(|pair| tag_order(&pair[0], &pair[1]) != Ordering::Less)
        {
            return violation("tag list is not alphabetical".to_string());
        }

        let mut memberships: HashMap<&str, HashSet<*const FileRecord>> = HashMap::new();
        for (name, tag) in &self.tags {
            if tag.name() != name.as_str() {
                return violation(format!("tag '{}' indexed under '{name}'", tag.name()));
            }
            if !is_display_sorted(tag.members()) {
                return violation(format!("members of tag '{name}' are out of order"));
            }
            let mut members = HashSet::new();
            for member in tag.members() {
                if !member.has_tag(name) || !self.tracks(member) {
                    return violation(format!(
                        "tag '{name}' contains {} which does not carry it",
                        member.path().display()
                    ));
                }
                if !members.insert(Arc::as_ptr(member)) {
                    return violation(format!(
                        "tag '{name}' lists {} twice",
                        member.path().display()
                    ));
                }
            }
            memberships.insert(name.as_str(), members);
        }
        for record in &self.files {
            for name in record.tag_names() {
                let listed = memberships
                    .get(name.as_str())
                    .is_some_and(|members| members.contains(&Arc::as_ptr(record)));
                if !listed {
                    return violation(format!(
                        "{} carries tag '{name}' but is not a member",
                        record.path().display()
                    ));
                }
            }
        }

        Ok(())
    }

    fn tracks(&self, record: &Arc<FileRecord>) -> bool {
        self.by_path
            .get(record.path())
            .is_some_and(|indexed| Arc::ptr_eq(indexed, record))
    }

    fn ensure_tag(&mut self, name: &str) -> (&mut TagGroup, bool) {
        let created = !self.tags.contains_key(name);
        if created {
            let index = self
                .tag_order
                .partition_point(|existing| tag_order(existing, name) == Ordering::Less);
            self.tag_order.insert(index, name.to_string());
        }
        let tag = self
            .tags
            .entry(name.to_string())
            .or_insert_with(|| Box::new(TagGroup::new(name)));
        (tag.as_mut(), created)
    }

    /// Add `record` to the path index and to its tag groups or the untagged
    /// list. Does not touch the file list.
    fn index_record(&mut self, record: &Arc<FileRecord>, change: &mut CollectionChange) {
        if record.is_untagged() {
            insert_sorted(&mut self.untagged, Arc::clone(record));
        } else {
            for name in record.tag_names() {
                let (tag, created) = self.ensure_tag(name);
                tag.insert(Arc::clone(record));
                if created {
                    change.tags_created.push(name.clone());
                }
            }
        }
        self.by_path
            .insert(record.path().to_path_buf(), Arc::clone(record));
    }

    fn unindex_record(&mut self, record: &FileRecord) {
        self.by_path.remove(record.path());
        if record.is_untagged() {
            if let Some(index) = self.untagged.iter().position(|r| r.path() == record.path()) {
                self.untagged.remove(index);
            }
        }
        for name in record.tag_names() {
            if let Some(tag) = self.tags.get_mut(name.as_str()) {
                tag.remove(record.path());
            }
        }
    }

    fn assert_consistent(&self) {
        if cfg!(debug_assertions)
            && let Err(e) = self.verify_invariants()
        {
            panic!("{e}");
        }
    }
}

fn is_display_sorted(records: &[Arc<FileRecord>]) -> bool {
    records
        .windows(2)
        .all(|pair| display_order(&pair[0], &pair[1]) != Ordering::Greater)
}
