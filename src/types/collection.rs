//! Identifier-keyed bookmark collection with a derived display order.
//!
//! Records live in a map keyed by id; a separate index orders them by
//! `created_at` descending (ties by id descending). Every mutation goes through
//! the map, so applying the same patch twice leaves the collection unchanged.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use super::bookmark::Bookmark;

type SortKey = (Reverse<DateTime<Utc>>, Reverse<String>);

fn sort_key(bookmark: &Bookmark) -> SortKey {
    (Reverse(bookmark.created_at), Reverse(bookmark.id.clone()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkCollection {
    records: HashMap<String, Bookmark>,
    order: BTreeSet<SortKey>,
}

impl BookmarkCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from fetched rows. A repeated id keeps the last row.
    pub fn from_records<I: IntoIterator<Item = Bookmark>>(records: I) -> Self {
        let mut collection = Self::new();
        for record in records {
            collection.upsert(record);
        }
        collection
    }

    /// Adds the record unless its id is already present. Returns whether it was added.
    pub fn insert_if_absent(&mut self, record: Bookmark) -> bool {
        if self.records.contains_key(&record.id) {
            return false;
        }
        self.order.insert(sort_key(&record));
        self.records.insert(record.id.clone(), record);
        true
    }

    /// Replaces the record with the same id. Returns false if no such record exists.
    pub fn replace_existing(&mut self, record: Bookmark) -> bool {
        if !self.records.contains_key(&record.id) {
            return false;
        }
        self.upsert(record);
        true
    }

    fn upsert(&mut self, record: Bookmark) {
        if let Some(previous) = self.records.remove(&record.id) {
            self.order.remove(&sort_key(&previous));
        }
        self.order.insert(sort_key(&record));
        self.records.insert(record.id.clone(), record);
    }

    pub fn remove(&mut self, id: &str) -> Option<Bookmark> {
        let removed = self.records.remove(id)?;
        self.order.remove(&sort_key(&removed));
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<&Bookmark> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
    }

    /// Records in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Bookmark> + '_ {
        self.order
            .iter()
            .filter_map(move |(_, Reverse(id))| self.records.get(id))
    }

    pub fn to_vec(&self) -> Vec<Bookmark> {
        self.iter().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.iter().map(|b| b.id.clone()).collect()
    }
}
