//! Boolean document sets.

use sift_types::DocId;

use super::merge;
use crate::postings::{DeletionMap, PostingsIterator};

/// Sorted, duplicate-free set of document IDs with boolean membership.
///
/// Equality compares the logical contents only; spare capacity in the
/// backing vector never matters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayGroup {
    pub(crate) docs: Vec<DocId>,
}

impl ArrayGroup {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty set with room for `cap` IDs.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            docs: Vec::with_capacity(cap),
        }
    }

    /// Wraps IDs that are already strictly ascending.
    pub fn from_sorted(docs: Vec<DocId>) -> Self {
        debug_assert!(
            docs.windows(2).all(|w| w[0] < w[1]),
            "document IDs must be strictly ascending"
        );
        Self { docs }
    }

    /// Wraps the first `size` IDs of a larger buffer.
    pub fn from_raw(mut docs: Vec<DocId>, size: usize) -> Self {
        docs.truncate(size);
        Self::from_sorted(docs)
    }

    /// Sorts and dedups arbitrary IDs.
    pub fn from_unsorted(mut docs: Vec<DocId>) -> Self {
        docs.sort_unstable();
        docs.dedup();
        Self { docs }
    }

    /// Number of documents.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Returns `true` if the set is empty.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// The IDs, ascending.
    #[inline(always)]
    pub fn docs(&self) -> &[DocId] {
        &self.docs
    }

    /// Membership test by binary search.
    #[inline]
    pub fn contains(&self, doc: DocId) -> bool {
        self.docs.binary_search(&doc).is_ok()
    }

    /// Appends an ID larger than every ID already present.
    #[inline]
    pub fn push(&mut self, doc: DocId) {
        debug_assert!(self.docs.last().map_or(true, |&last| last < doc));
        self.docs.push(doc);
    }

    /// Iterates the IDs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.docs.iter().copied()
    }

    /// Keeps only IDs present in `postings`, in place.
    pub fn destructive_intersect(&mut self, postings: &mut dyn PostingsIterator, seek_ratio: u32) {
        merge::retain_in_postings(&mut self.docs, None, postings, seek_ratio);
    }

    /// Drops deleted documents.
    pub fn remove_deleted(&mut self, deleted: &DeletionMap) {
        if deleted.is_empty() {
            return;
        }
        self.docs.retain(|&d| !deleted.is_deleted(d));
    }

    /// Keeps only the given IDs (in any order).
    pub fn retain_ids(&mut self, ids: &[DocId]) {
        let mut filter = ids.to_vec();
        filter.sort_unstable();
        self.docs.retain(|d| filter.binary_search(d).is_ok());
    }

    pub(crate) fn into_docs(self) -> Vec<DocId> {
        self.docs
    }
}

impl FromIterator<DocId> for ArrayGroup {
    fn from_iter<I: IntoIterator<Item = DocId>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}
