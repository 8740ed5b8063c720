//! Sorted postings iteration.
//!
//! The storage layer hands out postings through [`PostingsIterator`]: a
//! forward-only cursor over ascending document IDs carrying a frequency, a
//! precomputed weight and, when the backend stores them, word positions.

use bitvec::vec::BitVec;
use sift_types::{DocId, Score};

/// ID reported by an exhausted iterator.
pub const TERMINATED: DocId = DocId::MAX;

/// Forward-only cursor over a postings list.
///
/// A fresh iterator sits before its first posting and reports ID 0 (never a
/// valid document). Once exhausted it reports [`TERMINATED`].
pub trait PostingsIterator {
    /// Moves to the next posting. Returns `false` when exhausted.
    fn next(&mut self) -> bool;

    /// Document ID of the current posting.
    fn id(&self) -> DocId;

    /// Number of occurrences in the current document.
    fn freq(&self) -> u32;

    /// Stored weight of the current posting.
    fn weight(&self) -> Score {
        self.freq() as Score
    }

    /// Seeks forward to the first posting with ID `>= target`.
    ///
    /// Returns `true` if that posting is exactly `target`. Targets must be
    /// non-decreasing across calls.
    fn find_id(&mut self, target: DocId) -> bool {
        let mut doc = self.id();
        while doc < target {
            if !self.next() {
                return false;
            }
            doc = self.id();
        }
        doc == target
    }

    /// Total number of postings in the list.
    fn len(&self) -> usize;

    /// Returns `true` if the list has no postings.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the word positions of the current posting into `out`.
    ///
    /// Returns `false` if the backend does not store positions.
    fn positions(&mut self, out: &mut Vec<u32>) -> bool {
        out.clear();
        false
    }
}

/// Postings list backed by plain vectors.
///
/// Used wherever postings are already materialized in memory, and by tests.
#[derive(Debug, Clone, Default)]
pub struct VecPostings {
    docs: Vec<DocId>,
    freqs: Vec<u32>,
    weights: Option<Vec<Score>>,
    positions: Option<Vec<Vec<u32>>>,
    cursor: Option<usize>,
}

impl VecPostings {
    /// Creates postings with frequency 1 for every document.
    pub fn new(docs: Vec<DocId>) -> Self {
        debug_assert!(docs.windows(2).all(|w| w[0] < w[1]), "docs must be strictly sorted");
        let freqs = vec![1; docs.len()];
        Self {
            docs,
            freqs,
            weights: None,
            positions: None,
            cursor: None,
        }
    }

    /// Creates postings from `(doc, positions)` pairs; frequency is the
    /// number of positions.
    pub fn with_positions(entries: Vec<(DocId, Vec<u32>)>) -> Self {
        let docs: Vec<DocId> = entries.iter().map(|(d, _)| *d).collect();
        let mut postings = Self::new(docs);
        postings.freqs = entries.iter().map(|(_, p)| p.len() as u32).collect();
        postings.positions = Some(entries.into_iter().map(|(_, p)| p).collect());
        postings
    }

    /// Sets per-document frequencies.
    pub fn freqs(mut self, freqs: Vec<u32>) -> Self {
        debug_assert_eq!(freqs.len(), self.docs.len());
        self.freqs = freqs;
        self
    }

    /// Sets per-document stored weights.
    pub fn weights(mut self, weights: Vec<Score>) -> Self {
        debug_assert_eq!(weights.len(), self.docs.len());
        self.weights = Some(weights);
        self
    }

    #[inline(always)]
    fn current(&self) -> Option<usize> {
        self.cursor.filter(|&c| c < self.docs.len())
    }
}

impl PostingsIterator for VecPostings {
    fn next(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c + 1).min(self.docs.len());
        self.cursor = Some(next);
        next < self.docs.len()
    }

    fn id(&self) -> DocId {
        match self.cursor {
            None => 0,
            Some(c) => self.docs.get(c).copied().unwrap_or(TERMINATED),
        }
    }

    fn freq(&self) -> u32 {
        self.current().map_or(0, |c| self.freqs[c])
    }

    fn weight(&self) -> Score {
        match (self.current(), &self.weights) {
            (Some(c), Some(w)) => w[c],
            (Some(c), None) => self.freqs[c] as Score,
            (None, _) => 0.0,
        }
    }

    fn find_id(&mut self, target: DocId) -> bool {
        let start = self.cursor.unwrap_or(0);
        if self.cursor.is_some() && self.id() >= target {
            return self.id() == target;
        }
        let skip = self.docs[start.min(self.docs.len())..].partition_point(|&d| d < target);
        self.cursor = Some(start + skip);
        self.id() == target
    }

    fn len(&self) -> usize {
        self.docs.len()
    }

    fn positions(&mut self, out: &mut Vec<u32>) -> bool {
        out.clear();
        match (self.current(), &self.positions) {
            (Some(c), Some(p)) => {
                out.extend_from_slice(&p[c]);
                true
            }
            _ => false,
        }
    }
}

/// Bitmap of deleted documents in a partition.
#[derive(Debug, Clone, Default)]
pub struct DeletionMap {
    bits: BitVec,
    count: usize,
}

impl DeletionMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a document deleted.
    pub fn delete(&mut self, doc: DocId) {
        let idx = doc as usize;
        if idx >= self.bits.len() {
            self.bits.resize(idx + 1, false);
        }
        if !self.bits[idx] {
            self.bits.set(idx, true);
            self.count += 1;
        }
    }

    /// Returns `true` if the document is deleted.
    #[inline(always)]
    pub fn is_deleted(&self, doc: DocId) -> bool {
        self.bits.get(doc as usize).map_or(false, |b| *b)
    }

    /// Number of deleted documents.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if nothing is deleted.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterates deleted IDs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.bits.iter_ones().map(|i| i as DocId)
    }
}
