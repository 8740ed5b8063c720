//! Document sets carrying a score per document.

use sift_types::{DocId, Score};

use super::merge;
use super::strict::ArrayGroup;
use crate::postings::{DeletionMap, PostingsIterator};

/// Sorted document IDs with a parallel array of scores.
///
/// `sqw` is the running sum of squared query weights of the terms that
/// produced the scores; [`ScoredGroup::normalize`] divides by its root.
#[derive(Debug, Clone, Default)]
pub struct ScoredGroup {
    pub(crate) docs: Vec<DocId>,
    pub(crate) scores: Vec<Score>,
    pub(crate) sqw: f32,
}

impl ScoredGroup {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from aligned IDs and scores.
    pub fn from_parts(docs: Vec<DocId>, scores: Vec<Score>) -> Self {
        debug_assert_eq!(docs.len(), scores.len());
        debug_assert!(docs.windows(2).all(|w| w[0] < w[1]));
        Self {
            docs,
            scores,
            sqw: 0.0,
        }
    }

    /// Gives every document of a strict set the same score.
    pub fn from_strict(group: ArrayGroup, score: Score) -> Self {
        let docs = group.into_docs();
        let scores = vec![score; docs.len()];
        Self {
            docs,
            scores,
            sqw: 0.0,
        }
    }

    /// Sets the sum of squared query weights.
    pub fn with_sqw(mut self, sqw: f32) -> Self {
        self.sqw = sqw;
        self
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

    /// Scores aligned with [`ScoredGroup::docs`].
    #[inline(always)]
    pub fn scores(&self) -> &[Score] {
        &self.scores
    }

    /// Sum of squared query weights.
    #[inline(always)]
    pub fn sqw(&self) -> f32 {
        self.sqw
    }

    /// Score of a document, if present.
    pub fn score_of(&self, doc: DocId) -> Option<Score> {
        self.docs.binary_search(&doc).ok().map(|i| self.scores[i])
    }

    /// Iterates `(doc, score)` pairs in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = (DocId, Score)> + '_ {
        self.docs.iter().copied().zip(self.scores.iter().copied())
    }

    /// Scales every score.
    pub fn mult(&mut self, factor: Score) {
        for s in &mut self.scores {
            *s *= factor;
        }
    }

    /// Divides every score by `sqrt(sqw)`. No-op when `sqw` is not positive.
    pub fn normalize(&mut self) {
        if self.sqw > 0.0 {
            let norm = self.sqw.sqrt();
            for s in &mut self.scores {
                *s /= norm;
            }
        }
    }

    /// Keeps only IDs present in `postings`, in place.
    pub fn destructive_intersect(&mut self, postings: &mut dyn PostingsIterator, seek_ratio: u32) {
        merge::retain_in_postings(&mut self.docs, Some(&mut self.scores), postings, seek_ratio);
    }

    /// Drops deleted documents.
    pub fn remove_deleted(&mut self, deleted: &DeletionMap) {
        if deleted.is_empty() {
            return;
        }
        self.retain_where(|d| !deleted.is_deleted(d));
    }

    /// Keeps only the given IDs (in any order).
    pub fn retain_ids(&mut self, ids: &[DocId]) {
        let mut filter = ids.to_vec();
        filter.sort_unstable();
        self.retain_where(|d| filter.binary_search(&d).is_ok());
    }

    /// Drops the scores.
    pub fn into_strict(self) -> ArrayGroup {
        ArrayGroup { docs: self.docs }
    }

    fn retain_where(&mut self, mut keep: impl FnMut(DocId) -> bool) {
        let mut write_idx = 0usize;
        for read_idx in 0..self.docs.len() {
            let doc = self.docs[read_idx];
            if keep(doc) {
                self.docs[write_idx] = doc;
                self.scores[write_idx] = self.scores[read_idx];
                write_idx += 1;
            }
        }
        self.docs.truncate(write_idx);
        self.scores.truncate(write_idx);
    }
}

impl PartialEq for ScoredGroup {
    fn eq(&self, other: &Self) -> bool {
        self.docs == other.docs && self.scores == other.scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::VecPostings;

    #[test]
    fn mult_and_normalize() {
        let mut g = ScoredGroup::from_parts(vec![1, 2], vec![3.0, 4.0]).with_sqw(4.0);
        g.mult(2.0);
        assert_eq!(g.scores(), &[6.0, 8.0]);
        g.normalize();
        assert_eq!(g.scores(), &[3.0, 4.0]);

        let mut zero = ScoredGroup::from_parts(vec![1], vec![2.0]);
        zero.normalize();
        assert_eq!(zero.scores(), &[2.0]);
    }

    #[test]
    fn equality_requires_scores() {
        let a = ScoredGroup::from_parts(vec![1, 2], vec![1.0, 2.0]);
        let b = ScoredGroup::from_parts(vec![1, 2], vec![1.0, 2.5]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone().with_sqw(9.0));
    }

    #[test]
    fn destructive_intersect_keeps_aligned_scores() {
        let mut g = ScoredGroup::from_parts(vec![1, 4, 6, 8], vec![0.1, 0.4, 0.6, 0.8]);
        g.destructive_intersect(&mut VecPostings::new(vec![4, 8, 10]), 10);
        assert_eq!(g.docs(), &[4, 8]);
        assert_eq!(g.scores(), &[0.4, 0.8]);
    }

    #[test]
    fn retain_and_delete() {
        let mut g = ScoredGroup::from_parts(vec![1, 2, 3], vec![1.0, 2.0, 3.0]);
        g.retain_ids(&[3, 1]);
        assert_eq!(g.iter().collect::<Vec<_>>(), vec![(1, 1.0), (3, 3.0)]);

        let mut deleted = DeletionMap::new();
        deleted.delete(1);
        g.remove_deleted(&deleted);
        assert_eq!(g.score_of(3), Some(3.0));
        assert_eq!(g.score_of(1), None);
    }

    #[test]
    fn from_strict_assigns_score() {
        let g = ScoredGroup::from_strict(ArrayGroup::from_sorted(vec![2, 7]), 0.5);
        assert_eq!(g.scores(), &[0.5, 0.5]);
        assert_eq!(g.into_strict().docs(), &[2, 7]);
    }
}
