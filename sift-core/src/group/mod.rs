//! Document sets produced and combined by query evaluation.
//!
//! A [`DocGroup`] is one of three representations over the same storage, a
//! strictly ascending array of document IDs:
//!
//! - **Strict**: boolean membership
//! - **Scored**: a score per document plus the running `sqw` used for
//!   normalization
//! - **Negative**: every document of the partition *except* the stored ones
//!
//! Combination functions match exhaustively on both variants and run a single
//! merge walk, so every union or intersection is O(n + m).

mod merge;
mod scored;
mod strict;

pub(crate) use merge::for_each_match;
pub use scored::ScoredGroup;
pub use strict::ArrayGroup;

use sift_types::{DocId, Score};

use crate::postings::{DeletionMap, PostingsIterator};
use merge::Side;

/// A set of documents in one partition.
///
/// Equality holds only between groups of the same variant with identical
/// IDs (and identical scores for scored groups).
#[derive(Debug, Clone, PartialEq)]
pub enum DocGroup {
    /// Boolean membership.
    Strict(ArrayGroup),
    /// Membership with a score per document.
    Scored(ScoredGroup),
    /// All documents except the stored ones.
    Negative(ArrayGroup),
}

impl Default for DocGroup {
    fn default() -> Self {
        DocGroup::Strict(ArrayGroup::new())
    }
}

impl From<ArrayGroup> for DocGroup {
    fn from(group: ArrayGroup) -> Self {
        DocGroup::Strict(group)
    }
}

impl From<ScoredGroup> for DocGroup {
    fn from(group: ScoredGroup) -> Self {
        DocGroup::Scored(group)
    }
}

impl DocGroup {
    /// The group matching every document.
    pub fn all() -> Self {
        DocGroup::Negative(ArrayGroup::new())
    }

    /// Stored IDs. For a negative group these are the excluded documents.
    #[inline]
    pub fn docs(&self) -> &[DocId] {
        match self {
            DocGroup::Strict(g) | DocGroup::Negative(g) => g.docs(),
            DocGroup::Scored(g) => g.docs(),
        }
    }

    /// Scores aligned with [`DocGroup::docs`], for scored groups.
    #[inline]
    pub fn scores(&self) -> Option<&[Score]> {
        match self {
            DocGroup::Scored(g) => Some(g.scores()),
            _ => None,
        }
    }

    /// Number of stored IDs.
    #[inline]
    pub fn len(&self) -> usize {
        self.docs().len()
    }

    /// Returns `true` for a positive group with no documents.
    ///
    /// A negative group is never empty: it matches everything it does not
    /// store.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.is_negative() && self.len() == 0
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        matches!(self, DocGroup::Negative(_))
    }

    #[inline]
    pub fn is_scored(&self) -> bool {
        matches!(self, DocGroup::Scored(_))
    }

    /// Sum of squared query weights; 0 for unscored groups.
    pub fn sqw(&self) -> f32 {
        match self {
            DocGroup::Scored(g) => g.sqw(),
            _ => 0.0,
        }
    }

    /// Membership test.
    pub fn contains(&self, doc: DocId) -> bool {
        let stored = self.docs().binary_search(&doc).is_ok();
        stored != self.is_negative()
    }

    /// Score of a member. Strict members score 0.
    pub fn score_of(&self, doc: DocId) -> Option<Score> {
        match self {
            DocGroup::Scored(g) => g.score_of(doc),
            _ => self.contains(doc).then_some(0.0),
        }
    }

    /// Iterates stored `(doc, score)` pairs; unscored entries report 0.
    ///
    /// For a negative group these are the excluded documents.
    pub fn iter(&self) -> impl Iterator<Item = (DocId, Score)> + '_ {
        let scores = self.scores();
        self.docs()
            .iter()
            .enumerate()
            .map(move |(i, &d)| (d, scores.map_or(0.0, |s| s[i])))
    }

    /// Set complement.
    pub fn negate(self) -> DocGroup {
        match self {
            DocGroup::Strict(g) => DocGroup::Negative(g),
            DocGroup::Scored(g) => DocGroup::Negative(g.into_strict()),
            DocGroup::Negative(g) => DocGroup::Strict(g),
        }
    }

    /// Reinterprets the stored IDs as a strict group, dropping scores.
    ///
    /// On a negative group this yields the excluded documents.
    pub fn into_strict(self) -> DocGroup {
        match self {
            DocGroup::Strict(g) | DocGroup::Negative(g) => DocGroup::Strict(g),
            DocGroup::Scored(g) => DocGroup::Strict(g.into_strict()),
        }
    }

    /// Converts a positive group to a scored one; strict members score 0.
    /// Negative groups are returned unchanged.
    pub fn into_scored(self) -> DocGroup {
        match self {
            DocGroup::Strict(g) => DocGroup::Scored(ScoredGroup::from_strict(g, 0.0)),
            other => other,
        }
    }

    /// Scales scores. No-op on unscored groups.
    pub fn mult(&mut self, factor: Score) {
        if let DocGroup::Scored(g) = self {
            g.mult(factor);
        }
    }

    /// Divides scores by `sqrt(sqw)`. No-op on unscored groups.
    pub fn normalize(&mut self) {
        if let DocGroup::Scored(g) = self {
            g.normalize();
        }
    }

    /// Set intersection.
    ///
    /// Scored sides add their scores and `sqw`; intersecting with a negative
    /// group keeps the other side's variant and scores.
    pub fn intersect(&self, other: &DocGroup) -> DocGroup {
        use DocGroup::*;
        match (self, other) {
            (Strict(a), Strict(b)) => {
                let mut out = Vec::new();
                merge::intersect(a.docs(), b.docs(), &mut out);
                Strict(ArrayGroup::from_sorted(out))
            }
            (Strict(a), Scored(b)) | (Scored(b), Strict(a)) => {
                let (mut docs, mut scores) = (Vec::new(), Vec::new());
                merge::intersect_scored(
                    Side::scored(b.docs(), b.scores()),
                    Side::strict(a.docs()),
                    &mut docs,
                    &mut scores,
                );
                Scored(ScoredGroup::from_parts(docs, scores).with_sqw(b.sqw()))
            }
            (Scored(a), Scored(b)) => {
                let (mut docs, mut scores) = (Vec::new(), Vec::new());
                merge::intersect_scored(
                    Side::scored(a.docs(), a.scores()),
                    Side::scored(b.docs(), b.scores()),
                    &mut docs,
                    &mut scores,
                );
                Scored(ScoredGroup::from_parts(docs, scores).with_sqw(a.sqw() + b.sqw()))
            }
            (Strict(a), Negative(b)) | (Negative(b), Strict(a)) => {
                let mut out = Vec::new();
                merge::difference(a.docs(), b.docs(), &mut out);
                Strict(ArrayGroup::from_sorted(out))
            }
            (Scored(a), Negative(b)) | (Negative(b), Scored(a)) => {
                let (mut docs, mut scores) = (Vec::new(), Vec::new());
                merge::difference_scored(a.docs(), a.scores(), b.docs(), &mut docs, &mut scores);
                Scored(ScoredGroup::from_parts(docs, scores).with_sqw(a.sqw()))
            }
            (Negative(a), Negative(b)) => {
                let mut out = Vec::new();
                merge::union(a.docs(), b.docs(), &mut out);
                Negative(ArrayGroup::from_sorted(out))
            }
        }
    }

    /// Set union.
    ///
    /// Scored absorbs strict (strict-only members score 0). A negative side
    /// turns the result negative: `A ∪ ¬B = ¬(B \ A)`, dropping scores.
    pub fn union(&self, other: &DocGroup) -> DocGroup {
        use DocGroup::*;
        match (self, other) {
            (Strict(a), Strict(b)) => {
                let mut out = Vec::new();
                merge::union(a.docs(), b.docs(), &mut out);
                Strict(ArrayGroup::from_sorted(out))
            }
            (Strict(a), Scored(b)) | (Scored(b), Strict(a)) => {
                let (mut docs, mut scores) = (Vec::new(), Vec::new());
                merge::union_scored(
                    Side::scored(b.docs(), b.scores()),
                    Side::strict(a.docs()),
                    &mut docs,
                    &mut scores,
                );
                Scored(ScoredGroup::from_parts(docs, scores).with_sqw(b.sqw()))
            }
            (Scored(a), Scored(b)) => {
                let (mut docs, mut scores) = (Vec::new(), Vec::new());
                merge::union_scored(
                    Side::scored(a.docs(), a.scores()),
                    Side::scored(b.docs(), b.scores()),
                    &mut docs,
                    &mut scores,
                );
                Scored(ScoredGroup::from_parts(docs, scores).with_sqw(a.sqw() + b.sqw()))
            }
            (Strict(_) | Scored(_), Negative(b)) | (Negative(b), Strict(_) | Scored(_)) => {
                let positive = if self.is_negative() { other } else { self };
                let mut out = Vec::new();
                merge::difference(b.docs(), positive.docs(), &mut out);
                Negative(ArrayGroup::from_sorted(out))
            }
            (Negative(a), Negative(b)) => {
                let mut out = Vec::new();
                merge::intersect(a.docs(), b.docs(), &mut out);
                Negative(ArrayGroup::from_sorted(out))
            }
        }
    }

    /// Intersects in place with a postings list.
    ///
    /// A negative group becomes the strict group of postings it does not
    /// exclude. It always walks the whole list: a complement has no size to
    /// weigh against `seek_ratio`.
    pub fn destructive_intersect(&mut self, postings: &mut dyn PostingsIterator, seek_ratio: u32) {
        match self {
            DocGroup::Strict(g) => g.destructive_intersect(postings, seek_ratio),
            DocGroup::Scored(g) => g.destructive_intersect(postings, seek_ratio),
            DocGroup::Negative(excluded) => {
                let mut out = Vec::with_capacity(postings.len());
                while postings.next() {
                    let doc = postings.id();
                    if !excluded.contains(doc) {
                        out.push(doc);
                    }
                }
                *self = DocGroup::Strict(ArrayGroup::from_sorted(out));
            }
        }
    }

    /// Drops deleted documents. A negative group adds them to its
    /// exclusions.
    pub fn remove_deleted(&mut self, deleted: &DeletionMap) {
        if deleted.is_empty() {
            return;
        }
        match self {
            DocGroup::Strict(g) => g.remove_deleted(deleted),
            DocGroup::Scored(g) => g.remove_deleted(deleted),
            DocGroup::Negative(g) => {
                let removed: Vec<DocId> = deleted.iter().collect();
                let mut out = Vec::new();
                merge::union(g.docs(), &removed, &mut out);
                *g = ArrayGroup::from_sorted(out);
            }
        }
    }

    /// Keeps only the given IDs (in any order).
    pub fn retain(&mut self, ids: &[DocId]) {
        match self {
            DocGroup::Strict(g) => g.retain_ids(ids),
            DocGroup::Scored(g) => g.retain_ids(ids),
            DocGroup::Negative(excluded) => {
                let kept: ArrayGroup = ids
                    .iter()
                    .copied()
                    .filter(|&d| !excluded.contains(d))
                    .collect();
                *self = DocGroup::Strict(kept);
            }
        }
    }

    /// Lists the member IDs, expanding a negative group over `1..=max_doc`.
    pub fn materialize(&self, max_doc: DocId, deleted: Option<&DeletionMap>) -> Vec<DocId> {
        let live = |d: &DocId| deleted.map_or(true, |del| !del.is_deleted(*d));
        match self {
            DocGroup::Negative(excluded) => {
                let mut out = Vec::with_capacity((max_doc as usize).saturating_sub(excluded.len()));
                let mut skip = excluded.docs().iter().peekable();
                for doc in 1..=max_doc {
                    while skip.next_if(|&&e| e < doc).is_some() {}
                    if skip.next_if_eq(&&doc).is_some() {
                        continue;
                    }
                    if live(&doc) {
                        out.push(doc);
                    }
                }
                out
            }
            _ => self.docs().iter().copied().filter(live).collect(),
        }
    }

    /// Number of members in a partition with IDs `1..=max_doc`.
    pub fn count(&self, max_doc: DocId, deleted: Option<&DeletionMap>) -> usize {
        match self {
            DocGroup::Negative(excluded) => {
                let gone = deleted.map_or(0, |del| {
                    del.iter()
                        .filter(|&d| d >= 1 && d <= max_doc && !excluded.contains(d))
                        .count()
                });
                (max_doc as usize)
                    .saturating_sub(excluded.docs().iter().filter(|&&d| d <= max_doc).count())
                    .saturating_sub(gone)
            }
            _ => self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::VecPostings;
    use proptest::collection::btree_set;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn strict(ids: &[DocId]) -> DocGroup {
        DocGroup::Strict(ArrayGroup::from_sorted(ids.to_vec()))
    }

    fn scored(ids: &[DocId], scores: &[Score]) -> DocGroup {
        DocGroup::Scored(ScoredGroup::from_parts(ids.to_vec(), scores.to_vec()))
    }

    fn neg(ids: &[DocId]) -> DocGroup {
        DocGroup::Negative(ArrayGroup::from_sorted(ids.to_vec()))
    }

    fn to_group(set: &BTreeSet<DocId>) -> DocGroup {
        DocGroup::Strict(ArrayGroup::from_sorted(set.iter().copied().collect()))
    }

    #[test]
    fn strict_and_scored_combine() {
        let a = strict(&[1, 2, 3]);
        let b = scored(&[2, 3, 4], &[1.0, 2.0, 3.0]);

        let i = a.intersect(&b);
        assert_eq!(i, scored(&[2, 3], &[1.0, 2.0]));

        let u = a.union(&b);
        assert_eq!(u, scored(&[1, 2, 3, 4], &[0.0, 1.0, 2.0, 3.0]));
    }

    #[test]
    fn scored_intersection_adds_sqw() {
        let a = DocGroup::Scored(ScoredGroup::from_parts(vec![1], vec![1.0]).with_sqw(1.0));
        let b = DocGroup::Scored(ScoredGroup::from_parts(vec![1], vec![2.0]).with_sqw(4.0));
        let i = a.intersect(&b);
        assert_eq!(i.sqw(), 5.0);
        assert_eq!(i.score_of(1), Some(3.0));
    }

    #[test]
    fn negative_intersection_keeps_scores() {
        let a = scored(&[1, 2, 3], &[0.1, 0.2, 0.3]);
        let i = a.intersect(&neg(&[2]));
        assert_eq!(i, scored(&[1, 3], &[0.1, 0.3]));
        assert_eq!(neg(&[2]).intersect(&a), i);
    }

    #[test]
    fn negative_with_negative() {
        assert_eq!(neg(&[1, 2]).intersect(&neg(&[2, 3])), neg(&[1, 2, 3]));
        assert_eq!(neg(&[1, 2]).union(&neg(&[2, 3])), neg(&[2]));
    }

    #[test]
    fn union_with_negative() {
        // {1,2} ∪ ¬{2,3} = ¬{3}
        assert_eq!(strict(&[1, 2]).union(&neg(&[2, 3])), neg(&[3]));
        assert_eq!(neg(&[2, 3]).union(&strict(&[1, 2])), neg(&[3]));
    }

    #[test]
    fn variants_never_equal() {
        assert_ne!(strict(&[1]), neg(&[1]));
        assert_ne!(strict(&[1]), scored(&[1], &[0.0]));
    }

    #[test]
    fn conversions() {
        assert_eq!(strict(&[2, 5]).into_scored(), scored(&[2, 5], &[0.0, 0.0]));
        assert_eq!(neg(&[2]).into_scored(), neg(&[2]));
        assert_eq!(scored(&[3], &[1.0]).into_strict(), strict(&[3]));
        assert_eq!(neg(&[3]).into_strict(), strict(&[3]));
    }

    #[test]
    fn negate_round_trip() {
        let g = strict(&[4, 9]);
        assert!(g.contains(4));
        let n = g.clone().negate();
        assert!(!n.contains(4));
        assert!(n.contains(5));
        assert_eq!(n.negate(), g);
    }

    #[test]
    fn negative_destructive_intersect() {
        let mut g = neg(&[2, 5]);
        g.destructive_intersect(&mut VecPostings::new(vec![1, 2, 3, 5, 8]), 10);
        assert_eq!(g, strict(&[1, 3, 8]));
    }

    #[test]
    fn remove_deleted_on_negative_extends_exclusions() {
        let mut deleted = DeletionMap::new();
        deleted.delete(3);
        let mut g = DocGroup::all();
        g.remove_deleted(&deleted);
        assert!(!g.contains(3));
        assert_eq!(g.materialize(4, None), vec![1, 2, 4]);
        assert_eq!(g.count(4, Some(&deleted)), 3);
    }

    #[test]
    fn materialize_and_count() {
        let mut deleted = DeletionMap::new();
        deleted.delete(1);
        let g = neg(&[2]);
        assert_eq!(g.materialize(5, Some(&deleted)), vec![3, 4, 5]);
        assert_eq!(g.count(5, Some(&deleted)), 3);
        assert_eq!(strict(&[1, 4]).materialize(5, Some(&deleted)), vec![4]);
    }

    #[test]
    fn retain_on_negative() {
        let mut g = neg(&[2]);
        g.retain(&[3, 2, 1]);
        assert_eq!(g, strict(&[1, 3]));
    }

    #[test]
    fn mult_only_touches_scored() {
        let mut s = scored(&[1], &[2.0]);
        s.mult(1.5);
        assert_eq!(s.score_of(1), Some(3.0));
        let mut g = strict(&[1]);
        g.mult(3.0);
        assert_eq!(g.score_of(1), Some(0.0));
    }

    #[test]
    fn capacity_does_not_affect_equality() {
        let a = DocGroup::Strict(ArrayGroup::from_sorted(vec![1]));
        let b = DocGroup::Strict(ArrayGroup::from_raw(vec![1, 0, 0], 1));
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn union_and_intersect_match_sets(
            a in btree_set(1u32..200, 0..60),
            b in btree_set(1u32..200, 0..60),
        ) {
            let (ga, gb) = (to_group(&a), to_group(&b));

            let expected_i: Vec<DocId> = a.intersection(&b).copied().collect();
            let expected_u: Vec<DocId> = a.union(&b).copied().collect();
            let gi = ga.intersect(&gb);
            let gu = ga.union(&gb);
            prop_assert_eq!(gi.docs(), expected_i.as_slice());
            prop_assert_eq!(gu.docs(), expected_u.as_slice());

            prop_assert_eq!(ga.intersect(&gb), gb.intersect(&ga));
            prop_assert_eq!(ga.union(&gb), gb.union(&ga));
        }

        #[test]
        fn self_intersection(a in btree_set(1u32..500, 0..80)) {
            let g = to_group(&a);
            prop_assert_eq!(g.intersect(&g), g.clone());

            let docs: Vec<DocId> = a.iter().copied().collect();
            let scores: Vec<Score> = docs.iter().map(|&d| d as Score * 0.25).collect();
            let s = DocGroup::Scored(ScoredGroup::from_parts(docs, scores));
            let mut doubled = s.clone();
            doubled.mult(2.0);
            prop_assert_eq!(s.intersect(&s), doubled);
        }

        #[test]
        fn union_with_negative_identity(
            a in btree_set(1u32..200, 0..60),
            b in btree_set(1u32..200, 0..60),
        ) {
            let ga = to_group(&a);
            let neg_b = to_group(&b).negate();
            let lhs = ga.union(&neg_b);
            let rhs = ga.negate().intersect(&neg_b.into_strict()).negate();
            prop_assert_eq!(lhs, rhs);
        }

        #[test]
        fn contains_agrees_with_materialize(
            a in btree_set(1u32..100, 0..40),
            negative in any::<bool>(),
        ) {
            let mut g = to_group(&a);
            if negative {
                g = g.negate();
            }
            let members = g.materialize(100, None);
            for doc in 1..=100u32 {
                prop_assert_eq!(g.contains(doc), members.binary_search(&doc).is_ok());
            }
            prop_assert_eq!(g.count(100, None), members.len());
        }
    }
}
