//! Merge-walk kernels over sorted ID arrays.
//!
//! Every kernel is a single O(n + m) pass over two ascending, duplicate-free
//! inputs and appends to caller-provided outputs.

use core::cmp::Ordering;

use bitvec::vec::BitVec;
use log::trace;
use sift_types::{DocId, Score};

use crate::postings::{PostingsIterator, TERMINATED};

/// One side of a scored merge. Strict sides contribute score 0.
#[derive(Clone, Copy)]
pub(crate) struct Side<'a> {
    pub docs: &'a [DocId],
    pub scores: Option<&'a [Score]>,
}

impl<'a> Side<'a> {
    #[inline(always)]
    pub fn strict(docs: &'a [DocId]) -> Self {
        Self { docs, scores: None }
    }

    #[inline(always)]
    pub fn scored(docs: &'a [DocId], scores: &'a [Score]) -> Self {
        debug_assert_eq!(docs.len(), scores.len());
        Self {
            docs,
            scores: Some(scores),
        }
    }

    #[inline(always)]
    fn score(&self, i: usize) -> Score {
        self.scores.map_or(0.0, |s| s[i])
    }
}

pub(crate) fn union(a: &[DocId], b: &[DocId], out: &mut Vec<DocId>) {
    out.reserve(a.len() + b.len());
    let mut ai = 0usize;
    let mut bi = 0usize;

    while ai < a.len() && bi < b.len() {
        match a[ai].cmp(&b[bi]) {
            Ordering::Less => {
                out.push(a[ai]);
                ai += 1;
            }
            Ordering::Greater => {
                out.push(b[bi]);
                bi += 1;
            }
            Ordering::Equal => {
                out.push(a[ai]);
                ai += 1;
                bi += 1;
            }
        }
    }

    out.extend_from_slice(&a[ai..]);
    out.extend_from_slice(&b[bi..]);
}

pub(crate) fn intersect(a: &[DocId], b: &[DocId], out: &mut Vec<DocId>) {
    out.reserve(a.len().min(b.len()));
    let mut ai = 0usize;
    let mut bi = 0usize;

    while ai < a.len() && bi < b.len() {
        match a[ai].cmp(&b[bi]) {
            Ordering::Less => ai += 1,
            Ordering::Greater => bi += 1,
            Ordering::Equal => {
                out.push(a[ai]);
                ai += 1;
                bi += 1;
            }
        }
    }
}

/// `a \ b`
pub(crate) fn difference(a: &[DocId], b: &[DocId], out: &mut Vec<DocId>) {
    out.reserve(a.len());
    let mut bi = 0usize;

    for &doc in a {
        while bi < b.len() && b[bi] < doc {
            bi += 1;
        }
        if bi < b.len() && b[bi] == doc {
            bi += 1;
            continue;
        }
        out.push(doc);
    }
}

pub(crate) fn union_scored(
    a: Side<'_>,
    b: Side<'_>,
    docs: &mut Vec<DocId>,
    scores: &mut Vec<Score>,
) {
    let cap = a.docs.len() + b.docs.len();
    docs.reserve(cap);
    scores.reserve(cap);
    let mut ai = 0usize;
    let mut bi = 0usize;

    while ai < a.docs.len() && bi < b.docs.len() {
        match a.docs[ai].cmp(&b.docs[bi]) {
            Ordering::Less => {
                docs.push(a.docs[ai]);
                scores.push(a.score(ai));
                ai += 1;
            }
            Ordering::Greater => {
                docs.push(b.docs[bi]);
                scores.push(b.score(bi));
                bi += 1;
            }
            Ordering::Equal => {
                docs.push(a.docs[ai]);
                scores.push(a.score(ai) + b.score(bi));
                ai += 1;
                bi += 1;
            }
        }
    }

    for i in ai..a.docs.len() {
        docs.push(a.docs[i]);
        scores.push(a.score(i));
    }
    for i in bi..b.docs.len() {
        docs.push(b.docs[i]);
        scores.push(b.score(i));
    }
}

pub(crate) fn intersect_scored(
    a: Side<'_>,
    b: Side<'_>,
    docs: &mut Vec<DocId>,
    scores: &mut Vec<Score>,
) {
    let cap = a.docs.len().min(b.docs.len());
    docs.reserve(cap);
    scores.reserve(cap);
    let mut ai = 0usize;
    let mut bi = 0usize;

    while ai < a.docs.len() && bi < b.docs.len() {
        match a.docs[ai].cmp(&b.docs[bi]) {
            Ordering::Less => ai += 1,
            Ordering::Greater => bi += 1,
            Ordering::Equal => {
                docs.push(a.docs[ai]);
                scores.push(a.score(ai) + b.score(bi));
                ai += 1;
                bi += 1;
            }
        }
    }
}

/// `a \ b`, keeping the scores of `a`.
pub(crate) fn difference_scored(
    a_docs: &[DocId],
    a_scores: &[Score],
    b: &[DocId],
    docs: &mut Vec<DocId>,
    scores: &mut Vec<Score>,
) {
    docs.reserve(a_docs.len());
    scores.reserve(a_docs.len());
    let mut bi = 0usize;

    for (i, &doc) in a_docs.iter().enumerate() {
        while bi < b.len() && b[bi] < doc {
            bi += 1;
        }
        if bi < b.len() && b[bi] == doc {
            bi += 1;
            continue;
        }
        docs.push(doc);
        scores.push(a_scores[i]);
    }
}

/// Returns `true` if intersecting `local` IDs with `postings` should step the
/// iterator forward rather than seek it once per local ID.
#[inline(always)]
pub(crate) fn should_iterate(postings_len: usize, local_len: usize, seek_ratio: u32) -> bool {
    postings_len < local_len.saturating_mul(seek_ratio as usize)
}

/// Calls `on_match(i, postings)` for every index `i` of `docs` whose ID
/// appears in `postings`, with the iterator positioned on that ID.
pub(crate) fn for_each_match<F>(
    docs: &[DocId],
    postings: &mut dyn PostingsIterator,
    seek_ratio: u32,
    mut on_match: F,
) where
    F: FnMut(usize, &mut dyn PostingsIterator),
{
    if docs.is_empty() {
        return;
    }

    if should_iterate(postings.len(), docs.len(), seek_ratio) {
        trace!(
            "iterating {} postings against {} local ids",
            postings.len(),
            docs.len()
        );
        let mut more = postings.next();
        for (i, &doc) in docs.iter().enumerate() {
            while more && postings.id() < doc {
                more = postings.next();
            }
            if !more {
                break;
            }
            if postings.id() == doc {
                on_match(i, postings);
            }
        }
    } else {
        trace!(
            "seeking {} postings for {} local ids",
            postings.len(),
            docs.len()
        );
        for (i, &doc) in docs.iter().enumerate() {
            if postings.find_id(doc) {
                on_match(i, postings);
            } else if postings.id() == TERMINATED {
                break;
            }
        }
    }
}

/// Keeps only the `docs` (and aligned `scores`) present in `postings`,
/// compacting in place.
pub(crate) fn retain_in_postings(
    docs: &mut Vec<DocId>,
    mut scores: Option<&mut Vec<Score>>,
    postings: &mut dyn PostingsIterator,
    seek_ratio: u32,
) {
    let mut keep: BitVec = BitVec::repeat(false, docs.len());
    for_each_match(docs, postings, seek_ratio, |i, _| keep.set(i, true));

    let mut write_idx = 0usize;
    for read_idx in 0..docs.len() {
        if keep[read_idx] {
            docs[write_idx] = docs[read_idx];
            if let Some(scores) = scores.as_deref_mut() {
                scores[write_idx] = scores[read_idx];
            }
            write_idx += 1;
        }
    }

    docs.truncate(write_idx);
    if let Some(scores) = scores {
        scores.truncate(write_idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::VecPostings;

    #[test]
    fn union_dedups() {
        let mut out = Vec::new();
        union(&[1, 3, 5], &[2, 3, 6], &mut out);
        assert_eq!(out, vec![1, 2, 3, 5, 6]);
    }

    #[test]
    fn intersect_and_difference() {
        let mut out = Vec::new();
        intersect(&[1, 3, 5, 7], &[3, 4, 7], &mut out);
        assert_eq!(out, vec![3, 7]);

        out.clear();
        difference(&[1, 3, 5, 7], &[3, 4, 7], &mut out);
        assert_eq!(out, vec![1, 5]);
    }

    #[test]
    fn scored_union_adds_common_scores() {
        let (mut docs, mut scores) = (Vec::new(), Vec::new());
        union_scored(
            Side::scored(&[1, 2], &[1.0, 2.0]),
            Side::strict(&[2, 3]),
            &mut docs,
            &mut scores,
        );
        assert_eq!(docs, vec![1, 2, 3]);
        assert_eq!(scores, vec![1.0, 2.0, 0.0]);
    }

    #[test]
    fn scored_intersect_adds_scores() {
        let (mut docs, mut scores) = (Vec::new(), Vec::new());
        intersect_scored(
            Side::scored(&[1, 2, 4], &[1.0, 2.0, 4.0]),
            Side::scored(&[2, 4], &[0.5, 0.25]),
            &mut docs,
            &mut scores,
        );
        assert_eq!(docs, vec![2, 4]);
        assert_eq!(scores, vec![2.5, 4.25]);
    }

    #[test]
    fn iterate_and_seek_agree() {
        let local: Vec<DocId> = (1..200).step_by(3).collect();
        let postings: Vec<DocId> = (1..200).step_by(2).collect();

        let mut iterated = Vec::new();
        let mut p = VecPostings::new(postings.clone());
        // ratio so large that iteration is always chosen
        for_each_match(&local, &mut p, u32::MAX, |i, _| iterated.push(local[i]));

        let mut sought = Vec::new();
        let mut p = VecPostings::new(postings);
        // ratio 0 forces seeking
        for_each_match(&local, &mut p, 0, |i, _| sought.push(local[i]));

        assert_eq!(iterated, sought);
        assert!(iterated.iter().all(|d| d % 2 == 1 && (d - 1) % 3 == 0));
    }

    #[test]
    fn heuristic_threshold() {
        assert!(should_iterate(99, 10, 10));
        assert!(!should_iterate(100, 10, 10));
        assert!(!should_iterate(5, 0, 10));
    }

    #[test]
    fn retain_compacts_scores() {
        let mut docs = vec![1, 2, 3, 4];
        let mut scores = vec![0.1, 0.2, 0.3, 0.4];
        let mut p = VecPostings::new(vec![2, 4, 9]);
        retain_in_postings(&mut docs, Some(&mut scores), &mut p, 10);
        assert_eq!(docs, vec![2, 4]);
        assert_eq!(scores, vec![0.2, 0.4]);
    }
}
