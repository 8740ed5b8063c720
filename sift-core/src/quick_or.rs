//! Accumulators that OR many postings lists into one document set.
//!
//! The strategy is picked once at construction:
//!
//! - **Dense**: one slot per document ID of the partition. O(1) insert, no
//!   growth, no sort. Used for small partitions and for results expected to
//!   cover most of the partition.
//! - **Sparse**: append every posting, then sort by document ID once at
//!   finalization and fold adjacent duplicates.
//!
//! An accumulator is consumed by `into_group`; it cannot be reused.

use bitvec::vec::BitVec;
use log::debug;
use sift_types::{DocId, EvalTuning, Score};

use crate::group::{ArrayGroup, ScoredGroup};
use crate::postings::PostingsIterator;

/// Below this many entries the sparse finalization uses a comparison sort.
pub const RADIX_SORT_THRESHOLD: usize = 512;

/// Returns `true` when the dense strategy should be used.
#[inline]
pub fn use_dense(n_docs: u32, estimated: usize, tuning: &EvalTuning) -> bool {
    n_docs < tuning.dense_min_docs || estimated as f32 >= tuning.dense_fill_ratio * n_docs as f32
}

/// Unscored accumulator.
#[derive(Debug)]
pub struct QuickOr {
    store: DocStore,
    added: usize,
}

#[derive(Debug)]
enum DocStore {
    Dense(BitVec),
    Sparse(Vec<DocId>),
}

impl QuickOr {
    /// Creates an accumulator for a partition with `n_docs` live documents
    /// and IDs up to `max_doc`, expecting about `estimated` results.
    pub fn new(n_docs: u32, max_doc: DocId, estimated: usize, tuning: &EvalTuning) -> Self {
        let store = if use_dense(n_docs, estimated, tuning) {
            DocStore::Dense(BitVec::repeat(false, max_doc as usize + 1))
        } else {
            DocStore::Sparse(Vec::with_capacity(estimated))
        };
        Self { store, added: 0 }
    }

    /// Returns `true` if the dense strategy was chosen.
    pub fn is_dense(&self) -> bool {
        matches!(self.store, DocStore::Dense(_))
    }

    /// ORs a postings list into the accumulator. `None` is a no-op.
    pub fn add(&mut self, postings: Option<&mut (dyn PostingsIterator + '_)>) {
        let Some(postings) = postings else {
            return;
        };
        while postings.next() {
            self.insert(postings.id());
        }
    }

    /// ORs a sorted or unsorted list of IDs.
    pub fn add_docs(&mut self, docs: &[DocId]) {
        for &doc in docs {
            self.insert(doc);
        }
    }

    #[inline]
    fn insert(&mut self, doc: DocId) {
        self.added += 1;
        match &mut self.store {
            DocStore::Dense(present) => {
                let idx = doc as usize;
                if idx >= present.len() {
                    present.resize(idx + 1, false);
                }
                present.set(idx, true);
            }
            DocStore::Sparse(docs) => docs.push(doc),
        }
    }

    /// Finalizes into a strict group.
    pub fn into_group(self) -> ArrayGroup {
        let docs: Vec<DocId> = match self.store {
            DocStore::Dense(present) => present.iter_ones().map(|i| i as DocId).collect(),
            DocStore::Sparse(mut docs) => {
                radix_sort_by_doc(&mut docs, |&d| d);
                docs.dedup();
                docs
            }
        };
        debug!("quick or folded {} postings into {} documents", self.added, docs.len());
        ArrayGroup::from_sorted(docs)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    doc: DocId,
    weight: Score,
}

/// Scored accumulator: weights of the same document are summed.
///
/// Also keeps the running sum of squared query weights that
/// [`ScoredGroup::normalize`] divides by.
#[derive(Debug)]
pub struct ScoredQuickOr {
    store: ScoredStore,
    sqw: f32,
    added: usize,
}

#[derive(Debug)]
enum ScoredStore {
    Dense {
        present: BitVec,
        weights: Vec<Score>,
    },
    Sparse(Vec<Entry>),
}

impl ScoredQuickOr {
    /// See [`QuickOr::new`].
    pub fn new(n_docs: u32, max_doc: DocId, estimated: usize, tuning: &EvalTuning) -> Self {
        let store = if use_dense(n_docs, estimated, tuning) {
            let slots = max_doc as usize + 1;
            ScoredStore::Dense {
                present: BitVec::repeat(false, slots),
                weights: vec![0.0; slots],
            }
        } else {
            ScoredStore::Sparse(Vec::with_capacity(estimated))
        };
        Self {
            store,
            sqw: 0.0,
            added: 0,
        }
    }

    pub fn is_dense(&self) -> bool {
        matches!(self.store, ScoredStore::Dense { .. })
    }

    /// ORs a postings list, scoring each document by its stored weight times
    /// `query_weight`. Adds `query_weight²` to `sqw`. `None` only adds the
    /// query weight.
    pub fn add(&mut self, postings: Option<&mut (dyn PostingsIterator + '_)>, query_weight: f32) {
        self.add_weight_only(query_weight);
        let Some(postings) = postings else {
            return;
        };
        while postings.next() {
            self.insert(postings.id(), postings.weight() * query_weight);
        }
    }

    /// ORs a postings list with weights computed by `weigh`, leaving `sqw`
    /// untouched. Callers adding several variants of one term account for
    /// its query weight once with [`ScoredQuickOr::add_weight_only`].
    pub fn add_with<F>(&mut self, postings: Option<&mut (dyn PostingsIterator + '_)>, mut weigh: F)
    where
        F: FnMut(&mut dyn PostingsIterator) -> Score,
    {
        let Some(postings) = postings else {
            return;
        };
        while postings.next() {
            let weight = weigh(&mut *postings);
            self.insert(postings.id(), weight);
        }
    }

    /// Adds a term's query weight to `sqw` without adding documents.
    #[inline]
    pub fn add_weight_only(&mut self, query_weight: f32) {
        self.sqw += query_weight * query_weight;
    }

    #[inline]
    fn insert(&mut self, doc: DocId, weight: Score) {
        self.added += 1;
        match &mut self.store {
            ScoredStore::Dense { present, weights } => {
                let idx = doc as usize;
                if idx >= present.len() {
                    present.resize(idx + 1, false);
                    weights.resize(idx + 1, 0.0);
                }
                present.set(idx, true);
                weights[idx] += weight;
            }
            ScoredStore::Sparse(entries) => entries.push(Entry { doc, weight }),
        }
    }

    /// Finalizes into a scored group carrying the accumulated `sqw`.
    pub fn into_group(self) -> ScoredGroup {
        let (docs, scores): (Vec<DocId>, Vec<Score>) = match self.store {
            ScoredStore::Dense { present, weights } => present
                .iter_ones()
                .map(|i| (i as DocId, weights[i]))
                .unzip(),
            ScoredStore::Sparse(mut entries) => {
                radix_sort_by_doc(&mut entries, |e| e.doc);
                fold_duplicates(&entries)
            }
        };
        debug!(
            "scored quick or folded {} postings into {} documents",
            self.added,
            docs.len()
        );
        ScoredGroup::from_parts(docs, scores).with_sqw(self.sqw)
    }
}

fn fold_duplicates(entries: &[Entry]) -> (Vec<DocId>, Vec<Score>) {
    let mut docs: Vec<DocId> = Vec::with_capacity(entries.len());
    let mut scores: Vec<Score> = Vec::with_capacity(entries.len());
    for e in entries {
        match docs.last() {
            Some(&last) if last == e.doc => {
                if let Some(s) = scores.last_mut() {
                    *s += e.weight;
                }
            }
            _ => {
                docs.push(e.doc);
                scores.push(e.weight);
            }
        }
    }
    (docs, scores)
}

/// Stable sort by document ID: LSD radix over the ID bytes, or a comparison
/// sort below [`RADIX_SORT_THRESHOLD`].
///
/// All four byte histograms come from one read of the input. A byte that is
/// the same in every ID is skipped, so partitions under 65536 documents take
/// two scatters.
pub(crate) fn radix_sort_by_doc<T: Copy + Default>(items: &mut [T], doc: impl Fn(&T) -> DocId) {
    if items.len() < RADIX_SORT_THRESHOLD {
        items.sort_by_key(|e| doc(e));
        return;
    }

    let mut hists = [[0u32; 256]; 4];
    for e in items.iter() {
        let id = doc(e);
        for (byte, hist) in hists.iter_mut().enumerate() {
            hist[(id >> (8 * byte)) as u8 as usize] += 1;
        }
    }

    let n = items.len() as u32;
    let mut aux = vec![T::default(); items.len()];
    let mut in_items = true;
    for (byte, hist) in hists.iter().enumerate() {
        if hist.contains(&n) {
            continue;
        }
        let shift = 8 * byte as u32;
        let digit = |e: &T| (doc(e) >> shift) as u8;
        if in_items {
            scatter(items, &mut aux, hist, &digit);
        } else {
            scatter(&aux, items, hist, &digit);
        }
        in_items = !in_items;
    }
    if !in_items {
        items.copy_from_slice(&aux);
    }
}

/// Moves `src` into `dst` ordered by `digit`, keeping the order of equal
/// digits. `hist` counts each digit in `src`.
#[inline(always)]
fn scatter<T: Copy>(src: &[T], dst: &mut [T], hist: &[u32; 256], digit: impl Fn(&T) -> u8) {
    let mut next = [0u32; 256];
    let mut sum = 0u32;
    for (slot, &count) in next.iter_mut().zip(hist) {
        *slot = sum;
        sum += count;
    }
    for e in src {
        let d = digit(e) as usize;
        dst[next[d] as usize] = *e;
        next[d] += 1;
    }
}
