//! In-memory partition.
//!
//! Terms live in a sorted dictionary. Each term owns a [`TermBlock`], a
//! contiguous run of [`DocPosting`]s inside one shared array, and each
//! posting points at a run of [`Occurrence`]s (word position plus field).
//! Saved field values are kept in ordered per-field maps so range scans
//! walk them in value order.

mod builder;
mod postings;

pub use builder::{stem, MemoryPartitionBuilder};
pub use postings::MemoryPostings;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use sift_types::{DocId, FieldId, FieldValue};

use crate::partition::{
    literal_prefix, wildcard_regex, DictEntry, FieldInfo, Lookup, Partition, SavedEntry,
};
use crate::postings::{DeletionMap, PostingsIterator};

/// Postings of one term.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TermBlock {
    pub offset: u32,
    pub len: u32,
    pub total_freq: u64,
    pub max_fdt: u32,
}

/// One document of a term's postings.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DocPosting {
    pub doc: DocId,
    pub offset: u32,
    pub len: u32,
}

/// One occurrence of a term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Occurrence {
    pub pos: u32,
    pub field: FieldId,
}

pub(crate) type TermIds = SmallVec<[u32; 2]>;

/// A partition held entirely in memory. Build one with
/// [`MemoryPartitionBuilder`].
#[derive(Debug)]
pub struct MemoryPartition {
    pub(crate) name: String,
    pub(crate) terms: Vec<String>,
    pub(crate) blocks: Vec<TermBlock>,
    pub(crate) postings: Vec<DocPosting>,
    pub(crate) occurrences: Vec<Occurrence>,
    pub(crate) folded: FxHashMap<String, TermIds>,
    pub(crate) stems: FxHashMap<String, TermIds>,
    pub(crate) doc_lengths: Vec<u32>,
    pub(crate) doc_vector_lengths: Vec<f32>,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) saved: Vec<BTreeMap<FieldValue, Vec<DocId>>>,
    pub(crate) values: Vec<FxHashMap<DocId, Vec<FieldValue>>>,
    pub(crate) deleted: DeletionMap,
    pub(crate) max_doc: DocId,
    pub(crate) closed: AtomicBool,
}

impl MemoryPartition {
    /// Marks the partition closed. Evaluation skips it from then on.
    pub fn close(&self) {
        debug!("closing partition {}", self.name);
        self.closed.store(true, Ordering::Release);
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    fn entry(&self, id: u32) -> DictEntry {
        let block = self.blocks[id as usize];
        DictEntry {
            name: self.terms[id as usize].clone(),
            id,
            doc_freq: block.len,
            total_freq: block.total_freq,
            max_fdt: block.max_fdt,
        }
    }

    fn entries(&self, ids: Option<&TermIds>) -> Vec<DictEntry> {
        ids.map_or_else(Vec::new, |ids| ids.iter().map(|&id| self.entry(id)).collect())
    }

    fn wildcard(&self, pattern: &str, case_sensitive: bool) -> Vec<DictEntry> {
        let Some(re) = wildcard_regex(pattern, case_sensitive) else {
            return Vec::new();
        };
        // Case-sensitive patterns only need the terms sharing the literal prefix.
        let (start, end) = if case_sensitive {
            let prefix = literal_prefix(pattern);
            let start = self.terms.partition_point(|t| t.as_str() < prefix);
            let end = start + self.terms[start..].partition_point(|t| t.starts_with(prefix));
            (start, end)
        } else {
            (0, self.terms.len())
        };
        (start..end)
            .filter(|&i| re.is_match(&self.terms[i]))
            .map(|i| self.entry(i as u32))
            .collect()
    }

    pub(crate) fn block_postings(&self, id: u32) -> &[DocPosting] {
        let block = self.blocks[id as usize];
        &self.postings[block.offset as usize..(block.offset + block.len) as usize]
    }
}

impl Partition for MemoryPartition {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn n_docs(&self) -> u32 {
        self.max_doc - self.deleted.len() as u32
    }

    fn max_doc_id(&self) -> DocId {
        self.max_doc
    }

    fn deleted(&self) -> Option<&DeletionMap> {
        Some(&self.deleted)
    }

    fn n_tokens(&self) -> u64 {
        self.doc_lengths
            .iter()
            .enumerate()
            .skip(1)
            .filter(|&(doc, _)| !self.deleted.is_deleted(doc as DocId))
            .map(|(_, &len)| len as u64)
            .sum()
    }

    fn doc_length(&self, doc: DocId) -> u32 {
        self.doc_lengths.get(doc as usize).copied().unwrap_or(0)
    }

    fn doc_vector_length(&self, doc: DocId) -> f32 {
        self.doc_vector_lengths.get(doc as usize).copied().unwrap_or(1.0)
    }

    fn lookup(&self, lookup: &Lookup<'_>) -> Vec<DictEntry> {
        match *lookup {
            Lookup::Exact(term) => match self.terms.binary_search_by(|t| t.as_str().cmp(term)) {
                Ok(i) => vec![self.entry(i as u32)],
                Err(_) => Vec::new(),
            },
            Lookup::CaseInsensitive(term) => self.entries(self.folded.get(&term.to_lowercase())),
            Lookup::Stemmed(term) => self.entries(self.stems.get(&stem(term))),
            Lookup::Wildcard {
                pattern,
                case_sensitive,
            } => self.wildcard(pattern, case_sensitive),
        }
    }

    fn postings(
        &self,
        entry: &DictEntry,
        fields: &[FieldId],
    ) -> Option<Box<dyn PostingsIterator + '_>> {
        if entry.id as usize >= self.blocks.len() || self.terms[entry.id as usize] != entry.name {
            return None;
        }
        Some(Box::new(MemoryPostings::new(
            self.block_postings(entry.id),
            &self.occurrences,
            fields,
        )))
    }

    fn field(&self, name: &str) -> Option<FieldInfo> {
        self.fields.iter().find(|f| f.name == name).cloned()
    }

    fn field_range<'a>(
        &'a self,
        field: FieldId,
        lower: Bound<&FieldValue>,
        upper: Bound<&FieldValue>,
    ) -> Box<dyn Iterator<Item = SavedEntry<'a>> + 'a> {
        let Some(map) = self.saved.get(field as usize) else {
            return Box::new(std::iter::empty());
        };
        if is_inverted(lower, upper) {
            return Box::new(std::iter::empty());
        }
        Box::new(map.range((lower, upper)).map(|(value, docs)| SavedEntry {
            value,
            docs: docs.as_slice(),
        }))
    }

    fn doc_values(&self, field: FieldId, doc: DocId) -> Vec<FieldValue> {
        self.values
            .get(field as usize)
            .and_then(|m| m.get(&doc))
            .cloned()
            .unwrap_or_default()
    }
}

/// `BTreeMap::range` panics on bounds that describe no interval.
fn is_inverted(lower: Bound<&FieldValue>, upper: Bound<&FieldValue>) -> bool {
    let (lo, lo_open) = match lower {
        Bound::Included(v) => (v, false),
        Bound::Excluded(v) => (v, true),
        Bound::Unbounded => return false,
    };
    let (hi, hi_open) = match upper {
        Bound::Included(v) => (v, false),
        Bound::Excluded(v) => (v, true),
        Bound::Unbounded => return false,
    };
    lo > hi || (lo == hi && lo_open && hi_open)
}
