//! The view of an index partition the evaluator consumes.
//!
//! A partition is a self-contained index segment: a term dictionary with
//! postings, per-field saved values, document lengths and a deletion map.
//! On-disk formats live behind this trait; [`crate::memory::MemoryPartition`]
//! is the in-memory implementation.

use std::ops::Bound;

use regex::Regex;
use sift_types::{DocId, FieldId, FieldType, FieldValue};

use crate::postings::{DeletionMap, PostingsIterator};

/// A dictionary entry resolved for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DictEntry {
    /// The indexed term.
    pub name: String,
    /// Partition-local entry ID.
    pub id: u32,
    /// Number of documents containing the term (`ft`).
    pub doc_freq: u32,
    /// Total occurrences across documents (`Ft`).
    pub total_freq: u64,
    /// Largest within-document frequency.
    pub max_fdt: u32,
}

/// How a query token is looked up in a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// The exact indexed form.
    Exact(&'a str),
    /// Any indexed form equal ignoring case.
    CaseInsensitive(&'a str),
    /// Any indexed form sharing the token's stem.
    Stemmed(&'a str),
    /// Indexed forms matching a `*`/`?` pattern.
    Wildcard {
        /// The pattern.
        pattern: &'a str,
        /// Whether letters must match case exactly.
        case_sensitive: bool,
    },
}

/// Metadata of a field in one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Partition-local field ID.
    pub id: FieldId,
    /// Field name.
    pub name: String,
    /// Value type of saved values.
    pub ty: FieldType,
    /// Whether values are saved (queryable by field terms, sortable).
    pub saved: bool,
    /// Whether the field's text is indexed in the term dictionary.
    pub indexed: bool,
}

/// A saved value and the documents carrying it.
#[derive(Debug, Clone, Copy)]
pub struct SavedEntry<'a> {
    /// The value.
    pub value: &'a FieldValue,
    /// Ascending IDs of documents with this value.
    pub docs: &'a [DocId],
}

/// One index partition.
pub trait Partition {
    /// Human-readable partition name.
    fn name(&self) -> &str;

    /// Partitions may be closed and reclaimed while a query runs.
    fn is_closed(&self) -> bool {
        false
    }

    /// Number of live documents.
    fn n_docs(&self) -> u32;

    /// Largest document ID ever assigned.
    fn max_doc_id(&self) -> DocId;

    /// Deleted documents, if any.
    fn deleted(&self) -> Option<&DeletionMap> {
        None
    }

    /// Total number of tokens in live documents.
    fn n_tokens(&self) -> u64;

    /// Length of a document in tokens.
    fn doc_length(&self, doc: DocId) -> u32;

    /// Euclidean length of a document's term frequency vector. Backends
    /// without the statistic report 1.
    fn doc_vector_length(&self, _doc: DocId) -> f32 {
        1.0
    }

    /// Resolves a token to zero or more dictionary entries.
    fn lookup(&self, lookup: &Lookup<'_>) -> Vec<DictEntry>;

    /// Opens the postings of an entry, restricted to occurrences in `fields`
    /// (all fields when empty). `None` means the entry has no postings here.
    fn postings(&self, entry: &DictEntry, fields: &[FieldId])
        -> Option<Box<dyn PostingsIterator + '_>>;

    /// Resolves a field by name.
    fn field(&self, name: &str) -> Option<FieldInfo>;

    /// Iterates saved values of a field within bounds, in ascending value order.
    fn field_range<'a>(
        &'a self,
        field: FieldId,
        lower: Bound<&FieldValue>,
        upper: Bound<&FieldValue>,
    ) -> Box<dyn Iterator<Item = SavedEntry<'a>> + 'a>;

    /// Saved values of a field for one document, ascending.
    fn doc_values(&self, field: FieldId, doc: DocId) -> Vec<FieldValue>;

    /// Returns `true` if any document has a saved value for the field.
    fn has_saved_values(&self, field: FieldId) -> bool {
        self.field_range(field, Bound::Unbounded, Bound::Unbounded)
            .next()
            .is_some()
    }
}

/// Returns `true` if the token contains `*` or `?`.
#[inline(always)]
pub fn is_wildcard(token: &str) -> bool {
    memchr::memchr2(b'*', b'?', token.as_bytes()).is_some()
}

/// Returns the literal prefix of a wildcard pattern.
pub fn literal_prefix(pattern: &str) -> &str {
    match memchr::memchr2(b'*', b'?', pattern.as_bytes()) {
        Some(i) => &pattern[..i],
        None => pattern,
    }
}

/// Compiles a `*`/`?` pattern into an anchored regex.
pub fn wildcard_regex(pattern: &str, case_sensitive: bool) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() * 2 + 8);
    if !case_sensitive {
        re.push_str("(?i)");
    }
    re.push('^');
    let mut literal = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            _ => re.push_str(&regex::escape(c.encode_utf8(&mut literal))),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_detection() {
        assert!(is_wildcard("ca*"));
        assert!(is_wildcard("c?t"));
        assert!(!is_wildcard("cat"));
        assert_eq!(literal_prefix("cat*s"), "cat");
        assert_eq!(literal_prefix("*"), "");
        assert_eq!(literal_prefix("plain"), "plain");
    }

    #[test]
    fn wildcard_regex_matches() {
        let re = wildcard_regex("c?t*", true).unwrap();
        assert!(re.is_match("cat"));
        assert!(re.is_match("cutlery"));
        assert!(!re.is_match("Cat"));
        assert!(!re.is_match("scat"));

        let re = wildcard_regex("c?t", false).unwrap();
        assert!(re.is_match("CAT"));
        assert!(!re.is_match("cart"));
    }

    #[test]
    fn wildcard_regex_escapes_metacharacters() {
        let re = wildcard_regex("a.b*", true).unwrap();
        assert!(re.is_match("a.bc"));
        assert!(!re.is_match("axbc"));
    }
}
