//! Building an in-memory partition.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use log::debug;
use rustc_hash::FxHashMap;
use sift_types::{DocId, FieldId, FieldType, FieldValue, QueryError, Result};

use super::{DocPosting, MemoryPartition, Occurrence, TermBlock, TermIds};
use crate::partition::FieldInfo;
use crate::postings::DeletionMap;

/// Field that [`MemoryPartitionBuilder::add`] writes into.
pub const DEFAULT_FIELD: &str = "body";

#[derive(Clone, Copy, Debug)]
struct TempOccurrence {
    term: u32,
    doc: DocId,
    pos: u32,
    field: FieldId,
}

/// Accumulates documents, then sorts them into a [`MemoryPartition`].
#[derive(Debug)]
pub struct MemoryPartitionBuilder {
    name: String,
    interned: FxHashMap<String, u32>,
    names: Vec<String>,
    temp: Vec<TempOccurrence>,
    doc_lengths: Vec<u32>,
    fields: Vec<FieldInfo>,
    saved: Vec<BTreeMap<FieldValue, Vec<DocId>>>,
    values: Vec<FxHashMap<DocId, Vec<FieldValue>>>,
    deleted: DeletionMap,
}

impl MemoryPartitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interned: FxHashMap::default(),
            names: Vec::new(),
            temp: Vec::new(),
            // Slot 0 is never a document.
            doc_lengths: vec![0],
            fields: Vec::new(),
            saved: Vec::new(),
            values: Vec::new(),
            deleted: DeletionMap::new(),
        }
    }

    /// Defines a field whose values are saved with [`Self::save`]. Returns the
    /// field's ID; redefining a field keeps its ID and marks it saved.
    pub fn define_field(&mut self, name: &str, ty: FieldType) -> FieldId {
        let id = self.field_id(name, ty);
        self.fields[id as usize].saved = true;
        self.fields[id as usize].ty = ty;
        id
    }

    fn field_id(&mut self, name: &str, ty: FieldType) -> FieldId {
        if let Some(f) = self.fields.iter().find(|f| f.name == name) {
            return f.id;
        }
        let id = self.fields.len() as FieldId;
        self.fields.push(FieldInfo {
            id,
            name: name.to_string(),
            ty,
            saved: false,
            indexed: false,
        });
        self.saved.push(BTreeMap::new());
        self.values.push(FxHashMap::default());
        id
    }

    /// Adds a document with a single text field.
    pub fn add(&mut self, text: &str) -> DocId {
        self.add_document(&[(DEFAULT_FIELD, text)])
    }

    /// Adds a document made of `(field, text)` pairs. Word positions run on
    /// across fields.
    pub fn add_document(&mut self, fields: &[(&str, &str)]) -> DocId {
        let doc = self.doc_lengths.len() as DocId;
        let mut pos = 0u32;
        for &(field, text) in fields {
            let field = self.field_id(field, FieldType::Str);
            self.fields[field as usize].indexed = true;
            for token in tokenize(text) {
                let term = self.intern(token);
                self.temp.push(TempOccurrence {
                    term,
                    doc,
                    pos,
                    field,
                });
                pos += 1;
            }
        }
        self.doc_lengths.push(pos);
        doc
    }

    fn intern(&mut self, token: &str) -> u32 {
        if let Some(&id) = self.interned.get(token) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(token.to_string());
        self.interned.insert(token.to_string(), id);
        id
    }

    /// Saves a value of a defined field for a document.
    ///
    /// # Errors
    ///
    /// `UnknownField` if the field was never defined, `InvalidArgument` if
    /// the document does not exist or the value has the wrong type.
    pub fn save(&mut self, doc: DocId, field: &str, value: FieldValue) -> Result<()> {
        let info = self
            .fields
            .iter()
            .find(|f| f.name == field && f.saved)
            .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
        if doc == 0 || doc as usize >= self.doc_lengths.len() {
            return Err(QueryError::InvalidArgument(format!("no document {doc}")));
        }
        if value.field_type() != info.ty {
            return Err(QueryError::InvalidArgument(format!(
                "field {field} holds {:?} values, got {value}",
                info.ty
            )));
        }
        let id = info.id as usize;
        let docs = self.saved[id].entry(value.clone()).or_default();
        if let Err(i) = docs.binary_search(&doc) {
            docs.insert(i, doc);
        }
        let values = self.values[id].entry(doc).or_default();
        if let Err(i) = values.binary_search(&value) {
            values.insert(i, value);
        }
        Ok(())
    }

    /// Parses a literal with the field's type and saves it.
    ///
    /// # Errors
    ///
    /// As [`Self::save`], plus `MalformedValue` for unparsable literals.
    pub fn save_literal(&mut self, doc: DocId, field: &str, literal: &str) -> Result<()> {
        let ty = self
            .fields
            .iter()
            .find(|f| f.name == field && f.saved)
            .map(|f| f.ty)
            .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
        let value = FieldValue::parse(field, ty, literal)?;
        self.save(doc, field, value)
    }

    /// Marks a document deleted.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the document does not exist.
    pub fn delete(&mut self, doc: DocId) -> Result<()> {
        if doc == 0 || doc as usize >= self.doc_lengths.len() {
            return Err(QueryError::InvalidArgument(format!("no document {doc}")));
        }
        self.deleted.delete(doc);
        Ok(())
    }

    /// Sorts the accumulated occurrences into term blocks.
    pub fn build(self) -> MemoryPartition {
        let Self {
            name,
            names,
            mut temp,
            doc_lengths,
            fields,
            saved,
            values,
            deleted,
            ..
        } = self;

        // Rank terms by name so the dictionary is sorted.
        let mut order: Vec<u32> = (0..names.len() as u32).collect();
        order.sort_unstable_by(|&a, &b| names[a as usize].cmp(&names[b as usize]));
        let mut rank = vec![0u32; names.len()];
        for (r, &id) in order.iter().enumerate() {
            rank[id as usize] = r as u32;
        }
        for t in &mut temp {
            t.term = rank[t.term as usize];
        }
        temp.sort_unstable_by_key(|t| (t.term, t.doc, t.pos));

        let doc_vector_lengths = vector_lengths(&temp, doc_lengths.len());
        let terms: Vec<String> = order.iter().map(|&id| names[id as usize].clone()).collect();
        let (blocks, postings, occurrences) = build_blocks_from_sorted(&temp, terms.len());

        let mut folded: FxHashMap<String, TermIds> = FxHashMap::default();
        let mut stems: FxHashMap<String, TermIds> = FxHashMap::default();
        for (id, term) in terms.iter().enumerate() {
            folded.entry(term.to_lowercase()).or_default().push(id as u32);
            stems.entry(stem(term)).or_default().push(id as u32);
        }

        let max_doc = (doc_lengths.len() - 1) as DocId;
        debug!(
            "built partition {name}: {max_doc} documents, {} terms, {} occurrences",
            terms.len(),
            occurrences.len()
        );

        MemoryPartition {
            name,
            terms,
            blocks,
            postings,
            occurrences,
            folded,
            stems,
            doc_lengths,
            doc_vector_lengths,
            fields,
            saved,
            values,
            deleted,
            max_doc,
            closed: AtomicBool::new(false),
        }
    }
}

/// Per-document `sqrt(sum fdt^2)` over occurrences sorted by (term, doc).
/// Documents without tokens get 1.
fn vector_lengths(sorted: &[TempOccurrence], n_slots: usize) -> Vec<f32> {
    let mut sums = vec![0f32; n_slots];
    let mut start = 0;
    while start < sorted.len() {
        let (term, doc) = (sorted[start].term, sorted[start].doc);
        let end = start
            + sorted[start..]
                .iter()
                .take_while(|o| o.term == term && o.doc == doc)
                .count();
        let fdt = (end - start) as f32;
        sums[doc as usize] += fdt * fdt;
        start = end;
    }
    sums.into_iter()
        .map(|s| if s > 0.0 { s.sqrt() } else { 1.0 })
        .collect()
}

/// `entries` sorted by (term, doc, pos); term ranks are dense in
/// `0..n_terms`.
fn build_blocks_from_sorted(
    entries: &[TempOccurrence],
    n_terms: usize,
) -> (Vec<TermBlock>, Vec<DocPosting>, Vec<Occurrence>) {
    let mut blocks: Vec<TermBlock> = Vec::with_capacity(n_terms);
    let mut postings: Vec<DocPosting> = Vec::new();
    let mut occurrences: Vec<Occurrence> = Vec::with_capacity(entries.len());

    let mut i = 0usize;
    while i < entries.len() {
        let term = entries[i].term;
        let block_offset = postings.len() as u32;
        let mut total_freq = 0u64;
        let mut max_fdt = 0u32;

        while i < entries.len() && entries[i].term == term {
            let doc = entries[i].doc;
            let occ_offset = occurrences.len() as u32;
            while i < entries.len() && entries[i].term == term && entries[i].doc == doc {
                occurrences.push(Occurrence {
                    pos: entries[i].pos,
                    field: entries[i].field,
                });
                i += 1;
            }
            let len = occurrences.len() as u32 - occ_offset;
            postings.push(DocPosting {
                doc,
                offset: occ_offset,
                len,
            });
            total_freq += len as u64;
            max_fdt = max_fdt.max(len);
        }

        debug_assert_eq!(blocks.len(), term as usize);
        blocks.push(TermBlock {
            offset: block_offset,
            len: postings.len() as u32 - block_offset,
            total_freq,
            max_fdt,
        });
    }

    (blocks, postings, occurrences)
}

/// Splits text into alphanumeric runs.
pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
}

/// Lowercases a word and strips common English inflections.
pub fn stem(word: &str) -> String {
    let mut w = word.to_lowercase();
    let len = w.chars().count();
    if len > 4 && w.ends_with("ies") {
        w.truncate(w.len() - 3);
        w.push('y');
    } else if len > 4
        && ["sses", "ches", "shes", "xes"]
            .iter()
            .any(|suffix| w.ends_with(suffix))
    {
        w.truncate(w.len() - 2);
    } else if len > 3 && w.ends_with('s') && !w.ends_with("ss") && !w.ends_with("us") {
        w.truncate(w.len() - 1);
    } else if len > 5 && w.ends_with("ing") {
        w.truncate(w.len() - 3);
    } else if len > 4 && w.ends_with("ed") {
        w.truncate(w.len() - 2);
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stemming() {
        assert_eq!(stem("Dogs"), "dog");
        assert_eq!(stem("ponies"), "pony");
        assert_eq!(stem("boxes"), "box");
        assert_eq!(stem("running"), "runn");
        assert_eq!(stem("jumped"), "jump");
        assert_eq!(stem("glass"), "glass");
        assert_eq!(stem("is"), "is");
    }

    #[test]
    fn tokenizer_splits_on_punctuation() {
        let tokens: Vec<&str> = tokenize("Hello, world! foo-bar  42").collect();
        assert_eq!(tokens, vec!["Hello", "world", "foo", "bar", "42"]);
    }

    #[test]
    fn blocks_group_occurrences() {
        let mut b = MemoryPartitionBuilder::new("p");
        b.add("b a b");
        b.add("a");
        let p = b.build();
        assert_eq!(p.terms, vec!["a", "b"]);
        assert_eq!(p.blocks[0].len, 2);
        assert_eq!(p.blocks[1].len, 1);
        assert_eq!(p.blocks[1].total_freq, 2);
        assert_eq!(p.blocks[1].max_fdt, 2);
        let b_docs = p.block_postings(1);
        assert_eq!(b_docs[0].doc, 1);
        let occ = &p.occurrences[b_docs[0].offset as usize..][..b_docs[0].len as usize];
        assert_eq!(occ.iter().map(|o| o.pos).collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn save_validates() {
        let mut b = MemoryPartitionBuilder::new("p");
        let doc = b.add("x");
        assert!(matches!(
            b.save(doc, "year", FieldValue::Int(1)),
            Err(QueryError::UnknownField(_))
        ));
        b.define_field("year", FieldType::Int);
        assert!(b.save(doc, "year", FieldValue::Str("x".into())).is_err());
        assert!(b.save(7, "year", FieldValue::Int(1)).is_err());
        assert!(b.save_literal(doc, "year", "2020").is_ok());
        assert!(matches!(
            b.save_literal(doc, "year", "soon"),
            Err(QueryError::MalformedValue { .. })
        ));
    }

    #[test]
    fn deletions() {
        let mut b = MemoryPartitionBuilder::new("p");
        b.add("a");
        b.add("a b");
        assert!(b.delete(3).is_err());
        b.delete(1).unwrap();
        let p = b.build();
        use crate::partition::Partition;
        assert_eq!(p.n_docs(), 1);
        assert_eq!(p.n_tokens(), 2);
    }
}
