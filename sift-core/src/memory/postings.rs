use smallvec::SmallVec;
use sift_types::{DocId, FieldId};

use super::{DocPosting, Occurrence};
use crate::postings::{PostingsIterator, TERMINATED};

/// Postings of one term in a [`super::MemoryPartition`], optionally
/// restricted to occurrences in some fields.
///
/// Documents whose occurrences all lie outside the restriction are skipped;
/// frequencies and positions count only occurrences inside it.
#[derive(Debug)]
pub struct MemoryPostings<'a> {
    docs: &'a [DocPosting],
    occurrences: &'a [Occurrence],
    fields: SmallVec<[FieldId; 4]>,
    cursor: Option<usize>,
    freq: u32,
}

impl<'a> MemoryPostings<'a> {
    pub(crate) fn new(
        docs: &'a [DocPosting],
        occurrences: &'a [Occurrence],
        fields: &[FieldId],
    ) -> Self {
        Self {
            docs,
            occurrences,
            fields: SmallVec::from_slice(fields),
            cursor: None,
            freq: 0,
        }
    }

    #[inline]
    fn occurrences_of(&self, posting: &DocPosting) -> &'a [Occurrence] {
        &self.occurrences[posting.offset as usize..(posting.offset + posting.len) as usize]
    }

    #[inline]
    fn accepts(&self, occ: &Occurrence) -> bool {
        self.fields.is_empty() || self.fields.contains(&occ.field)
    }

    /// Moves the cursor to the first accepted document at or after `from`.
    fn settle(&mut self, mut from: usize) -> bool {
        while from < self.docs.len() {
            let posting = self.docs[from];
            let freq = if self.fields.is_empty() {
                posting.len
            } else {
                self.occurrences_of(&posting)
                    .iter()
                    .filter(|o| self.accepts(o))
                    .count() as u32
            };
            if freq > 0 {
                self.cursor = Some(from);
                self.freq = freq;
                return true;
            }
            from += 1;
        }
        self.cursor = Some(self.docs.len());
        self.freq = 0;
        false
    }
}

impl PostingsIterator for MemoryPostings<'_> {
    fn next(&mut self) -> bool {
        let from = self.cursor.map_or(0, |c| (c + 1).min(self.docs.len()));
        self.settle(from)
    }

    fn id(&self) -> DocId {
        match self.cursor {
            None => 0,
            Some(c) => self.docs.get(c).map_or(TERMINATED, |p| p.doc),
        }
    }

    fn freq(&self) -> u32 {
        self.freq
    }

    fn find_id(&mut self, target: DocId) -> bool {
        if self.cursor.is_some() && self.id() >= target {
            return self.id() == target;
        }
        let start = self.cursor.unwrap_or(0).min(self.docs.len());
        let skip = self.docs[start..].partition_point(|p| p.doc < target);
        self.settle(start + skip);
        self.id() == target
    }

    fn len(&self) -> usize {
        self.docs.len()
    }

    fn positions(&mut self, out: &mut Vec<u32>) -> bool {
        out.clear();
        let Some(posting) = self.cursor.and_then(|c| self.docs.get(c)).copied() else {
            return true;
        };
        out.extend(
            self.occurrences_of(&posting)
                .iter()
                .filter(|o| self.accepts(o))
                .map(|o| o.pos),
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Vec<DocPosting>, Vec<Occurrence>) {
        let occ = vec![
            Occurrence { pos: 0, field: 0 },
            Occurrence { pos: 5, field: 1 },
            Occurrence { pos: 2, field: 1 },
            Occurrence { pos: 1, field: 0 },
            Occurrence { pos: 3, field: 0 },
        ];
        let docs = vec![
            DocPosting {
                doc: 2,
                offset: 0,
                len: 2,
            },
            DocPosting {
                doc: 4,
                offset: 2,
                len: 1,
            },
            DocPosting {
                doc: 7,
                offset: 3,
                len: 2,
            },
        ];
        (docs, occ)
    }

    #[test]
    fn unrestricted_iteration() {
        let (docs, occ) = fixture();
        let mut p = MemoryPostings::new(&docs, &occ, &[]);
        let mut seen = Vec::new();
        while p.next() {
            seen.push((p.id(), p.freq()));
        }
        assert_eq!(seen, vec![(2, 2), (4, 1), (7, 2)]);
        assert_eq!(p.id(), TERMINATED);
    }

    #[test]
    fn field_restriction_skips_documents() {
        let (docs, occ) = fixture();
        let mut p = MemoryPostings::new(&docs, &occ, &[0]);
        let mut buf = Vec::new();
        assert!(p.next());
        assert_eq!((p.id(), p.freq()), (2, 1));
        assert!(p.positions(&mut buf));
        assert_eq!(buf, vec![0]);
        assert!(p.next());
        assert_eq!(p.id(), 7);
        assert!(!p.next());
    }

    #[test]
    fn seek_respects_restriction() {
        let (docs, occ) = fixture();
        let mut p = MemoryPostings::new(&docs, &occ, &[0]);
        assert!(!p.find_id(4));
        assert_eq!(p.id(), 7);
        assert!(p.find_id(7));
        assert_eq!(p.freq(), 2);
        assert!(!p.find_id(8));
        assert_eq!(p.id(), TERMINATED);
    }
}
