use core::cmp::Ordering;
use std::fmt;

use log::warn;
use sift_types::{Direction, DocId, FieldId, FieldValue, QueryError, Result, Score};

use crate::partition::Partition;

/// What a sort key compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Score,
    Field(String),
}

/// Ordered sort keys, e.g. `-score,+title,date`.
///
/// `-` sorts descending, `+` or no prefix ascending. Documents without a
/// value for a field key sort after those with one, in either direction.
/// Ties are broken by partition, then document ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<(SortKey, Direction)>,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::by_score()
    }
}

impl SortSpec {
    /// Highest score first.
    pub fn by_score() -> Self {
        Self {
            keys: vec![(SortKey::Score, Direction::Descending)],
        }
    }

    /// # Errors
    ///
    /// Returns [`QueryError::InvalidSortSpec`] for an empty spec or key.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut keys = Vec::new();
        for raw in spec.split(',') {
            let raw = raw.trim();
            let (direction, name) = match raw.as_bytes().first() {
                Some(b'-') => (Direction::Descending, &raw[1..]),
                Some(b'+') => (Direction::Ascending, &raw[1..]),
                _ => (Direction::Ascending, raw),
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(QueryError::InvalidSortSpec(spec.to_string()));
            }
            let key = if name.eq_ignore_ascii_case("score") {
                SortKey::Score
            } else {
                SortKey::Field(name.to_string())
            };
            keys.push((key, direction));
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[(SortKey, Direction)] {
        &self.keys
    }

    /// Returns `true` if no key reads saved field values.
    pub fn is_score_only(&self) -> bool {
        self.keys.iter().all(|(k, _)| *k == SortKey::Score)
    }

    /// Resolves the field keys against one partition. Unknown or unsaved
    /// fields resolve to `None` and every document lacks a value for them.
    pub fn specialize(&self, partition: &dyn Partition) -> Specialized {
        let fields = self
            .keys
            .iter()
            .map(|(key, _)| match key {
                SortKey::Score => None,
                SortKey::Field(name) => {
                    let field = partition.field(name).filter(|f| f.saved).map(|f| f.id);
                    if field.is_none() {
                        warn!("sort field {name} is not saved in partition {}", partition.name());
                    }
                    field
                }
            })
            .collect();
        Specialized { fields }
    }

    /// Orders hits best first.
    pub fn compare(&self, a: &ResultHit, b: &ResultHit) -> Ordering {
        for (i, (key, direction)) in self.keys.iter().enumerate() {
            let ord = match key {
                SortKey::Score => directed(a.score.total_cmp(&b.score), *direction),
                SortKey::Field(_) => match (a.key(i), b.key(i)) {
                    (Some(x), Some(y)) => directed(x.cmp(y), *direction),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                },
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        (a.partition, a.doc).cmp(&(b.partition, b.doc))
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, direction)) in self.keys.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            let sign = match direction {
                Direction::Ascending => '+',
                Direction::Descending => '-',
            };
            match key {
                SortKey::Score => write!(f, "{sign}score")?,
                SortKey::Field(name) => write!(f, "{sign}{name}")?,
            }
        }
        Ok(())
    }
}

#[inline]
fn directed(ord: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Ascending => ord,
        Direction::Descending => ord.reverse(),
    }
}

/// A [`SortSpec`] bound to one partition.
#[derive(Debug, Clone)]
pub struct Specialized {
    fields: Vec<Option<FieldId>>,
}

impl Specialized {
    /// Builds a hit, fetching the document's sort values.
    pub fn hit(
        &self,
        partition_index: usize,
        partition: &dyn Partition,
        doc: DocId,
        score: Score,
    ) -> ResultHit {
        let keys = self
            .fields
            .iter()
            .map(|field| field.and_then(|f| partition.doc_values(f, doc).into_iter().next()))
            .collect();
        ResultHit {
            partition: partition_index,
            doc,
            score,
            keys,
        }
    }
}

/// One ranked document.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultHit {
    /// Index of the partition the document lives in.
    pub partition: usize,
    pub doc: DocId,
    pub score: Score,
    /// Sort values, aligned with the [`SortSpec`] keys. Score keys hold `None`.
    pub keys: Vec<Option<FieldValue>>,
}

impl ResultHit {
    #[inline]
    fn key(&self, i: usize) -> Option<&FieldValue> {
        self.keys.get(i).and_then(Option::as_ref)
    }
}
