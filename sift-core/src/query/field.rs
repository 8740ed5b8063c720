//! Field terms: comparisons against saved field values.
//!
//! Binding turns a [`FieldTerm`] into a [`BoundField`] for one partition:
//! resolved field ID, parsed literals and value bounds. Date comparisons
//! against a bare day (`2020-05-01`) cover that whole day.

use log::warn;
use memchr::memmem;
use regex::Regex;
use sift_types::{
    DocId, FieldId, FieldOp, FieldType, FieldValue, QueryConfig, QueryError, Result, Score,
};
use std::ops::Bound;

use super::eval::Evaluation;
use super::plan::NodeId;
use super::FieldTerm;
use crate::group::{ArrayGroup, DocGroup, ScoredGroup};
use crate::partition::{literal_prefix, wildcard_regex, Partition, SavedEntry};
use crate::quick_or::{radix_sort_by_doc, QuickOr};

/// How a pattern operator tests a value.
#[derive(Debug)]
pub(crate) enum Matcher {
    Wildcard(Regex),
    Substring(String),
    Starts(String),
    Ends(String),
    Similar { target: Vec<char>, max_distance: usize },
}

/// A field term resolved against one partition.
#[derive(Debug)]
pub(crate) enum BoundField {
    /// Matches nothing here.
    Empty,
    /// Values within bounds.
    Range {
        field: FieldId,
        lower: Bound<FieldValue>,
        upper: Bound<FieldValue>,
    },
    /// String equality ignoring case.
    Folded { field: FieldId, value: String },
    /// A pattern operator. `candidates` narrows the scan; `literal_len` is
    /// the number of non-wildcard characters in the pattern.
    Pattern {
        field: FieldId,
        matcher: Matcher,
        candidates: (Bound<FieldValue>, Bound<FieldValue>),
        literal_len: usize,
        case_sensitive: bool,
    },
}

/// Binds a field term to `partition`.
///
/// # Errors
///
/// Returns [`QueryError::InvalidArgument`] for `similar` against a field
/// that does not hold strings.
pub(crate) fn bind(
    term: &FieldTerm,
    partition: &dyn Partition,
    config: &QueryConfig,
) -> Result<BoundField> {
    let Some(info) = partition.field(&term.field) else {
        warn!("unknown field {} in partition {}", term.field, partition.name());
        return Ok(BoundField::Empty);
    };
    if !info.saved {
        warn!("field {} is not saved in partition {}", term.field, partition.name());
        return Ok(BoundField::Empty);
    }

    if term.op.is_pattern() {
        return bind_pattern(term, info.id, info.ty, config.case_sensitive);
    }

    if info.ty == FieldType::Str && !config.case_sensitive && term.op == FieldOp::Equal {
        return Ok(BoundField::Folded {
            field: info.id,
            value: term.value.to_lowercase(),
        });
    }

    let parse = |literal: &str| match FieldValue::parse(&term.field, info.ty, literal) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("{err}");
            None
        }
    };
    let Some(value) = parse(&term.value) else {
        return Ok(BoundField::Empty);
    };
    let day = info.ty == FieldType::Date && is_bare_date(&term.value);
    let next = |v: &FieldValue| if day { next_day(v) } else { None };

    let (lower, upper) = match term.op {
        FieldOp::Equal => match next(&value) {
            Some(end) => (Bound::Included(value), Bound::Excluded(end)),
            None => (Bound::Included(value.clone()), Bound::Included(value)),
        },
        FieldOp::Less => (Bound::Unbounded, Bound::Excluded(value)),
        FieldOp::LessEqual => match next(&value) {
            Some(end) => (Bound::Unbounded, Bound::Excluded(end)),
            None => (Bound::Unbounded, Bound::Included(value)),
        },
        FieldOp::Greater => match next(&value) {
            Some(start) => (Bound::Included(start), Bound::Unbounded),
            None => (Bound::Excluded(value), Bound::Unbounded),
        },
        FieldOp::GreaterEqual => (Bound::Included(value), Bound::Unbounded),
        FieldOp::Range => {
            let lower = match (term.lower_inclusive, next(&value)) {
                (true, _) => Bound::Included(value),
                (false, Some(start)) => Bound::Included(start),
                (false, None) => Bound::Excluded(value),
            };
            let upper = match &term.upper {
                None => Bound::Unbounded,
                Some(literal) => {
                    let Some(hi) = parse(literal) else {
                        return Ok(BoundField::Empty);
                    };
                    let hi_day = info.ty == FieldType::Date && is_bare_date(literal);
                    match (term.upper_inclusive, hi_day) {
                        (true, true) => next_day(&hi).map_or(Bound::Included(hi), Bound::Excluded),
                        (true, false) => Bound::Included(hi),
                        (false, _) => Bound::Excluded(hi),
                    }
                }
            };
            (lower, upper)
        }
        FieldOp::Matches | FieldOp::Substring | FieldOp::Starts | FieldOp::Ends | FieldOp::Similar => {
            return bind_pattern(term, info.id, info.ty, config.case_sensitive);
        }
    };
    Ok(BoundField::Range {
        field: info.id,
        lower,
        upper,
    })
}

fn bind_pattern(
    term: &FieldTerm,
    field: FieldId,
    ty: FieldType,
    case_sensitive: bool,
) -> Result<BoundField> {
    let pattern = if case_sensitive {
        term.value.clone()
    } else {
        term.value.to_lowercase()
    };
    let literal_len = pattern.chars().filter(|&c| !matches!(c, '*' | '?')).count();
    let mut candidates = (Bound::Unbounded, Bound::Unbounded);

    let matcher = match term.op {
        FieldOp::Matches => {
            if case_sensitive && ty == FieldType::Str {
                candidates.0 = Bound::Included(FieldValue::Str(literal_prefix(&pattern).to_string()));
            }
            match wildcard_regex(&pattern, true) {
                Some(re) => Matcher::Wildcard(re),
                None => {
                    warn!("field {}: cannot compile pattern {:?}", term.field, term.value);
                    return Ok(BoundField::Empty);
                }
            }
        }
        FieldOp::Substring => Matcher::Substring(pattern),
        FieldOp::Starts => {
            if case_sensitive && ty == FieldType::Str {
                candidates.0 = Bound::Included(FieldValue::Str(pattern.clone()));
            }
            Matcher::Starts(pattern)
        }
        FieldOp::Ends => Matcher::Ends(pattern),
        FieldOp::Similar => {
            if ty != FieldType::Str {
                return Err(QueryError::InvalidArgument(format!(
                    "similar needs a string field, {} holds {ty:?}",
                    term.field
                )));
            }
            let target: Vec<char> = pattern.chars().collect();
            let max_distance = (target.len() / 3).max(1);
            Matcher::Similar { target, max_distance }
        }
        op => {
            return Err(QueryError::InvalidArgument(format!(
                "{op:?} is not a pattern operator"
            )));
        }
    };
    Ok(BoundField::Pattern {
        field,
        matcher,
        candidates,
        literal_len,
        case_sensitive,
    })
}

impl BoundField {
    /// Upper bound on matching documents: the documents of every candidate
    /// value.
    pub fn estimate(&self, partition: &dyn Partition) -> usize {
        self.candidates(partition).map(|e| e.docs.len()).sum()
    }

    fn candidates<'p>(
        &self,
        partition: &'p dyn Partition,
    ) -> Box<dyn Iterator<Item = SavedEntry<'p>> + 'p> {
        match self {
            BoundField::Empty => Box::new(std::iter::empty()),
            BoundField::Range { field, lower, upper } => {
                partition.field_range(*field, lower.as_ref(), upper.as_ref())
            }
            BoundField::Folded { field, .. } => {
                partition.field_range(*field, Bound::Unbounded, Bound::Unbounded)
            }
            BoundField::Pattern {
                field, candidates, ..
            } => partition.field_range(*field, candidates.0.as_ref(), candidates.1.as_ref()),
        }
    }
}

impl Matcher {
    /// Score of `value` against the pattern, `None` if it does not match.
    fn score(&self, value: &str, literal_len: usize) -> Option<Score> {
        let len = value.chars().count();
        let tightness = || {
            if len == 0 {
                1.0
            } else {
                (literal_len as Score / len as Score).min(1.0)
            }
        };
        match self {
            Matcher::Wildcard(re) => re.is_match(value).then(tightness),
            Matcher::Substring(needle) => memmem::find(value.as_bytes(), needle.as_bytes()).map(|_| tightness()),
            Matcher::Starts(prefix) => value.starts_with(prefix.as_str()).then(tightness),
            Matcher::Ends(suffix) => value.ends_with(suffix.as_str()).then(tightness),
            Matcher::Similar { target, max_distance } => {
                let d = levenshtein(target, value);
                (d <= *max_distance).then(|| 1.0 - d as Score / len.max(target.len()).max(1) as Score)
            }
        }
    }

    /// Returns `true` once no later value in ascending order can match.
    /// Only meaningful when values are compared as stored.
    fn exhausted(&self, value: &str) -> bool {
        match self {
            Matcher::Starts(prefix) => value > prefix.as_str() && !value.starts_with(prefix.as_str()),
            _ => false,
        }
    }
}

impl Evaluation<'_, '_, '_> {
    pub(super) fn eval_field(&mut self, id: NodeId, scored: bool) -> Result<DocGroup> {
        let plan = self.plan;
        let partition = self.ctx.partition;
        let tuning = &self.ctx.config.tuning;
        let Some(bound) = plan.field(id) else {
            return Ok(DocGroup::Strict(ArrayGroup::new()));
        };
        let estimate = plan.node(id).estimate;
        let candidates = bound.candidates(partition);

        match bound {
            BoundField::Empty => Ok(DocGroup::Strict(ArrayGroup::new())),
            BoundField::Range { .. } => {
                let mut or = QuickOr::new(partition.n_docs(), partition.max_doc_id(), estimate, tuning);
                for entry in candidates {
                    or.add_docs(entry.docs);
                }
                Ok(DocGroup::Strict(or.into_group()))
            }
            BoundField::Folded { value, .. } => {
                let mut or = QuickOr::new(partition.n_docs(), partition.max_doc_id(), estimate, tuning);
                for entry in candidates {
                    if entry.value.as_str().is_some_and(|v| v.to_lowercase() == *value) {
                        or.add_docs(entry.docs);
                    }
                }
                Ok(DocGroup::Strict(or.into_group()))
            }
            BoundField::Pattern {
                matcher,
                literal_len,
                case_sensitive,
                ..
            } => {
                let mut hits: Vec<(DocId, Score)> = Vec::new();
                for entry in candidates {
                    let text = match entry.value {
                        FieldValue::Str(s) if *case_sensitive => s.clone(),
                        FieldValue::Str(s) => s.to_lowercase(),
                        other => other.to_string(),
                    };
                    let as_stored = *case_sensitive && matches!(entry.value, FieldValue::Str(_));
                    if as_stored && matcher.exhausted(&text) {
                        break;
                    }
                    if let Some(score) = matcher.score(&text, *literal_len) {
                        hits.extend(entry.docs.iter().map(|&doc| (doc, score)));
                    }
                }
                Ok(fold_best(hits, scored))
            }
        }
    }
}

/// Sorts `(doc, score)` hits by document and keeps the best score per
/// document.
fn fold_best(mut hits: Vec<(DocId, Score)>, scored: bool) -> DocGroup {
    radix_sort_by_doc(&mut hits, |h| h.0);
    let mut docs: Vec<DocId> = Vec::with_capacity(hits.len());
    let mut scores: Vec<Score> = Vec::with_capacity(hits.len());
    for (doc, score) in hits {
        if docs.last() == Some(&doc) {
            if let Some(best) = scores.last_mut() {
                *best = best.max(score);
            }
        } else {
            docs.push(doc);
            scores.push(score);
        }
    }
    if scored {
        DocGroup::Scored(ScoredGroup::from_parts(docs, scores))
    } else {
        DocGroup::Strict(ArrayGroup::from_sorted(docs))
    }
}

fn is_bare_date(literal: &str) -> bool {
    chrono::NaiveDate::parse_from_str(literal.trim(), "%Y-%m-%d").is_ok()
}

/// Midnight of the following day.
fn next_day(value: &FieldValue) -> Option<FieldValue> {
    let FieldValue::Date(dt) = value else {
        return None;
    };
    dt.date()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(FieldValue::Date)
}

/// Character-level edit distance, two rows.
fn levenshtein(a: &[char], b: &str) -> usize {
    let mut row: Vec<usize> = (0..=a.len()).collect();
    for (i, cb) in b.chars().enumerate() {
        let mut diag = row[0];
        row[0] = i + 1;
        for (j, &ca) in a.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let next = (diag + cost).min(row[j] + 1).min(row[j + 1] + 1);
            diag = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[a.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryPartition, MemoryPartitionBuilder};
    use crate::query::plan::Plan;
    use crate::query::QueryElement;
    use crate::weighting::{CollectionStats, Tf};

    fn partition() -> MemoryPartition {
        let mut b = MemoryPartitionBuilder::new("p");
        b.define_field("title", FieldType::Str);
        b.define_field("year", FieldType::Int);
        b.define_field("published", FieldType::Date);
        let rows = [
            ("Rust in Action", "2019", "2019-06-01 09:30:00"),
            ("Programming Rust", "2021", "2021-07-13 00:00:00"),
            ("The Rust Book", "2018", "2021-07-13 23:59:59"),
            ("Zero to Production", "2022", "2021-07-14 00:00:00"),
        ];
        for (title, year, date) in rows {
            let doc = b.add(title);
            b.save_literal(doc, "title", title).unwrap();
            b.save_literal(doc, "year", year).unwrap();
            b.save_literal(doc, "published", date).unwrap();
        }
        b.build()
    }

    fn run(query: &QueryElement, p: &MemoryPartition, config: &QueryConfig) -> Result<DocGroup> {
        let stats = CollectionStats::from_partitions(&[p], query, config);
        let plan = Plan::bind(query, p, config)?;
        let mut eval = Evaluation::new(&plan, p, config, &stats, &Tf);
        eval.run()
    }

    fn docs(field: &str, op: FieldOp, value: &str) -> Vec<DocId> {
        let p = partition();
        let q = QueryElement::field(field, op, value);
        run(&q, &p, &QueryConfig::boolean()).unwrap().docs().to_vec()
    }

    #[test]
    fn numeric_comparisons() {
        assert_eq!(docs("year", FieldOp::Equal, "2021"), vec![2]);
        assert_eq!(docs("year", FieldOp::Less, "2019"), vec![3]);
        assert_eq!(docs("year", FieldOp::LessEqual, "2019"), vec![1, 3]);
        assert_eq!(docs("year", FieldOp::Greater, "2021"), vec![4]);
        assert_eq!(docs("year", FieldOp::GreaterEqual, "2021"), vec![2, 4]);
    }

    #[test]
    fn ranges_honour_inclusivity() {
        let p = partition();
        let config = QueryConfig::boolean();
        let closed = QueryElement::Field(FieldTerm::range("year", "2018", "2021"));
        assert_eq!(run(&closed, &p, &config).unwrap().docs(), &[1, 2, 3]);
        let open = QueryElement::Field(FieldTerm::range("year", "2018", "2021").bounds(false, false));
        assert_eq!(run(&open, &p, &config).unwrap().docs(), &[1]);
        let inverted = QueryElement::Field(FieldTerm::range("year", "2030", "2000"));
        assert!(run(&inverted, &p, &config).unwrap().is_empty());
    }

    #[test]
    fn bare_dates_cover_the_whole_day() {
        assert_eq!(docs("published", FieldOp::Equal, "2021-07-13"), vec![2, 3]);
        assert_eq!(docs("published", FieldOp::LessEqual, "2021-07-13"), vec![1, 2, 3]);
        assert_eq!(docs("published", FieldOp::Greater, "2021-07-13"), vec![4]);
        assert_eq!(docs("published", FieldOp::Less, "2021-07-13"), vec![1]);
        assert_eq!(docs("published", FieldOp::Equal, "2021-07-13 00:00:00"), vec![2]);
    }

    #[test]
    fn malformed_and_unknown_are_empty() {
        assert!(docs("published", FieldOp::Equal, "13/07/2021").is_empty());
        assert!(docs("year", FieldOp::Greater, "recent").is_empty());
        assert!(docs("isbn", FieldOp::Equal, "1").is_empty());
    }

    #[test]
    fn string_equality_ignores_case_unless_asked() {
        assert_eq!(docs("title", FieldOp::Equal, "programming rust"), vec![2]);
        let p = partition();
        let mut config = QueryConfig::boolean();
        config.case_sensitive = true;
        let q = QueryElement::field("title", FieldOp::Equal, "programming rust");
        assert!(run(&q, &p, &config).unwrap().is_empty());
    }

    #[test]
    fn pattern_operators() {
        assert_eq!(docs("title", FieldOp::Starts, "rust"), vec![1]);
        assert_eq!(docs("title", FieldOp::Ends, "rust"), vec![2]);
        assert_eq!(docs("title", FieldOp::Substring, "rust"), vec![1, 2, 3]);
        assert_eq!(docs("title", FieldOp::Matches, "*r?st*"), vec![1, 2, 3]);
        assert_eq!(docs("title", FieldOp::Similar, "the rust bok"), vec![3]);
        assert_eq!(docs("year", FieldOp::Starts, "20"), vec![1, 2, 3, 4]);
    }

    #[test]
    fn case_sensitive_prefix_scan_stops_early() {
        let p = partition();
        let mut config = QueryConfig::boolean();
        config.case_sensitive = true;
        let q = QueryElement::field("title", FieldOp::Starts, "Pro");
        assert_eq!(run(&q, &p, &config).unwrap().docs(), &[2]);
        let q = QueryElement::field("title", FieldOp::Matches, "The*");
        assert_eq!(run(&q, &p, &config).unwrap().docs(), &[3]);
    }

    #[test]
    fn patterns_score_tighter_matches_higher() {
        let p = partition();
        let config = QueryConfig::ranked(sift_types::WeightingKind::Tf);
        let q = QueryElement::field("title", FieldOp::Substring, "rust");
        let group = run(&q, &p, &config).unwrap();
        assert!(group.is_scored());
        let book = group.score_of(3).unwrap();
        let action = group.score_of(1).unwrap();
        assert!((book - 4.0 / 13.0).abs() < 1e-6);
        assert!(book > action);
    }

    #[test]
    fn similar_needs_strings() {
        let p = partition();
        let q = QueryElement::field("year", FieldOp::Similar, "2020");
        let err = run(&q, &p, &QueryConfig::boolean()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn edit_distance() {
        let a: Vec<char> = "kitten".chars().collect();
        assert_eq!(levenshtein(&a, "sitting"), 3);
        assert_eq!(levenshtein(&a, "kitten"), 0);
        assert_eq!(levenshtein(&[], "abc"), 3);
    }
}
