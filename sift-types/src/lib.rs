//! Core types and configuration for the Sift query evaluation engine.
//!
//! This crate holds the plain value types shared by the engine and by the
//! layers around it (query parser, result presentation). Keeping them apart
//! from `sift-core` gives:
//!
//! - **Stable vocabulary**: document IDs, scores and field values mean the same
//!   thing on both sides of the engine boundary
//! - **Cheap configuration**: `QueryConfig` is a plain struct with presets
//! - **One error type**: every fallible engine call returns [`QueryError`]

#![warn(missing_docs)]

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Document identifier inside a partition.
///
/// IDs start at 1. Zero is never a valid document and is used as the
/// "absent" sentinel by dense accumulators.
pub type DocId = u32;

/// Relevance score (higher is better).
pub type Score = f32;

/// Partition-local identifier of a field.
pub type FieldId = u32;

/// Result type alias for engine operations.
pub type Result<T> = core::result::Result<T, QueryError>;

/// Errors surfaced by query evaluation.
///
/// Recoverable conditions (a term missing from a partition, an unknown field,
/// a malformed date literal) are logged and evaluate to an empty set. Only
/// programmer errors travel through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// An operation was asked to do something its operands cannot support.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The named field is not defined in any partition.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// A literal could not be converted to the field's type.
    #[error("malformed value {value:?} for field {field}")]
    MalformedValue {
        /// Field the literal was compared against.
        field: String,
        /// The offending literal.
        value: String,
    },

    /// A sort specification could not be parsed.
    #[error("invalid sort specification: {0}")]
    InvalidSortSpec(String),

    /// The partition was closed while it was being read.
    #[error("partition {0} is closed")]
    PartitionClosed(String),
}

/// Storage type of a saved field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Signed integer values.
    Int,
    /// Floating point values.
    Float,
    /// String values.
    Str,
    /// Date/time values with second resolution.
    Date,
}

/// A saved field value.
///
/// Values of the same type are totally ordered. Values of different types
/// order by type first, which only matters for mixed dictionaries (never
/// produced by a well-formed partition).
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Integer value.
    Int(i64),
    /// Float value, ordered with `total_cmp`.
    Float(f64),
    /// String value.
    Str(String),
    /// Date value.
    Date(NaiveDateTime),
}

impl FieldValue {
    /// Returns the type of this value.
    pub const fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Str(_) => FieldType::Str,
            FieldValue::Date(_) => FieldType::Date,
        }
    }

    /// Returns the string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Parses a query literal into a value of the given type.
    ///
    /// Dates accept `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and the `T`-separated
    /// form. A bare date parses to midnight.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::MalformedValue` if the literal does not parse.
    pub fn parse(field: &str, ty: FieldType, literal: &str) -> Result<FieldValue> {
        let malformed = || QueryError::MalformedValue {
            field: field.to_string(),
            value: literal.to_string(),
        };
        let literal = literal.trim();
        match ty {
            FieldType::Int => literal.parse().map(FieldValue::Int).map_err(|_| malformed()),
            FieldType::Float => literal
                .parse()
                .map(FieldValue::Float)
                .map_err(|_| malformed()),
            FieldType::Str => Ok(FieldValue::Str(literal.to_string())),
            FieldType::Date => parse_date(literal).map(FieldValue::Date).ok_or_else(malformed),
        }
    }

    #[inline(always)]
    const fn rank(&self) -> u8 {
        match self {
            FieldValue::Int(_) => 0,
            FieldValue::Float(_) => 1,
            FieldValue::Str(_) => 2,
            FieldValue::Date(_) => 3,
        }
    }
}

/// Parses a date literal. Returns `None` for anything that is not one of the
/// accepted formats.
pub fn parse_date(literal: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(literal, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(literal, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldValue {}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.total_cmp(b),
            (FieldValue::Str(a), FieldValue::Str(b)) => a.cmp(b),
            (FieldValue::Date(a), FieldValue::Date(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Str(v) => f.write_str(v),
            FieldValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Comparison applied by a field term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldOp {
    /// `=`
    Equal,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// Closed interval `[lower, upper]`.
    Range,
    /// Wildcard pattern (`*` and `?`) over the whole value.
    Matches,
    /// Pattern occurs anywhere in the value.
    Substring,
    /// Value starts with the pattern.
    Starts,
    /// Value ends with the pattern.
    Ends,
    /// Value is within a small edit distance of the pattern.
    Similar,
}

impl FieldOp {
    /// Returns `true` for the string pattern operators, whose results are scored.
    #[inline(always)]
    pub const fn is_pattern(self) -> bool {
        matches!(
            self,
            FieldOp::Matches | FieldOp::Substring | FieldOp::Starts | FieldOp::Ends | FieldOp::Similar
        )
    }

    /// Returns `true` for `<` and `<=`.
    #[inline(always)]
    pub const fn is_upper_bound(self) -> bool {
        matches!(self, FieldOp::Less | FieldOp::LessEqual)
    }

    /// Returns `true` for `>` and `>=`.
    #[inline(always)]
    pub const fn is_lower_bound(self) -> bool {
        matches!(self, FieldOp::Greater | FieldOp::GreaterEqual)
    }
}

impl FromStr for FieldOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => FieldOp::Equal,
            "<" => FieldOp::Less,
            "<=" => FieldOp::LessEqual,
            ">" => FieldOp::Greater,
            ">=" => FieldOp::GreaterEqual,
            "range" => FieldOp::Range,
            "matches" => FieldOp::Matches,
            "substring" => FieldOp::Substring,
            "starts" => FieldOp::Starts,
            "ends" => FieldOp::Ends,
            "similar" => FieldOp::Similar,
            other => {
                return Err(QueryError::InvalidArgument(format!(
                    "unknown field operator {other:?}"
                )))
            }
        })
    }
}

/// Sort direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Term weighting model used for scored evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WeightingKind {
    /// Raw term frequency.
    Tf,
    /// Log-scaled frequency times inverse document frequency.
    #[default]
    TfIdf,
    /// BM25-style saturation with length normalization.
    Okapi,
}

impl FromStr for WeightingKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tf" => Ok(WeightingKind::Tf),
            "tfidf" | "tf-idf" => Ok(WeightingKind::TfIdf),
            "okapi" | "bm25" => Ok(WeightingKind::Okapi),
            other => Err(QueryError::InvalidArgument(format!(
                "unknown weighting function {other:?}"
            ))),
        }
    }
}

/// Tunable constants of the evaluation engine.
///
/// The defaults come from empirical tuning against disk-backed postings and
/// may not transfer to other storage backends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalTuning {
    /// Intersections step through a postings list when its length is below
    /// `seek_ratio` times the local set size, and seek otherwise.
    pub seek_ratio: u32,
    /// Partitions with fewer documents always use the dense accumulator.
    pub dense_min_docs: u32,
    /// Estimated fill ratio above which the dense accumulator is used.
    pub dense_fill_ratio: f32,
    /// Upper bound on the number of missing terms a passage tolerates.
    pub max_passage_missing: usize,
    /// Base passage window, in words.
    pub passage_base_window: u32,
    /// Extra passage window per query term, in words.
    pub passage_window_per_term: u32,
    /// Maximum boost a perfectly tight proximity match receives.
    pub proximity_scaling: f32,
    /// How quickly the proximity boost flattens as the penalty grows.
    pub proximity_saturation: f32,
}

impl Default for EvalTuning {
    fn default() -> Self {
        Self {
            seek_ratio: 10,
            dense_min_docs: 5000,
            dense_fill_ratio: 0.9,
            max_passage_missing: 9,
            passage_base_window: 100,
            passage_window_per_term: 25,
            proximity_scaling: 4.0,
            proximity_saturation: 4.0,
        }
    }
}

/// Query-wide configuration propagated to every node of a query tree.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    /// Weighting model for scored evaluation.
    pub weighting: WeightingKind,
    /// Whether term lookups are case sensitive.
    pub case_sensitive: bool,
    /// `false` evaluates the whole tree as boolean membership.
    pub scored: bool,
    /// Divide scores by the root of the summed squared query weights.
    pub normalize: bool,
    /// Also look up stemmed variants of every term.
    pub stem: bool,
    /// Restrict term matches to these fields. Empty means all fields.
    pub search_fields: Vec<String>,
    /// Window used by `Near` when the query gives none.
    pub default_near_window: u32,
    /// Engine tuning constants.
    pub tuning: EvalTuning,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            weighting: WeightingKind::TfIdf,
            case_sensitive: false,
            scored: true,
            normalize: true,
            stem: false,
            search_fields: Vec::new(),
            default_near_window: 10,
            tuning: EvalTuning::default(),
        }
    }
}

impl QueryConfig {
    /// Creates a configuration for pure boolean retrieval.
    pub fn boolean() -> Self {
        Self {
            scored: false,
            normalize: false,
            ..Self::default()
        }
    }

    /// Creates a configuration for ranked retrieval with the given model.
    pub fn ranked(weighting: WeightingKind) -> Self {
        Self {
            weighting,
            ..Self::default()
        }
    }

    /// Adds a field to the set of fields terms must occur in.
    pub fn add_search_field(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.search_fields.contains(&name) {
            self.search_fields.push(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_ordering() {
        assert!(FieldValue::Int(1) < FieldValue::Int(2));
        assert!(FieldValue::Float(-0.5) < FieldValue::Float(0.5));
        assert!(FieldValue::Str("apple".into()) < FieldValue::Str("banana".into()));
        // Mixed types order by type rank.
        assert!(FieldValue::Int(100) < FieldValue::Str("a".into()));
        assert_eq!(FieldValue::Float(1.0), FieldValue::Float(1.0));
    }

    #[test]
    fn parse_int_and_float() {
        assert_eq!(
            FieldValue::parse("size", FieldType::Int, " 42 ").unwrap(),
            FieldValue::Int(42)
        );
        assert_eq!(
            FieldValue::parse("ratio", FieldType::Float, "0.25").unwrap(),
            FieldValue::Float(0.25)
        );
        assert!(matches!(
            FieldValue::parse("size", FieldType::Int, "forty"),
            Err(QueryError::MalformedValue { .. })
        ));
    }

    #[test]
    fn parse_dates() {
        let d = FieldValue::parse("date", FieldType::Date, "2024-03-05").unwrap();
        assert_eq!(d.to_string(), "2024-03-05 00:00:00");

        let dt = FieldValue::parse("date", FieldType::Date, "2024-03-05 13:45:10").unwrap();
        assert_eq!(dt.to_string(), "2024-03-05 13:45:10");

        let t = FieldValue::parse("date", FieldType::Date, "2024-03-05T01:02:03").unwrap();
        assert_eq!(t.to_string(), "2024-03-05 01:02:03");

        assert!(FieldValue::parse("date", FieldType::Date, "05/03/2024").is_err());
    }

    #[test]
    fn field_op_from_str() {
        assert_eq!("<=".parse::<FieldOp>().unwrap(), FieldOp::LessEqual);
        assert_eq!("Substring".parse::<FieldOp>().unwrap(), FieldOp::Substring);
        assert!("~".parse::<FieldOp>().is_err());
        assert!(FieldOp::Starts.is_pattern());
        assert!(!FieldOp::Range.is_pattern());
        assert!(FieldOp::Less.is_upper_bound());
        assert!(FieldOp::GreaterEqual.is_lower_bound());
    }

    #[test]
    fn weighting_kind_from_str() {
        assert_eq!("TFIDF".parse::<WeightingKind>().unwrap(), WeightingKind::TfIdf);
        assert_eq!("bm25".parse::<WeightingKind>().unwrap(), WeightingKind::Okapi);
        assert_eq!("tf".parse::<WeightingKind>().unwrap(), WeightingKind::Tf);
        assert!("cosine".parse::<WeightingKind>().is_err());
    }

    #[test]
    fn config_presets() {
        let config = QueryConfig::default();
        assert!(config.scored);
        assert_eq!(config.tuning.seek_ratio, 10);
        assert_eq!(config.tuning.dense_min_docs, 5000);

        let boolean = QueryConfig::boolean();
        assert!(!boolean.scored);
        assert!(!boolean.normalize);

        let okapi = QueryConfig::ranked(WeightingKind::Okapi);
        assert_eq!(okapi.weighting, WeightingKind::Okapi);
    }

    #[test]
    fn add_search_field_dedupes() {
        let mut config = QueryConfig::default();
        config.add_search_field("title");
        config.add_search_field("title");
        config.add_search_field("body");
        assert_eq!(config.search_fields, vec!["title", "body"]);
    }

    #[test]
    fn error_display() {
        let err = QueryError::MalformedValue {
            field: "date".into(),
            value: "yesterday".into(),
        };
        assert_eq!(err.to_string(), "malformed value \"yesterday\" for field date");
        assert_eq!(
            QueryError::UnknownField("color".into()).to_string(),
            "unknown field: color"
        );
    }
}
