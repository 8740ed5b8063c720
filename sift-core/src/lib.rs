//! Query evaluation core for a partitioned full-text index.
//!
//! Queries are trees of [`QueryElement`]s. A [`QueryEvaluator`] binds a tree
//! to each [`Partition`], evaluates it bottom-up into a [`DocGroup`] and
//! scores matches with a pluggable [`WeightingFunction`]. A [`ResultSet`]
//! merges the per-partition groups into ranked pages and facet counts.
//!
//! ```
//! use sift_core::{MemoryPartitionBuilder, Partition, QueryElement, QueryEvaluator, ResultSet, SortSpec};
//! use sift_core::{QueryConfig, WeightingKind};
//!
//! let mut builder = MemoryPartitionBuilder::new("pets");
//! builder.add("the cat sat on the mat");
//! builder.add("a dog and a cat");
//! builder.add("the dog barked");
//! let partition = builder.build();
//!
//! let query = QueryElement::and(vec![QueryElement::term("cat"), QueryElement::term("dog")]);
//! let evaluator = QueryEvaluator::new(QueryConfig::ranked(WeightingKind::Okapi));
//! let partitions: [&dyn Partition; 1] = [&partition];
//! let stats = evaluator.stats(&partitions, &query);
//! let results = ResultSet::new(&evaluator, &query, &stats, &partitions, SortSpec::by_score());
//!
//! let hits = results.get_results(0, 10);
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].doc, 2);
//! ```

pub mod arena;
pub mod group;
pub mod memory;
pub mod partition;
pub mod postings;
pub mod query;
pub mod quick_or;
pub mod ranking;
pub mod weighting;

pub use group::DocGroup;
pub use memory::{MemoryPartition, MemoryPartitionBuilder};
pub use partition::{DictEntry, FieldInfo, Lookup, Partition, SavedEntry};
pub use postings::{DeletionMap, PostingsIterator, VecPostings, TERMINATED};
pub use query::{
    optimize, DictTerm, FieldTerm, MultiDictTerm, PartitionResult, Proximity, ProximityKind,
    QueryElement, QueryEvaluator,
};
pub use quick_or::{QuickOr, ScoredQuickOr};
pub use ranking::{FacetCount, FacetOrder, ResultHit, ResultSet, SortKey, SortSpec};
pub use weighting::{CollectionStats, TermStats, WeightingFunction};

pub use sift_types::{
    Direction, DocId, EvalTuning, FieldId, FieldOp, FieldType, FieldValue, QueryConfig,
    QueryError, Result, Score, WeightingKind,
};
