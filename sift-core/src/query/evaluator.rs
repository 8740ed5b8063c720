use log::debug;
use sift_types::{QueryConfig, Result};

use super::eval::Evaluation;
use super::plan::Plan;
use super::QueryElement;
use crate::group::DocGroup;
use crate::partition::{DictEntry, Partition};
use crate::weighting::{self, CollectionStats, WeightingFunction};

/// Documents one partition contributes to a query's results.
#[derive(Debug, Clone)]
pub struct PartitionResult {
    /// Position of the partition in the evaluated slice.
    pub partition: usize,
    /// Partition name.
    pub name: String,
    /// Matching documents. A negative group for match-all style queries.
    pub group: DocGroup,
    /// Dictionary entries whose postings were read, for highlighting.
    pub used_terms: Vec<DictEntry>,
}

/// Evaluates query trees partition by partition.
///
/// Each partition gets its own plan and weighting scratch state; the query
/// tree and collection statistics are shared read-only.
#[derive(Debug)]
pub struct QueryEvaluator {
    config: QueryConfig,
    weighting: Box<dyn WeightingFunction>,
}

impl QueryEvaluator {
    /// Uses the weighting model named by `config`.
    pub fn new(config: QueryConfig) -> Self {
        let weighting = weighting::for_kind(config.weighting);
        Self { config, weighting }
    }

    /// Uses a caller-supplied weighting model.
    pub fn with_weighting(config: QueryConfig, weighting: Box<dyn WeightingFunction>) -> Self {
        Self { config, weighting }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Statistics of `query`'s terms over the open partitions.
    pub fn stats(&self, partitions: &[&dyn Partition], query: &QueryElement) -> CollectionStats {
        CollectionStats::from_partitions(partitions, query, &self.config)
    }

    /// Evaluates `query` against every open partition, skipping partitions
    /// with no matches and partitions closed during evaluation.
    ///
    /// # Errors
    ///
    /// Propagates programmer errors such as `similar` against a non-string
    /// field.
    pub fn eval(
        &self,
        partitions: &[&dyn Partition],
        query: &QueryElement,
        stats: &CollectionStats,
    ) -> Result<Vec<PartitionResult>> {
        let mut results = Vec::with_capacity(partitions.len());
        for (index, &partition) in partitions.iter().enumerate() {
            if let Some(result) = self.eval_partition(index, partition, query, stats)? {
                results.push(result);
            }
        }
        Ok(results)
    }

    /// Evaluates `query` against one partition. `None` when the partition is
    /// closed or nothing matches.
    pub fn eval_partition(
        &self,
        index: usize,
        partition: &dyn Partition,
        query: &QueryElement,
        stats: &CollectionStats,
    ) -> Result<Option<PartitionResult>> {
        if partition.is_closed() {
            debug!("skipping closed partition {}", partition.name());
            return Ok(None);
        }

        let (mut group, used_terms) = if query.is_match_all() {
            (DocGroup::all(), Vec::new())
        } else {
            let plan = Plan::bind(query, partition, &self.config)?;
            let mut evaluation =
                Evaluation::new(&plan, partition, &self.config, stats, self.weighting.as_ref());
            let group = evaluation.run()?;
            (group, evaluation.into_used())
        };

        if partition.is_closed() {
            debug!("partition {} closed during evaluation", partition.name());
            return Ok(None);
        }
        if let Some(deleted) = partition.deleted() {
            group.remove_deleted(deleted);
        }
        if self.config.normalize {
            group.normalize();
        }
        if group.is_empty() {
            return Ok(None);
        }

        debug!(
            "partition {}: {} matching documents, {} dictionary entries used",
            partition.name(),
            group.count(partition.max_doc_id(), partition.deleted()),
            used_terms.len()
        );
        Ok(Some(PartitionResult {
            partition: index,
            name: partition.name().to_string(),
            group,
            used_terms,
        }))
    }
}
