use binary_heap_plus::BinaryHeap;
use log::{debug, error};
use sift_types::{DocId, Score};

use super::sort::{ResultHit, SortSpec};
use crate::partition::{DictEntry, Partition};
use crate::query::{PartitionResult, QueryElement, QueryEvaluator};
use crate::weighting::CollectionStats;

/// The evaluated results of a query across partitions.
///
/// Evaluation happens once, in [`ResultSet::new`]; paging merges the
/// per-partition groups on demand without sorting everything.
pub struct ResultSet<'p> {
    pub(super) partitions: Vec<&'p dyn Partition>,
    pub(super) results: Vec<PartitionResult>,
    spec: SortSpec,
}

impl<'p> ResultSet<'p> {
    /// Evaluates `query` over `partitions`. An evaluation error is logged and
    /// leaves the result set empty.
    pub fn new(
        evaluator: &QueryEvaluator,
        query: &QueryElement,
        stats: &CollectionStats,
        partitions: &[&'p dyn Partition],
        spec: SortSpec,
    ) -> Self {
        let results = match evaluator.eval(partitions, query, stats) {
            Ok(results) => results,
            Err(err) => {
                error!("query evaluation failed: {err}");
                Vec::new()
            }
        };
        Self::from_results(partitions, results, spec)
    }

    /// Wraps already evaluated per-partition results.
    pub fn from_results(
        partitions: &[&'p dyn Partition],
        results: Vec<PartitionResult>,
        spec: SortSpec,
    ) -> Self {
        Self {
            partitions: partitions.to_vec(),
            results,
            spec,
        }
    }

    pub fn spec(&self) -> &SortSpec {
        &self.spec
    }

    pub fn partition_results(&self) -> &[PartitionResult] {
        &self.results
    }

    /// Number of matching documents in partitions that are still open.
    pub fn size(&self) -> usize {
        self.live()
            .map(|(partition, result)| {
                result
                    .group
                    .count(partition.max_doc_id(), partition.deleted())
            })
            .sum()
    }

    /// Dictionary entries read during evaluation, per partition name.
    pub fn used_terms(&self) -> impl Iterator<Item = (&str, &[DictEntry])> + '_ {
        self.results
            .iter()
            .map(|r| (r.name.as_str(), r.used_terms.as_slice()))
    }

    /// Hits `start..start + n` in sort order.
    pub fn get_results(&self, start: usize, n: usize) -> Vec<ResultHit> {
        let k = start.saturating_add(n);
        if k == 0 {
            return Vec::new();
        }
        let spec = &self.spec;
        // the heap's top is the worst kept hit
        let mut heap = BinaryHeap::from_vec_cmp(
            Vec::with_capacity(k.min(1024) + 1),
            |a: &ResultHit, b: &ResultHit| spec.compare(a, b),
        );
        for (partition, result) in self.live() {
            let bound = spec.specialize(partition);
            self.for_each_member(partition, result, |doc, score| {
                let hit = bound.hit(result.partition, partition, doc, score);
                if heap.len() < k {
                    heap.push(hit);
                } else if let Some(mut worst) = heap.peek_mut() {
                    if spec.compare(&hit, &worst).is_lt() {
                        *worst = hit;
                    }
                }
            });
        }
        let hits = heap.into_sorted_vec();
        debug!("ranked page {start}+{n}: {} hits", hits.len().saturating_sub(start));
        hits.into_iter().skip(start).collect()
    }

    /// Every hit, in sort order when `sorted`, otherwise by partition and
    /// document.
    pub fn get_all_results(&self, sorted: bool) -> Vec<ResultHit> {
        let mut hits = Vec::new();
        for (partition, result) in self.live() {
            let bound = self.spec.specialize(partition);
            self.for_each_member(partition, result, |doc, score| {
                hits.push(bound.hit(result.partition, partition, doc, score));
            });
        }
        if sorted {
            hits.sort_by(|a, b| self.spec.compare(a, b));
        }
        hits
    }

    /// Open partitions with their results.
    pub(super) fn live(&self) -> impl Iterator<Item = (&'p dyn Partition, &PartitionResult)> + '_ {
        self.results.iter().filter_map(|r| {
            let partition = *self.partitions.get(r.partition)?;
            (!partition.is_closed()).then_some((partition, r))
        })
    }

    fn for_each_member(
        &self,
        partition: &dyn Partition,
        result: &PartitionResult,
        mut f: impl FnMut(DocId, Score),
    ) {
        let group = &result.group;
        if group.is_negative() {
            for doc in group.materialize(partition.max_doc_id(), partition.deleted()) {
                f(doc, 0.0);
            }
            return;
        }
        let deleted = partition.deleted();
        for (doc, score) in group.iter() {
            if deleted.map_or(false, |d| d.is_deleted(doc)) {
                continue;
            }
            f(doc, score);
        }
    }
}
