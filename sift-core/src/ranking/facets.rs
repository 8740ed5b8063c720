use binary_heap_plus::BinaryHeap;
use log::warn;
use sift_types::FieldValue;
use std::ops::Bound;

use super::result_set::ResultSet;

/// How [`ResultSet::top_facets`] orders facet values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacetOrder {
    /// Most documents first, ties by ascending value.
    #[default]
    Count,
    /// Ascending value.
    Value,
}

/// Number of result documents carrying one field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetCount {
    pub value: FieldValue,
    pub count: usize,
}

impl ResultSet<'_> {
    /// The `n` most relevant values of `field` among the results.
    ///
    /// Each partition yields its counts in ascending value order; the lists
    /// are heap-merged so equal values from different partitions combine
    /// without a global sort.
    pub fn top_facets(&self, field: &str, n: usize, order: FacetOrder) -> Vec<FacetCount> {
        let mut lists: Vec<Vec<FacetCount>> = Vec::new();
        for (partition, result) in self.live() {
            let Some(info) = partition.field(field).filter(|f| f.saved) else {
                continue;
            };
            let deleted = partition.deleted();
            let counts: Vec<FacetCount> = partition
                .field_range(info.id, Bound::Unbounded, Bound::Unbounded)
                .filter_map(|entry| {
                    let count = entry
                        .docs
                        .iter()
                        .filter(|&&doc| result.group.contains(doc))
                        .filter(|&&doc| deleted.map_or(true, |d| !d.is_deleted(doc)))
                        .count();
                    (count > 0).then(|| FacetCount {
                        value: entry.value.clone(),
                        count,
                    })
                })
                .collect();
            lists.push(counts);
        }
        if lists.is_empty() {
            warn!("facet field {field} is not saved in any result partition");
            return Vec::new();
        }

        let mut merged = merge_counts(&lists);
        if order == FacetOrder::Count {
            merged.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        }
        merged.truncate(n);
        merged
    }
}

/// K-way merge of ascending per-partition lists, adding counts of equal
/// values.
fn merge_counts(lists: &[Vec<FacetCount>]) -> Vec<FacetCount> {
    // (value, list, position) with the smallest value on top
    type Head<'a> = (&'a FieldValue, usize, usize);
    let mut heap = BinaryHeap::new_by(|a: &Head<'_>, b: &Head<'_>| {
        b.0.cmp(a.0).then_with(|| b.1.cmp(&a.1))
    });
    for (i, list) in lists.iter().enumerate() {
        if let Some(first) = list.first() {
            heap.push((&first.value, i, 0));
        }
    }

    let mut out: Vec<FacetCount> = Vec::new();
    while let Some((value, list, pos)) = heap.pop() {
        let count = lists[list][pos].count;
        match out.last_mut() {
            Some(last) if last.value == *value => last.count += count,
            _ => out.push(FacetCount {
                value: value.clone(),
                count,
            }),
        }
        if let Some(next) = lists[list].get(pos + 1) {
            heap.push((&next.value, list, pos + 1));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryPartition, MemoryPartitionBuilder};
    use crate::partition::Partition;
    use crate::query::{QueryElement, QueryEvaluator};
    use crate::ranking::SortSpec;
    use sift_types::{FieldType, QueryConfig};

    fn shop(name: &str, items: &[(&str, &str)]) -> MemoryPartition {
        let mut b = MemoryPartitionBuilder::new(name);
        b.define_field("color", FieldType::Str);
        for (text, color) in items {
            let doc = b.add(text);
            b.save_literal(doc, "color", color).unwrap();
        }
        b.build()
    }

    fn facets(order: FacetOrder, n: usize) -> Vec<(String, usize)> {
        let a = shop("a", &[("shirt", "red"), ("shirt", "blue"), ("hat", "red"), ("shirt", "red")]);
        let b = shop("b", &[("shirt", "green"), ("shirt", "blue"), ("shirt", "blue")]);
        let parts: [&dyn Partition; 2] = [&a, &b];
        let query = QueryElement::term("shirt");
        let evaluator = QueryEvaluator::new(QueryConfig::boolean());
        let stats = evaluator.stats(&parts, &query);
        let rs = ResultSet::new(&evaluator, &query, &stats, &parts, SortSpec::default());
        rs.top_facets("color", n, order)
            .into_iter()
            .map(|f| (f.value.to_string(), f.count))
            .collect()
    }

    #[test]
    fn counts_merge_across_partitions() {
        assert_eq!(
            facets(FacetOrder::Count, 10),
            vec![("blue".to_string(), 3), ("red".to_string(), 2), ("green".to_string(), 1)]
        );
        assert_eq!(
            facets(FacetOrder::Value, 2),
            vec![("blue".to_string(), 3), ("green".to_string(), 1)]
        );
    }

    #[test]
    fn unsaved_field_has_no_facets() {
        let a = shop("a", &[("shirt", "red")]);
        let parts: [&dyn Partition; 1] = [&a];
        let query = QueryElement::term("shirt");
        let evaluator = QueryEvaluator::new(QueryConfig::boolean());
        let stats = evaluator.stats(&parts, &query);
        let rs = ResultSet::new(&evaluator, &query, &stats, &parts, SortSpec::default());
        assert!(rs.top_facets("size", 5, FacetOrder::Count).is_empty());
    }
}
