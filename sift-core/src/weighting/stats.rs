use rustc_hash::FxHashMap;
use sift_types::QueryConfig;

use crate::partition::Partition;
use crate::query::{resolve_entries, QueryElement};

/// Aggregated statistics of one query term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermStats {
    /// Documents containing the term (`ft`).
    pub ft: u32,
    /// Total occurrences (`Ft`).
    pub big_ft: u64,
    /// Largest within-document frequency.
    pub max_fdt: u32,
}

impl TermStats {
    fn merge(&mut self, other: &TermStats) {
        self.ft = self.ft.saturating_add(other.ft);
        self.big_ft = self.big_ft.saturating_add(other.big_ft);
        self.max_fdt = self.max_fdt.max(other.max_fdt);
    }
}

/// Collection totals plus per-term statistics, built once per query and
/// read-only during evaluation.
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    /// Live documents across partitions.
    pub n_docs: u64,
    /// Tokens across partitions.
    pub n_tokens: u64,
    /// `n_tokens / n_docs`, 0 for an empty collection.
    pub avg_doc_len: f32,
    /// Largest `ft` of any term.
    pub max_ft: u32,
    /// Largest `max_fdt` of any term.
    pub max_fdt: u32,
    terms: FxHashMap<String, TermStats>,
}

impl CollectionStats {
    pub fn new(n_docs: u64, n_tokens: u64) -> Self {
        let avg_doc_len = if n_docs > 0 {
            (n_tokens as f64 / n_docs as f64) as f32
        } else {
            0.0
        };
        Self {
            n_docs,
            n_tokens,
            avg_doc_len,
            ..Self::default()
        }
    }

    /// Aggregates totals over the open partitions and statistics for every
    /// term leaf of `query`. A term's variants are summed under the term's
    /// query name.
    pub fn from_partitions(
        partitions: &[&dyn Partition],
        query: &QueryElement,
        config: &QueryConfig,
    ) -> Self {
        let live: Vec<&dyn Partition> = partitions
            .iter()
            .copied()
            .filter(|p| !p.is_closed())
            .collect();
        let n_docs = live.iter().map(|p| p.n_docs() as u64).sum();
        let n_tokens = live.iter().map(|p| p.n_tokens()).sum();
        let mut stats = Self::new(n_docs, n_tokens);

        let terms = query.dict_terms();
        for partition in &live {
            for term in &terms {
                let mut term_stats = TermStats::default();
                for entry in resolve_entries(*partition, term, config) {
                    term_stats.merge(&TermStats {
                        ft: entry.doc_freq,
                        big_ft: entry.total_freq,
                        max_fdt: entry.max_fdt,
                    });
                }
                stats.add_term(&term.name, term_stats);
            }
        }
        stats
    }

    /// Merges statistics into a term's entry.
    pub fn add_term(&mut self, name: &str, term: TermStats) {
        let entry = self.terms.entry(name.to_string()).or_default();
        entry.merge(&term);
        self.max_ft = self.max_ft.max(entry.ft);
        self.max_fdt = self.max_fdt.max(entry.max_fdt);
    }

    /// Statistics of a term; zeros if the term is unknown.
    pub fn term(&self, name: &str) -> TermStats {
        self.terms.get(name).copied().unwrap_or_default()
    }

    /// Number of terms with statistics.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPartitionBuilder;

    #[test]
    fn add_term_merges() {
        let mut stats = CollectionStats::new(10, 55);
        assert_eq!(stats.avg_doc_len, 5.5);
        stats.add_term(
            "cat",
            TermStats {
                ft: 2,
                big_ft: 3,
                max_fdt: 2,
            },
        );
        stats.add_term(
            "cat",
            TermStats {
                ft: 1,
                big_ft: 4,
                max_fdt: 4,
            },
        );
        assert_eq!(
            stats.term("cat"),
            TermStats {
                ft: 3,
                big_ft: 7,
                max_fdt: 4
            }
        );
        assert_eq!(stats.max_ft, 3);
        assert_eq!(stats.term("dog"), TermStats::default());
    }

    #[test]
    fn empty_collection_has_zero_average() {
        assert_eq!(CollectionStats::new(0, 0).avg_doc_len, 0.0);
    }

    #[test]
    fn aggregates_across_partitions() {
        let mut a = MemoryPartitionBuilder::new("a");
        a.add("cat dog");
        a.add("cat cat");
        let a = a.build();
        let mut b = MemoryPartitionBuilder::new("b");
        b.add("cat");
        b.add("bird");
        let b = b.build();
        b.close();

        let query = QueryElement::and(vec![QueryElement::term("cat"), QueryElement::term("dog")]);
        let parts: [&dyn Partition; 2] = [&a, &b];
        let stats = CollectionStats::from_partitions(&parts, &query, &QueryConfig::default());

        assert_eq!(stats.n_docs, 2);
        assert_eq!(stats.n_tokens, 4);
        assert_eq!(
            stats.term("cat"),
            TermStats {
                ft: 2,
                big_ft: 3,
                max_fdt: 2
            }
        );
        assert_eq!(stats.term("dog").ft, 1);
        assert_eq!(stats.term_count(), 2);
    }
}
