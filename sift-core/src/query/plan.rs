//! Binding a query tree to one partition.
//!
//! Binding resolves dictionary entries and fields, estimates every node's
//! result size and fixes the evaluation order of operands. Estimates never
//! fall below the true result size; AND-like operands are ordered cheapest
//! first.

use log::trace;
use smallvec::SmallVec;
use sift_types::{FieldId, QueryConfig, Result};

use super::field::{self, BoundField};
use super::term::resolve_entries;
use super::{DictTerm, QueryElement};
use crate::arena::{Span, SpanArena};
use crate::partition::{DictEntry, Partition};

pub(crate) type NodeId = u32;

#[derive(Debug)]
pub(crate) struct Node<'q> {
    pub elem: &'q QueryElement,
    /// The term a term node (or a multi-term's sub-node) stands for.
    pub term: Option<&'q DictTerm>,
    pub estimate: usize,
    /// Operands in evaluation order. For proximity nodes, the non-term
    /// operands only.
    pub children: Span,
    /// Proximity term operands, in query order.
    pub terms: Span,
    /// Dictionary entries of a term, ascending by document frequency.
    pub entries: Span,
    pub field: Option<usize>,
}

/// A query tree bound to one partition.
#[derive(Debug)]
pub(crate) struct Plan<'q> {
    nodes: Vec<Node<'q>>,
    children: SpanArena<NodeId>,
    entries: SpanArena<DictEntry>,
    fields: Vec<BoundField>,
    /// `None` when terms may match in any field.
    pub search_fields: Option<SmallVec<[FieldId; 4]>>,
    pub root: NodeId,
}

impl<'q> Plan<'q> {
    /// # Errors
    ///
    /// Propagates programmer errors found while binding field terms.
    pub fn bind(
        query: &'q QueryElement,
        partition: &dyn Partition,
        config: &QueryConfig,
    ) -> Result<Self> {
        let search_fields = if config.search_fields.is_empty() {
            None
        } else {
            Some(
                config
                    .search_fields
                    .iter()
                    .filter_map(|name| partition.field(name))
                    .filter(|f| f.indexed)
                    .map(|f| f.id)
                    .collect(),
            )
        };
        let mut plan = Plan {
            nodes: Vec::new(),
            children: SpanArena::new(),
            entries: SpanArena::new(),
            fields: Vec::new(),
            search_fields,
            root: 0,
        };
        plan.root = plan.bind_node(query, partition, config)?;
        trace!(
            "bound {} nodes to partition {}, root estimate {}",
            plan.nodes.len(),
            partition.name(),
            plan.node(plan.root).estimate
        );
        Ok(plan)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node<'q> {
        &self.nodes[id as usize]
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(self.node(id).children)
    }

    #[inline]
    pub fn terms(&self, id: NodeId) -> &[NodeId] {
        self.children.get(self.node(id).terms)
    }

    #[inline]
    pub fn entries(&self, id: NodeId) -> &[DictEntry] {
        self.entries.get(self.node(id).entries)
    }

    pub fn field(&self, id: NodeId) -> Option<&BoundField> {
        self.node(id).field.map(|i| &self.fields[i])
    }

    fn push(&mut self, node: Node<'q>) -> NodeId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeId
    }

    fn leaf(elem: &'q QueryElement, estimate: usize) -> Node<'q> {
        Node {
            elem,
            term: None,
            estimate,
            children: Span::EMPTY,
            terms: Span::EMPTY,
            entries: Span::EMPTY,
            field: None,
        }
    }

    fn bind_all(
        &mut self,
        operands: &'q [QueryElement],
        partition: &dyn Partition,
        config: &QueryConfig,
    ) -> Result<Vec<NodeId>> {
        operands
            .iter()
            .map(|op| self.bind_node(op, partition, config))
            .collect()
    }

    /// Stable sort by ascending estimate.
    fn sort_by_estimate(&self, ids: &mut [NodeId]) {
        ids.sort_by_key(|&id| self.node(id).estimate);
    }

    fn bind_node(
        &mut self,
        elem: &'q QueryElement,
        partition: &dyn Partition,
        config: &QueryConfig,
    ) -> Result<NodeId> {
        let max_doc = partition.max_doc_id() as usize;
        let node = match elem {
            QueryElement::Term(term) if term.is_match_all() => Self::leaf(elem, max_doc),
            QueryElement::Term(term) => {
                let entries = resolve_entries(partition, term, config);
                let estimate = entries
                    .iter()
                    .map(|e| e.doc_freq as usize)
                    .sum::<usize>()
                    .min(max_doc);
                Node {
                    term: Some(term),
                    entries: self.entries.push_iter(entries),
                    ..Self::leaf(elem, estimate)
                }
            }
            QueryElement::MultiTerm(multi) => {
                let mut ids = Vec::with_capacity(multi.terms.len());
                let mut estimate = 0usize;
                for term in &multi.terms {
                    let entries = resolve_entries(partition, term, config);
                    let est = entries.iter().map(|e| e.doc_freq as usize).sum::<usize>();
                    estimate += est;
                    let entries = self.entries.push_iter(entries);
                    let id = self.push(Node {
                        term: Some(term),
                        entries,
                        ..Self::leaf(elem, est.min(max_doc))
                    });
                    ids.push(id);
                }
                Node {
                    children: self.children.push_slice(&ids),
                    ..Self::leaf(elem, estimate.min(max_doc))
                }
            }
            QueryElement::Field(term) => {
                let bound = field::bind(term, partition, config)?;
                let estimate = bound.estimate(partition).min(max_doc);
                self.fields.push(bound);
                Node {
                    field: Some(self.fields.len() - 1),
                    ..Self::leaf(elem, estimate)
                }
            }
            QueryElement::And(operands) => {
                let mut ids = self.bind_all(operands, partition, config)?;
                self.sort_by_estimate(&mut ids);
                let estimate = ids
                    .iter()
                    .map(|&id| self.node(id).estimate)
                    .min()
                    .unwrap_or(max_doc);
                Node {
                    children: self.children.push_slice(&ids),
                    ..Self::leaf(elem, estimate)
                }
            }
            QueryElement::Or(operands) => {
                let mut ids = self.bind_all(operands, partition, config)?;
                self.sort_by_estimate(&mut ids);
                let estimate = ids
                    .iter()
                    .map(|&id| self.node(id).estimate)
                    .sum::<usize>()
                    .min(max_doc);
                Node {
                    children: self.children.push_slice(&ids),
                    ..Self::leaf(elem, estimate)
                }
            }
            QueryElement::Not(operand) => {
                let id = self.bind_node(operand, partition, config)?;
                Node {
                    children: self.children.push_slice(&[id]),
                    ..Self::leaf(elem, max_doc)
                }
            }
            QueryElement::If(operand) | QueryElement::Weight { operand, .. } => {
                let id = self.bind_node(operand, partition, config)?;
                Node {
                    children: self.children.push_slice(&[id]),
                    ..Self::leaf(elem, self.node(id).estimate)
                }
            }
            QueryElement::Proximity(prox) => {
                let mut terms = Vec::new();
                let mut filters = Vec::new();
                for op in &prox.operands {
                    let id = self.bind_node(op, partition, config)?;
                    if op.is_positional() {
                        terms.push(id);
                    } else {
                        filters.push(id);
                    }
                }
                self.sort_by_estimate(&mut filters);

                let cap = filters
                    .first()
                    .map_or(max_doc, |&id| self.node(id).estimate);
                let term_estimates = terms.iter().map(|&id| self.node(id).estimate);
                let rule = prox.rule(terms.len(), config);
                let from_terms = if terms.is_empty() {
                    max_doc
                } else if rule.max_missing == 0 {
                    term_estimates.min().unwrap_or(max_doc)
                } else {
                    term_estimates.sum::<usize>().min(max_doc)
                };
                Node {
                    children: self.children.push_slice(&filters),
                    terms: self.children.push_slice(&terms),
                    ..Self::leaf(elem, cap.min(from_terms))
                }
            }
            QueryElement::Undefined(_) => Self::leaf(elem, max_doc),
        };
        Ok(self.push(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPartitionBuilder;
    use sift_types::FieldOp;

    fn partition() -> crate::memory::MemoryPartition {
        let mut b = MemoryPartitionBuilder::new("p");
        for text in ["rare common", "common", "common other", "common"] {
            b.add(text);
        }
        b.build()
    }

    #[test]
    fn and_operands_sorted_cheapest_first() {
        let p = partition();
        let q = QueryElement::and(vec![
            QueryElement::term("common"),
            QueryElement::term("rare"),
            QueryElement::term("missing"),
        ]);
        let plan = Plan::bind(&q, &p, &QueryConfig::default()).unwrap();
        let order: Vec<usize> = plan
            .children(plan.root)
            .iter()
            .map(|&c| plan.node(c).estimate)
            .collect();
        assert_eq!(order, vec![0, 1, 4]);
        assert_eq!(plan.node(plan.root).estimate, 0);
    }

    #[test]
    fn estimates_never_undercount() {
        let p = partition();
        let q = QueryElement::or(vec![
            QueryElement::term("common"),
            QueryElement::term("other"),
        ]);
        let plan = Plan::bind(&q, &p, &QueryConfig::default()).unwrap();
        assert_eq!(plan.node(plan.root).estimate, 4);

        let q = QueryElement::not(QueryElement::term("rare"));
        let plan = Plan::bind(&q, &p, &QueryConfig::default()).unwrap();
        assert_eq!(plan.node(plan.root).estimate, 4);
    }

    #[test]
    fn proximity_splits_terms_and_filters() {
        let p = partition();
        let q = QueryElement::near(
            Some(3),
            vec![
                QueryElement::term("common"),
                QueryElement::field("missing", FieldOp::Equal, "x"),
                QueryElement::term("rare"),
            ],
        );
        let plan = Plan::bind(&q, &p, &QueryConfig::default()).unwrap();
        let names: Vec<&str> = plan
            .terms(plan.root)
            .iter()
            .map(|&t| plan.entries(t)[0].name.as_str())
            .collect();
        assert_eq!(names, vec!["common", "rare"]);
        assert_eq!(plan.children(plan.root).len(), 1);
        // the unknown field caps the estimate at zero
        assert_eq!(plan.node(plan.root).estimate, 0);
    }

    #[test]
    fn search_fields_resolve_per_partition() {
        let p = partition();
        let mut config = QueryConfig::default();
        config.add_search_field("title");
        let q = QueryElement::term("rare");
        let plan = Plan::bind(&q, &p, &config).unwrap();
        assert_eq!(plan.search_fields.as_deref(), Some(&[][..]));

        config.add_search_field("body");
        let plan = Plan::bind(&q, &p, &config).unwrap();
        assert_eq!(plan.search_fields.map(|f| f.len()), Some(1));
    }
}
