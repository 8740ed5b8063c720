//! Walking a bound plan.
//!
//! `eval(node, input, scored)` returns the documents of `node` among the
//! members of `input` (all documents when `input` is `None`). Results never
//! carry `input`'s scores; callers combine them.

use sift_types::{EvalTuning, FieldId, QueryConfig, Result};

use super::plan::{NodeId, Plan};
use super::QueryElement;
use crate::group::DocGroup;
use crate::partition::{DictEntry, Partition, SavedEntry};
use crate::quick_or::QuickOr;
use crate::weighting::{CollectionStats, WeightingComponents, WeightingFunction};
use std::ops::Bound;

/// Per-partition evaluation state. Owned by one evaluation; the weighting
/// components are mutated on every posting.
pub(crate) struct EvalContext<'a> {
    pub partition: &'a dyn Partition,
    pub config: &'a QueryConfig,
    pub stats: &'a CollectionStats,
    pub weighting: &'a dyn WeightingFunction,
    pub components: WeightingComponents,
    /// Dictionary entries whose postings were read.
    pub used: Vec<DictEntry>,
}

pub(crate) struct Evaluation<'p, 'q, 'a> {
    pub plan: &'p Plan<'q>,
    pub ctx: EvalContext<'a>,
}

impl<'p, 'q, 'a> Evaluation<'p, 'q, 'a> {
    pub fn new(
        plan: &'p Plan<'q>,
        partition: &'a dyn Partition,
        config: &'a QueryConfig,
        stats: &'a CollectionStats,
        weighting: &'a dyn WeightingFunction,
    ) -> Self {
        Self {
            plan,
            ctx: EvalContext {
                partition,
                config,
                stats,
                weighting,
                components: WeightingComponents::new(stats),
                used: Vec::new(),
            },
        }
    }

    /// Evaluates the whole plan with no input restriction.
    pub fn run(&mut self) -> Result<DocGroup> {
        let scored = self.ctx.config.scored;
        self.eval(self.plan.root, None, scored)
    }

    /// Used dictionary entries, deduplicated.
    pub fn into_used(self) -> Vec<DictEntry> {
        let mut used = self.ctx.used;
        used.sort_unstable_by_key(|e| e.id);
        used.dedup_by_key(|e| e.id);
        used
    }

    pub fn eval(&mut self, id: NodeId, input: Option<&DocGroup>, scored: bool) -> Result<DocGroup> {
        let plan = self.plan;
        let node = plan.node(id);
        match node.elem {
            QueryElement::Term(t) if t.is_match_all() => Ok(restrict(DocGroup::all(), input)),
            QueryElement::Term(_) => Ok(self.eval_term(id, input, scored)),
            QueryElement::MultiTerm(_) => {
                let mut acc = empty(scored);
                for &child in plan.children(id) {
                    let r = self.eval_term(child, input, scored);
                    acc = acc.union(&r);
                }
                Ok(acc)
            }
            QueryElement::Field(_) => {
                let r = self.eval_field(id, scored)?;
                Ok(restrict(r, input))
            }
            QueryElement::And(_) => self.eval_and(id, input, scored),
            QueryElement::Or(_) => {
                let mut acc: Option<DocGroup> = None;
                for &child in plan.children(id) {
                    let r = self.eval(child, input, scored)?;
                    acc = Some(match acc {
                        None => r,
                        Some(a) => a.union(&r),
                    });
                }
                Ok(acc.unwrap_or_else(|| empty(scored)))
            }
            QueryElement::Not(_) => {
                let child = self.eval(plan.children(id)[0], input, false)?;
                Ok(restrict(child.negate(), input))
            }
            QueryElement::If(_) => self.eval(plan.children(id)[0], input, false),
            QueryElement::Weight { factor, .. } => {
                let mut r = self.eval(plan.children(id)[0], input, scored)?;
                r.mult(*factor);
                Ok(r)
            }
            QueryElement::Proximity(prox) => self.eval_proximity(id, prox, input, scored),
            QueryElement::Undefined(field) => Ok(restrict(self.eval_undefined(field), input)),
        }
    }

    fn eval_and(&mut self, id: NodeId, input: Option<&DocGroup>, scored: bool) -> Result<DocGroup> {
        let plan = self.plan;
        let mut acc: Option<DocGroup> = None;
        for &child in plan.children(id) {
            let r = self.eval(child, acc.as_ref().or(input), scored)?;
            let next = match acc {
                None => r,
                Some(a) => a.intersect(&r),
            };
            if next.is_empty() {
                return Ok(next);
            }
            acc = Some(next);
        }
        Ok(match acc {
            Some(group) => group,
            None => restrict(DocGroup::all(), input),
        })
    }

    /// All documents without a saved value for `field`. A field that is
    /// unknown, unsaved or has no values here yields every document.
    fn eval_undefined(&self, field: &str) -> DocGroup {
        let partition = self.ctx.partition;
        let Some(info) = partition.field(field).filter(|f| f.saved) else {
            return DocGroup::all();
        };
        DocGroup::Negative(saved_docs(partition, info.id, &self.ctx.config.tuning).into_group())
    }
}

/// Accumulates every document with a saved value for `field`, sized by the
/// exact number of such postings.
fn saved_docs(partition: &dyn Partition, field: FieldId, tuning: &EvalTuning) -> QuickOr {
    let entries: Vec<SavedEntry<'_>> = partition
        .field_range(field, Bound::Unbounded, Bound::Unbounded)
        .collect();
    let total = entries.iter().map(|e| e.docs.len()).sum();
    let mut or = QuickOr::new(partition.n_docs(), partition.max_doc_id(), total, tuning);
    for entry in &entries {
        or.add_docs(entry.docs);
    }
    or
}

/// Boolean membership view of a group: positive groups lose their scores.
pub(crate) fn membership(group: &DocGroup) -> DocGroup {
    match group {
        DocGroup::Negative(_) => group.clone(),
        other => DocGroup::Strict(crate::group::ArrayGroup::from_sorted(other.docs().to_vec())),
    }
}

/// Restricts a result to the members of `input`, keeping the result's scores.
pub(crate) fn restrict(result: DocGroup, input: Option<&DocGroup>) -> DocGroup {
    match input {
        None => result,
        Some(input) => result.intersect(&membership(input)),
    }
}

pub(crate) fn empty(scored: bool) -> DocGroup {
    if scored {
        DocGroup::Scored(Default::default())
    } else {
        DocGroup::Strict(Default::default())
    }
}
