//! Query trees and their evaluation.
//!
//! A [`QueryElement`] tree is immutable once built. Evaluating it against a
//! partition first binds it into a [`plan::Plan`] (dictionary entries,
//! resolved fields, size estimates and operand order for that partition) and
//! then walks the plan, producing a [`crate::group::DocGroup`]. Nothing in
//! the tree is mutated, so one tree can be evaluated against many partitions
//! at once.

mod eval;
mod evaluator;
mod field;
mod optimizer;
mod plan;
mod proximity;
mod term;

pub use evaluator::{PartitionResult, QueryEvaluator};
pub use optimizer::optimize;
pub use proximity::{WindowMatch, WindowRule};
pub(crate) use term::resolve_entries;

use sift_types::{FieldOp, QueryConfig, Score};

/// A single query token, possibly expanded to several dictionary entries.
#[derive(Debug, Clone, PartialEq)]
pub struct DictTerm {
    /// The token as written in the query. Statistics are keyed by it.
    pub name: String,
    /// Extra forms (morphological variants) looked up alongside `name`.
    pub variants: Vec<String>,
    /// Relative importance of the term in the query.
    pub query_weight: f32,
}

impl DictTerm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
            query_weight: 1.0,
        }
    }

    pub fn weight(mut self, query_weight: f32) -> Self {
        self.query_weight = query_weight;
        self
    }

    pub fn variant(mut self, form: impl Into<String>) -> Self {
        self.variants.push(form.into());
        self
    }

    /// `name` followed by the variants.
    pub fn forms(&self) -> impl Iterator<Item = &str> {
        core::iter::once(self.name.as_str()).chain(self.variants.iter().map(String::as_str))
    }

    /// Returns `true` for a token made only of `*`.
    pub fn is_match_all(&self) -> bool {
        !self.name.is_empty() && self.name.bytes().all(|b| b == b'*')
    }
}

/// Several terms evaluated as one: their postings are ORed and each keeps
/// its own statistics and query weight.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiDictTerm {
    pub terms: Vec<DictTerm>,
}

/// A comparison against a saved field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTerm {
    /// Field name.
    pub field: String,
    /// Comparison.
    pub op: FieldOp,
    /// Literal compared against; the lower bound for [`FieldOp::Range`].
    pub value: String,
    /// Upper bound for [`FieldOp::Range`].
    pub upper: Option<String>,
    /// Whether a range includes its lower bound.
    pub lower_inclusive: bool,
    /// Whether a range includes its upper bound.
    pub upper_inclusive: bool,
}

impl FieldTerm {
    pub fn new(field: impl Into<String>, op: FieldOp, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
            upper: None,
            lower_inclusive: true,
            upper_inclusive: true,
        }
    }

    /// Closed interval `[lower, upper]`.
    pub fn range(
        field: impl Into<String>,
        lower: impl Into<String>,
        upper: impl Into<String>,
    ) -> Self {
        Self {
            upper: Some(upper.into()),
            ..Self::new(field, FieldOp::Range, lower)
        }
    }

    /// Sets which ends of a range are inclusive.
    pub fn bounds(mut self, lower_inclusive: bool, upper_inclusive: bool) -> Self {
        self.lower_inclusive = lower_inclusive;
        self.upper_inclusive = upper_inclusive;
        self
    }
}

/// Which proximity operator a [`Proximity`] node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityKind {
    /// Unordered, within a window (the configured default when `None`).
    Near(Option<u32>),
    /// Ordered, within a window.
    Within(u32),
    /// Adjacent and in order.
    Phrase,
    /// Most terms within a passage-sized window.
    Passage,
    /// Like `Passage`, with every non-term operand required and scored.
    PAnd,
}

/// A proximity operator over term operands and optional filter operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Proximity {
    pub kind: ProximityKind,
    pub operands: Vec<QueryElement>,
}

impl Proximity {
    /// Window rule for this operator over `n_terms` terms.
    pub fn rule(&self, n_terms: usize, config: &QueryConfig) -> WindowRule {
        WindowRule::for_kind(self.kind, n_terms, config)
    }
}

/// A node of a query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryElement {
    Term(DictTerm),
    MultiTerm(MultiDictTerm),
    Field(FieldTerm),
    And(Vec<QueryElement>),
    Or(Vec<QueryElement>),
    /// Complement of the operand, evaluated as boolean membership.
    Not(Box<QueryElement>),
    /// The operand evaluated as boolean membership.
    If(Box<QueryElement>),
    /// The operand with scores multiplied by `factor`.
    Weight {
        factor: Score,
        operand: Box<QueryElement>,
    },
    Proximity(Proximity),
    /// Documents without any saved value for the named field.
    Undefined(String),
}

impl QueryElement {
    pub fn term(name: impl Into<String>) -> Self {
        QueryElement::Term(DictTerm::new(name))
    }

    pub fn multi_term(terms: Vec<DictTerm>) -> Self {
        QueryElement::MultiTerm(MultiDictTerm { terms })
    }

    pub fn field(field: impl Into<String>, op: FieldOp, value: impl Into<String>) -> Self {
        QueryElement::Field(FieldTerm::new(field, op, value))
    }

    pub fn and(operands: Vec<QueryElement>) -> Self {
        QueryElement::And(operands)
    }

    pub fn or(operands: Vec<QueryElement>) -> Self {
        QueryElement::Or(operands)
    }

    pub fn not(operand: QueryElement) -> Self {
        QueryElement::Not(Box::new(operand))
    }

    /// `If`: forces boolean evaluation of `operand`.
    pub fn strict(operand: QueryElement) -> Self {
        QueryElement::If(Box::new(operand))
    }

    pub fn weight(factor: Score, operand: QueryElement) -> Self {
        QueryElement::Weight {
            factor,
            operand: Box::new(operand),
        }
    }

    pub fn proximity(kind: ProximityKind, operands: Vec<QueryElement>) -> Self {
        QueryElement::Proximity(Proximity { kind, operands })
    }

    pub fn near(window: Option<u32>, operands: Vec<QueryElement>) -> Self {
        Self::proximity(ProximityKind::Near(window), operands)
    }

    pub fn within(window: u32, operands: Vec<QueryElement>) -> Self {
        Self::proximity(ProximityKind::Within(window), operands)
    }

    pub fn phrase(operands: Vec<QueryElement>) -> Self {
        Self::proximity(ProximityKind::Phrase, operands)
    }

    pub fn passage(operands: Vec<QueryElement>) -> Self {
        Self::proximity(ProximityKind::Passage, operands)
    }

    pub fn pand(operands: Vec<QueryElement>) -> Self {
        Self::proximity(ProximityKind::PAnd, operands)
    }

    pub fn undefined(field: impl Into<String>) -> Self {
        QueryElement::Undefined(field.into())
    }

    /// Returns `true` for leaves that carry word positions.
    pub fn is_positional(&self) -> bool {
        matches!(self, QueryElement::Term(t) if !t.is_match_all())
            || matches!(self, QueryElement::MultiTerm(_))
    }

    /// Returns `true` for a lone all-wildcard term.
    pub fn is_match_all(&self) -> bool {
        matches!(self, QueryElement::Term(t) if t.is_match_all())
    }

    /// Direct operands.
    pub fn operands(&self) -> &[QueryElement] {
        match self {
            QueryElement::And(v) | QueryElement::Or(v) => v,
            QueryElement::Proximity(p) => &p.operands,
            QueryElement::Not(op)
            | QueryElement::If(op)
            | QueryElement::Weight { operand: op, .. } => core::slice::from_ref(op.as_ref()),
            QueryElement::Term(_)
            | QueryElement::MultiTerm(_)
            | QueryElement::Field(_)
            | QueryElement::Undefined(_) => &[],
        }
    }

    /// Every dictionary term in the tree, in depth-first order.
    pub fn dict_terms(&self) -> Vec<&DictTerm> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<&'a DictTerm>) {
        match self {
            QueryElement::Term(t) => {
                if !t.is_match_all() {
                    out.push(t);
                }
            }
            QueryElement::MultiTerm(m) => out.extend(m.terms.iter()),
            other => {
                for op in other.operands() {
                    op.collect_terms(out);
                }
            }
        }
    }
}
