use log::trace;
use sift_types::FieldOp;

use super::{FieldTerm, QueryElement};

/// Rewrites a query before evaluation.
///
/// Within a top-level `And`, a lower-bound comparison (`>`, `>=`) and an
/// upper-bound comparison (`<`, `<=`) on the same field merge into a single
/// range term, so the field's values are scanned once.
pub fn optimize(query: QueryElement) -> QueryElement {
    match query {
        QueryElement::And(operands) => QueryElement::And(merge_ranges(operands)),
        other => other,
    }
}

fn merge_ranges(operands: Vec<QueryElement>) -> Vec<QueryElement> {
    let mut out: Vec<QueryElement> = Vec::with_capacity(operands.len());
    for operand in operands {
        if let QueryElement::Field(term) = &operand {
            let partner = out.iter().position(|o| pairs_with(o, term));
            if let Some(QueryElement::Field(prev)) = partner.and_then(|i| out.get_mut(i)) {
                trace!("merging {} comparisons into a range", term.field);
                *prev = closed_range(prev, term);
                continue;
            }
        }
        out.push(operand);
    }
    out
}

fn pairs_with(candidate: &QueryElement, term: &FieldTerm) -> bool {
    let QueryElement::Field(other) = candidate else {
        return false;
    };
    other.field == term.field
        && ((other.op.is_lower_bound() && term.op.is_upper_bound())
            || (other.op.is_upper_bound() && term.op.is_lower_bound()))
}

fn closed_range(a: &FieldTerm, b: &FieldTerm) -> FieldTerm {
    let (lower, upper) = if a.op.is_lower_bound() { (a, b) } else { (b, a) };
    FieldTerm::range(&lower.field, &lower.value, &upper.value).bounds(
        lower.op == FieldOp::GreaterEqual,
        upper.op == FieldOp::LessEqual,
    )
}
