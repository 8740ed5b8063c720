//! Ranking and browsing evaluated results.
//!
//! A [`ResultSet`] holds one document group per partition. Pages are drawn
//! with a bounded heap ordered by a [`SortSpec`]; facets count saved field
//! values over the matching documents.

mod facets;
mod result_set;
mod sort;

pub use facets::{FacetCount, FacetOrder};
pub use result_set::ResultSet;
pub use sort::{ResultHit, SortKey, SortSpec, Specialized};
