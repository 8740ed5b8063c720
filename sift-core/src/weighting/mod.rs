//! Pluggable term weighting.
//!
//! A [`WeightingFunction`] turns the statistics held in
//! [`WeightingComponents`] into scores in two steps: `init_term` once per
//! query term (a collection-level weight such as IDF, cached in
//! `components.wt`) and `term_weight` once per posting.

mod components;
mod stats;

pub use components::{TermScope, WeightingComponents};
pub use stats::{CollectionStats, TermStats};

use core::fmt;

use sift_types::{Score, WeightingKind};

/// Smallest collection weight a term may get, so that very common terms still
/// contribute to normalization.
pub const MIN_TERM_WEIGHT: Score = 1e-4;

/// A scoring model.
pub trait WeightingFunction: fmt::Debug + Send + Sync {
    /// Collection-level weight of the current term.
    fn init_term(&self, c: &WeightingComponents) -> Score;

    /// Document-level weight of the current posting. Must return 0 when
    /// `c.fdt == 0`.
    fn term_weight(&self, c: &WeightingComponents) -> Score;
}

/// Raw term frequency.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tf;

impl WeightingFunction for Tf {
    fn init_term(&self, _c: &WeightingComponents) -> Score {
        1.0
    }

    fn term_weight(&self, c: &WeightingComponents) -> Score {
        c.fdt as Score
    }
}

/// `ln(N / ft)` times `1 + ln(fdt)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TfIdf;

impl WeightingFunction for TfIdf {
    fn init_term(&self, c: &WeightingComponents) -> Score {
        let n = c.n as f64;
        let ft = c.ft.max(1) as f64;
        ((n / ft).ln() as Score).max(MIN_TERM_WEIGHT)
    }

    fn term_weight(&self, c: &WeightingComponents) -> Score {
        if c.fdt == 0 {
            return 0.0;
        }
        c.wt * (1.0 + (c.fdt as Score).ln())
    }
}

/// BM25-style saturating frequency with document length normalization.
#[derive(Debug, Clone, Copy)]
pub struct Okapi {
    /// Frequency saturation.
    pub k1: Score,
    /// Length normalization strength.
    pub b: Score,
}

impl Default for Okapi {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl WeightingFunction for Okapi {
    fn init_term(&self, c: &WeightingComponents) -> Score {
        let n = c.n as f64;
        let ft = c.ft as f64;
        (((2.0 * n - ft + 0.5) / (ft + 0.5)).ln() as Score).max(MIN_TERM_WEIGHT)
    }

    fn term_weight(&self, c: &WeightingComponents) -> Score {
        if c.fdt == 0 {
            return 0.0;
        }
        let avg = if c.avg_doc_len > 0.0 { c.avg_doc_len } else { 1.0 };
        let fdt = c.fdt as Score;
        let norm = self.k1 * ((1.0 - self.b) + self.b * (c.ld as Score / avg));
        c.wt * fdt / (norm + fdt)
    }
}

/// Returns the weighting function for a configured kind.
pub fn for_kind(kind: WeightingKind) -> Box<dyn WeightingFunction> {
    match kind {
        WeightingKind::Tf => Box::new(Tf),
        WeightingKind::TfIdf => Box::new(TfIdf),
        WeightingKind::Okapi => Box::new(Okapi::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(n: u64, ft: u32, avg: f32) -> WeightingComponents {
        WeightingComponents {
            n,
            ft,
            avg_doc_len: avg,
            ..WeightingComponents::default()
        }
    }

    #[test]
    fn tf_is_raw_frequency() {
        let mut c = components(10, 2, 5.0);
        assert_eq!(Tf.init_term(&c), 1.0);
        c.fdt = 3;
        assert_eq!(Tf.term_weight(&c), 3.0);
    }

    #[test]
    fn tfidf_zero_frequency_is_zero() {
        let mut c = components(100, 10, 5.0);
        c.wt = TfIdf.init_term(&c);
        assert!((c.wt - 10f32.ln()).abs() < 1e-6);
        c.fdt = 0;
        assert_eq!(TfIdf.term_weight(&c), 0.0);
        c.fdt = 1;
        assert!((TfIdf.term_weight(&c) - c.wt).abs() < 1e-6);
    }

    #[test]
    fn tfidf_floors_ubiquitous_terms() {
        let c = components(10, 10, 5.0);
        assert_eq!(TfIdf.init_term(&c), MIN_TERM_WEIGHT);
    }

    #[test]
    fn okapi_saturates_to_term_weight() {
        let okapi = Okapi::default();
        let mut c = components(1000, 10, 20.0);
        c.wt = okapi.init_term(&c);
        c.ld = 20;
        c.fdt = 1_000_000;
        let w = okapi.term_weight(&c);
        assert!(w < c.wt);
        assert!((c.wt - w) / c.wt < 1e-4);
    }

    #[test]
    fn okapi_guards_zero_average_length() {
        let okapi = Okapi::default();
        let mut c = components(10, 1, 0.0);
        c.wt = 1.0;
        c.fdt = 2;
        c.ld = 7;
        assert!(okapi.term_weight(&c).is_finite());
        c.fdt = 0;
        assert_eq!(okapi.term_weight(&c), 0.0);
    }

    #[test]
    fn for_kind_dispatches() {
        let c = components(10, 1, 1.0);
        assert_eq!(for_kind(WeightingKind::Tf).init_term(&c), 1.0);
        assert!(for_kind(WeightingKind::Okapi).init_term(&c) > 1.0);
    }
}
