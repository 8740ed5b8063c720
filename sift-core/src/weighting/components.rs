use sift_types::Score;

use super::{CollectionStats, TermStats, WeightingFunction};

/// Statistics a weighting function reads.
///
/// One instance is reused for a whole evaluation. It is written in three
/// phases, each overwriting the fields of the phase below it:
///
/// 1. [`WeightingComponents::set_collection`] once per query
/// 2. [`WeightingComponents::set_term`] once per query term, returning a
///    [`TermScope`]
/// 3. [`TermScope::weigh`] once per posting
///
/// The scope borrows the components mutably, so document fields of one term
/// cannot be read while another term is being set up.
#[derive(Debug, Clone, Default)]
pub struct WeightingComponents {
    /// Documents in the collection.
    pub n: u64,
    /// Average document length in tokens.
    pub avg_doc_len: f32,
    /// Largest document frequency of any query term.
    pub max_ft: u32,
    /// Largest within-document frequency of any query term.
    pub max_fdt: u32,
    /// Frequency of the term in the current document.
    pub fdt: u32,
    /// Length of the current document.
    pub ld: u32,
    /// Euclidean length of the current document's term frequency vector.
    pub dvl: f32,
    /// Documents containing the current term.
    pub ft: u32,
    /// Occurrences of the current term in the collection.
    pub big_ft: u64,
    /// Cached collection weight of the current term.
    pub wt: Score,
}

impl WeightingComponents {
    pub fn new(stats: &CollectionStats) -> Self {
        let mut c = Self::default();
        c.set_collection(stats);
        c
    }

    /// Loads collection-level statistics.
    pub fn set_collection(&mut self, stats: &CollectionStats) {
        self.n = stats.n_docs;
        self.avg_doc_len = stats.avg_doc_len;
        self.max_ft = stats.max_ft;
        self.max_fdt = stats.max_fdt;
    }

    /// Loads a term and computes its collection weight.
    pub fn set_term<'a>(
        &'a mut self,
        func: &'a dyn WeightingFunction,
        term: &TermStats,
    ) -> TermScope<'a> {
        self.ft = term.ft;
        self.big_ft = term.big_ft;
        self.fdt = 0;
        self.ld = 0;
        self.dvl = 1.0;
        self.wt = func.init_term(self);
        TermScope {
            components: self,
            func,
        }
    }
}

/// Components narrowed to one term.
#[derive(Debug)]
pub struct TermScope<'a> {
    components: &'a mut WeightingComponents,
    func: &'a dyn WeightingFunction,
}

impl TermScope<'_> {
    /// Collection weight of the term.
    #[inline]
    pub fn term_weight(&self) -> Score {
        self.components.wt
    }

    /// Weight of the term in a document with frequency `fdt`, length `ld`
    /// and vector length `dvl`.
    #[inline]
    pub fn weigh(&mut self, fdt: u32, ld: u32, dvl: f32) -> Score {
        let c = &mut *self.components;
        c.fdt = fdt;
        c.ld = ld;
        c.dvl = dvl;
        self.func.term_weight(c)
    }
}
