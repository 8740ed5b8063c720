//! Positional operators.
//!
//! Every proximity operator is the same evaluator driven by a
//! [`WindowRule`]. Candidates are the documents passing the non-term
//! operands that contain enough of the terms; each candidate's word
//! positions are then checked against the window.

use log::trace;
use sift_types::{DocId, EvalTuning, QueryConfig, Result, Score};

use super::eval::{empty, restrict, Evaluation};
use super::plan::NodeId;
use super::{Proximity, ProximityKind, QueryElement};
use crate::group::{ArrayGroup, DocGroup, ScoredGroup};
use crate::postings::PostingsIterator;
use crate::weighting::TermStats;

/// Positional constraint of a proximity operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRule {
    /// Largest allowed distance between the first and last matched position.
    pub max_window: u32,
    /// How many term operands may be absent from a match.
    pub max_missing: usize,
    /// Whether terms must appear in query order.
    pub in_order: bool,
}

/// A window satisfying a [`WindowRule`] in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMatch {
    /// Distance between the first and last matched position.
    pub span: u32,
    /// Indices of the matched term operands, ascending.
    pub members: Vec<usize>,
    /// Pairs of matched terms appearing in reverse query order.
    pub inversions: usize,
    /// Term operands not matched.
    pub missing: usize,
}

impl WindowMatch {
    /// Gaps plus out-of-order pairs plus a heavy charge per missing term.
    pub fn penalty(&self) -> Score {
        let gaps = self.span.saturating_sub(self.members.len().saturating_sub(1) as u32);
        gaps as Score + self.inversions as Score + 4.0 * self.missing as Score
    }
}

impl WindowRule {
    pub fn for_kind(kind: ProximityKind, n_terms: usize, config: &QueryConfig) -> Self {
        let tuning = &config.tuning;
        match kind {
            ProximityKind::Phrase => WindowRule {
                max_window: n_terms.saturating_sub(1) as u32,
                max_missing: 0,
                in_order: true,
            },
            ProximityKind::Near(window) => WindowRule {
                max_window: window.unwrap_or(config.default_near_window),
                max_missing: 0,
                in_order: false,
            },
            ProximityKind::Within(window) => WindowRule {
                max_window: window,
                max_missing: 0,
                in_order: true,
            },
            ProximityKind::Passage | ProximityKind::PAnd => WindowRule {
                max_window: tuning.passage_base_window
                    + tuning.passage_window_per_term * n_terms as u32,
                max_missing: (n_terms / 2).min(tuning.max_passage_missing),
                in_order: false,
            },
        }
    }

    /// Least number of terms a match needs out of `n_terms`.
    pub fn required(&self, n_terms: usize) -> usize {
        n_terms.saturating_sub(self.max_missing).max(n_terms.min(1))
    }

    /// Finds the tightest window over per-term ascending position lists. An
    /// empty list means the term does not occur.
    pub fn find(&self, positions: &[Vec<u32>]) -> Option<WindowMatch> {
        let n = positions.len();
        let present: Vec<usize> = (0..n).filter(|&i| !positions[i].is_empty()).collect();
        if present.is_empty() || present.len() < self.required(n) {
            return None;
        }
        if self.in_order {
            self.find_ordered(positions, &present)
        } else {
            self.find_unordered(positions, &present)
        }
    }

    /// Greedy chain per start position: each following term takes its first
    /// occurrence after the previous one.
    fn find_ordered(&self, positions: &[Vec<u32>], present: &[usize]) -> Option<WindowMatch> {
        let mut best: Option<u32> = None;
        'starts: for &start in &positions[present[0]] {
            let mut cur = start;
            for &i in &present[1..] {
                let list = &positions[i];
                match list.get(list.partition_point(|&p| p <= cur)) {
                    Some(&p) => cur = p,
                    None => break 'starts,
                }
            }
            let span = cur - start;
            if span <= self.max_window && best.map_or(true, |b| span < b) {
                best = Some(span);
            }
        }
        best.map(|span| WindowMatch {
            span,
            members: present.to_vec(),
            inversions: 0,
            missing: positions.len() - present.len(),
        })
    }

    /// Sliding window over the merged positions: the tightest window holding
    /// as many distinct terms as possible, down to the required count.
    fn find_unordered(&self, positions: &[Vec<u32>], present: &[usize]) -> Option<WindowMatch> {
        let n = positions.len();
        let mut events: Vec<(u32, usize)> = present
            .iter()
            .flat_map(|&i| positions[i].iter().map(move |&p| (p, i)))
            .collect();
        events.sort_unstable();

        let mut counts = vec![0u32; n];
        for want in (self.required(n)..=present.len()).rev() {
            let Some((lo, hi)) = tightest(&events, want, &mut counts) else {
                continue;
            };
            let span = events[hi].0 - events[lo].0;
            if span > self.max_window {
                continue;
            }

            let mut first: Vec<Option<u32>> = vec![None; n];
            for &(pos, term) in &events[lo..=hi] {
                first[term].get_or_insert(pos);
            }
            let members: Vec<usize> = (0..n).filter(|&i| first[i].is_some()).collect();
            let mut inversions = 0;
            for (a, &i) in members.iter().enumerate() {
                for &j in &members[a + 1..] {
                    if first[i] > first[j] {
                        inversions += 1;
                    }
                }
            }
            let missing = n - members.len();
            return Some(WindowMatch {
                span,
                members,
                inversions,
                missing,
            });
        }
        None
    }
}

/// Bounds of the shortest run of `events` covering `want` distinct terms.
fn tightest(events: &[(u32, usize)], want: usize, counts: &mut [u32]) -> Option<(usize, usize)> {
    counts.fill(0);
    let mut distinct = 0usize;
    let mut lo = 0usize;
    let mut best: Option<(usize, usize)> = None;
    for hi in 0..events.len() {
        let term = events[hi].1;
        if counts[term] == 0 {
            distinct += 1;
        }
        counts[term] += 1;
        while distinct >= want {
            let span = events[hi].0 - events[lo].0;
            if best.map_or(true, |(l, h)| span < events[h].0 - events[l].0) {
                best = Some((lo, hi));
            }
            let gone = events[lo].1;
            counts[gone] -= 1;
            if counts[gone] == 0 {
                distinct -= 1;
            }
            lo += 1;
        }
    }
    best
}

/// Score of a window match: the matched terms' weight, boosted the more
/// compact the match is.
pub(crate) fn proximity_score(base: Score, penalty: Score, tuning: &EvalTuning) -> Score {
    base * (1.0 + tuning.proximity_scaling / (tuning.proximity_saturation + penalty))
}

/// Query weighting of one dictionary term under a proximity operator.
struct WeightedTerm {
    stats: TermStats,
    query_weight: Score,
}

/// Postings of one dictionary entry, tagged with its term.
struct Stream<'p> {
    postings: Box<dyn PostingsIterator + 'p>,
    term: usize,
}

impl Evaluation<'_, '_, '_> {
    pub(super) fn eval_proximity(
        &mut self,
        id: NodeId,
        prox: &Proximity,
        input: Option<&DocGroup>,
        scored: bool,
    ) -> Result<DocGroup> {
        let plan = self.plan;
        let terms = plan.terms(id);
        let rule = prox.rule(terms.len(), self.ctx.config);
        let score_filters = scored && prox.kind == ProximityKind::PAnd;

        let mut filter: Option<DocGroup> = None;
        for &child in plan.children(id) {
            let r = self.eval(child, filter.as_ref().or(input), score_filters)?;
            let next = match filter {
                None => r,
                Some(f) => f.intersect(&r),
            };
            if next.is_empty() {
                return Ok(empty(scored));
            }
            filter = Some(next);
        }
        if terms.is_empty() {
            let group = filter.unwrap_or_else(|| restrict(DocGroup::all(), input));
            return Ok(if scored { group.into_scored() } else { group });
        }

        let restriction = filter.as_ref().or(input);
        let mut candidates: Option<DocGroup> = None;
        for &t in terms {
            let within = if rule.max_missing == 0 {
                candidates.as_ref().or(restriction)
            } else {
                restriction
            };
            let r = self.eval(t, within, false)?;
            candidates = Some(match candidates {
                None => r,
                Some(c) if rule.max_missing == 0 => c.intersect(&r),
                Some(c) => c.union(&r),
            });
        }
        let candidates = match candidates {
            Some(c) if !c.is_empty() => c,
            _ => return Ok(empty(scored)),
        };

        let ctx = &mut self.ctx;
        let partition = ctx.partition;
        let docs = candidates.materialize(partition.max_doc_id(), None);
        let fields = plan.search_fields.as_deref().unwrap_or(&[]);

        let mut weighted: Vec<WeightedTerm> = Vec::new();
        let mut operands: Vec<Vec<Stream<'_>>> = Vec::with_capacity(terms.len());
        for &t in terms {
            let subs: &[NodeId] = match plan.node(t).elem {
                QueryElement::MultiTerm(_) => plan.children(t),
                _ => std::slice::from_ref(&t),
            };
            let mut streams = Vec::new();
            for &sub in subs {
                let Some(term) = plan.node(sub).term else {
                    continue;
                };
                let stats = ctx.stats.term(&term.name);
                let query_weight =
                    term.query_weight * ctx.components.set_term(ctx.weighting, &stats).term_weight();
                weighted.push(WeightedTerm { stats, query_weight });
                for entry in plan.entries(sub) {
                    if let Some(postings) = partition.postings(entry, fields) {
                        streams.push(Stream {
                            postings,
                            term: weighted.len() - 1,
                        });
                    }
                }
            }
            operands.push(streams);
        }

        let mut positions: Vec<Vec<u32>> = vec![Vec::new(); operands.len()];
        let mut term_weights: Vec<Score> = vec![0.0; operands.len()];
        let mut scratch = Vec::new();
        let mut out_docs: Vec<DocId> = Vec::new();
        let mut out_scores: Vec<Score> = Vec::new();

        for doc in docs {
            let ld = partition.doc_length(doc);
            let dvl = partition.doc_vector_length(doc);
            for (i, streams) in operands.iter_mut().enumerate() {
                positions[i].clear();
                term_weights[i] = 0.0;
                for stream in streams.iter_mut() {
                    if !stream.postings.find_id(doc) || !stream.postings.positions(&mut scratch) {
                        continue;
                    }
                    if scratch.is_empty() {
                        continue;
                    }
                    positions[i].extend_from_slice(&scratch);
                    if scored {
                        let w = &weighted[stream.term];
                        let mut scope = ctx.components.set_term(ctx.weighting, &w.stats);
                        term_weights[i] += scope.weigh(stream.postings.freq(), ld, dvl) * w.query_weight;
                    }
                }
                positions[i].sort_unstable();
                positions[i].dedup();
            }

            let Some(m) = rule.find(&positions) else {
                continue;
            };
            out_docs.push(doc);
            if scored {
                let base: Score = m.members.iter().map(|&i| term_weights[i]).sum();
                out_scores.push(proximity_score(base, m.penalty(), &ctx.config.tuning));
            }
        }
        trace!(
            "proximity {:?}: {} of {} candidates matched",
            prox.kind,
            out_docs.len(),
            candidates.len()
        );

        if !scored {
            return Ok(DocGroup::Strict(ArrayGroup::from_sorted(out_docs)));
        }
        let sqw: Score = weighted.iter().map(|w| w.query_weight * w.query_weight).sum();
        let group = DocGroup::Scored(ScoredGroup::from_parts(out_docs, out_scores).with_sqw(sqw));
        Ok(match filter {
            Some(filter) if score_filters => group.intersect(&filter),
            _ => group,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryPartition, MemoryPartitionBuilder};
    use crate::query::plan::Plan;
    use crate::weighting::{CollectionStats, Tf};
    use sift_types::{FieldOp, FieldType, WeightingKind};

    fn rule(max_window: u32, in_order: bool) -> WindowRule {
        WindowRule {
            max_window,
            max_missing: 0,
            in_order,
        }
    }

    #[test]
    fn near_window_enforced() {
        let positions = vec![vec![10], vec![50]];
        assert!(rule(20, false).find(&positions).is_none());
        let m = rule(50, false).find(&positions).unwrap();
        assert_eq!(m.span, 40);
    }

    #[test]
    fn phrase_requires_order() {
        let config = QueryConfig::default();
        let phrase = WindowRule::for_kind(ProximityKind::Phrase, 2, &config);
        assert_eq!(phrase, rule(1, true));
        assert!(phrase.find(&[vec![10], vec![11]]).is_some());
        assert!(phrase.find(&[vec![11], vec![10]]).is_none());
        assert!(phrase.find(&[vec![3, 11], vec![1, 12]]).is_some());
    }

    #[test]
    fn passage_tolerates_missing_terms() {
        let config = QueryConfig::default();
        let passage = WindowRule::for_kind(ProximityKind::Passage, 4, &config);
        assert_eq!(passage.max_window, 200);
        assert_eq!(passage.max_missing, 2);
        assert_eq!(passage.required(4), 2);

        let m = passage.find(&[vec![5], vec![], vec![7], vec![]]).unwrap();
        assert_eq!(m.members, vec![0, 2]);
        assert_eq!(m.missing, 2);
        assert!(passage.find(&[vec![5], vec![], vec![], vec![]]).is_none());

        let capped = WindowRule::for_kind(ProximityKind::PAnd, 30, &config);
        assert_eq!(capped.max_missing, 9);
    }

    #[test]
    fn unordered_prefers_more_terms_then_tighter() {
        let passage = WindowRule {
            max_window: 10,
            max_missing: 1,
            in_order: false,
        };
        // all three only fit in a window of 20; two fit in 1
        let m = passage.find(&[vec![0], vec![1], vec![20]]).unwrap();
        assert_eq!(m.members, vec![0, 1]);
        assert_eq!(m.span, 1);

        let m = passage.find(&[vec![4], vec![2], vec![3]]).unwrap();
        assert_eq!(m.members, vec![0, 1, 2]);
        assert_eq!(m.inversions, 2);
        assert_eq!(m.penalty(), 2.0);
    }

    #[test]
    fn penalty_shapes_score() {
        let tuning = EvalTuning::default();
        let tight = proximity_score(1.0, 0.0, &tuning);
        let loose = proximity_score(1.0, 10.0, &tuning);
        assert_eq!(tight, 2.0);
        assert!(loose < tight && loose > 1.0);
    }

    fn partition() -> MemoryPartition {
        let mut b = MemoryPartitionBuilder::new("p");
        b.define_field("lang", FieldType::Str);
        let docs = [
            "the quick brown fox jumps",
            "brown bears and a quick fox",
            "fox news is quick to report",
            "nothing relevant here",
        ];
        for (i, text) in docs.iter().enumerate() {
            let doc = b.add(text);
            let lang = if i % 2 == 0 { "en" } else { "de" };
            b.save_literal(doc, "lang", lang).unwrap();
        }
        b.build()
    }

    fn run(query: &QueryElement, config: &QueryConfig) -> DocGroup {
        let p = partition();
        let stats = CollectionStats::from_partitions(&[&p], query, config);
        let plan = Plan::bind(query, &p, config).unwrap();
        let mut eval = Evaluation::new(&plan, &p, config, &stats, &Tf);
        eval.run().unwrap()
    }

    fn terms(words: &[&str]) -> Vec<QueryElement> {
        words.iter().map(|w| QueryElement::term(*w)).collect()
    }

    #[test]
    fn phrase_and_within_in_documents() {
        let config = QueryConfig::boolean();
        let r = run(&QueryElement::phrase(terms(&["quick", "brown"])), &config);
        assert_eq!(r.docs(), &[1]);
        let r = run(&QueryElement::phrase(terms(&["quick", "fox"])), &config);
        assert_eq!(r.docs(), &[2]);
        let r = run(&QueryElement::within(3, terms(&["quick", "fox"])), &config);
        assert_eq!(r.docs(), &[1, 2]);
        let r = run(&QueryElement::near(Some(3), terms(&["quick", "fox"])), &config);
        assert_eq!(r.docs(), &[1, 2, 3]);
    }

    #[test]
    fn filters_restrict_candidates() {
        let config = QueryConfig::boolean();
        let mut operands = terms(&["quick", "fox"]);
        operands.push(QueryElement::field("lang", FieldOp::Equal, "en"));
        let r = run(&QueryElement::near(Some(3), operands), &config);
        assert_eq!(r.docs(), &[1, 3]);
    }

    #[test]
    fn filters_without_terms_follow_the_scoring_mode() {
        let filter_only =
            || QueryElement::near(Some(3), vec![QueryElement::field("lang", FieldOp::Equal, "en")]);
        let r = run(&filter_only(), &QueryConfig::ranked(WeightingKind::Tf));
        assert!(r.is_scored());
        assert_eq!(r.docs(), &[1, 3]);
        assert_eq!(r.score_of(3), Some(0.0));

        let r = run(&filter_only(), &QueryConfig::boolean());
        assert!(!r.is_scored());
        assert_eq!(r.docs(), &[1, 3]);
    }

    #[test]
    fn passage_and_pand() {
        let config = QueryConfig::ranked(WeightingKind::Tf);
        let r = run(&QueryElement::passage(terms(&["quick", "bears", "report", "zebra"])), &config);
        assert!(r.is_scored());
        assert_eq!(r.docs(), &[2, 3]);

        let mut operands = terms(&["quick", "bears"]);
        operands.push(QueryElement::field("lang", FieldOp::Substring, "e"));
        let r = run(&QueryElement::pand(operands), &config);
        assert_eq!(r.docs(), &[1, 2, 3]);
        // the filter's pattern score is added on top of the window score
        let plain = run(&QueryElement::passage(terms(&["quick", "bears"])), &config);
        assert!(r.score_of(2).unwrap() > plain.score_of(2).unwrap());
    }

    #[test]
    fn closer_terms_score_higher() {
        let config = QueryConfig::ranked(WeightingKind::Tf);
        let r = run(&QueryElement::near(Some(10), terms(&["quick", "fox"])), &config);
        let adjacent = r.score_of(2).unwrap();
        let apart = r.score_of(1).unwrap();
        assert!(adjacent > apart);
    }
}
