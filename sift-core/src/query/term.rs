use bitvec::vec::BitVec;
use sift_types::{DocId, FieldId, QueryConfig, Score};

use super::eval::{empty, Evaluation};
use super::plan::NodeId;
use super::DictTerm;
use crate::group::{for_each_match, ArrayGroup, DocGroup, ScoredGroup};
use crate::partition::{is_wildcard, DictEntry, Lookup, Partition};
use crate::quick_or::{QuickOr, ScoredQuickOr};

/// Resolves every form of `term` to dictionary entries, deduplicated and
/// ordered by ascending document frequency.
pub(crate) fn resolve_entries(
    partition: &dyn Partition,
    term: &DictTerm,
    config: &QueryConfig,
) -> Vec<DictEntry> {
    let mut entries = Vec::new();
    for form in term.forms() {
        if is_wildcard(form) {
            entries.extend(partition.lookup(&Lookup::Wildcard {
                pattern: form,
                case_sensitive: config.case_sensitive,
            }));
            continue;
        }
        let lookup = if config.case_sensitive {
            Lookup::Exact(form)
        } else {
            Lookup::CaseInsensitive(form)
        };
        entries.extend(partition.lookup(&lookup));
        if config.stem {
            entries.extend(partition.lookup(&Lookup::Stemmed(form)));
        }
    }
    entries.sort_unstable_by_key(|e| e.id);
    entries.dedup_by_key(|e| e.id);
    entries.sort_by_key(|e| e.doc_freq);
    entries
}

impl Evaluation<'_, '_, '_> {
    /// Evaluates one term node. With a positive input, each entry's postings
    /// are intersected against the input; otherwise they are ORed.
    pub(super) fn eval_term(
        &mut self,
        id: NodeId,
        input: Option<&DocGroup>,
        scored: bool,
    ) -> DocGroup {
        let plan = self.plan;
        let node = plan.node(id);
        let Some(term) = node.term else {
            return empty(scored);
        };
        let ctx = &mut self.ctx;
        let partition = ctx.partition;
        let config = ctx.config;
        let seek_ratio = config.tuning.seek_ratio;

        // An explicit field restriction that matches nothing here.
        let fields: &[FieldId] = plan.search_fields.as_deref().unwrap_or(&[]);
        let entries = if plan.search_fields.is_some() && fields.is_empty() {
            &[][..]
        } else {
            plan.entries(id)
        };

        let stats = ctx.stats.term(&term.name);
        let mut scope = ctx.components.set_term(ctx.weighting, &stats);
        let query_weight = term.query_weight * scope.term_weight();
        let sqw = query_weight * query_weight;

        if let Some(input) = input.filter(|g| !g.is_negative()) {
            let docs = input.docs();
            let mut hits: BitVec = BitVec::repeat(false, docs.len());
            let mut scores: Vec<Score> = if scored { vec![0.0; docs.len()] } else { Vec::new() };
            for entry in entries {
                let Some(mut postings) = partition.postings(entry, fields) else {
                    continue;
                };
                ctx.used.push(entry.clone());
                for_each_match(docs, postings.as_mut(), seek_ratio, |i, p| {
                    hits.set(i, true);
                    if scored {
                        scores[i] += scope.weigh(
                            p.freq(),
                            partition.doc_length(docs[i]),
                            partition.doc_vector_length(docs[i]),
                        ) * query_weight;
                    }
                });
            }

            let matched: Vec<DocId> = hits.iter_ones().map(|i| docs[i]).collect();
            return if scored {
                let kept = hits.iter_ones().map(|i| scores[i]).collect();
                DocGroup::Scored(ScoredGroup::from_parts(matched, kept).with_sqw(sqw))
            } else {
                DocGroup::Strict(ArrayGroup::from_sorted(matched))
            };
        }

        let n_docs = partition.n_docs();
        let max_doc = partition.max_doc_id();
        let result = if scored {
            let mut or = ScoredQuickOr::new(n_docs, max_doc, node.estimate, &config.tuning);
            or.add_weight_only(query_weight);
            for entry in entries {
                let Some(mut postings) = partition.postings(entry, fields) else {
                    continue;
                };
                ctx.used.push(entry.clone());
                or.add_with(Some(postings.as_mut()), |p| {
                    let doc = p.id();
                    scope.weigh(p.freq(), partition.doc_length(doc), partition.doc_vector_length(doc))
                        * query_weight
                });
            }
            DocGroup::Scored(or.into_group())
        } else {
            let mut or = QuickOr::new(n_docs, max_doc, node.estimate, &config.tuning);
            for entry in entries {
                let Some(mut postings) = partition.postings(entry, fields) else {
                    continue;
                };
                ctx.used.push(entry.clone());
                or.add(Some(postings.as_mut()));
            }
            DocGroup::Strict(or.into_group())
        };

        match input {
            Some(excluded) => result.intersect(excluded),
            None => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryPartition, MemoryPartitionBuilder};
    use crate::query::plan::Plan;
    use crate::query::QueryElement;
    use crate::weighting::{CollectionStats, Tf};
    use sift_types::WeightingKind;

    fn partition() -> MemoryPartition {
        let mut b = MemoryPartitionBuilder::new("p");
        b.add_document(&[("title", "Cats and Dogs"), ("body", "running cats")]);
        b.add("dog days");
        b.add("Catalog of CATS cats");
        b.build()
    }

    fn eval_with(
        query: &QueryElement,
        p: &MemoryPartition,
        config: &QueryConfig,
        input: Option<&DocGroup>,
    ) -> (DocGroup, Vec<String>) {
        let stats = CollectionStats::from_partitions(&[p], query, config);
        let plan = Plan::bind(query, p, config).unwrap();
        let mut eval = Evaluation::new(&plan, p, config, &stats, &Tf);
        let scored = config.scored;
        let group = eval.eval(plan.root, input, scored).unwrap();
        let used = eval.into_used().into_iter().map(|e| e.name).collect();
        (group, used)
    }

    #[test]
    fn resolve_orders_by_document_frequency() {
        let p = partition();
        let config = QueryConfig::boolean();
        let entries = resolve_entries(&p, &DictTerm::new("cats"), &config);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["CATS", "Cats", "cats"]);

        let mut sensitive = config.clone();
        sensitive.case_sensitive = true;
        let entries = resolve_entries(&p, &DictTerm::new("cats"), &sensitive);
        assert_eq!(entries.len(), 1);

        let entries = resolve_entries(&p, &DictTerm::new("cat*"), &sensitive);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["cats"]);
    }

    #[test]
    fn variants_are_deduplicated() {
        let p = partition();
        let term = DictTerm::new("dog").variant("DOG").variant("dogs");
        let entries = resolve_entries(&p, &term, &QueryConfig::boolean());
        let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Dogs", "dog"]);
    }

    #[test]
    fn stemming_adds_entries() {
        let p = partition();
        let mut config = QueryConfig::boolean();
        config.stem = true;
        let plain = resolve_entries(&p, &DictTerm::new("dog"), &QueryConfig::boolean());
        assert!(!plain.iter().any(|e| e.name == "Dogs"));
        let entries = resolve_entries(&p, &DictTerm::new("dog"), &config);
        assert!(entries.iter().any(|e| e.name == "Dogs"));
    }

    #[test]
    fn unrestricted_term_ors_entries() {
        let p = partition();
        let (group, used) = eval_with(&QueryElement::term("cats"), &p, &QueryConfig::boolean(), None);
        assert_eq!(group.docs(), &[1, 3]);
        assert_eq!(used.len(), 3);
    }

    #[test]
    fn restricted_term_matches_input_only() {
        let p = partition();
        let input = DocGroup::Strict(ArrayGroup::from_sorted(vec![2, 3]));
        let config = QueryConfig::ranked(WeightingKind::Tf);
        let (group, _) = eval_with(&QueryElement::term("cats"), &p, &config, Some(&input));
        assert_eq!(group.docs(), &[3]);
        // "CATS" once and "cats" once
        assert_eq!(group.score_of(3), Some(2.0));
        assert_eq!(group.sqw(), 1.0);
    }

    #[test]
    fn negative_input_excludes() {
        let p = partition();
        let input = DocGroup::Negative(ArrayGroup::from_sorted(vec![1]));
        let (group, _) = eval_with(&QueryElement::term("cats"), &p, &QueryConfig::boolean(), Some(&input));
        assert_eq!(group.docs(), &[3]);
    }

    #[test]
    fn absent_term_keeps_query_weight() {
        let p = partition();
        let config = QueryConfig::ranked(WeightingKind::Tf);
        let (group, used) = eval_with(&QueryElement::term("zebra"), &p, &config, None);
        assert!(group.is_empty());
        assert!(group.is_scored());
        assert_eq!(group.sqw(), 1.0);
        assert!(used.is_empty());
    }

    #[test]
    fn search_fields_restrict_matches() {
        let p = partition();
        let mut config = QueryConfig::boolean();
        config.add_search_field("title");
        let (group, _) = eval_with(&QueryElement::term("cats"), &p, &config, None);
        assert_eq!(group.docs(), &[1]);

        let mut config = QueryConfig::boolean();
        config.add_search_field("subject");
        let (group, used) = eval_with(&QueryElement::term("cats"), &p, &config, None);
        assert!(group.is_empty());
        assert!(used.is_empty());
    }
}
