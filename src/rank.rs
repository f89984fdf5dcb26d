use crate::index::{CommandIndex, IndexRecord};
use crate::synonyms::SynonymTables;
use std::collections::BTreeMap;

pub const DEFAULT_TOP_K: usize = 1;
pub const DEFAULT_MIN_SCORE: f64 = 0.2;

/// Relative weight of the three match classes. The absolute values are not a
/// contract; only the ordering properties the tests pin down are.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub segment_exact: f64,
    pub segment_derived: f64,
    pub keyword: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            segment_exact: 3.0,
            segment_derived: 2.0,
            keyword: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankOptions {
    pub weights: ScoreWeights,
    pub top_k: usize,
    pub min_score: f64,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    SegmentExact,
    SegmentDerived,
    Keyword,
}

/// One term of the prompt that contributed to a record's score, kept for
/// --explain output.
#[derive(Debug, Clone)]
pub struct MatchDetail {
    pub term: String,
    pub kind: MatchKind,
}

#[derive(Debug, Clone)]
pub struct RankedCandidate<'a> {
    pub record: &'a IndexRecord,
    pub score: f64,
    pub matches: Vec<MatchDetail>,
}

impl RankedCandidate<'_> {
    /// Short human rationale, e.g. "run (exact), services (synonym)".
    pub fn match_summary(&self) -> String {
        if self.matches.is_empty() {
            return "no matching terms".to_string();
        }
        let parts: Vec<String> = self
            .matches
            .iter()
            .map(|m| match m.kind {
                MatchKind::SegmentExact => format!("{} (exact)", m.term),
                MatchKind::SegmentDerived => format!("{} (synonym)", m.term),
                MatchKind::Keyword => format!("{} (keyword)", m.term),
            })
            .collect();
        parts.join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenOrigin {
    Literal,
    Derived,
}

/// Lowercases and splits on every character that is not alphanumeric and not
/// a hyphen, so zone names (`europe-west1-b`) and hyphenated segments
/// (`firewall-rules`) survive as single tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|t| t.trim_matches('-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expands prompt tokens through the synonym tables and a naive plural fold.
/// Literal tokens outrank anything derived from them, so the map keeps the
/// strongest origin per token text.
fn expand_query(prompt: &str, synonyms: &SynonymTables) -> BTreeMap<String, TokenOrigin> {
    let literal = tokenize(prompt);
    let mut query: BTreeMap<String, TokenOrigin> = BTreeMap::new();

    for token in &literal {
        query.insert(token.clone(), TokenOrigin::Literal);
    }

    let add_derived = |query: &mut BTreeMap<String, TokenOrigin>, text: String| {
        query.entry(text).or_insert(TokenOrigin::Derived);
    };

    // Two-word phrases first ("cloud run", "service account").
    for pair in literal.windows(2) {
        let bigram = format!("{} {}", pair[0], pair[1]);
        if let Some(canonical) = synonyms.canonical(&bigram) {
            add_derived(&mut query, canonical.to_string());
        }
    }

    for token in &literal {
        if let Some(canonical) = synonyms.canonical(token) {
            if canonical != token {
                add_derived(&mut query, canonical.to_string());
            }
        }
        if let Some(folded) = fold_plural(token) {
            add_derived(&mut query, folded);
        }
    }

    query
}

fn fold_plural(token: &str) -> Option<String> {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        Some(token[..token.len() - 1].to_string())
    } else if !token.ends_with('s') {
        Some(format!("{}s", token))
    } else {
        None
    }
}

/// Scores every index record against the prompt and returns the top K at or
/// above the minimum score. Results borrow from the index; nothing outside
/// it can ever be returned.
pub fn rank<'a>(
    index: &'a CommandIndex,
    prompt: &str,
    synonyms: &SynonymTables,
    options: &RankOptions,
) -> Vec<RankedCandidate<'a>> {
    let query = expand_query(prompt, synonyms);

    let mut candidates: Vec<RankedCandidate<'a>> = index
        .records
        .iter()
        .filter(|record| !record.path.is_empty())
        .map(|record| score_record(record, &query, &options.weights))
        .filter(|candidate| candidate.score > 0.0 && candidate.score >= options.min_score)
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| is_read_only(b.record).cmp(&is_read_only(a.record)))
            .then_with(|| a.record.path.len().cmp(&b.record.path.len()))
            .then_with(|| a.record.path.cmp(&b.record.path))
    });
    candidates.truncate(options.top_k);
    candidates
}

fn score_record<'a>(
    record: &'a IndexRecord,
    query: &BTreeMap<String, TokenOrigin>,
    weights: &ScoreWeights,
) -> RankedCandidate<'a> {
    let mut total = 0.0;
    let mut matches = Vec::new();

    for segment in &record.path {
        match query.get(segment) {
            Some(TokenOrigin::Literal) => {
                total += weights.segment_exact;
                matches.push(MatchDetail {
                    term: segment.clone(),
                    kind: MatchKind::SegmentExact,
                });
            }
            Some(TokenOrigin::Derived) => {
                total += weights.segment_derived;
                matches.push(MatchDetail {
                    term: segment.clone(),
                    kind: MatchKind::SegmentDerived,
                });
            }
            None => {}
        }
    }

    for keyword in &record.keywords {
        if record.path.contains(keyword) {
            continue;
        }
        if query.contains_key(keyword) {
            total += weights.keyword;
            matches.push(MatchDetail {
                term: keyword.clone(),
                kind: MatchKind::Keyword,
            });
        }
    }

    let denominator = weights.segment_exact * record.path.len().max(1) as f64;
    let score = (total / denominator).min(1.0);

    RankedCandidate {
        record,
        score,
        matches,
    }
}

/// Actions that only read state sort ahead of mutating ones on score ties.
fn is_read_only(record: &IndexRecord) -> bool {
    match record.path.last().map(String::as_str) {
        Some("describe") | Some("list") | Some("get") => true,
        Some(action) => action.starts_with("get-"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build;
    use crate::tree::tests::fixture_loaded_tree;

    fn fixture_index() -> CommandIndex {
        build(&fixture_loaded_tree(), &SynonymTables::builtin())
    }

    fn paths(candidates: &[RankedCandidate<'_>]) -> Vec<String> {
        candidates.iter().map(|c| c.record.path_string()).collect()
    }

    #[test]
    fn tokenizer_keeps_hyphens_and_splits_punctuation() {
        assert_eq!(
            tokenize("List VMs in europe-west1-b, please!"),
            vec!["list", "vms", "in", "europe-west1-b", "please"]
        );
        assert_eq!(tokenize("--region=us"), vec!["region", "us"]);
        assert!(tokenize("...").is_empty());
    }

    #[test]
    fn show_cloud_run_service_configuration_ranks_describe_first() {
        let index = fixture_index();
        let synonyms = SynonymTables::builtin();
        let options = RankOptions {
            top_k: 3,
            ..RankOptions::default()
        };

        let ranked = rank(&index, "show Cloud Run service configuration", &synonyms, &options);
        assert_eq!(
            paths(&ranked)[0],
            "run services describe",
            "got: {:?}",
            paths(&ranked)
        );
        // run literal, services and describe via synonyms, plus the
        // "service" and "show" keyword hits saturate the capped score.
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn vm_listing_prompt_ranks_compute_instances_list_first() {
        let index = fixture_index();
        let synonyms = SynonymTables::builtin();

        let ranked = rank(
            &index,
            "list VM instances in europe-west1-b",
            &synonyms,
            &RankOptions::default(),
        );
        assert_eq!(paths(&ranked), vec!["compute instances list"]);
    }

    #[test]
    fn topk_three_is_distinct_and_deterministically_ordered() {
        let index = fixture_index();
        let synonyms = SynonymTables::builtin();
        let options = RankOptions {
            top_k: 3,
            ..RankOptions::default()
        };

        let ranked = rank(&index, "describe the service", &synonyms, &options);
        // Ties at the lower score break read-only first, then lexically.
        assert_eq!(
            paths(&ranked),
            vec![
                "run services describe",
                "compute instances describe",
                "run domain-mappings describe",
            ]
        );
    }

    #[test]
    fn ranking_is_deterministic_across_runs() {
        let index = fixture_index();
        let synonyms = SynonymTables::builtin();
        let options = RankOptions {
            top_k: 5,
            ..RankOptions::default()
        };

        let first = rank(&index, "describe the service", &synonyms, &options);
        let second = rank(&index, "describe the service", &synonyms, &options);
        assert_eq!(paths(&first), paths(&second));
        let first_scores: Vec<u64> = first.iter().map(|c| c.score.to_bits()).collect();
        let second_scores: Vec<u64> = second.iter().map(|c| c.score.to_bits()).collect();
        assert_eq!(first_scores, second_scores);
    }

    #[test]
    fn unrelated_prompt_matches_nothing() {
        let index = fixture_index();
        let synonyms = SynonymTables::builtin();

        let ranked = rank(
            &index,
            "translate this poem into klingon",
            &synonyms,
            &RankOptions::default(),
        );
        assert!(ranked.is_empty());
    }

    #[test]
    fn candidates_always_borrow_from_the_index() {
        let index = fixture_index();
        let synonyms = SynonymTables::builtin();
        let options = RankOptions {
            top_k: 10,
            min_score: 0.0,
            ..RankOptions::default()
        };

        let ranked = rank(&index, "delete the firewall rule", &synonyms, &options);
        for candidate in &ranked {
            assert!(index.records.iter().any(|r| std::ptr::eq(r, candidate.record)));
        }
    }

    #[test]
    fn match_summary_labels_origins() {
        let index = fixture_index();
        let synonyms = SynonymTables::builtin();
        let ranked = rank(
            &index,
            "show Cloud Run service configuration",
            &synonyms,
            &RankOptions::default(),
        );
        let summary = ranked[0].match_summary();
        assert!(summary.contains("run (exact)"));
        assert!(summary.contains("describe (synonym)"));
    }
}
