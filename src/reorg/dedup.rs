//! Near-duplicate detection and the Dedup phase
//!
//! Names sharing a normalized key are merged by the canonical-choice rule
//! without asking anyone. Names that are merely similar go to the oracle's
//! `decide_merge`, concurrently, and only merge on a yes.

use super::migration::MigrationPlanner;
use super::types::{Change, ChangeKind, Phase, PhaseResult};
use super::{pathway_label, PhaseContext};
use crate::config::EngineConfig;
use crate::graph::{PathwayGraph, PathwayId, RootCatalog};
use crate::hierarchy::recompute_derived;
use regex_lite::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const GREEK: &[(char, &str)] = &[
    ('κ', "k"),
    ('β', "beta"),
    ('α', "alpha"),
    ('γ', "gamma"),
    ('δ', "delta"),
    ('ε', "epsilon"),
    ('ω', "omega"),
];

const PREFIXES: &[&str] = &["positive regulation of ", "negative regulation of ", "regulation of "];

const SUFFIXES: &[&str] = &[
    " pathway",
    " signaling",
    " signalling",
    " process",
    " cascade",
    " response",
];

fn inner_hyphen() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9])-([a-z0-9])").expect("static pattern"))
}

/// Word characters in the Unicode sense: letters and digits of any
/// script, plus underscore.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Comparison key for pathway names.
///
/// `"NF-κB Signaling Pathway"` and `"NF-kB Signaling"` both become `"nfkb"`.
pub fn normalize_name(name: &str) -> String {
    let mut s = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        match GREEK.iter().find(|(g, _)| *g == c) {
            Some((_, latin)) => s.push_str(latin),
            None => s.push(c),
        }
    }

    loop {
        let joined = inner_hyphen().replace_all(&s, "$1$2").into_owned();
        if joined == s {
            break;
        }
        s = joined;
    }
    let s: String = s.chars().filter(|&c| is_word_char(c) || c.is_whitespace()).collect();
    let mut s = s.split_whitespace().collect::<Vec<_>>().join(" ");

    for prefix in PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.to_string();
        }
    }
    loop {
        let before = s.len();
        for suffix in SUFFIXES {
            if let Some(rest) = s.strip_suffix(suffix) {
                s = rest.to_string();
            }
        }
        if s.len() == before {
            break;
        }
    }
    s.trim().to_string()
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Edit-distance similarity of two lower-cased names in `[0, 1]`
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Nodes sharing one normalized key
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub key: String,
    pub members: Vec<PathwayId>,
}

/// A pair worth asking the oracle about
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarPair {
    pub a: PathwayId,
    pub b: PathwayId,
    pub score: f64,
    pub containment: bool,
}

pub fn exact_groups(graph: &PathwayGraph) -> Vec<DuplicateGroup> {
    let mut groups: BTreeMap<String, Vec<PathwayId>> = BTreeMap::new();
    for node in graph.nodes() {
        let key = normalize_name(&node.name);
        if !key.is_empty() {
            groups.entry(key).or_default().push(node.id);
        }
    }
    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(key, members)| DuplicateGroup { key, members })
        .collect()
}

/// Pairs with distinct normalized keys that are close by edit distance or
/// by containment. Pairs of two roots are never proposed. Best scores first.
pub fn similar_pairs(graph: &PathwayGraph, catalog: &RootCatalog, config: &EngineConfig) -> Vec<SimilarPair> {
    let entries: Vec<(PathwayId, String, String, bool)> = graph
        .nodes()
        .map(|n| {
            (
                n.id,
                n.name.to_lowercase(),
                normalize_name(&n.name),
                catalog.is_root_name(&n.name),
            )
        })
        .collect();

    let mut pairs = Vec::new();
    for (i, (a, a_name, a_key, a_root)) in entries.iter().enumerate() {
        for (b, b_name, b_key, b_root) in &entries[i + 1..] {
            if (*a_root && *b_root) || a_key == b_key || a_name.is_empty() || b_name.is_empty() {
                continue;
            }
            let score = similarity(a_name, b_name);
            let len_diff = a_name.chars().count().abs_diff(b_name.chars().count());
            let containment = (a_name.contains(b_name.as_str()) || b_name.contains(a_name.as_str()))
                && len_diff < config.containment_max_len_diff;
            if score >= config.similarity_threshold || containment {
                pairs.push(SimilarPair {
                    a: *a,
                    b: *b,
                    score,
                    containment,
                });
            }
        }
    }
    pairs.sort_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| (x.a, x.b).cmp(&(y.a, y.b)))
    });
    pairs
}

fn merge_one(
    planner: &MigrationPlanner<'_>,
    graph: &mut PathwayGraph,
    result: &mut PhaseResult,
    source: PathwayId,
    target: PathwayId,
    reason: &str,
) {
    let source_label = pathway_label(graph, source);
    let target_label = pathway_label(graph, target);
    let outcome = planner
        .build_plan(graph, source, target)
        .and_then(|plan| planner.execute(graph, &plan));
    match outcome {
        Ok(outcome) => {
            for skipped in outcome.skipped {
                result.add_warning(format!("merge {} -> {}: {}", source_label, target_label, skipped));
            }
            result.record(
                Change::new(ChangeKind::Merge, source_label, reason)
                    .to_value(target_label),
            );
        }
        Err(e) => result.add_error(format!("merge {} -> {} failed: {}", source_label, target_label, e)),
    }
}

/// Dedup phase
pub(crate) async fn run(ctx: &PhaseContext<'_>, graph: &mut PathwayGraph) -> PhaseResult {
    let mut result = PhaseResult::new(Phase::Dedup);
    let planner = MigrationPlanner::new(ctx.catalog);

    let groups = exact_groups(graph);
    tracing::info!(groups = groups.len(), "merging exact duplicate groups");
    for group in groups {
        let Some(canonical) = planner.choose_canonical_of(graph, &group.members) else {
            continue;
        };
        for member in group.members.iter().copied().filter(|m| *m != canonical) {
            if ctx.catalog.is_root(graph, member) {
                result.add_warning(format!(
                    "{} shares key '{}' with another root; left in place",
                    pathway_label(graph, member),
                    group.key
                ));
                continue;
            }
            let reason = format!("same normalized name '{}'", group.key);
            merge_one(&planner, graph, &mut result, member, canonical, &reason);
        }
    }

    let pairs = similar_pairs(graph, ctx.catalog, ctx.config);
    if !pairs.is_empty() {
        tracing::info!(pairs = pairs.len(), "asking oracle about similar names");
        let questions = pairs
            .iter()
            .map(|p| {
                (
                    graph.name_of(p.a).unwrap_or_default().to_string(),
                    graph.name_of(p.b).unwrap_or_default().to_string(),
                )
            })
            .collect::<Vec<_>>();
        let decisions = ctx.pool.decide_merges(questions.clone()).await;

        for ((pair, (a_name, b_name)), decision) in pairs.iter().zip(questions).zip(decisions) {
            let decision = match decision {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::debug!(a = %a_name, b = %b_name, error = %e, "no merge decision; keeping apart");
                    continue;
                }
            };
            if !decision.merge || !graph.contains(pair.a) || !graph.contains(pair.b) {
                continue;
            }

            let named = decision.canonical_name.as_deref().map(str::trim);
            let (mut target, mut source) = match named {
                Some(name) if name.eq_ignore_ascii_case(&a_name) => (pair.a, pair.b),
                Some(name) if name.eq_ignore_ascii_case(&b_name) => (pair.b, pair.a),
                _ => planner.choose_canonical(graph, pair.a, pair.b),
            };
            if ctx.catalog.is_root(graph, source) {
                std::mem::swap(&mut target, &mut source);
            }
            let reason = format!("oracle judged '{}' and '{}' the same pathway", a_name, b_name);
            merge_one(&planner, graph, &mut result, source, target, &reason);
        }
    }

    recompute_derived(graph, ctx.catalog);
    result
}
