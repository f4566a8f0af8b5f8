//! Oracle answering from preconfigured tables
//!
//! Used by tests and by the CLI (`--oracle answers.yaml`) to replay
//! answers collected elsewhere. Queries without an entry fail with
//! `OracleError::NoAnswer`, which every caller treats as a fallback case.

use super::{query_key, ClassificationOracle, MergeDecision, OracleError, ParentSelection};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One scripted merge verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedMerge {
    pub a: String,
    pub b: String,
    pub merge: bool,
    #[serde(default)]
    pub canonical_name: Option<String>,
}

/// On-disk answer file layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedAnswers {
    /// child name → chosen parent
    #[serde(default)]
    pub parents: HashMap<String, String>,
    /// item name → `[root, ..., item]`
    #[serde(default)]
    pub chains: HashMap<String, Vec<String>>,
    /// pathway name → root name
    #[serde(default)]
    pub roots: HashMap<String, String>,
    #[serde(default)]
    pub merges: Vec<ScriptedMerge>,
}

pub struct ScriptedOracle {
    available: bool,
    parents: HashMap<String, String>,
    chains: HashMap<String, Vec<String>>,
    roots: HashMap<String, String>,
    merges: HashMap<(String, String), MergeDecision>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    /// An oracle that answers, but only what it has been told.
    pub fn available() -> Self {
        Self {
            available: true,
            parents: HashMap::new(),
            chains: HashMap::new(),
            roots: HashMap::new(),
            merges: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// An oracle that fails every call with `Unavailable`.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    pub fn from_answers(answers: ScriptedAnswers) -> Self {
        let mut oracle = Self::available();
        for (child, parent) in answers.parents {
            oracle = oracle.with_parent(child, parent);
        }
        for (item, chain) in answers.chains {
            oracle = oracle.with_chain(item, chain);
        }
        for (name, root) in answers.roots {
            oracle = oracle.with_root(name, root);
        }
        for merge in answers.merges {
            let decision = MergeDecision {
                merge: merge.merge,
                canonical_name: merge.canonical_name,
            };
            oracle.merges.insert(merge_key(&merge.a, &merge.b), decision);
        }
        oracle
    }

    /// Load answers from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, OracleError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            OracleError::Unavailable(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        let answers: ScriptedAnswers = serde_yaml::from_str(&text)
            .map_err(|e| OracleError::InvalidAnswer(format!("answer file: {}", e)))?;
        Ok(Self::from_answers(answers))
    }

    pub fn with_parent(mut self, child: impl Into<String>, parent: impl Into<String>) -> Self {
        self.parents.insert(query_key(&child.into()), parent.into());
        self
    }

    pub fn with_chain<I, S>(mut self, item: impl Into<String>, chain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chains.insert(
            query_key(&item.into()),
            chain.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn with_root(mut self, name: impl Into<String>, root: impl Into<String>) -> Self {
        self.roots.insert(query_key(&name.into()), root.into());
        self
    }

    pub fn with_merge(mut self, a: &str, b: &str, canonical: impl Into<String>) -> Self {
        self.merges
            .insert(merge_key(a, b), MergeDecision::merge_into(canonical));
        self
    }

    pub fn with_no_merge(mut self, a: &str, b: &str) -> Self {
        self.merges.insert(merge_key(a, b), MergeDecision::keep_apart());
        self
    }

    /// Number of calls answered or refused so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available {
            Ok(())
        } else {
            Err(OracleError::Unavailable(
                "scripted oracle configured as unavailable".to_string(),
            ))
        }
    }
}

fn merge_key(a: &str, b: &str) -> (String, String) {
    let (a, b) = (query_key(a), query_key(b));
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[async_trait]
impl ClassificationOracle for ScriptedOracle {
    async fn select_parent(
        &self,
        child: &str,
        _candidates: &[String],
    ) -> Result<ParentSelection, OracleError> {
        self.enter()?;
        self.parents
            .get(&query_key(child))
            .map(|parent| ParentSelection {
                parent: parent.clone(),
                reasoning: "scripted".to_string(),
            })
            .ok_or_else(|| OracleError::NoAnswer(format!("parent of '{}'", child)))
    }

    async fn suggest_hierarchy_chain(
        &self,
        item: &str,
        _context: &str,
    ) -> Result<Vec<String>, OracleError> {
        self.enter()?;
        self.chains
            .get(&query_key(item))
            .cloned()
            .ok_or_else(|| OracleError::NoAnswer(format!("chain for '{}'", item)))
    }

    async fn resolve_semantic_root(&self, name: &str) -> Result<String, OracleError> {
        self.enter()?;
        self.roots
            .get(&query_key(name))
            .cloned()
            .ok_or_else(|| OracleError::NoAnswer(format!("root for '{}'", name)))
    }

    async fn decide_merge(&self, a: &str, b: &str) -> Result<MergeDecision, OracleError> {
        self.enter()?;
        self.merges
            .get(&merge_key(a, b))
            .cloned()
            .ok_or_else(|| OracleError::NoAnswer(format!("merge '{}' / '{}'", a, b)))
    }
}
