//! Classification oracle: the external suggestion service the engine
//! consults for parent choices, hierarchy chains, root placement and
//! merge decisions.
//!
//! Implementations:
//! - `ScriptedOracle`: answers from preconfigured tables or a YAML file
//! - `CachedOracle`: memoizes any oracle by normalized query
//!
//! `OraclePool` bounds concurrency and applies a per-call timeout.

mod cache;
mod pool;
mod scripted;

pub use cache::CachedOracle;
pub use pool::OraclePool;
pub use scripted::{ScriptedAnswers, ScriptedMerge, ScriptedOracle};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parent chosen among candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentSelection {
    pub parent: String,
    #[serde(default)]
    pub reasoning: String,
}

impl ParentSelection {
    pub fn new(parent: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            reasoning: String::new(),
        }
    }
}

/// Whether two names denote the same pathway, and which name to keep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDecision {
    pub merge: bool,
    #[serde(default)]
    pub canonical_name: Option<String>,
}

impl MergeDecision {
    pub fn keep_apart() -> Self {
        Self {
            merge: false,
            canonical_name: None,
        }
    }

    pub fn merge_into(canonical: impl Into<String>) -> Self {
        Self {
            merge: true,
            canonical_name: Some(canonical.into()),
        }
    }
}

/// Errors from oracle calls. Callers treat all of them as "no usable
/// answer" and fall back.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle not available: {0}")]
    Unavailable(String),
    #[error("oracle has no answer: {0}")]
    NoAnswer(String),
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid oracle answer: {0}")]
    InvalidAnswer(String),
    #[error("oracle call failed: {0}")]
    Internal(String),
}

/// Abstract classification oracle.
///
/// Must be safe to call many times concurrently.
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    /// Pick one of `candidates` as the single parent of `child`.
    async fn select_parent(
        &self,
        child: &str,
        candidates: &[String],
    ) -> Result<ParentSelection, OracleError>;

    /// Suggest a chain `[root, ..., item]` placing `item` in the hierarchy.
    async fn suggest_hierarchy_chain(
        &self,
        item: &str,
        context: &str,
    ) -> Result<Vec<String>, OracleError>;

    /// Name the canonical root `name` belongs under.
    async fn resolve_semantic_root(&self, name: &str) -> Result<String, OracleError>;

    /// Decide whether two pathway names should be merged.
    async fn decide_merge(&self, a: &str, b: &str) -> Result<MergeDecision, OracleError>;
}

/// Normalize a query string for table and cache lookups.
pub(crate) fn query_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
