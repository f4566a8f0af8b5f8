//! Memoizing oracle wrapper
//!
//! Identical (normalized) queries reuse the first successful answer.
//! Failures are never cached so a later call can still succeed.

use super::{query_key, ClassificationOracle, MergeDecision, OracleError, ParentSelection};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
enum CacheKey {
    Parent { child: String, candidates: Vec<String> },
    Chain { item: String, context: String },
    Root { name: String },
    Merge { a: String, b: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "answer", rename_all = "snake_case")]
enum CachedAnswer {
    Parent(ParentSelection),
    Chain { chain: Vec<String> },
    Root { root: String },
    Merge(MergeDecision),
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    key: CacheKey,
    answer: CachedAnswer,
}

pub struct CachedOracle {
    inner: Arc<dyn ClassificationOracle>,
    answers: DashMap<CacheKey, CachedAnswer>,
    hits: AtomicUsize,
}

impl CachedOracle {
    pub fn new(inner: Arc<dyn ClassificationOracle>) -> Self {
        Self {
            inner,
            answers: DashMap::new(),
            hits: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.answers.clear();
    }

    /// Write all cached answers to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<usize> {
        let entries: Vec<CacheEntry> = self
            .answers
            .iter()
            .map(|e| CacheEntry {
                key: e.key().clone(),
                answer: e.value().clone(),
            })
            .collect();
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path, json)?;
        Ok(entries.len())
    }

    /// Merge answers from a JSON file written by [`save`](Self::save).
    /// A missing file loads nothing.
    pub fn load(&self, path: impl AsRef<Path>) -> std::io::Result<usize> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let entries: Vec<CacheEntry> = serde_json::from_str(&text)?;
        let count = entries.len();
        for entry in entries {
            self.answers.insert(entry.key, entry.answer);
        }
        Ok(count)
    }

    fn lookup(&self, key: &CacheKey) -> Option<CachedAnswer> {
        let found = self.answers.get(key).map(|e| e.value().clone());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }
}

#[async_trait]
impl ClassificationOracle for CachedOracle {
    async fn select_parent(
        &self,
        child: &str,
        candidates: &[String],
    ) -> Result<ParentSelection, OracleError> {
        let mut normalized: Vec<String> = candidates.iter().map(|c| query_key(c)).collect();
        normalized.sort();
        let key = CacheKey::Parent {
            child: query_key(child),
            candidates: normalized,
        };
        if let Some(CachedAnswer::Parent(answer)) = self.lookup(&key) {
            return Ok(answer);
        }
        let answer = self.inner.select_parent(child, candidates).await?;
        self.answers.insert(key, CachedAnswer::Parent(answer.clone()));
        Ok(answer)
    }

    async fn suggest_hierarchy_chain(
        &self,
        item: &str,
        context: &str,
    ) -> Result<Vec<String>, OracleError> {
        let key = CacheKey::Chain {
            item: query_key(item),
            context: query_key(context),
        };
        if let Some(CachedAnswer::Chain { chain }) = self.lookup(&key) {
            return Ok(chain);
        }
        let chain = self.inner.suggest_hierarchy_chain(item, context).await?;
        self.answers.insert(key, CachedAnswer::Chain { chain: chain.clone() });
        Ok(chain)
    }

    async fn resolve_semantic_root(&self, name: &str) -> Result<String, OracleError> {
        let key = CacheKey::Root {
            name: query_key(name),
        };
        if let Some(CachedAnswer::Root { root }) = self.lookup(&key) {
            return Ok(root);
        }
        let root = self.inner.resolve_semantic_root(name).await?;
        self.answers.insert(key, CachedAnswer::Root { root: root.clone() });
        Ok(root)
    }

    async fn decide_merge(&self, a: &str, b: &str) -> Result<MergeDecision, OracleError> {
        let (ka, kb) = (query_key(a), query_key(b));
        let key = if ka <= kb {
            CacheKey::Merge { a: ka, b: kb }
        } else {
            CacheKey::Merge { a: kb, b: ka }
        };
        if let Some(CachedAnswer::Merge(decision)) = self.lookup(&key) {
            return Ok(decision);
        }
        let decision = self.inner.decide_merge(a, b).await?;
        self.answers.insert(key, CachedAnswer::Merge(decision.clone()));
        Ok(decision)
    }
}
