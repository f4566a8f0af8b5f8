//! Root placement for orphaned pathways
//!
//! Resolution order: oracle answer (validated against the catalog), then
//! the keyword lexicon, then the catalog's default root. Every input maps
//! to exactly one canonical root.

use crate::graph::{LinkSource, ParentLink, PathwayGraph, PathwayId, RootCatalog, ValidationError};
use crate::oracle::OraclePool;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescueSource {
    Oracle,
    Keywords,
    Default,
}

impl RescueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RescueSource::Oracle => "oracle",
            RescueSource::Keywords => "keywords",
            RescueSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescueDecision {
    pub root: String,
    pub source: RescueSource,
}

/// Result of attaching an orphan to its root
#[derive(Debug, Clone)]
pub struct RescueOutcome {
    pub node: PathwayId,
    pub root: PathwayId,
    pub decision: RescueDecision,
    pub detached: Vec<ParentLink>,
}

pub struct RescueResolver<'a> {
    catalog: &'a RootCatalog,
    pool: &'a OraclePool,
}

impl<'a> RescueResolver<'a> {
    pub fn new(catalog: &'a RootCatalog, pool: &'a OraclePool) -> Self {
        Self { catalog, pool }
    }

    pub async fn resolve(&self, name: &str) -> RescueDecision {
        let answer = self.pool.resolve_semantic_root(name).await;
        self.decide(name, answer)
    }

    /// Resolve many names with concurrent oracle calls, in input order.
    pub async fn resolve_many(&self, names: Vec<String>) -> Vec<RescueDecision> {
        let answers = self.pool.resolve_semantic_roots(names.clone()).await;
        names
            .iter()
            .zip(answers)
            .map(|(name, answer)| self.decide(name, answer))
            .collect()
    }

    /// Resolution without consulting the oracle.
    pub fn resolve_offline(catalog: &RootCatalog, name: &str) -> RescueDecision {
        if let Some(root) = catalog.match_keywords(name) {
            return RescueDecision {
                root: root.to_string(),
                source: RescueSource::Keywords,
            };
        }
        RescueDecision {
            root: catalog.default_root().to_string(),
            source: RescueSource::Default,
        }
    }

    fn decide(
        &self,
        name: &str,
        answer: Result<String, crate::oracle::OracleError>,
    ) -> RescueDecision {
        match answer {
            Ok(text) => match self.catalog.match_answer(&text) {
                Some(root) => {
                    return RescueDecision {
                        root: root.to_string(),
                        source: RescueSource::Oracle,
                    }
                }
                None => {
                    tracing::warn!(pathway = name, answer = %text, "oracle root answer matches no canonical root");
                }
            },
            Err(e) => {
                tracing::debug!(pathway = name, error = %e, "oracle root lookup failed, using lexicon");
            }
        }
        Self::resolve_offline(self.catalog, name)
    }

    /// Make `root` the only parent of `node`.
    pub fn attach(
        graph: &mut PathwayGraph,
        node: PathwayId,
        root: PathwayId,
    ) -> Result<Vec<ParentLink>, ValidationError> {
        if node == root {
            return Err(ValidationError::SelfLoop(node));
        }
        if !graph.contains(root) {
            return Err(ValidationError::UnknownPathway(root));
        }
        if !graph.contains(node) {
            return Err(ValidationError::UnknownPathway(node));
        }
        let mut detached = Vec::new();
        for parent in graph.parents_of(node).collect::<Vec<_>>() {
            if parent != root {
                detached.extend(graph.remove_link(node, parent));
            }
        }
        if !graph.has_link(node, root) {
            graph.add_link(ParentLink::new(node, root).with_source(LinkSource::Rescue))?;
        }
        Ok(detached)
    }

    /// Resolve a root for `node` and attach it there.
    pub async fn rescue(
        &self,
        graph: &mut PathwayGraph,
        node: PathwayId,
    ) -> Result<RescueOutcome, ValidationError> {
        let name = graph
            .name_of(node)
            .ok_or(ValidationError::UnknownPathway(node))?
            .to_string();
        if self.catalog.is_root_name(&name) {
            return Err(ValidationError::InvalidAnswer(format!(
                "'{}' is a canonical root and cannot be rescued",
                name
            )));
        }
        let decision = self.resolve(&name).await;
        self.apply(graph, node, decision)
    }

    pub fn apply(
        &self,
        graph: &mut PathwayGraph,
        node: PathwayId,
        decision: RescueDecision,
    ) -> Result<RescueOutcome, ValidationError> {
        let root = graph
            .id_of(&decision.root)
            .ok_or_else(|| ValidationError::UnknownName(decision.root.clone()))?;
        let detached = Self::attach(graph, node, root)?;
        tracing::info!(
            pathway = graph.name_of(node).unwrap_or_default(),
            root = %decision.root,
            source = ?decision.source,
            "rescued orphan pathway"
        );
        Ok(RescueOutcome {
            node,
            root,
            decision,
            detached,
        })
    }
}
