//! PathwayEngine: the main entry point
//!
//! Holds the store, the oracle pool, the configuration and the root
//! catalog as explicit state. Every operation that writes the graph runs
//! as one unit of work under a single async writer lock.

use crate::config::{ConfigError, EngineConfig};
use crate::graph::{GraphSnapshot, PathwayGraph, RootCatalog, SeedReport, ValidationError};
use crate::hierarchy::recompute_derived;
use crate::oracle::{CachedOracle, ClassificationOracle, OraclePool};
use crate::reorg::{
    settle_node, CancellationToken, MergeOutcome, MigrationError, MigrationPlanner, PruneReport,
    ReorgError, ReorgOptions, ReorgReport, Reorganizer,
};
use crate::storage::{GraphStore, StorageError};
use crate::verify::{ConsistencyError, VerificationEngine, VerificationReport, VerifyOptions};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors surfaced by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Reorg(#[from] ReorgError),

    #[error("graph not ready: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

pub struct PathwayEngine {
    store: Arc<dyn GraphStore>,
    pool: OraclePool,
    cache: Option<Arc<CachedOracle>>,
    config: EngineConfig,
    catalog: RootCatalog,
    cancel: CancellationToken,
    writer: Mutex<()>,
}

impl PathwayEngine {
    /// Build an engine. With `oracle_cache_path` configured, oracle answers
    /// are memoized and the cache file is loaded now.
    pub fn new(
        store: Arc<dyn GraphStore>,
        oracle: Arc<dyn ClassificationOracle>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;
        let catalog = config.catalog()?;

        let (oracle, cache) = match &config.oracle_cache_path {
            Some(path) => {
                let cached = Arc::new(CachedOracle::new(oracle));
                let loaded = cached.load(path)?;
                tracing::debug!(path = %path.display(), answers = loaded, "loaded oracle cache");
                (cached.clone() as Arc<dyn ClassificationOracle>, Some(cached))
            }
            None => (oracle, None),
        };
        let pool = OraclePool::new(oracle)
            .with_concurrency(config.oracle_concurrency)
            .with_timeout(config.oracle_timeout());

        Ok(Self {
            store,
            pool,
            cache,
            config,
            catalog,
            cancel: CancellationToken::new(),
            writer: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &RootCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    /// Handle for stopping a running reorganization between phases
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn load_graph(&self) -> EngineResult<PathwayGraph> {
        Ok(self.store.load_graph()?)
    }

    /// Write the oracle cache back to its file, if one is configured.
    pub fn persist_oracle_cache(&self) -> EngineResult<usize> {
        match (&self.cache, &self.config.oracle_cache_path) {
            (Some(cache), Some(path)) => Ok(cache.save(path)?),
            _ => Ok(0),
        }
    }

    // === Units of work ===

    pub async fn seed(&self) -> EngineResult<SeedReport> {
        let _guard = self.writer.lock().await;
        let mut graph = self.store.load_graph()?;
        let report = self.catalog.seed(&mut graph)?;
        recompute_derived(&mut graph, &self.catalog);
        self.store.save_graph(&graph)?;
        Ok(report)
    }

    /// Replace the stored graph with `snapshot`. Dangling references are
    /// kept for verification to report.
    pub async fn import(&self, snapshot: GraphSnapshot) -> EngineResult<PathwayGraph> {
        let _guard = self.writer.lock().await;
        let graph = PathwayGraph::from_snapshot(snapshot)?;
        self.store.save_graph(&graph)?;
        tracing::info!(
            pathways = graph.node_count(),
            links = graph.link_count(),
            items = graph.item_count(),
            "imported graph"
        );
        Ok(graph)
    }

    pub async fn export(&self) -> EngineResult<GraphSnapshot> {
        let _guard = self.writer.lock().await;
        Ok(self.store.load_graph()?.to_snapshot())
    }

    /// Export only when verification is clean.
    pub async fn export_verified(&self) -> EngineResult<GraphSnapshot> {
        let _guard = self.writer.lock().await;
        let mut graph = self.store.load_graph()?;
        let engine = VerificationEngine::new(&self.catalog, &self.config, &self.pool);
        engine
            .verify(&mut graph, VerifyOptions::default())
            .await
            .ensure_ready()?;
        Ok(graph.to_snapshot())
    }

    pub async fn reorganize(&self, options: ReorgOptions) -> EngineResult<ReorgReport> {
        let _guard = self.writer.lock().await;
        let reorganizer = Reorganizer::new(self.store.as_ref(), &self.pool, &self.config, &self.catalog)
            .with_cancellation(self.cancel.clone());
        Ok(reorganizer.run(options).await?)
    }

    /// Run the verification battery; repairs are saved when allowed.
    pub async fn verify(&self, options: VerifyOptions) -> EngineResult<VerificationReport> {
        let _guard = self.writer.lock().await;
        let mut graph = self.store.load_graph()?;
        let engine = VerificationEngine::new(&self.catalog, &self.config, &self.pool);
        let report = engine.verify(&mut graph, options).await;
        if options.repairs_allowed() && report.repair_passes > 0 {
            self.store.save_graph(&graph)?;
        }
        Ok(report)
    }

    /// Merge the pathway named `source` into `target`.
    pub async fn merge(&self, source: &str, target: &str) -> EngineResult<MergeOutcome> {
        let _guard = self.writer.lock().await;
        let mut graph = self.store.load_graph()?;
        let source_id = graph
            .id_of(source)
            .ok_or_else(|| ValidationError::UnknownName(source.to_string()))?;
        let target_id = graph
            .id_of(target)
            .ok_or_else(|| ValidationError::UnknownName(target.to_string()))?;

        let planner = MigrationPlanner::new(&self.catalog);
        let plan = planner.build_plan(&graph, source_id, target_id)?;
        let outcome = planner.execute(&mut graph, &plan)?;
        recompute_derived(&mut graph, &self.catalog);
        self.store.save_graph(&graph)?;
        Ok(outcome)
    }

    /// Prune the pathway named `name` if that is safe, otherwise place it
    /// under a canonical root.
    pub async fn rescue(&self, name: &str) -> EngineResult<PruneReport> {
        let _guard = self.writer.lock().await;
        let mut graph = self.store.load_graph()?;
        let id = graph
            .id_of(name)
            .ok_or_else(|| ValidationError::UnknownName(name.to_string()))?;
        let report = settle_node(&mut graph, &self.catalog, &self.pool, id).await?;
        self.store.save_graph(&graph)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ClassifiedItem, ItemId, LeafAssociation, NewPathway};
    use crate::oracle::ScriptedOracle;
    use crate::storage::{OpenStore, SqliteStore};

    fn create_test_engine(oracle: ScriptedOracle) -> PathwayEngine {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        PathwayEngine::new(store, Arc::new(oracle), EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn seed_is_idempotent() {
        let engine = create_test_engine(ScriptedOracle::unavailable());
        assert_eq!(engine.seed().await.unwrap().created.len(), 7);
        assert!(engine.seed().await.unwrap().is_empty());
        let graph = engine.load_graph().unwrap();
        assert!(graph.nodes().all(|n| n.hierarchy_level == 0));
    }

    #[tokio::test]
    async fn merge_by_name_persists() {
        let engine = create_test_engine(ScriptedOracle::unavailable());
        engine.seed().await.unwrap();
        let mut graph = engine.load_graph().unwrap();
        let root = graph.id_of("Signal Transduction").unwrap();
        let keep = graph.add_node(NewPathway::named("NF-kB Signaling")).unwrap();
        let variant = graph.add_node(NewPathway::named("NFKB pathway")).unwrap();
        graph.add_edge(keep, root).unwrap();
        graph.add_edge(variant, root).unwrap();
        graph.add_item(ClassifiedItem::new(ItemId::new(1), "RELA<->NFKB1")).unwrap();
        graph
            .associate(LeafAssociation::new(variant, ItemId::new(1), "test"))
            .unwrap();
        engine.import(graph.to_snapshot()).await.unwrap();

        let outcome = engine.merge("NFKB pathway", "NF-kB Signaling").await.unwrap();
        assert_eq!(outcome.associations_moved, 1);

        let stored = engine.load_graph().unwrap();
        assert!(stored.id_of("NFKB pathway").is_none());
        assert!(stored.has_association(keep, ItemId::new(1)));
        assert_eq!(stored.node(keep).unwrap().usage_count, 1);
    }

    #[tokio::test]
    async fn unknown_names_are_validation_errors() {
        let engine = create_test_engine(ScriptedOracle::unavailable());
        engine.seed().await.unwrap();
        let err = engine.merge("Nope", "Proteostasis").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::UnknownName(_))));
        let err = engine.merge("Proteostasis", "Gene Expression").await.unwrap_err();
        assert!(matches!(err, EngineError::Migration(MigrationError::RootSource(_))));
    }

    #[tokio::test]
    async fn export_verified_refuses_broken_graph() {
        let engine = create_test_engine(ScriptedOracle::unavailable());
        engine.seed().await.unwrap();
        assert!(engine.export_verified().await.is_ok());

        let mut graph = engine.load_graph().unwrap();
        graph.add_node(NewPathway::named("Floating")).unwrap();
        engine.import(graph.to_snapshot()).await.unwrap();
        let err = engine.export_verified().await.unwrap_err();
        assert!(matches!(err, EngineError::Consistency(_)));
    }

    #[tokio::test]
    async fn oracle_cache_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            oracle_cache_path: Some(dir.path().join("oracle-cache.json")),
            ..Default::default()
        };
        let oracle = ScriptedOracle::available().with_root("Histone Deacetylation", "Gene Expression");
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = PathwayEngine::new(store, Arc::new(oracle), config.clone()).unwrap();
        engine.seed().await.unwrap();

        let mut graph = engine.load_graph().unwrap();
        graph.add_node(NewPathway::named("Histone Deacetylation")).unwrap();
        let item_holder = graph.id_of("Histone Deacetylation").unwrap();
        graph.add_item(ClassifiedItem::new(ItemId::new(1), "HDAC1<->HDAC2")).unwrap();
        graph
            .associate(LeafAssociation::new(item_holder, ItemId::new(1), "test"))
            .unwrap();
        engine.import(graph.to_snapshot()).await.unwrap();

        let report = engine.rescue("Histone Deacetylation").await.unwrap();
        assert_eq!(report.rescued.len(), 1);
        assert_eq!(engine.persist_oracle_cache().unwrap(), 1);

        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let reloaded =
            PathwayEngine::new(store, Arc::new(ScriptedOracle::unavailable()), config).unwrap();
        assert_eq!(reloaded.cache.as_ref().unwrap().len(), 1);
    }
}
