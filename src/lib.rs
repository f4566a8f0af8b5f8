//! Pathway Hierarchy: a curated tree of biological pathways
//!
//! Maintains a directed graph of pathway nodes under a fixed set of
//! canonical roots, with classified items attached to leaf pathways, and
//! reorganizes it into a single-parent tree through a checkpointed,
//! resumable sequence of phases.
//!
//! # Core Concepts
//!
//! - **Pathways**: named nodes with derived level, leaf flag and ancestry
//! - **Parent links**: child → parent edges; the graph stays acyclic
//! - **Leaf associations**: classified items attached to pathways
//! - **Oracle**: external suggestions for parents, chains, roots and merges
//! - **Verification**: graded invariant checks with bounded auto-repair
//!
//! # Example
//!
//! ```
//! use pathway_hierarchy::{EngineConfig, NewPathway, PathwayGraph};
//!
//! let catalog = EngineConfig::default().catalog().unwrap();
//! let mut graph = PathwayGraph::new();
//! catalog.seed(&mut graph).unwrap();
//! let child = graph.add_node(NewPathway::named("Mitophagy")).unwrap();
//! let root = graph.id_of("Proteostasis").unwrap();
//! graph.add_edge(child, root).unwrap();
//! ```

pub mod config;
mod engine;
mod graph;
pub mod hierarchy;
pub mod oracle;
pub mod reorg;
pub mod storage;
pub mod verify;

pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, EngineResult, PathwayEngine};
pub use graph::{
    ClassifiedItem, CycleError, GraphResult, GraphSnapshot, ItemId, LeafAssociation, LinkSource,
    NewPathway, OntologyRef, ParentLink, PathwayGraph, PathwayId, PathwayNode, RelationshipKind,
    RemovedNode, RootCatalog, RootDefinition, SeedReport, ValidationError, UNREACHABLE_LEVEL,
};
pub use oracle::{CachedOracle, ClassificationOracle, OracleError, OraclePool, ScriptedOracle};
pub use reorg::{
    CancellationToken, Phase, PhaseStatus, ReorgError, ReorgOptions, ReorgReport, Reorganizer,
    RunId,
};
pub use storage::{GraphStore, OpenStore, SqliteStore, StorageError, StorageResult};
pub use verify::{ReportStatus, VerificationEngine, VerificationReport, VerifyOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
