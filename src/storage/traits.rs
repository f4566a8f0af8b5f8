//! Storage trait definitions

use crate::graph::PathwayGraph;
use crate::reorg::{CheckpointRecord, RunId};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Stored data is inconsistent: {0}")]
    Corrupt(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for pathway graph storage backends
///
/// Implementations must be thread-safe (Send + Sync). Every write is
/// atomic: a graph save either replaces the stored graph completely or
/// leaves it untouched.
pub trait GraphStore: Send + Sync {
    // === Graph ===

    /// Load the stored graph. Links and associations whose endpoints are
    /// gone come back as dangling entries.
    fn load_graph(&self) -> StorageResult<PathwayGraph>;

    /// Replace the stored graph
    fn save_graph(&self, graph: &PathwayGraph) -> StorageResult<()>;

    // === Runs ===

    /// Save the graph and a phase checkpoint in one transaction
    fn commit_phase(&self, graph: &PathwayGraph, checkpoint: &CheckpointRecord) -> StorageResult<()>;

    /// Insert or replace the checkpoint for `(run_id, phase)`
    fn save_checkpoint(&self, checkpoint: &CheckpointRecord) -> StorageResult<()>;

    /// Checkpoints of a run in phase order
    fn checkpoints(&self, run_id: RunId) -> StorageResult<Vec<CheckpointRecord>>;

    /// Checkpoint of the furthest phase a run reached
    fn latest_checkpoint(&self, run_id: RunId) -> StorageResult<Option<CheckpointRecord>> {
        Ok(self
            .checkpoints(run_id)?
            .into_iter()
            .max_by_key(|c| c.phase.index()))
    }

    /// Runs with at least one checkpoint, most recent first
    fn list_runs(&self) -> StorageResult<Vec<RunId>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
