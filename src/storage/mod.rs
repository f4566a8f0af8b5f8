//! Storage backends
//!
//! The engine persists through the `GraphStore` trait. `SqliteStore` keeps
//! pathways, parent links, items, leaf associations and run checkpoints in
//! one SQLite file.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{GraphStore, OpenStore, StorageError, StorageResult};
