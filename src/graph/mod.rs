//! Core graph data structures

mod association;
mod edge;
mod error;
mod model;
mod node;
mod roots;


pub use association::{ClassifiedItem, ItemId, LeafAssociation};
pub use edge::{LinkSource, ParentLink, RelationshipKind};
pub use error::{CycleError, GraphResult, ValidationError};
pub use model::{GraphSnapshot, PathwayGraph, RemovedNode};
pub use node::{NewPathway, OntologyRef, PathwayId, PathwayNode, UNREACHABLE_LEVEL};
pub use roots::{RootCatalog, RootDefinition, SeedReport};
