//! Shared fixtures for integration tests
//!
//! Builds engines over in-memory or on-disk stores and small graphs
//! hanging off the standard canonical roots.

#![allow(dead_code)]

use pathway_hierarchy::{
    ClassifiedItem, EngineConfig, ItemId, LeafAssociation, NewPathway, OpenStore, PathwayEngine,
    PathwayGraph, PathwayId, RootCatalog, ScriptedOracle, SqliteStore,
};
use std::path::Path;
use std::sync::Arc;

pub fn catalog() -> RootCatalog {
    EngineConfig::default().catalog().unwrap()
}

/// Engine over a fresh in-memory store.
pub fn memory_engine(oracle: ScriptedOracle) -> PathwayEngine {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    PathwayEngine::new(store, Arc::new(oracle), EngineConfig::default()).unwrap()
}

/// Engine over an SQLite file, so a second engine can reopen it.
pub fn file_engine(path: &Path, oracle: ScriptedOracle) -> PathwayEngine {
    let store = Arc::new(SqliteStore::open(path).unwrap());
    PathwayEngine::new(store, Arc::new(oracle), EngineConfig::default()).unwrap()
}

/// A graph holding only the seeded roots.
pub fn seeded_graph() -> PathwayGraph {
    let mut graph = PathwayGraph::new();
    catalog().seed(&mut graph).unwrap();
    graph
}

/// Small builder over a seeded graph, addressing nodes by name.
pub struct GraphBuilder {
    pub graph: PathwayGraph,
    next_item: i64,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: seeded_graph(),
            next_item: 1,
        }
    }

    pub fn empty() -> Self {
        Self {
            graph: PathwayGraph::new(),
            next_item: 1,
        }
    }

    pub fn id(&self, name: &str) -> PathwayId {
        self.graph
            .id_of(name)
            .unwrap_or_else(|| panic!("no pathway named '{}'", name))
    }

    pub fn node(mut self, name: &str) -> Self {
        self.graph.add_node(NewPathway::named(name)).unwrap();
        self
    }

    pub fn node_with_ref(mut self, name: &str, ontology_id: &str) -> Self {
        self.graph
            .add_node(NewPathway::named(name).with_ontology_ref(ontology_id))
            .unwrap();
        self
    }

    /// Add `child → parent`, creating `child` if needed.
    pub fn under(mut self, child: &str, parent: &str) -> Self {
        let child_id = match self.graph.id_of(child) {
            Some(id) => id,
            None => self.graph.add_node(NewPathway::named(child)).unwrap(),
        };
        let parent_id = self.id(parent);
        self.graph.add_edge(child_id, parent_id).unwrap();
        self
    }

    /// Add an item associated with `pathway`.
    pub fn item_on(mut self, pathway: &str, label: &str) -> Self {
        let item = self.new_item(ClassifiedItem::new(ItemId::new(self.next_item), label));
        let pathway = self.id(pathway);
        self.graph
            .associate(LeafAssociation::new(pathway, item, "fixture"))
            .unwrap();
        self
    }

    /// Add an item with no association.
    pub fn loose_item(mut self, label: &str, suggestions: &[&str]) -> Self {
        let mut item = ClassifiedItem::new(ItemId::new(self.next_item), label);
        for suggestion in suggestions {
            item = item.with_suggestion(*suggestion);
        }
        self.new_item(item);
        self
    }

    fn new_item(&mut self, item: ClassifiedItem) -> ItemId {
        let id = item.id;
        self.graph.add_item(item).unwrap();
        self.next_item += 1;
        id
    }

    pub fn build(self) -> PathwayGraph {
        self.graph
    }
}

/// Every non-root node has exactly one parent and sits one level below it.
pub fn assert_tree(graph: &PathwayGraph, catalog: &RootCatalog) {
    for node in graph.nodes() {
        if catalog.is_root(graph, node.id) {
            assert_eq!(node.hierarchy_level, 0, "root {} not at level 0", node.name);
            assert_eq!(graph.parent_count(node.id), 0, "root {} has a parent", node.name);
            continue;
        }
        let parents: Vec<PathwayId> = graph.parents_of(node.id).collect();
        assert_eq!(parents.len(), 1, "{} has {} parents", node.name, parents.len());
        let parent = graph.node(parents[0]).unwrap();
        assert_eq!(
            node.hierarchy_level,
            parent.hierarchy_level + 1,
            "{} not one level below {}",
            node.name,
            parent.name
        );
    }
}
