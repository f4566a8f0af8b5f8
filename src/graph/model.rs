//! Adjacency-map pathway graph
//!
//! Nodes, parent links and leaf associations live in ordered maps so every
//! traversal is deterministic. The child → parents and parent → children
//! indexes are updated together by every mutation; a mutation that fails
//! validation leaves both untouched.

use super::association::{ClassifiedItem, ItemId, LeafAssociation};
use super::edge::ParentLink;
use super::error::{GraphResult, ValidationError};
use super::node::{NewPathway, PathwayId, PathwayNode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Everything detached from the graph when a node is removed.
#[derive(Debug, Clone)]
pub struct RemovedNode {
    pub node: PathwayNode,
    pub links: Vec<ParentLink>,
    pub associations: Vec<LeafAssociation>,
}

/// Flat, serializable form of a graph. Used for storage and import/export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<PathwayNode>,
    #[serde(default)]
    pub links: Vec<ParentLink>,
    #[serde(default)]
    pub items: Vec<ClassifiedItem>,
    #[serde(default)]
    pub associations: Vec<LeafAssociation>,
}

/// The in-memory pathway hierarchy
#[derive(Debug, Clone, Default)]
pub struct PathwayGraph {
    nodes: BTreeMap<PathwayId, PathwayNode>,
    names: HashMap<String, PathwayId>,
    parents: BTreeMap<PathwayId, BTreeSet<PathwayId>>,
    children: BTreeMap<PathwayId, BTreeSet<PathwayId>>,
    links: BTreeMap<(PathwayId, PathwayId), ParentLink>,
    items: BTreeMap<ItemId, ClassifiedItem>,
    associations: BTreeMap<(PathwayId, ItemId), LeafAssociation>,
    pathway_items: BTreeMap<PathwayId, BTreeSet<ItemId>>,
    item_pathways: BTreeMap<ItemId, BTreeSet<PathwayId>>,
    /// Links loaded from storage whose child or parent no longer exists
    dangling_links: Vec<ParentLink>,
    /// Associations loaded from storage whose pathway or item no longer exists
    dangling_associations: Vec<LeafAssociation>,
    next_id: i64,
}

impl PathwayGraph {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    // === Node Operations ===

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: PathwayId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: PathwayId) -> Option<&PathwayNode> {
        self.nodes.get(&id)
    }

    /// Mutable access for derived attributes and metadata folding.
    /// The name must not be changed through this handle.
    pub(crate) fn node_mut(&mut self, id: PathwayId) -> Option<&mut PathwayNode> {
        self.nodes.get_mut(&id)
    }

    pub fn id_of(&self, name: &str) -> Option<PathwayId> {
        self.names.get(name).copied()
    }

    pub fn node_by_name(&self, name: &str) -> Option<&PathwayNode> {
        self.id_of(name).and_then(|id| self.nodes.get(&id))
    }

    pub fn name_of(&self, id: PathwayId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.name.as_str())
    }

    /// Nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &PathwayNode> {
        self.nodes.values()
    }

    pub fn ids(&self) -> Vec<PathwayId> {
        self.nodes.keys().copied().collect()
    }

    /// Create a node with a fresh id.
    pub fn add_node(&mut self, new: NewPathway) -> GraphResult<PathwayId> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.names.contains_key(&name) {
            return Err(ValidationError::DuplicateName(name));
        }

        let id = PathwayId::new(self.next_id.max(1));
        let mut node = PathwayNode::new(id, name);
        node.is_synthetic = new.is_synthetic;
        node.ontology_ref = new.ontology_ref;
        node.description = new.description;
        self.attach_node(node);
        Ok(id)
    }

    /// Insert a node that already carries its id (storage and import path).
    /// Empty names are accepted here so verification can report them.
    pub fn insert_node(&mut self, node: PathwayNode) -> GraphResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(ValidationError::DuplicateId(node.id));
        }
        if self.names.contains_key(&node.name) {
            return Err(ValidationError::DuplicateName(node.name));
        }
        self.attach_node(node);
        Ok(())
    }

    fn attach_node(&mut self, node: PathwayNode) {
        let id = node.id;
        self.next_id = self.next_id.max(id.get() + 1);
        self.names.insert(node.name.clone(), id);
        self.parents.insert(id, BTreeSet::new());
        self.children.insert(id, BTreeSet::new());
        self.pathway_items.insert(id, BTreeSet::new());
        self.nodes.insert(id, node);
    }

    /// Remove a node together with every link and association touching it.
    pub fn remove_node(&mut self, id: PathwayId) -> GraphResult<RemovedNode> {
        if !self.nodes.contains_key(&id) {
            return Err(ValidationError::UnknownPathway(id));
        }

        let mut links = Vec::new();
        for parent in self.parents_of(id).collect::<Vec<_>>() {
            links.extend(self.remove_link(id, parent));
        }
        for child in self.children_of(id).collect::<Vec<_>>() {
            links.extend(self.remove_link(child, id));
        }

        let mut associations = Vec::new();
        for item in self.items_of(id).collect::<Vec<_>>() {
            associations.extend(self.dissociate(id, item));
        }

        self.parents.remove(&id);
        self.children.remove(&id);
        self.pathway_items.remove(&id);
        let node = self
            .nodes
            .remove(&id)
            .ok_or(ValidationError::UnknownPathway(id))?;
        self.names.remove(&node.name);

        Ok(RemovedNode {
            node,
            links,
            associations,
        })
    }

    // === Link Operations ===

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn links(&self) -> impl Iterator<Item = &ParentLink> {
        self.links.values()
    }

    pub fn link(&self, child: PathwayId, parent: PathwayId) -> Option<&ParentLink> {
        self.links.get(&(child, parent))
    }

    pub fn has_link(&self, child: PathwayId, parent: PathwayId) -> bool {
        self.links.contains_key(&(child, parent))
    }

    /// Add `child → parent` with default metadata.
    pub fn add_edge(&mut self, child: PathwayId, parent: PathwayId) -> GraphResult<()> {
        self.add_link(ParentLink::new(child, parent))
    }

    /// Add a link. Self-loops, missing endpoints, duplicates and
    /// out-of-range confidences are rejected without side effects.
    /// Cycle prevention is the caller's job (see [`crate::hierarchy::CycleGuard`]).
    pub fn add_link(&mut self, link: ParentLink) -> GraphResult<()> {
        if link.child == link.parent {
            return Err(ValidationError::SelfLoop(link.child));
        }
        if !self.nodes.contains_key(&link.child) {
            return Err(ValidationError::UnknownPathway(link.child));
        }
        if !self.nodes.contains_key(&link.parent) {
            return Err(ValidationError::UnknownPathway(link.parent));
        }
        if !(0.0..=1.0).contains(&link.confidence) {
            return Err(ValidationError::Confidence(link.confidence));
        }
        if self.links.contains_key(&link.key()) {
            return Err(ValidationError::DuplicateLink {
                child: link.child,
                parent: link.parent,
            });
        }

        self.parents.entry(link.child).or_default().insert(link.parent);
        self.children.entry(link.parent).or_default().insert(link.child);
        self.links.insert(link.key(), link);
        Ok(())
    }

    pub fn remove_link(&mut self, child: PathwayId, parent: PathwayId) -> Option<ParentLink> {
        let link = self.links.remove(&(child, parent))?;
        if let Some(set) = self.parents.get_mut(&child) {
            set.remove(&parent);
        }
        if let Some(set) = self.children.get_mut(&parent) {
            set.remove(&child);
        }
        Some(link)
    }

    /// Parents of `id`, ascending by id
    pub fn parents_of(&self, id: PathwayId) -> impl Iterator<Item = PathwayId> + '_ {
        self.parents.get(&id).into_iter().flatten().copied()
    }

    /// Children of `id`, ascending by id
    pub fn children_of(&self, id: PathwayId) -> impl Iterator<Item = PathwayId> + '_ {
        self.children.get(&id).into_iter().flatten().copied()
    }

    pub fn parent_count(&self, id: PathwayId) -> usize {
        self.parents.get(&id).map_or(0, BTreeSet::len)
    }

    pub fn child_count(&self, id: PathwayId) -> usize {
        self.children.get(&id).map_or(0, BTreeSet::len)
    }

    /// Nodes with more than one parent link, ascending by id
    pub fn multi_parent_nodes(&self) -> Vec<PathwayId> {
        self.parents
            .iter()
            .filter(|(_, parents)| parents.len() > 1)
            .map(|(id, _)| *id)
            .collect()
    }

    // === Item Operations ===

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn item(&self, id: ItemId) -> Option<&ClassifiedItem> {
        self.items.get(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &ClassifiedItem> {
        self.items.values()
    }

    pub fn add_item(&mut self, item: ClassifiedItem) -> GraphResult<()> {
        if self.items.contains_key(&item.id) {
            return Err(ValidationError::DuplicateItem(item.id));
        }
        self.item_pathways.insert(item.id, BTreeSet::new());
        self.items.insert(item.id, item);
        Ok(())
    }

    // === Association Operations ===

    pub fn association_count(&self) -> usize {
        self.associations.len()
    }

    pub fn associations(&self) -> impl Iterator<Item = &LeafAssociation> {
        self.associations.values()
    }

    pub fn association(&self, pathway: PathwayId, item: ItemId) -> Option<&LeafAssociation> {
        self.associations.get(&(pathway, item))
    }

    pub fn has_association(&self, pathway: PathwayId, item: ItemId) -> bool {
        self.associations.contains_key(&(pathway, item))
    }

    /// Items associated with a pathway, ascending by id
    pub fn items_of(&self, pathway: PathwayId) -> impl Iterator<Item = ItemId> + '_ {
        self.pathway_items.get(&pathway).into_iter().flatten().copied()
    }

    /// Pathways an item is associated with, ascending by id
    pub fn pathways_of(&self, item: ItemId) -> impl Iterator<Item = PathwayId> + '_ {
        self.item_pathways.get(&item).into_iter().flatten().copied()
    }

    pub fn association_count_of(&self, pathway: PathwayId) -> usize {
        self.pathway_items.get(&pathway).map_or(0, BTreeSet::len)
    }

    pub fn associate(&mut self, association: LeafAssociation) -> GraphResult<()> {
        if !self.nodes.contains_key(&association.pathway) {
            return Err(ValidationError::UnknownPathway(association.pathway));
        }
        if !self.items.contains_key(&association.item) {
            return Err(ValidationError::UnknownItem(association.item));
        }
        if !(0.0..=1.0).contains(&association.confidence) {
            return Err(ValidationError::Confidence(association.confidence));
        }
        if self.associations.contains_key(&association.key()) {
            return Err(ValidationError::DuplicateAssociation {
                pathway: association.pathway,
                item: association.item,
            });
        }

        self.pathway_items
            .entry(association.pathway)
            .or_default()
            .insert(association.item);
        self.item_pathways
            .entry(association.item)
            .or_default()
            .insert(association.pathway);
        self.associations.insert(association.key(), association);
        Ok(())
    }

    pub fn dissociate(&mut self, pathway: PathwayId, item: ItemId) -> Option<LeafAssociation> {
        let association = self.associations.remove(&(pathway, item))?;
        if let Some(set) = self.pathway_items.get_mut(&pathway) {
            set.remove(&item);
        }
        if let Some(set) = self.item_pathways.get_mut(&item) {
            set.remove(&pathway);
        }
        Some(association)
    }

    /// Items without any association, ascending by id
    pub fn unassociated_items(&self) -> Vec<ItemId> {
        self.item_pathways
            .iter()
            .filter(|(_, pathways)| pathways.is_empty())
            .map(|(id, _)| *id)
            .collect()
    }

    // === Dangling References ===

    pub fn dangling_links(&self) -> &[ParentLink] {
        &self.dangling_links
    }

    pub fn take_dangling_links(&mut self) -> Vec<ParentLink> {
        std::mem::take(&mut self.dangling_links)
    }

    pub fn dangling_associations(&self) -> &[LeafAssociation] {
        &self.dangling_associations
    }

    pub fn take_dangling_associations(&mut self) -> Vec<LeafAssociation> {
        std::mem::take(&mut self.dangling_associations)
    }

    // === Snapshots ===

    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.values().cloned().collect(),
            links: self
                .links
                .values()
                .chain(self.dangling_links.iter())
                .cloned()
                .collect(),
            items: self.items.values().cloned().collect(),
            associations: self
                .associations
                .values()
                .chain(self.dangling_associations.iter())
                .cloned()
                .collect(),
        }
    }

    /// Rebuild a graph from its flat form. Links and associations whose
    /// endpoints are missing are kept aside as dangling instead of failing
    /// the load; duplicates and self-loops are rejected.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> GraphResult<Self> {
        let mut graph = Self::new();
        for node in snapshot.nodes {
            graph.insert_node(node)?;
        }
        for item in snapshot.items {
            graph.add_item(item)?;
        }
        for link in snapshot.links {
            if link.child == link.parent {
                return Err(ValidationError::SelfLoop(link.child));
            }
            if !graph.contains(link.child) || !graph.contains(link.parent) {
                graph.dangling_links.push(link);
                continue;
            }
            graph.add_link(link)?;
        }
        for association in snapshot.associations {
            if !graph.contains(association.pathway) || graph.item(association.item).is_none() {
                graph.dangling_associations.push(association);
                continue;
            }
            graph.associate(association)?;
        }
        Ok(graph)
    }
}
