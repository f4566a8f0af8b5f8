//! Classified items and their leaf associations

use super::node::PathwayId;
use serde::{Deserialize, Serialize};

/// Identity of a classified domain item (an interaction record)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(i64);

impl ItemId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A domain item the hierarchy classifies.
///
/// The engine only reads `suggested_pathways` (ordered by priority) and
/// `proteins`. `payload` is carried through storage untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedItem {
    pub id: ItemId,
    pub label: String,
    #[serde(default)]
    pub proteins: Vec<String>,
    #[serde(default)]
    pub suggested_pathways: Vec<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ClassifiedItem {
    pub fn new(id: ItemId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            proteins: Vec::new(),
            suggested_pathways: Vec::new(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_proteins<I, S>(mut self, proteins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.proteins = proteins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_suggestion(mut self, pathway: impl Into<String>) -> Self {
        self.suggested_pathways.push(pathway.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Link between a pathway node and a classified item.
/// The `(pathway, item)` pair is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafAssociation {
    pub pathway: PathwayId,
    pub item: ItemId,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub assignment_method: String,
}

fn full_confidence() -> f32 {
    1.0
}

impl LeafAssociation {
    pub fn new(pathway: PathwayId, item: ItemId, method: impl Into<String>) -> Self {
        Self {
            pathway,
            item,
            confidence: 1.0,
            assignment_method: method.into(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn key(&self) -> (PathwayId, ItemId) {
        (self.pathway, self.item)
    }
}
