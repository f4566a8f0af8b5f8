//! Canonical root catalog
//!
//! The fixed set of top-level categories every pathway ultimately belongs
//! to, with the keyword lexicon used to place orphans without an oracle.

use super::edge::ParentLink;
use super::error::{GraphResult, ValidationError};
use super::model::PathwayGraph;
use super::node::{NewPathway, PathwayId};
use serde::{Deserialize, Serialize};

/// One canonical root and its placement keywords
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootDefinition {
    pub name: String,
    #[serde(default)]
    pub ontology_id: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl RootDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ontology_id: None,
            keywords: Vec::new(),
        }
    }

    pub fn with_ontology_id(mut self, id: impl Into<String>) -> Self {
        self.ontology_id = Some(id.into());
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Number of lexicon keywords occurring in `lowercase_name`
    fn keyword_score(&self, lowercase_name: &str) -> usize {
        self.keywords
            .iter()
            .filter(|kw| !kw.is_empty() && lowercase_name.contains(kw.to_lowercase().as_str()))
            .count()
    }
}

/// Outcome of [`RootCatalog::seed`]
#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    pub created: Vec<PathwayId>,
    pub detached: Vec<ParentLink>,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.detached.is_empty()
    }
}

/// The canonical root set plus the designated default root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCatalog {
    roots: Vec<RootDefinition>,
    default_root: String,
}

impl Default for RootCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl RootCatalog {
    /// Build a catalog. Root names must be non-empty and unique and the
    /// default root must be one of them.
    pub fn new(roots: Vec<RootDefinition>, default_root: impl Into<String>) -> GraphResult<Self> {
        let default_root = default_root.into();
        let mut seen = std::collections::HashSet::new();
        for root in &roots {
            if root.name.trim().is_empty() {
                return Err(ValidationError::EmptyName);
            }
            if !seen.insert(root.name.as_str()) {
                return Err(ValidationError::DuplicateName(root.name.clone()));
            }
        }
        if !roots.iter().any(|r| r.name == default_root) {
            return Err(ValidationError::UnknownName(default_root));
        }
        Ok(Self {
            roots,
            default_root,
        })
    }

    /// The seven cellular-function roots
    pub fn standard() -> Self {
        Self {
            roots: standard_roots(),
            default_root: "Proteostasis".to_string(),
        }
    }

    pub fn roots(&self) -> &[RootDefinition] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.roots.iter().map(|r| r.name.clone()).collect()
    }

    pub fn default_root(&self) -> &str {
        &self.default_root
    }

    pub fn is_root_name(&self, name: &str) -> bool {
        self.roots.iter().any(|r| r.name == name)
    }

    /// Case-insensitive lookup of a root name
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        let wanted = name.trim().to_lowercase();
        self.roots
            .iter()
            .find(|r| r.name.to_lowercase() == wanted)
            .map(|r| r.name.as_str())
    }

    pub fn is_root(&self, graph: &PathwayGraph, id: PathwayId) -> bool {
        graph
            .name_of(id)
            .map(|name| self.is_root_name(name))
            .unwrap_or(false)
    }

    /// Ids of the roots present in `graph`, in catalog order
    pub fn root_ids(&self, graph: &PathwayGraph) -> Vec<PathwayId> {
        self.roots
            .iter()
            .filter_map(|r| graph.id_of(&r.name))
            .collect()
    }

    /// Roots missing from `graph`, in catalog order
    pub fn missing_roots(&self, graph: &PathwayGraph) -> Vec<String> {
        self.roots
            .iter()
            .filter(|r| graph.id_of(&r.name).is_none())
            .map(|r| r.name.clone())
            .collect()
    }

    /// Match a free-text answer against the roots: the answer must contain
    /// a root name or be contained in one (case-insensitive).
    pub fn match_answer(&self, answer: &str) -> Option<&str> {
        let answer = answer.trim().to_lowercase();
        if answer.is_empty() {
            return None;
        }
        self.roots
            .iter()
            .find(|r| {
                let root = r.name.to_lowercase();
                answer.contains(&root) || root.contains(&answer)
            })
            .map(|r| r.name.as_str())
    }

    /// Highest keyword score wins; earlier roots win ties. `None` when no
    /// keyword matches at all.
    pub fn match_keywords(&self, name: &str) -> Option<&str> {
        let lowered = name.to_lowercase();
        let mut best: Option<(&str, usize)> = None;
        for root in &self.roots {
            let score = root.keyword_score(&lowered);
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((root.name.as_str(), score));
            }
        }
        best.map(|(name, _)| name)
    }

    /// Ensure every root exists and has no parent links.
    pub fn seed(&self, graph: &mut PathwayGraph) -> GraphResult<SeedReport> {
        let mut created = Vec::new();
        for root in &self.roots {
            if graph.id_of(&root.name).is_some() {
                continue;
            }
            let mut new = NewPathway::named(&root.name);
            if let Some(ontology_id) = &root.ontology_id {
                new = new.with_ontology_ref(ontology_id);
            }
            let id = graph.add_node(new)?;
            tracing::info!(root = %root.name, %id, "seeded canonical root");
            created.push(id);
        }
        let mut report = self.normalize_existing(graph);
        report.created = created;
        Ok(report)
    }

    /// Strip parent links from the roots already in `graph` and reset their
    /// level. Missing roots stay missing.
    pub fn normalize_existing(&self, graph: &mut PathwayGraph) -> SeedReport {
        let mut report = SeedReport::default();
        for root in &self.roots {
            let Some(id) = graph.id_of(&root.name) else {
                continue;
            };

            for parent in graph.parents_of(id).collect::<Vec<_>>() {
                if let Some(link) = graph.remove_link(id, parent) {
                    tracing::warn!(root = %root.name, %parent, "removed parent link from root");
                    report.detached.push(link);
                }
            }

            if let Some(node) = graph.node_mut(id) {
                node.hierarchy_level = 0;
                if node.ontology_ref.is_none() {
                    if let Some(ontology_id) = &root.ontology_id {
                        node.ontology_ref = Some(super::node::OntologyRef::new(ontology_id));
                    }
                }
            }
        }
        report
    }
}

fn standard_roots() -> Vec<RootDefinition> {
    vec![
        RootDefinition::new("Proteostasis")
            .with_ontology_id("GO:0006457")
            .with_keywords(&[
                "protein fold", "ubiquitin", "proteasome", "autophagy", "chaperone",
                "aggregate", "erad", "misfolded", "degradation", "hsp", "heat shock",
                "deubiquit", "aggresome", "lysosom", "quality control", "proteostasis",
                "proteotoxic", "unfolded", "upr", "aggrephagy",
            ]),
        RootDefinition::new("Metabolism & Bioenergetics")
            .with_ontology_id("GO:0008152")
            .with_keywords(&[
                "metabol", "glycol", "oxidat", "mitochond", "atp", "energy", "krebs",
                "tca", "fatty acid", "lipid", "glucose", "insulin", "ampk", "mtor",
                "nutrient", "biosynthesis", "bioenergetics", "respiration",
                "phosphorylation", "amino acid",
            ]),
        RootDefinition::new("Membrane & Transport")
            .with_ontology_id("GO:0016192")
            .with_keywords(&[
                "vesicle", "exocyt", "endocyt", "traffic", "secretion", "golgi",
                "er-golgi", "snare", "rab", "clathrin", "copi", "copii",
                "membrane fusion", "ion transport", "membrane dynamics", "er transport",
                "lysosomal transport",
            ]),
        RootDefinition::new("Genome Maintenance")
            .with_ontology_id("GO:0006281")
            .with_keywords(&[
                "dna repair", "replication", "chromatin", "histone", "nucleosome",
                "homologous recombination", "nhej", "base excision",
                "nucleotide excision", "telomere", "dna damage", "genome stability",
                "dna integrity", "double-strand break", "single-strand break",
            ]),
        RootDefinition::new("Gene Expression")
            .with_ontology_id("GO:0010467")
            .with_keywords(&[
                "transcription", "translation", "rna processing", "splicing", "mrna",
                "ribosome", "polymerase", "promoter", "enhancer", "epigenetic",
                "gene regulation", "mrna stability", "rna polymerase",
                "transcription factor", "trna", "rrna",
            ]),
        RootDefinition::new("Signal Transduction")
            .with_ontology_id("GO:0007165")
            .with_keywords(&[
                "signal", "kinase", "phosphat", "receptor", "mapk", "erk", "akt",
                "pi3k", "wnt", "notch", "hedgehog", "hippo", "jak", "stat", "nfkb",
                "tgf", "egf", "vegf", "transduction", "cascade", "apoptotic signaling",
                "cell cycle checkpoint", "immune signaling", "neuronal signaling",
            ]),
        RootDefinition::new("Cytoskeletal Dynamics")
            .with_ontology_id("GO:0007010")
            .with_keywords(&[
                "actin", "tubulin", "cytoskelet", "microtubule", "motor", "dynein",
                "kinesin", "myosin", "intermediate filament", "cell shape", "motil",
                "migration", "focal adhesion", "lamellipod", "cytoskeletal dynamics",
                "cell adhesion",
            ]),
    ]
}
