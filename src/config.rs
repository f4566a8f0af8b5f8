//! Engine configuration
//!
//! Loaded from YAML; every field has a default so an empty file (or no
//! file) yields the standard seven-root setup.

use crate::graph::{RootCatalog, RootDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Names legitimately placed directly under a root
const SHALLOW_EXEMPT: &[&str] = &[
    "Apoptosis",
    "Autophagy",
    "Necroptosis",
    "Ferroptosis",
    "MAPK Signaling",
    "PI3K/Akt Signaling",
    "Wnt Signaling",
    "Notch Signaling",
    "Glycolysis",
    "Oxidative Phosphorylation",
    "Mitosis",
    "Meiosis",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub roots: Vec<RootDefinition>,
    pub default_root: String,
    /// Pathway receiving items whose suggestions cannot be resolved
    pub default_pathway: String,
    pub shallow_exempt: Vec<String>,
    /// Edit-distance similarity at which two names become merge candidates
    pub similarity_threshold: f64,
    /// Containment only counts when the names differ by fewer characters
    pub containment_max_len_diff: usize,
    pub oracle_concurrency: usize,
    pub oracle_timeout_secs: u64,
    /// Repair + re-verify rounds before giving up
    pub max_repair_passes: usize,
    pub oracle_cache_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let catalog = RootCatalog::standard();
        Self {
            roots: catalog.roots().to_vec(),
            default_root: catalog.default_root().to_string(),
            default_pathway: "Protein Quality Control".to_string(),
            shallow_exempt: SHALLOW_EXEMPT.iter().map(|s| s.to_string()).collect(),
            similarity_threshold: 0.85,
            containment_max_len_diff: 15,
            oracle_concurrency: 15,
            oracle_timeout_secs: 60,
            max_repair_passes: 3,
            oracle_cache_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Load `path` if given, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.catalog()?;
        if self.default_pathway.trim().is_empty() {
            return Err(ConfigError::Invalid("default_pathway is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold {} outside [0, 1]",
                self.similarity_threshold
            )));
        }
        if self.oracle_concurrency == 0 {
            return Err(ConfigError::Invalid("oracle_concurrency must be positive".to_string()));
        }
        Ok(())
    }

    pub fn catalog(&self) -> Result<RootCatalog, ConfigError> {
        RootCatalog::new(self.roots.clone(), self.default_root.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    pub fn is_shallow_exempt(&self, name: &str) -> bool {
        self.shallow_exempt.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}
