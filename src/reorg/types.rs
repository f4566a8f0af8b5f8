//! Types shared by the reorganization phases

use crate::graph::ValidationError;
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Pipeline phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Dedup,
    TreeEnforce,
    HierarchyRepair,
    AssociationSync,
    Pruning,
    PreflightValidation,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Dedup,
        Phase::TreeEnforce,
        Phase::HierarchyRepair,
        Phase::AssociationSync,
        Phase::Pruning,
        Phase::PreflightValidation,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Dedup => "dedup",
            Phase::TreeEnforce => "tree_enforce",
            Phase::HierarchyRepair => "hierarchy_repair",
            Phase::AssociationSync => "association_sync",
            Phase::Pruning => "pruning",
            Phase::PreflightValidation => "preflight_validation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == s)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a change did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    CreateNode,
    DeleteNode,
    Merge,
    AddLink,
    RemoveLink,
    Reparent,
    Associate,
    Dissociate,
}

/// One recorded graph mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub reason: String,
}

impl Change {
    pub fn new(kind: ChangeKind, entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            entity: entity.into(),
            old_value: None,
            new_value: None,
            reason: reason.into(),
        }
    }

    pub fn from_value(mut self, old: impl Into<String>) -> Self {
        self.old_value = Some(old.into());
        self
    }

    pub fn to_value(mut self, new: impl Into<String>) -> Self {
        self.new_value = Some(new.into());
        self
    }
}

/// Outcome of one phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub success: bool,
    pub changes: Vec<Change>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Nodes the phase could not bring into shape; surfaced, not fatal
    #[serde(default)]
    pub unresolved: Vec<String>,
}

impl PhaseResult {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            success: true,
            changes: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    pub fn record(&mut self, change: Change) {
        tracing::debug!(phase = %self.phase, kind = ?change.kind, entity = %change.entity, "{}", change.reason);
        self.changes.push(change);
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(phase = %self.phase, "{}", message);
        self.errors.push(message);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(phase = %self.phase, "{}", message);
        self.warnings.push(message);
    }

    /// Record an error and mark the phase failed.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.add_error(message);
        self.success = false;
    }
}

/// Identity of one orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Complete,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Complete => "complete",
            PhaseStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "complete" => Some(PhaseStatus::Complete),
            "failed" => Some(PhaseStatus::Failed),
            _ => None,
        }
    }
}

/// Persisted after every phase of a non-dry run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub run_id: RunId,
    pub phase: Phase,
    pub status: PhaseStatus,
    pub change_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn for_result(run_id: RunId, result: &PhaseResult) -> Self {
        Self {
            run_id,
            phase: result.phase,
            status: if result.success {
                PhaseStatus::Complete
            } else {
                PhaseStatus::Failed
            },
            change_count: result.changes.len(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReorgOptions {
    pub dry_run: bool,
    /// Explicit phase to start at; otherwise resume after the run's last
    /// completed checkpoint, or start at the beginning.
    pub start_phase: Option<Phase>,
    pub run_id: Option<RunId>,
}

impl ReorgOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Default::default()
        }
    }

    pub fn starting_at(mut self, phase: Phase) -> Self {
        self.start_phase = Some(phase);
        self
    }

    pub fn resuming(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorgReport {
    pub run_id: RunId,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub start_phase: Phase,
    pub phases: Vec<PhaseResult>,
    pub cancelled: bool,
    /// Root nodes created or detached while seeding
    pub seed_changes: Vec<Change>,
}

impl ReorgReport {
    /// Every phase from the start phase ran and succeeded.
    pub fn succeeded(&self) -> bool {
        let expected = Phase::ALL.len() - self.start_phase.index();
        !self.cancelled && self.phases.len() == expected && self.phases.iter().all(|p| p.success)
    }

    pub fn change_count(&self) -> usize {
        self.seed_changes.len() + self.phases.iter().map(|p| p.changes.len()).sum::<usize>()
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Reorganization run {}{}\n",
            self.run_id,
            if self.dry_run { " (dry run)" } else { "" }
        ));
        if !self.seed_changes.is_empty() {
            out.push_str(&format!("  seeding: {} change(s)\n", self.seed_changes.len()));
        }
        for phase in &self.phases {
            out.push_str(&format!(
                "  [{}] {:<22} changes={} errors={} warnings={}\n",
                if phase.success { "ok" } else { "FAILED" },
                phase.phase.as_str(),
                phase.changes.len(),
                phase.errors.len(),
                phase.warnings.len()
            ));
            for error in &phase.errors {
                out.push_str(&format!("      error: {}\n", error));
            }
            for name in &phase.unresolved {
                out.push_str(&format!("      unresolved: {}\n", name));
            }
        }
        if self.cancelled {
            out.push_str("  cancelled between phases\n");
        }
        out.push_str(if self.succeeded() { "Result: SUCCESS\n" } else { "Result: INCOMPLETE\n" });
        out
    }
}

/// The run could not continue. Checkpoints committed before the error
/// stay valid.
#[derive(Debug, Error)]
pub enum ReorgError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("root seeding failed: {0}")]
    Seed(#[source] ValidationError),
}
