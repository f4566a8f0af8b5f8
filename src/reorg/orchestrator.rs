//! Checkpointed phase state machine
//!
//! Each phase works on a copy of the graph. A successful phase commits its
//! graph together with a `Complete` checkpoint in one transaction; a failed
//! phase only records a `Failed` checkpoint, so its partial work is never
//! persisted and a resume restarts it from the last committed graph.

use super::cancel::CancellationToken;
use super::types::{
    Change, ChangeKind, CheckpointRecord, Phase, PhaseResult, PhaseStatus, ReorgError, ReorgOptions,
    ReorgReport, RunId,
};
use super::{chain, dedup, link_label, pathway_label, prune, sync, tree, PhaseContext};
use crate::config::EngineConfig;
use crate::graph::{PathwayGraph, RootCatalog};
use crate::hierarchy::recompute_derived;
use crate::oracle::OraclePool;
use crate::storage::GraphStore;
use crate::verify::{run_named, Severity, PREFLIGHT_CHECKS};
use chrono::Utc;
use std::time::Instant;

/// Drives a reorganization run against a store
pub struct Reorganizer<'a> {
    store: &'a dyn GraphStore,
    pool: &'a OraclePool,
    config: &'a EngineConfig,
    catalog: &'a RootCatalog,
    cancel: CancellationToken,
}

impl<'a> Reorganizer<'a> {
    pub fn new(
        store: &'a dyn GraphStore,
        pool: &'a OraclePool,
        config: &'a EngineConfig,
        catalog: &'a RootCatalog,
    ) -> Self {
        Self {
            store,
            pool,
            config,
            catalog,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Phase a run should start at: after its last completed phase, or at
    /// the phase that failed. A finished run re-runs the final gate.
    pub fn resume_point(&self, run_id: RunId) -> Result<Phase, ReorgError> {
        let Some(last) = self.store.latest_checkpoint(run_id)? else {
            return Ok(Phase::Dedup);
        };
        Ok(match last.status {
            PhaseStatus::Failed => last.phase,
            PhaseStatus::Complete => last.phase.next().unwrap_or(Phase::PreflightValidation),
        })
    }

    pub async fn run(&self, options: ReorgOptions) -> Result<ReorgReport, ReorgError> {
        let run_id = options.run_id.unwrap_or_default();
        let start_phase = match options.start_phase {
            Some(phase) => phase,
            None => self.resume_point(run_id)?,
        };

        let mut graph = self.store.load_graph()?;
        let seed = self.catalog.seed(&mut graph).map_err(ReorgError::Seed)?;
        let mut seed_changes = Vec::new();
        for id in &seed.created {
            seed_changes.push(Change::new(
                ChangeKind::CreateNode,
                pathway_label(&graph, *id),
                "canonical root missing",
            ));
        }
        for link in &seed.detached {
            seed_changes.push(Change::new(
                ChangeKind::RemoveLink,
                link_label(&graph, link),
                "canonical roots have no parents",
            ));
        }
        recompute_derived(&mut graph, self.catalog);

        let ctx = PhaseContext {
            catalog: self.catalog,
            config: self.config,
            pool: self.pool,
        };
        let mut report = ReorgReport {
            run_id,
            dry_run: options.dry_run,
            started_at: Utc::now(),
            start_phase,
            phases: Vec::new(),
            cancelled: false,
            seed_changes,
        };

        tracing::info!(
            run = %run_id,
            start = %start_phase,
            dry_run = options.dry_run,
            pathways = graph.node_count(),
            "starting reorganization"
        );

        for phase in Phase::ALL.into_iter().skip(start_phase.index()) {
            if self.cancel.take() {
                tracing::info!(run = %run_id, next = %phase, "reorganization cancelled");
                report.cancelled = true;
                break;
            }

            let started = Instant::now();
            let mut working = graph.clone();
            let result = run_phase(&ctx, phase, &mut working).await;
            tracing::info!(
                run = %run_id,
                phase = %phase,
                success = result.success,
                changes = result.changes.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "phase finished"
            );

            if !options.dry_run {
                let checkpoint = CheckpointRecord::for_result(run_id, &result);
                if result.success {
                    self.store.commit_phase(&working, &checkpoint)?;
                } else {
                    self.store.save_checkpoint(&checkpoint)?;
                }
            }

            let success = result.success;
            report.phases.push(result);
            if !success {
                break;
            }
            graph = working;
        }

        tracing::info!(
            run = %run_id,
            succeeded = report.succeeded(),
            changes = report.change_count(),
            "reorganization finished"
        );
        Ok(report)
    }
}

async fn run_phase(ctx: &PhaseContext<'_>, phase: Phase, graph: &mut PathwayGraph) -> PhaseResult {
    match phase {
        Phase::Dedup => dedup::run(ctx, graph).await,
        Phase::TreeEnforce => tree::run(ctx, graph).await,
        Phase::HierarchyRepair => chain::run(ctx, graph).await,
        Phase::AssociationSync => sync::run(ctx, graph).await,
        Phase::Pruning => prune::run(ctx, graph).await,
        Phase::PreflightValidation => preflight(ctx, graph),
    }
}

/// Final gate: a subset of the verification battery, read-only.
fn preflight(ctx: &PhaseContext<'_>, graph: &PathwayGraph) -> PhaseResult {
    let mut result = PhaseResult::new(Phase::PreflightValidation);
    for check in run_named(graph, ctx.catalog, PREFLIGHT_CHECKS) {
        for issue in &check.issues {
            let message = format!("{}: {}", check.name, issue.message);
            if issue.severity >= Severity::Medium {
                result.fail(message);
            } else {
                result.add_warning(message);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NewPathway, ParentLink};
    use crate::oracle::ScriptedOracle;
    use crate::storage::{OpenStore, SqliteStore};
    use std::sync::Arc;

    struct Fixture {
        store: SqliteStore,
        pool: OraclePool,
        config: EngineConfig,
        catalog: RootCatalog,
    }

    fn fixture(graph: &PathwayGraph) -> Fixture {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_graph(graph).unwrap();
        let config = EngineConfig::default();
        Fixture {
            store,
            pool: OraclePool::new(Arc::new(ScriptedOracle::unavailable())),
            catalog: config.catalog().unwrap(),
            config,
        }
    }

    fn messy_graph() -> PathwayGraph {
        let mut graph = PathwayGraph::new();
        let a = graph.add_node(NewPathway::named("Loop A")).unwrap();
        let b = graph.add_node(NewPathway::named("Loop B")).unwrap();
        graph.add_link(ParentLink::new(a, b)).unwrap();
        graph.add_link(ParentLink::new(b, a)).unwrap();
        graph
    }

    #[tokio::test]
    async fn full_run_commits_every_phase() {
        let f = fixture(&messy_graph());
        let reorganizer = Reorganizer::new(&f.store, &f.pool, &f.config, &f.catalog);
        let report = reorganizer.run(ReorgOptions::default()).await.unwrap();

        assert!(report.succeeded(), "{}", report.render_text());
        assert_eq!(report.seed_changes.len(), 7);
        let checkpoints = f.store.checkpoints(report.run_id).unwrap();
        assert_eq!(checkpoints.len(), Phase::ALL.len());
        assert!(checkpoints.iter().all(|c| c.status == PhaseStatus::Complete));

        let stored = f.store.load_graph().unwrap();
        assert_eq!(f.catalog.root_ids(&stored).len(), 7);
        assert_eq!(reorganizer.resume_point(report.run_id).unwrap(), Phase::PreflightValidation);
    }

    #[tokio::test]
    async fn dry_run_leaves_store_untouched() {
        let graph = messy_graph();
        let f = fixture(&graph);
        let before = f.store.load_graph().unwrap().to_snapshot();

        let reorganizer = Reorganizer::new(&f.store, &f.pool, &f.config, &f.catalog);
        let report = reorganizer.run(ReorgOptions::dry_run()).await.unwrap();

        assert!(report.dry_run);
        assert!(report.change_count() > 0);
        assert_eq!(f.store.load_graph().unwrap().to_snapshot(), before);
        assert!(f.store.list_runs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_between_phases() {
        let f = fixture(&messy_graph());
        let token = CancellationToken::new();
        token.cancel();
        let reorganizer =
            Reorganizer::new(&f.store, &f.pool, &f.config, &f.catalog).with_cancellation(token.clone());

        let report = reorganizer.run(ReorgOptions::default()).await.unwrap();
        assert!(report.cancelled);
        assert!(report.phases.is_empty());
        assert!(!report.succeeded());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn resume_restarts_the_failed_phase() {
        let f = fixture(&messy_graph());
        let reorganizer = Reorganizer::new(&f.store, &f.pool, &f.config, &f.catalog);

        let run_id = RunId::new();
        assert_eq!(reorganizer.resume_point(run_id).unwrap(), Phase::Dedup);
        for phase in [Phase::Dedup, Phase::TreeEnforce, Phase::HierarchyRepair] {
            f.store
                .save_checkpoint(&CheckpointRecord::for_result(run_id, &PhaseResult::new(phase)))
                .unwrap();
        }
        assert_eq!(reorganizer.resume_point(run_id).unwrap(), Phase::AssociationSync);

        let mut failed = PhaseResult::new(Phase::AssociationSync);
        failed.fail("interrupted");
        f.store
            .save_checkpoint(&CheckpointRecord::for_result(run_id, &failed))
            .unwrap();
        assert_eq!(reorganizer.resume_point(run_id).unwrap(), Phase::AssociationSync);

        let resumed = reorganizer
            .run(ReorgOptions::default().resuming(run_id))
            .await
            .unwrap();
        assert_eq!(resumed.run_id, run_id);
        assert_eq!(resumed.start_phase, Phase::AssociationSync);
        assert_eq!(resumed.phases.len(), 3);
        assert!(resumed.succeeded(), "{}", resumed.render_text());
        assert!(f
            .store
            .checkpoints(run_id)
            .unwrap()
            .iter()
            .all(|c| c.status == PhaseStatus::Complete));
    }

    #[tokio::test]
    async fn failed_preflight_stops_and_keeps_graph() {
        let f = fixture(&PathwayGraph::new());
        let reorganizer = Reorganizer::new(&f.store, &f.pool, &f.config, &f.catalog);
        let report = reorganizer.run(ReorgOptions::default()).await.unwrap();
        assert!(report.succeeded());

        // An orphan sneaks in after the run; the gate alone must catch it
        let mut graph = f.store.load_graph().unwrap();
        graph.add_node(NewPathway::named("Stray")).unwrap();
        f.store.save_graph(&graph).unwrap();

        let gate = reorganizer
            .run(ReorgOptions::default().starting_at(Phase::PreflightValidation))
            .await
            .unwrap();
        assert!(!gate.succeeded());
        let checkpoint = f.store.latest_checkpoint(gate.run_id).unwrap().unwrap();
        assert_eq!(checkpoint.status, PhaseStatus::Failed);
        assert!(f.store.load_graph().unwrap().id_of("Stray").is_some());
    }
}
