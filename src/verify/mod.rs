//! Verification and auto-repair
//!
//! An independent battery of invariant checks. Issues are graded by
//! severity: LOW (stale derived data) and MEDIUM (one broken entity) carry
//! automatic fixes; HIGH needs a human; CRITICAL means the graph must not
//! be used.
//!
//! With auto-fix on, repair and re-check alternate for at most
//! `max_repair_passes` rounds, stopping once nothing fixable remains or a
//! round does not reduce the fixable issue count.

mod checks;
mod repair;
mod report;

pub use checks::{
    run_checks, run_named, CheckFn, CheckInput, CheckResult, EntityRef, FixAction, Issue, Severity, CHECKS,
    PREFLIGHT_CHECKS,
};
pub use repair::{AutoRepairer, RepairResult, RepairSummary};
pub use report::{ConsistencyError, ReportStatus, VerificationReport};

use crate::config::EngineConfig;
use crate::graph::{PathwayGraph, RootCatalog};
use crate::oracle::OraclePool;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    pub auto_fix: bool,
    /// Never touch the graph, even with `auto_fix`
    pub report_only: bool,
}

impl VerifyOptions {
    pub fn auto_fix() -> Self {
        Self {
            auto_fix: true,
            report_only: false,
        }
    }

    pub fn repairs_allowed(&self) -> bool {
        self.auto_fix && !self.report_only
    }
}

pub struct VerificationEngine<'a> {
    catalog: &'a RootCatalog,
    config: &'a EngineConfig,
    pool: &'a OraclePool,
}

impl<'a> VerificationEngine<'a> {
    pub fn new(catalog: &'a RootCatalog, config: &'a EngineConfig, pool: &'a OraclePool) -> Self {
        Self {
            catalog,
            config,
            pool,
        }
    }

    pub fn check(&self, graph: &PathwayGraph) -> Vec<CheckResult> {
        run_checks(graph, self.catalog)
    }

    pub async fn verify(&self, graph: &mut PathwayGraph, options: VerifyOptions) -> VerificationReport {
        let mut checks = self.check(graph);
        let mut fixes = Vec::new();
        let mut passes = 0;

        if options.repairs_allowed() {
            let repairer = AutoRepairer::new(self.catalog, self.config, self.pool);
            while passes < self.config.max_repair_passes {
                let fixable = fixable_issues(&checks);
                if fixable.is_empty() {
                    break;
                }
                passes += 1;
                tracing::info!(pass = passes, fixable = fixable.len(), "running auto-repair");
                let summary = repairer.repair(graph, &fixable).await;
                fixes.extend(summary.results);

                checks = self.check(graph);
                if fixable_issues(&checks).len() >= fixable.len() {
                    tracing::warn!(pass = passes, "auto-repair made no progress");
                    break;
                }
            }
        }

        let report = VerificationReport::new(checks, fixes, passes);
        match report.status {
            ReportStatus::Pass | ReportStatus::PassWithFixes => {
                tracing::info!(status = %report.status, "verification passed")
            }
            ReportStatus::Fail => tracing::warn!(
                blocking = report.blocking_issues.len(),
                "verification failed"
            ),
            ReportStatus::CriticalFail => tracing::error!(
                blocking = report.blocking_issues.len(),
                "verification found critical issues"
            ),
        }
        report
    }
}

fn fixable_issues(checks: &[CheckResult]) -> Vec<Issue> {
    checks
        .iter()
        .flat_map(|c| c.issues.iter())
        .filter(|i| i.is_auto_fixable())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ClassifiedItem, ItemId, LeafAssociation, NewPathway};
    use crate::hierarchy::recompute_derived;
    use crate::oracle::ScriptedOracle;
    use std::sync::Arc;

    struct Fixture {
        graph: PathwayGraph,
        catalog: RootCatalog,
        config: EngineConfig,
        pool: OraclePool,
    }

    fn fixture() -> Fixture {
        let config = EngineConfig::default();
        let catalog = config.catalog().unwrap();
        let mut graph = PathwayGraph::new();
        catalog.seed(&mut graph).unwrap();
        recompute_derived(&mut graph, &catalog);
        Fixture {
            graph,
            catalog,
            config,
            pool: OraclePool::new(Arc::new(ScriptedOracle::unavailable())),
        }
    }

    #[tokio::test]
    async fn check_only_never_mutates() {
        let mut f = fixture();
        f.graph.add_item(ClassifiedItem::new(ItemId::new(1), "lost")).unwrap();
        let before = f.graph.to_snapshot();

        let engine = VerificationEngine::new(&f.catalog, &f.config, &f.pool);
        let report = engine.verify(&mut f.graph, VerifyOptions::default()).await;
        assert_eq!(report.status, ReportStatus::Fail);
        assert_eq!(report.repair_passes, 0);
        assert_eq!(f.graph.to_snapshot(), before);

        let options = VerifyOptions {
            auto_fix: true,
            report_only: true,
        };
        engine.verify(&mut f.graph, options).await;
        assert_eq!(f.graph.to_snapshot(), before);
    }

    #[tokio::test]
    async fn auto_fix_repairs_dangling_parent() {
        let mut f = fixture();
        let root = f.graph.id_of("Genome Maintenance").unwrap();
        let parent = f.graph.add_node(NewPathway::named("DNA Repair")).unwrap();
        let child = f.graph.add_node(NewPathway::named("Base Excision Repair")).unwrap();
        f.graph.add_edge(parent, root).unwrap();
        f.graph.add_edge(child, parent).unwrap();
        f.graph.add_item(ClassifiedItem::new(ItemId::new(1), "OGG1<->APEX1")).unwrap();
        f.graph
            .associate(LeafAssociation::new(child, ItemId::new(1), "test"))
            .unwrap();
        recompute_derived(&mut f.graph, &f.catalog);

        // Reload-style damage: the parent row vanished, leaving a dangling link
        let mut snapshot = f.graph.to_snapshot();
        snapshot.nodes.retain(|n| n.id != parent);
        snapshot.links.retain(|l| l.child != parent);
        let mut graph = PathwayGraph::from_snapshot(snapshot).unwrap();
        assert_eq!(graph.dangling_links().len(), 1);

        let engine = VerificationEngine::new(&f.catalog, &f.config, &f.pool);
        let report = engine.verify(&mut graph, VerifyOptions::auto_fix()).await;

        assert_eq!(report.status, ReportStatus::PassWithFixes, "{}", report.render_text());
        assert_eq!(report.repair_passes, 1);
        assert!(graph.dangling_links().is_empty());
        assert_eq!(graph.parent_count(child), 1);
        assert!(report.ensure_ready().is_ok());
    }

    #[tokio::test]
    async fn critical_issues_survive_auto_fix() {
        let mut f = fixture();
        let root = f.graph.id_of("Signal Transduction").unwrap();
        f.graph.remove_node(root).unwrap();

        let engine = VerificationEngine::new(&f.catalog, &f.config, &f.pool);
        let report = engine.verify(&mut f.graph, VerifyOptions::auto_fix()).await;
        assert_eq!(report.status, ReportStatus::CriticalFail);
        assert!(f.graph.id_of("Signal Transduction").is_none());
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn root_repair_never_recreates_missing_roots() {
        let mut f = fixture();
        let missing = f.graph.id_of("Signal Transduction").unwrap();
        f.graph.remove_node(missing).unwrap();
        let genome = f.graph.id_of("Genome Maintenance").unwrap();
        let proteostasis = f.graph.id_of("Proteostasis").unwrap();
        f.graph.add_edge(genome, proteostasis).unwrap();

        let engine = VerificationEngine::new(&f.catalog, &f.config, &f.pool);
        let report = engine.verify(&mut f.graph, VerifyOptions::auto_fix()).await;

        assert_eq!(report.status, ReportStatus::CriticalFail, "{}", report.render_text());
        assert!(f.graph.id_of("Signal Transduction").is_none());
        assert_eq!(f.graph.parent_count(genome), 0);
        assert!(report.ensure_ready().is_err());
    }

    #[tokio::test]
    async fn zero_passes_disables_repair() {
        let mut f = fixture();
        f.config.max_repair_passes = 0;
        f.graph.add_item(ClassifiedItem::new(ItemId::new(1), "lost")).unwrap();
        let engine = VerificationEngine::new(&f.catalog, &f.config, &f.pool);
        let report = engine.verify(&mut f.graph, VerifyOptions::auto_fix()).await;
        assert_eq!(report.repair_passes, 0);
        assert_eq!(report.status, ReportStatus::Fail);
    }
}
