//! Automatic remediation of LOW and MEDIUM issues

use super::checks::{FixAction, Issue};
use crate::config::EngineConfig;
use crate::graph::{PathwayGraph, RootCatalog};
use crate::hierarchy::recompute_derived;
use crate::oracle::OraclePool;
use crate::reorg::{assign_item, settle_unreachable, NodeResolution, TreeEnforcer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One applied (or attempted) repair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairResult {
    pub action: FixAction,
    pub success: bool,
    pub message: String,
}

impl RepairResult {
    fn ok(action: FixAction, message: impl Into<String>) -> Self {
        Self {
            action,
            success: true,
            message: message.into(),
        }
    }

    fn failed(action: FixAction, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!(?action, "repair failed: {}", message);
        Self {
            action,
            success: false,
            message,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairSummary {
    pub results: Vec<RepairResult>,
}

impl RepairSummary {
    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }
}

pub struct AutoRepairer<'a> {
    catalog: &'a RootCatalog,
    config: &'a EngineConfig,
    pool: &'a OraclePool,
}

impl<'a> AutoRepairer<'a> {
    pub fn new(catalog: &'a RootCatalog, config: &'a EngineConfig, pool: &'a OraclePool) -> Self {
        Self {
            catalog,
            config,
            pool,
        }
    }

    /// Apply the fixes attached to `issues`, each distinct action once.
    ///
    /// Issues above MEDIUM are ignored even if they carry a fix. Derived
    /// attributes are recomputed last whenever anything ran.
    pub async fn repair(&self, graph: &mut PathwayGraph, issues: &[Issue]) -> RepairSummary {
        let actions: BTreeSet<FixAction> = issues
            .iter()
            .filter(|i| i.is_auto_fixable())
            .filter_map(|i| i.fix.clone())
            .collect();

        let mut summary = RepairSummary::default();
        if actions.is_empty() {
            return summary;
        }
        let mut orphans_settled = false;

        for action in actions {
            let result = match &action {
                FixAction::ReseedRoots => {
                    let report = self.catalog.normalize_existing(graph);
                    RepairResult::ok(
                        action.clone(),
                        format!("{} root parent link(s) removed", report.detached.len()),
                    )
                }
                FixAction::DropDanglingLinks => {
                    let dropped = graph.take_dangling_links();
                    RepairResult::ok(action.clone(), format!("dropped {} dangling link(s)", dropped.len()))
                }
                FixAction::DropDanglingAssociations => {
                    let dropped = graph.take_dangling_associations();
                    RepairResult::ok(
                        action.clone(),
                        format!("dropped {} dangling association(s)", dropped.len()),
                    )
                }
                FixAction::EnforceSingleParent { pathway } => {
                    let enforcer = TreeEnforcer::new(self.catalog, self.pool);
                    match enforcer.resolve_node(graph, *pathway).await {
                        NodeResolution::Resolved(resolution) => RepairResult::ok(
                            action.clone(),
                            format!(
                                "kept parent {}, removed {} link(s)",
                                resolution.kept,
                                resolution.removed.len()
                            ),
                        ),
                        NodeResolution::AlreadySingle => {
                            RepairResult::ok(action.clone(), "already has a single parent")
                        }
                        NodeResolution::Unresolved => {
                            RepairResult::failed(action.clone(), "every candidate parent closes a cycle")
                        }
                    }
                }
                FixAction::SettleOrphan { .. } => {
                    // One sweep settles every unreachable fragment
                    if orphans_settled {
                        continue;
                    }
                    orphans_settled = true;
                    match settle_unreachable(graph, self.catalog, self.pool).await {
                        Ok(report) => RepairResult::ok(
                            action.clone(),
                            format!(
                                "pruned {}, rescued {} pathway(s)",
                                report.deleted.len(),
                                report.rescued.len()
                            ),
                        ),
                        Err(e) => RepairResult::failed(action.clone(), e.to_string()),
                    }
                }
                FixAction::AttachItem { item } => {
                    match assign_item(graph, self.catalog, self.config, *item) {
                        Ok(assignment) => RepairResult::ok(
                            action.clone(),
                            format!(
                                "associated with pathway {} ({})",
                                assignment.pathway,
                                assignment.source.as_str()
                            ),
                        ),
                        Err(e) => RepairResult::failed(action.clone(), e.to_string()),
                    }
                }
                // Runs unconditionally below
                FixAction::RecomputeDerived => continue,
            };
            summary.results.push(result);
        }

        let stats = recompute_derived(graph, self.catalog);
        summary.results.push(RepairResult::ok(
            FixAction::RecomputeDerived,
            format!("rewrote {} derived value(s)", stats.total()),
        ));
        tracing::info!(
            attempted = summary.attempted(),
            succeeded = summary.succeeded(),
            "auto-repair pass finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ClassifiedItem, ItemId, LeafAssociation, NewPathway, ParentLink};
    use crate::oracle::ScriptedOracle;
    use crate::verify::checks::run_checks;
    use std::sync::Arc;

    fn fixture() -> (PathwayGraph, RootCatalog, EngineConfig, OraclePool) {
        let config = EngineConfig::default();
        let catalog = config.catalog().unwrap();
        let mut graph = PathwayGraph::new();
        catalog.seed(&mut graph).unwrap();
        let pool = OraclePool::new(Arc::new(ScriptedOracle::unavailable()));
        (graph, catalog, config, pool)
    }

    fn all_issues(graph: &PathwayGraph, catalog: &RootCatalog) -> Vec<Issue> {
        run_checks(graph, catalog)
            .into_iter()
            .flat_map(|c| c.issues)
            .collect()
    }

    #[tokio::test]
    async fn repairs_medium_and_low_issues() {
        let (mut graph, catalog, config, pool) = fixture();
        let stray = graph.add_node(NewPathway::named("Histone Deacetylation")).unwrap();
        graph.add_item(ClassifiedItem::new(ItemId::new(5), "HDAC1<->SIN3A")).unwrap();
        graph
            .associate(LeafAssociation::new(stray, ItemId::new(5), "test"))
            .unwrap();
        graph.add_item(ClassifiedItem::new(ItemId::new(6), "unplaced")).unwrap();
        let root_a = graph.id_of("Proteostasis").unwrap();
        let root_b = graph.id_of("Gene Expression").unwrap();
        // a root with a parent
        graph.add_link(ParentLink::new(root_a, root_b)).unwrap();

        let issues = all_issues(&graph, &catalog);
        let repairer = AutoRepairer::new(&catalog, &config, &pool);
        let summary = repairer.repair(&mut graph, &issues).await;

        assert_eq!(summary.failed(), 0);
        assert_eq!(graph.parent_count(root_a), 0);
        assert_eq!(graph.parent_count(stray), 1);
        assert!(graph.unassociated_items().is_empty());
        assert!(graph.id_of(&config.default_pathway).is_some());
        assert_eq!(summary.results.last().unwrap().action, FixAction::RecomputeDerived);

        let remaining: Vec<Issue> = all_issues(&graph, &catalog)
            .into_iter()
            .filter(|i| i.severity >= crate::verify::Severity::Medium)
            .collect();
        assert!(remaining.is_empty(), "{:?}", remaining);
    }

    #[tokio::test]
    async fn high_severity_issues_are_left_alone() {
        let (mut graph, catalog, config, pool) = fixture();
        graph.add_node(NewPathway::named("autophagy")).unwrap();
        graph.add_node(NewPathway::named("Autophagy")).unwrap();
        let issues: Vec<Issue> = all_issues(&graph, &catalog)
            .into_iter()
            .filter(|i| i.check == "no_duplicate_names")
            .collect();
        assert_eq!(issues.len(), 1);

        let repairer = AutoRepairer::new(&catalog, &config, &pool);
        let summary = repairer.repair(&mut graph, &issues).await;
        assert_eq!(summary.attempted(), 0);
        assert!(graph.id_of("autophagy").is_some() && graph.id_of("Autophagy").is_some());
    }
}
