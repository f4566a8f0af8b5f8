//! Runs, checkpoints and round trips through an on-disk store

mod common;

use common::{catalog, file_engine, memory_engine, GraphBuilder};
use pathway_hierarchy::hierarchy::recompute_derived;
use pathway_hierarchy::reorg::{CheckpointRecord, PhaseResult};
use pathway_hierarchy::{
    GraphStore, Phase, PhaseStatus, ReorgOptions, RunId, ScriptedOracle, VerifyOptions,
};
use tempfile::TempDir;

fn broken_graph() -> pathway_hierarchy::PathwayGraph {
    GraphBuilder::new()
        .under("DNA Repair", "Genome Maintenance")
        .under("DNA Repair", "Gene Expression")
        .under("Base Excision Repair", "DNA Repair")
        .item_on("Base Excision Repair", "OGG1<->APEX1")
        .node("Floating")
        .loose_item("unplaced", &[])
        .build()
}

#[tokio::test]
async fn graph_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("pathways.db");

    let before = {
        let engine = file_engine(&db, ScriptedOracle::unavailable());
        engine.import(broken_graph().to_snapshot()).await.unwrap();
        engine.reorganize(ReorgOptions::default()).await.unwrap();
        engine.export().await.unwrap()
    };

    let engine = file_engine(&db, ScriptedOracle::unavailable());
    assert_eq!(engine.export().await.unwrap(), before);
    assert_eq!(engine.store().list_runs().unwrap().len(), 1);
}

#[tokio::test]
async fn interrupted_run_resumes_in_a_new_process() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("pathways.db");
    let run_id = RunId::new();

    {
        let engine = file_engine(&db, ScriptedOracle::unavailable());
        engine.import(broken_graph().to_snapshot()).await.unwrap();
        engine.cancellation_token().cancel();
        let cancelled = engine
            .reorganize(ReorgOptions::default().resuming(run_id))
            .await
            .unwrap();
        assert!(cancelled.cancelled);
        assert!(cancelled.phases.is_empty());
        assert!(engine.store().checkpoints(run_id).unwrap().is_empty());

        // A crash during AssociationSync leaves three committed phases
        for phase in [Phase::Dedup, Phase::TreeEnforce, Phase::HierarchyRepair] {
            engine
                .store()
                .save_checkpoint(&CheckpointRecord::for_result(run_id, &PhaseResult::new(phase)))
                .unwrap();
        }
    }

    let engine = file_engine(&db, ScriptedOracle::unavailable());
    let resumed = engine
        .reorganize(ReorgOptions::default().resuming(run_id))
        .await
        .unwrap();
    assert_eq!(resumed.run_id, run_id);
    assert_eq!(resumed.start_phase, Phase::AssociationSync);
    assert!(resumed.succeeded(), "{}", resumed.render_text());

    let checkpoints = engine.store().checkpoints(run_id).unwrap();
    assert_eq!(checkpoints.len(), Phase::ALL.len());
    assert!(checkpoints.iter().all(|c| c.status == PhaseStatus::Complete));
    assert!(engine.load_graph().unwrap().unassociated_items().is_empty());
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let engine = memory_engine(ScriptedOracle::unavailable());
    engine.import(broken_graph().to_snapshot()).await.unwrap();
    let before = engine.export().await.unwrap();

    let report = engine.reorganize(ReorgOptions::dry_run()).await.unwrap();
    assert!(report.dry_run);
    assert!(report.succeeded(), "{}", report.render_text());
    assert!(report.change_count() > 0);

    assert_eq!(engine.export().await.unwrap(), before);
    assert!(engine.store().checkpoints(report.run_id).unwrap().is_empty());
}

#[tokio::test]
async fn repaired_graph_is_stable_across_reload() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("pathways.db");
    {
        let engine = file_engine(&db, ScriptedOracle::unavailable());
        engine.import(broken_graph().to_snapshot()).await.unwrap();
        engine.reorganize(ReorgOptions::default()).await.unwrap();
        let report = engine.verify(VerifyOptions::auto_fix()).await.unwrap();
        assert!(report.is_ready(), "{}", report.render_text());
    }

    let engine = file_engine(&db, ScriptedOracle::unavailable());
    let stored = engine.load_graph().unwrap();
    let mut recomputed = stored.clone();
    let stats = recompute_derived(&mut recomputed, &catalog());
    assert_eq!(stats.total(), 0, "{:?}", stats);
    assert_eq!(recomputed.to_snapshot(), stored.to_snapshot());
}
