//! SQLite storage backend

use super::traits::{GraphStore, OpenStore, StorageError, StorageResult};
use crate::graph::{
    ClassifiedItem, GraphSnapshot, ItemId, LeafAssociation, LinkSource, OntologyRef, ParentLink,
    PathwayGraph, PathwayId, PathwayNode, RelationshipKind,
};
use crate::reorg::{CheckpointRecord, Phase, PhaseStatus, RunId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed pathway store
///
/// Thread-safe via internal mutex on the connection. Parent links carry no
/// foreign keys so links to deleted pathways survive a round trip and can
/// be repaired.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pathways (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                hierarchy_level INTEGER NOT NULL DEFAULT -1,
                is_leaf INTEGER NOT NULL DEFAULT 1,
                ancestor_ids TEXT NOT NULL DEFAULT '[]',
                usage_count INTEGER NOT NULL DEFAULT 0,
                protein_count INTEGER NOT NULL DEFAULT 0,
                is_synthetic INTEGER NOT NULL DEFAULT 0,
                ontology_id TEXT,
                description TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pathway_parents (
                child_id INTEGER NOT NULL,
                parent_id INTEGER NOT NULL,
                relationship_kind TEXT NOT NULL,
                confidence REAL NOT NULL,
                source TEXT NOT NULL,
                UNIQUE (child_id, parent_id),
                CHECK (child_id <> parent_id)
            );

            CREATE INDEX IF NOT EXISTS idx_parents_parent
                ON pathway_parents(parent_id);

            CREATE TABLE IF NOT EXISTS classified_items (
                id INTEGER PRIMARY KEY,
                label TEXT NOT NULL,
                proteins_json TEXT NOT NULL,
                suggestions_json TEXT NOT NULL,
                payload_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS leaf_associations (
                pathway_id INTEGER NOT NULL,
                item_id INTEGER NOT NULL,
                confidence REAL NOT NULL,
                assignment_method TEXT NOT NULL,
                UNIQUE (pathway_id, item_id)
            );

            CREATE INDEX IF NOT EXISTS idx_associations_item
                ON leaf_associations(item_id);

            -- One row per (run, phase); re-running a phase replaces its row
            CREATE TABLE IF NOT EXISTS run_checkpoints (
                run_id TEXT NOT NULL,
                phase TEXT NOT NULL,
                status TEXT NOT NULL,
                change_count INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (run_id, phase)
            );

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn write_graph(conn: &Connection, graph: &PathwayGraph) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            DELETE FROM leaf_associations;
            DELETE FROM pathway_parents;
            DELETE FROM classified_items;
            DELETE FROM pathways;
            "#,
        )?;

        let snapshot = graph.to_snapshot();
        let mut insert_node = conn.prepare(
            r#"
            INSERT INTO pathways (id, name, hierarchy_level, is_leaf, ancestor_ids, usage_count,
                                  protein_count, is_synthetic, ontology_id, description, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )?;
        for node in &snapshot.nodes {
            insert_node.execute(params![
                node.id.get(),
                node.name,
                node.hierarchy_level,
                node.is_leaf,
                serde_json::to_string(&node.ancestor_ids)?,
                node.usage_count,
                node.protein_count,
                node.is_synthetic,
                node.ontology_ref.as_ref().map(|r| r.id.as_str()),
                node.description,
                node.created_at.to_rfc3339(),
            ])?;
        }

        let mut insert_link = conn.prepare(
            r#"
            INSERT INTO pathway_parents (child_id, parent_id, relationship_kind, confidence, source)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        for link in &snapshot.links {
            insert_link.execute(params![
                link.child.get(),
                link.parent.get(),
                link.kind.as_str(),
                f64::from(link.confidence),
                link.source.as_str(),
            ])?;
        }

        let mut insert_item = conn.prepare(
            r#"
            INSERT INTO classified_items (id, label, proteins_json, suggestions_json, payload_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        for item in &snapshot.items {
            insert_item.execute(params![
                item.id.get(),
                item.label,
                serde_json::to_string(&item.proteins)?,
                serde_json::to_string(&item.suggested_pathways)?,
                serde_json::to_string(&item.payload)?,
            ])?;
        }

        let mut insert_association = conn.prepare(
            r#"
            INSERT INTO leaf_associations (pathway_id, item_id, confidence, assignment_method)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )?;
        for association in &snapshot.associations {
            insert_association.execute(params![
                association.pathway.get(),
                association.item.get(),
                f64::from(association.confidence),
                association.assignment_method,
            ])?;
        }
        Ok(())
    }

    fn write_checkpoint(conn: &Connection, checkpoint: &CheckpointRecord) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO run_checkpoints (run_id, phase, status, change_count, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(run_id, phase) DO UPDATE SET
                status = excluded.status,
                change_count = excluded.change_count,
                timestamp = excluded.timestamp
            "#,
            params![
                checkpoint.run_id.to_string(),
                checkpoint.phase.as_str(),
                checkpoint.status.as_str(),
                checkpoint.change_count as i64,
                checkpoint.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn row_to_node(
        id: i64,
        name: String,
        hierarchy_level: i32,
        is_leaf: bool,
        ancestor_json: String,
        usage_count: u32,
        protein_count: u32,
        is_synthetic: bool,
        ontology_id: Option<String>,
        description: Option<String>,
        created_at: String,
    ) -> StorageResult<PathwayNode> {
        Ok(PathwayNode {
            id: PathwayId::new(id),
            name,
            hierarchy_level,
            is_leaf,
            ancestor_ids: serde_json::from_str(&ancestor_json)?,
            usage_count,
            protein_count,
            is_synthetic,
            ontology_ref: ontology_id.map(OntologyRef::new),
            description,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    fn row_to_link(
        child: i64,
        parent: i64,
        kind: String,
        confidence: f64,
        source: String,
    ) -> StorageResult<ParentLink> {
        let kind = RelationshipKind::parse(&kind)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown relationship kind '{}'", kind)))?;
        let source = LinkSource::parse(&source)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown link source '{}'", source)))?;
        Ok(ParentLink::new(PathwayId::new(child), PathwayId::new(parent))
            .with_kind(kind)
            .with_confidence(confidence as f32)
            .with_source(source))
    }

    fn row_to_checkpoint(
        run_id: String,
        phase: String,
        status: String,
        change_count: i64,
        timestamp: String,
    ) -> StorageResult<CheckpointRecord> {
        Ok(CheckpointRecord {
            run_id: RunId::parse(&run_id)
                .ok_or_else(|| StorageError::Corrupt(format!("bad run id '{}'", run_id)))?,
            phase: Phase::parse(&phase)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown phase '{}'", phase)))?,
            status: PhaseStatus::parse(&status)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown status '{}'", status)))?,
            change_count: change_count.max(0) as usize,
            timestamp: parse_timestamp(&timestamp)?,
        })
    }

    fn read_snapshot(conn: &Connection) -> StorageResult<GraphSnapshot> {
        let mut snapshot = GraphSnapshot::default();

        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, hierarchy_level, is_leaf, ancestor_ids, usage_count, protein_count,
                   is_synthetic, ontology_id, description, created_at
            FROM pathways ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, u32>(6)?,
                row.get::<_, bool>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, String>(10)?,
            ))
        })?;
        for row in rows {
            let (id, name, level, leaf, ancestors, usage, proteins, synthetic, ontology, description, created) =
                row?;
            snapshot.nodes.push(Self::row_to_node(
                id, name, level, leaf, ancestors, usage, proteins, synthetic, ontology, description, created,
            )?);
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT child_id, parent_id, relationship_kind, confidence, source
            FROM pathway_parents ORDER BY child_id, parent_id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        for row in rows {
            let (child, parent, kind, confidence, source) = row?;
            snapshot
                .links
                .push(Self::row_to_link(child, parent, kind, confidence, source)?);
        }

        let mut stmt = conn.prepare(
            "SELECT id, label, proteins_json, suggestions_json, payload_json FROM classified_items ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        for row in rows {
            let (id, label, proteins, suggestions, payload) = row?;
            let mut item = ClassifiedItem::new(ItemId::new(id), label);
            item.proteins = serde_json::from_str(&proteins)?;
            item.suggested_pathways = serde_json::from_str(&suggestions)?;
            item.payload = serde_json::from_str(&payload)?;
            snapshot.items.push(item);
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT pathway_id, item_id, confidence, assignment_method
            FROM leaf_associations ORDER BY pathway_id, item_id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        for row in rows {
            let (pathway, item, confidence, method) = row?;
            snapshot.associations.push(
                LeafAssociation::new(PathwayId::new(pathway), ItemId::new(item), method)
                    .with_confidence(confidence as f32),
            );
        }

        Ok(snapshot)
    }
}

fn parse_timestamp(text: &str) -> StorageResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .map_err(|e| StorageError::DateParse(e.to_string()))?
        .with_timezone(&Utc))
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteStore {
    // === Graph ===

    fn load_graph(&self) -> StorageResult<PathwayGraph> {
        let conn = self.conn.lock().unwrap();
        let snapshot = Self::read_snapshot(&conn)?;
        PathwayGraph::from_snapshot(snapshot).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    fn save_graph(&self, graph: &PathwayGraph) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::write_graph(&tx, graph)?;
        tx.commit()?;
        Ok(())
    }

    // === Runs ===

    fn commit_phase(&self, graph: &PathwayGraph, checkpoint: &CheckpointRecord) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::write_graph(&tx, graph)?;
        Self::write_checkpoint(&tx, checkpoint)?;
        tx.commit()?;
        tracing::debug!(
            run = %checkpoint.run_id,
            phase = %checkpoint.phase,
            status = checkpoint.status.as_str(),
            "committed phase"
        );
        Ok(())
    }

    fn save_checkpoint(&self, checkpoint: &CheckpointRecord) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_checkpoint(&conn, checkpoint)
    }

    fn checkpoints(&self, run_id: RunId) -> StorageResult<Vec<CheckpointRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT run_id, phase, status, change_count, timestamp FROM run_checkpoints WHERE run_id = ?1",
        )?;
        let rows = stmt.query_map(params![run_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut checkpoints = Vec::new();
        for row in rows {
            let (run, phase, status, count, timestamp) = row?;
            checkpoints.push(Self::row_to_checkpoint(run, phase, status, count, timestamp)?);
        }
        checkpoints.sort_by_key(|c| c.phase.index());
        Ok(checkpoints)
    }

    fn list_runs(&self) -> StorageResult<Vec<RunId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT run_id, MAX(timestamp) AS last FROM run_checkpoints GROUP BY run_id ORDER BY last DESC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut runs = Vec::new();
        for row in rows {
            let id = row?;
            runs.push(RunId::parse(&id).ok_or_else(|| StorageError::Corrupt(format!("bad run id '{}'", id)))?);
        }
        Ok(runs)
    }
}
