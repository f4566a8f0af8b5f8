//! pathway-hierarchy CLI
//!
//! Usage:
//!   pathway-hierarchy [--db path] [--config file] [--oracle answers.yaml] <command>
//!
//! Exit codes: 0 clean, 1 blocking issues remain, 2 internal error.

use clap::{Parser, Subcommand};
use pathway_hierarchy::{
    ClassificationOracle, EngineConfig, GraphSnapshot, OpenStore, PathwayEngine, Phase, ReorgOptions, RunId,
    ScriptedOracle, SqliteStore, VerifyOptions,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pathway-hierarchy",
    version,
    about = "Curate and verify a hierarchy of biological pathways"
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// YAML engine configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// YAML file with scripted oracle answers; without it every oracle
    /// query falls back to local heuristics
    #[arg(long, global = true)]
    oracle: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing canonical roots
    Seed,
    /// Replace the stored graph with a JSON snapshot
    Import {
        /// Snapshot file
        path: PathBuf,
    },
    /// Print the stored graph as a JSON snapshot
    Export {
        /// Export even if verification fails
        #[arg(long)]
        force: bool,
    },
    /// Run the reorganization phases
    Reorganize {
        /// Compute changes without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Phase to start at, by number (1-6) or name
        #[arg(long)]
        start_phase: Option<String>,
        /// Resume an earlier run
        #[arg(long)]
        run_id: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the graph's invariants
    Verify {
        /// Repair LOW and MEDIUM issues
        #[arg(long)]
        auto_fix: bool,
        /// Never modify the graph
        #[arg(long)]
        report_only: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge one pathway into another
    Merge {
        /// Pathway to remove
        source: String,
        /// Pathway receiving its children and items
        target: String,
    },
    /// Prune an unreachable pathway or re-attach it under a root
    Rescue {
        /// Pathway name
        name: String,
    },
}

/// Get the default database path (~/.local/share/pathway-hierarchy/pathways.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let app_dir = data_dir.join("pathway-hierarchy");
    std::fs::create_dir_all(&app_dir).ok();
    app_dir.join("pathways.db")
}

fn open_engine(cli: &Cli) -> Result<PathwayEngine, String> {
    let config = EngineConfig::load_or_default(cli.config.as_deref())
        .map_err(|e| format!("Failed to load config: {}", e))?;
    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    let oracle: Arc<dyn ClassificationOracle> = match &cli.oracle {
        Some(path) => Arc::new(ScriptedOracle::from_yaml_file(path).map_err(|e| e.to_string())?),
        None => Arc::new(ScriptedOracle::unavailable()),
    };
    PathwayEngine::new(Arc::new(store), oracle, config).map_err(|e| e.to_string())
}

fn parse_phase(text: &str) -> Option<Phase> {
    match text.parse::<usize>() {
        Ok(n) if n >= 1 => Phase::from_index(n - 1),
        Ok(_) => None,
        Err(_) => Phase::parse(text),
    }
}

async fn cmd_seed(engine: &PathwayEngine) -> i32 {
    match engine.seed().await {
        Ok(report) => {
            println!(
                "Created {} root(s), removed {} root parent link(s)",
                report.created.len(),
                report.detached.len()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}

async fn cmd_import(engine: &PathwayEngine, path: &Path) -> i32 {
    let snapshot: GraphSnapshot = match std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
    {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", path.display(), e);
            return 2;
        }
    };
    match engine.import(snapshot).await {
        Ok(graph) => {
            println!(
                "Imported {} pathway(s), {} link(s), {} item(s)",
                graph.node_count(),
                graph.link_count(),
                graph.item_count()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_export(engine: &PathwayEngine, force: bool) -> i32 {
    let snapshot = if force {
        engine.export().await
    } else {
        engine.export_verified().await
    };
    match snapshot {
        Ok(snapshot) => match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                2
            }
        },
        Err(pathway_hierarchy::EngineError::Consistency(e)) => {
            eprintln!("Error: graph not ready ({}); run verify or pass --force", e);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}

async fn cmd_reorganize(engine: &PathwayEngine, options: ReorgOptions, json: bool) -> i32 {
    let token = engine.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current phase");
            token.cancel();
        }
    });
    let result = engine.reorganize(options).await;
    interrupt.abort();

    match result {
        Ok(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return 2;
                    }
                }
            } else {
                print!("{}", report.render_text());
            }
            report.exit_code()
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}

async fn cmd_verify(engine: &PathwayEngine, options: VerifyOptions, json: bool) -> i32 {
    match engine.verify(options).await {
        Ok(report) => {
            if json {
                match report.to_json() {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return 2;
                    }
                }
            } else {
                print!("{}", report.render_text());
            }
            report.exit_code()
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}

async fn cmd_merge(engine: &PathwayEngine, source: &str, target: &str) -> i32 {
    match engine.merge(source, target).await {
        Ok(outcome) => {
            println!(
                "Merged '{}' into '{}': {} child link(s), {} association(s) moved",
                source, target, outcome.children_moved, outcome.associations_moved
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_rescue(engine: &PathwayEngine, name: &str) -> i32 {
    match engine.rescue(name).await {
        Ok(report) => {
            for (_, deleted) in &report.deleted {
                println!("Pruned '{}'", deleted);
            }
            for outcome in &report.rescued {
                println!(
                    "Attached '{}' under '{}' ({})",
                    name,
                    outcome.decision.root,
                    outcome.decision.source.as_str()
                );
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn run(cli: Cli) -> i32 {
    let engine = match open_engine(&cli) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };

    let code = match cli.command {
        Commands::Seed => cmd_seed(&engine).await,
        Commands::Import { path } => cmd_import(&engine, &path).await,
        Commands::Export { force } => cmd_export(&engine, force).await,
        Commands::Reorganize {
            dry_run,
            start_phase,
            run_id,
            json,
        } => {
            let mut options = ReorgOptions {
                dry_run,
                ..Default::default()
            };
            if let Some(text) = start_phase {
                match parse_phase(&text) {
                    Some(phase) => options = options.starting_at(phase),
                    None => {
                        eprintln!("Error: unknown phase '{}'", text);
                        return 2;
                    }
                }
            }
            if let Some(text) = run_id {
                match RunId::parse(&text) {
                    Some(id) => options = options.resuming(id),
                    None => {
                        eprintln!("Error: invalid run id '{}'", text);
                        return 2;
                    }
                }
            }
            cmd_reorganize(&engine, options, json).await
        }
        Commands::Verify {
            auto_fix,
            report_only,
            json,
        } => cmd_verify(&engine, VerifyOptions { auto_fix, report_only }, json).await,
        Commands::Merge { source, target } => cmd_merge(&engine, &source, &target).await,
        Commands::Rescue { name } => cmd_rescue(&engine, &name).await,
    };

    if let Err(e) = engine.persist_oracle_cache() {
        tracing::warn!(error = %e, "failed to save oracle cache");
    }
    code
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            std::process::exit(2);
        }
    };
    let code = runtime.block_on(run(cli));
    std::process::exit(code);
}
