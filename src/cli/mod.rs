//! CP-017: CLI subcommands — init, validate, graph, compile.

use crate::core::{executor, graph, parser, step::CompileCtx, types};
use crate::trace::eventlog::{self, CompileEvent, EventLog};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new capas project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate capas.yaml without compiling anything
    Validate {
        /// Path to capas.yaml
        #[arg(short, long, default_value = "capas.yaml")]
        file: PathBuf,
    },

    /// Show the step graph: ids, edges, use budgets, execution order
    Graph {
        /// Path to capas.yaml
        #[arg(short, long, default_value = "capas.yaml")]
        file: PathBuf,
    },

    /// Compile all layers into the output directory
    Compile {
        /// Path to capas.yaml
        #[arg(short, long, default_value = "capas.yaml")]
        file: PathBuf,

        /// Directory holding source files
        #[arg(long, default_value = "sources")]
        sources: PathBuf,

        /// Output directory
        #[arg(long, default_value = "out")]
        out: PathBuf,

        /// Override settings.workers
        #[arg(long)]
        workers: Option<usize>,
    },
}

/// Dispatch a CLI command.
pub async fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Graph { file } => cmd_graph(&file),
        Commands::Compile {
            file,
            sources,
            out,
            workers,
        } => cmd_compile(&file, sources, out, workers).await,
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("capas.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }

    let sources_dir = path.join("sources");
    std::fs::create_dir_all(&sources_dir)
        .map_err(|e| format!("cannot create sources dir: {}", e))?;

    let template = r#"version: "1.0"
name: my-map
description: "Compiled by capas"

settings:
  workers: 4
  max_zoom: 10
  pretty: false

layers:
  - name: land
    steps:
      - kind: read_file
        file: land.geojson
      - kind: output
"#;
    std::fs::write(&config_path, template)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized capas project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", sources_dir.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parser::parse_config_file(file).map_err(|e| e.to_string())?;
    let errors = parser::validate_config(&config);

    if errors.is_empty() {
        let steps: usize = config.layers.iter().map(|l| l.steps.len()).sum();
        println!(
            "OK: {} ({} layers, {} steps)",
            config.name,
            config.layers.len(),
            steps
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Parse and validate a capas config file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<types::CapasConfig, String> {
    let config = parser::parse_config_file(file).map_err(|e| e.to_string())?;
    let errors = parser::validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("validation failed".to_string())
}

fn cmd_graph(file: &Path) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    let graph = graph::build_graph(&config).map_err(|e| e.to_string())?;

    println!("Graph: {} ({} steps)", config.name, graph.len());
    println!();

    let mut current_layer = "";
    for node in &graph.nodes {
        if node.layer != current_layer {
            current_layer = &node.layer;
            println!("{}:", current_layer);
        }
        let edges: Vec<String> = node
            .inputs
            .iter()
            .map(|(name, producer)| format!("{}<-{}", name, producer))
            .collect();
        println!(
            "  {}  budget={}  {}",
            node.id,
            node.dependents.max(1),
            edges.join(" ")
        );
    }

    println!();
    println!("Execution order: {}", graph.execution_order().join(" -> "));
    Ok(())
}

async fn cmd_compile(
    file: &Path,
    sources: PathBuf,
    out: PathBuf,
    workers: Option<usize>,
) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    let graph = graph::build_graph(&config).map_err(|e| e.to_string())?;
    let workers = workers.unwrap_or(config.settings.workers);

    std::fs::create_dir_all(&out).map_err(|e| format!("cannot create output dir: {}", e))?;
    let events = EventLog::new(out.join("events.jsonl"));
    let run_id = eventlog::generate_run_id();
    let _ = events.append(CompileEvent::CompileStarted {
        run_id: run_id.clone(),
        layers: config.layers.len() as u32,
        steps: graph.len() as u32,
        capas_version: env!("CARGO_PKG_VERSION").to_string(),
    });

    println!(
        "Compiling {} ({} layers, {} steps, {} workers)",
        config.name,
        config.layers.len(),
        graph.len(),
        workers
    );

    let ctx = Arc::new(
        CompileCtx::new(config.settings.clone(), sources, out).with_events(events.clone()),
    );
    let report = executor::compile(&graph, ctx, workers)
        .await
        .map_err(|e| e.to_string())?;

    for failure in &report.failed {
        eprintln!("  FAILED: {}: {}", failure.step_id, failure.error);
    }

    let _ = events.append(CompileEvent::CompileCompleted {
        run_id,
        succeeded: report.succeeded.len() as u32,
        stopped: report.stopped.len() as u32,
        starved: report.starved.len() as u32,
        failed: report.failed.len() as u32,
        total_seconds: report.total_duration.as_secs_f64(),
    });

    println!(
        "{} succeeded, {} stopped, {} skipped, {} failed in {:.1}s",
        report.succeeded.len(),
        report.stopped.len(),
        report.starved.len(),
        report.failed.len(),
        report.total_duration.as_secs_f64()
    );

    if report.success() {
        Ok(())
    } else {
        Err(format!("{} step(s) failed", report.failed.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cp017_init_creates_project() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        assert!(dir.path().join("capas.yaml").exists());
        assert!(dir.path().join("sources").is_dir());

        // generated config validates cleanly
        let config = parser::parse_config_file(&dir.path().join("capas.yaml")).unwrap();
        assert!(parser::validate_config(&config).is_empty());

        // refuses to clobber
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_cp017_validate_ok_and_err() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.yaml");
        std::fs::write(
            &good,
            r#"
version: "1.0"
name: good
layers:
  - name: land
    steps:
      - kind: read_file
        file: land.geojson
"#,
        )
        .unwrap();
        assert!(cmd_validate(&good).is_ok());

        let bad = dir.path().join("bad.yaml");
        std::fs::write(
            &bad,
            r#"
version: "1.0"
name: bad
layers:
  - name: land
    steps:
      - kind: not_a_kind
"#,
        )
        .unwrap();
        assert!(cmd_validate(&bad).is_err());
    }

    #[test]
    fn test_cp017_graph_reports_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capas.yaml");
        std::fs::write(
            &path,
            r#"
version: "1.0"
name: broken
layers:
  - name: a
    steps:
      - kind: merge
        depends_on: {in: a.ghost}
"#,
        )
        .unwrap();
        let err = cmd_graph(&path).unwrap_err();
        assert!(err.contains("a.ghost"));
    }

    #[tokio::test]
    async fn test_cp017_compile_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("sources");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&sources).unwrap();
        std::fs::write(
            sources.join("land.geojson"),
            serde_json::json!({"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"name": "isle"}}
            ]})
            .to_string(),
        )
        .unwrap();

        let config_path = dir.path().join("capas.yaml");
        std::fs::write(
            &config_path,
            r#"
version: "1.0"
name: e2e
settings:
  workers: 2
layers:
  - name: land
    steps:
      - kind: read_file
        file: land.geojson
      - kind: add_zoom
        min_zoom: 2
      - kind: output
"#,
        )
        .unwrap();

        cmd_compile(&config_path, sources, out.clone(), None)
            .await
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(out.join("land.geojson")).unwrap()).unwrap();
        assert_eq!(written["features"][0]["tippecanoe"]["minzoom"], 2);

        let log = std::fs::read_to_string(out.join("events.jsonl")).unwrap();
        assert!(log.contains("compile_started"));
        assert!(log.contains("output_written"));
        assert!(log.contains("compile_completed"));
        assert!(log.contains("blake3:"));
    }

    #[tokio::test]
    async fn test_cp017_compile_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("sources");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&sources).unwrap();

        let config_path = dir.path().join("capas.yaml");
        std::fs::write(
            &config_path,
            r#"
version: "1.0"
name: failing
layers:
  - name: land
    steps:
      - kind: read_file
        file: missing.geojson
      - kind: output
"#,
        )
        .unwrap();

        let err = cmd_compile(&config_path, sources, out, None).await.unwrap_err();
        assert!(err.contains("1 step(s) failed"));
    }
}
