//! `aether-graph`: command-line front end for the note graph.
//!
//! # Usage
//!
//! ```text
//! aether-graph <command> [args]
//!
//! Commands:
//!   ingest <dir>        rebuild the graph from a directory of *.md notes
//!   search <text...>    ranked full-text search
//!   links <id>          outgoing links and backlinks of a note
//!   layout [flags]      print a force-directed layout as JSON
//!   stats               node, edge and document counts
//!   delete <id>         remove a note
//! ```
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config (`AETHER_CONFIG` or `config/default.toml`)
//!   3. Init logger at the configured level (`RUST_LOG` wins when set)
//!   4. Open the database, run the command, close the database

use std::path::Path;
use std::process;

use tracing::info;

use aether_graph::config::{self, Config, LayoutConfig};
use aether_graph::error::AppError;
use aether_graph::ingest::NoteGraph;
use aether_graph::layout::{LayoutParams, Surface};
use aether_graph::{logger, vault};

// ── CLI arg parsing ────────────────────────────────────────────────────────

struct Args {
    command: Option<String>,
    rest: Vec<String>,
}

fn parse_args() -> Args {
    let mut command = None;
    let mut rest = Vec::new();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" if command.is_none() => {
                print_help();
                process::exit(0);
            }
            "--" => {
                rest.extend(iter);
                break;
            }
            _ if command.is_none() => command = Some(arg),
            _ => rest.push(arg),
        }
    }

    Args { command, rest }
}

fn print_help() {
    eprintln!("usage: aether-graph <command> [args]");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  ingest <dir>        rebuild the graph from a directory of *.md notes");
    eprintln!("  search <text...>    ranked full-text search");
    eprintln!("  links <id>          outgoing links and backlinks of a note");
    eprintln!("  layout [flags]      print a force-directed layout as JSON");
    eprintln!("  stats               node, edge and document counts");
    eprintln!("  delete <id>         remove a note");
    eprintln!();
    eprintln!("layout flags:");
    eprintln!("  --width <w>         surface width (default from config)");
    eprintln!("  --height <h>        surface height (default from config)");
    eprintln!("  --iterations <n>    simulation steps (default from config)");
    eprintln!();
    eprintln!("environment:");
    eprintln!("  AETHER_CONFIG       config file (default config/default.toml)");
    eprintln!("  AETHER_DATA_DIR     override store.data_dir");
    eprintln!("  AETHER_LOG_LEVEL    override store.log_level");
}

/// Resolve `layout` flags on top of the configured defaults.
fn parse_layout_flags(
    rest: &[String],
    defaults: &LayoutConfig,
) -> Result<(Surface, LayoutParams), AppError> {
    let mut surface = defaults.surface;
    let mut params = defaults.params();
    let mut iter = rest.iter();

    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .ok_or_else(|| AppError::Config(format!("{flag} needs a value")))?;
        match flag.as_str() {
            "--width" => surface.width = parse_positive(flag, value)?,
            "--height" => surface.height = parse_positive(flag, value)?,
            "--iterations" => {
                params.iterations = value
                    .parse()
                    .map_err(|_| AppError::Config(format!("{flag}: not a count: {value}")))?;
            }
            other => return Err(AppError::Config(format!("unknown layout flag: {other}"))),
        }
    }

    Ok((surface, params))
}

fn parse_positive(flag: &str, value: &str) -> Result<f64, AppError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(AppError::Config(format!("{flag}: expected a positive number, got {value}"))),
    }
}

fn required<'a>(rest: &'a [String], usage: &str) -> Result<&'a str, AppError> {
    rest.first()
        .map(String::as_str)
        .ok_or_else(|| AppError::Config(format!("usage: aether-graph {usage}")))
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_args();
    let Some(command) = args.command else {
        print_help();
        process::exit(2);
    };

    let config = config::load()?;
    logger::init(&config.log_level, false)?;
    info!(
        db = %config.db_path().display(),
        log_level = %config.log_level,
        "config loaded"
    );

    let graph = NoteGraph::from_config(&config)?;
    let result = dispatch(&graph, &config, &command, &args.rest).await;
    graph.close()?;
    result
}

async fn dispatch(
    graph: &NoteGraph,
    config: &Config,
    command: &str,
    rest: &[String],
) -> Result<(), AppError> {
    match command {
        "ingest" => {
            let dir = required(rest, "ingest <dir>")?;
            let notes = vault::scan(Path::new(dir))?;
            let counts = graph.rebuild(&notes)?;
            println!("ok  {} notes, {} links", counts.nodes, counts.edges);
        }
        "search" => {
            let text = rest.join(" ");
            let hits = graph.search(&text)?;
            if hits.is_empty() {
                println!("no matches");
            }
            for hit in &hits {
                println!("{:>7.3}  {}  {}", hit.score, hit.id, hit.title);
                println!("         {}", hit.snippet.replace('\n', " "));
            }
        }
        "links" => {
            let id = required(rest, "links <id>")?;
            let node = graph.store().require_node(id)?;
            let outgoing = graph.store().get_outgoing_links(id)?;
            let backlinks = graph.store().get_backlinks(id)?;
            println!("{}  {}", node.id, node.title);
            println!("  links to ({}):", outgoing.len());
            for target in &outgoing {
                println!("    {target}");
            }
            println!("  linked from ({}):", backlinks.len());
            for source in &backlinks {
                println!("    {source}");
            }
        }
        "layout" => {
            let (surface, params) = parse_layout_flags(rest, &config.layout)?;
            let points = graph.layout(surface, params).await?;
            let json = serde_json::to_string_pretty(&points)
                .map_err(|e| AppError::Layout(format!("serialize layout: {e}")))?;
            println!("{json}");
        }
        "stats" => {
            let counts = graph.store().counts()?;
            let documents = graph.search_index().count()?;
            println!("database   {}", config.db_path().display());
            println!("nodes      {}", counts.nodes);
            println!("edges      {}", counts.edges);
            println!("documents  {documents}");
        }
        "delete" => {
            let id = required(rest, "delete <id>")?;
            if graph.delete(id)? {
                println!("ok  deleted {id}");
            } else {
                println!("ok  no note {id}");
            }
        }
        other => {
            return Err(AppError::Config(format!(
                "unknown command: {other}\n  run 'aether-graph --help' for usage"
            )));
        }
    }
    Ok(())
}
