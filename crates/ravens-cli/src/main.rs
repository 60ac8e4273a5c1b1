//! RAVENS CLI
//!
//! Command-line front end for the graph <-> tree codec:
//! - `decode`: RDF graph + template -> nested JSON document (or one per root)
//! - `encode`: typed JSON document -> N-Triples
//! - `paths`: print the template path index

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ravens_codec::{CodecConfig, Decoded, NodeState};
use ravens_template::{PathEntry, PathIndex, Template};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ravens")]
#[command(
    author,
    version,
    about = "RAVENS: convert between CIM graphs and template-shaped JSON documents"
)]
struct Cli {
    /// Raise the log level (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an RDF graph (.nt/.ttl/.xml) into a JSON document shaped by a template.
    Decode {
        /// Input graph
        #[arg(short, long)]
        graph: PathBuf,
        /// JSON template
        #[arg(short, long)]
        template: PathBuf,
        /// Output document (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Keep only these top-level keys
        #[arg(long = "root", value_name = "KEY")]
        roots: Vec<String>,
        /// Write one `<key>.json` per top-level key into the `--out` directory
        #[arg(long, requires = "out")]
        split: bool,
        /// Drop bookkeeping predicates (names, mRIDs, sequence numbers)
        #[arg(long)]
        prune: bool,
        /// Codec configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the decode report (warnings and node states) here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Encode a typed JSON document into N-Triples.
    Encode {
        /// Input document
        #[arg(short, long)]
        document: PathBuf,
        /// JSON template (enables position-key lookup for references)
        #[arg(short, long)]
        template: Option<PathBuf>,
        /// Output graph (.nt)
        #[arg(short, long)]
        out: PathBuf,
        /// Codec configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the path index of a template (type -> chain of segments).
    Paths {
        /// JSON template
        #[arg(short, long)]
        template: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Decode {
            graph,
            template,
            out,
            roots,
            split,
            prune,
            config,
            report,
        } => cmd_decode(
            &graph,
            &template,
            out.as_deref(),
            &roots,
            split,
            prune,
            config.as_deref(),
            report.as_deref(),
        ),
        Commands::Encode {
            document,
            template,
            out,
            config,
        } => cmd_encode(&document, template.as_deref(), &out, config.as_deref()),
        Commands::Paths { template } => cmd_paths(&template),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::EnvFilter::from_default_env(),
        Err(_) => tracing_subscriber::EnvFilter::default().add_directive(level.into()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<CodecConfig> {
    match path {
        Some(path) => CodecConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(CodecConfig::default()),
    }
}

fn load_index(path: &Path) -> Result<PathIndex> {
    let template = Template::from_path(path)
        .with_context(|| format!("failed to load template {}", path.display()))?;
    Ok(template.path_index()?)
}

fn write_output(out: &Path, text: &str) -> Result<()> {
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(out, text).with_context(|| format!("failed to write {}", out.display()))
}

// ============================================================================
// decode
// ============================================================================

fn cmd_decode(
    graph_path: &Path,
    template_path: &Path,
    out: Option<&Path>,
    roots: &[String],
    split: bool,
    prune: bool,
    config_path: Option<&Path>,
    report: Option<&Path>,
) -> Result<()> {
    eprintln!(
        "{} {}",
        "Decoding".green().bold(),
        graph_path.display()
    );

    let mut config = load_config(config_path)?;
    if prune {
        config.prune_unnecessary = true;
    }
    let index = load_index(template_path)?;
    let graph = ravens_graph::rdf::read_graph_file(graph_path)?;
    tracing::info!(triples = graph.len(), "graph loaded");

    let decoded = ravens_codec::decode(&graph, &index, &config)?;

    match out {
        Some(dir) if split => {
            for (key, root) in decoded.split_roots() {
                if !roots.is_empty() && !roots.contains(&key) {
                    continue;
                }
                let path = dir.join(format!("{key}.json"));
                write_output(&path, &serde_json::to_string_pretty(&root)?)?;
                eprintln!("  {} {}", "→".cyan(), path.display());
            }
        }
        Some(out) => {
            let document = select_roots(&decoded, roots)?;
            write_output(out, &serde_json::to_string_pretty(&document)?)?;
            eprintln!("  {} {}", "→".cyan(), out.display());
        }
        None => {
            let document = select_roots(&decoded, roots)?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }

    if let Some(report) = report {
        write_output(report, &serde_json::to_string_pretty(&report_json(&decoded))?)?;
        eprintln!("  {} {}", "→".cyan(), report.display());
    }

    for warning in &decoded.warnings {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }
    eprintln!(
        "  {} {} inserted, {} skipped, {} warned",
        "→".yellow(),
        decoded.count(NodeState::Inserted),
        decoded.count(NodeState::SkippedNoPath),
        decoded.count(NodeState::Warned)
    );
    Ok(())
}

fn select_roots(decoded: &Decoded, roots: &[String]) -> Result<Value> {
    if roots.is_empty() {
        return Ok(decoded.document.clone());
    }
    let mut selected = Map::new();
    for key in roots {
        let value = decoded
            .root(key)
            .ok_or_else(|| anyhow!("decoded document has no top-level key `{key}`"))?;
        selected.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(selected))
}

fn report_json(decoded: &Decoded) -> Value {
    let states: Map<String, Value> = decoded
        .states
        .iter()
        .map(|(node, state)| {
            let state = serde_json::to_value(state).unwrap_or(Value::Null);
            (node.as_str().to_string(), state)
        })
        .collect();
    json!({
        "warnings": decoded.warnings,
        "states": states,
    })
}

// ============================================================================
// encode
// ============================================================================

fn cmd_encode(
    document_path: &Path,
    template_path: Option<&Path>,
    out: &Path,
    config_path: Option<&Path>,
) -> Result<()> {
    eprintln!(
        "{} {}",
        "Encoding".green().bold(),
        document_path.display()
    );

    let config = load_config(config_path)?;
    let index = template_path.map(load_index).transpose()?;
    let text = fs::read_to_string(document_path)
        .with_context(|| format!("failed to read {}", document_path.display()))?;
    let document: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", document_path.display()))?;

    let graph = ravens_codec::encode(&document, index.as_ref(), &config)?;
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    ravens_graph::rdf::write_graph_file(&graph, out)?;

    eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    eprintln!("  {} {} triples", "→".yellow(), graph.len());
    Ok(())
}

// ============================================================================
// paths
// ============================================================================

fn cmd_paths(template_path: &Path) -> Result<()> {
    let index = load_index(template_path)?;
    for (type_name, entry) in index.entries() {
        match entry {
            PathEntry::Single { path } => {
                println!("{} {}", type_name.bold(), path);
            }
            PathEntry::ByAncestor { paths } => {
                println!("{}", type_name.bold());
                for (ancestor, path) in paths {
                    println!("  {} {} {}", "→".cyan(), ancestor.yellow(), path);
                }
            }
        }
    }
    Ok(())
}
