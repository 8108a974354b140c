use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use design_artifacts::{
    render_diagram, DiagramFormat, DiagramOptions, EntityStore, EntityType, MigrationRegistry, StoreConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "artifact-graph-export")]
#[command(about = "Export the artifact relationship diagram to a Mermaid or DOT file")]
struct Cli {
    /// Data directory (defaults to the configured store.data_dir)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Entity id to center on, or "all"
    #[arg(long, default_value = "all")]
    focus: String,

    /// Entity type of the focus, when ids collide
    #[arg(long = "type")]
    entity_type: Option<EntityType>,

    /// Hops from the focus (defaults to diagram.default_depth)
    #[arg(long)]
    depth: Option<usize>,

    /// mermaid or dot (defaults to diagram.format)
    #[arg(short, long)]
    format: Option<DiagramFormat>,

    /// Output file (defaults to artifacts.mmd or artifacts.dot)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = StoreConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data_dir());

    let store = EntityStore::open(&data_dir, Arc::new(MigrationRegistry::with_builtin()))
        .with_context(|| format!("opening store at {}", data_dir.display()))?;
    println!(
        "Store loaded: {} entities from {}",
        store.load_report().total(),
        data_dir.display()
    );

    let format = cli.format.unwrap_or(config.diagram.format);
    let options = DiagramOptions {
        focus: cli.focus,
        depth: cli.depth.unwrap_or(config.diagram.default_depth),
        format,
        entity_type: cli.entity_type,
    };
    let diagram = render_diagram(&store, &options);
    if diagram.starts_with("Error:") {
        eprintln!("❌ {}", diagram);
        std::process::exit(1);
    }

    let output = cli.output.unwrap_or_else(|| {
        PathBuf::from(match format {
            DiagramFormat::Mermaid => "artifacts.mmd",
            DiagramFormat::Dot => "artifacts.dot",
        })
    });
    std::fs::write(&output, diagram).with_context(|| format!("writing {}", output.display()))?;
    println!("✅ Exported diagram to: {}", output.display());

    Ok(())
}
