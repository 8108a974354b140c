//! Artifact Store CLI
//!
//! Read-only reports over a design artifact directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use design_artifacts::analysis::{CapabilityPriority, WorkflowPriority};
use design_artifacts::{
    coverage_report, find_gaps, find_orphans, generate_tests, search, suggest_priority, validate, EntityStore,
    EntityType, ListFilter, MigrationRegistry, PriorityFocus, PriorityReport, StoreConfig, TestFormat,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "artifacts")]
#[command(about = "Validate and analyze a design artifact store")]
struct Cli {
    /// Data directory (defaults to the configured store.data_dir)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check references, back-references and schema versions
    Validate,

    /// Entities no workflow references
    Orphans {
        /// capability, persona or component
        #[arg(long = "type")]
        entity_type: Option<EntityType>,
    },

    /// Missing links and thinly covered categories
    Gaps {
        /// Categories below this count are reported
        #[arg(long)]
        threshold: Option<usize>,
    },

    /// What to build next
    Priority {
        /// capability or workflow
        #[arg(long, default_value = "capability")]
        focus: PriorityFocus,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Implementation and test coverage
    Coverage,

    /// Generate a test scaffold for a workflow
    Tests {
        workflow: String,
        /// vitest or playwright
        #[arg(long)]
        format: Option<TestFormat>,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List entities of one type
    List {
        entity_type: EntityType,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Keep entities that mention this id
        #[arg(long)]
        related_to: Option<String>,
    },

    /// Show one entity as YAML
    Get { entity_type: EntityType, id: String },

    /// Fuzzy search ids and names
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Returns false when the command should exit non-zero
fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = StoreConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data_dir());
    let store = EntityStore::open(&data_dir, Arc::new(MigrationRegistry::with_builtin()))
        .with_context(|| format!("opening store at {}", data_dir.display()))?;

    match cli.command {
        Commands::Validate => {
            let report = validate(&store);
            if cli.json {
                print_json(&report)?;
            } else {
                for error in &report.errors {
                    println!("  ❌ {}", error);
                }
                for warning in &report.warnings {
                    println!("  ⚠️  {}", warning);
                }
                if report.valid {
                    println!("✅ Valid ({} warnings)", report.warnings.len());
                } else {
                    println!("❌ {} errors, {} warnings", report.errors.len(), report.warnings.len());
                }
            }
            Ok(report.valid)
        }

        Commands::Orphans { entity_type } => {
            let orphans = find_orphans(&store, entity_type)?;
            if cli.json {
                print_json(&orphans)?;
            } else {
                for (entity_type, ids) in &orphans {
                    println!("{} ({})", entity_type.dir_name(), ids.len());
                    for id in ids {
                        println!("  - {}", id);
                    }
                }
            }
            Ok(true)
        }

        Commands::Gaps { threshold } => {
            let gaps = find_gaps(&store, threshold.unwrap_or(config.analysis.low_coverage_threshold));
            if cli.json {
                print_json(&gaps)?;
            } else if gaps.is_empty() {
                println!("✅ No gaps found");
            } else {
                print_list("Workflows without capabilities", &gaps.workflows_without_capabilities);
                print_list("Workflows without personas", &gaps.workflows_without_personas);
                print_list("Capabilities without components", &gaps.capabilities_without_components);
                if !gaps.low_coverage_categories.is_empty() {
                    println!("Low-coverage categories:");
                    for c in &gaps.low_coverage_categories {
                        println!("  - {} '{}': {}", c.entity_type, c.category, c.count);
                    }
                }
            }
            Ok(true)
        }

        Commands::Priority { focus, limit } => {
            let report = suggest_priority(&store, focus, limit.or(config.analysis.priority_limit));
            if cli.json {
                print_json(&report)?;
            } else {
                print_priorities(&report);
            }
            Ok(true)
        }

        Commands::Coverage => {
            let report = coverage_report(&store);
            if cli.json {
                print_json(&report)?;
            } else {
                println!("Capabilities: {:?}", report.capabilities);
                println!("Components:   {:?}", report.components);
                println!("Workflows:    {:?}", report.workflows);
                println!(
                    "Personas:     {}/{} in at least one workflow",
                    report.personas.covered, report.personas.total
                );
                if let Some(tests) = &report.tests {
                    println!(
                        "Tests:        {}/{} workflow-persona pairs ({} simulated, {} real)",
                        tests.tested_pairs, tests.total_pairs, tests.simulated_pairs, tests.real_pairs
                    );
                }
            }
            Ok(true)
        }

        Commands::Tests {
            workflow,
            format,
            output,
        } => {
            let scaffold = generate_tests(&store, &workflow, format.unwrap_or(config.scaffold.default_format));
            if scaffold.starts_with("Error:") {
                eprintln!("{}", scaffold);
                return Ok(false);
            }
            match output {
                Some(path) => {
                    std::fs::write(&path, scaffold).with_context(|| format!("writing {}", path.display()))?;
                    println!("✅ Wrote {}", path.display());
                }
                None => print!("{}", scaffold),
            }
            Ok(true)
        }

        Commands::List {
            entity_type,
            category,
            status,
            related_to,
        } => {
            let filter = ListFilter {
                category,
                status,
                related_to,
                validated: None,
            };
            let entities = store.list(entity_type, &filter);
            if cli.json {
                print_json(&entities)?;
            } else {
                for entity in entities {
                    println!("{:<24} {}", entity.id(), entity.name());
                }
            }
            Ok(true)
        }

        Commands::Get { entity_type, id } => {
            let entity = store.get(entity_type, &id)?;
            if cli.json {
                print_json(entity)?;
            } else {
                print!("{}", entity.to_yaml()?);
            }
            Ok(true)
        }

        Commands::Search { query, limit } => {
            if query.trim().is_empty() {
                bail!("search query must not be empty");
            }
            let hits = search(&store, &query, limit);
            if cli.json {
                print_json(&hits)?;
            } else {
                for hit in hits {
                    println!("{:>4}  {:<12} {:<24} {}", hit.score, hit.entity_type, hit.id, hit.name);
                }
            }
            Ok(true)
        }
    }
}

fn print_list(title: &str, ids: &[String]) {
    if ids.is_empty() {
        return;
    }
    println!("{}:", title);
    for id in ids {
        println!("  - {}", id);
    }
}

fn print_priorities(report: &PriorityReport) {
    match report {
        PriorityReport::Capability {
            priorities,
            total_unimplemented,
            workflows_blocked,
        } => {
            println!(
                "{} unimplemented capabilities blocking {} workflows",
                total_unimplemented, workflows_blocked
            );
            for (rank, CapabilityPriority { id, reasoning, .. }) in priorities.iter().enumerate() {
                println!("  {}. {} - {}", rank + 1, id, reasoning);
            }
        }
        PriorityReport::Workflow {
            priorities,
            total_candidates,
        } => {
            println!("{} workflows not yet implemented", total_candidates);
            for (rank, WorkflowPriority { id, readiness, reasoning, .. }) in priorities.iter().enumerate() {
                println!("  {}. {} ({:.0}% ready) - {}", rank + 1, id, readiness * 100.0, reasoning);
            }
        }
    }
}
