use clap::{Parser, Subcommand, ValueEnum};
use docgraph::protocol::{self, Message};
use docgraph::{Collection, Project, Source, SourcesOptions};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// docgraph CLI: inspect content collections from the command line
#[derive(Parser)]
#[command(name = "docgraph", version, about)]
struct Cli {
    /// Project root containing docgraph.yaml (default: current directory)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List configured collections
    Collections,

    /// List sources in tree order
    Sources {
        /// Collection name
        collection: String,
        /// Only sources exactly this many levels below the root
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Show a single source
    Source {
        /// Collection name
        collection: String,
        /// Normalized path (e.g. examples/authoring)
        path: String,
    },

    /// Show the previous and next source
    Siblings {
        /// Collection name
        collection: String,
        /// Normalized path
        path: String,
        /// Follow reading order across directories instead of the parent's children
        #[arg(long)]
        reading: bool,
    },

    /// Resolve a named export of a source
    Export {
        /// Collection name
        collection: String,
        /// Normalized path
        path: String,
        /// Export name (e.g. frontmatter)
        name: String,
    },

    /// List the statically known exports of a source
    Exports {
        /// Collection name
        collection: String,
        /// Normalized path
        path: String,
    },

    /// Watch every collection and print a refresh message per change
    Watch,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let project = Project::open(&cli.root)?;

    match cli.command {
        Command::Collections => {
            let collections: Vec<serde_json::Value> = project
                .collections()
                .map(|(name, c)| {
                    json!({
                        "name": name,
                        "pattern": c.pattern(),
                        "base_directory": c.base_directory(),
                        "base_pathname": c.base_pathname(),
                        "schema": c.schema().names(),
                    })
                })
                .collect();
            print_output(&json!(collections), &cli.format)?;
        }

        Command::Sources { collection, depth } => {
            let collection = project.collection(&collection)?;
            let sources = collection.get_sources(SourcesOptions { depth }).await?;
            let summaries: Vec<serde_json::Value> = sources.iter().map(source_summary).collect();
            print_output(&json!(summaries), &cli.format)?;
        }

        Command::Source { collection, path } => {
            let collection = project.collection(&collection)?;
            let source = find_source(&collection, &path).await?;
            let mut summary = source_summary(&source);
            summary["children"] = json!(source
                .children()
                .iter()
                .map(Source::path_string)
                .collect::<Vec<_>>());
            print_output(&summary, &cli.format)?;
        }

        Command::Siblings {
            collection,
            path,
            reading,
        } => {
            let collection = project.collection(&collection)?;
            let source = find_source(&collection, &path).await?;
            let (previous, next) = if reading {
                collection.get_reading_siblings(&source)
            } else {
                collection.get_siblings(&source)
            };
            print_output(
                &json!({
                    "previous": previous.as_ref().map(source_summary),
                    "next": next.as_ref().map(source_summary),
                }),
                &cli.format,
            )?;
        }

        Command::Export {
            collection,
            path,
            name,
        } => {
            let collection = project.collection(&collection)?;
            let source = find_source(&collection, &path).await?;
            let export = collection.get_export(&source, &name).await?;
            print_output(&serde_json::to_value(&export)?, &cli.format)?;
        }

        Command::Exports { collection, path } => {
            let collection = project.collection(&collection)?;
            let source = find_source(&collection, &path).await?;
            let names = collection.get_export_names(&source).await?;
            print_output(&json!(names), &cli.format)?;
        }

        Command::Watch => {
            let watcher = project.watch()?;
            for name in project.collection_names() {
                log::info!("Watching collection '{name}'");
            }
            loop {
                let event = match tokio::task::block_in_place(|| watcher.event_rx.recv()) {
                    Ok(event) => event,
                    Err(_) => break,
                };
                let affected = project.invalidate(&event.directory);
                if affected > 0 {
                    println!("{}", protocol::to_json(&Message::from(event))?);
                }
            }
        }
    }

    Ok(())
}

async fn find_source(collection: &Arc<Collection>, path: &str) -> Result<Source, Box<dyn std::error::Error>> {
    collection
        .get_source(path)
        .await?
        .ok_or_else(|| format!("No source at '{path}' in '{}'", collection.pattern()).into())
}

fn source_summary(source: &Source) -> serde_json::Value {
    json!({
        "path": source.path_string(),
        "pathname": source.pathname(),
        "title": source.title(),
        "order": source.order(),
        "depth": source.depth(),
        "kind": source.kind(),
        "index": source.is_index(),
        "file": source.file_path(),
        "modified_at": source.modified_at(),
    })
}

fn print_output(value: &serde_json::Value, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}
