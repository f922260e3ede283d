use clap::{Parser, Subcommand};
use finsight_retriever::answer::{DEFAULT_LIBRARY_NAME, render_context};
use finsight_retriever::retrieval::{BuildReport, InitOutcome, SearchResults};
use finsight_retriever::storage::Snapshot;
use finsight_retriever::{Retriever, RetrieverConfig};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Index a financial-literacy library and search it by meaning.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of documents to index (overrides the config file)
    #[arg(long)]
    corpus_dir: Option<PathBuf>,

    /// Snapshot file location (overrides the config file)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the index, or restore it from a fresh snapshot
    Index,
    /// Rebuild the index from the corpus, ignoring any snapshot
    Rebuild,
    /// Find passages similar to a query
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Maximum distance for a passage to count as relevant
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Print the context block a language model would receive for a question
    Ask { query: String },
    /// Show snapshot and configuration details
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(args: &Args) -> anyhow::Result<RetrieverConfig> {
    let mut config = match &args.config {
        Some(path) => RetrieverConfig::from_file(path)?,
        None => RetrieverConfig::default(),
    };
    if let Some(dir) = &args.corpus_dir {
        config.corpus_dir = dir.clone();
    }
    if let Some(snapshot) = &args.snapshot {
        config.snapshot_path = Some(snapshot.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Commands::Index => {
            let retriever = Retriever::with_fastembed(config).await?;
            match retriever.initialize().await? {
                InitOutcome::Restored { chunks } => {
                    println!("Restored index with {chunks} chunks from snapshot");
                }
                InitOutcome::Built(report) => print_report(&report),
            }
            Ok(())
        }
        Commands::Rebuild => {
            let retriever = Retriever::with_fastembed(config).await?;
            let report = retriever.rebuild().await?;
            print_report(&report);
            Ok(())
        }
        Commands::Search {
            query,
            top_k,
            threshold,
            format,
        } => {
            let top_k = top_k.unwrap_or(config.top_k_results);
            let threshold = threshold.unwrap_or(config.score_threshold);
            let retriever = Retriever::with_fastembed(config).await?;
            retriever.initialize().await?;
            let results = retriever.search(&query, top_k, threshold).await?;
            print_results(&results, &format)
        }
        Commands::Ask { query } => {
            let retriever = Retriever::with_fastembed(config).await?;
            retriever.initialize().await?;
            let results = retriever.search_with_defaults(&query).await?;
            println!("{}", render_context(&results, DEFAULT_LIBRARY_NAME));
            Ok(())
        }
        Commands::Status { format } => {
            let snapshot_path = config.snapshot_path();
            let header = if snapshot_path.exists() {
                Some(Snapshot::load_header(&snapshot_path).await)
            } else {
                None
            };

            if format == OutputFormat::Json {
                let value = serde_json::json!({
                    "corpus_dir": config.corpus_dir,
                    "snapshot_path": snapshot_path,
                    "embedding_model": config.embedding.model_name,
                    "metric": config.metric,
                    "chunk_size": config.chunk_size,
                    "chunk_overlap": config.chunk_overlap,
                    "snapshot": match &header {
                        Some(Ok(header)) => serde_json::to_value(header)?,
                        Some(Err(e)) => serde_json::json!({ "error": e.to_string() }),
                        None => serde_json::Value::Null,
                    },
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            println!("Corpus directory: {}", config.corpus_dir.display());
            println!("Snapshot:         {}", snapshot_path.display());
            println!("Embedding model:  {}", config.embedding.model_name);
            println!("Distance metric:  {}", config.metric);
            println!(
                "Chunking:         {} words, {} overlap",
                config.chunk_size, config.chunk_overlap
            );
            match header {
                None => println!("\nNo snapshot found; run `finsight index` to build one."),
                Some(Err(e)) => println!("\nSnapshot is unreadable: {e}"),
                Some(Ok(header)) => {
                    println!("\nSnapshot details:");
                    println!("  Model:      {}", header.key.model.model_id());
                    println!("  Documents:  {}", header.document_count);
                    println!("  Chunks:     {}", header.chunk_count);
                    println!("  Signature:  {}", header.key.corpus_signature);
                    let created = chrono::DateTime::from_timestamp(header.created_at, 0)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| header.created_at.to_string());
                    println!("  Created:    {created}");
                    if format == OutputFormat::Full {
                        println!(
                            "  Chunking:   {} words, {} overlap",
                            header.key.chunk_size, header.key.chunk_overlap
                        );
                        println!("  Written by: finsight {}", header.retriever_version);
                    }
                }
            }
            Ok(())
        }
    }
}

fn print_report(report: &BuildReport) {
    println!(
        "Indexed {} chunks from {} of {} documents in {:.2?}",
        report.chunks_indexed, report.documents_indexed, report.documents_found, report.elapsed
    );
    if report.documents_skipped > 0 {
        println!("Skipped {} documents with no indexable text", report.documents_skipped);
    }
    if report.chunks_filtered > 0 {
        println!("Dropped {} short chunks", report.chunks_filtered);
    }
    if !report.persisted {
        println!("Warning: snapshot was not saved; the index will be rebuilt next time");
    }
}

fn print_results(results: &SearchResults, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results)?);
        }
        OutputFormat::Summary | OutputFormat::Full => {
            if results.is_empty() {
                println!("No relevant passages found for: {}", results.query);
                return Ok(());
            }
            println!("Found {} passages for: {}", results.len(), results.query);
            for (i, hit) in results.iter().enumerate() {
                println!(
                    "\n{}. {} #{} (distance {:.3}, {:?} relevance)",
                    i + 1,
                    hit.source,
                    hit.sequence,
                    hit.score,
                    hit.relevance
                );
                if *format == OutputFormat::Full {
                    println!("{}", hit.text);
                } else {
                    let preview: String = hit.text.chars().take(200).collect();
                    let ellipsis = if hit.text.chars().count() > 200 { "..." } else { "" };
                    println!("   {preview}{ellipsis}");
                }
            }
        }
    }
    Ok(())
}
