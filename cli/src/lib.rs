//! Command line front end: build an index from a corpus file, then query it.

pub mod corpus;
pub mod report;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use simdex_retrieval::{Embedder, EmbeddingStore, IndexStore, RetrievalConfig, Retriever};

use crate::corpus::load_corpus;
use crate::report::QueryReport;

/// Semantic similarity search over a document corpus.
#[derive(Debug, Parser)]
#[command(name = "simdex", version, about)]
pub struct Cli {
    /// Configuration file (defaults to the per-user config.toml if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the index artifacts.
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    /// Log at info level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Embed a corpus and save the index.
    Build(BuildArgs),

    /// Find the documents most similar to a query.
    Query(QueryArgs),

    /// Describe the saved index.
    Info,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Corpus file: JSON (`{"docs": [...]}` or an array) or one document per line.
    #[arg(long)]
    pub corpus: PathBuf,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Query text. Reads one query per line from stdin when omitted.
    pub text: Option<String>,

    /// Number of matches to return.
    #[arg(short)]
    pub k: Option<usize>,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Also save each report as a JSON file in this directory.
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

/// Run a parsed command against the given stdin/stdout.
pub fn run<R: BufRead, W: Write>(cli: Cli, input: R, output: &mut W) -> Result<()> {
    let mut config = RetrievalConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(dir) = cli.index_dir {
        config.index_dir = dir;
    }

    match cli.command {
        Command::Build(args) => build(&config, &args, output),
        Command::Query(args) => query(&config, &args, input, output),
        Command::Info => describe(&config, output),
    }
}

fn build<W: Write>(config: &RetrievalConfig, args: &BuildArgs, output: &mut W) -> Result<()> {
    let documents = load_corpus(&args.corpus)?;
    let embedder = config.embedding.embedder()?;

    let store = EmbeddingStore::build(documents, &embedder).context("failed to embed corpus")?;
    let index = store.build_index(config.query.metric)?;

    let storage = IndexStore::new(&config.index_dir).with_embedder(embedder.signature());
    storage.save(&store, &index)?;

    writeln!(
        output,
        "Indexed {} documents (dimension {}) into {}",
        store.size(),
        index.dimension(),
        storage.base_path().display()
    )?;
    Ok(())
}

fn open(config: &RetrievalConfig) -> Result<Retriever> {
    let embedder = config.embedding.embedder()?;
    let storage = IndexStore::new(&config.index_dir).with_embedder(embedder.signature());
    let (store, index) = storage.load().with_context(|| {
        format!(
            "failed to load index from {} (run `simdex build` first)",
            storage.base_path().display()
        )
    })?;

    Ok(Retriever::new(embedder, store, index)?)
}

fn query<R: BufRead, W: Write>(
    config: &RetrievalConfig,
    args: &QueryArgs,
    input: R,
    output: &mut W,
) -> Result<()> {
    let retriever = open(config)?;
    let k = args.k.unwrap_or(config.query.top_k);

    match &args.text {
        Some(text) => answer(&retriever, text, k, args, output),
        None => {
            for line in input.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                answer(&retriever, &line, k, args, output)?;
            }
            Ok(())
        }
    }
}

fn answer<W: Write>(
    retriever: &Retriever,
    text: &str,
    k: usize,
    args: &QueryArgs,
    output: &mut W,
) -> Result<()> {
    let results = retriever
        .query_text(text, k)
        .with_context(|| format!("query failed: {text}"))?;
    let report = QueryReport::new(text, k, results);

    if args.json {
        serde_json::to_writer(&mut *output, &report)?;
        writeln!(output)?;
    } else {
        writeln!(output, "Top matches for: {}", report.query)?;
        for record in &report.results {
            writeln!(
                output,
                "\nMatch #{} - Score: {:.4}\n{}",
                record.rank, record.similarity, record.text
            )?;
        }
        writeln!(output)?;
    }

    if let Some(dir) = &args.report_dir {
        let path = report.write_to_dir(dir)?;
        info!("Saved results to {}", path.display());
    }
    Ok(())
}

fn describe<W: Write>(config: &RetrievalConfig, output: &mut W) -> Result<()> {
    let stats = open(config)?.stats();

    writeln!(output, "index:     {}", config.index_dir.display())?;
    writeln!(output, "documents: {}", stats.documents)?;
    writeln!(output, "dimension: {}", stats.dimension)?;
    writeln!(output, "metric:    {:?}", stats.metric)?;
    writeln!(output, "embedder:  {}", stats.embedder)?;
    Ok(())
}
