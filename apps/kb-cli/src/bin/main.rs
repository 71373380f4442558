use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kb_core::config::{expand_path, Config};
use kb_core::data_processor::DataProcessor;
use kb_core::language::ScriptLanguageDetector;
use kb_core::traits::Embedder;
use kb_core::types::{Chunk, Strategy};
use kb_hybrid::{format_context, HybridRetriever, IndexedCorpus};
use kb_text::LexicalIndex;
use kb_vector::store::{LanceSnapshotStore, DEFAULT_TABLE};
use kb_vector::{embed_missing, embedding_progress, LanceVectorIndex};

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Hybrid lexical + vector search over a knowledge base", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CorpusArgs {
    /// Directory of .md/.txt documents (defaults to data.raw_dir)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Use the hashing embedder instead of loading the model
    #[arg(long)]
    fake_embeddings: bool,

    /// Reuse the chunk snapshot under data.lance_dir, writing it first if missing
    #[arg(long)]
    snapshot: bool,

    /// Serve vector search from the LanceDB table instead of memory
    #[arg(long, requires = "snapshot")]
    lance_search: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a directory and run one query against it
    Query {
        text: String,

        #[command(flatten)]
        corpus: CorpusArgs,

        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum cosine similarity for vector-only hits
        #[arg(long)]
        threshold: Option<f32>,

        /// Force a strategy (vector, lexical, hybrid)
        #[arg(long)]
        strategy: Option<Strategy>,

        /// Search the query as typed, without expanded variants
        #[arg(long)]
        no_expansion: bool,
    },

    /// Show strategy, variants and clarification flag for a query
    Plan {
        text: String,

        #[arg(long)]
        strategy: Option<Strategy>,

        #[arg(long)]
        fake_embeddings: bool,
    },

    /// Index a directory and print retriever status as JSON
    Status {
        #[command(flatten)]
        corpus: CorpusArgs,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer().with_target(false).with_writer(std::io::stderr)).with(filter).init();
}

fn build_embedder(config: &Config, fake: bool) -> Result<Arc<dyn Embedder>> {
    let mut settings = config.embedding()?;
    settings.use_fake |= fake;
    kb_embed::embedder_from_settings(&settings)
}

fn read_corpus(config: &Config, corpus: &CorpusArgs) -> Result<Vec<Chunk>> {
    let dir = match &corpus.dir {
        Some(d) => d.clone(),
        None => expand_path(config.data()?.raw_dir),
    };
    let processor = DataProcessor::with_chunking(config.chunking()?);
    let chunks = processor.process_directory(&dir).with_context(|| format!("reading {}", dir.display()))?;
    info!(dir = %dir.display(), chunks = chunks.len(), "loaded documents");
    Ok(chunks)
}

/// Load the persisted snapshot, or read and embed the corpus and persist it.
async fn snapshot_chunks(
    config: &Config,
    corpus: &CorpusArgs,
    store: &LanceSnapshotStore,
    embedder: Arc<dyn Embedder>,
) -> Result<Vec<Chunk>> {
    let chunks = store.load().await?;
    if !chunks.is_empty() {
        info!(chunks = chunks.len(), "loaded chunk snapshot");
        return Ok(chunks);
    }
    let mut chunks = read_corpus(config, corpus)?;
    let batch_size = config.embedding()?.batch_size;
    let chunks = tokio::task::spawn_blocking(move || -> Result<Vec<Chunk>> {
        let pb = embedding_progress(chunks.len(), true);
        embed_missing(Some(embedder.as_ref()), &mut chunks, batch_size, &pb)?;
        Ok(chunks)
    })
    .await??;
    store.save(&chunks).await?;
    Ok(chunks)
}

async fn indexed_retriever(config: &Config, corpus: &CorpusArgs) -> Result<HybridRetriever> {
    let embedder = build_embedder(config, corpus.fake_embeddings)?;
    let batch_size = config.embedding()?.batch_size;
    let retriever = HybridRetriever::new(config.retrieval()?, Some(embedder.clone()))?
        .with_embed_batch_size(batch_size)
        .with_progress(true);

    if !corpus.snapshot {
        retriever.rebuild(read_corpus(config, corpus)?).await?;
        return Ok(retriever);
    }

    let db_path = expand_path(config.data()?.lance_dir);
    let store = LanceSnapshotStore::open(&db_path, DEFAULT_TABLE).await?;
    let chunks = snapshot_chunks(config, corpus, &store, embedder).await?;
    if corpus.lance_search {
        let lexical = LexicalIndex::build(&chunks)?;
        let vector = LanceVectorIndex::open(&store).await?;
        let indexed =
            IndexedCorpus::from_parts(chunks, Arc::new(lexical), Arc::new(vector), &ScriptLanguageDetector::default())?;
        retriever.publish(indexed).await;
    } else {
        retriever.rebuild(chunks).await?;
    }
    Ok(retriever)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;

    match cli.command {
        Commands::Query { text, corpus, top_k, threshold, strategy, no_expansion } => {
            let retriever = indexed_retriever(&config, &corpus).await?;
            let mut request = retriever.request(text).with_expansion(!no_expansion);
            if let Some(k) = top_k {
                request.top_k = k;
            }
            if let Some(t) = threshold {
                request.similarity_threshold = t;
            }
            request.strategy = strategy;
            let results = retriever.retrieve(request).await?;
            if results.is_empty() {
                println!("No results.");
            } else {
                print!("{}", format_context(&results));
            }
        }
        Commands::Plan { text, strategy, fake_embeddings } => {
            // No corpus is loaded, so cross-language variants are not generated.
            let embedder = build_embedder(&config, fake_embeddings)?;
            let retriever = HybridRetriever::new(config.retrieval()?, Some(embedder))?;
            let plan = retriever.plan(&text, strategy);
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Status { corpus } => {
            let retriever = indexed_retriever(&config, &corpus).await?;
            println!("{}", serde_json::to_string_pretty(&retriever.status())?);
        }
    }
    Ok(())
}
