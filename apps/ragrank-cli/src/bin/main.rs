use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ragrank_core::config::{expand_path, Config, Settings};
use ragrank_core::data_processor::load_text_documents;
use ragrank_core::traits::Embedder;
use ragrank_core::{Chunk, Chunker, Corpus};
use ragrank_embed::{load_relevance_model, HashEmbedder};
use ragrank_hybrid::{ModelLoader, RetrievalService};
use ragrank_vector::InMemoryVectorIndex;

const USAGE: &str = "Usage: ragrank <ingest [DIR] | query \"<text>\" [--dir DIR] [--final-k N]>";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

struct QueryArgs {
    text: String,
    dir: Option<PathBuf>,
    final_k: Option<usize>,
}

fn parse_query_args(args: &[String]) -> anyhow::Result<QueryArgs> {
    let mut text = None;
    let mut dir = None;
    let mut final_k = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dir" => dir = Some(PathBuf::from(iter.next().ok_or_else(|| anyhow!("--dir needs a value"))?)),
            "--final-k" => {
                let raw = iter.next().ok_or_else(|| anyhow!("--final-k needs a value"))?;
                final_k = Some(raw.parse().with_context(|| format!("invalid --final-k '{raw}'"))?);
            }
            other if text.is_none() => text = Some(other.to_string()),
            other => return Err(anyhow!("unexpected argument '{other}'")),
        }
    }
    let text = text.ok_or_else(|| anyhow!("missing query text\n{USAGE}"))?;
    Ok(QueryArgs { text, dir, final_k })
}

/// Loads every document under `dir` and chunks it into a fresh corpus.
fn build_corpus(settings: &Settings, dir: &Path) -> anyhow::Result<Corpus> {
    let documents = load_text_documents(dir)?;
    let chunker = Chunker::new(settings.chunking)?;
    let mut corpus = Corpus::new();

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
            .progress_chars("#>-"),
    );
    for document in documents {
        pb.set_message(document.id.clone());
        let id = document.id.clone();
        if let Err(e) = corpus.ingest(document, &chunker) {
            warn!(document = %id, error = %e, "skipping document");
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(corpus)
}

fn build_service(settings: &Settings, chunks: &[Chunk]) -> anyhow::Result<RetrievalService> {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
    let dense = Arc::new(InMemoryVectorIndex::new(Arc::clone(&embedder)));
    dense.index(chunks, true)?;

    let loader: ModelLoader = Box::new(move |rerank| load_relevance_model(rerank, Some(Arc::clone(&embedder))));
    let service = RetrievalService::init(settings.clone(), dense, loader)?;
    let stats = service.rebuild_sparse_index(chunks)?;
    info!(chunks = stats.chunks, terms = stats.terms, "indexes ready");
    Ok(service)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.settings()?;
    let (cmd, args) = parse_args();
    let default_dir = || expand_path(&settings.data.raw_txt_dir);

    match cmd.as_str() {
        "ingest" => {
            let data_dir = args.first().map(PathBuf::from).unwrap_or_else(default_dir);
            println!("Ingesting from {}", data_dir.display());
            let corpus = build_corpus(&settings, &data_dir)?;
            let chunks = corpus.chunks();
            let service = build_service(&settings, &chunks)?;
            let stats = service.sparse_index().stats();
            println!(
                "Ingest complete: {} documents, {} chunks, {} terms, avg chunk length {:.1}",
                corpus.document_count(),
                stats.chunks,
                stats.terms,
                stats.avgdl
            );
            if let Some(path) = &settings.sparse.snapshot_path {
                println!("Sparse index snapshot: {}", expand_path(path).display());
            }
            service.shutdown();
        }
        "query" => {
            let query = parse_query_args(&args).map_err(|e| {
                eprintln!("{e}");
                e
            })?;
            let data_dir = query.dir.clone().unwrap_or_else(default_dir);
            let corpus = build_corpus(&settings, &data_dir)?;
            let service = build_service(&settings, &corpus.chunks())?;

            let defaults = settings.retrieval;
            let final_k = query.final_k.unwrap_or(defaults.final_k);
            let retrieval = service
                .retrieve(&query.text, defaults.top_k_dense, defaults.top_k_sparse, final_k)
                .await?;
            for notice in &retrieval.notices {
                eprintln!("note: {notice}");
            }
            if retrieval.context.is_empty() {
                println!("No passages found for '{}'", query.text);
            } else {
                println!("{}", retrieval.text());
            }
            service.shutdown();
        }
        _ => {
            eprintln!("Unknown command: {}\n{USAGE}", cmd);
            std::process::exit(1);
        }
    }
    Ok(())
}
