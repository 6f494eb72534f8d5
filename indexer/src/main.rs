use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use reviewdex_core::config::{BuildMode, EngineConfig};
use reviewdex_core::persist::{export_json, load_index, load_meta, save_index, IndexPaths, StoreReport};
use reviewdex_core::vsm::{SparseVectorSpace, VectorSpace};
use reviewdex_core::{
    select_builder, BuildContext, DfBand, DfLimit, Diagnostics, Index, IndexBuilder, Query, QueryEngine,
    RetrievalModel, Tokenizer,
};
use tracing_subscriber::{fmt, EnvFilter};

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod corpus;

use corpus::Corpus;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and inspect a review corpus index", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON); flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print the timing breakdown to stderr when done
    #[arg(long, global = true, default_value_t = false)]
    report: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Auto,
    Sequential,
    Parallel,
}

impl From<ModeArg> for BuildMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => BuildMode::Auto,
            ModeArg::Sequential => BuildMode::Sequential,
            ModeArg::Parallel => BuildMode::Parallel,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from .txt reviews, a .zip of them, or JSON/JSONL files
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Output index directory
        #[arg(long)]
        output: PathBuf,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Worker threads for a parallel build (0 = all cores)
        #[arg(long)]
        workers: Option<usize>,
        /// Documents per partition
        #[arg(long)]
        partition_size: Option<usize>,
        /// Drop terms found in fewer documents
        #[arg(long)]
        min_df: Option<u32>,
        /// Drop terms found in more documents: a count (500) or a fraction (0.85 or 85%)
        #[arg(long, value_parser = parse_df_limit)]
        max_df: Option<DfLimit>,
        /// Index unigrams only
        #[arg(long, default_value_t = false)]
        no_bigrams: bool,
    },
    /// Print index statistics
    Stats {
        #[arg(long)]
        index: PathBuf,
        /// Emit JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Print meta.json only, without loading the index
        #[arg(long, default_value_t = false, conflicts_with = "json")]
        meta: bool,
    },
    /// Rank documents for a query
    Search {
        #[arg(long)]
        index: PathBuf,
        #[arg(long)]
        query: String,
        /// Number of hits to show (0 = all)
        #[arg(long, default_value_t = 10)]
        k: usize,
        /// bim or tfidf
        #[arg(long, default_value = "tfidf")]
        model: RetrievalModel,
    },
    /// Dump the index as JSON
    Export {
        #[arg(long)]
        index: PathBuf,
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Reviews most similar to one review by tf-idf cosine
    Similar {
        #[arg(long)]
        index: PathBuf,
        /// Key of the review to compare against
        #[arg(long)]
        key: String,
        #[arg(long, default_value_t = 10)]
        n: usize,
    },
    /// Most frequent terms in the collection
    TopTerms {
        #[arg(long)]
        index: PathBuf,
        #[arg(long, default_value_t = 20)]
        n: usize,
    },
}

fn parse_df_limit(s: &str) -> Result<DfLimit, String> {
    let s = s.trim();
    if let Some(pct) = s.strip_suffix('%') {
        let pct: f64 = pct.trim().parse().map_err(|e| format!("invalid percentage {s:?}: {e}"))?;
        return Ok(DfLimit::Ratio(pct / 100.0));
    }
    if s.contains('.') {
        return s.parse().map(DfLimit::Ratio).map_err(|e| format!("invalid fraction {s:?}: {e}"));
    }
    s.parse().map(DfLimit::Count).map_err(|e| format!("invalid document count {s:?}: {e}"))
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let diagnostics = Diagnostics::new();

    let result = match cli.command {
        Commands::Build { input, output, mode, workers, partition_size, min_df, max_df, no_bigrams } => {
            if let Some(mode) = mode {
                config.build.mode = mode.into();
            }
            if let Some(workers) = workers {
                config.build.workers = workers;
            }
            if let Some(size) = partition_size {
                config.build.partition_size = size;
            }
            if min_df.is_some() || max_df.is_some() {
                let base = config.build.df_band.unwrap_or_default();
                config.build.df_band =
                    Some(DfBand::new(min_df.unwrap_or(base.min_df), max_df.unwrap_or(base.max_df)));
            }
            if no_bigrams {
                config.tokenizer.bigrams = false;
            }
            build_index(&config, &input, &output, &diagnostics)
        }
        Commands::Stats { index, json: _, meta: true } => {
            let meta = load_meta(&IndexPaths::new(&index))?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
            Ok(())
        }
        Commands::Stats { index, json, .. } => print_stats(&config, &index, json, &diagnostics),
        Commands::Similar { index, key, n } => similar(&config, &index, &key, n, &diagnostics),
        Commands::Search { index, query, k, model } => search(&config, &index, &query, k, model, &diagnostics),
        Commands::Export { index, output, top } => export(&config, &index, output.as_deref(), top, &diagnostics),
        Commands::TopTerms { index, n } => {
            let index = open(&config, &index, &diagnostics)?;
            for (term, cf) in index.most_frequent_terms(n) {
                println!("{term}\t{cf}");
            }
            Ok(())
        }
    };

    if cli.report {
        eprintln!("{}", diagnostics.report());
    }
    result
}

fn build_index(config: &EngineConfig, input: &Path, output: &Path, diagnostics: &Diagnostics) -> Result<()> {
    config.validate()?;
    let corpus = Corpus::discover(input)?;
    let size_hint = corpus.size_hint();
    let tokenizer = Arc::new(Tokenizer::new(config.tokenizer.clone()));
    let builder = select_builder(tokenizer, &config.build, size_hint);
    tracing::info!(mode = ?builder.mode(), files = corpus.sources().len(), ?size_hint, "building index");

    let built = builder
        .build(corpus.documents(), &BuildContext::new(diagnostics))
        .context("index build failed")?;
    let paths = IndexPaths::new(output);
    save_index(&paths, &built.index, Some(built.report.mode), &config.store, diagnostics)
        .with_context(|| format!("saving index to {}", output.display()))?;

    println!("{}", serde_json::to_string_pretty(&built.report)?);
    Ok(())
}

fn open(config: &EngineConfig, dir: &Path, diagnostics: &Diagnostics) -> Result<Index> {
    Ok(open_with_report(config, dir, diagnostics)?.0)
}

fn open_with_report(config: &EngineConfig, dir: &Path, diagnostics: &Diagnostics) -> Result<(Index, StoreReport)> {
    load_index(&IndexPaths::new(dir), &config.store, diagnostics)
        .with_context(|| format!("loading index from {}", dir.display()))
}

fn print_stats(config: &EngineConfig, dir: &Path, json: bool, diagnostics: &Diagnostics) -> Result<()> {
    let (index, StoreReport { meta, .. }) = open_with_report(config, dir, diagnostics)?;
    let stats = index.statistics();
    let memory = index.memory_usage();

    if json {
        let out = serde_json::json!({ "meta": meta, "statistics": stats, "memory": memory });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    println!("created:          {}", meta.created_at);
    if let Some(mode) = meta.build_mode {
        println!("build mode:       {mode:?}");
    }
    println!("documents:        {}", stats.document_count);
    println!("vocabulary:       {}", stats.vocabulary_size);
    println!("postings:         {}", index.stats().num_postings);
    println!(
        "doc length:       avg {:.2}, min {}, max {}",
        stats.avg_doc_length, stats.min_doc_length, stats.max_doc_length
    );
    println!(
        "collection freq:  avg {:.2}, min {}, max {}",
        stats.avg_term_freq, stats.min_term_freq, stats.max_term_freq
    );
    println!(
        "document freq:    avg {:.2}, min {}, max {}",
        stats.avg_doc_freq, stats.min_doc_freq, stats.max_doc_freq
    );
    println!("memory estimate:  {:.2} MiB", memory.total() as f64 / (1024.0 * 1024.0));
    Ok(())
}

fn search(
    config: &EngineConfig,
    dir: &Path,
    query: &str,
    k: usize,
    model: RetrievalModel,
    diagnostics: &Diagnostics,
) -> Result<()> {
    let index = Arc::new(open(config, dir, diagnostics)?);
    let engine = QueryEngine::new(index, Arc::new(Tokenizer::new(config.tokenizer.clone())), config.weighting);
    let results = engine.search(&Query::from(query), model, k, diagnostics);
    if results.terms.is_empty() {
        println!("no query terms found in the vocabulary");
        return Ok(());
    }
    println!(
        "{} hits for [{}] in {:.4}s",
        results.total_hits,
        results.terms.join(", "),
        results.elapsed.as_secs_f64()
    );
    for (rank, hit) in results.hits.iter().enumerate() {
        println!("{:>4}. {:<24} {:.4}", rank + 1, hit.external_id, hit.score);
    }
    Ok(())
}

fn similar(config: &EngineConfig, dir: &Path, key: &str, n: usize, diagnostics: &Diagnostics) -> Result<()> {
    let index = Arc::new(open(config, dir, diagnostics)?);
    let Some(doc_id) = index.doc_id(key) else {
        anyhow::bail!("no document with key {key:?}");
    };
    let space = SparseVectorSpace::new(index.clone(), config.weighting);
    let similar = {
        let _t = diagnostics.timer("Similar Reviews");
        space.most_similar(doc_id, n)
    };
    for (rank, (other, score)) in similar.into_iter().enumerate() {
        let other_key = index.doc(other).map_or("", |d| d.external_id.as_str());
        println!("{:>4}. {:<24} {:.4}", rank + 1, other_key, score);
    }
    Ok(())
}

fn export(config: &EngineConfig, dir: &Path, output: Option<&Path>, top: usize, diagnostics: &Diagnostics) -> Result<()> {
    let index = open(config, dir, diagnostics)?;
    let _t = diagnostics.timer("Export");
    match output {
        Some(path) => {
            let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut w = BufWriter::new(f);
            export_json(&index, &mut w, top)?;
            w.flush()?;
            tracing::info!(path = %path.display(), "index exported");
        }
        None => {
            let stdout = io::stdout();
            let mut w = BufWriter::new(stdout.lock());
            export_json(&index, &mut w, top)?;
            writeln!(w)?;
        }
    }
    Ok(())
}
