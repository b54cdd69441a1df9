use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use fragdb_core::config::{expand_path, Config};
use fragdb_core::traits::FragmentSource;
use fragdb_core::types::{Filter, FilterValue, Fragment, SearchResult};
use fragdb_embed::{
    disk_cache_at, get_default_cross_encoder, get_default_embedding_model, EmbeddingGenerator,
};
use fragdb_hybrid::{SearchOptions, SearchService};
use fragdb_vector::{FragmentIndex, Metric};

const INGEST_BATCH: usize = 64;

/// Producer output on disk: one JSON file holding a fragment array (or a
/// single fragment), or a directory tree of such files.
struct JsonFragmentSource {
    path: PathBuf,
}

impl JsonFragmentSource {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_file(path: &Path) -> Result<Vec<Fragment>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        if let Ok(many) = serde_json::from_str::<Vec<Fragment>>(&raw) {
            return Ok(many);
        }
        let one: Fragment = serde_json::from_str(&raw)
            .with_context(|| format!("parsing fragments from {}", path.display()))?;
        Ok(vec![one])
    }
}

impl FragmentSource for JsonFragmentSource {
    fn fragments(&self) -> Result<Vec<Fragment>> {
        if self.path.is_file() {
            return Self::read_file(&self.path);
        }
        let mut fragments = Vec::new();
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect();
        files.sort();
        for file in files {
            fragments.extend(Self::read_file(&file)?);
        }
        Ok(fragments)
    }
}

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() {
        eprintln!(
            "Usage: {prog} <ingest|search|stats|fragment|similar|file|reset> [args...]"
        );
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

fn build_service(config: &Config) -> Result<SearchService> {
    let data_dir = expand_path(
        config
            .get::<String>("data.index_dir")
            .unwrap_or_else(|_| "./data".to_string()),
    );
    let cache_dir = expand_path(
        config
            .get::<String>("data.cache_dir")
            .unwrap_or_else(|_| "./data/cache".to_string()),
    );
    let index_name: String = config
        .get("index.name")
        .unwrap_or_else(|_| "code_fragments".to_string());
    let metric = Metric::from_str(
        &config
            .get::<String>("index.metric")
            .unwrap_or_else(|_| "cosine".to_string()),
    )?;

    let model = get_default_embedding_model()?;
    let dimension = model.dimension();
    let embedding_cache = disk_cache_at::<Vec<f32>>(&cache_dir, "embeddings")?;
    let embedder = EmbeddingGenerator::new(model, Some(Box::new(embedding_cache)));

    let index = Arc::new(FragmentIndex::open(&data_dir, &index_name, dimension, metric)?);
    Ok(SearchService::new(index, embedder, get_default_cross_encoder()))
}

fn ingest(service: &SearchService, args: &[String]) -> Result<()> {
    let path = args
        .first()
        .map(expand_path)
        .ok_or_else(|| anyhow!("Usage: fragdb ingest <fragments.json|dir>"))?;
    let source = JsonFragmentSource::new(path);
    let fragments = source.fragments()?;
    if fragments.is_empty() {
        println!("No fragments found.");
        return Ok(());
    }

    let pb = ProgressBar::new(fragments.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} fragments ({percent}%)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    let mut added = 0usize;
    for batch in fragments.chunks(INGEST_BATCH) {
        added += service.index_fragments(batch)?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("done");
    println!(
        "Indexed {added} new fragments ({} supplied, {} total in index)",
        fragments.len(),
        service.stats().vector_count
    );
    Ok(())
}

/// `search "<query>" [--k=N] [--weight=W] [--type=KIND] [--rerank|--norerank]`
fn search(service: &SearchService, args: &[String]) -> Result<()> {
    let joined = args.join(" ");
    let mut pieces = joined.split("--");
    let query = pieces
        .next()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| anyhow!("Usage: fragdb search \"<query>\" [--k=N --weight=W --type=KIND --rerank]"))?
        .to_string();

    let mut opts = SearchOptions { k: 5, ..SearchOptions::default() };
    let mut filter: Filter = BTreeMap::new();
    for piece in pieces {
        let piece = piece.trim();
        if let Some((key, value)) = piece.split_once('=') {
            match key.trim() {
                "k" => opts.k = value.trim().parse().context("--k expects a number")?,
                "weight" => {
                    opts.ensemble_weight =
                        value.trim().parse().context("--weight expects a float")?;
                }
                "type" => {
                    filter.insert(
                        "type".to_string(),
                        FilterValue::One(value.trim().to_string()),
                    );
                }
                other => {
                    filter.insert(other.to_string(), FilterValue::One(value.trim().to_string()));
                }
            }
        } else {
            match piece {
                "rerank" => opts.rerank = true,
                "norerank" => opts.rerank = false,
                "" => {}
                flag => return Err(anyhow!("unknown flag --{flag}")),
            }
        }
    }
    if !filter.is_empty() {
        opts.filters = Some(filter);
    }

    let results = service.search(&query, &opts)?;
    if results.is_empty() {
        println!("No results for '{query}'.");
        return Ok(());
    }
    println!("Results for '{query}' ({}):", results.len());
    for (rank, result) in results.iter().enumerate() {
        print_result(rank + 1, result);
    }
    Ok(())
}

fn print_result(rank: usize, result: &SearchResult) {
    let mut score_text = format!("score: {:.4}", result.score);
    if let Some(keyword) = result.keyword_score {
        score_text.push_str(&format!(" | keyword: {keyword:.2}"));
    }
    if let Some(cross) = result.cross_score {
        score_text.push_str(&format!(" | rerank: {cross:.4}"));
    }
    println!("[{rank}] {} ({}) - {score_text}", result.name, result.kind);
    println!("  file: {}", result.file_name);
    println!("  {}", result.content_preview);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let (cmd, args) = parse_args();
    let service = build_service(&config)?;

    match cmd.as_str() {
        "ingest" => ingest(&service, &args)?,
        "search" => search(&service, &args)?,
        "stats" => {
            let stats = service.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            if let Some(cache) = service.embedding_cache_stats() {
                println!("embedding cache: {}", serde_json::to_string(&cache)?);
            }
        }
        "fragment" => {
            let id = args
                .first()
                .ok_or_else(|| anyhow!("Usage: fragdb fragment <id>"))?;
            match service.get_fragment(id) {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("Fragment '{id}' not found."),
            }
        }
        "similar" => {
            let id = args
                .first()
                .ok_or_else(|| anyhow!("Usage: fragdb similar <id> [k]"))?;
            let k = args.get(1).and_then(|v| v.parse::<usize>().ok()).unwrap_or(5);
            let results = service.similar(id, k)?;
            if results.is_empty() {
                println!("No similar fragments for '{id}'.");
            }
            for (rank, result) in results.iter().enumerate() {
                print_result(rank + 1, result);
            }
        }
        "file" => {
            let path = args
                .first()
                .ok_or_else(|| anyhow!("Usage: fragdb file <file_path>"))?;
            let results = service.fragments_by_file(path);
            if results.is_empty() {
                println!("No fragments recorded for '{path}'.");
            }
            for (rank, result) in results.iter().enumerate() {
                print_result(rank + 1, result);
            }
        }
        "reset" => {
            service.reset();
            println!("Index cleared.");
        }
        _ => {
            eprintln!("Unknown command: {cmd}");
            std::process::exit(1);
        }
    }
    Ok(())
}
