use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use resume_search::config::{self, Config};
use resume_search::{
    CompositeKey, FastEmbedder, Field, FieldStore, FieldWeights, RankedResult, SearchEngine,
    SurrealFieldStore,
};

#[derive(Debug, Parser)]
#[command(
    name = "resume-search",
    version,
    about = "Weighted semantic search over per-field resume embeddings"
)]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Embed and store candidates from a JSONL file.
    Index { path: PathBuf },
    /// Rank candidates across all weighted fields.
    Search {
        query: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        num_results: usize,
        /// Override one field weight, e.g. `--weight skills=0.5`.
        #[arg(long = "weight", value_name = "FIELD=WEIGHT", value_parser = parse_weight)]
        weights: Vec<(String, f32)>,
    },
    /// Search a single field without weighting.
    Field {
        field: String,
        query: String,
        #[arg(short = 'n', long, default_value_t = 20)]
        num_results: usize,
    },
    /// Print the stored fields of one candidate.
    Show { id: String },
    /// Print one stored entry by composite key (`{id}_{field}`).
    Entry { key: String },
    /// Print store statistics.
    Stats,
    /// Delete every stored entry.
    Reset,
}

fn parse_weight(raw: &str) -> Result<(String, f32), String> {
    let (field, weight) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=WEIGHT, got `{raw}`"))?;
    let weight = weight
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("invalid weight `{weight}`: {e}"))?;
    Ok((field.trim().to_string(), weight))
}

fn print_ranked(results: &[RankedResult], field_count: usize) {
    if results.is_empty() {
        println!("No candidates found!");
        return;
    }

    println!("\nTop {} candidates:", results.len());
    println!("---------------");
    for (i, result) in results.iter().enumerate() {
        println!("{}. {}", i + 1, result.name);
        println!("   Score: {:.4}", result.total_score);
        println!("   Fields matched: {}/{}", result.fields_matched.len(), field_count);
        println!("   ID: {}", result.candidate_id);
        for score in &result.fields_matched {
            println!(
                "     - {}: {:.3} (weight {:.2}, contributes {:.3})",
                score.field, score.relevance, score.weight, score.contribution
            );
            println!("       \"{}\"", score.preview);
        }
        println!();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load(path)?,
        None => Config::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let embedder = FastEmbedder::new(
        config.embedding.model,
        config.embedding.show_download_progress,
    )?;
    let store = SurrealFieldStore::open(
        &config.store.path,
        &config.store.namespace,
        &config.store.database,
        embedder,
    )
    .await
    .with_context(|| format!("failed to open store at {}", config.store.path.display()))?;
    let engine = SearchEngine::new(store, config.search.clone());

    match cli.command {
        Command::Index { path } => {
            let stats = engine.store().index_jsonl(&path).await?;
            println!(
                "Processed {} records: {} stored, {} failed, {} field embeddings",
                stats.processed, stats.stored, stats.failed, stats.total_embeddings
            );
        }
        Command::Search {
            query,
            num_results,
            weights,
        } => {
            let mut overrides: FieldWeights = engine.config().weights.clone();
            for (name, weight) in weights {
                overrides = overrides.with(name.parse::<Field>()?, weight)?;
            }

            println!("Searching for '{}'...", query);
            let response = engine.search(&query, num_results, Some(&overrides)).await?;
            if response.is_partial() {
                println!("Warning: partial results, failed fields: {:?}", response.degraded_fields);
            }
            print_ranked(&response.results, overrides.active().count());
        }
        Command::Field {
            field,
            query,
            num_results,
        } => {
            let field: Field = field.parse()?;
            let matches = engine.search_single_field(&query, field, num_results).await?;
            if matches.is_empty() {
                println!("No matches in {field}!");
            }
            for (i, m) in matches.iter().enumerate() {
                println!(
                    "{}. {} ({}) relevance {:.4}, distance {:.4}, {} chars",
                    i + 1,
                    m.name,
                    m.candidate_id,
                    m.hit.relevance,
                    m.hit.distance,
                    m.content_length
                );
                println!("   {:.100}", m.content);
            }
        }
        Command::Show { id } => {
            let record = engine.get_full_record(&id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Entry { key } => {
            let key = CompositeKey::parse(&key)?;
            match engine.store().get_entry(&key.candidate_id, key.field).await? {
                Some(entry) => {
                    println!("Candidate: {} ({})", entry.name, entry.candidate_id);
                    println!("Field: {}", entry.field_name);
                    println!("Length: {}", entry.content_length);
                    println!("Indexed at: {}", entry.indexed_at);
                    println!("{}", entry.content);
                }
                None => println!("No entry stored for {key}"),
            }
        }
        Command::Stats => {
            let stats = engine.store().stats().await?;
            println!("Total embeddings: {}", stats.total_embeddings);
            println!("Unique candidates: {}", stats.unique_candidates);
            for (field, count) in &stats.field_distribution {
                println!("  {field}: {count}");
            }
        }
        Command::Reset => {
            engine.store().reset().await?;
            println!("Store reset.");
        }
    }

    Ok(())
}
