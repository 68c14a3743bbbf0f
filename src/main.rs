use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use ad_library_ranker::config::Config;
use ad_library_ranker::constants::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, RAW_DIR};
use ad_library_ranker::logging;
use ad_library_ranker::pipeline::ingestion::load_raw_artifact;
use ad_library_ranker::pipeline::{Pipeline, PipelineOptions};
use ad_library_ranker::storage::FsArtifactStore;

#[derive(Parser)]
#[command(name = "ad_library_ranker")]
#[command(about = "Cleans, deduplicates and ranks ad library records by runtime")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to $AD_RANKER_CONFIG or ./ad_ranker.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over a raw artifact and write all outputs
    Run {
        /// Raw artifact to process (defaults to the newest data/raw/raw_ads_*.json)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Override the number of ads in the report
        #[arg(long)]
        top_n: Option<usize>,
    },
    /// Derive and deduplicate a raw artifact without writing anything
    Inspect {
        #[arg(long)]
        input: PathBuf,
    },
}

fn config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn resolve_input(store: &FsArtifactStore, input: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = input {
        return Ok(path);
    }
    match store.latest_raw_artifact()? {
        Some(path) => Ok(path),
        None => bail!(
            "no raw artifact found under {}; pass --input",
            store.data_dir().join(RAW_DIR).display()
        ),
    }
}

fn inspect(input: &Path, options: &PipelineOptions) -> anyhow::Result<()> {
    let batch = load_raw_artifact(input, &options.ad_library_url)
        .with_context(|| format!("loading {}", input.display()))?;
    let outcome = Pipeline::transform(batch, options, Utc::now());

    println!("\n🔎 Inspection of {}:", input.display());
    println!("   Raw records: {}", outcome.raw_records);
    println!("   Rejected: {}", outcome.rejected.len());
    println!("   Duplicates removed: {}", outcome.duplicates_removed);
    println!("   Cleaned: {}", outcome.records.len());
    println!("   Active and rankable: {}", outcome.active_rankable());

    if !outcome.rejected.is_empty() {
        println!("\n⚠️  Rejected records:");
        for record in &outcome.rejected {
            println!("   - [{} #{}] {}", record.stage, record.index, record.reason);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config_path = config_path(cli.config);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    logging::init_logging(&config.log_dir);
    info!("Using data dir {}", config.data_dir.display());

    let store = FsArtifactStore::new(&config.data_dir);
    let mut options = PipelineOptions::from(&config);

    match cli.command {
        Commands::Run { input, top_n } => {
            if let Some(n) = top_n {
                if n == 0 {
                    bail!("--top-n must be at least 1");
                }
                options.top_n = n;
            }
            let input = resolve_input(&store, input)?;
            println!("🚀 Running ad ranking pipeline on {}...", input.display());

            match Pipeline::run_artifact(&input, &store, &options, Utc::now()).await {
                Ok(summary) => {
                    info!("Pipeline finished");
                    println!("\n📊 Pipeline Results for run {}:", summary.run_id);
                    println!("   Raw records: {}", summary.raw_records);
                    println!("   Rejected: {}", summary.rejected);
                    println!("   Enriched: {}", summary.enriched);
                    println!("   Duplicates removed: {}", summary.duplicates_removed);
                    println!("   Cleaned: {}", summary.cleaned);
                    println!("   Ranked: {}", summary.ranked);
                    println!("   Cleaned set: {}", summary.cleaned_artifact);
                    println!("   Report: {}", summary.report_artifact);
                    println!("   Validation report: {}", summary.validation_artifact);

                    if summary.rejected > 0 {
                        warn!("{} records rejected during the run", summary.rejected);
                    }
                }
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    println!("❌ Pipeline failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Inspect { input } => inspect(&input, &options)?,
    }
    Ok(())
}
