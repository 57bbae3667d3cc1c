use anyhow::Context;
use autolabel_core::{AutolabelConfig, AutolabelError, FfmpegFrameSampler, VlmClient};
use autolabel_ingest::{DatasetLayout, DatasetStore};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use autolabel_runner::{Orchestrator, PacingPolicy, RunOptions};

/// Annotate robot teleoperation episodes with a vision-language model.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Dataset directory, e.g. /data/straighten_papercup
    dataset_dir: String,

    /// Inference endpoint URL (overrides config and VLM_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Inference token (overrides config and VLM_API_TOKEN)
    #[arg(long)]
    api_token: Option<String>,

    /// Target sampling rate in frames per second
    #[arg(long)]
    fps: Option<f64>,

    /// Send individual frames instead of one grid image
    #[arg(long)]
    no_grid: bool,

    #[arg(long)]
    max_episodes: Option<usize>,

    /// Skip this many discovered videos (resume an interrupted batch)
    #[arg(long, default_value_t = 0)]
    start_index: usize,

    /// Process only the episode with this index
    #[arg(long)]
    single: Option<u64>,

    /// Write results and failures to this JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    #[arg(short, long, default_value = "autolabel.toml")]
    config: String,

    /// Annotate without backing up or modifying the dataset
    #[arg(long)]
    dry_run: bool,

    /// Exit with status 2 when any episode failed
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = match AutolabelConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    fmt().with_env_filter(filter).init();

    apply_overrides(&mut config, &args);
    config.validate()?;
    if config.inference.api_url.is_empty() {
        return Err(AutolabelError::MissingEndpoint.into());
    }

    let dataset_dir = PathBuf::from(shellexpand::tilde(&args.dataset_dir).as_ref());
    if !dataset_dir.is_dir() {
        anyhow::bail!("Dataset directory does not exist: {}", dataset_dir.display());
    }

    let source = FfmpegFrameSampler::new(&config.sampling);
    let annotator =
        VlmClient::new(config.inference.clone()).context("Failed to create inference client")?;
    let store = DatasetStore::open(DatasetLayout::new(&dataset_dir));

    let options = RunOptions {
        max_episodes: args.max_episodes,
        dry_run: args.dry_run,
        ..RunOptions::from_config(&config)
    };
    let pacing = PacingPolicy::from_config(&config.pacing);

    let mut orchestrator = Orchestrator::new(
        Box::new(source),
        Box::new(annotator),
        store,
        &config.dataset,
        options,
        pacing,
    )?;

    let report = match args.single {
        Some(index) => orchestrator.run_single(index).await?,
        None => orchestrator.run_batch(args.start_index).await?,
    };

    println!("{}", report.summary());

    if let Some(path) = &args.export {
        report
            .export(path)
            .with_context(|| format!("Failed to export results to {}", path.display()))?;
    }

    if args.strict && report.has_failures() {
        std::process::exit(2);
    }

    Ok(())
}

/// CLI flags win over file and environment configuration.
fn apply_overrides(config: &mut AutolabelConfig, args: &Args) {
    if let Some(url) = &args.api_url {
        config.inference.api_url = url.clone();
    }
    if let Some(token) = &args.api_token {
        config.inference.api_token = token.clone();
    }
    config.inference = std::mem::take(&mut config.inference).with_env_fallback();

    if let Some(fps) = args.fps {
        config.sampling.fps = fps;
    }
    if args.no_grid {
        config.sampling.use_grid = false;
    }
}
