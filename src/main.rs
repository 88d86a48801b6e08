use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use deal_pipeline::logging::{filter_for_verbosity, init_tracing};
use deal_pipeline::mentions::load_mentions;
use deal_pipeline::util::env;
use deal_pipeline::{Pipeline, PipelineConfig};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "deal-pipeline",
    version,
    about = "Resolve deal mentions, verify prices and write deals.json"
)]
struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Only warnings and errors
    #[arg(short, long, default_value_t = false)]
    quiet: bool,
    /// Mentions file (overrides DEALS_INPUT)
    #[arg(long)]
    input: Option<PathBuf>,
    /// Output file (overrides DEALS_OUTPUT)
    #[arg(long)]
    output: Option<PathBuf>,
    /// JSON map of deal id -> showPrice (overrides DEALS_OVERRIDES)
    #[arg(long)]
    overrides: Option<PathBuf>,
    /// Skip the PA-API tier and price from product pages only
    #[arg(long, default_value_t = false)]
    no_paapi: bool,
    /// Keep at most this many deals; 0 keeps all (overrides DEALS_MAX_COUNT)
    #[arg(long)]
    max_deals: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env::init_env();
    init_tracing(&filter_for_verbosity(cli.verbose, cli.quiet))?;
    env::bootstrap_cli("deal-pipeline");

    let mut cfg = PipelineConfig::from_env().context("reading configuration")?;
    if let Some(input) = cli.input {
        cfg.input_path = input;
    }
    if let Some(output) = cli.output {
        cfg.output_path = output;
    }
    if let Some(overrides) = cli.overrides {
        cfg.overrides_path = Some(overrides);
    }
    if cli.no_paapi {
        cfg.use_paapi = false;
    }
    if let Some(max) = cli.max_deals {
        cfg.max_deals = max;
    }
    cfg.validate().context("invalid configuration")?;

    env::preflight_check(
        "deal-pipeline",
        &["AMZ_PARTNER_TAG"],
        &[
            "AMZ_MARKETPLACE",
            "AMZ_PARTNER_TAG",
            "AMZ_ACCESS_KEY",
            "DEALS_WORKERS",
            "DEALS_RUN_DEADLINE_SECS",
        ],
    )?;

    let mentions = load_mentions(&cfg.input_path).await?;
    if mentions.is_empty() {
        warn!(path = %cfg.input_path.display(), "no mentions to process");
    }

    let pipeline = Pipeline::from_config(&cfg).await?;
    let summary = pipeline.run(mentions, &cfg.output_path).await?;

    info!(output = %cfg.output_path.display(), "done");
    println!("{summary}");
    Ok(())
}
