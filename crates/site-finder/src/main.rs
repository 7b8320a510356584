//! Habitat Site Search CLI
//!
//! Scores a target coordinate and, when it falls short, searches outward for a
//! diverse set of suitable sites.
//!
//! Usage:
//!   find-sites --lat 45.3 --lon -110.7 --count 3 \
//!              --config config/site.json \
//!              --survey data/survey.json \
//!              --output sites.json --geojson

use anyhow::{bail, Result};
use clap::Parser;
use environment_feeds::{OpenMeteoConfig, OpenMeteoSource, SurveySource};
use site_suitability::{export, CancelToken, Criterion, SiteConfig, SiteEngine, SourceChain};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "find-sites", about = "Find suitable habitat sites around a target coordinate")]
struct Args {
    /// Target latitude (decimal degrees)
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Target longitude (decimal degrees)
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// Desired number of sites (0 uses the configured default)
    #[arg(short = 'n', long, default_value_t = 0)]
    count: usize,

    /// Site configuration JSON (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Survey JSON with canopy samples and disturbance features
    #[arg(short, long)]
    survey: Option<PathBuf>,

    /// Skip Open-Meteo and rely on the survey and static defaults
    #[arg(long)]
    offline: bool,

    /// Only score the target, no fallback search
    #[arg(long)]
    evaluate_only: bool,

    /// Output JSON file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write GeoJSON next to the output file
    #[arg(long)]
    geojson: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "site_finder=debug,site_suitability=debug,environment_feeds=debug"
    } else {
        "site_finder=info,site_suitability=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_chain(args: &Args, config: &SiteConfig) -> Result<SourceChain> {
    let mut chain = SourceChain::from_config(config);

    if !args.offline {
        chain = chain.with_source(OpenMeteoSource::new(OpenMeteoConfig::default())?);
    }
    if let Some(path) = &args.survey {
        chain = chain.with_source(SurveySource::from_file(path)?);
    }

    if chain.source_names().is_empty() {
        bail!("no environmental sources configured: drop --offline or pass --survey");
    }
    info!("Source chain: {}", chain.source_names().join(" -> "));
    Ok(chain)
}

fn write_json<T: serde::Serialize>(path: Option<&PathBuf>, value: &T) -> Result<()> {
    match path {
        Some(path) => {
            info!("Writing output to {:?}", path);
            let file = File::create(path)?;
            serde_json::to_writer_pretty(BufWriter::new(file), value)?;
        }
        None => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => SiteConfig::from_file(path)?,
        None => {
            let config = SiteConfig::default();
            config.validate()?;
            config
        }
    };

    let chain = Arc::new(build_chain(&args, &config)?);
    let engine = SiteEngine::new(Arc::new(config), Arc::clone(&chain));

    if args.evaluate_only {
        let result = engine.evaluate_site(args.lat, args.lon, None).await;
        chain.close().await;
        let result = result?;
        info!(
            "Overall {:.1} ({})",
            result.overall_score,
            if result.meets_criteria { "pass" } else { "fail" }
        );
        for criterion in Criterion::ALL {
            info!(
                "  {:16} {:5.1}  {}",
                format!("{:?}", criterion),
                result.score(criterion),
                result.rationale(criterion)
            );
        }
        return write_json(args.output.as_ref(), &result);
    }

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping at the next tier boundary");
            on_interrupt.cancel();
        }
    });

    let set = engine
        .find_site_set_with_cancel(args.lat, args.lon, args.count, None, &cancel)
        .await;
    chain.close().await;
    let set = set?;

    info!("{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Request:          {}", set.request_id);
    info!("Outcome:          {:?}", set.outcome);
    info!("Sites:            {} of {}", set.candidates.len(), set.desired_count);
    info!("Confidence:       {:.2}", set.confidence);
    info!("Tiers searched:   {}", set.tiers_searched);
    info!("Points evaluated: {}", set.points_evaluated);
    if let Some(reason) = &set.primary_rejection_reason {
        info!("Target rejected:  {}", reason);
    }
    for candidate in &set.candidates {
        info!(
            "  {:14} ({:.5}, {:.5}) tier {} score {:.1}",
            candidate.role.label(),
            candidate.location.lat,
            candidate.location.lon,
            candidate.search_tier,
            candidate.suitability.overall_score
        );
    }

    write_json(args.output.as_ref(), &set)?;

    if args.geojson {
        let geojson_path = args
            .output
            .as_ref()
            .map(|p| p.with_extension("geojson"))
            .unwrap_or_else(|| PathBuf::from("sites.geojson"));
        info!("Writing GeoJSON to {:?}", geojson_path);
        let file = File::create(&geojson_path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &export::to_feature_collection(&set))?;
    }

    Ok(())
}
