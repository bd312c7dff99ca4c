use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use veou_bus::Topic;
use veou_core::*;
use veou_schema::{format_distance, AiSummary, Coordinate, Review, SearchSuggestion};

#[derive(Parser)]
#[command(name = "veou", version, about = "Veou place search and review summaries")]
struct Cli {
    #[arg(long, help = "Config file (veou.yaml); defaults apply when omitted")]
    config: Option<PathBuf>,

    #[arg(long, help = "Place catalog YAML used as the search provider")]
    catalog: Option<PathBuf>,

    #[arg(long, requires = "lon", allow_negative_numbers = true, help = "Current latitude")]
    lat: Option<f64>,

    #[arg(long, requires = "lat", allow_negative_numbers = true, help = "Current longitude")]
    lon: Option<f64>,

    #[arg(long, help = "Also write a daily rolling log file into this directory")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Aggregate popular places around the current location")]
    Popular,
    #[command(about = "Replay keystrokes through the search box and print suggestions")]
    Search {
        #[arg(required = true, help = "Successive search box contents, e.g. c ca caf cafe")]
        keystrokes: Vec<String>,
        #[arg(long, default_value = "50", help = "Pause between keystrokes in milliseconds")]
        pause_ms: u64,
    },
    #[command(about = "Resolve a free-text location to a coordinate")]
    Resolve {
        #[arg(help = "Location text")]
        query: String,
        #[arg(long, help = "Drop a pin for the resolved place")]
        pin: bool,
    },
    #[command(about = "Summarize reviews for a location with the language model")]
    Summarize {
        #[arg(long, help = "YAML or JSON file with a list of reviews")]
        reviews: PathBuf,
        #[arg(long, help = "Location name used in the prompt")]
        location: String,
    },
    #[command(about = "Validate the config file")]
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (file_layer, _guard) = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(dir, "veou.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    let config = match &cli.config {
        Some(path) => VeouConfig::load(path)?,
        None => VeouConfig::default(),
    };
    tracing::debug!(config = ?cli.config, catalog = ?cli.catalog, "configuration loaded");

    if let Commands::Validate = cli.command {
        println!(
            "Config valid. {} categories, debounce {}ms, model {}.",
            config.aggregator.categories.len(),
            config.search.debounce_ms,
            config.summary.model
        );
        return Ok(());
    }

    let catalog = match &cli.catalog {
        Some(path) => StaticPlaceCatalog::load(path)?,
        None => StaticPlaceCatalog::default(),
    };
    let location = Arc::new(match (cli.lat, cli.lon) {
        (Some(lat), Some(lon)) => ManualLocation::at(Coordinate::new(lat, lon)),
        _ => ManualLocation::new(),
    });

    let mut orchestrator = Orchestrator::new(
        &config,
        Arc::new(catalog),
        location,
        ReviewSummarizer::from_config(&config.summary),
    );
    orchestrator.start().await;

    let result = run(&cli.command, &config, &orchestrator).await;
    orchestrator.shutdown();
    result
}

async fn run(command: &Commands, config: &VeouConfig, orchestrator: &Orchestrator) -> Result<()> {
    match command {
        Commands::Popular => {
            match orchestrator.query().refresh_popular().await {
                None => anyhow::bail!("popular places need a location; pass --lat and --lon"),
                Some(AggregationOutcome::Completed(places)) => print_suggestions(&places),
                Some(other) => anyhow::bail!("aggregation did not complete: {other:?}"),
            }
        }
        Commands::Search {
            keystrokes,
            pause_ms,
        } => {
            let mut rx = orchestrator.bus().subscribe(Topic::SuggestionsUpdated).await;
            orchestrator.query().refresh_popular().await;
            for text in keystrokes {
                orchestrator.query().on_query_changed(text);
                tokio::time::sleep(Duration::from_millis(*pause_ms)).await;
            }
            let quiet = config.search.debounce() + Duration::from_millis(100);
            while let Ok(Some(_)) = tokio::time::timeout(quiet, rx.recv()).await {}
            print_suggestions(&orchestrator.query().suggestions());
        }
        Commands::Resolve { query, pin } => {
            let aggregator = orchestrator.aggregator();
            let suggestion = SearchSuggestion::from_completion(query.as_str(), "", false);
            let Some(coordinate) = aggregator.resolve_coordinates(&suggestion).await else {
                anyhow::bail!("no place found for {query:?}");
            };
            println!("{query}: {:.5}, {:.5}", coordinate.latitude, coordinate.longitude);
            if *pin {
                if let Some(outcome) = aggregator.pin_suggestion(&suggestion).await {
                    println!("pinned {}", outcome.id());
                }
            }
        }
        Commands::Summarize { reviews, location } => {
            let reviews = load_reviews(reviews)?;
            let outcome = orchestrator
                .summary()
                .request_summary(reviews, location)
                .await;
            match outcome {
                SummaryOutcome::Ready(summary) | SummaryOutcome::Cached(summary) => {
                    print_summary(location, &summary)
                }
                SummaryOutcome::Cleared => println!("No reviews to summarize."),
                SummaryOutcome::Failed(message) => anyhow::bail!(message),
                SummaryOutcome::Superseded => anyhow::bail!("summary request was cancelled"),
            }
        }
        Commands::Validate => {}
    }
    Ok(())
}

fn load_reviews(path: &Path) -> Result<Vec<Review>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read reviews file {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("invalid reviews file {}", path.display()))
}

fn print_suggestions(suggestions: &[SearchSuggestion]) {
    if suggestions.is_empty() {
        println!("No places found.");
        return;
    }
    println!("{:<32} {:<36} {:>9}", "PLACE", "ADDRESS", "DISTANCE");
    println!("{}", "-".repeat(79));
    for suggestion in suggestions {
        let distance = suggestion
            .distance
            .map(format_distance)
            .unwrap_or_else(|| "-".to_string());
        let marker = if suggestion.is_popular { "*" } else { " " };
        println!(
            "{marker}{:<31} {:<36} {:>9}",
            suggestion.title, suggestion.subtitle, distance
        );
    }
}

fn print_summary(location: &str, summary: &AiSummary) {
    println!("Safety summary for {location}");
    println!("{}", "-".repeat(40));
    println!("{}", summary.overall_safety_consensus);
    if !summary.key_warnings.is_empty() {
        println!("\nKey warnings:");
        for warning in &summary.key_warnings {
            println!("  - {warning}");
        }
    }
    if !summary.best_times_to_visit.is_empty() {
        println!("\nBest times to visit:");
        for time in &summary.best_times_to_visit {
            println!("  - {time}");
        }
    }
}
