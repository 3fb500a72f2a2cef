use anyhow::Context;
use axum::Router;
use brainsait_discovery::config::Config;
use brainsait_discovery::crawler::SiteCrawler;
use brainsait_discovery::features::build_feature_vector;
use brainsait_discovery::handlers::{self, AppState};
use brainsait_discovery::llm::{OpenAiClient, TextGenerator};
use brainsait_discovery::models::{BusinessRecord, Coordinates};
use brainsait_discovery::pipeline::{
    BusinessAnalyzer, DiscoveryResult, PipelineConfig, PipelineOrchestrator,
};
use brainsait_discovery::records::{load_analysis_records, summarise_records};
use brainsait_discovery::scoring::MaturityScorer;
use brainsait_discovery::url_normalizer;
use clap::{Parser, Subcommand};
use moka::future::Cache;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "brainsait-discover",
    version,
    about = "BrainSAIT business discovery and digital maturity analysis"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover businesses, crawl their sites and score digital maturity
    Discover {
        /// Business types to search for (e.g. restaurant clinic dentist)
        #[arg(required = true)]
        business_types: Vec<String>,
        /// Search centre as lat,lng (default: Riyadh)
        #[arg(short, long, default_value = "24.7136,46.6753")]
        location: String,
        /// Search radius in meters (default: PLACES_RADIUS_METERS)
        #[arg(short, long)]
        radius: Option<u32>,
        /// Maximum businesses to discover
        #[arg(short, long = "max", default_value_t = 100)]
        max_businesses: usize,
        /// Businesses analysed concurrently
        #[arg(short, long = "batch", default_value_t = 20)]
        batch_size: usize,
        /// Skip website crawling
        #[arg(long)]
        no_web_analysis: bool,
        /// Output directory for results (default: DATA_DIR)
        #[arg(short, long = "output")]
        output_dir: Option<PathBuf>,
        /// Do not write per-business JSON files
        #[arg(long)]
        no_intermediate: bool,
        /// Pages crawled per website
        #[arg(long, default_value_t = 5)]
        max_pages: usize,
    },
    /// Summarise an existing analyses file (JSON or JSONL)
    Analyze {
        file: PathBuf,
        /// Write the summary as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Crawl one website and print its feature vector (no LLM)
    Crawl {
        url: String,
        #[arg(long, default_value_t = 5)]
        max_pages: usize,
    },
    /// Show the effective configuration with API keys masked
    Config,
    /// Run the HTTP API
    Serve {
        /// Overrides PORT
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "brainsait_discovery=debug,brainsait_discover=debug,tower_http=debug"
    } else {
        "brainsait_discovery=info,brainsait_discover=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Discover {
            business_types,
            location,
            radius,
            max_businesses,
            batch_size,
            no_web_analysis,
            output_dir,
            no_intermediate,
            max_pages,
        } => {
            let center: Coordinates = location.parse()?;
            let settings = Config::from_env()?;
            let radius = radius.unwrap_or(settings.places_radius_meters);
            anyhow::ensure!(
                (1_000..=50_000).contains(&radius),
                "radius must be between 1000 and 50000 meters"
            );

            let config = PipelineConfig {
                search_radius: radius,
                max_businesses,
                batch_size,
                include_web_analysis: !no_web_analysis,
                save_intermediate_results: !no_intermediate,
                output_directory: output_dir.unwrap_or_else(|| settings.data_directory.clone()),
                max_pages,
                max_places_per_query: settings.max_places_per_query,
            };
            tracing::info!(
                "Business types: {} | location: {} | radius: {}m | max: {}",
                business_types.join(", "),
                center,
                radius,
                max_businesses
            );

            let orchestrator = PipelineOrchestrator::new(&settings, config)?;
            let result = orchestrator.run(&business_types, center).await?;
            print_discovery_result(&result);
        }
        Command::Analyze { file, output } => {
            let records = load_analysis_records(&file).await?;
            let summary = summarise_records(&records);

            println!("Total businesses: {}", summary.total);
            println!("Average maturity score: {:.1}", summary.average_score);
            for entry in summary.industries.iter().take(10) {
                println!("  {:<30} {}", entry.industry, entry.count);
            }

            if let Some(path) = output {
                let body = serde_json::to_string_pretty(&summary)?;
                tokio::fs::write(&path, body)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Summary saved to {}", path.display());
            }
        }
        Command::Crawl { url, max_pages } => {
            let normalized = url_normalizer::normalize(&url)
                .with_context(|| format!("Not a crawlable http(s) URL: {}", url))?;
            let crawler = SiteCrawler::with_defaults(max_pages)?;
            let pages = crawler.crawl(normalized.as_str()).await;

            let host = normalized.as_url().host_str().unwrap_or_default().to_string();
            let business = BusinessRecord::website_only(host, normalized.as_str());
            let vector = build_feature_vector(&business, &pages);
            println!("{}", serde_json::to_string_pretty(&vector)?);
        }
        Command::Config => {
            let settings = Config::from_env()?;
            println!("brainsait-discover {}", env!("CARGO_PKG_VERSION"));
            for (key, value) in settings.describe() {
                println!("  {:<24} {}", key, value);
            }
        }
        Command::Serve { port } => serve(port).await?,
    }

    Ok(())
}

fn print_discovery_result(result: &DiscoveryResult) {
    let summary = &result.summary;
    println!("Businesses discovered: {}", result.businesses_discovered);
    println!("Businesses analysed:   {}", result.analyses.len());
    println!("Output files:          {}", result.output_files.len());

    if summary.total_businesses > 0 {
        println!("Industry distribution:");
        for entry in summary.industries.iter().take(10) {
            let pct = entry.count as f64 / summary.total_businesses as f64 * 100.0;
            println!("  {:<30} {:>4} {:>6.1}%", entry.industry, entry.count, pct);
        }
        let dist = &summary.maturity_distribution;
        println!(
            "Maturity: low {} | medium {} | high {}",
            dist.low, dist.medium, dist.high
        );
        println!(
            "Average digital maturity score: {}",
            summary.average_maturity_score
        );
    }

    for path in result.output_files.iter().take(10) {
        println!("  {}", path.display());
    }
    if result.output_files.len() > 10 {
        println!("  ... and more");
    }
}

/// Starts the HTTP API.
async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let crawler = SiteCrawler::with_defaults(brainsait_discovery::crawler::DEFAULT_MAX_PAGES)?;
    let llm: Arc<dyn TextGenerator> = Arc::new(OpenAiClient::from_config(&config)?);
    tracing::info!("LLM client initialized (model {})", config.openai_model);

    // Feature vector cache (1 hour TTL, 10k max entries)
    let features_cache = Cache::builder()
        .time_to_live(Duration::from_secs(3600))
        .max_capacity(10_000)
        .build();

    let app_state = Arc::new(AppState {
        analyzer: BusinessAnalyzer::new(crawler, MaturityScorer::new(llm), true),
        features_cache,
    });

    // Configure rate limiter: 2 requests/second per IP, burst of 10
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(10)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .context("Invalid rate limiter configuration")?,
    );

    let protected_routes = handlers::api_routes().layer(
        ServiceBuilder::new()
            // Request size limit: 1MB max payload
            .layer(RequestBodyLimitLayer::new(1024 * 1024))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    let app: Router = handlers::router(app_state, protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", port.unwrap_or(config.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
