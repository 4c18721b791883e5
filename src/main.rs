mod config;
mod cultivar;
mod runs;
mod server;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cultivar::MatchQuery;
use crate::cultivar::matcher::CultivarMatcher;
use crate::cultivar::seedfinder::SeedFinder;
use crate::runs::file_repository::FileRunRepository;
use crate::runs::repository::RunRepository;
use crate::runs::service::RunService;

#[derive(Parser)]
#[command(name = "plantrun", about = "Grow run tracker")]
enum Cli {
    /// Start the HTTP server (default when no subcommand is given)
    #[command(alias = "run")]
    Serve,
    /// One-shot cultivar lookup against the SeedFinder catalogue
    Search {
        breeder: String,
        species: String,
        /// Favor auto-flowering variants in the ranking
        #[arg(long)]
        automatic: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    // Default to Serve when no subcommand is given, but still allow
    // --help and --version to work.
    let args: Vec<String> = std::env::args().collect();
    let cli = if args.len() <= 1 { Cli::Serve } else { Cli::parse() };

    match cli {
        Cli::Serve => run_server().await,
        Cli::Search {
            breeder,
            species,
            automatic,
        } => run_search(breeder, species, automatic).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("plantrun=info,tower_http=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")
}

fn build_matcher(client: reqwest::Client, base_url: &str) -> CultivarMatcher {
    CultivarMatcher::new(Arc::new(SeedFinder::new(client, base_url)))
}

async fn run_server() -> Result<(), Box<dyn Error>> {
    let config = config::Config::from_env();
    init_tracing();

    let http_client = build_http_client()?;

    let data_dir = config.data_dir.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".plantrun")
    });

    let repo: Arc<dyn RunRepository> = Arc::new(FileRunRepository::new(&data_dir));
    repo.load().await.context("failed to load run store")?;

    let matcher = build_matcher(http_client, &config.seedfinder_base_url);
    let service = Arc::new(RunService::new(repo, matcher));

    let app = server::create_app(server::AppState { service });

    tracing::info!(
        environment = %config.environment,
        data_dir = %data_dir.display(),
        "starting plantrun"
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    println!("Listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_search(
    breeder: String,
    species: String,
    automatic: bool,
) -> Result<(), Box<dyn Error>> {
    let config = config::Config::from_env();
    init_tracing();

    let matcher = build_matcher(build_http_client()?, &config.seedfinder_base_url);
    let query = MatchQuery {
        breeder,
        species,
        prefer_automatic: automatic,
    };

    let candidates = matcher.search(&query).await;
    if candidates.is_empty() {
        println!(
            "No candidates for '{}' by '{}'",
            query.species, query.breeder
        );
        return Ok(());
    }
    for candidate in &candidates {
        println!(
            "{:>4}  {}  ({})",
            candidate.score, candidate.name, candidate.breeder
        );
    }

    Ok(())
}
