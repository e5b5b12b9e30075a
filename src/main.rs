//! artist-stats: loads the WASABI artist catalog and prints aggregate statistics.
//!
//! Single-binary Tokio application that:
//! 1. Restores aggregates from the snapshot cache, or
//! 2. Fetches every page concurrently with retry and backoff
//! 3. Aggregates per-country and per-genre tables
//! 4. Persists a snapshot for the next run

mod config;

use std::time::Instant;

use clap::Parser;
use tracing::{error, info, warn};

use catalog::{ArtistLoader, LoadOutcome};

/// WASABI artist catalog statistics
#[derive(Parser)]
#[command(name = "artist-stats", about = "Load and aggregate the WASABI artist catalog")]
struct Cli {
    /// Number of artists to load, starting at offset 0.
    #[arg(long, allow_negative_numbers = true)]
    max_artists: Option<i64>,

    /// Skip the snapshot cache for both reading and writing.
    #[arg(long)]
    no_cache: bool,

    /// Print the per-country table as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "artist_stats=info,wasabi_client=info,catalog=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(n) = cli.max_artists {
        cfg.max_artists = n;
    }
    if cli.no_cache {
        cfg.use_cache = false;
    }

    info!(
        "Requesting {} artists from {} (batch={}, concurrency={}, attempts={})",
        cfg.max_artists,
        cfg.upstream.base_url,
        cfg.upstream.batch_size,
        cfg.upstream.max_concurrency,
        cfg.upstream.max_attempts,
    );
    if cfg.use_cache {
        info!("Cache directory: {}", cfg.cache_dir);
    } else {
        info!("Cache disabled");
    }

    let started = Instant::now();
    let mut loader = ArtistLoader::from_config(&cfg);
    let outcome = loader.load_artists().await;

    if let LoadOutcome::Rejected { requested, reason } = &outcome {
        warn!("Nothing loaded for {} requested artists: {}", requested, reason);
    }

    let country_stats = loader.country_stats();
    let genres = loader.genre_rosters();
    let total = loader.total_artists();
    let per_country: u64 = country_stats.iter().map(|c| c.artist_count).sum();

    info!("Total artists: {}", total);
    info!("Countries: {}", country_stats.len());
    info!("Genres: {}", genres.len());
    if per_country as usize != total {
        error!(
            "Per-country artist counts sum to {} but {} artists were loaded",
            per_country, total
        );
    }
    for stat in country_stats.iter().take(10) {
        info!(
            "  {:<24} artists={:<6} songs={:<8} fans={}",
            stat.country, stat.artist_count, stat.song_count, stat.deezer_fans
        );
    }
    info!("Done in {:.2?}", started.elapsed());

    if cli.json {
        match serde_json::to_string_pretty(&country_stats) {
            Ok(body) => println!("{}", body),
            Err(e) => {
                error!("Failed to encode country stats: {}", e);
                std::process::exit(1);
            }
        }
    }
}
