//! Top-level load orchestration.
//!
//! `Uninitialized → CacheCheck → Ready` on a cache hit, otherwise
//! `CacheCheck → Fetching → Aggregating → Persisting → Ready`. `Ready` is
//! terminal: later calls return the first outcome and never aggregate again.

use std::sync::Arc;
use std::time::Instant;

use common::config::LoaderConfig;
use common::{
    ArtistMembers, CountryStat, Error, GenrePopularityByCountry, GenreRoster, NormalizedArtist,
    RawArtist,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use wasabi_client::{ArtistSource, WasabiClient};

use crate::aggregator::Aggregator;
use crate::cache::{CacheSnapshot, CacheStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Uninitialized,
    CacheCheck,
    Fetching,
    Aggregating,
    Persisting,
    Ready,
}

/// Counters for one fresh fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub pages: usize,
    /// Pages that came back empty (end of data or failure).
    pub empty_pages: usize,
    pub artists: usize,
    /// Whether the snapshot was written.
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Aggregates restored from the snapshot cache.
    Restored { artists: usize },
    /// Aggregates built from the upstream. May hold zero artists.
    Fetched(FetchSummary),
    /// The requested count was out of range; nothing was fetched.
    Rejected { requested: i64, reason: String },
}

/// One fetched page on its way to the aggregation worker.
struct Page {
    offset: u64,
    records: Vec<RawArtist>,
}

#[derive(Debug, Default)]
struct DrainStats {
    pages: usize,
    empty_pages: usize,
    artists: usize,
}

pub struct ArtistLoader {
    max_artists: i64,
    catalog_size: i64,
    batch_size: u32,
    source: Arc<dyn ArtistSource>,
    cache: Option<CacheStore>,
    aggregator: Arc<Aggregator>,
    state: LoaderState,
    outcome: Option<LoadOutcome>,
}

impl ArtistLoader {
    pub fn new(config: &LoaderConfig, source: Arc<dyn ArtistSource>) -> Self {
        let cache = config
            .use_cache
            .then(|| CacheStore::for_scope(&config.cache_dir, config.max_artists));

        Self {
            max_artists: config.max_artists,
            catalog_size: config.catalog_size,
            batch_size: config.upstream.batch_size.max(1),
            source,
            cache,
            aggregator: Arc::new(Aggregator::new()),
            state: LoaderState::Uninitialized,
            outcome: None,
        }
    }

    /// Loader backed by the real WASABI endpoint.
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config, Arc::new(WasabiClient::new(&config.upstream)))
    }

    /// Check the requested count against the catalog bounds.
    pub fn validate_request(&self) -> Result<u64, Error> {
        if self.max_artists <= 0 {
            return Err(Error::InvalidRequest(format!(
                "requested artist count must be positive, got {}",
                self.max_artists
            )));
        }
        if self.max_artists > self.catalog_size {
            return Err(Error::InvalidRequest(format!(
                "requested artist count {} exceeds catalog size {}",
                self.max_artists, self.catalog_size
            )));
        }
        Ok(self.max_artists as u64)
    }

    fn transition(&mut self, next: LoaderState) {
        debug!("Loader state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Populate the aggregates from cache or upstream.
    ///
    /// Safe to call repeatedly; only the first call does any work.
    pub async fn load_artists(&mut self) -> LoadOutcome {
        if let Some(outcome) = &self.outcome {
            debug!("Artists already loaded; returning previous outcome");
            return outcome.clone();
        }

        let started = Instant::now();
        info!("Loading artists...");
        let outcome = self.run_load().await;
        self.transition(LoaderState::Ready);

        match &outcome {
            LoadOutcome::Restored { artists } => {
                info!("Using cached data: {} artists in {:.2?}", artists, started.elapsed())
            }
            LoadOutcome::Fetched(summary) if summary.artists == 0 => warn!(
                "No artists retrieved from {} pages; aggregates are empty",
                summary.pages
            ),
            LoadOutcome::Fetched(summary) => info!(
                "Fetched {} artists from {} pages ({} empty) in {:.2?}",
                summary.artists,
                summary.pages,
                summary.empty_pages,
                started.elapsed()
            ),
            LoadOutcome::Rejected { .. } => {}
        }

        self.outcome = Some(outcome.clone());
        outcome
    }

    async fn run_load(&mut self) -> LoadOutcome {
        let requested = match self.validate_request() {
            Ok(n) => n,
            Err(e) => {
                warn!("Not loading artists: {}", e);
                return LoadOutcome::Rejected {
                    requested: self.max_artists,
                    reason: e.to_string(),
                };
            }
        };

        self.transition(LoaderState::CacheCheck);
        if let Some(cache) = &self.cache {
            if let Some(snapshot) = cache.load() {
                self.aggregator.restore(snapshot.tables);
                return LoadOutcome::Restored {
                    artists: self.aggregator.total_artists(),
                };
            }
            info!("No valid cache found, fetching new data...");
        }

        self.transition(LoaderState::Fetching);
        let stats = self.fetch_all(requested).await;

        self.transition(LoaderState::Persisting);
        let cached = match &self.cache {
            Some(cache) if stats.artists > 0 => {
                cache.save(&CacheSnapshot::new(self.max_artists, self.aggregator.tables()))
            }
            Some(_) => {
                warn!("Skipping cache write for an empty result");
                false
            }
            None => false,
        };

        LoadOutcome::Fetched(FetchSummary {
            pages: stats.pages,
            empty_pages: stats.empty_pages,
            artists: stats.artists,
            cached,
        })
    }

    /// Fetch every page concurrently and fold the records in as they land.
    ///
    /// A single worker drains the page queue; the method returns only after
    /// every dispatched page has been aggregated.
    async fn fetch_all(&mut self, requested: u64) -> DrainStats {
        let batch = u64::from(self.batch_size);
        let offsets: Vec<u64> = (0..requested).step_by(batch as usize).collect();
        info!(
            "Fetching {} artists in {} pages of {}",
            requested,
            offsets.len(),
            batch
        );

        let (tx, mut rx) = mpsc::channel::<Page>(offsets.len().clamp(1, 64));

        let aggregator = Arc::clone(&self.aggregator);
        let worker = tokio::spawn(async move {
            let mut stats = DrainStats::default();
            while let Some(page) = rx.recv().await {
                stats.pages += 1;
                if page.records.is_empty() {
                    debug!("Page at offset {} contributed no artists", page.offset);
                    stats.empty_pages += 1;
                    continue;
                }
                for raw in &page.records {
                    aggregator.process(raw);
                }
                stats.artists += page.records.len();
            }
            stats
        });

        let mut fetches = JoinSet::new();
        for offset in offsets {
            let source = Arc::clone(&self.source);
            let tx = tx.clone();
            let batch_size = self.batch_size;
            // The last page may run past the requested count.
            let keep = (requested - offset).min(batch) as usize;

            fetches.spawn(async move {
                let mut records = source.fetch_page(offset, batch_size).await;
                records.truncate(keep);
                if tx.send(Page { offset, records }).await.is_err() {
                    error!("Aggregation worker gone; dropping page at offset {}", offset);
                }
            });
        }
        drop(tx);

        while let Some(joined) = fetches.join_next().await {
            if let Err(e) = joined {
                error!("Fetch task failed: {}", e);
            }
        }

        self.transition(LoaderState::Aggregating);
        match worker.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Aggregation worker failed: {}", e);
                DrainStats::default()
            }
        }
    }

    // ── Read accessors ────────────────────────────────────────────────

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn outcome(&self) -> Option<&LoadOutcome> {
        self.outcome.as_ref()
    }

    pub fn max_artists(&self) -> i64 {
        self.max_artists
    }

    /// The aggregation context, for lookups.
    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn total_artists(&self) -> usize {
        self.aggregator.total_artists()
    }

    pub fn artists(&self) -> Vec<NormalizedArtist> {
        self.aggregator.artists()
    }

    pub fn country_stats(&self) -> Vec<CountryStat> {
        self.aggregator.country_stats()
    }

    pub fn genre_popularity_by_country(&self) -> GenrePopularityByCountry {
        self.aggregator.genre_popularity_by_country()
    }

    pub fn genre_rosters(&self) -> Vec<GenreRoster> {
        self.aggregator.genre_rosters()
    }

    pub fn members(&self) -> Vec<ArtistMembers> {
        self.aggregator.members()
    }
}
