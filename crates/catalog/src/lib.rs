//! Aggregation, snapshot caching and load orchestration for the artist catalog.

pub mod aggregator;
pub mod cache;
pub mod loader;

pub use aggregator::{normalize, Aggregator, CatalogTables};
pub use cache::{CacheSnapshot, CacheStore, SNAPSHOT_VERSION};
pub use loader::{ArtistLoader, FetchSummary, LoadOutcome, LoaderState};
