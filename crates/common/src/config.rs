//! Loader configuration types.

use serde::{Deserialize, Serialize};

/// Number of artists exposed by the upstream catalog.
pub const CATALOG_SIZE: i64 = 77_492;

/// Top-level loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// How many artists to ingest, starting at offset 0.
    ///
    /// Kept signed so that nonsensical requests reach the loader,
    /// which answers them with an empty result instead of failing.
    #[serde(default = "default_max_artists")]
    pub max_artists: i64,

    /// Upper bound accepted for `max_artists`.
    #[serde(default = "default_catalog_size")]
    pub catalog_size: i64,

    /// Directory holding one snapshot file per `max_artists` value.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Read and write the snapshot cache.
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Upstream transport settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// Settings for the paginated artist endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Page URL prefix; the offset is appended verbatim.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Records returned per page by the upstream.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Requests allowed in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Attempts per offset, first try included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before retry `n` (0-based) is `backoff_base_ms * 2^n`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Per-attempt timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Request pacing on top of the concurrency cap. 0 disables it.
    #[serde(default)]
    pub requests_per_second: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_max_artists() -> i64 {
    CATALOG_SIZE
}
fn default_catalog_size() -> i64 {
    CATALOG_SIZE
}
fn default_cache_dir() -> String {
    "cache".into()
}

fn default_base_url() -> String {
    "https://wasabi.i3s.unice.fr/api/v1/artist_all/".into()
}
fn default_batch_size() -> u32 {
    200
}
fn default_max_concurrency() -> usize {
    15
}
fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    20
}
fn default_user_agent() -> String {
    "artist-stats/0.1".into()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            request_timeout_secs: default_request_timeout(),
            requests_per_second: 0,
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_artists: default_max_artists(),
            catalog_size: default_catalog_size(),
            cache_dir: default_cache_dir(),
            use_cache: true,
            upstream: UpstreamConfig::default(),
        }
    }
}
