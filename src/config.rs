//! Configuration loading: defaults, .env file, config.toml, then env vars.

use common::config::LoaderConfig;
use common::Error;
use std::path::Path;

fn parse_i64(raw: &str, env_name: &str) -> Result<i64, Error> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer")))
}

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_positive_u32(raw: &str, env_name: &str) -> Result<u32, Error> {
    let parsed = parse_positive_u64(raw, env_name)?;
    u32::try_from(parsed).map_err(|_| Error::Config(format!("{env_name} is too large")))
}

fn parse_non_negative_u32(raw: &str, env_name: &str) -> Result<u32, Error> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer >= 0")))
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

/// Check transport settings. The requested artist count is left to the
/// loader, which answers out-of-range values with an empty result.
pub fn validate_config(config: &LoaderConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();
    let upstream = &config.upstream;

    if upstream.base_url.trim().is_empty() {
        issues.push("upstream.base_url must not be empty".into());
    } else if let Err(e) = url::Url::parse(&upstream.base_url) {
        issues.push(format!("upstream.base_url is not a valid URL: {e}"));
    }
    if upstream.batch_size == 0 {
        issues.push("upstream.batch_size must be > 0".into());
    }
    if upstream.max_concurrency == 0 {
        issues.push("upstream.max_concurrency must be > 0".into());
    }
    if upstream.max_attempts == 0 {
        issues.push("upstream.max_attempts must be > 0".into());
    }
    if upstream.request_timeout_secs == 0 {
        issues.push("upstream.request_timeout_secs must be > 0".into());
    }
    if config.catalog_size <= 0 {
        issues.push("catalog_size must be > 0".into());
    }
    if config.use_cache && config.cache_dir.trim().is_empty() {
        issues.push("cache_dir must not be empty when the cache is enabled".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load loader configuration from environment and optional config file.
pub fn load_config() -> Result<LoaderConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = LoaderConfig::default();

    // 3. Try loading config.toml if it exists.
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    if let Ok(raw) = std::env::var("ARTIST_MAX_ARTISTS") {
        config.max_artists = parse_i64(&raw, "ARTIST_MAX_ARTISTS")?;
    }
    if let Ok(dir) = std::env::var("ARTIST_CACHE_DIR") {
        config.cache_dir = dir;
    }
    if let Ok(raw) = std::env::var("ARTIST_USE_CACHE") {
        config.use_cache = parse_bool(&raw);
    }
    if let Ok(url) = std::env::var("WASABI_BASE_URL") {
        config.upstream.base_url = url;
    }
    if let Ok(raw) = std::env::var("WASABI_BATCH_SIZE") {
        config.upstream.batch_size = parse_positive_u32(&raw, "WASABI_BATCH_SIZE")?;
    }
    if let Ok(raw) = std::env::var("WASABI_MAX_CONCURRENCY") {
        config.upstream.max_concurrency =
            parse_positive_u64(&raw, "WASABI_MAX_CONCURRENCY")? as usize;
    }
    if let Ok(raw) = std::env::var("WASABI_MAX_ATTEMPTS") {
        config.upstream.max_attempts = parse_positive_u32(&raw, "WASABI_MAX_ATTEMPTS")?;
    }
    if let Ok(raw) = std::env::var("WASABI_BACKOFF_BASE_MS") {
        config.upstream.backoff_base_ms = raw.trim().parse::<u64>().map_err(|_| {
            Error::Config("WASABI_BACKOFF_BASE_MS must be an integer >= 0".into())
        })?;
    }
    if let Ok(raw) = std::env::var("WASABI_TIMEOUT_SECS") {
        config.upstream.request_timeout_secs = parse_positive_u64(&raw, "WASABI_TIMEOUT_SECS")?;
    }
    if let Ok(raw) = std::env::var("WASABI_REQUESTS_PER_SECOND") {
        config.upstream.requests_per_second =
            parse_non_negative_u32(&raw, "WASABI_REQUESTS_PER_SECOND")?;
    }

    // 5. Validate.
    validate_config(&config)?;

    Ok(config)
}
