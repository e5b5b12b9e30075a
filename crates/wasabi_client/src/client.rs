//! HTTP client for the paginated `artist_all` endpoint.
//!
//! `GET {base_url}{offset}` returns a JSON array of up to one batch of
//! artist objects. Each attempt takes a concurrency slot first and gives it
//! back when the attempt ends, whatever its outcome.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::config::UpstreamConfig;
use common::RawArtist;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::rate_limit::RequestPacer;
use crate::retry::{AttemptError, RetryPolicy};
use crate::source::ArtistSource;

fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so network failures (DNS/TLS/socket) are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

/// Map an HTTP status to an attempt failure, `None` on success.
pub(crate) fn classify_status(status: u16) -> Option<AttemptError> {
    match status {
        200..=299 => None,
        429 => Some(AttemptError::RateLimited),
        other => Some(AttemptError::Status(other)),
    }
}

/// Decode one page body.
///
/// The body must be a JSON array. Individual records that do not match the
/// artist shape are logged and skipped so one bad row never costs the page.
pub(crate) fn decode_page(body: &[u8], offset: u64) -> Result<Vec<RawArtist>, AttemptError> {
    let rows: Vec<serde_json::Value> =
        serde_json::from_slice(body).map_err(|e| AttemptError::Decode(e.to_string()))?;

    let mut artists = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        match serde_json::from_value::<RawArtist>(row) {
            Ok(artist) => artists.push(artist),
            Err(e) => warn!("Skipping malformed artist at index {}: {}", offset + i as u64, e),
        }
    }
    Ok(artists)
}

/// Async client for the WASABI artist catalog.
#[derive(Debug, Clone)]
pub struct WasabiClient {
    client: reqwest::Client,
    base_url: String,
    slots: Arc<Semaphore>,
    max_concurrency: usize,
    retry: RetryPolicy,
    pacer: RequestPacer,
}

impl WasabiClient {
    pub fn new(cfg: &UpstreamConfig) -> Self {
        let max_concurrency = cfg.max_concurrency.max(1);

        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .pool_max_idle_per_host(max_concurrency)
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .expect("failed to build WASABI HTTP client");

        let pacer = RequestPacer::per_second(cfg.requests_per_second);
        if pacer.is_paced() {
            info!("Pacing WASABI requests to {}/s", cfg.requests_per_second);
        }

        Self {
            client,
            base_url: cfg.base_url.clone(),
            slots: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            retry: RetryPolicy::from_config(cfg),
            pacer,
        }
    }

    /// URL for the page starting at `offset`.
    pub fn page_url(&self, offset: u64) -> String {
        format!("{}{}", self.base_url, offset)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Concurrency slots not currently held by an attempt.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Fetch one page, retrying per the configured policy.
    ///
    /// Returns an empty page when the offset cannot be retrieved.
    pub async fn fetch_artists(&self, offset: u64, batch_size: u32) -> Vec<RawArtist> {
        self.try_fetch_artists(offset, batch_size).await.unwrap_or_default()
    }

    /// Like [`fetch_artists`](Self::fetch_artists), but reports why an
    /// offset was given up on.
    pub async fn try_fetch_artists(
        &self,
        offset: u64,
        batch_size: u32,
    ) -> common::Result<Vec<RawArtist>> {
        let end = offset + u64::from(batch_size);
        let url = self.page_url(offset);
        let label = format!("index range [{}, {}[", offset, end);

        let outcome = self
            .retry
            .run(&label, |attempt| self.attempt(&url, offset, &label, attempt))
            .await;

        match outcome.result {
            Ok(artists) => {
                info!(
                    "Successfully retrieved {} artists for {} ({} attempt(s))",
                    artists.len(),
                    label,
                    outcome.attempts
                );
                Ok(artists)
            }
            Err(e) => {
                warn!(
                    "Giving up on {} after {}/{} attempt(s): {}",
                    label,
                    outcome.attempts,
                    self.retry.max_attempts(),
                    e
                );
                Err(e.into())
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        offset: u64,
        label: &str,
        attempt: u32,
    ) -> Result<Vec<RawArtist>, AttemptError> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| AttemptError::Transport("concurrency limiter closed".into()))?;
        self.pacer.wait().await;

        info!("Fetching artists from {} (attempt {})", label, attempt + 1);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AttemptError::Transport(format_reqwest_error(&e)))?;

        let status = resp.status().as_u16();
        if let Some(err) = classify_status(status) {
            debug!("{} returned status {}", url, status);
            return Err(err);
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| AttemptError::Transport(format_reqwest_error(&e)))?;

        decode_page(&body, offset)
    }
}

#[async_trait]
impl ArtistSource for WasabiClient {
    async fn fetch_page(&self, offset: u64, batch_size: u32) -> Vec<RawArtist> {
        self.fetch_artists(offset, batch_size).await
    }
}

impl Default for WasabiClient {
    fn default() -> Self {
        Self::new(&UpstreamConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP upstream answering the n-th connection with the n-th
    /// canned `(status, body)`, repeating the last one once they run out.
    async fn canned_upstream(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses[n.min(responses.len() - 1)];

                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                while read < buf.len() {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => break,
                        Ok(k) => read += k,
                    }
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                let response = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}/", addr), hits)
    }

    fn local_client(base_url: String, max_attempts: u32) -> WasabiClient {
        WasabiClient::new(&UpstreamConfig {
            base_url,
            max_concurrency: 2,
            max_attempts,
            backoff_base_ms: 1,
            request_timeout_secs: 5,
            ..UpstreamConfig::default()
        })
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(204), None);
        assert_eq!(classify_status(429), Some(AttemptError::RateLimited));
        assert_eq!(classify_status(404), Some(AttemptError::Status(404)));
        assert_eq!(classify_status(503), Some(AttemptError::Status(503)));
        assert!(!classify_status(500).expect("500 is a failure").is_retryable());
    }

    #[test]
    fn test_decode_page_skips_malformed_rows() {
        let body = br#"[
            {"name": "Daft Punk", "location": {"city": "Paris", "country": "France"}, "deezerFans": 10},
            {"name": "Bad Row", "genres": "not-a-list"},
            {}
        ]"#;

        let artists = decode_page(body, 400).expect("array body should decode");
        assert_eq!(artists.len(), 2);
        assert_eq!(artists[0].name.as_deref(), Some("Daft Punk"));
        assert_eq!(artists[1], RawArtist::default());
    }

    #[test]
    fn test_decode_page_rejects_non_array() {
        let err = decode_page(br#"{"error": "oops"}"#, 0).expect_err("object body should fail");
        assert!(matches!(err, AttemptError::Decode(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_empty_page_decodes_to_nothing() {
        assert!(decode_page(b"[]", 77_400).expect("empty array").is_empty());
    }

    #[test]
    fn test_page_url_appends_offset() {
        let client = WasabiClient::default();
        assert_eq!(
            client.page_url(600),
            "https://wasabi.i3s.unice.fr/api/v1/artist_all/600"
        );
    }

    #[tokio::test]
    async fn test_failed_attempts_release_slots() {
        // Nothing listens on the discard port, so every attempt fails fast.
        let cfg = UpstreamConfig {
            base_url: "http://127.0.0.1:9/".into(),
            max_concurrency: 3,
            max_attempts: 2,
            backoff_base_ms: 1,
            request_timeout_secs: 2,
            ..UpstreamConfig::default()
        };
        let client = WasabiClient::new(&cfg);

        let (a, b) = tokio::join!(client.fetch_artists(0, 200), client.fetch_artists(200, 200));

        assert!(a.is_empty());
        assert!(b.is_empty());
        assert_eq!(client.available_slots(), 3);
    }

    #[test]
    fn test_decode_page_drops_null_list_entries() {
        let body = br#"[
            {"name": "A"},
            {"name": "B", "genres": ["Rock", null], "albums": [null, {"title": "X", "songs": [null]}], "members": [null, "Ann"]}
        ]"#;

        let artists = decode_page(body, 0).expect("array body should decode");
        assert_eq!(artists.len(), 2);
        let b = &artists[1];
        assert_eq!(b.genres.as_deref(), Some(&["Rock".to_string()][..]));
        let albums = b.albums.as_deref().unwrap_or_default();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].songs.as_deref().map(<[_]>::len), Some(0));
        assert_eq!(b.members.as_deref().map(<[_]>::len), Some(1));
    }

    #[tokio::test]
    async fn test_rate_limited_twice_then_success_over_http() {
        let (url, hits) = canned_upstream(vec![
            (429, "[]"),
            (429, "[]"),
            (200, r#"[{"name": "A"}]"#),
        ])
        .await;
        let client = local_client(url, 5);

        let artists = client.fetch_artists(0, 200).await;

        assert_eq!(artists.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(client.available_slots(), client.max_concurrency());
    }

    #[tokio::test]
    async fn test_server_error_is_requested_once() {
        let (url, hits) = canned_upstream(vec![(500, "oops"), (200, r#"[{"name": "A"}]"#)]).await;
        let client = local_client(url, 5);

        let err = client
            .try_fetch_artists(0, 200)
            .await
            .expect_err("500 should not be retried into success");

        assert!(matches!(err, common::Error::Upstream { status: 500, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(client.available_slots(), client.max_concurrency());
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_exhausts_attempts() {
        let (url, hits) = canned_upstream(vec![(429, "[]")]).await;
        let client = local_client(url, 3);

        let err = client.try_fetch_artists(200, 200).await.expect_err("never succeeds");

        assert!(matches!(err, common::Error::RateLimited));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(client.fetch_artists(200, 200).await.is_empty());
        assert_eq!(client.available_slots(), client.max_concurrency());
    }

    #[tokio::test]
    async fn test_null_genre_keeps_artist_over_http() {
        let (url, _) = canned_upstream(vec![(
            200,
            r#"[{"name": "A"}, {"name": "B", "genres": ["Rock", null]}]"#,
        )])
        .await;
        let client = local_client(url, 1);

        let artists = client.fetch_artists(0, 200).await;

        assert_eq!(artists.len(), 2);
        assert_eq!(artists[1].genres.as_deref(), Some(&["Rock".to_string()][..]));
    }
}
