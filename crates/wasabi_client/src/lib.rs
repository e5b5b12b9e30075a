//! WASABI artist API client.
//!
//! Fetches pages of raw artist records with bounded concurrency, optional
//! pacing, and retry/backoff on rate limits and transport failures.

pub mod client;
pub mod rate_limit;
pub mod retry;
pub mod source;

pub use client::WasabiClient;
pub use rate_limit::RequestPacer;
pub use retry::{AttemptError, RetryOutcome, RetryPolicy};
pub use source::ArtistSource;
