//! The seam between the loader and wherever pages come from.

use async_trait::async_trait;
use common::RawArtist;

/// A paginated source of raw artist records.
#[async_trait]
pub trait ArtistSource: Send + Sync {
    /// Fetch the page starting at `offset`.
    ///
    /// Never fails: an unrecoverable page comes back empty and the caller
    /// carries on with the other offsets.
    async fn fetch_page(&self, offset: u64, batch_size: u32) -> Vec<RawArtist>;
}
