//! Domain types shared across the catalog.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder used for blank or missing scalar fields.
pub const UNKNOWN: &str = "Unknown";

// ── Upstream record types ─────────────────────────────────────────────

/// An artist object as returned by `GET {base_url}{offset}`.
///
/// Every field is optional; `null` and absence are treated the same way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawArtist {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<RawLocation>,
    #[serde(rename = "deezerFans", default, deserialize_with = "lenient_count")]
    pub deezer_fans: Option<u64>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub genres: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub albums: Option<Vec<RawAlbum>>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub members: Option<Vec<RawMember>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAlbum {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub songs: Option<Vec<RawSong>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSong {
    #[serde(default)]
    pub title: Option<String>,
}

/// Band member entry: the upstream sends either a bare name or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMember {
    Name(String),
    Detailed {
        #[serde(default)]
        name: Option<String>,
    },
}

impl RawMember {
    pub fn name(&self) -> Option<&str> {
        match self {
            RawMember::Name(n) => Some(n.as_str()),
            RawMember::Detailed { name } => name.as_deref(),
        }
    }
}

/// Accepts integers, floats, numeric strings and `null` for counters.
/// Negative or unparseable values collapse to `None`.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    })
}

/// Accepts a list whose entries may be `null` or of the wrong shape.
/// Such entries are dropped; the rest of the record is kept.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(items.map(|items| {
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()
    }))
}

// ── Normalized record ─────────────────────────────────────────────────

/// An artist after default substitution and derived counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedArtist {
    pub name: String,
    /// `"{city}, {country}"`.
    pub location: String,
    pub deezer_fans: u64,
    pub genres: Vec<String>,
    /// Album title → song titles.
    pub albums: BTreeMap<String, Vec<String>>,
    pub album_count: u64,
    pub song_count: u64,
    pub country: String,
    pub members: Vec<String>,
}

// ── Aggregates ────────────────────────────────────────────────────────

/// Per-country totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryStat {
    pub country: String,
    pub artist_count: u64,
    pub song_count: u64,
    pub deezer_fans: u64,
}

/// Artist count and summed fans for one country.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryPopularity {
    pub artist_count: u64,
    pub total_fans: u64,
}

/// country → (genre → summed fans).
pub type GenrePopularityByCountry = BTreeMap<String, BTreeMap<String, u64>>;

/// One artist entry inside a genre roster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtistSummary {
    pub name: String,
    pub song_count: u64,
    pub album_count: u64,
    pub deezer_fans: u64,
    pub country: String,
}

/// All artists seen for one genre, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreRoster {
    pub genre: String,
    pub artists: Vec<ArtistSummary>,
}

/// Artist name paired with its member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistMembers {
    pub artist: String,
    pub members: Vec<String>,
}
