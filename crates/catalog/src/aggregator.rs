//! Record normalization and the aggregate indices built from it.
//!
//! Every update is a sum or a list append, so any arrival order produces
//! the same totals. Each index is a `DashMap` (per-shard locking) and the
//! master list sits behind its own mutex, which makes `process` safe to
//! call from several tasks at once.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use common::{
    ArtistMembers, ArtistSummary, CountryPopularity, CountryStat, GenrePopularityByCountry,
    GenreRoster, NormalizedArtist, RawArtist, UNKNOWN,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

fn or_unknown(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Apply default substitution and derive album/song counts.
pub fn normalize(raw: &RawArtist) -> NormalizedArtist {
    let location = raw.location.as_ref();
    let city = or_unknown(location.and_then(|l| l.city.as_deref()));
    let country = or_unknown(location.and_then(|l| l.country.as_deref()));

    let raw_albums = raw.albums.as_deref().unwrap_or_default();
    let mut albums = BTreeMap::new();
    let mut song_count = 0u64;
    for album in raw_albums {
        let songs: Vec<String> = album
            .songs
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|s| or_unknown(s.title.as_deref()))
            .collect();
        song_count += songs.len() as u64;
        albums.insert(or_unknown(album.title.as_deref()), songs);
    }

    let members = raw
        .members
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(|m| m.name())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();

    NormalizedArtist {
        name: or_unknown(raw.name.as_deref()),
        location: format!("{}, {}", city, country),
        deezer_fans: raw.deezer_fans.unwrap_or(0),
        genres: raw.genres.clone().unwrap_or_default(),
        albums,
        album_count: raw_albums.len() as u64,
        song_count,
        country,
        members,
    }
}

/// Plain, serializable copy of every aggregate, ordered deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTables {
    pub artists: Vec<NormalizedArtist>,
    /// Sorted by country.
    pub country_stats: Vec<CountryStat>,
    pub country_popularity: BTreeMap<String, CountryPopularity>,
    pub genre_popularity: GenrePopularityByCountry,
    /// Sorted by genre; artists within a roster keep arrival order.
    pub genre_rosters: Vec<GenreRoster>,
}

impl CatalogTables {
    /// Per-country artist counts add up to the master list length.
    pub fn is_consistent(&self) -> bool {
        let by_country: u64 = self.country_stats.iter().map(|c| c.artist_count).sum();
        let by_popularity: u64 = self.country_popularity.values().map(|p| p.artist_count).sum();
        by_country == self.artists.len() as u64 && by_popularity == by_country
    }
}

/// The aggregation context: master artist list plus four indices.
#[derive(Debug, Default)]
pub struct Aggregator {
    artists: Mutex<Vec<NormalizedArtist>>,
    country_stats: DashMap<String, CountryStat>,
    country_popularity: DashMap<String, CountryPopularity>,
    /// country → genre → fans.
    genre_popularity: DashMap<String, HashMap<String, u64>>,
    /// genre → artists.
    genre_rosters: DashMap<String, Vec<ArtistSummary>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn artists_guard(&self) -> MutexGuard<'_, Vec<NormalizedArtist>> {
        // A panic mid-push cannot leave the Vec half-written.
        self.artists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Normalize one record and fold it into every index.
    ///
    /// No deduplication: feeding the same record twice counts it twice.
    pub fn process(&self, raw: &RawArtist) -> NormalizedArtist {
        let artist = normalize(raw);
        self.record(&artist);
        artist
    }

    fn record(&self, artist: &NormalizedArtist) {
        self.artists_guard().push(artist.clone());

        self.country_stats
            .entry(artist.country.clone())
            .and_modify(|stat| {
                stat.artist_count += 1;
                stat.song_count += artist.song_count;
                stat.deezer_fans += artist.deezer_fans;
            })
            .or_insert_with(|| CountryStat {
                country: artist.country.clone(),
                artist_count: 1,
                song_count: artist.song_count,
                deezer_fans: artist.deezer_fans,
            });

        {
            let mut popularity = self
                .country_popularity
                .entry(artist.country.clone())
                .or_default();
            popularity.artist_count += 1;
            popularity.total_fans += artist.deezer_fans;
        }

        if !artist.genres.is_empty() {
            let mut by_genre = self
                .genre_popularity
                .entry(artist.country.clone())
                .or_default();
            for genre in &artist.genres {
                *by_genre.entry(genre.clone()).or_insert(0) += artist.deezer_fans;
            }
        }

        for genre in &artist.genres {
            self.genre_rosters
                .entry(genre.clone())
                .or_default()
                .push(ArtistSummary {
                    name: artist.name.clone(),
                    song_count: artist.song_count,
                    album_count: artist.album_count,
                    deezer_fans: artist.deezer_fans,
                    country: artist.country.clone(),
                });
        }
    }

    // ── Read accessors ────────────────────────────────────────────────

    pub fn total_artists(&self) -> usize {
        self.artists_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_artists() == 0
    }

    pub fn artists(&self) -> Vec<NormalizedArtist> {
        self.artists_guard().clone()
    }

    /// Per-country totals, sorted by country.
    pub fn country_stats(&self) -> Vec<CountryStat> {
        let mut stats: Vec<CountryStat> =
            self.country_stats.iter().map(|e| e.value().clone()).collect();
        stats.sort_by(|a, b| a.country.cmp(&b.country));
        stats
    }

    pub fn country_popularity_table(&self) -> BTreeMap<String, CountryPopularity> {
        self.country_popularity
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn genre_popularity_by_country(&self) -> GenrePopularityByCountry {
        self.genre_popularity
            .iter()
            .map(|e| {
                let genres = e.value().iter().map(|(g, f)| (g.clone(), *f)).collect();
                (e.key().clone(), genres)
            })
            .collect()
    }

    /// All rosters, sorted by genre.
    pub fn genre_rosters(&self) -> Vec<GenreRoster> {
        let mut rosters: Vec<GenreRoster> = self
            .genre_rosters
            .iter()
            .map(|e| GenreRoster {
                genre: e.key().clone(),
                artists: e.value().clone(),
            })
            .collect();
        rosters.sort_by(|a, b| a.genre.cmp(&b.genre));
        rosters
    }

    pub fn members(&self) -> Vec<ArtistMembers> {
        self.artists_guard()
            .iter()
            .map(|a| ArtistMembers {
                artist: a.name.clone(),
                members: a.members.clone(),
            })
            .collect()
    }

    // ── Lookups ───────────────────────────────────────────────────────
    //
    // `None` means "no data" and is not an error.

    pub fn country_stat(&self, country: &str) -> Option<CountryStat> {
        self.country_stats.get(country).map(|e| e.value().clone())
    }

    pub fn country_popularity(&self, country: &str) -> Option<CountryPopularity> {
        self.country_popularity.get(country).map(|e| *e.value())
    }

    pub fn genre_popularity_in(&self, country: &str) -> Option<BTreeMap<String, u64>> {
        self.genre_popularity
            .get(country)
            .map(|e| e.value().iter().map(|(g, f)| (g.clone(), *f)).collect())
    }

    pub fn genre_roster(&self, genre: &str) -> Option<GenreRoster> {
        self.genre_rosters.get(genre).map(|e| GenreRoster {
            genre: genre.to_string(),
            artists: e.value().clone(),
        })
    }

    /// The genre's roster restricted to artists from `country`.
    pub fn genre_roster_in_country(&self, country: &str, genre: &str) -> Option<GenreRoster> {
        let roster = self.genre_rosters.get(genre)?;
        let artists: Vec<ArtistSummary> = roster
            .value()
            .iter()
            .filter(|a| a.country == country)
            .cloned()
            .collect();
        if artists.is_empty() {
            return None;
        }
        Some(GenreRoster {
            genre: genre.to_string(),
            artists,
        })
    }

    // ── Snapshot support ──────────────────────────────────────────────

    pub fn tables(&self) -> CatalogTables {
        CatalogTables {
            artists: self.artists(),
            country_stats: self.country_stats(),
            country_popularity: self.country_popularity_table(),
            genre_popularity: self.genre_popularity_by_country(),
            genre_rosters: self.genre_rosters(),
        }
    }

    /// Replace all state with previously computed tables.
    pub fn restore(&self, tables: CatalogTables) {
        self.clear();

        *self.artists_guard() = tables.artists;
        for stat in tables.country_stats {
            self.country_stats.insert(stat.country.clone(), stat);
        }
        for (country, popularity) in tables.country_popularity {
            self.country_popularity.insert(country, popularity);
        }
        for (country, genres) in tables.genre_popularity {
            self.genre_popularity
                .insert(country, genres.into_iter().collect());
        }
        for roster in tables.genre_rosters {
            self.genre_rosters.insert(roster.genre, roster.artists);
        }
    }

    pub fn clear(&self) {
        self.artists_guard().clear();
        self.country_stats.clear();
        self.country_popularity.clear();
        self.genre_popularity.clear();
        self.genre_rosters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{RawAlbum, RawLocation, RawMember, RawSong};

    fn make_artist(
        name: &str,
        country: &str,
        fans: u64,
        genres: &[&str],
        songs: usize,
    ) -> RawArtist {
        RawArtist {
            name: Some(name.into()),
            location: Some(RawLocation {
                city: Some("Somewhere".into()),
                country: Some(country.into()),
            }),
            deezer_fans: Some(fans),
            genres: Some(genres.iter().map(|g| g.to_string()).collect()),
            albums: Some(vec![RawAlbum {
                title: Some(format!("{} LP", name)),
                songs: Some(
                    (0..songs)
                        .map(|i| RawSong {
                            title: Some(format!("Track {}", i + 1)),
                        })
                        .collect(),
                ),
            }]),
            members: Some(vec![RawMember::Name(format!("{} singer", name))]),
        }
    }

    fn sample_records() -> Vec<RawArtist> {
        vec![
            make_artist("Air", "France", 500, &["Pop", "Electronic"], 2),
            make_artist("Justice", "France", 300, &["Electronic"], 4),
            make_artist("Kraftwerk", "Germany", 900, &["Electronic", "Krautrock"], 7),
            make_artist("Björk", "Iceland", 1200, &["Pop"], 3),
            make_artist("Can", "Germany", 150, &["Krautrock"], 5),
            make_artist("Nobody", "", 0, &[], 0),
        ]
    }

    /// Tables with each roster's artists sorted, so arrival order drops out.
    fn order_free(mut tables: CatalogTables) -> CatalogTables {
        for roster in &mut tables.genre_rosters {
            roster.artists.sort();
        }
        tables.artists.sort_by(|a, b| a.name.cmp(&b.name));
        tables
    }

    #[test]
    fn test_single_artist_updates_every_index() {
        let agg = Aggregator::new();
        let artist = agg.process(&make_artist("Air", "France", 500, &["Pop"], 2));

        assert_eq!(artist.album_count, 1);
        assert_eq!(artist.song_count, 2);
        assert_eq!(artist.location, "Somewhere, France");

        assert_eq!(
            agg.country_stat("France"),
            Some(CountryStat {
                country: "France".into(),
                artist_count: 1,
                song_count: 2,
                deezer_fans: 500,
            })
        );
        assert_eq!(
            agg.country_popularity("France"),
            Some(CountryPopularity {
                artist_count: 1,
                total_fans: 500
            })
        );
        assert_eq!(agg.genre_popularity_in("France").unwrap()["Pop"], 500);

        let roster = agg.genre_roster("Pop").expect("Pop roster should exist");
        assert_eq!(
            roster.artists,
            vec![ArtistSummary {
                name: "Air".into(),
                song_count: 2,
                album_count: 1,
                deezer_fans: 500,
                country: "France".into(),
            }]
        );
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let agg = Aggregator::new();
        let raw = RawArtist {
            name: Some("   ".into()),
            albums: Some(vec![RawAlbum {
                title: None,
                songs: Some(vec![RawSong { title: Some("".into()) }]),
            }]),
            ..RawArtist::default()
        };

        let artist = agg.process(&raw);

        assert_eq!(artist.name, UNKNOWN);
        assert_eq!(artist.country, UNKNOWN);
        assert_eq!(artist.location, "Unknown, Unknown");
        assert_eq!(artist.deezer_fans, 0);
        assert!(artist.genres.is_empty());
        assert!(artist.members.is_empty());
        assert_eq!(artist.albums[UNKNOWN], vec![UNKNOWN.to_string()]);
        assert_eq!(artist.song_count, 1);

        // No genres means no genre entries at all.
        assert!(agg.genre_popularity_in(UNKNOWN).is_none());
        assert!(agg.genre_rosters().is_empty());
        assert_eq!(agg.country_stat(UNKNOWN).unwrap().artist_count, 1);
    }

    #[test]
    fn test_duplicate_album_titles_merge_but_count() {
        let raw = RawArtist {
            albums: Some(vec![
                RawAlbum {
                    title: Some("Live".into()),
                    songs: Some(vec![RawSong::default()]),
                },
                RawAlbum {
                    title: Some("Live".into()),
                    songs: Some(vec![RawSong::default(), RawSong::default()]),
                },
            ]),
            ..RawArtist::default()
        };

        let artist = normalize(&raw);
        assert_eq!(artist.albums.len(), 1);
        assert_eq!(artist.albums["Live"].len(), 2);
        assert_eq!(artist.album_count, 2);
        assert_eq!(artist.song_count, 3);
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let raw = make_artist("Air", "France", 500, &["Pop"], 2);
        assert_eq!(Aggregator::new().process(&raw), Aggregator::new().process(&raw));
    }

    #[test]
    fn test_processing_twice_double_counts() {
        let agg = Aggregator::new();
        let raw = make_artist("Air", "France", 500, &["Pop"], 2);
        agg.process(&raw);
        agg.process(&raw);

        assert_eq!(agg.total_artists(), 2);
        let stat = agg.country_stat("France").unwrap();
        assert_eq!((stat.artist_count, stat.song_count, stat.deezer_fans), (2, 4, 1000));
        assert_eq!(agg.genre_popularity_in("France").unwrap()["Pop"], 1000);
        assert_eq!(agg.genre_roster("Pop").unwrap().artists.len(), 2);
    }

    #[test]
    fn test_arrival_order_does_not_change_aggregates() {
        let records = sample_records();
        let baseline = Aggregator::new();
        for raw in &records {
            baseline.process(raw);
        }
        let expected = order_free(baseline.tables());

        for rotation in 1..records.len() {
            let mut permuted = records.clone();
            permuted.rotate_left(rotation);
            if rotation % 2 == 0 {
                permuted.reverse();
            }
            let agg = Aggregator::new();
            for raw in &permuted {
                agg.process(raw);
            }
            assert_eq!(order_free(agg.tables()), expected, "rotation {}", rotation);
        }
    }

    #[test]
    fn test_concurrent_processing_loses_nothing() {
        let records = sample_records();
        let sequential = Aggregator::new();
        let concurrent = Aggregator::new();
        for _ in 0..50 {
            for raw in &records {
                sequential.process(raw);
            }
        }

        std::thread::scope(|scope| {
            for _ in 0..5 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        for raw in &records {
                            concurrent.process(raw);
                        }
                    }
                });
            }
        });

        assert_eq!(concurrent.total_artists(), 300);
        assert_eq!(order_free(concurrent.tables()), order_free(sequential.tables()));
        assert!(concurrent.tables().is_consistent());
    }

    #[test]
    fn test_country_sum_matches_artist_count() {
        let agg = Aggregator::new();
        for raw in sample_records() {
            agg.process(&raw);
        }
        let sum: u64 = agg.country_stats().iter().map(|c| c.artist_count).sum();
        assert_eq!(sum, agg.total_artists() as u64);
        assert_eq!(agg.total_artists(), 6);
    }

    #[test]
    fn test_every_genre_has_one_roster_and_popularity_entry() {
        let agg = Aggregator::new();
        for raw in sample_records() {
            agg.process(&raw);
        }
        let rosters = agg.genre_rosters();
        let popularity = agg.genre_popularity_by_country();

        for artist in agg.artists() {
            for genre in &artist.genres {
                assert_eq!(rosters.iter().filter(|r| &r.genre == genre).count(), 1);
                assert!(popularity[&artist.country].contains_key(genre));
            }
        }
        let genres: Vec<_> = rosters.iter().map(|r| r.genre.as_str()).collect();
        assert_eq!(genres, vec!["Electronic", "Krautrock", "Pop"]);
    }

    #[test]
    fn test_genre_roster_in_country() {
        let agg = Aggregator::new();
        for raw in sample_records() {
            agg.process(&raw);
        }

        let french = agg
            .genre_roster_in_country("France", "Electronic")
            .expect("French electronic artists exist");
        let names: Vec<_> = french.artists.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Air", "Justice"]);

        assert!(agg.genre_roster_in_country("Iceland", "Krautrock").is_none());
        assert!(agg.genre_roster_in_country("France", "Polka").is_none());
        assert!(agg.country_stat("Atlantis").is_none());
        assert!(agg.genre_popularity_in("Atlantis").is_none());
    }

    #[test]
    fn test_members_listing() {
        let agg = Aggregator::new();
        agg.process(&make_artist("Air", "France", 1, &[], 0));
        assert_eq!(
            agg.members(),
            vec![ArtistMembers {
                artist: "Air".into(),
                members: vec!["Air singer".into()],
            }]
        );
    }

    #[test]
    fn test_restore_reproduces_tables() {
        let agg = Aggregator::new();
        for raw in sample_records() {
            agg.process(&raw);
        }
        let tables = agg.tables();

        let restored = Aggregator::new();
        restored.process(&make_artist("Stale", "Nowhere", 1, &["Noise"], 1));
        restored.restore(tables.clone());

        assert_eq!(restored.tables(), tables);
        assert!(restored.genre_roster("Noise").is_none());
        assert_eq!(restored.country_stat("France"), agg.country_stat("France"));
    }

    #[test]
    fn test_inconsistent_tables_detected() {
        let agg = Aggregator::new();
        agg.process(&make_artist("Air", "France", 1, &[], 0));
        let mut tables = agg.tables();
        assert!(tables.is_consistent());
        tables.artists.clear();
        assert!(!tables.is_consistent());
    }
}
