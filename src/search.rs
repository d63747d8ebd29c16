//! Search-result memoization.
//!
//! A query is answered from the in-memory search cache, then from the
//! persisted search-cache records, and only then from the remote API. Remote
//! results are deduplicated into canonical songs and memoized in both layers.
//!
//! Two processes can still race through the persisted check-then-insert and
//! write two records for the same query; `consolidate_search_cache` repairs
//! that out of band.

use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CacheRegistry, KeyedLocks};
use crate::error::PartyError;
use crate::models::{RecordId, Song};
use crate::songs::SongCatalog;
use crate::sources::TrackSearch;
use crate::storage::Store;

/// Where a search result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOrigin {
    Memory,
    Persisted,
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub query: String,
    pub songs: Vec<Song>,
    pub origin: SearchOrigin,
}

/// Lowercase, keep alphanumerics and whitespace, collapse runs of whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

pub struct SearchService {
    store: Arc<dyn Store>,
    caches: Arc<CacheRegistry>,
    songs: Arc<SongCatalog>,
    source: Arc<dyn TrackSearch>,
    result_limit: usize,
    locks: KeyedLocks<String>,
}

impl SearchService {
    pub fn new(
        store: Arc<dyn Store>,
        caches: Arc<CacheRegistry>,
        songs: Arc<SongCatalog>,
        source: Arc<dyn TrackSearch>,
        result_limit: usize,
    ) -> Self {
        Self {
            store,
            caches,
            songs,
            source,
            result_limit,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Song>, PartyError> {
        Ok(self.search_with(query, true).await?.songs)
    }

    /// Resolves `query` through every cache layer.
    ///
    /// With `use_memory` unset the in-memory search cache is neither read nor
    /// populated; the persisted layer is always consulted.
    pub async fn search_with(&self, query: &str, use_memory: bool) -> Result<SearchOutcome, PartyError> {
        let key = normalize_query(query);
        if key.is_empty() {
            return Ok(SearchOutcome {
                query: key,
                songs: Vec::new(),
                origin: SearchOrigin::Memory,
            });
        }

        if use_memory {
            if let Some(songs) = self.caches.searches.get(&key) {
                return Ok(SearchOutcome {
                    query: key,
                    songs,
                    origin: SearchOrigin::Memory,
                });
            }
        }

        let _guard = self.locks.lock(&key).await;

        let records = self.store.find_search_records(&key).await?;
        if let Some(record) = records.first() {
            debug!("📦 Búsqueda persistida reutilizada: '{}'", key);
            let songs = self.store.find_songs(&record.song_ids).await?;
            if use_memory {
                self.caches.searches.set(key.clone(), songs.clone());
            }
            return Ok(SearchOutcome {
                query: key,
                songs,
                origin: SearchOrigin::Persisted,
            });
        }

        let tracks = self
            .source
            .search(&key, self.result_limit)
            .await
            .map_err(PartyError::Remote)?;

        let mut songs: Vec<Song> = Vec::with_capacity(tracks.len());
        for track in tracks {
            let song = self.songs.save_song(track.into()).await?;
            if !songs.iter().any(|existing| existing.id == song.id) {
                songs.push(song);
            }
        }

        let song_ids: Vec<RecordId> = songs.iter().map(|song| song.id).collect();
        self.store.insert_search_record(&key, song_ids).await?;
        info!(
            "🔍 Búsqueda '{}' memorizada desde {} ({} canciones)",
            key,
            self.source.source_name(),
            songs.len()
        );

        if use_memory {
            self.caches.searches.set(key.clone(), songs.clone());
        }

        Ok(SearchOutcome {
            query: key,
            songs,
            origin: SearchOrigin::Remote,
        })
    }

    /// Drops the in-memory result for `query`.
    pub fn invalidate(&self, query: &str) {
        self.caches.searches.remove(normalize_query(query).as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSizes;
    use crate::sources::{MockTrackSearch, TrackRecord};
    use crate::storage::MemoryStore;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    fn track(spotify_id: &str) -> TrackRecord {
        TrackRecord {
            spotify_id: spotify_id.to_string(),
            artist: "ABBA".to_string(),
            title: spotify_id.to_string(),
            album: "Arrival".to_string(),
            art_url: String::new(),
        }
    }

    fn service(source: MockTrackSearch) -> (Arc<MemoryStore>, Arc<CacheRegistry>, SearchService) {
        let store = Arc::new(MemoryStore::new());
        let caches = Arc::new(CacheRegistry::new(CacheSizes::default()).unwrap());
        let songs = Arc::new(SongCatalog::new(store.clone(), caches.clone()));
        let service = SearchService::new(store.clone(), caches.clone(), songs, Arc::new(source), 5);
        (store, caches, service)
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Dancing   QUEEN!! "), "dancing queen");
        assert_eq!(normalize_query("?!"), "");
        assert_eq!(normalize_query("Björk"), "björk");
    }

    #[tokio::test]
    async fn test_remote_result_is_memoized_in_both_layers() {
        let mut source = MockTrackSearch::new();
        source
            .expect_search()
            .with(eq("dancing queen"), eq(5))
            .times(1)
            .returning(|_, _| Ok(vec![track("dq"), track("sos"), track("dq")]));
        source.expect_source_name().return_const("mock");

        let (store, caches, service) = service(source);

        let first = service.search_with("Dancing Queen", true).await.unwrap();
        assert_eq!(first.origin, SearchOrigin::Remote);
        assert_eq!(first.songs.len(), 2);

        let second = service.search_with("dancing  queen", true).await.unwrap();
        assert_eq!(second.origin, SearchOrigin::Memory);
        assert_eq!(second.songs, first.songs);

        caches.clear();
        let third = service.search_with("dancing queen", true).await.unwrap();
        assert_eq!(third.origin, SearchOrigin::Persisted);
        assert_eq!(third.songs, first.songs);

        assert_eq!(store.find_search_records("dancing queen").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_without_memory_cache() {
        let mut source = MockTrackSearch::new();
        source
            .expect_search()
            .times(1)
            .returning(|_, _| Ok(vec![track("a")]));
        source.expect_source_name().return_const("mock");

        let (_, caches, service) = service(source);

        let outcome = service.search_with("abba", false).await.unwrap();
        assert_eq!(outcome.origin, SearchOrigin::Remote);
        assert!(caches.searches.is_empty());

        let again = service.search_with("abba", false).await.unwrap();
        assert_eq!(again.origin, SearchOrigin::Persisted);
        assert!(caches.searches.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_skips_remote() {
        let mut source = MockTrackSearch::new();
        source.expect_search().never();

        let (_, _, service) = service(source);
        assert!(service.search("  !! ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_propagates() {
        let mut source = MockTrackSearch::new();
        source
            .expect_search()
            .returning(|_, _| Err(anyhow::anyhow!("503 Service Unavailable")));

        let (store, _, service) = service(source);

        let error = service.search("abba").await.unwrap_err();
        assert!(matches!(error, PartyError::Remote(_)));
        assert!(store.find_search_records("abba").await.unwrap().is_empty());
    }
}
