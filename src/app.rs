//! Service container.
//!
//! [`OpenParty`] is built once at process start and handed to whoever needs
//! the services. There is no global state; tests build isolated instances
//! over a fresh [`MemoryStore`](crate::storage::MemoryStore).

use std::sync::Arc;
use tracing::info;

use crate::cache::CacheRegistry;
use crate::config::Config;
use crate::error::CacheError;
use crate::jobs::SearchCacheWarmer;
use crate::join_code::JoinCodeAllocator;
use crate::party::PartyService;
use crate::playlist::PlaylistCacheManager;
use crate::search::SearchService;
use crate::songs::SongCatalog;
use crate::sources::TrackSearch;
use crate::storage::Store;

pub struct OpenParty {
    store: Arc<dyn Store>,
    caches: Arc<CacheRegistry>,
    songs: Arc<SongCatalog>,
    playlists: Arc<PlaylistCacheManager>,
    search: Arc<SearchService>,
    parties: Arc<PartyService>,
    warmer: SearchCacheWarmer,
}

impl OpenParty {
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        source: Arc<dyn TrackSearch>,
    ) -> Result<Self, CacheError> {
        let caches = Arc::new(CacheRegistry::new(config.cache_sizes())?);
        let songs = Arc::new(SongCatalog::new(store.clone(), caches.clone()));
        let playlists = Arc::new(PlaylistCacheManager::new(store.clone(), caches.clone()));
        let search = Arc::new(SearchService::new(
            store.clone(),
            caches.clone(),
            songs.clone(),
            source,
            config.search_result_limit,
        ));
        let parties = Arc::new(PartyService::new(
            store.clone(),
            caches.clone(),
            playlists.clone(),
            songs.clone(),
            JoinCodeAllocator::new(store.clone(), config.join_code_settings()),
        ));
        let warmer = SearchCacheWarmer::new(store.clone(), search.clone(), config.warm_memory_cache);

        Ok(Self {
            store,
            caches,
            songs,
            playlists,
            search,
            parties,
            warmer,
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn caches(&self) -> &Arc<CacheRegistry> {
        &self.caches
    }

    pub fn songs(&self) -> &Arc<SongCatalog> {
        &self.songs
    }

    pub fn playlists(&self) -> &Arc<PlaylistCacheManager> {
        &self.playlists
    }

    pub fn search(&self) -> &Arc<SearchService> {
        &self.search
    }

    pub fn parties(&self) -> &Arc<PartyService> {
        &self.parties
    }

    pub fn warmer(&self) -> &SearchCacheWarmer {
        &self.warmer
    }

    /// Logs cache statistics and drops every cached entry.
    pub fn shutdown(&self) {
        for stats in self.caches.stats() {
            info!("📊 {}", stats);
        }
        self.caches.clear();
        info!("👋 Caches liberados");
    }
}
