//! Canonical song rows.
//!
//! [`SongCatalog::save_song`] is the only deduplication guarantee for songs:
//! at most one persisted row per `spotify_id`. Inside one process the
//! check-then-insert runs under a per-id lock; across processes it is not
//! atomic, and duplicate rows that slip through are tolerated.

use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CacheRegistry, KeyedLocks};
use crate::error::{PartyError, StoreError};
use crate::models::{NewSong, Song};
use crate::storage::Store;

pub struct SongCatalog {
    store: Arc<dyn Store>,
    caches: Arc<CacheRegistry>,
    locks: KeyedLocks<String>,
}

impl SongCatalog {
    pub fn new(store: Arc<dyn Store>, caches: Arc<CacheRegistry>) -> Self {
        Self {
            store,
            caches,
            locks: KeyedLocks::new(),
        }
    }

    /// Returns the canonical row for the candidate's `spotify_id`.
    ///
    /// Looks in the song cache, then the store. Only when neither knows the
    /// id is the candidate persisted. A candidate that loses to an existing
    /// row is discarded, even if its metadata differs.
    pub async fn save_song(&self, candidate: NewSong) -> Result<Song, StoreError> {
        let _guard = self.locks.lock(&candidate.spotify_id).await;

        if let Some(song) = self.caches.songs.get(&candidate.spotify_id) {
            return Ok(song);
        }

        if let Some(song) = self.store.find_song_by_spotify_id(&candidate.spotify_id).await? {
            debug!("🎵 Canción existente reutilizada: {}", song.spotify_id);
            self.caches.songs.set(song.spotify_id.clone(), song.clone());
            return Ok(song);
        }

        let song = self.store.insert_song(candidate).await?;
        info!("➕ Canción guardada: {} - {}", song.artist, song.title);
        self.caches.songs.set(song.spotify_id.clone(), song.clone());
        Ok(song)
    }

    /// Looks a song up by natural key.
    pub async fn find_song(&self, spotify_id: &str) -> Result<Song, PartyError> {
        if let Some(song) = self.caches.songs.get(spotify_id) {
            return Ok(song);
        }

        let song = self
            .store
            .find_song_by_spotify_id(spotify_id)
            .await?
            .ok_or_else(|| PartyError::not_found("Song", spotify_id))?;
        self.caches.songs.set(song.spotify_id.clone(), song.clone());
        Ok(song)
    }
}
