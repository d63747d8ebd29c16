//! # Storage Module
//!
//! Narrow repository interface over the persistent object store.
//!
//! The store is the source of truth for every entity; caches are disposable
//! projections of it. Only the query shapes the core actually uses are
//! exposed: equality lookups, descending-score listing with the song
//! included, paginated scans by ascending identity, count, first-match and
//! destroy-by-id.
//!
//! There are no uniqueness constraints at this level. Song dedup, like
//! uniqueness and join-code uniqueness are enforced by the callers with
//! check-then-insert sequences.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{
    Like, NewParty, NewPlaylistEntry, NewSong, Party, PlaylistEntry, RecordId, SearchCacheRecord,
    Song,
};

pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // Songs

    /// First song whose natural key matches.
    async fn find_song_by_spotify_id(&self, spotify_id: &str) -> StoreResult<Option<Song>>;

    /// Songs for `ids` in the given order; unknown ids are skipped.
    async fn find_songs(&self, ids: &[RecordId]) -> StoreResult<Vec<Song>>;

    async fn insert_song(&self, song: NewSong) -> StoreResult<Song>;

    async fn save_song(&self, song: &Song) -> StoreResult<()>;

    /// Up to `limit` songs with `id > after`, ascending by id.
    async fn songs_page(&self, after: Option<RecordId>, limit: usize) -> StoreResult<Vec<Song>>;

    // Parties

    async fn find_party(&self, id: RecordId) -> StoreResult<Option<Party>>;

    async fn find_party_by_join_code(&self, join_code: &str) -> StoreResult<Option<Party>>;

    async fn insert_party(&self, party: NewParty) -> StoreResult<Party>;

    async fn save_party(&self, party: &Party) -> StoreResult<()>;

    /// Destroys the party together with its playlist entries and their likes.
    async fn destroy_party(&self, id: RecordId) -> StoreResult<()>;

    // Playlist entries

    /// Every entry of the party with its song included, highest score first.
    async fn playlist_entries(&self, party_id: RecordId) -> StoreResult<Vec<PlaylistEntry>>;

    async fn insert_entry(&self, entry: NewPlaylistEntry) -> StoreResult<PlaylistEntry>;

    /// Persists `num_likes` and `score`.
    async fn save_entry(&self, entry: &PlaylistEntry) -> StoreResult<()>;

    /// Destroys the entry and its likes.
    async fn destroy_entry(&self, id: RecordId) -> StoreResult<()>;

    // Likes

    async fn find_like(&self, entry_id: RecordId, user_id: &str) -> StoreResult<Option<Like>>;

    async fn insert_like(&self, entry_id: RecordId, user_id: &str) -> StoreResult<Like>;

    async fn destroy_like(&self, id: RecordId) -> StoreResult<()>;

    async fn count_likes(&self, entry_id: RecordId) -> StoreResult<usize>;

    // Search cache

    async fn distinct_search_queries(&self) -> StoreResult<Vec<String>>;

    /// Every record for `query`, ascending by id.
    async fn find_search_records(&self, query: &str) -> StoreResult<Vec<SearchCacheRecord>>;

    async fn insert_search_record(
        &self,
        query: &str,
        song_ids: Vec<RecordId>,
    ) -> StoreResult<SearchCacheRecord>;

    async fn save_search_record(&self, record: &SearchCacheRecord) -> StoreResult<()>;

    /// Returns how many of `ids` existed.
    async fn destroy_search_records(&self, ids: &[RecordId]) -> StoreResult<usize>;
}
