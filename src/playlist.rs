//! # Playlist Module
//!
//! In-memory playlist per party and the protocol that keeps it consistent
//! with the store.
//!
//! [`PlaylistCacheManager`] is the single point of truth for cached playlist
//! state and the only writer of [`Party::cached_playlist`]. Every mutation
//! goes through it and ends in [`PlaylistCacheManager::indicate_playlist_updated`],
//! which publishes a pre-sorted snapshot onto the party record so readers
//! never have to re-query and re-sort.
//!
//! ## Ranking
//!
//! Entries are ordered by descending `score`. Equal scores keep the order in
//! which the entries were added (ascending entry id, which the store assigns
//! in insertion order).

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::CacheRegistry;
use crate::error::PartyError;
use crate::models::{Party, PlaylistEntry, PlaylistSnapshotItem, RecordId};
use crate::storage::Store;

/// Cached playlist of one party, keyed by `song.spotify_id`.
///
/// Always re-derivable from the store by listing the party's entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartyPlaylist {
    entries: HashMap<String, PlaylistEntry>,
}

impl PartyPlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = PlaylistEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.song.spotify_id.clone(), entry))
                .collect(),
        }
    }

    /// Inserts or replaces the entry for its song.
    pub fn insert(&mut self, entry: PlaylistEntry) -> Option<PlaylistEntry> {
        self.entries.insert(entry.song.spotify_id.clone(), entry)
    }

    pub fn remove(&mut self, spotify_id: &str) -> Option<PlaylistEntry> {
        self.entries.remove(spotify_id)
    }

    pub fn get(&self, spotify_id: &str) -> Option<&PlaylistEntry> {
        self.entries.get(spotify_id)
    }

    pub fn contains(&self, spotify_id: &str) -> bool {
        self.entries.contains_key(spotify_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries by descending score, ties by ascending entry id.
    pub fn ranked(&self) -> Vec<&PlaylistEntry> {
        let mut ranked: Vec<&PlaylistEntry> = self.entries.values().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));
        ranked
    }

    /// Highest ranked entry, if any.
    pub fn top(&self) -> Option<&PlaylistEntry> {
        self.entries
            .values()
            .min_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)))
    }

    pub fn snapshot(&self) -> Vec<PlaylistSnapshotItem> {
        self.ranked().into_iter().map(PlaylistSnapshotItem::from).collect()
    }
}

/// Recomputes the ranking score of an entry.
///
/// The score is currently the number of likes. This is the single place
/// where additional weighting factors (recency, who added the song) plug in;
/// callers always go through it instead of writing `score` themselves.
pub fn update_entry_score(entry: &mut PlaylistEntry) {
    entry.score = entry.num_likes;
}

/// Owns cached playlists and publishes their snapshots.
pub struct PlaylistCacheManager {
    store: Arc<dyn Store>,
    caches: Arc<CacheRegistry>,
}

impl PlaylistCacheManager {
    pub fn new(store: Arc<dyn Store>, caches: Arc<CacheRegistry>) -> Self {
        Self { store, caches }
    }

    /// Party record, from the party cache or the store.
    pub async fn get_party(&self, party_id: RecordId) -> Result<Party, PartyError> {
        if let Some(party) = self.caches.parties.get(&party_id) {
            return Ok(party);
        }

        let party = self
            .store
            .find_party(party_id)
            .await?
            .ok_or_else(|| PartyError::not_found("Party", party_id))?;
        self.caches.parties.set(party_id, party.clone());
        Ok(party)
    }

    /// Cached playlist of the party, rebuilt from the store on a miss.
    pub async fn get_cached_playlist(&self, party_id: RecordId) -> Result<PartyPlaylist, PartyError> {
        if let Some(playlist) = self.caches.playlists.get(&party_id) {
            return Ok(playlist);
        }

        let entries = self.store.playlist_entries(party_id).await?;
        let playlist = PartyPlaylist::from_entries(entries);
        debug!(
            "🔄 Playlist de party {} reconstruida ({} canciones)",
            party_id,
            playlist.len()
        );

        self.caches.playlists.set(party_id, playlist.clone());
        Ok(playlist)
    }

    /// Adds or replaces `entry` in the cached playlist and republishes.
    pub async fn add_entry_to_playlist(
        &self,
        party_id: RecordId,
        entry: PlaylistEntry,
    ) -> Result<Party, PartyError> {
        let mut playlist = self.get_cached_playlist(party_id).await?;
        playlist.insert(entry);
        self.caches.playlists.set(party_id, playlist);

        self.indicate_playlist_updated(party_id).await
    }

    pub async fn remove_entry_from_playlist(
        &self,
        party_id: RecordId,
        entry: &PlaylistEntry,
    ) -> Result<Party, PartyError> {
        let mut playlist = self.get_cached_playlist(party_id).await?;
        playlist.remove(&entry.song.spotify_id);
        self.caches.playlists.set(party_id, playlist);

        self.indicate_playlist_updated(party_id).await
    }

    /// Publishes the ranked snapshot of the cached playlist onto the party
    /// record, stamps `playlist_last_updated_at` and persists the party.
    pub async fn indicate_playlist_updated(&self, party_id: RecordId) -> Result<Party, PartyError> {
        let playlist = self.get_cached_playlist(party_id).await?;
        let snapshot = serde_json::to_string(&playlist.snapshot())
            .map_err(crate::error::StoreError::from)?;

        let mut party = self.get_party(party_id).await?;
        party.cached_playlist = snapshot;
        party.playlist_last_updated_at = Some(Utc::now());

        self.store.save_party(&party).await?;
        self.caches.parties.set(party_id, party.clone());

        info!(
            "📋 Playlist publicada para party {} ({} canciones)",
            party_id,
            playlist.len()
        );
        Ok(party)
    }

    /// Drops the cached playlist; the next read rebuilds it from the store.
    pub fn evict(&self, party_id: RecordId) {
        self.caches.playlists.remove(&party_id);
    }
}

/// Parses a published snapshot back into its rows.
pub fn parse_snapshot(cached_playlist: &str) -> Result<Vec<PlaylistSnapshotItem>, serde_json::Error> {
    serde_json::from_str(cached_playlist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSizes;
    use crate::models::{NewParty, NewPlaylistEntry, NewSong};
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    struct Fixture {
        store: Arc<MemoryStore>,
        caches: Arc<CacheRegistry>,
        manager: PlaylistCacheManager,
        party: Party,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let caches = Arc::new(CacheRegistry::new(CacheSizes::default()).unwrap());
        let manager = PlaylistCacheManager::new(store.clone(), caches.clone());
        let party = store
            .insert_party(NewParty {
                owner_id: "owner".to_string(),
                name: "Friday".to_string(),
                join_code: "ABCD".to_string(),
            })
            .await
            .unwrap();

        Fixture {
            store,
            caches,
            manager,
            party,
        }
    }

    async fn queue(fixture: &Fixture, spotify_id: &str, likes: i64) -> PlaylistEntry {
        let song = fixture
            .store
            .insert_song(NewSong {
                spotify_id: spotify_id.to_string(),
                artist: "Artist".to_string(),
                title: spotify_id.to_uppercase(),
                album: "Album".to_string(),
                art_url: String::new(),
            })
            .await
            .unwrap();
        let mut entry = fixture
            .store
            .insert_entry(NewPlaylistEntry {
                party_id: fixture.party.id,
                song_id: song.id,
                added_by: "guest".to_string(),
            })
            .await
            .unwrap();
        entry.num_likes = likes;
        update_entry_score(&mut entry);
        fixture.store.save_entry(&entry).await.unwrap();
        entry
    }

    fn ids(items: &[PlaylistSnapshotItem]) -> Vec<&str> {
        items.iter().map(|item| item.spotify_id.as_str()).collect()
    }

    #[test]
    fn test_ranked_breaks_ties_by_insertion_order() {
        let song = |id: RecordId| crate::models::Song {
            id,
            spotify_id: format!("s{}", id),
            artist: String::new(),
            title: String::new(),
            album: String::new(),
            art_url: String::new(),
        };
        let entry = |id: RecordId, score: i64| PlaylistEntry {
            id,
            party_id: 1,
            song: song(id),
            num_likes: score,
            score,
            added_by: "u".to_string(),
            added_at: Utc::now(),
        };

        let playlist =
            PartyPlaylist::from_entries(vec![entry(4, 1), entry(2, 1), entry(3, 5), entry(1, 0)]);

        let order: Vec<RecordId> = playlist.ranked().iter().map(|e| e.id).collect();
        assert_eq!(order, vec![3, 2, 4, 1]);
        assert_eq!(playlist.top().map(|e| e.id), Some(3));
    }

    #[tokio::test]
    async fn test_get_cached_playlist_rebuilds_on_miss() {
        let fixture = fixture().await;
        queue(&fixture, "a", 0).await;
        queue(&fixture, "b", 3).await;

        assert!(!fixture.caches.playlists.contains(&fixture.party.id));
        let playlist = fixture.manager.get_cached_playlist(fixture.party.id).await.unwrap();
        assert_eq!(playlist.len(), 2);
        assert!(fixture.caches.playlists.contains(&fixture.party.id));

        fixture.manager.evict(fixture.party.id);
        let rebuilt = fixture.manager.get_cached_playlist(fixture.party.id).await.unwrap();
        assert_eq!(rebuilt, playlist);
    }

    #[tokio::test]
    async fn test_snapshot_matches_cached_playlist() {
        let fixture = fixture().await;
        queue(&fixture, "a", 1).await;
        queue(&fixture, "b", 4).await;
        queue(&fixture, "c", 1).await;

        let playlist = fixture.manager.get_cached_playlist(fixture.party.id).await.unwrap();
        let party = fixture
            .manager
            .indicate_playlist_updated(fixture.party.id)
            .await
            .unwrap();

        let published = parse_snapshot(&party.cached_playlist).unwrap();
        assert_eq!(ids(&published), vec!["b", "a", "c"]);
        assert!(published.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(
            published.iter().map(|i| i.score).sum::<i64>(),
            playlist.ranked().iter().map(|e| e.score).sum::<i64>()
        );
        assert!(party.playlist_last_updated_at.is_some());

        let stored = fixture.store.find_party(fixture.party.id).await.unwrap().unwrap();
        assert_eq!(stored.cached_playlist, party.cached_playlist);
        assert_eq!(fixture.caches.parties.get(&fixture.party.id), Some(party));
    }

    #[tokio::test]
    async fn test_add_and_remove_republish() {
        let fixture = fixture().await;
        let a = queue(&fixture, "a", 0).await;
        fixture.manager.get_cached_playlist(fixture.party.id).await.unwrap();

        let b = queue(&fixture, "b", 2).await;
        let party = fixture
            .manager
            .add_entry_to_playlist(fixture.party.id, b.clone())
            .await
            .unwrap();
        assert_eq!(ids(&parse_snapshot(&party.cached_playlist).unwrap()), vec!["b", "a"]);

        fixture.store.destroy_entry(b.id).await.unwrap();
        let party = fixture
            .manager
            .remove_entry_from_playlist(fixture.party.id, &b)
            .await
            .unwrap();
        assert_eq!(ids(&parse_snapshot(&party.cached_playlist).unwrap()), vec!["a"]);

        let playlist = fixture.manager.get_cached_playlist(fixture.party.id).await.unwrap();
        assert_eq!(playlist.get("a").map(|e| e.id), Some(a.id));
        assert!(!playlist.contains("b"));
    }

    #[tokio::test]
    async fn test_unknown_party_is_not_found() {
        let fixture = fixture().await;
        let error = fixture.manager.indicate_playlist_updated(999).await.unwrap_err();
        assert!(matches!(error, PartyError::NotFound { entity: "Party", .. }));
    }
}
