//! Party lifecycle and playlist voting.
//!
//! Every operation that changes a playlist runs under a per-party lock and
//! ends in the playlist manager republishing the snapshot, so within one
//! process a snapshot is never built from a half-applied mutation.

use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheRegistry, KeyedLocks};
use crate::error::PartyError;
use crate::join_code::JoinCodeAllocator;
use crate::models::{NewParty, NewPlaylistEntry, Party, PlaylistEntry, RecordId, Song};
use crate::playlist::{update_entry_score, PlaylistCacheManager};
use crate::songs::SongCatalog;
use crate::sources::TrackRecord;
use crate::storage::Store;

pub struct PartyService {
    store: Arc<dyn Store>,
    caches: Arc<CacheRegistry>,
    playlists: Arc<PlaylistCacheManager>,
    songs: Arc<SongCatalog>,
    join_codes: JoinCodeAllocator,
    party_locks: KeyedLocks<RecordId>,
}

impl PartyService {
    pub fn new(
        store: Arc<dyn Store>,
        caches: Arc<CacheRegistry>,
        playlists: Arc<PlaylistCacheManager>,
        songs: Arc<SongCatalog>,
        join_codes: JoinCodeAllocator,
    ) -> Self {
        Self {
            store,
            caches,
            playlists,
            songs,
            join_codes,
            party_locks: KeyedLocks::new(),
        }
    }

    pub async fn create_party(&self, owner: &str, name: &str) -> Result<Party, PartyError> {
        let (join_code, _reservation) = self.join_codes.reserve().await?;

        let party = self
            .store
            .insert_party(NewParty {
                owner_id: owner.to_string(),
                name: name.to_string(),
                join_code,
            })
            .await?;
        self.caches.parties.set(party.id, party.clone());

        info!("🎉 Party '{}' creada con código {}", party.name, party.join_code);
        Ok(party)
    }

    pub async fn get_party(&self, party_id: RecordId) -> Result<Party, PartyError> {
        self.playlists.get_party(party_id).await
    }

    pub async fn find_party_by_join_code(&self, join_code: &str) -> Result<Party, PartyError> {
        let join_code = join_code.trim().to_uppercase();
        let party = self
            .store
            .find_party_by_join_code(&join_code)
            .await?
            .ok_or_else(|| PartyError::not_found("Party", &join_code))?;

        self.caches.parties.set(party.id, party.clone());
        Ok(party)
    }

    pub async fn delete_party(&self, party_id: RecordId, user: &str) -> Result<(), PartyError> {
        let _guard = self.party_locks.lock(&party_id).await;
        let party = self.owned_party(party_id, user).await?;

        self.store.destroy_party(party.id).await?;
        self.caches.parties.remove(&party.id);
        self.playlists.evict(party.id);

        info!("🗑️ Party {} eliminada", party.id);
        Ok(())
    }

    /// Queues a searched track. The track is deduplicated into its canonical
    /// song first; a song can be queued at most once per party.
    pub async fn add_song(
        &self,
        party_id: RecordId,
        user: &str,
        track: TrackRecord,
    ) -> Result<PlaylistEntry, PartyError> {
        let _guard = self.party_locks.lock(&party_id).await;
        self.playlists.get_party(party_id).await?;

        let song = self.songs.save_song(track.into()).await?;

        let playlist = self.playlists.get_cached_playlist(party_id).await?;
        if playlist.contains(&song.spotify_id) {
            return Err(PartyError::SongAlreadyInPlaylist {
                spotify_id: song.spotify_id,
            });
        }

        let entry = self
            .store
            .insert_entry(NewPlaylistEntry {
                party_id,
                song_id: song.id,
                added_by: user.to_string(),
            })
            .await?;

        self.playlists
            .add_entry_to_playlist(party_id, entry.clone())
            .await?;

        info!("➕ {} agregó '{}' a la party {}", user, song.title, party_id);
        Ok(entry)
    }

    /// Administrative removal, owner only.
    pub async fn remove_song(
        &self,
        party_id: RecordId,
        user: &str,
        spotify_id: &str,
    ) -> Result<(), PartyError> {
        let _guard = self.party_locks.lock(&party_id).await;
        self.owned_party(party_id, user).await?;

        let entry = self.entry(party_id, spotify_id).await?;
        self.store.destroy_entry(entry.id).await?;
        self.playlists
            .remove_entry_from_playlist(party_id, &entry)
            .await?;

        info!("❌ '{}' eliminada de la party {}", entry.song.title, party_id);
        Ok(())
    }

    pub async fn like_song(
        &self,
        party_id: RecordId,
        user: &str,
        spotify_id: &str,
    ) -> Result<PlaylistEntry, PartyError> {
        let _guard = self.party_locks.lock(&party_id).await;
        let mut entry = self.entry(party_id, spotify_id).await?;

        if self.store.find_like(entry.id, user).await?.is_some() {
            return Err(PartyError::AlreadyLiked {
                spotify_id: spotify_id.to_string(),
                user: user.to_string(),
            });
        }

        self.store.insert_like(entry.id, user).await?;
        self.save_vote(party_id, &mut entry).await?;
        Ok(entry)
    }

    pub async fn unlike_song(
        &self,
        party_id: RecordId,
        user: &str,
        spotify_id: &str,
    ) -> Result<PlaylistEntry, PartyError> {
        let _guard = self.party_locks.lock(&party_id).await;
        let mut entry = self.entry(party_id, spotify_id).await?;

        let like = self
            .store
            .find_like(entry.id, user)
            .await?
            .ok_or_else(|| PartyError::NotLiked {
                spotify_id: spotify_id.to_string(),
                user: user.to_string(),
            })?;

        self.store.destroy_like(like.id).await?;
        self.save_vote(party_id, &mut entry).await?;
        Ok(entry)
    }

    /// Moves the highest ranked entry to "currently playing". Owner only.
    pub async fn play_next(&self, party_id: RecordId, user: &str) -> Result<Song, PartyError> {
        let _guard = self.party_locks.lock(&party_id).await;
        let mut party = self.owned_party(party_id, user).await?;

        let playlist = self.playlists.get_cached_playlist(party_id).await?;
        let entry = playlist
            .top()
            .cloned()
            .ok_or(PartyError::EmptyPlaylist { party: party_id })?;

        party.currently_playing = Some(entry.song.id);
        self.store.save_party(&party).await?;
        self.caches.parties.set(party_id, party);

        self.store.destroy_entry(entry.id).await?;
        self.playlists
            .remove_entry_from_playlist(party_id, &entry)
            .await?;

        info!("▶️ Reproduciendo '{}' en la party {}", entry.song.title, party_id);
        Ok(entry.song)
    }

    /// Recounts the entry's likes from the store, rescores and republishes.
    async fn save_vote(&self, party_id: RecordId, entry: &mut PlaylistEntry) -> Result<(), PartyError> {
        entry.num_likes = self.store.count_likes(entry.id).await? as i64;
        update_entry_score(entry);
        self.store.save_entry(entry).await?;
        self.playlists
            .add_entry_to_playlist(party_id, entry.clone())
            .await?;
        Ok(())
    }

    async fn owned_party(&self, party_id: RecordId, user: &str) -> Result<Party, PartyError> {
        let party = self.playlists.get_party(party_id).await?;
        if !party.is_owner(user) {
            return Err(PartyError::NotOwner {
                party: party_id,
                user: user.to_string(),
            });
        }
        Ok(party)
    }

    /// Entry for the song in the party's cached playlist.
    async fn entry(&self, party_id: RecordId, spotify_id: &str) -> Result<PlaylistEntry, PartyError> {
        self.playlists
            .get_cached_playlist(party_id)
            .await?
            .get(spotify_id)
            .cloned()
            .ok_or_else(|| PartyError::not_found("Playlist entry", spotify_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSizes;
    use crate::join_code::JoinCodeSettings;
    use crate::playlist::parse_snapshot;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    struct Fixture {
        store: Arc<MemoryStore>,
        caches: Arc<CacheRegistry>,
        service: Arc<PartyService>,
    }

    fn fixture() -> Fixture {
        fixture_with_codes(JoinCodeSettings::default())
    }

    fn fixture_with_codes(settings: JoinCodeSettings) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let caches = Arc::new(CacheRegistry::new(CacheSizes::default()).unwrap());
        let playlists = Arc::new(PlaylistCacheManager::new(store.clone(), caches.clone()));
        let songs = Arc::new(SongCatalog::new(store.clone(), caches.clone()));
        let join_codes = JoinCodeAllocator::new(store.clone(), settings);
        let service = Arc::new(PartyService::new(
            store.clone(),
            caches.clone(),
            playlists,
            songs,
            join_codes,
        ));

        Fixture {
            store,
            caches,
            service,
        }
    }

    fn track(spotify_id: &str) -> TrackRecord {
        TrackRecord {
            spotify_id: spotify_id.to_string(),
            artist: "Daft Punk".to_string(),
            title: spotify_id.to_string(),
            album: "Discovery".to_string(),
            art_url: String::new(),
        }
    }

    async fn published(fixture: &Fixture, party_id: RecordId) -> Vec<(String, i64)> {
        let party = fixture.store.find_party(party_id).await.unwrap().unwrap();
        parse_snapshot(&party.cached_playlist)
            .unwrap()
            .into_iter()
            .map(|item| (item.spotify_id, item.num_likes))
            .collect()
    }

    #[tokio::test]
    async fn test_create_and_join_party() {
        let fixture = fixture();
        let party = fixture.service.create_party("dj", "Friday").await.unwrap();

        assert_eq!(party.join_code.len(), 4);
        let joined = fixture
            .service
            .find_party_by_join_code(&party.join_code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(joined.id, party.id);

        let error = fixture.service.find_party_by_join_code("!!!!").await.unwrap_err();
        assert!(matches!(error, PartyError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_parties_get_distinct_codes() {
        let fixture = fixture();

        let mut handles = Vec::new();
        for i in 0..20 {
            let service = fixture.service.clone();
            handles.push(tokio::spawn(async move {
                service.create_party(&format!("dj{}", i), "Party").await.unwrap()
            }));
        }

        let mut codes = Vec::new();
        for handle in handles {
            codes.push(handle.await.unwrap().join_code);
        }
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 20);
    }

    #[tokio::test]
    async fn test_votes_reorder_published_playlist() {
        let fixture = fixture();
        let party = fixture.service.create_party("dj", "Friday").await.unwrap();

        fixture.service.add_song(party.id, "ana", track("one")).await.unwrap();
        fixture.service.add_song(party.id, "bo", track("two")).await.unwrap();
        fixture.service.add_song(party.id, "cy", track("three")).await.unwrap();
        assert_eq!(
            published(&fixture, party.id).await,
            vec![("one".to_string(), 0), ("two".to_string(), 0), ("three".to_string(), 0)]
        );

        fixture.service.like_song(party.id, "ana", "three").await.unwrap();
        fixture.service.like_song(party.id, "bo", "three").await.unwrap();
        fixture.service.like_song(party.id, "bo", "two").await.unwrap();
        assert_eq!(
            published(&fixture, party.id).await,
            vec![("three".to_string(), 2), ("two".to_string(), 1), ("one".to_string(), 0)]
        );

        let entry = fixture.service.unlike_song(party.id, "bo", "three").await.unwrap();
        assert_eq!(entry.num_likes, 1);
        assert_eq!(entry.score, 1);
        // tie between "three" and "two" goes to the earlier addition
        assert_eq!(
            published(&fixture, party.id).await,
            vec![("two".to_string(), 1), ("three".to_string(), 1), ("one".to_string(), 0)]
        );
    }

    #[tokio::test]
    async fn test_policy_violations() {
        let fixture = fixture();
        let party = fixture.service.create_party("dj", "Friday").await.unwrap();
        fixture.service.add_song(party.id, "ana", track("one")).await.unwrap();

        let duplicate = fixture.service.add_song(party.id, "bo", track("one")).await;
        assert!(matches!(duplicate, Err(PartyError::SongAlreadyInPlaylist { .. })));

        fixture.service.like_song(party.id, "ana", "one").await.unwrap();
        let twice = fixture.service.like_song(party.id, "ana", "one").await;
        assert!(matches!(twice, Err(PartyError::AlreadyLiked { .. })));

        let never = fixture.service.unlike_song(party.id, "bo", "one").await;
        assert!(matches!(never, Err(PartyError::NotLiked { .. })));

        let not_owner = fixture.service.remove_song(party.id, "ana", "one").await;
        assert!(matches!(not_owner, Err(PartyError::NotOwner { .. })));

        let missing = fixture.service.like_song(party.id, "ana", "ghost").await;
        assert!(matches!(missing, Err(PartyError::NotFound { .. })));

        let no_party = fixture.service.add_song(999, "ana", track("x")).await;
        assert!(matches!(no_party, Err(PartyError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_play_next_pops_highest_ranked() {
        let fixture = fixture();
        let party = fixture.service.create_party("dj", "Friday").await.unwrap();
        fixture.service.add_song(party.id, "ana", track("one")).await.unwrap();
        fixture.service.add_song(party.id, "ana", track("two")).await.unwrap();
        fixture.service.like_song(party.id, "bo", "two").await.unwrap();

        let song = fixture.service.play_next(party.id, "dj").await.unwrap();
        assert_eq!(song.spotify_id, "two");

        let party_now = fixture.service.get_party(party.id).await.unwrap();
        assert_eq!(party_now.currently_playing, Some(song.id));
        assert_eq!(published(&fixture, party.id).await, vec![("one".to_string(), 0)]);

        fixture.service.play_next(party.id, "dj").await.unwrap();
        let empty = fixture.service.play_next(party.id, "dj").await;
        assert!(matches!(empty, Err(PartyError::EmptyPlaylist { .. })));
    }

    #[tokio::test]
    async fn test_remove_song_and_delete_party() {
        let fixture = fixture();
        let party = fixture.service.create_party("dj", "Friday").await.unwrap();
        fixture.service.add_song(party.id, "ana", track("one")).await.unwrap();
        fixture.service.add_song(party.id, "ana", track("two")).await.unwrap();

        fixture.service.remove_song(party.id, "dj", "one").await.unwrap();
        assert_eq!(published(&fixture, party.id).await, vec![("two".to_string(), 0)]);

        fixture.service.delete_party(party.id, "dj").await.unwrap();
        assert!(fixture.store.find_party(party.id).await.unwrap().is_none());
        assert!(!fixture.caches.parties.contains(&party.id));
        assert!(!fixture.caches.playlists.contains(&party.id));
        // songs are shared and survive the party
        assert!(fixture.caches.songs.contains("one"));
    }

    #[tokio::test]
    async fn test_cached_playlist_survives_eviction() {
        let fixture = fixture();
        let party = fixture.service.create_party("dj", "Friday").await.unwrap();
        fixture.service.add_song(party.id, "ana", track("one")).await.unwrap();
        fixture.service.like_song(party.id, "bo", "one").await.unwrap();

        fixture.caches.clear();

        fixture.service.add_song(party.id, "ana", track("two")).await.unwrap();
        assert_eq!(
            published(&fixture, party.id).await,
            vec![("one".to_string(), 1), ("two".to_string(), 0)]
        );
    }

    #[tokio::test]
    async fn test_like_count_comes_from_stored_likes() {
        let fixture = fixture();
        let party = fixture.service.create_party("dj", "Friday").await.unwrap();
        fixture.service.add_song(party.id, "ana", track("one")).await.unwrap();
        fixture.service.like_song(party.id, "ana", "one").await.unwrap();

        // drift the cached count away from the stored likes
        let mut playlist = fixture.caches.playlists.get(&party.id).unwrap();
        let mut entry = playlist.get("one").cloned().unwrap();
        entry.num_likes = 7;
        playlist.insert(entry);
        fixture.caches.playlists.set(party.id, playlist);

        let entry = fixture.service.like_song(party.id, "bo", "one").await.unwrap();
        assert_eq!(entry.num_likes, 2);
        assert_eq!(entry.score, 2);

        let entry = fixture.service.unlike_song(party.id, "ana", "one").await.unwrap();
        assert_eq!(entry.num_likes, 1);
        assert_eq!(published(&fixture, party.id).await, vec![("one".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_lowercase_alphabet_codes_can_be_joined() {
        let fixture = fixture_with_codes(JoinCodeSettings {
            alphabet: "abcd".to_string(),
            ..JoinCodeSettings::default()
        });
        let party = fixture.service.create_party("dj", "Friday").await.unwrap();
        assert!(party.join_code.chars().all(|c| "ABCD".contains(c)));

        let exact = fixture.service.find_party_by_join_code(&party.join_code).await.unwrap();
        assert_eq!(exact.id, party.id);

        let typed = party.join_code.to_lowercase();
        let joined = fixture.service.find_party_by_join_code(&typed).await.unwrap();
        assert_eq!(joined.id, party.id);
    }
}
