use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use super::{Store, StoreResult};
use crate::error::StoreError;
use crate::models::{
    Like, NewParty, NewPlaylistEntry, NewSong, Party, PlaylistEntry, RecordId, SearchCacheRecord,
    Song, UserId,
};

const SNAPSHOT_FILE: &str = "store.json";

/// Persisted playlist entry row; the song is joined on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryRow {
    id: RecordId,
    party_id: RecordId,
    song_id: RecordId,
    num_likes: i64,
    score: i64,
    added_by: UserId,
    added_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    last_id: RecordId,
    songs: BTreeMap<RecordId, Song>,
    parties: BTreeMap<RecordId, Party>,
    entries: BTreeMap<RecordId, EntryRow>,
    likes: BTreeMap<RecordId, Like>,
    search_records: BTreeMap<RecordId, SearchCacheRecord>,
}

impl Tables {
    fn next_id(&mut self) -> RecordId {
        self.last_id += 1;
        self.last_id
    }

    fn hydrate(&self, row: &EntryRow) -> Option<PlaylistEntry> {
        let song = self.songs.get(&row.song_id)?;
        Some(PlaylistEntry {
            id: row.id,
            party_id: row.party_id,
            song: song.clone(),
            num_likes: row.num_likes,
            score: row.score,
            added_by: row.added_by.clone(),
            added_at: row.added_at,
        })
    }

    fn destroy_entry_cascade(&mut self, entry_id: RecordId) {
        self.entries.remove(&entry_id);
        self.likes.retain(|_, like| like.entry_id != entry_id);
    }
}

/// In-process store with optional JSON snapshot persistence.
///
/// Every call is answered from memory. When opened on a data directory the
/// tables are loaded from `store.json` and [`MemoryStore::save`] writes them
/// back, which is how the batch binary keeps state between runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the snapshot in `data_dir`, creating the directory if needed.
    pub async fn open(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).await?;

        let snapshot_path = data_dir.join(SNAPSHOT_FILE);
        let tables = match fs::read_to_string(&snapshot_path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(e.into()),
        };

        let store = Self {
            tables: RwLock::new(tables),
            snapshot_path: Some(snapshot_path),
        };

        info!("📁 Storage inicializado en: {}", data_dir.display());
        info!("{}", store.stats());

        Ok(store)
    }

    /// Writes the snapshot. A store created with [`MemoryStore::new`] has
    /// nowhere to write and this is a no-op.
    pub async fn save(&self) -> StoreResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let content = {
            let tables = self.tables.read();
            serde_json::to_string_pretty(&*tables)?
        };
        fs::write(path, content).await?;

        info!("💾 Snapshot guardado en {}", path.display());
        Ok(())
    }

    pub fn stats(&self) -> StorageStats {
        let tables = self.tables.read();
        StorageStats {
            songs: tables.songs.len(),
            parties: tables.parties.len(),
            playlist_entries: tables.entries.len(),
            likes: tables.likes.len(),
            search_records: tables.search_records.len(),
            snapshot_path: self.snapshot_path.clone(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_song_by_spotify_id(&self, spotify_id: &str) -> StoreResult<Option<Song>> {
        Ok(self
            .tables
            .read()
            .songs
            .values()
            .find(|song| song.spotify_id == spotify_id)
            .cloned())
    }

    async fn find_songs(&self, ids: &[RecordId]) -> StoreResult<Vec<Song>> {
        let tables = self.tables.read();
        Ok(ids
            .iter()
            .filter_map(|id| tables.songs.get(id).cloned())
            .collect())
    }

    async fn insert_song(&self, song: NewSong) -> StoreResult<Song> {
        let mut tables = self.tables.write();
        let song = song.with_id(tables.next_id());
        tables.songs.insert(song.id, song.clone());
        Ok(song)
    }

    async fn save_song(&self, song: &Song) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let slot = tables.songs.get_mut(&song.id).ok_or(StoreError::Missing {
            entity: "song",
            id: song.id,
        })?;
        *slot = song.clone();
        Ok(())
    }

    async fn songs_page(&self, after: Option<RecordId>, limit: usize) -> StoreResult<Vec<Song>> {
        let tables = self.tables.read();
        let start = after.map_or(0, |id| id.saturating_add(1));
        Ok(tables
            .songs
            .range(start..)
            .take(limit)
            .map(|(_, song)| song.clone())
            .collect())
    }

    async fn find_party(&self, id: RecordId) -> StoreResult<Option<Party>> {
        Ok(self.tables.read().parties.get(&id).cloned())
    }

    async fn find_party_by_join_code(&self, join_code: &str) -> StoreResult<Option<Party>> {
        Ok(self
            .tables
            .read()
            .parties
            .values()
            .find(|party| party.join_code == join_code)
            .cloned())
    }

    async fn insert_party(&self, party: NewParty) -> StoreResult<Party> {
        let mut tables = self.tables.write();
        let party = Party {
            id: tables.next_id(),
            owner_id: party.owner_id,
            name: party.name,
            join_code: party.join_code,
            cached_playlist: "[]".to_string(),
            playlist_last_updated_at: None,
            currently_playing: None,
            created_at: Utc::now(),
        };
        tables.parties.insert(party.id, party.clone());
        Ok(party)
    }

    async fn save_party(&self, party: &Party) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let slot = tables.parties.get_mut(&party.id).ok_or(StoreError::Missing {
            entity: "party",
            id: party.id,
        })?;
        *slot = party.clone();
        Ok(())
    }

    async fn destroy_party(&self, id: RecordId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        tables.parties.remove(&id);

        let entry_ids: Vec<RecordId> = tables
            .entries
            .values()
            .filter(|row| row.party_id == id)
            .map(|row| row.id)
            .collect();
        for entry_id in entry_ids {
            tables.destroy_entry_cascade(entry_id);
        }
        Ok(())
    }

    async fn playlist_entries(&self, party_id: RecordId) -> StoreResult<Vec<PlaylistEntry>> {
        let tables = self.tables.read();
        let mut entries: Vec<PlaylistEntry> = tables
            .entries
            .values()
            .filter(|row| row.party_id == party_id)
            .filter_map(|row| {
                let entry = tables.hydrate(row);
                if entry.is_none() {
                    warn!("⚠️ Entrada {} apunta a una canción inexistente", row.id);
                }
                entry
            })
            .collect();

        entries.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    async fn insert_entry(&self, entry: NewPlaylistEntry) -> StoreResult<PlaylistEntry> {
        let mut tables = self.tables.write();
        if !tables.parties.contains_key(&entry.party_id) {
            return Err(StoreError::Missing {
                entity: "party",
                id: entry.party_id,
            });
        }
        if !tables.songs.contains_key(&entry.song_id) {
            return Err(StoreError::Missing {
                entity: "song",
                id: entry.song_id,
            });
        }

        let row = EntryRow {
            id: tables.next_id(),
            party_id: entry.party_id,
            song_id: entry.song_id,
            num_likes: 0,
            score: 0,
            added_by: entry.added_by,
            added_at: Utc::now(),
        };
        let hydrated = tables.hydrate(&row).ok_or(StoreError::Missing {
            entity: "song",
            id: row.song_id,
        })?;
        tables.entries.insert(row.id, row);
        Ok(hydrated)
    }

    async fn save_entry(&self, entry: &PlaylistEntry) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let row = tables.entries.get_mut(&entry.id).ok_or(StoreError::Missing {
            entity: "playlist entry",
            id: entry.id,
        })?;
        row.num_likes = entry.num_likes;
        row.score = entry.score;
        Ok(())
    }

    async fn destroy_entry(&self, id: RecordId) -> StoreResult<()> {
        self.tables.write().destroy_entry_cascade(id);
        Ok(())
    }

    async fn find_like(&self, entry_id: RecordId, user_id: &str) -> StoreResult<Option<Like>> {
        Ok(self
            .tables
            .read()
            .likes
            .values()
            .find(|like| like.entry_id == entry_id && like.user_id == user_id)
            .cloned())
    }

    async fn insert_like(&self, entry_id: RecordId, user_id: &str) -> StoreResult<Like> {
        let mut tables = self.tables.write();
        if !tables.entries.contains_key(&entry_id) {
            return Err(StoreError::Missing {
                entity: "playlist entry",
                id: entry_id,
            });
        }
        let like = Like {
            id: tables.next_id(),
            entry_id,
            user_id: user_id.to_string(),
        };
        tables.likes.insert(like.id, like.clone());
        Ok(like)
    }

    async fn destroy_like(&self, id: RecordId) -> StoreResult<()> {
        self.tables.write().likes.remove(&id);
        Ok(())
    }

    async fn count_likes(&self, entry_id: RecordId) -> StoreResult<usize> {
        Ok(self
            .tables
            .read()
            .likes
            .values()
            .filter(|like| like.entry_id == entry_id)
            .count())
    }

    async fn distinct_search_queries(&self) -> StoreResult<Vec<String>> {
        let tables = self.tables.read();
        let queries: BTreeSet<&String> = tables
            .search_records
            .values()
            .map(|record| &record.query)
            .collect();
        Ok(queries.into_iter().cloned().collect())
    }

    async fn find_search_records(&self, query: &str) -> StoreResult<Vec<SearchCacheRecord>> {
        Ok(self
            .tables
            .read()
            .search_records
            .values()
            .filter(|record| record.query == query)
            .cloned()
            .collect())
    }

    async fn insert_search_record(
        &self,
        query: &str,
        song_ids: Vec<RecordId>,
    ) -> StoreResult<SearchCacheRecord> {
        let mut tables = self.tables.write();
        let record = SearchCacheRecord {
            id: tables.next_id(),
            query: query.to_string(),
            song_ids,
        };
        tables.search_records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn save_search_record(&self, record: &SearchCacheRecord) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let slot = tables
            .search_records
            .get_mut(&record.id)
            .ok_or(StoreError::Missing {
                entity: "search cache record",
                id: record.id,
            })?;
        *slot = record.clone();
        Ok(())
    }

    async fn destroy_search_records(&self, ids: &[RecordId]) -> StoreResult<usize> {
        let mut tables = self.tables.write();
        let mut removed = 0;
        for id in ids {
            if tables.search_records.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Storage statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    pub songs: usize,
    pub parties: usize,
    pub playlist_entries: usize,
    pub likes: usize,
    pub search_records: usize,
    pub snapshot_path: Option<PathBuf>,
}

impl std::fmt::Display for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "📊 Storage Stats:\n\
             📁 Snapshot: {}\n\
             🎵 Songs: {}\n\
             🎉 Parties: {}\n\
             📝 Playlist entries: {} ({} likes)\n\
             🔍 Search cache records: {}",
            self.snapshot_path
                .as_ref()
                .map_or("(in-memory)".to_string(), |p| p.display().to_string()),
            self.songs,
            self.parties,
            self.playlist_entries,
            self.likes,
            self.search_records
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_song(spotify_id: &str) -> NewSong {
        NewSong {
            spotify_id: spotify_id.to_string(),
            artist: "Artist".to_string(),
            title: format!("Title {}", spotify_id),
            album: "Album".to_string(),
            art_url: format!("https://i.scdn.co/image/{}", spotify_id),
        }
    }

    async fn party(store: &MemoryStore, code: &str) -> Party {
        store
            .insert_party(NewParty {
                owner_id: "owner".to_string(),
                name: "Party".to_string(),
                join_code: code.to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_songs_page_walks_ascending_ids() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.insert_song(new_song(&format!("s{}", i))).await.unwrap();
        }

        let first = store.songs_page(None, 2).await.unwrap();
        assert_eq!(first.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);

        let second = store.songs_page(Some(2), 2).await.unwrap();
        assert_eq!(second.iter().map(|s| s.id).collect::<Vec<_>>(), vec![3, 4]);

        let last = store.songs_page(Some(4), 2).await.unwrap();
        assert_eq!(last.len(), 1);
    }

    #[tokio::test]
    async fn test_playlist_entries_sorted_by_score_then_id() {
        let store = MemoryStore::new();
        let party = party(&store, "ABCD").await;
        let a = store.insert_song(new_song("a")).await.unwrap();
        let b = store.insert_song(new_song("b")).await.unwrap();
        let c = store.insert_song(new_song("c")).await.unwrap();

        let mut entries = Vec::new();
        for song in [&a, &b, &c] {
            let entry = store
                .insert_entry(NewPlaylistEntry {
                    party_id: party.id,
                    song_id: song.id,
                    added_by: "u".to_string(),
                })
                .await
                .unwrap();
            entries.push(entry);
        }

        let mut entry_c = entries.pop().unwrap();
        entry_c.num_likes = 2;
        entry_c.score = 2;
        store.save_entry(&entry_c).await.unwrap();

        let order: Vec<String> = store
            .playlist_entries(party.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.song.spotify_id)
            .collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_destroy_party_cascades() {
        let store = MemoryStore::new();
        let party = party(&store, "ABCD").await;
        let song = store.insert_song(new_song("a")).await.unwrap();
        let entry = store
            .insert_entry(NewPlaylistEntry {
                party_id: party.id,
                song_id: song.id,
                added_by: "u".to_string(),
            })
            .await
            .unwrap();
        store.insert_like(entry.id, "u").await.unwrap();

        store.destroy_party(party.id).await.unwrap();

        assert!(store.find_party(party.id).await.unwrap().is_none());
        assert!(store.playlist_entries(party.id).await.unwrap().is_empty());
        assert_eq!(store.count_likes(entry.id).await.unwrap(), 0);
        // songs outlive parties
        assert!(store.find_song_by_spotify_id("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_insert_entry_requires_song() {
        let store = MemoryStore::new();
        let party = party(&store, "ABCD").await;

        let result = store
            .insert_entry(NewPlaylistEntry {
                party_id: party.id,
                song_id: 999,
                added_by: "u".to_string(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::Missing { id: 999, .. })));
    }

    #[tokio::test]
    async fn test_search_records_distinct_queries() {
        let store = MemoryStore::new();
        store.insert_search_record("beatles", vec![1]).await.unwrap();
        store.insert_search_record("abba", vec![2]).await.unwrap();
        store.insert_search_record("beatles", vec![3]).await.unwrap();

        assert_eq!(
            store.distinct_search_queries().await.unwrap(),
            vec!["abba".to_string(), "beatles".to_string()]
        );
        assert_eq!(store.find_search_records("beatles").await.unwrap().len(), 2);

        let removed = store.destroy_search_records(&[1, 99]).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = MemoryStore::open(dir.path()).await.unwrap();
            store.insert_song(new_song("a")).await.unwrap();
            party(&store, "WXYZ").await;
            store.save().await.unwrap();
        }

        let reopened = MemoryStore::open(dir.path()).await.unwrap();
        let stats = reopened.stats();
        assert_eq!(stats.songs, 1);
        assert_eq!(stats.parties, 1);
        assert!(reopened
            .find_party_by_join_code("WXYZ")
            .await
            .unwrap()
            .is_some());

        // ids keep increasing after reload
        let song = reopened.insert_song(new_song("b")).await.unwrap();
        assert_eq!(song.id, 3);
    }
}
