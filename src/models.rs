//! Typed persisted records.
//!
//! Each entity the core touches gets its own record type; the persistent store
//! is the source of truth and caches only ever hold clones of these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identity. Ascending in insertion order.
pub type RecordId = u64;

/// Opaque user identity supplied by the (external) auth layer.
pub type UserId = String;

/// Canonical song row. `spotify_id` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: RecordId,
    pub spotify_id: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub art_url: String,
}

/// A song candidate not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSong {
    pub spotify_id: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub art_url: String,
}

impl NewSong {
    pub fn with_id(self, id: RecordId) -> Song {
        Song {
            id,
            spotify_id: self.spotify_id,
            artist: self.artist,
            title: self.title,
            album: self.album,
            art_url: self.art_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: RecordId,
    pub owner_id: UserId,
    pub name: String,
    pub join_code: String,
    /// Serialized, pre-sorted playlist published by the playlist manager.
    pub cached_playlist: String,
    pub playlist_last_updated_at: Option<DateTime<Utc>>,
    /// Song id of the track currently playing.
    pub currently_playing: Option<RecordId>,
    pub created_at: DateTime<Utc>,
}

impl Party {
    pub fn is_owner(&self, user: &str) -> bool {
        self.owner_id == user
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParty {
    pub owner_id: UserId,
    pub name: String,
    pub join_code: String,
}

/// A song queued in a party, with its song included (join-fetched).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistEntry {
    pub id: RecordId,
    pub party_id: RecordId,
    pub song: Song,
    pub num_likes: i64,
    pub score: i64,
    pub added_by: UserId,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlaylistEntry {
    pub party_id: RecordId,
    pub song_id: RecordId,
    pub added_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: RecordId,
    pub entry_id: RecordId,
    pub user_id: UserId,
}

/// Persisted memo of one remote search. `song_ids` keeps result order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCacheRecord {
    pub id: RecordId,
    pub query: String,
    pub song_ids: Vec<RecordId>,
}

/// One row of the published playlist snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSnapshotItem {
    pub spotify_id: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub art_url: String,
    pub num_likes: i64,
    pub score: i64,
    pub added_by: UserId,
}

impl From<&PlaylistEntry> for PlaylistSnapshotItem {
    fn from(entry: &PlaylistEntry) -> Self {
        Self {
            spotify_id: entry.song.spotify_id.clone(),
            artist: entry.song.artist.clone(),
            title: entry.song.title.clone(),
            album: entry.song.album.clone(),
            art_url: entry.song.art_url.clone(),
            num_likes: entry.num_likes,
            score: entry.score,
            added_by: entry.added_by.clone(),
        }
    }
}
