//! Domain error types.
//!
//! Cache misses are never errors; they trigger a fallback fetch. Everything in
//! here is either a typed failure the caller must handle (not found, policy
//! violation, exhausted join codes) or an uninterpreted failure from a
//! collaborator (store, remote search).

use thiserror::Error;

use crate::models::RecordId;

/// Errors raised while building caches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Every named cache needs room for at least one entry.
    #[error("Cache '{cache}' must have a capacity greater than 0")]
    ZeroCapacity { cache: &'static str },
}

/// Errors raised by a [`Store`](crate::storage::Store) implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Snapshot file could not be read or written.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Snapshot or cached playlist could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A row referenced by another row does not exist.
    #[error("Missing {entity} with id {id}")]
    Missing { entity: &'static str, id: RecordId },
}

/// Errors surfaced to callers of the party, playlist and search services.
#[derive(Error, Debug)]
pub enum PartyError {
    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// Only the party owner may perform this operation.
    #[error("User {user} is not the owner of party {party}")]
    NotOwner { party: RecordId, user: String },
    /// The song is already queued in this party.
    #[error("Song {spotify_id} is already in the playlist")]
    SongAlreadyInPlaylist { spotify_id: String },
    /// The user already liked this entry.
    #[error("User {user} already liked song {spotify_id}")]
    AlreadyLiked { spotify_id: String, user: String },
    /// The user has not liked this entry.
    #[error("User {user} has not liked song {spotify_id}")]
    NotLiked { spotify_id: String, user: String },
    /// Nothing is queued.
    #[error("Playlist of party {party} is empty")]
    EmptyPlaylist { party: RecordId },
    /// Join code allocation gave up after the retry bound.
    #[error("Could not allocate a unique join code after {attempts} attempts")]
    JoinCodeExhausted { attempts: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Failure from the remote search API, propagated as-is.
    #[error("Remote search failed: {0}")]
    Remote(#[source] anyhow::Error),
}

impl PartyError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
