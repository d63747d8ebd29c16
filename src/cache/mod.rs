//! # Cache Module
//!
//! In-process caches for the party backend.
//!
//! Every cache here is a disposable projection of the persistent store: an
//! entry can be evicted at any time (explicitly after a mutation, or
//! implicitly under capacity pressure) and is rebuilt from the store on the
//! next miss. Eviction never deletes the underlying record.
//!
//! ## Cache Types
//!
//! - **Songs**: keyed by `spotify_id`, large, shared by searches and parties
//! - **Searches**: keyed by normalized query string, ordered song snapshots
//! - **Parties**: keyed by party id, small, few parties are active at once
//! - **Playlists**: keyed by party id, the in-memory [`PartyPlaylist`]
//!
//! The registry offers no cross-cache transaction. Each cache is consistent
//! only with respect to its own keys, and each process owns its own cold
//! registry, so staleness between instances is expected.
//!
//! ## Configuration
//!
//! ```env
//! SONG_CACHE_SIZE=20000
//! SEARCH_CACHE_SIZE=1000
//! PARTY_CACHE_SIZE=100
//! PLAYLIST_CACHE_SIZE=100
//! ```

pub mod keyed_lock;
pub mod lru_cache;

pub use keyed_lock::{KeyedGuard, KeyedLocks};
pub use lru_cache::{CacheMetrics, LruCache};

use parking_lot::Mutex;
use std::{borrow::Borrow, hash::Hash, num::NonZeroUsize};
use tracing::{debug, info};

use crate::error::CacheError;
use crate::models::{Party, RecordId, Song};
use crate::playlist::PartyPlaylist;

/// Capacities of the named caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSizes {
    pub songs: usize,
    pub searches: usize,
    pub parties: usize,
    pub playlists: usize,
}

impl Default for CacheSizes {
    fn default() -> Self {
        Self {
            songs: 20_000,
            searches: 1_000,
            parties: 100,
            playlists: 100,
        }
    }
}

/// An [`LruCache`] behind a mutex, tagged with a name for logging.
///
/// The lock is only held for the duration of a single call, never across an
/// await point, so a plain `parking_lot` mutex is enough.
#[derive(Debug)]
pub struct NamedCache<K, V> {
    name: &'static str,
    inner: Mutex<LruCache<K, V>>,
}

impl<K, V> NamedCache<K, V>
where
    K: Clone + Eq + Hash + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str, capacity: usize) -> Result<Self, CacheError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::ZeroCapacity { cache: name })?;
        Ok(Self {
            name,
            inner: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + std::fmt::Debug + ?Sized,
    {
        let value = self.inner.lock().get(key).cloned();
        match value {
            Some(_) => debug!("✅ Cache hit [{}]: {:?}", self.name, key),
            None => debug!("❌ Cache miss [{}]: {:?}", self.name, key),
        }
        value
    }

    pub fn set(&self, key: K, value: V) {
        if let Some((evicted, _)) = self.inner.lock().set(key, value) {
            debug!("♻️ Evicted from [{}]: {:?}", self.name, evicted);
        }
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().remove(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().contains(key)
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.inner.lock().metrics()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub type SongCache = NamedCache<String, Song>;
pub type SearchCache = NamedCache<String, Vec<Song>>;
pub type PartyCache = NamedCache<RecordId, Party>;
pub type PlaylistCache = NamedCache<RecordId, PartyPlaylist>;

/// The fixed set of named caches, built once per process and shared through
/// an `Arc`.
#[derive(Debug)]
pub struct CacheRegistry {
    pub songs: SongCache,
    pub searches: SearchCache,
    pub parties: PartyCache,
    pub playlists: PlaylistCache,
}

impl CacheRegistry {
    pub fn new(sizes: CacheSizes) -> Result<Self, CacheError> {
        let registry = Self {
            songs: NamedCache::new("songs", sizes.songs)?,
            searches: NamedCache::new("searches", sizes.searches)?,
            parties: NamedCache::new("parties", sizes.parties)?,
            playlists: NamedCache::new("playlists", sizes.playlists)?,
        };

        info!(
            "🗄️ Caches listos: songs={}, searches={}, parties={}, playlists={}",
            sizes.songs, sizes.searches, sizes.parties, sizes.playlists
        );
        Ok(registry)
    }

    /// Drops every cached entry. The store is untouched.
    pub fn clear(&self) {
        self.songs.clear();
        self.searches.clear();
        self.parties.clear();
        self.playlists.clear();
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        vec![
            CacheStats::of(&self.songs),
            CacheStats::of(&self.searches),
            CacheStats::of(&self.parties),
            CacheStats::of(&self.playlists),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub name: &'static str,
    pub len: usize,
    pub capacity: usize,
    pub metrics: CacheMetrics,
}

impl CacheStats {
    fn of<K, V>(cache: &NamedCache<K, V>) -> Self
    where
        K: Clone + Eq + Hash + std::fmt::Debug,
        V: Clone,
    {
        Self {
            name: cache.name(),
            len: cache.len(),
            capacity: cache.capacity(),
            metrics: cache.metrics(),
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}/{} entries, {:.1}% hits, {} evictions",
            self.name,
            self.len,
            self.capacity,
            self.metrics.hit_rate() * 100.0,
            self.metrics.evictions
        )
    }
}
