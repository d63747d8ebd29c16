pub mod spotify;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::NewSong;

pub use spotify::SpotifyClient;

/// API remota de búsqueda de tracks.
///
/// Los errores se devuelven tal cual, sin reintentos.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackSearch: Send + Sync {
    /// Busca tracks en la fuente, en orden de relevancia
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackRecord>>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

/// Un track devuelto por la búsqueda remota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Identificador externo estable
    pub spotify_id: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub art_url: String,
}

impl From<TrackRecord> for NewSong {
    fn from(track: TrackRecord) -> Self {
        Self {
            spotify_id: track.spotify_id,
            artist: track.artist,
            title: track.title,
            album: track.album,
            art_url: track.art_url,
        }
    }
}
