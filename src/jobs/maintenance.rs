use std::fmt;
use tracing::info;

use super::JobStatus;
use crate::cache::CacheRegistry;
use crate::error::StoreError;
use crate::storage::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceSummary {
    pub scanned: usize,
    pub updated: usize,
}

impl fmt::Display for MaintenanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} canciones revisadas, {} actualizadas", self.scanned, self.updated)
    }
}

/// Strips `prefix` from every stored `art_url`.
///
/// Songs are scanned in pages of `chunk_size` by ascending id until a short
/// page comes back. Cached copies of rewritten songs are refreshed. Search
/// results and playlists embed song copies, so once anything was rewritten
/// both caches are dropped and rebuilt from the store on the next read.
pub async fn remove_song_url_prefixes(
    store: &dyn Store,
    caches: &CacheRegistry,
    prefix: &str,
    chunk_size: usize,
    status: &JobStatus,
) -> Result<MaintenanceSummary, StoreError> {
    let chunk_size = chunk_size.max(1);
    let mut summary = MaintenanceSummary::default();
    let mut after = None;

    loop {
        let page = store.songs_page(after, chunk_size).await?;
        let page_len = page.len();

        for mut song in page {
            after = Some(song.id);
            summary.scanned += 1;

            let Some(stripped) = song.art_url.strip_prefix(prefix) else {
                continue;
            };
            song.art_url = stripped.to_string();
            store.save_song(&song).await?;

            if caches.songs.contains(song.spotify_id.as_str()) {
                caches.songs.set(song.spotify_id.clone(), song);
            }
            summary.updated += 1;
        }

        status.message(format!(
            "{} canciones revisadas ({} actualizadas)",
            summary.scanned, summary.updated
        ));

        if page_len < chunk_size {
            break;
        }
    }

    if summary.updated > 0 {
        caches.searches.clear();
        caches.playlists.clear();
    }

    info!("🖼️ {}", summary);
    Ok(summary)
}
