use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cache::CacheSizes;
use crate::join_code::{JoinCodeSettings, DEFAULT_ALPHABET};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Spotify
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub search_result_limit: usize,

    // Caché
    pub song_cache_size: usize,
    pub search_cache_size: usize,
    pub party_cache_size: usize,
    pub playlist_cache_size: usize,

    // Códigos de party
    pub join_code_length: usize,
    pub join_code_alphabet: String,
    pub join_code_max_attempts: usize,

    // Jobs
    pub art_url_prefix: String,
    pub scan_chunk_size: usize,
    pub warm_memory_cache: bool,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Spotify
            spotify_client_id: std::env::var("SPOTIFY_CLIENT_ID").unwrap_or_default(),
            spotify_client_secret: std::env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default(),
            search_result_limit: std::env::var("SEARCH_RESULT_LIMIT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            // Caché
            song_cache_size: std::env::var("SONG_CACHE_SIZE")
                .unwrap_or_else(|_| "20000".to_string())
                .parse()?,
            search_cache_size: std::env::var("SEARCH_CACHE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            party_cache_size: std::env::var("PARTY_CACHE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            playlist_cache_size: std::env::var("PLAYLIST_CACHE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            // Códigos de party
            join_code_length: std::env::var("JOIN_CODE_LENGTH")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,
            join_code_alphabet: std::env::var("JOIN_CODE_ALPHABET")
                .unwrap_or_else(|_| DEFAULT_ALPHABET.to_string()),
            join_code_max_attempts: std::env::var("JOIN_CODE_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            // Jobs
            art_url_prefix: std::env::var("ART_URL_PREFIX")
                .unwrap_or_else(|_| "https://i.scdn.co/image/".to_string()),
            scan_chunk_size: std::env::var("SCAN_CHUNK_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            warm_memory_cache: std::env::var("WARM_MEMORY_CACHE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Sanity checks on loaded values.
    ///
    /// Cache capacities, join code settings, the scan chunk size and the
    /// search limit must all be non-zero; the art URL prefix must be an
    /// absolute URL.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("Song cache size", self.song_cache_size),
            ("Search cache size", self.search_cache_size),
            ("Party cache size", self.party_cache_size),
            ("Playlist cache size", self.playlist_cache_size),
        ];
        for (name, size) in sizes {
            if size == 0 {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if self.search_result_limit == 0 {
            anyhow::bail!("Search result limit must be greater than 0");
        }

        if self.join_code_length == 0 {
            anyhow::bail!("Join code length must be greater than 0");
        }

        if self.join_code_alphabet.is_empty() {
            anyhow::bail!("Join code alphabet cannot be empty");
        }

        if self.join_code_max_attempts == 0 {
            anyhow::bail!("Join code attempts must be greater than 0");
        }

        if self.scan_chunk_size == 0 {
            anyhow::bail!("Scan chunk size must be greater than 0");
        }

        if let Err(e) = url::Url::parse(&self.art_url_prefix) {
            anyhow::bail!("Invalid art URL prefix '{}': {}", self.art_url_prefix, e);
        }

        Ok(())
    }

    pub fn has_spotify_credentials(&self) -> bool {
        !self.spotify_client_id.is_empty() && !self.spotify_client_secret.is_empty()
    }

    pub fn cache_sizes(&self) -> CacheSizes {
        CacheSizes {
            songs: self.song_cache_size,
            searches: self.search_cache_size,
            parties: self.party_cache_size,
            playlists: self.playlist_cache_size,
        }
    }

    pub fn join_code_settings(&self) -> JoinCodeSettings {
        JoinCodeSettings {
            alphabet: self.join_code_alphabet.clone(),
            length: self.join_code_length,
            max_attempts: self.join_code_max_attempts,
        }
    }

    /// Loggable summary, without credentials.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Spotify: credentials {}, limit {}\n  \
            Cache: {} songs, {} searches, {} parties, {} playlists\n  \
            Join codes: {} chars from {} symbols, {} attempts\n  \
            Jobs: chunk {}, warm memory={}\n  \
            Data: {}",
            if self.has_spotify_credentials() { "set" } else { "missing" },
            self.search_result_limit,
            self.song_cache_size,
            self.search_cache_size,
            self.party_cache_size,
            self.playlist_cache_size,
            self.join_code_length,
            self.join_code_alphabet.chars().count(),
            self.join_code_max_attempts,
            self.scan_chunk_size,
            self.warm_memory_cache,
            self.data_dir.display()
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        let sizes = CacheSizes::default();
        let join_codes = JoinCodeSettings::default();

        Self {
            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),
            search_result_limit: 20,

            song_cache_size: sizes.songs,
            search_cache_size: sizes.searches,
            party_cache_size: sizes.parties,
            playlist_cache_size: sizes.playlists,

            join_code_length: join_codes.length,
            join_code_alphabet: join_codes.alphabet,
            join_code_max_attempts: join_codes.max_attempts,

            art_url_prefix: "https://i.scdn.co/image/".to_string(),
            scan_chunk_size: 1000,
            warm_memory_cache: false,

            data_dir: "./data".into(),
        }
    }
}
