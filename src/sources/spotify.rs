use super::{TrackRecord, TrackSearch};
use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SEARCH_URL: &str = "https://api.spotify.com/v1/search";

/// Tokens are refreshed this long before they actually expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    items: Vec<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: String,
    name: String,
    artists: Vec<SpotifyArtist>,
    album: SpotifyAlbum,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    name: String,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

impl From<SpotifyTrack> for TrackRecord {
    fn from(track: SpotifyTrack) -> Self {
        Self {
            spotify_id: track.id,
            artist: track
                .artists
                .into_iter()
                .map(|artist| artist.name)
                .collect::<Vec<_>>()
                .join(", "),
            title: track.name,
            art_url: track
                .album
                .images
                .into_iter()
                .next()
                .map(|image| image.url)
                .unwrap_or_default(),
            album: track.album.name,
        }
    }
}

/// Bearer credential plus the instant it stops being valid.
#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh_at(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

/// Spotify track search over the client credentials flow.
pub struct SpotifyClient {
    client_id: String,
    client_secret: String,
    client: reqwest::Client,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client_id,
            client_secret,
            client,
            token: Mutex::new(None),
        })
    }

    /// Returns the cached credential, refreshing it when it is about to expire.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh_at(Instant::now()) {
                return Ok(token.token.clone());
            }
        }

        let token = self.request_token().await?;
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> Result<AccessToken> {
        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .client
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("❌ Spotify token error: {} - {}", status, error_text);
            anyhow::bail!("Spotify token error: {} - {}", status, error_text);
        }

        let body: TokenResponse = response.json().await?;
        info!("🔑 Token de Spotify renovado (válido {}s)", body.expires_in);

        Ok(AccessToken {
            token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}

#[async_trait]
impl TrackSearch for SpotifyClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackRecord>> {
        debug!("🔍 Búsqueda Spotify: {}", query);

        let token = self.access_token().await?;
        let limit = limit.to_string();
        let response = self
            .client
            .get(SEARCH_URL)
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("❌ Spotify search error: {} - {}", status, error_text);
            anyhow::bail!("Spotify search error: {} - {}", status, error_text);
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.tracks.items.into_iter().map(TrackRecord::from).collect())
    }

    fn source_name(&self) -> &'static str {
        "spotify"
    }
}
