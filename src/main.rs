use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use open_party::config::Config;
use open_party::jobs::{remove_song_url_prefixes, run_then_save, JobStatus};
use open_party::sources::{SpotifyClient, TrackSearch};
use open_party::storage::{MemoryStore, Store};
use open_party::OpenParty;

const USAGE: &str = "uso: open-party <build-search-cache | consolidate-search-cache | remove-song-url-prefixes | health-check>";

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_party=debug".parse()?),
        )
        .init();

    info!("🎉 Iniciando Open Party v{}", env!("CARGO_PKG_VERSION"));

    let Some(command) = std::env::args().nth(1) else {
        anyhow::bail!(USAGE);
    };

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Inicializar almacenamiento JSON
    let store = Arc::new(MemoryStore::open(&config.data_dir).await?);
    info!("💾 {}", store.stats());

    let source = Arc::new(SpotifyClient::new(
        config.spotify_client_id.clone(),
        config.spotify_client_secret.clone(),
    )?);
    let app = OpenParty::new(&config, store.clone(), source.clone())?;

    let outcome = run_then_save(&store, async {
        tokio::select! {
            result = run(&command, &config, &app, source.as_ref()) => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("⚠️ Señal de shutdown recibida, guardando estado...");
                Ok(())
            }
        }
    })
    .await;

    app.shutdown();
    outcome
}

async fn run(command: &str, config: &Config, app: &OpenParty, source: &dyn TrackSearch) -> Result<()> {
    match command {
        "build-search-cache" => {
            require_credentials(config)?;
            let status = JobStatus::new("build-search-cache");
            let summary = app.warmer().build_search_cache(&status).await?;
            println!("{}", summary);
        }
        "consolidate-search-cache" => {
            let status = JobStatus::new("consolidate-search-cache");
            let summary = app.warmer().consolidate_search_cache(&status).await?;
            println!("{}", summary);
            for query in &summary.merged {
                println!("  {}", query);
            }
        }
        "remove-song-url-prefixes" => {
            let status = JobStatus::new("remove-song-url-prefixes");
            let summary = remove_song_url_prefixes(
                app.store().as_ref(),
                app.caches(),
                &config.art_url_prefix,
                config.scan_chunk_size,
                &status,
            )
            .await?;
            println!("{}", summary);
        }
        "health-check" => health_check(config, app.store().as_ref(), source).await?,
        other => anyhow::bail!("Comando desconocido '{}'\n{}", other, USAGE),
    }

    Ok(())
}

fn require_credentials(config: &Config) -> Result<()> {
    if !config.has_spotify_credentials() {
        anyhow::bail!("SPOTIFY_CLIENT_ID y SPOTIFY_CLIENT_SECRET son necesarios para buscar");
    }
    Ok(())
}

async fn health_check(config: &Config, store: &dyn Store, source: &dyn TrackSearch) -> Result<()> {
    // Verificar almacenamiento y búsqueda remota
    store.songs_page(None, 1).await?;

    if config.has_spotify_credentials() {
        source.search("health check", 1).await?;
        info!("✅ {} responde", source.source_name());
    } else {
        warn!("⚠️ Sin credenciales de Spotify, búsqueda remota no verificada");
    }

    println!("OK");
    Ok(())
}
