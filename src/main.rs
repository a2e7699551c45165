use anyhow::{Context as _, Result};
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::player::{PlaybackController, PlayerSettings, StreamOpener};
use crate::audio::transcoder::{ProcessRegistry, Transcoder};
use crate::audio::voice::SongbirdTransport;
use crate::bot::{notifier::ChannelNotifier, permissions::PermissionGate, LagMusicBot};
use crate::config::Config;
use crate::sources::{AudioUrlResolver, SpotifyClient, TrackResolver, YtDlpClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lag_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Lag Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("⚙️ {}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Fuentes de metadatos
    let youtube = Arc::new(YtDlpClient::new(config.ytdlp_path.clone(), config.probe_timeout));
    let spotify = Arc::new(SpotifyClient::new(&config.user_agent, config.probe_timeout)?);
    let resolver = Arc::new(TrackResolver::new(
        youtube.clone(),
        spotify,
        config.max_playlist_size,
    ));

    // Audio: proxies + ffmpeg
    let registry = Arc::new(ProcessRegistry::new());
    let transcoder = Transcoder::new(config.ffmpeg_path.clone(), config.user_agent.clone(), registry.clone());
    let audio = Arc::new(StreamOpener::new(AudioUrlResolver::new(&config)?, transcoder));

    let manager = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));

    let controller = PlaybackController::new(
        Arc::new(SongbirdTransport::new(manager.clone())),
        audio,
        youtube,
        Arc::new(ChannelNotifier::new(http)),
        PlayerSettings::from(&*config),
    );

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = LagMusicBot::new(
        config.clone(),
        controller,
        resolver,
        Arc::new(PermissionGate::new()),
    );

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await
        .context("Error al crear el cliente de Discord")?;

    // Manejar shutdown: matar cualquier ffmpeg que siga vivo
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.kill_all();
        std::process::exit(0);
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!("⚠️ No se pudo escuchar SIGTERM: {:?}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
