use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod sources;
mod speech;
mod storage;

use crate::audio::{
    registry::GuildRegistry,
    session::SessionDeps,
    songbird_driver::SongbirdGateway,
};
use crate::bot::DisBot;
use crate::config::Config;
use crate::sources::{AutoplaySource, YouTubeClient};
use crate::speech::{HttpSpeechSynthesizer, SpeechSynthesizer};
use crate::storage::JsonStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("disbot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    info!("🎵 Iniciando DisBot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Inicializar almacenamiento JSON
    let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);

    let speech: Arc<dyn SpeechSynthesizer> = Arc::new(HttpSpeechSynthesizer::new(
        config.speech_api_url.clone(),
        config.speech_api_token.clone(),
    )?);

    let youtube = YouTubeClient::new(config.youtube_api_key.clone())?;
    let autoplay: Option<Arc<dyn AutoplaySource>> = if config.youtube_api_key.is_some() {
        Some(Arc::new(youtube.clone()))
    } else {
        warn!("⚠️ YOUTUBE_API_KEY no configurada: autoplay deshabilitado");
        None
    };

    // Songbird compartido entre el cliente y las sesiones de audio
    let songbird = Songbird::serenity();
    let registry = Arc::new(GuildRegistry::new(SessionDeps {
        gateway: Arc::new(SongbirdGateway::new(songbird.clone())),
        configs: storage.clone(),
        speech: speech.clone(),
        autoplay,
        settings: config.engine_settings(),
    }));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = DisBot::new(config.clone(), registry, storage, speech, youtube);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        std::process::exit(0);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    let version = YouTubeClient::ytdlp_version().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
