use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
#[cfg(test)]
mod testing;
mod ui;

use crate::audio::{
    player::{signal_channel, AudioPlayer},
    registry::Registry,
    transport::SongbirdTransport,
};
use crate::bot::{controller::Controller, messenger::SerenityChannel, MusicBot};
use crate::config::Config;
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("panel_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Panel Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);

    let resolver = Arc::new(YtDlpResolver::new(config.ytdlp_path.clone()));

    if std::env::args().any(|arg| arg == "--health-check") {
        let version = resolver.verify().await?;
        println!("OK (yt-dlp {})", version);
        return Ok(());
    }

    info!("⚙️ {}", config.summary());

    // Estado por guild y canal de señales del transporte
    let registry = Arc::new(Registry::new());
    let (signals, signal_rx) = signal_channel();

    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));
    let transport = Arc::new(SongbirdTransport::new(songbird.clone(), signals.clone())?);
    let messenger = Arc::new(SerenityChannel::new(http));

    let player = Arc::new(AudioPlayer::new(
        registry,
        transport,
        messenger,
        config.policy(),
        config.panel_refresh_period(),
        signals,
    ));
    tokio::spawn(Arc::clone(&player).run(signal_rx));

    let controller = Arc::new(Controller::new(player.clone(), resolver));
    let handler = MusicBot::new(config.clone(), controller);

    // Intents mínimos: comandos, botones y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        player.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
