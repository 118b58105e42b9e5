use anyhow::{Context as _, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input, YoutubeDl},
    tracks::TrackHandle,
    Event, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use super::{player::SignalSender, queue::PlayToken};
use crate::{
    bot::events::{LifecycleKind, TrackLifecycleHandler},
    sources::StreamLocator,
};

/// Transporte de audio hacia el canal de voz.
///
/// `start` no bloquea hasta que suene nada: el progreso del stream llega
/// después como señales `Started` / `Finished` / `Errored` etiquetadas con el
/// token que se pasó aquí.
#[async_trait]
pub trait AudioTransport: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()>;
    async fn start(&self, guild_id: GuildId, locator: &StreamLocator, token: PlayToken)
        -> Result<()>;
    async fn pause(&self, guild_id: GuildId) -> Result<()>;
    async fn resume(&self, guild_id: GuildId) -> Result<()>;
    async fn stop(&self, guild_id: GuildId) -> Result<()>;
    async fn release(&self, guild_id: GuildId) -> Result<()>;
}

/// Transporte de producción sobre songbird.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    tracks: DashMap<GuildId, TrackHandle>,
    signals: SignalSender,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, signals: SignalSender) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; Discord Music Bot)")
            .build()?;

        Ok(Self {
            manager,
            http,
            tracks: DashMap::new(),
            signals,
        })
    }

    fn input_for(&self, locator: &StreamLocator) -> Input {
        if locator.is_direct_audio() {
            HttpRequest::new(self.http.clone(), locator.to_string()).into()
        } else {
            YoutubeDl::new(self.http.clone(), locator.to_string()).into()
        }
    }

    fn listen(&self, handle: &TrackHandle, guild_id: GuildId, token: PlayToken) -> Result<()> {
        for (event, kind) in [
            (TrackEvent::Playable, LifecycleKind::Started),
            (TrackEvent::End, LifecycleKind::Finished),
            (TrackEvent::Error, LifecycleKind::Errored),
        ] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackLifecycleHandler {
                        guild_id,
                        token,
                        kind,
                        signals: self.signals.clone(),
                    },
                )
                .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl AudioTransport for SongbirdTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        self.manager
            .join(guild_id, channel_id)
            .await
            .with_context(|| format!("Error al conectar al canal de voz {}", channel_id))?;

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);
        Ok(())
    }

    async fn start(
        &self,
        guild_id: GuildId,
        locator: &StreamLocator,
        token: PlayToken,
    ) -> Result<()> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or_else(|| anyhow::anyhow!("No hay conexión de voz en guild {}", guild_id))?;

        let input = self.input_for(locator);
        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(input)
        };

        self.listen(&handle, guild_id, token)?;
        self.tracks.insert(guild_id, handle);

        debug!("🎵 Stream lanzado en guild {} ({:?})", guild_id, token);
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> Result<()> {
        if let Some(track) = self.tracks.get(&guild_id) {
            track.pause()?;
        }
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> Result<()> {
        if let Some(track) = self.tracks.get(&guild_id) {
            track.play()?;
        }
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<()> {
        if let Some((_, track)) = self.tracks.remove(&guild_id) {
            // Si el track ya terminó, songbird devuelve error: no importa.
            if let Err(e) = track.stop() {
                debug!("Track ya detenido en guild {}: {:?}", guild_id, e);
            }
        }
        Ok(())
    }

    async fn release(&self, guild_id: GuildId) -> Result<()> {
        self.tracks.remove(&guild_id);

        if self.manager.get(guild_id).is_none() {
            return Ok(());
        }

        if let Err(e) = self.manager.remove(guild_id).await {
            warn!("⚠️ Error al salir del canal de voz en guild {}: {:?}", guild_id, e);
        } else {
            info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        }
        Ok(())
    }
}
