//! Panel de control vivo: un único mensaje por guild que se reenvía al
//! empezar cada canción y se edita en el sitio para cambios de estado.
//!
//! Toda la I/O del panel de un guild pasa por un mutex asíncrono propio de
//! ese guild, así que un "borrar panel viejo + enviar nuevo" nunca se
//! intercala con otro, ni con un tick del bucle de refresco.

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::embeds::{render_panel, PanelContent};
use crate::audio::{
    queue::PlayToken,
    registry::{GuildLocks, PanelRecord, RefreshLoop, Registry},
};

/// Mensajería con Discord que necesita el panel y los avisos.
#[async_trait]
pub trait PanelChannel: Send + Sync {
    async fn send(&self, channel_id: ChannelId, content: &PanelContent) -> Result<MessageId>;
    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &PanelContent,
    ) -> Result<()>;
    async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()>;
    async fn say(&self, channel_id: ChannelId, text: &str) -> Result<()>;
}

pub struct PanelManager {
    registry: Arc<Registry>,
    channel: Arc<dyn PanelChannel>,
    refresh_period: Duration,
    locks: GuildLocks,
}

impl PanelManager {
    pub fn new(
        registry: Arc<Registry>,
        channel: Arc<dyn PanelChannel>,
        refresh_period: Duration,
    ) -> Self {
        Self {
            registry,
            channel,
            refresh_period,
            locks: GuildLocks::default(),
        }
    }

    /// Sustituye el panel del guild por uno nuevo para la canción `token`.
    ///
    /// Si la sesión ya no existe o suena otra canción, no hace nada.
    pub async fn show_for_song(self: &Arc<Self>, guild_id: GuildId, token: PlayToken) {
        let lock = self.locks.get(guild_id);
        let _guard = lock.lock().await;

        let Some(snapshot) = self.registry.panel_snapshot(guild_id, Instant::now()) else {
            debug!("Panel omitido: guild {} sin sesión", guild_id);
            return;
        };
        if snapshot.token != token {
            debug!("Panel omitido: token {:?} obsoleto", token);
            return;
        }

        self.stop_refresh_loop(guild_id);
        self.delete_current(guild_id).await;

        let content = render_panel(&snapshot.view);
        let message_id = match self.channel.send(snapshot.text_channel, &content).await {
            Ok(id) => id,
            Err(e) => {
                warn!("⚠️ No se pudo enviar el panel en guild {}: {:?}", guild_id, e);
                return;
            }
        };

        // La sesión pudo cambiar mientras se enviaba el mensaje.
        if self.registry.current_token(guild_id) != Some(token) {
            if let Err(e) = self.channel.delete(snapshot.text_channel, message_id).await {
                debug!("No se pudo borrar panel huérfano: {:?}", e);
            }
            return;
        }

        self.registry.panels.insert(
            guild_id,
            PanelRecord {
                channel_id: snapshot.text_channel,
                message_id,
                token,
            },
        );
        info!("🎛️ Panel creado en guild {}", guild_id);

        if !snapshot.view.paused {
            self.spawn_refresh_loop(guild_id);
        }
    }

    /// Edita el panel existente con el estado actual.
    ///
    /// Si la sesión sigue viva pero no tiene panel (por ejemplo, porque el
    /// envío inicial falló), manda uno nuevo y arranca su refresco.
    pub async fn refresh(self: &Arc<Self>, guild_id: GuildId) {
        let lock = self.locks.get(guild_id);
        let _guard = lock.lock().await;

        let had_panel = self.registry.panel(guild_id).is_some();
        if self.refresh_locked(guild_id).await && !had_panel {
            self.start_refresh_loop(guild_id);
        }
    }

    async fn refresh_locked(&self, guild_id: GuildId) -> bool {
        let Some(snapshot) = self.registry.panel_snapshot(guild_id, Instant::now()) else {
            return false;
        };
        let content = render_panel(&snapshot.view);

        let Some(record) = self.registry.panel(guild_id) else {
            info!("🎛️ Guild {} sin panel, enviando uno nuevo", guild_id);
            return self
                .resend_locked(guild_id, snapshot.text_channel, snapshot.token, &content)
                .await;
        };

        match self
            .channel
            .edit(record.channel_id, record.message_id, &content)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "⚠️ No se pudo editar el panel en guild {}, enviando uno nuevo: {:?}",
                    guild_id, e
                );
                self.resend_locked(guild_id, snapshot.text_channel, snapshot.token, &content)
                    .await
            }
        }
    }

    async fn resend_locked(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        token: PlayToken,
        content: &PanelContent,
    ) -> bool {
        self.delete_current(guild_id).await;
        match self.channel.send(channel_id, content).await {
            Ok(message_id) => {
                self.registry.panels.insert(
                    guild_id,
                    PanelRecord {
                        channel_id,
                        message_id,
                        token,
                    },
                );
                true
            }
            Err(e) => {
                warn!("⚠️ Tampoco se pudo reenviar el panel: {:?}", e);
                false
            }
        }
    }

    /// Borra el panel y para el refresco. Se puede llamar varias veces.
    pub async fn teardown(&self, guild_id: GuildId) {
        let lock = self.locks.get(guild_id);
        {
            let _guard = lock.lock().await;

            self.stop_refresh_loop(guild_id);
            if self.delete_current(guild_id).await {
                info!("🧹 Panel eliminado en guild {}", guild_id);
            }
        }
        self.locks.release(guild_id, lock);
    }

    async fn delete_current(&self, guild_id: GuildId) -> bool {
        let Some((_, record)) = self.registry.panels.remove(&guild_id) else {
            return false;
        };
        if let Err(e) = self
            .channel
            .delete(record.channel_id, record.message_id)
            .await
        {
            debug!("Panel ya borrado en guild {}: {:?}", guild_id, e);
        }
        true
    }

    /// Arranca el bucle de refresco si hay panel y la música suena.
    pub fn start_refresh_loop(self: &Arc<Self>, guild_id: GuildId) {
        let playing = self
            .registry
            .session(guild_id)
            .is_some_and(|session| !session.is_paused());
        if playing && self.registry.panel(guild_id).is_some() {
            self.spawn_refresh_loop(guild_id);
        }
    }

    pub fn stop_refresh_loop(&self, guild_id: GuildId) {
        if let Some((_, refresh)) = self.registry.timers.remove(&guild_id) {
            refresh.cancel.cancel();
            debug!("⏹️ Bucle de refresco {} cancelado", refresh.id);
        }
    }

    fn spawn_refresh_loop(self: &Arc<Self>, guild_id: GuildId) {
        let cancel = CancellationToken::new();
        let id = self.registry.next_loop_id();
        if let Some(previous) = self.registry.timers.insert(
            guild_id,
            RefreshLoop {
                id,
                cancel: cancel.clone(),
            },
        ) {
            previous.cancel.cancel();
        }

        let manager = Arc::clone(self);
        let period = self.refresh_period;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if !manager.tick(guild_id, &cancel).await {
                            break;
                        }
                    }
                }
            }

            manager
                .registry
                .timers
                .remove_if(&guild_id, |_, refresh| refresh.id == id);
            debug!("Bucle de refresco {} terminado en guild {}", id, guild_id);
        });
    }

    /// Un ciclo del bucle. Devuelve `false` cuando el bucle debe terminar.
    pub async fn tick(&self, guild_id: GuildId, cancel: &CancellationToken) -> bool {
        let lock = self.locks.get(guild_id);
        let _guard = lock.lock().await;

        if cancel.is_cancelled() {
            return false;
        }
        match self.registry.session(guild_id) {
            Some(session) if !session.is_paused() => {}
            _ => return false,
        }
        if self.registry.panel(guild_id).is_none() {
            return false;
        }

        self.refresh_locked(guild_id).await
    }
}
