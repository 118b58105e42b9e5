use anyhow::Result;
use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, error, info, warn};

use super::{
    engine::{self, Ack, Effect, Event, PlaybackPolicy, StepContext},
    queue::{PlayToken, QueueListing},
    registry::{GuildLocks, Registry},
    transport::AudioTransport,
};
use crate::{
    error::PlayerError,
    ui::{
        embeds,
        panel::{PanelChannel, PanelManager},
    },
};

/// Evento asíncrono dirigido a la cola de un guild.
#[derive(Debug, Clone)]
pub struct GuildSignal {
    pub guild_id: GuildId,
    pub event: Event,
}

pub type SignalSender = mpsc::UnboundedSender<GuildSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<GuildSignal>;

pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}

/// Ejecuta las transiciones del motor y sus efectos.
///
/// `dispatch` está serializado por guild: la transición y todos sus efectos
/// terminan antes de que empiece el siguiente evento del mismo guild. Los
/// guilds distintos no se bloquean entre sí.
pub struct AudioPlayer {
    registry: Arc<Registry>,
    transport: Arc<dyn AudioTransport>,
    panels: Arc<PanelManager>,
    messenger: Arc<dyn PanelChannel>,
    policy: PlaybackPolicy,
    signals: SignalSender,
    guild_locks: GuildLocks,
    /// Una tarea por guild con señales pendientes; las procesa en orden.
    signal_workers: DashMap<GuildId, mpsc::UnboundedSender<Event>>,
}

impl AudioPlayer {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn AudioTransport>,
        messenger: Arc<dyn PanelChannel>,
        policy: PlaybackPolicy,
        refresh_period: Duration,
        signals: SignalSender,
    ) -> Self {
        let panels = Arc::new(PanelManager::new(
            registry.clone(),
            messenger.clone(),
            refresh_period,
        ));

        Self {
            registry,
            transport,
            panels,
            messenger,
            policy,
            signals,
            guild_locks: GuildLocks::default(),
            signal_workers: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn listing(&self, guild_id: GuildId) -> Option<QueueListing> {
        self.registry
            .listing(guild_id, self.policy.queue_display_limit)
    }

    /// `/join`: conecta sin tocar la cola, en turno con el resto de eventos.
    pub async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        let lock = self.guild_locks.get(guild_id);
        let result = {
            let _guard = lock.lock().await;
            self.transport.connect(guild_id, channel_id).await
        };
        self.guild_locks.release(guild_id, lock);
        result
    }

    /// Aplica un evento a la cola del guild y ejecuta sus efectos.
    pub async fn dispatch(&self, guild_id: GuildId, event: Event) -> Result<Ack, PlayerError> {
        let lock = self.guild_locks.get(guild_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.dispatch_locked(guild_id, event).await
        };

        if !self.registry.has_session(guild_id) {
            self.guild_locks.release(guild_id, lock);
        }
        outcome
    }

    async fn dispatch_locked(&self, guild_id: GuildId, event: Event) -> Result<Ack, PlayerError> {
        let ctx = StepContext {
            now: Instant::now(),
            fresh_token: self.registry.next_token(),
            policy: &self.policy,
        };
        let (effects, outcome) = self.registry.update(guild_id, |session| {
            let transition = engine::step(session, event, &ctx);
            (
                transition.session,
                (transition.effects, transition.outcome),
            )
        });

        for effect in effects {
            if let Err(err) = self.apply(guild_id, effect).await {
                self.abort_session(guild_id).await;
                return Err(err);
            }
        }

        outcome
    }

    /// Deshace una sesión recién creada cuya conexión de voz falló.
    async fn abort_session(&self, guild_id: GuildId) {
        self.registry.update(guild_id, |_| (None, ()));
        if let Err(e) = self.transport.release(guild_id).await {
            debug!("Nada que liberar en guild {}: {:?}", guild_id, e);
        }
    }

    /// Ejecuta un efecto. Solo un fallo al conectar interrumpe la transición.
    async fn apply(&self, guild_id: GuildId, effect: Effect) -> Result<(), PlayerError> {
        match effect {
            Effect::Connect { channel } => {
                if let Err(e) = self.transport.connect(guild_id, channel).await {
                    error!("❌ Error al conectar en guild {}: {:?}", guild_id, e);
                    return Err(PlayerError::Connect);
                }
            }
            Effect::StartStream { token, locator } => {
                if let Err(e) = self.transport.start(guild_id, &locator, token).await {
                    warn!("⚠️ No se pudo iniciar el stream en guild {}: {:?}", guild_id, e);
                    self.signal(
                        guild_id,
                        Event::Errored {
                            token,
                            detail: e.to_string(),
                        },
                    );
                }
            }
            Effect::PauseStream => {
                if let Err(e) = self.transport.pause(guild_id).await {
                    warn!("⚠️ Error al pausar en guild {}: {:?}", guild_id, e);
                }
            }
            Effect::ResumeStream => {
                if let Err(e) = self.transport.resume(guild_id).await {
                    warn!("⚠️ Error al reanudar en guild {}: {:?}", guild_id, e);
                }
            }
            Effect::StopStream => {
                if let Err(e) = self.transport.stop(guild_id).await {
                    warn!("⚠️ Error al detener el stream en guild {}: {:?}", guild_id, e);
                }
            }
            Effect::ReleaseConnection => {
                if let Err(e) = self.transport.release(guild_id).await {
                    warn!("⚠️ Error al liberar la conexión en guild {}: {:?}", guild_id, e);
                }
            }
            Effect::ShowPanel { token } => self.panels.show_for_song(guild_id, token).await,
            Effect::RefreshPanel => self.panels.refresh(guild_id).await,
            Effect::StartRefreshLoop => self.panels.start_refresh_loop(guild_id),
            Effect::StopRefreshLoop => self.panels.stop_refresh_loop(guild_id),
            Effect::TeardownPanel => self.panels.teardown(guild_id).await,
            Effect::ScheduleAdvance { token, delay } => self.schedule_advance(guild_id, token, delay),
            Effect::Notify { channel, notice } => {
                let text = embeds::render_notice(&notice);
                if let Err(e) = self.messenger.say(channel, &text).await {
                    warn!("⚠️ No se pudo enviar aviso al canal {}: {:?}", channel, e);
                }
            }
        }
        Ok(())
    }

    fn signal(&self, guild_id: GuildId, event: Event) {
        if self.signals.send(GuildSignal { guild_id, event }).is_err() {
            error!("❌ Canal de señales cerrado; evento perdido en guild {}", guild_id);
        }
    }

    fn schedule_advance(&self, guild_id: GuildId, token: PlayToken, delay: Duration) {
        debug!("⏳ Avance programado en {:?} para guild {}", delay, guild_id);
        let signals = self.signals.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = signals.send(GuildSignal {
                guild_id,
                event: Event::AdvanceDue { token },
            });
        });
    }

    /// Bucle de señales del transporte y de los temporizadores.
    ///
    /// Las señales de un mismo guild se aplican en el orden en que llegan;
    /// las de guilds distintos van en paralelo.
    pub async fn run(self: Arc<Self>, mut signals: SignalReceiver) {
        while let Some(GuildSignal { guild_id, event }) = signals.recv().await {
            self.route_signal(guild_id, event);
        }
        info!("📡 Bucle de señales terminado");
    }

    fn route_signal(self: &Arc<Self>, guild_id: GuildId, event: Event) {
        // El envío ocurre con la entrada bloqueada, así que un worker no puede
        // retirarse entre la búsqueda y el envío.
        match self.signal_workers.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                if let Err(mpsc::error::SendError(event)) = entry.get().send(event) {
                    entry.insert(self.spawn_signal_worker(guild_id, event));
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(self.spawn_signal_worker(guild_id, event));
            }
        }
    }

    fn spawn_signal_worker(
        self: &Arc<Self>,
        guild_id: GuildId,
        first: Event,
    ) -> mpsc::UnboundedSender<Event> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _ = tx.send(first);

        let player = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match player.dispatch(guild_id, event).await {
                    Ok(Ack::Ignored) => {}
                    Ok(ack) => debug!("📡 Señal aplicada en guild {}: {:?}", guild_id, ack),
                    Err(e) => debug!("📡 Señal rechazada en guild {}: {}", guild_id, e),
                }

                if !player.registry.has_session(guild_id)
                    && player
                        .signal_workers
                        .remove_if(&guild_id, |_, _| rx.is_empty())
                        .is_some()
                {
                    break;
                }
            }
            debug!("📡 Worker de señales terminado en guild {}", guild_id);
        });

        tx
    }

    /// Detiene todas las sesiones activas (apagado del bot).
    pub async fn shutdown(&self) {
        let guilds = self.registry.active_guilds();
        info!("🛑 Deteniendo {} sesiones activas", guilds.len());

        futures::future::join_all(
            guilds
                .into_iter()
                .map(|guild_id| self.dispatch(guild_id, Event::Stop)),
        )
        .await;
    }
}
