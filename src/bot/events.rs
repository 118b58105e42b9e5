use serenity::{async_trait, model::id::GuildId};
use songbird::{
    tracks::PlayMode, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
};
use tracing::debug;

use crate::audio::{
    engine::Event,
    player::{GuildSignal, SignalSender},
    queue::PlayToken,
};

/// Qué evento de songbird escucha un [`TrackLifecycleHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Started,
    Finished,
    Errored,
}

/// Convierte eventos de un track en señales para la cola del guild.
///
/// Cada track lleva su propio token, así que un evento tardío de una canción
/// anterior llega con un token viejo y el motor lo descarta.
pub struct TrackLifecycleHandler {
    pub guild_id: GuildId,
    pub token: PlayToken,
    pub kind: LifecycleKind,
    pub signals: SignalSender,
}

impl TrackLifecycleHandler {
    fn event(&self, ctx: &EventContext<'_>) -> Event {
        let token = self.token;
        match self.kind {
            LifecycleKind::Started => Event::Started { token },
            LifecycleKind::Finished => Event::Finished { token },
            LifecycleKind::Errored => Event::Errored {
                token,
                detail: error_detail(ctx),
            },
        }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackLifecycleHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        debug!(
            "📡 Evento {:?} del track {:?} en guild {}",
            self.kind, self.token, self.guild_id
        );

        let signal = GuildSignal {
            guild_id: self.guild_id,
            event: self.event(ctx),
        };
        if self.signals.send(signal).is_err() {
            debug!("Canal de señales cerrado, evento descartado");
        }

        None
    }
}

fn error_detail(ctx: &EventContext<'_>) -> String {
    if let EventContext::Track(track_list) = ctx {
        for (state, _handle) in *track_list {
            if let PlayMode::Errored(e) = &state.playing {
                return format!("{:?}", e);
            }
        }
    }
    "Error desconocido en el stream".to_string()
}
