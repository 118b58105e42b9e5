//! Lógica de los comandos y botones, sin depender de serenity.
//!
//! Cada handler recibe lo que ya se extrajo de la interacción y devuelve la
//! [`Reply`] que hay que mandar al usuario. El glue de serenity en
//! `handlers.rs` se encarga de enviarla una sola vez.

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        engine::{Ack, Event},
        player::AudioPlayer,
        queue::{PlaybackState, Song},
    },
    error::PlayerError,
    sources::{Resolution, ResolvedSource, SourceResolver},
    ui::embeds::{self, truncate_chars, PanelContent, StatusReport},
};

/// Respuesta a una interacción.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: Option<String>,
    pub embed: Option<PanelContent>,
    pub ephemeral: bool,
}

impl Reply {
    pub fn public(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
            ephemeral: false,
        }
    }

    pub fn private(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
            ephemeral: true,
        }
    }

    pub fn private_embed(embed: PanelContent) -> Self {
        Self {
            content: None,
            embed: Some(embed),
            ephemeral: true,
        }
    }

    fn from_error(err: &PlayerError) -> Self {
        if err.is_rejection() {
            debug!("🚫 {}", err);
        } else {
            warn!("⚠️ {}", err);
        }
        Self::private(err.to_string())
    }
}

/// Datos de un `/p` ya extraídos de la interacción.
#[derive(Debug, Clone)]
pub struct PlayRequest<'a> {
    pub guild_id: GuildId,
    pub text_channel: ChannelId,
    pub voice_channel: Option<ChannelId>,
    pub requested_by: &'a str,
    pub query: &'a str,
}

pub struct Controller {
    player: Arc<AudioPlayer>,
    resolver: Arc<dyn SourceResolver>,
}

impl Controller {
    pub fn new(player: Arc<AudioPlayer>, resolver: Arc<dyn SourceResolver>) -> Self {
        Self { player, resolver }
    }

    pub fn player(&self) -> &Arc<AudioPlayer> {
        &self.player
    }

    /// `/p`: resuelve la búsqueda, conecta si hace falta y encola.
    pub async fn on_play_request(&self, request: PlayRequest<'_>) -> Reply {
        let Some(voice_channel) = request.voice_channel else {
            return Reply::from_error(&PlayerError::NotInVoice);
        };

        let resolution = match self.resolver.resolve(request.query).await {
            Ok(Some(resolution)) => resolution,
            Ok(None) => {
                info!("🔍 Sin resultados para: {}", request.query);
                return Reply::public(PlayerError::NotFound(request.query.to_string()).to_string());
            }
            Err(e) => {
                warn!("⚠️ Error resolviendo '{}': {:?}", request.query, e);
                let message = match e.downcast_ref::<PlayerError>() {
                    Some(err) => err.to_string(),
                    None => PlayerError::Resolve(truncate_chars(&e.to_string(), 150)).to_string(),
                };
                return Reply::public(message);
            }
        };

        match resolution {
            Resolution::Single(source) => {
                self.enqueue_song(&request, voice_channel, source).await
            }
            Resolution::Playlist { name, entries } => {
                self.enqueue_playlist(&request, voice_channel, name, entries)
                    .await
            }
        }
    }

    async fn enqueue_song(
        &self,
        request: &PlayRequest<'_>,
        voice_channel: ChannelId,
        source: ResolvedSource,
    ) -> Reply {
        let song = Song::from_source(source, request.requested_by);
        let title = song.title.clone();
        // La conexión de voz se decide dentro de la transición, con la cola bloqueada.
        let outcome = self
            .player
            .dispatch(
                request.guild_id,
                Event::Enqueue {
                    song,
                    text_channel: request.text_channel,
                    voice_channel,
                },
            )
            .await;

        match outcome {
            Ok(Ack::Enqueued { started: true, .. }) => {
                Reply::public(format!("▶️ Reproduciendo: **{}**", title))
            }
            Ok(Ack::Enqueued { position, .. }) => Reply::public(format!(
                "✅ **{}** añadida a la cola (posición {})",
                title, position
            )),
            Ok(other) => {
                warn!("Respuesta inesperada al encolar: {:?}", other);
                Reply::public(format!("✅ **{}** añadida a la cola", title))
            }
            Err(e) => Reply::public(e.to_string()),
        }
    }

    async fn enqueue_playlist(
        &self,
        request: &PlayRequest<'_>,
        voice_channel: ChannelId,
        name: String,
        entries: Vec<ResolvedSource>,
    ) -> Reply {
        let songs = entries
            .into_iter()
            .map(|source| Song::from_source(source, request.requested_by))
            .collect();
        let outcome = self
            .player
            .dispatch(
                request.guild_id,
                Event::EnqueuePlaylist {
                    name: name.clone(),
                    songs,
                    text_channel: request.text_channel,
                    voice_channel,
                },
            )
            .await;

        match outcome {
            Ok(Ack::PlaylistEnqueued {
                added,
                started: true,
            }) => Reply::public(format!(
                "▶️ Reproduciendo playlist: **{}** ({} canciones)",
                name, added
            )),
            Ok(Ack::PlaylistEnqueued { added, .. }) => Reply::public(format!(
                "✅ Playlist **{}** añadida a la cola ({} canciones)",
                name, added
            )),
            Ok(other) => {
                warn!("Respuesta inesperada al encolar playlist: {:?}", other);
                Reply::public(format!("✅ Playlist **{}** añadida a la cola", name))
            }
            Err(e) => Reply::public(e.to_string()),
        }
    }

    /// `/join`: conecta al canal de voz del usuario.
    pub async fn on_join(&self, guild_id: GuildId, voice_channel: Option<ChannelId>) -> Reply {
        let Some(voice_channel) = voice_channel else {
            return Reply::from_error(&PlayerError::NotInVoice);
        };

        match self.player.connect(guild_id, voice_channel).await {
            Ok(()) => Reply::public("✅ Conectado correctamente! Ahora prueba `/p`"),
            Err(e) => {
                error!("❌ Error en /join para guild {}: {:?}", guild_id, e);
                Reply::public(PlayerError::Connect.to_string())
            }
        }
    }

    /// `/status`: informe privado del estado del bot en el guild.
    pub fn on_status(&self, guild_id: GuildId, user_voice_channel: Option<String>) -> Reply {
        let session = self.player.registry().session(guild_id);
        let state = PlaybackState::of(session.as_ref());

        let report = StatusReport {
            user_voice_channel,
            queue_active: session.is_some(),
            playing: state == PlaybackState::Playing,
            paused: state == PlaybackState::Paused,
            songs: session.as_ref().map_or(0, |s| s.remaining()),
            current_title: session.as_ref().map(|s| s.current().title.clone()),
        };

        Reply::private(embeds::render_status(&report))
    }

    pub async fn on_pause_resume_toggle(&self, guild_id: GuildId) -> Reply {
        match self.player.dispatch(guild_id, Event::TogglePause).await {
            Ok(Ack::Paused) => Reply::private("⏸️ Música pausada."),
            Ok(_) => Reply::private("▶️ Música reanudada."),
            Err(e) => Reply::from_error(&e),
        }
    }

    pub async fn on_skip(&self, guild_id: GuildId) -> Reply {
        match self.player.dispatch(guild_id, Event::Skip).await {
            Ok(_) => Reply::private("⏭️ Canción saltada."),
            Err(e) => Reply::from_error(&e),
        }
    }

    pub async fn on_stop(&self, guild_id: GuildId) -> Reply {
        match self.player.dispatch(guild_id, Event::Stop).await {
            Ok(_) => Reply::private("🛑 Música detenida y cola vaciada."),
            Err(e) => Reply::from_error(&e),
        }
    }

    pub fn on_view_queue(&self, guild_id: GuildId) -> Reply {
        match self.player.listing(guild_id) {
            Some(listing) => Reply::private_embed(embeds::render_queue(&listing)),
            None => Reply::private("🕳️ Cola vacía."),
        }
    }

    pub async fn on_clear_queue(&self, guild_id: GuildId) -> Reply {
        match self.player.dispatch(guild_id, Event::ClearQueue).await {
            Ok(Ack::Cleared { kept, .. }) => {
                Reply::private(format!("🗑️ Cola limpiada. Solo queda: **{}**", kept))
            }
            Ok(other) => {
                warn!("Respuesta inesperada al limpiar la cola: {:?}", other);
                Reply::private("🗑️ Cola limpiada.")
            }
            Err(e) => Reply::from_error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            engine::PlaybackPolicy,
            player::signal_channel,
            registry::Registry,
        },
        testing::{FakeChannel, FakeResolver, FakeTransport, TransportCall},
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn guild() -> GuildId {
        GuildId::new(9)
    }

    struct Fixture {
        controller: Controller,
        channel: Arc<FakeChannel>,
        transport: Arc<FakeTransport>,
    }

    fn fixture(resolver: FakeResolver) -> Fixture {
        let channel = Arc::new(FakeChannel::default());
        let transport = Arc::new(FakeTransport::default());
        let (signals, _receiver) = signal_channel();
        let player = Arc::new(AudioPlayer::new(
            Arc::new(Registry::new()),
            transport.clone(),
            channel.clone(),
            PlaybackPolicy::default(),
            Duration::from_secs(5),
            signals,
        ));

        Fixture {
            controller: Controller::new(player, Arc::new(resolver)),
            channel,
            transport,
        }
    }

    fn request<'a>(query: &'a str, voice: Option<ChannelId>) -> PlayRequest<'a> {
        PlayRequest {
            guild_id: guild(),
            text_channel: ChannelId::new(11),
            voice_channel: voice,
            requested_by: "ana",
            query,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resolver_miss_leaves_guild_idle() {
        let f = fixture(FakeResolver::default());

        let reply = f
            .controller
            .on_play_request(request("nada", Some(ChannelId::new(2))))
            .await;

        assert_eq!(
            reply.content.as_deref(),
            Some("❌ No se encontró nada para: **nada**")
        );
        assert!(!f.controller.player().registry().has_session(guild()));
        assert!(f.controller.player().registry().panel(guild()).is_none());
        assert!(f.channel.calls().is_empty());
        assert!(f.transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn play_requires_voice_channel() {
        let f = fixture(FakeResolver::default().with("lofi", "Lofi"));

        let reply = f.controller.on_play_request(request("lofi", None)).await;

        assert_eq!(reply, Reply::private("❌ Debes estar en un canal de voz."));
    }

    #[tokio::test(start_paused = true)]
    async fn first_play_connects_and_shows_panel() {
        let f = fixture(
            FakeResolver::default()
                .with("lofi", "Lofi")
                .with("jazz", "Jazz"),
        );

        let first = f
            .controller
            .on_play_request(request("lofi", Some(ChannelId::new(2))))
            .await;
        let second = f
            .controller
            .on_play_request(request("jazz", Some(ChannelId::new(2))))
            .await;

        assert_eq!(first.content.as_deref(), Some("▶️ Reproduciendo: **Lofi**"));
        assert_eq!(
            second.content.as_deref(),
            Some("✅ **Jazz** añadida a la cola (posición 1)")
        );
        assert_eq!(
            f.transport.calls()[0],
            TransportCall::Connect(ChannelId::new(2))
        );
        assert_eq!(f.channel.live_messages(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn controls_report_rejections_privately() {
        let f = fixture(FakeResolver::default());

        assert_eq!(
            f.controller.on_skip(guild()).await,
            Reply::private("❌ No hay música reproduciéndose.")
        );
        assert_eq!(
            f.controller.on_clear_queue(guild()).await,
            Reply::private("❌ No hay canciones en cola para limpiar.")
        );
        assert_eq!(
            f.controller.on_view_queue(guild()),
            Reply::private("🕳️ Cola vacía.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_and_clear_through_buttons() {
        let f = fixture(
            FakeResolver::default()
                .with("a", "A")
                .with("b", "B"),
        );
        for query in ["a", "b"] {
            f.controller
                .on_play_request(request(query, Some(ChannelId::new(2))))
                .await;
        }

        assert_eq!(
            f.controller.on_pause_resume_toggle(guild()).await,
            Reply::private("⏸️ Música pausada.")
        );
        assert_eq!(
            f.controller.on_pause_resume_toggle(guild()).await,
            Reply::private("▶️ Música reanudada.")
        );
        assert_eq!(
            f.controller.on_clear_queue(guild()).await,
            Reply::private("🗑️ Cola limpiada. Solo queda: **A**")
        );

        let status = f.controller.on_status(guild(), None);
        let text = status.content.expect("status");
        assert!(text.contains("🎵 Canción actual: A"));
        assert!(text.contains("📝 Canciones en cola: 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn playlist_link_queues_every_entry_once() {
        let f = fixture(FakeResolver::default().with_playlist(
            "https://www.youtube.com/playlist?list=PL1",
            "Mix",
            &["A", "B", "C"],
        ));

        let reply = f
            .controller
            .on_play_request(request(
                "https://www.youtube.com/playlist?list=PL1",
                Some(ChannelId::new(2)),
            ))
            .await;

        assert_eq!(
            reply.content.as_deref(),
            Some("▶️ Reproduciendo playlist: **Mix** (3 canciones)")
        );
        assert_eq!(f.transport.started().len(), 1);
        assert_eq!(
            f.controller.on_view_queue(guild()).embed.map(|e| e.footer),
            Some(Some("Total: 3 canción(es)".to_string()))
        );
        assert!(f
            .channel
            .said()
            .contains(&"🧾 Playlist añadida: **Mix** (3 canciones)".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_voice_connection_is_reported() {
        let f = fixture(FakeResolver::default().with("lofi", "Lofi"));
        f.transport.fail_connects(true);

        let reply = f
            .controller
            .on_play_request(request("lofi", Some(ChannelId::new(2))))
            .await;

        assert_eq!(reply.content, Some(PlayerError::Connect.to_string()));
        assert!(!f.controller.player().registry().has_session(guild()));
    }
}
