//! Máquina de estados de la cola por guild.
//!
//! [`step`] es una función pura: recibe la sesión actual (o `None` si el guild
//! está inactivo), un [`Event`] y un [`StepContext`], y devuelve la sesión
//! siguiente, la lista de [`Effect`]s que el runtime debe ejecutar y el
//! resultado para quien originó el evento. No hace I/O ni lee el reloj.

use serenity::model::id::ChannelId;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::queue::{PlayToken, Session, Song};
use crate::{error::PlayerError, sources::StreamLocator};

/// Reglas de la cola que vienen de la configuración.
#[derive(Debug, Clone)]
pub struct PlaybackPolicy {
    pub max_queue_size: usize,
    pub advance_delay: Duration,
    pub max_consecutive_failures: u32,
    pub failure_window: Duration,
    pub queue_display_limit: usize,
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            advance_delay: Duration::from_millis(1500),
            max_consecutive_failures: 3,
            failure_window: Duration::from_secs(60),
            queue_display_limit: 10,
        }
    }
}

/// Entradas de la máquina de estados.
#[derive(Debug, Clone)]
pub enum Event {
    /// `voice_channel` solo se usa si el guild estaba inactivo.
    Enqueue {
        song: Song,
        text_channel: ChannelId,
        voice_channel: ChannelId,
    },
    /// Varias canciones de una lista, en orden, con un solo aviso.
    EnqueuePlaylist {
        name: String,
        songs: Vec<Song>,
        text_channel: ChannelId,
        voice_channel: ChannelId,
    },
    /// El transporte empezó a emitir audio.
    Started { token: PlayToken },
    /// El stream terminó (normalmente o porque se detuvo).
    Finished { token: PlayToken },
    /// Error al arrancar o en mitad del stream.
    Errored { token: PlayToken, detail: String },
    /// Vence el retardo programado tras un error.
    AdvanceDue { token: PlayToken },
    Pause,
    Resume,
    TogglePause,
    Skip,
    Stop,
    ClearQueue,
    ChannelEmpty,
    Disconnected,
}

/// Órdenes que el runtime ejecuta después de aplicar una transición.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Entrar al canal de voz antes del primer stream de la sesión.
    Connect { channel: ChannelId },
    StartStream { token: PlayToken, locator: StreamLocator },
    PauseStream,
    ResumeStream,
    StopStream,
    ReleaseConnection,
    ShowPanel { token: PlayToken },
    RefreshPanel,
    StartRefreshLoop,
    StopRefreshLoop,
    TeardownPanel,
    ScheduleAdvance { token: PlayToken, delay: Duration },
    Notify { channel: ChannelId, notice: Notice },
}

/// Avisos que se publican en el canal de texto de la sesión.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    NowPlaying { title: String, duration: String },
    Added { title: String, position: usize },
    PlaylistAdded { name: String, count: usize },
    QueueFinished,
    ChannelEmpty,
    Disconnected,
    PlaybackError { title: String, detail: String },
    Halted { failures: u32 },
}

/// Resultado de una operación aceptada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Enqueued { position: usize, started: bool },
    PlaylistEnqueued { added: usize, started: bool },
    Paused,
    Resumed,
    Skipped,
    Stopped,
    Cleared { removed: usize, kept: String },
    Advanced,
    Finished,
    Halted,
    /// Evento obsoleto o sin efecto (token viejo, guild inactivo...).
    Ignored,
}

pub struct StepContext<'a> {
    pub now: Instant,
    /// Token libre para la canción que arranque en esta transición, si alguna.
    pub fresh_token: PlayToken,
    pub policy: &'a PlaybackPolicy,
}

#[derive(Debug)]
pub struct Transition {
    pub session: Option<Session>,
    pub effects: Vec<Effect>,
    pub outcome: Result<Ack, PlayerError>,
}

impl Transition {
    fn accept(session: Option<Session>, effects: Vec<Effect>, ack: Ack) -> Self {
        Self {
            session,
            effects,
            outcome: Ok(ack),
        }
    }

    fn reject(session: Option<Session>, err: PlayerError) -> Self {
        debug!("🚫 Petición rechazada: {}", err);
        Self {
            session,
            effects: Vec::new(),
            outcome: Err(err),
        }
    }

    fn ignore(session: Option<Session>) -> Self {
        Self::accept(session, Vec::new(), Ack::Ignored)
    }
}

/// Aplica un evento a la sesión de un guild.
pub fn step(session: Option<Session>, event: Event, ctx: &StepContext<'_>) -> Transition {
    let Some(mut session) = session else {
        return step_idle(event, ctx);
    };

    match event {
        Event::Enqueue { song, .. } => {
            if session.upcoming().len() >= ctx.policy.max_queue_size {
                return Transition::reject(
                    Some(session),
                    PlayerError::QueueFull(ctx.policy.max_queue_size),
                );
            }

            let title = song.title.clone();
            session.queue.push(song);
            let position = session.upcoming().len();
            info!("➕ Canción añadida: {} (posición {})", title, position);

            let effects = vec![
                Effect::Notify {
                    channel: session.text_channel,
                    notice: Notice::Added { title, position },
                },
                Effect::RefreshPanel,
            ];
            Transition::accept(
                Some(session),
                effects,
                Ack::Enqueued {
                    position,
                    started: false,
                },
            )
        }

        Event::EnqueuePlaylist { name, songs, .. } => {
            let room = ctx
                .policy
                .max_queue_size
                .saturating_sub(session.upcoming().len());
            if room == 0 {
                return Transition::reject(
                    Some(session),
                    PlayerError::QueueFull(ctx.policy.max_queue_size),
                );
            }
            if songs.is_empty() {
                return Transition::reject(Some(session), PlayerError::NotFound(name));
            }

            let added = songs.len().min(room);
            session.queue.extend(songs.into_iter().take(added));
            info!("🧾 Playlist añadida: {} ({} canciones)", name, added);

            let effects = vec![
                Effect::Notify {
                    channel: session.text_channel,
                    notice: Notice::PlaylistAdded { name, count: added },
                },
                Effect::RefreshPanel,
            ];
            Transition::accept(
                Some(session),
                effects,
                Ack::PlaylistEnqueued {
                    added,
                    started: false,
                },
            )
        }

        Event::Started { token } => {
            if token != session.token || session.pending_advance.is_some() {
                return Transition::ignore(Some(session));
            }

            // Una misma canción puede avisar varias veces; solo la primera cuenta.
            if session.playhead.begin(ctx.now, session.paused) {
                session.failures.reset();
                debug!("▶️ Stream iniciado: {}", session.current().title);
            }
            Transition::ignore(Some(session))
        }

        Event::Finished { token } => {
            if token != session.token || session.pending_advance == Some(token) {
                return Transition::ignore(Some(session));
            }
            advance(session, ctx)
        }

        Event::Errored { token, detail } => {
            if token != session.token || session.pending_advance == Some(token) {
                return Transition::ignore(Some(session));
            }

            let title = session.current().title.clone();
            let failures = session
                .failures
                .record(ctx.now, ctx.policy.failure_window);
            warn!(
                "⚠️ Error reproduciendo '{}' ({} fallos seguidos): {}",
                title, failures, detail
            );

            let mut effects = vec![Effect::Notify {
                channel: session.text_channel,
                notice: Notice::PlaybackError { title, detail },
            }];

            if failures >= ctx.policy.max_consecutive_failures {
                warn!("🛑 Cola detenida tras {} fallos seguidos", failures);
                effects.push(Effect::Notify {
                    channel: session.text_channel,
                    notice: Notice::Halted { failures },
                });
                teardown(&mut effects, true);
                return Transition::accept(None, effects, Ack::Halted);
            }

            session.pending_advance = Some(token);
            effects.push(Effect::StopRefreshLoop);
            effects.push(Effect::ScheduleAdvance {
                token,
                delay: ctx.policy.advance_delay,
            });
            Transition::accept(Some(session), effects, Ack::Ignored)
        }

        Event::AdvanceDue { token } => {
            if session.pending_advance != Some(token) || token != session.token {
                return Transition::ignore(Some(session));
            }
            advance(session, ctx)
        }

        Event::TogglePause => {
            let event = if session.paused {
                Event::Resume
            } else {
                Event::Pause
            };
            step(Some(session), event, ctx)
        }

        Event::Pause => {
            if session.paused {
                return Transition::reject(Some(session), PlayerError::AlreadyPaused);
            }

            session.paused = true;
            session.playhead.pause(ctx.now);
            info!("⏸️ Reproducción pausada: {}", session.current().title);

            let effects = vec![
                Effect::PauseStream,
                Effect::StopRefreshLoop,
                Effect::RefreshPanel,
            ];
            Transition::accept(Some(session), effects, Ack::Paused)
        }

        Event::Resume => {
            if !session.paused {
                return Transition::reject(Some(session), PlayerError::NotPaused);
            }

            session.paused = false;
            session.playhead.resume(ctx.now);
            info!("▶️ Reproducción reanudada: {}", session.current().title);

            let effects = vec![
                Effect::ResumeStream,
                Effect::RefreshPanel,
                Effect::StartRefreshLoop,
            ];
            Transition::accept(Some(session), effects, Ack::Resumed)
        }

        // Solo se detiene el stream: la señal Finished decide qué suena después.
        Event::Skip => {
            info!("⏭️ Saltando: {}", session.current().title);
            Transition::accept(Some(session), vec![Effect::StopStream], Ack::Skipped)
        }

        Event::Stop => {
            info!("⏹️ Reproducción detenida");
            let mut effects = Vec::new();
            teardown(&mut effects, true);
            Transition::accept(None, effects, Ack::Stopped)
        }

        Event::ClearQueue => {
            if !session.has_next() {
                return Transition::reject(Some(session), PlayerError::NothingToClear);
            }

            let removed = session.clear_upcoming();
            let kept = session.current().title.clone();
            info!("🗑️ Cola limpiada ({} canciones eliminadas)", removed);
            Transition::accept(
                Some(session),
                vec![Effect::RefreshPanel],
                Ack::Cleared { removed, kept },
            )
        }

        Event::ChannelEmpty => {
            info!("📭 Canal de voz vacío, deteniendo música");
            let mut effects = vec![Effect::Notify {
                channel: session.text_channel,
                notice: Notice::ChannelEmpty,
            }];
            teardown(&mut effects, true);
            Transition::accept(None, effects, Ack::Stopped)
        }

        Event::Disconnected => {
            info!("🔌 Bot desconectado del canal de voz");
            let mut effects = vec![Effect::Notify {
                channel: session.text_channel,
                notice: Notice::Disconnected,
            }];
            teardown(&mut effects, false);
            Transition::accept(None, effects, Ack::Stopped)
        }
    }
}

fn step_idle(event: Event, ctx: &StepContext<'_>) -> Transition {
    match event {
        Event::Enqueue {
            song,
            text_channel,
            voice_channel,
        } => {
            let session = Session::new(song, text_channel, ctx.fresh_token);
            info!("🎶 Nueva sesión, reproduciendo: {}", session.current().title);

            let mut effects = vec![Effect::Connect {
                channel: voice_channel,
            }];
            effects.extend(start_current(&session));
            Transition::accept(
                Some(session),
                effects,
                Ack::Enqueued {
                    position: 0,
                    started: true,
                },
            )
        }
        Event::EnqueuePlaylist {
            name,
            songs,
            text_channel,
            voice_channel,
        } => {
            let mut songs = songs.into_iter();
            let Some(first) = songs.next() else {
                return Transition::reject(None, PlayerError::NotFound(name));
            };

            let mut session = Session::new(first, text_channel, ctx.fresh_token);
            session
                .queue
                .extend(songs.take(ctx.policy.max_queue_size));
            let added = session.remaining();
            info!("🧾 Nueva sesión desde playlist: {} ({} canciones)", name, added);

            let mut effects = vec![
                Effect::Connect {
                    channel: voice_channel,
                },
                Effect::Notify {
                    channel: text_channel,
                    notice: Notice::PlaylistAdded { name, count: added },
                },
            ];
            effects.extend(start_current(&session));
            Transition::accept(
                Some(session),
                effects,
                Ack::PlaylistEnqueued {
                    added,
                    started: true,
                },
            )
        }
        Event::Pause | Event::Resume | Event::TogglePause | Event::Skip | Event::Stop => {
            Transition::reject(None, PlayerError::NothingPlaying)
        }
        Event::ClearQueue => Transition::reject(None, PlayerError::NothingToClear),
        // Señales y temporizadores de una sesión que ya no existe.
        _ => Transition::ignore(None),
    }
}

fn advance(mut session: Session, ctx: &StepContext<'_>) -> Transition {
    if !session.has_next() {
        info!("✅ Cola terminada");
        let mut effects = vec![Effect::Notify {
            channel: session.text_channel,
            notice: Notice::QueueFinished,
        }];
        teardown(&mut effects, false);
        return Transition::accept(None, effects, Ack::Finished);
    }

    session.move_to_next(ctx.fresh_token);
    info!("➡️ Siguiente en cola: {}", session.current().title);

    let effects = start_current(&session);
    Transition::accept(Some(session), effects, Ack::Advanced)
}

/// Efectos para arrancar la canción bajo el cursor: stream, aviso y panel nuevo.
fn start_current(session: &Session) -> Vec<Effect> {
    let song = session.current();
    vec![
        Effect::StartStream {
            token: session.token,
            locator: song.locator.clone(),
        },
        Effect::Notify {
            channel: session.text_channel,
            notice: Notice::NowPlaying {
                title: song.title.clone(),
                duration: song.duration_display.clone(),
            },
        },
        Effect::ShowPanel {
            token: session.token,
        },
    ]
}

/// Desmontaje completo de una sesión: stream, refresco, panel y conexión.
fn teardown(effects: &mut Vec<Effect>, stop_stream: bool) {
    if stop_stream {
        effects.push(Effect::StopStream);
    }
    effects.push(Effect::StopRefreshLoop);
    effects.push(Effect::TeardownPanel);
    effects.push(Effect::ReleaseConnection);
}
