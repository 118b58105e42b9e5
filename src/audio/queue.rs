use serenity::model::id::ChannelId;
use std::time::Duration;
use tokio::time::Instant;

use crate::sources::{ResolvedSource, StreamLocator};

/// Identifica una reproducción concreta (una canción arrancada una vez).
///
/// Los tokens son únicos en todo el proceso: una señal o un temporizador que
/// llega con un token distinto al de la sesión actual se descarta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayToken(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    pub title: String,
    pub duration: Option<Duration>,
    pub duration_display: String,
    pub locator: StreamLocator,
    pub thumbnail: Option<String>,
    pub requested_by: String,
}

impl Song {
    pub fn from_source(source: ResolvedSource, requested_by: impl Into<String>) -> Self {
        Self {
            title: source.title,
            duration: source.duration,
            duration_display: source.duration_display,
            locator: source.locator,
            thumbnail: source.thumbnail,
            requested_by: requested_by.into(),
        }
    }
}

/// Estado observable de un guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn of(session: Option<&Session>) -> Self {
        match session {
            None => PlaybackState::Idle,
            Some(session) if session.is_paused() => PlaybackState::Paused,
            Some(_) => PlaybackState::Playing,
        }
    }
}

/// Posición aproximada dentro de la canción actual.
#[derive(Debug, Clone, Default)]
pub struct Playhead {
    started: bool,
    running_since: Option<Instant>,
    accumulated: Duration,
}

impl Playhead {
    /// Marca el arranque real del stream. Solo cuenta la primera vez por
    /// canción; devuelve `false` si ya había arrancado.
    pub fn begin(&mut self, now: Instant, paused: bool) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        self.accumulated = Duration::ZERO;
        self.running_since = (!paused).then_some(now);
        true
    }

    pub fn reset(&mut self) {
        self.started = false;
        self.running_since = None;
        self.accumulated = Duration::ZERO;
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if self.started && self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.accumulated
            + self
                .running_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default()
    }
}

/// Fallos consecutivos dentro de una ventana de tiempo.
#[derive(Debug, Clone, Default)]
pub struct FailureTracker {
    consecutive: u32,
    window_start: Option<Instant>,
}

impl FailureTracker {
    /// Registra un fallo y devuelve cuántos van dentro de la ventana.
    pub fn record(&mut self, now: Instant, window: Duration) -> u32 {
        match self.window_start {
            Some(start) if now.saturating_duration_since(start) <= window => {
                self.consecutive += 1;
            }
            _ => {
                self.window_start = Some(now);
                self.consecutive = 1;
            }
        }
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.window_start = None;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// Sesión de reproducción de un guild.
///
/// Solo existe mientras hay una canción cargada, así que `cursor` siempre
/// apunta a una entrada válida de `queue`. "Nada sonando" se representa con
/// la ausencia de sesión en el registro.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) queue: Vec<Song>,
    pub(crate) cursor: usize,
    pub(crate) paused: bool,
    pub(crate) token: PlayToken,
    pub(crate) pending_advance: Option<PlayToken>,
    pub(crate) text_channel: ChannelId,
    pub(crate) playhead: Playhead,
    pub(crate) failures: FailureTracker,
}

impl Session {
    pub fn new(first: Song, text_channel: ChannelId, token: PlayToken) -> Self {
        Self {
            queue: vec![first],
            cursor: 0,
            paused: false,
            token,
            pending_advance: None,
            text_channel,
            playhead: Playhead::default(),
            failures: FailureTracker::default(),
        }
    }

    pub fn current(&self) -> &Song {
        &self.queue[self.cursor]
    }

    /// Canciones pendientes después de la actual, en orden de reproducción.
    pub fn upcoming(&self) -> &[Song] {
        &self.queue[self.cursor + 1..]
    }

    /// Canciones que quedan incluyendo la actual.
    pub fn remaining(&self) -> usize {
        self.queue.len() - self.cursor
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn token(&self) -> PlayToken {
        self.token
    }

    pub fn text_channel(&self) -> ChannelId {
        self.text_channel
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.playhead.elapsed(now)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.consecutive()
    }

    pub(crate) fn has_next(&self) -> bool {
        self.cursor + 1 < self.queue.len()
    }

    /// Mueve el cursor a la siguiente canción y la deja lista para sonar.
    pub(crate) fn move_to_next(&mut self, token: PlayToken) -> &Song {
        self.cursor += 1;
        self.token = token;
        self.paused = false;
        self.pending_advance = None;
        self.playhead.reset();
        self.current()
    }

    /// Deja solo la canción actual (y el historial anterior al cursor).
    pub(crate) fn clear_upcoming(&mut self) -> usize {
        let removed = self.upcoming().len();
        self.queue.truncate(self.cursor + 1);
        removed
    }

    /// Vista de la cola para el botón "Ver Cola".
    pub fn listing(&self, limit: usize) -> QueueListing {
        QueueListing {
            entries: self.queue[self.cursor..]
                .iter()
                .take(limit)
                .map(|song| QueueEntry {
                    title: song.title.clone(),
                    duration_display: song.duration_display.clone(),
                })
                .collect(),
            total: self.remaining(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub title: String,
    pub duration_display: String,
}

/// Primeras entradas de la cola a partir de la canción actual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueListing {
    pub entries: Vec<QueueEntry>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::song;
    use pretty_assertions::assert_eq;

    fn session_with(titles: &[&str]) -> Session {
        let mut session = Session::new(song(titles[0]), ChannelId::new(1), PlayToken(1));
        session
            .queue
            .extend(titles[1..].iter().map(|title| song(title)));
        session
    }

    #[test]
    fn upcoming_excludes_current() {
        let mut session = session_with(&["A", "B", "C"]);
        assert_eq!(session.upcoming().len(), 2);
        assert_eq!(session.remaining(), 3);

        session.move_to_next(PlayToken(2));
        assert_eq!(session.current().title, "B");
        assert_eq!(session.upcoming().len(), 1);
        assert_eq!(session.remaining(), 2);
    }

    #[test]
    fn clear_upcoming_keeps_current() {
        let mut session = session_with(&["A", "B", "C"]);
        session.move_to_next(PlayToken(2));

        assert_eq!(session.clear_upcoming(), 1);
        assert_eq!(session.current().title, "B");
        assert!(!session.has_next());
        assert_eq!(session.clear_upcoming(), 0);
    }

    #[test]
    fn listing_is_capped_but_counts_everything() {
        let titles: Vec<String> = (0..15).map(|i| format!("song {i}")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let listing = session_with(&refs).listing(10);

        assert_eq!(listing.entries.len(), 10);
        assert_eq!(listing.total, 15);
        assert_eq!(listing.entries[0].title, "song 0");
    }

    #[test]
    fn playhead_stops_counting_while_paused() {
        let start = Instant::now();
        let mut playhead = Playhead::default();
        assert!(playhead.begin(start, false));

        playhead.pause(start + Duration::from_secs(10));
        assert_eq!(
            playhead.elapsed(start + Duration::from_secs(60)),
            Duration::from_secs(10)
        );

        playhead.resume(start + Duration::from_secs(60));
        assert_eq!(
            playhead.elapsed(start + Duration::from_secs(65)),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn playhead_ignores_time_before_stream_is_playable() {
        let start = Instant::now();
        let mut playhead = Playhead::default();

        playhead.pause(start + Duration::from_secs(1));
        playhead.resume(start + Duration::from_secs(2));
        assert_eq!(playhead.elapsed(start + Duration::from_secs(5)), Duration::ZERO);

        playhead.begin(start + Duration::from_secs(5), false);
        assert!(!playhead.begin(start + Duration::from_secs(8), false));
        assert_eq!(
            playhead.elapsed(start + Duration::from_secs(9)),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn failure_window_restarts_count() {
        let start = Instant::now();
        let window = Duration::from_secs(30);
        let mut failures = FailureTracker::default();

        assert_eq!(failures.record(start, window), 1);
        assert_eq!(failures.record(start + Duration::from_secs(5), window), 2);
        assert_eq!(failures.record(start + Duration::from_secs(120), window), 1);
    }
}
