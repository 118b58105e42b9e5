use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::{sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;

use super::queue::{PlayToken, QueueListing, Session};
use crate::ui::embeds::PanelView;

/// Mensaje de panel vivo de un guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelRecord {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub token: PlayToken,
}

/// Bucle de refresco activo de un guild.
#[derive(Debug, Clone)]
pub struct RefreshLoop {
    pub id: u64,
    pub cancel: CancellationToken,
}

/// Lo que el panel necesita saber de una sesión en un instante dado.
#[derive(Debug, Clone)]
pub struct PanelSnapshot {
    pub view: PanelView,
    pub token: PlayToken,
    pub text_channel: ChannelId,
}

/// Registro de todo el estado por guild del proceso.
///
/// Se crea al arrancar y se comparte por `Arc`. Tiene tres tablas indexadas
/// por guild: sesiones, paneles y bucles de refresco. Una sesión se inserta
/// en el primer `enqueue` y se elimina en cualquier desmontaje; los paneles y
/// los bucles los gestiona el `PanelManager`.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: DashMap<GuildId, Session>,
    pub(crate) panels: DashMap<GuildId, PanelRecord>,
    pub(crate) timers: DashMap<GuildId, RefreshLoop>,
    tokens: AtomicU64,
    loop_ids: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_token(&self) -> PlayToken {
        PlayToken(self.tokens.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn next_loop_id(&self) -> u64 {
        self.loop_ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Aplica `f` a la sesión del guild bajo el lock de su entrada.
    ///
    /// `f` no debe tocar el registro: se ejecuta con la entrada bloqueada.
    pub fn update<T>(
        &self,
        guild_id: GuildId,
        f: impl FnOnce(Option<Session>) -> (Option<Session>, T),
    ) -> T {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                let (next, out) = f(Some(entry.get().clone()));
                match next {
                    Some(session) => {
                        entry.insert(session);
                    }
                    None => {
                        entry.remove();
                    }
                }
                out
            }
            Entry::Vacant(entry) => {
                let (next, out) = f(None);
                if let Some(session) = next {
                    entry.insert(session);
                }
                out
            }
        }
    }

    pub fn session(&self, guild_id: GuildId) -> Option<Session> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    pub fn current_token(&self, guild_id: GuildId) -> Option<PlayToken> {
        self.sessions.get(&guild_id).map(|s| s.token())
    }

    pub fn has_session(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    pub fn active_guilds(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn listing(&self, guild_id: GuildId, limit: usize) -> Option<QueueListing> {
        self.sessions.get(&guild_id).map(|s| s.listing(limit))
    }

    /// Estado actual para renderizar el panel, leído en el momento.
    pub fn panel_snapshot(&self, guild_id: GuildId, now: Instant) -> Option<PanelSnapshot> {
        let session = self.sessions.get(&guild_id)?;
        Some(PanelSnapshot {
            view: PanelView::from_session(&session, now),
            token: session.token(),
            text_channel: session.text_channel(),
        })
    }

    pub fn panel(&self, guild_id: GuildId) -> Option<PanelRecord> {
        self.panels.get(&guild_id).map(|p| *p)
    }

    pub fn has_refresh_loop(&self, guild_id: GuildId) -> bool {
        self.timers.contains_key(&guild_id)
    }
}

/// Mutex asíncrono por guild.
///
/// Las entradas se crean al primer uso y se quitan con [`GuildLocks::release`]
/// cuando nadie más las tiene, así que la tabla solo guarda guilds activos.
#[derive(Debug, Default)]
pub struct GuildLocks {
    locks: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl GuildLocks {
    pub fn get(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Devuelve `lock` y borra la entrada si era la última referencia.
    ///
    /// Quien espera el mutex conserva su propio `Arc`, así que una entrada
    /// con esperas pendientes nunca se borra.
    pub fn release(&self, guild_id: GuildId, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(&guild_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::song;

    fn guild() -> GuildId {
        GuildId::new(42)
    }

    #[test]
    fn tokens_are_unique() {
        let registry = Registry::new();
        let a = registry.next_token();
        let b = registry.next_token();
        assert_ne!(a, b);
    }

    #[test]
    fn update_inserts_and_removes() {
        let registry = Registry::new();

        registry.update(guild(), |current| {
            assert!(current.is_none());
            (
                Some(Session::new(song("A"), ChannelId::new(1), PlayToken(1))),
                (),
            )
        });
        assert!(registry.has_session(guild()));
        assert_eq!(registry.current_token(guild()), Some(PlayToken(1)));

        registry.update(guild(), |current| {
            assert!(current.is_some());
            (None, ())
        });
        assert!(!registry.has_session(guild()));

        // Borrar lo que no existe es inocuo.
        registry.update(guild(), |_| (None, ()));
        assert!(registry.session(guild()).is_none());
    }

    #[tokio::test]
    async fn guild_lock_is_pruned_only_when_unused() {
        let locks = GuildLocks::default();
        let held = locks.get(guild());
        let waiter = locks.get(guild());
        assert!(Arc::ptr_eq(&held, &waiter));

        locks.release(guild(), held);
        assert_eq!(locks.len(), 1);

        locks.release(guild(), waiter);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn snapshot_reflects_current_song() {
        let registry = Registry::new();
        registry.update(guild(), |_| {
            (
                Some(Session::new(song("A"), ChannelId::new(9), PlayToken(5))),
                (),
            )
        });

        let snapshot = registry.panel_snapshot(guild(), Instant::now()).unwrap();
        assert_eq!(snapshot.token, PlayToken(5));
        assert_eq!(snapshot.text_channel, ChannelId::new(9));
        assert_eq!(snapshot.view.current.title, "A");
        assert_eq!(snapshot.view.remaining, 1);
    }
}
