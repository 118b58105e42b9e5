//! Dobles de prueba para los colaboradores externos (Discord, voz, yt-dlp).

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

use crate::{
    audio::{queue::{PlayToken, Song}, transport::AudioTransport},
    sources::{Resolution, ResolvedSource, SourceResolver, StreamLocator},
    ui::{embeds::PanelContent, panel::PanelChannel},
};

pub fn song(title: &str) -> Song {
    Song::from_source(source(title), "tester")
}

pub fn source(title: &str) -> ResolvedSource {
    ResolvedSource {
        title: title.to_string(),
        duration: Some(Duration::from_secs(180)),
        duration_display: "3:00".to_string(),
        locator: StreamLocator::new(format!("locator://{}", title)),
        thumbnail: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCall {
    Send(ChannelId, MessageId),
    Edit(ChannelId, MessageId),
    Delete(ChannelId, MessageId),
    Say(ChannelId, String),
}

/// Canal de texto en memoria que recuerda qué mensajes siguen vivos.
#[derive(Default)]
pub struct FakeChannel {
    calls: Mutex<Vec<ChannelCall>>,
    live: Mutex<HashSet<MessageId>>,
    contents: Mutex<HashMap<MessageId, PanelContent>>,
    next_id: AtomicU64,
    fail_edits: AtomicBool,
}

impl FakeChannel {
    pub fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().clone()
    }

    pub fn live_messages(&self) -> usize {
        self.live.lock().len()
    }

    pub fn edits(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, ChannelCall::Edit(..)))
            .count()
    }

    pub fn said(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ChannelCall::Say(_, text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Último contenido enviado o editado en un mensaje vivo.
    pub fn live_content(&self) -> Vec<PanelContent> {
        let live = self.live.lock();
        self.contents
            .lock()
            .iter()
            .filter(|(id, _)| live.contains(id))
            .map(|(_, content)| content.clone())
            .collect()
    }

    pub fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PanelChannel for FakeChannel {
    async fn send(&self, channel_id: ChannelId, content: &PanelContent) -> Result<MessageId> {
        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.live.lock().insert(id);
        self.contents.lock().insert(id, content.clone());
        self.calls.lock().push(ChannelCall::Send(channel_id, id));
        Ok(id)
    }

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &PanelContent,
    ) -> Result<()> {
        self.calls.lock().push(ChannelCall::Edit(channel_id, message_id));
        if self.fail_edits.load(Ordering::SeqCst) || !self.live.lock().contains(&message_id) {
            bail!("Unknown Message");
        }
        self.contents.lock().insert(message_id, content.clone());
        Ok(())
    }

    async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        self.calls.lock().push(ChannelCall::Delete(channel_id, message_id));
        if !self.live.lock().remove(&message_id) {
            bail!("Unknown Message");
        }
        Ok(())
    }

    async fn say(&self, channel_id: ChannelId, text: &str) -> Result<()> {
        self.calls
            .lock()
            .push(ChannelCall::Say(channel_id, text.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(ChannelId),
    Start(String, PlayToken),
    Pause,
    Resume,
    Stop,
    Release,
}

#[derive(Default)]
pub struct FakeTransport {
    calls: Mutex<Vec<(GuildId, TransportCall)>>,
    fail_starts: AtomicBool,
    fail_connects: AtomicBool,
}

impl FakeTransport {
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().iter().map(|(_, call)| call.clone()).collect()
    }

    pub fn started(&self) -> Vec<(String, PlayToken)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Start(locator, token) => Some((locator, token)),
                _ => None,
            })
            .collect()
    }

    pub fn last_token(&self) -> Option<PlayToken> {
        self.started().last().map(|(_, token)| *token)
    }

    pub fn fail_starts(&self, fail: bool) {
        self.fail_starts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    fn record(&self, guild_id: GuildId, call: TransportCall) {
        self.calls.lock().push((guild_id, call));
    }
}

#[async_trait]
impl AudioTransport for FakeTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        self.record(guild_id, TransportCall::Connect(channel_id));
        if self.fail_connects.load(Ordering::SeqCst) {
            bail!("sin permisos de voz");
        }
        Ok(())
    }

    async fn start(
        &self,
        guild_id: GuildId,
        locator: &StreamLocator,
        token: PlayToken,
    ) -> Result<()> {
        self.record(guild_id, TransportCall::Start(locator.to_string(), token));
        if self.fail_starts.load(Ordering::SeqCst) {
            bail!("stream roto");
        }
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> Result<()> {
        self.record(guild_id, TransportCall::Pause);
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> Result<()> {
        self.record(guild_id, TransportCall::Resume);
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<()> {
        self.record(guild_id, TransportCall::Stop);
        Ok(())
    }

    async fn release(&self, guild_id: GuildId) -> Result<()> {
        self.record(guild_id, TransportCall::Release);
        Ok(())
    }
}

/// Resolver con respuestas fijas; cualquier otra búsqueda no encuentra nada.
#[derive(Default)]
pub struct FakeResolver {
    known: Mutex<HashMap<String, Resolution>>,
}

impl FakeResolver {
    pub fn with(self, query: &str, title: &str) -> Self {
        self.known
            .lock()
            .insert(query.to_string(), Resolution::Single(source(title)));
        self
    }

    pub fn with_playlist(self, query: &str, name: &str, titles: &[&str]) -> Self {
        let entries = titles.iter().map(|title| source(title)).collect();
        self.known.lock().insert(
            query.to_string(),
            Resolution::Playlist {
                name: name.to_string(),
                entries,
            },
        );
        self
    }
}

#[async_trait]
impl SourceResolver for FakeResolver {
    async fn resolve(&self, query: &str) -> Result<Option<Resolution>> {
        Ok(self.known.lock().get(query).cloned())
    }
}
