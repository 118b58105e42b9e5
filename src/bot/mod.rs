//! # Bot Module
//!
//! Discord glue for the music panel bot.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Interaction routing and the once-only [`handlers::Responder`]
//! - The platform-free [`controller::Controller`] behind every command and button
//! - Serenity-backed messaging for panels and notices ([`messenger`])
//! - Songbird track events turned into queue signals ([`events`])
//!
//! ## Architecture
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`]. Interactions are
//! routed to the controller; voice state changes are turned into
//! `Disconnected` / `ChannelEmpty` events for the guild's queue.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod controller;
pub mod events;
pub mod handlers;
pub mod messenger;

use crate::{audio::engine::Event, config::Config};
use controller::Controller;

/// Main Discord event handler.
///
/// Holds the configuration and the [`Controller`] shared with every
/// interaction. All per-guild state lives in the player's registry.
pub struct MusicBot {
    config: Arc<Config>,
    pub controller: Arc<Controller>,
}

impl MusicBot {
    pub fn new(config: Arc<Config>, controller: Arc<Controller>) -> Self {
        Self { config, controller }
    }

    /// Registers slash commands globally or on the configured guild.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// True when nobody but bots remains in the bot's voice channel.
    fn bot_alone(&self, ctx: &Context, guild_id: GuildId) -> bool {
        let bot_id = ctx.cache.current_user().id;
        let Some(guild) = ctx.cache.guild(guild_id) else {
            return false;
        };
        let Some(bot_channel) = guild
            .voice_states
            .get(&bot_id)
            .and_then(|state| state.channel_id)
        else {
            return false;
        };

        let listeners = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(bot_channel) && state.user_id != bot_id)
            .filter(|state| !state.member.as_ref().is_some_and(|member| member.user.bot))
            .count();
        listeners == 0
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => handlers::handle_command(&ctx, command, self).await,
            Interaction::Component(component) => {
                handlers::handle_component(&ctx, component, self).await
            }
            _ => {}
        }
    }

    /// Watches the bot's own voice state and its channel's audience.
    ///
    /// - **Bot disconnected**: the guild's session is torn down without
    ///   touching the (already gone) connection
    /// - **Bot alone**: playback stops and the bot leaves the channel
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let player = self.controller.player();
        if !player.registry().has_session(guild_id) {
            return;
        }

        let bot_id = ctx.cache.current_user().id;
        let event = if new.user_id == bot_id {
            let was_connected = old.as_ref().and_then(|state| state.channel_id).is_some();
            if !(was_connected && new.channel_id.is_none()) {
                return;
            }
            info!("🔌 Bot desconectado en guild {}", guild_id);
            Event::Disconnected
        } else if self.bot_alone(&ctx, guild_id) {
            info!("🚪 Canal de voz vacío en guild {}", guild_id);
            Event::ChannelEmpty
        } else {
            return;
        };

        if let Err(e) = player.dispatch(guild_id, event).await {
            debug!("Evento de voz sin efecto en guild {}: {}", guild_id, e);
        }
    }
}
