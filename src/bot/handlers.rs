use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage,
    },
    http::{Http, HttpError},
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::{
    borrow::Borrow,
    sync::atomic::{AtomicBool, Ordering},
};
use tracing::{debug, error, info, warn};

use super::{
    controller::{PlayRequest, Reply},
    MusicBot,
};
use crate::{error::PlayerError, ui::buttons::ControlAction};

/// La interacción caducó (más de 3 s sin respuesta).
const UNKNOWN_INTERACTION: isize = 10062;
/// La interacción ya se había reconocido.
const ALREADY_ACKNOWLEDGED: isize = 40060;

enum Target<'a> {
    Command(&'a CommandInteraction),
    Component(&'a ComponentInteraction),
}

/// Responde a una interacción como mucho una vez; lo demás va como follow-up.
///
/// Los errores de "interacción caducada" o "ya reconocida" se registran y se
/// descartan: el usuario no puede ver ya la respuesta y no son fallos del bot.
pub struct Responder<'a> {
    http: &'a Http,
    target: Target<'a>,
    responded: AtomicBool,
}

impl<'a> Responder<'a> {
    pub fn command(http: &'a Http, command: &'a CommandInteraction) -> Self {
        Self {
            http,
            target: Target::Command(command),
            responded: AtomicBool::new(false),
        }
    }

    pub fn component(http: &'a Http, component: &'a ComponentInteraction) -> Self {
        Self {
            http,
            target: Target::Component(component),
            responded: AtomicBool::new(false),
        }
    }

    pub async fn respond(&self, reply: Reply) -> Result<()> {
        if self.responded.swap(true, Ordering::SeqCst) {
            debug!("Interacción ya respondida, se descarta: {:?}", reply.content);
            return Ok(());
        }

        let response = CreateInteractionResponse::Message(response_message(&reply));
        let result = match self.target {
            Target::Command(command) => command.create_response(self.http, response).await,
            Target::Component(component) => component.create_response(self.http, response).await,
        };
        absorb_expired(result)
    }

    /// Mensaje adicional tras la primera respuesta (o la primera, si no la hubo).
    pub async fn follow_up(&self, reply: Reply) -> Result<()> {
        if !self.responded.load(Ordering::SeqCst) {
            return self.respond(reply).await;
        }

        let followup = followup_message(&reply);
        let result = match self.target {
            Target::Command(command) => command.create_followup(self.http, followup).await,
            Target::Component(component) => component.create_followup(self.http, followup).await,
        };
        absorb_expired(result)
    }
}

fn response_message(reply: &Reply) -> CreateInteractionResponseMessage {
    let mut message = CreateInteractionResponseMessage::new().ephemeral(reply.ephemeral);
    if let Some(content) = &reply.content {
        message = message.content(content);
    }
    if let Some(embed) = &reply.embed {
        message = message.embed(embed.to_embed());
    }
    message
}

fn followup_message(reply: &Reply) -> CreateInteractionResponseFollowup {
    let mut message = CreateInteractionResponseFollowup::new().ephemeral(reply.ephemeral);
    if let Some(content) = &reply.content {
        message = message.content(content);
    }
    if let Some(embed) = &reply.embed {
        message = message.embed(embed.to_embed());
    }
    message
}

fn absorb_expired<T>(result: serenity::Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) => match discord_error_code(&e) {
            Some(code) if is_expired_code(code) => {
                warn!("⌛ Interacción caducada o ya respondida ({}), se ignora", code);
                Ok(())
            }
            _ => Err(e.into()),
        },
    }
}

fn discord_error_code(err: &serenity::Error) -> Option<isize> {
    let serenity::Error::Http(http) = err else {
        return None;
    };
    let http: &HttpError = http.borrow();
    match http {
        HttpError::UnsuccessfulRequest(response) => Some(response.error.code),
        _ => None,
    }
}

pub fn is_expired_code(code: isize) -> bool {
    code == UNKNOWN_INTERACTION || code == ALREADY_ACKNOWLEDGED
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) {
    let responder = Responder::command(&ctx.http, &command);

    if let Err(e) = route_command(ctx, &command, bot, &responder).await {
        error!("❌ Error ejecutando /{}: {:?}", command.data.name, e);
        let _ = responder
            .follow_up(Reply::private("⚠️ Ocurrió un error ejecutando el comando."))
            .await;
    }
}

async fn route_command(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    responder: &Responder<'_>,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return responder
            .respond(Reply::private("❌ Este comando solo funciona en un servidor."))
            .await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let controller = &bot.controller;
    let voice = user_voice_channel(ctx, guild_id, command.user.id);

    match command.data.name.as_str() {
        "p" => {
            let query = command
                .data
                .options
                .iter()
                .find(|opt| opt.name == "cancion")
                .and_then(|opt| opt.value.as_str())
                .ok_or_else(|| anyhow::anyhow!("Falta la opción 'cancion'"))?;

            let Some(voice_channel) = voice else {
                return responder
                    .respond(Reply::private(PlayerError::NotInVoice.to_string()))
                    .await;
            };
            if !bot_can_speak(ctx, guild_id, voice_channel) {
                return responder
                    .respond(Reply::private(
                        PlayerError::MissingVoicePermissions.to_string(),
                    ))
                    .await;
            }

            responder
                .respond(Reply::public(format!("🔎 Buscando: **{}**", query)))
                .await?;

            let reply = controller
                .on_play_request(PlayRequest {
                    guild_id,
                    text_channel: command.channel_id,
                    voice_channel: Some(voice_channel),
                    requested_by: &command.user.name,
                    query,
                })
                .await;
            responder.follow_up(reply).await
        }
        "join" => {
            if voice.is_none() {
                return responder
                    .respond(Reply::private(PlayerError::NotInVoice.to_string()))
                    .await;
            }
            responder
                .respond(Reply::public("🔗 Intentando conectar..."))
                .await?;
            let reply = controller.on_join(guild_id, voice).await;
            responder.follow_up(reply).await
        }
        "status" => {
            let voice_name = voice.and_then(|channel| channel_name(ctx, guild_id, channel));
            let voice_name = match (voice, voice_name) {
                (Some(channel), None) => Some(format!("<#{}>", channel)),
                (_, name) => name,
            };
            responder
                .respond(controller.on_status(guild_id, voice_name))
                .await
        }
        _ => {
            responder
                .respond(Reply::private("❌ Comando no reconocido"))
                .await
        }
    }
}

/// Maneja los botones del panel
pub async fn handle_component(ctx: &Context, component: ComponentInteraction, bot: &MusicBot) {
    let responder = Responder::component(&ctx.http, &component);

    if let Err(e) = route_component(&component, bot, &responder).await {
        error!(
            "❌ Error procesando botón {}: {:?}",
            component.data.custom_id, e
        );
        let _ = responder
            .follow_up(Reply::private("⚠️ Ocurrió un error procesando el botón."))
            .await;
    }
}

async fn route_component(
    component: &ComponentInteraction,
    bot: &MusicBot,
    responder: &Responder<'_>,
) -> Result<()> {
    let Some(guild_id) = component.guild_id else {
        return responder
            .respond(Reply::private("❌ Botón no reconocido."))
            .await;
    };

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let controller = &bot.controller;
    let reply = match ControlAction::from_custom_id(&component.data.custom_id) {
        Some(ControlAction::PauseResume) => controller.on_pause_resume_toggle(guild_id).await,
        Some(ControlAction::Skip) => controller.on_skip(guild_id).await,
        Some(ControlAction::Stop) => controller.on_stop(guild_id).await,
        Some(ControlAction::ViewQueue) => controller.on_view_queue(guild_id),
        Some(ControlAction::ClearQueue) => controller.on_clear_queue(guild_id).await,
        None => Reply::private("❌ Botón no reconocido."),
    };

    responder.respond(reply).await
}

/// Canal de voz en el que está el usuario, según la caché.
pub fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|state| state.channel_id)
}

fn channel_name(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Option<String> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .channels
        .get(&channel_id)
        .map(|channel| channel.name.clone())
}

/// Comprueba Connect + Speak del bot en el canal. Sin datos en caché, se
/// deja pasar y el error aparecerá al conectar.
fn bot_can_speak(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> bool {
    let bot_id = ctx.cache.current_user().id;
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return true;
    };
    let (Some(channel), Some(member)) =
        (guild.channels.get(&channel_id), guild.members.get(&bot_id))
    else {
        return true;
    };

    let permissions = guild.user_permissions_in(channel, member);
    permissions.connect() && permissions.speak()
}
