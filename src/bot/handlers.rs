use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::player::VoteOutcome,
    bot::LagMusicBot,
    error::PlaybackError,
    ui::embeds,
};

/// Comandos que pasan por el control de permisos del canal
const CONTROL_COMMANDS: &[&str] = &[
    "pause", "resume", "skip", "stop", "random", "any", "loop", "autoplay", "clear", "volume",
];

pub fn needs_permission(command: &str) -> bool {
    CONTROL_COMMANDS.contains(&command)
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &LagMusicBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let name = command.data.name.clone();

    if name == "help" {
        return respond_embed(ctx, &command, embeds::create_help_embed(), true).await;
    }

    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond_error(ctx, &command, "Debes estar en un canal de voz.").await;
    };

    if needs_permission(&name) && !bot.permissions.has_permission(guild_id, voice_channel, command.user.id) {
        return respond_error(
            ctx,
            &command,
            "No tienes permiso para usar este comando. Usa `/voteskip` en su lugar.",
        )
        .await;
    }

    match name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id, voice_channel).await,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await,
        "voteskip" => handle_voteskip(ctx, &command, bot, guild_id, voice_channel).await,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await,
        "random" => handle_random(ctx, &command, bot, guild_id).await,
        "any" => handle_any(ctx, &command, bot, guild_id).await,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await,
        "autoplay" => handle_autoplay(ctx, &command, bot, guild_id).await,
        "clear" => handle_clear(ctx, &command, bot, guild_id).await,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await,
        "addpermiss" => handle_addpermiss(ctx, &command, bot, guild_id, voice_channel).await,
        _ => respond_error(ctx, &command, "Comando no reconocido").await,
    }
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &LagMusicBot,
    guild_id: GuildId,
    voice_channel: ChannelId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();
    let as_playlist = bool_option(command, "playlist").unwrap_or(false);

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    if let Err(e) = bot
        .controller
        .connect(guild_id, voice_channel, command.channel_id)
        .await
    {
        warn!("⚠️ No se pudo conectar a voz en guild {}: {:?}", guild_id, e);
        return edit_embed(
            ctx,
            command,
            embeds::create_error_embed("Error", "No pude conectarme a tu canal de voz."),
        )
        .await;
    }

    let requested_by = command.user.name.clone();

    let embed = if as_playlist {
        match bot.resolver.resolve_playlist(&query, &requested_by).await {
            Ok(tracks) => match bot.controller.enqueue_many(guild_id, tracks.clone()) {
                Ok(_) => embeds::create_playlist_added_embed(&tracks),
                Err(e) => playback_error_embed(&e),
            },
            Err(e) => embeds::create_error_embed("Error", &e.to_string()),
        }
    } else {
        match bot.resolver.resolve(&query, &requested_by).await {
            Ok(Some(track)) => match bot.controller.enqueue(guild_id, track.clone()) {
                Ok(position) => embeds::create_track_added_embed(&track, position),
                Err(e) => playback_error_embed(&e),
            },
            Ok(None) => embeds::create_error_embed("Sin resultados", "No se encontraron resultados."),
            Err(e) => embeds::create_error_embed("Error", &e.to_string()),
        }
    };

    edit_embed(ctx, command, embed).await
}

async fn handle_pause(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    match bot.controller.pause(guild_id).await {
        Ok(true) => respond_text(ctx, command, "⏸️ Reproducción pausada").await,
        Ok(false) => respond_error(ctx, command, "No hay música reproduciéndose.").await,
        Err(e) => respond_playback_error(ctx, command, &e).await,
    }
}

async fn handle_resume(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    match bot.controller.resume(guild_id).await {
        Ok(true) => respond_text(ctx, command, "▶️ Reproducción reanudada").await,
        Ok(false) => respond_error(ctx, command, "La música no está pausada.").await,
        Err(e) => respond_playback_error(ctx, command, &e).await,
    }
}

async fn handle_skip(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    match bot.controller.skip(guild_id).await {
        Ok(Some(track)) => respond_text(ctx, command, &format!("⏭️ Saltada: **{}**", track.title)).await,
        Ok(None) => respond_error(ctx, command, "No hay música reproduciéndose.").await,
        Err(e) => respond_playback_error(ctx, command, &e).await,
    }
}

async fn handle_voteskip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &LagMusicBot,
    guild_id: GuildId,
    voice_channel: ChannelId,
) -> Result<()> {
    let is_owner = bot.permissions.is_owner(voice_channel, command.user.id);
    let listeners = listeners_in(ctx, guild_id, voice_channel);

    match bot
        .controller
        .vote_skip(guild_id, command.user.id, is_owner, listeners)
        .await
    {
        Ok(VoteOutcome::NothingPlaying) => respond_error(ctx, command, "No hay música reproduciéndose.").await,
        Ok(VoteOutcome::AlreadyVoted { .. }) => respond_error(ctx, command, "Ya votaste para saltar esta canción.").await,
        Ok(outcome) => respond_text(ctx, command, &vote_message(&outcome, is_owner)).await,
        Err(e) => respond_playback_error(ctx, command, &e).await,
    }
}

pub fn vote_message(outcome: &VoteOutcome, is_owner: bool) -> String {
    match outcome {
        VoteOutcome::Skipped { title } if is_owner => {
            format!("⏭️ El creador del canal saltó la canción: **{}**", title)
        }
        VoteOutcome::Skipped { title } => format!("⏭️ Votación aprobada, saltando: **{}**", title),
        VoteOutcome::Recorded { votes, needed } => {
            format!("🗳️ Voto registrado ({}/{} votos necesarios)", votes, needed)
        }
        VoteOutcome::AlreadyVoted { votes, needed } => {
            format!("⚠️ Ya votaste ({}/{})", votes, needed)
        }
        VoteOutcome::NothingPlaying => "❌ No hay música reproduciéndose.".to_string(),
    }
}

async fn handle_stop(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    if bot.controller.stop(guild_id).await {
        respond_text(ctx, command, "⏹️ Música detenida y bot desconectado").await
    } else {
        respond_error(ctx, command, "El bot no está reproduciendo nada.").await
    }
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    let page = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "page")
        .and_then(|opt| opt.value.as_i64())
        .map_or(1, |page| page.max(1) as usize);

    match bot.controller.snapshot(guild_id) {
        Some(info) => respond_embed(ctx, command, embeds::create_queue_embed(&info, page), false).await,
        None => respond_error(ctx, command, "No hay una cola activa.").await,
    }
}

async fn handle_nowplaying(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    match bot.controller.now_playing(guild_id) {
        Some(track) => respond_embed(ctx, command, embeds::create_now_playing_embed(&track), false).await,
        None => respond_error(ctx, command, "No hay nada reproduciéndose actualmente").await,
    }
}

async fn handle_random(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    let shuffled = bot.controller.shuffle(guild_id);

    respond_text(
        ctx,
        command,
        if shuffled {
            "🔀 Cola mezclada, modo aleatorio activado"
        } else {
            "🔀 Cola mezclada, modo aleatorio desactivado"
        },
    )
    .await
}

async fn handle_any(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    match bot.controller.play_random(guild_id).await {
        Ok(Some(track)) => respond_text(ctx, command, &format!("🎲 Reproduciendo al azar: **{}**", track.title)).await,
        Ok(None) => respond_error(ctx, command, "La cola está vacía.").await,
        Err(e) => respond_playback_error(ctx, command, &e).await,
    }
}

async fn handle_loop(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    let enabled = bool_option(command, "enabled").unwrap_or(false);
    bot.controller.set_loop(guild_id, enabled);

    respond_text(
        ctx,
        command,
        if enabled {
            "🔂 Repetir canción activado"
        } else {
            "➡️ Repetición desactivada"
        },
    )
    .await
}

async fn handle_autoplay(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    let enabled = bot.controller.toggle_autoplay(guild_id);

    respond_text(
        ctx,
        command,
        if enabled {
            "📻 Autoplay activado"
        } else {
            "📻 Autoplay desactivado"
        },
    )
    .await
}

async fn handle_clear(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    let removed = bot.controller.clear(guild_id);
    respond_text(ctx, command, &format!("🗑️ Se eliminaron {} canciones de la cola", removed)).await
}

async fn handle_volume(ctx: &Context, command: &CommandInteraction, bot: &LagMusicBot, guild_id: GuildId) -> Result<()> {
    let level = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_i64())
        .map_or(100, |level| level.clamp(0, 100) as u8);

    let applied = bot.controller.set_volume(guild_id, level).await;
    respond_text(ctx, command, &format!("🔊 Volumen ajustado a {}%", applied)).await
}

async fn handle_addpermiss(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &LagMusicBot,
    guild_id: GuildId,
    voice_channel: ChannelId,
) -> Result<()> {
    if !bot.permissions.is_owner(voice_channel, command.user.id) {
        return respond_error(ctx, command, "Solo el creador del canal puede usar este comando.").await;
    }

    let target = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "user")
        .and_then(|opt| opt.value.as_user_id())
        .ok_or_else(|| anyhow::anyhow!("Usuario no proporcionado"))?;

    if bot.permissions.trust(guild_id, voice_channel, target) {
        respond_text(ctx, command, &format!("✅ <@{}> ahora puede controlar la música", target)).await
    } else {
        respond_error(ctx, command, &format!("<@{}> ya tiene permisos de música.", target)).await
    }
}

// Funciones auxiliares

fn bool_option(command: &CommandInteraction, name: &str) -> Option<bool> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_bool())
}

pub fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Usuarios que no son bots en el canal de voz
fn listeners_in(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let bot_id = ctx.cache.current_user().id;
    let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
        return 0;
    };

    let states = guild.voice_states.values().map(|state| {
        let is_bot = match &state.member {
            Some(member) => Some(member.user.bot),
            None => ctx.cache.user(state.user_id).map(|user| user.bot),
        };
        (state.user_id, state.channel_id, is_bot)
    });

    count_listeners(states, channel_id, bot_id)
}

/// Counts voice states in `channel_id` that belong to people. The bot itself
/// and users known to be bots are left out.
fn count_listeners(
    states: impl Iterator<Item = (UserId, Option<ChannelId>, Option<bool>)>,
    channel_id: ChannelId,
    bot_id: UserId,
) -> usize {
    states
        .filter(|(user_id, channel, is_bot)| {
            *channel == Some(channel_id) && *user_id != bot_id && *is_bot != Some(true)
        })
        .count()
}

fn playback_error_embed(error: &PlaybackError) -> CreateEmbed {
    match error {
        PlaybackError::NotConnected => {
            embeds::create_error_embed("Error", "El bot no está conectado a un canal de voz.")
        }
        other => embeds::create_error_embed("Error", &other.to_string()),
    }
}

async fn respond_playback_error(ctx: &Context, command: &CommandInteraction, error: &PlaybackError) -> Result<()> {
    respond_embed(ctx, command, playback_error_embed(error), true).await
}

async fn respond_error(ctx: &Context, command: &CommandInteraction, message: &str) -> Result<()> {
    respond_text_with(ctx, command, &format!("❌ {}", message), true).await
}

async fn respond_text(ctx: &Context, command: &CommandInteraction, message: &str) -> Result<()> {
    respond_text_with(ctx, command, message, false).await
}

async fn respond_text_with(ctx: &Context, command: &CommandInteraction, message: &str, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(message)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

async fn respond_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

async fn edit_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}
