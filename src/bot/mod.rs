//! # Bot Module
//!
//! Discord side of lag-music: slash commands, permission checks and the
//! gateway events that affect playback.
//!
//! ## Architecture
//!
//! [`LagMusicBot`] implements Serenity's [`EventHandler`] trait. It holds:
//!
//! - the [`PlaybackController`] that owns every guild session
//! - the [`TrackResolver`] turning queries into tracks
//! - the [`PermissionGate`] consulted before control commands, fed by the
//!   temporary voice channels in [`temp_voice`]

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;
pub mod permissions;
pub mod temp_voice;

use crate::{
    audio::player::PlaybackController, config::Config, sources::TrackResolver,
};
use permissions::PermissionGate;

/// Main Discord bot handler.
///
/// ## Fields
///
/// - `config`: bot configuration (token, command scope)
/// - `controller`: per-guild playback sessions
/// - `resolver`: query to track resolution
/// - `permissions`: temporary channel ownership and trust
pub struct LagMusicBot {
    config: Arc<Config>,
    pub controller: Arc<PlaybackController>,
    pub resolver: Arc<TrackResolver>,
    pub permissions: Arc<PermissionGate>,
}

impl LagMusicBot {
    pub fn new(
        config: Arc<Config>,
        controller: Arc<PlaybackController>,
        resolver: Arc<TrackResolver>,
        permissions: Arc<PermissionGate>,
    ) -> Self {
        Self {
            config,
            controller,
            resolver,
            permissions,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set, commands are registered for that guild only
    /// (instant propagation, useful during development). Otherwise they are
    /// registered globally, which can take up to an hour to show up.
    ///
    /// # Required Permissions
    ///
    /// The bot must have `applications.commands` permission in the target guild(s).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for LagMusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Slash commands only; other interaction kinds are ignored.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Member moves drive temporary channels. When the bot itself is
    /// removed from its voice channel by someone else, the session is torn
    /// down.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            temp_voice::on_voice_state_update(&ctx, &self.config, &self.permissions, old.as_ref(), &new).await;
            return;
        }
        if old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        if self.controller.destroy(guild_id).await {
            warn!("🔌 Bot desconectado del canal de voz en guild {}, sesión cerrada", guild_id);
        }
    }
}
