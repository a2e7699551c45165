//! Join-to-create voice channels.
//!
//! Joining the creator channel (inside the configured category) creates a
//! voice channel owned by that member and moves them into it. The channel is
//! registered with the [`PermissionGate`], so its owner controls playback
//! there and can trust others with `/addpermiss`. Once the last person
//! leaves, the channel is deleted and forgotten.

use anyhow::{Context as _, Result};
use serenity::all::{
    ChannelId, ChannelType, Context, CreateChannel, GuildId, PermissionOverwrite, PermissionOverwriteType,
    Permissions, UserId, VoiceState,
};
use tracing::{info, warn};

use super::permissions::PermissionGate;
use crate::config::Config;

/// Where a voice state change moved a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub left: Option<ChannelId>,
    pub joined: Option<ChannelId>,
}

impl Move {
    pub fn between(old: Option<ChannelId>, new: Option<ChannelId>) -> Self {
        if old == new {
            return Self { left: None, joined: None };
        }
        Self { left: old, joined: new }
    }
}

pub fn is_creator_channel(config: &Config, channel_name: &str, category_name: Option<&str>) -> bool {
    channel_name == config.temp_voice_creator && category_name == Some(config.temp_voice_category.as_str())
}

pub fn temp_channel_name(display_name: &str) -> String {
    format!("🎵 Canal de {}", display_name)
}

fn owner_permissions() -> Permissions {
    Permissions::MANAGE_CHANNELS
        | Permissions::MOVE_MEMBERS
        | Permissions::MUTE_MEMBERS
        | Permissions::DEAFEN_MEMBERS
}

/// Handles a member's voice state change. Bots are ignored.
pub async fn on_voice_state_update(
    ctx: &Context,
    config: &Config,
    gate: &PermissionGate,
    old: Option<&VoiceState>,
    new: &VoiceState,
) {
    if new.member.as_ref().is_some_and(|member| member.user.bot) {
        return;
    }
    let Some(guild_id) = new.guild_id else {
        return;
    };

    let moved = Move::between(old.and_then(|state| state.channel_id), new.channel_id);

    if let Some(channel_id) = moved.left {
        if let Err(e) = release_if_empty(ctx, gate, guild_id, channel_id).await {
            warn!("⚠️ Error eliminando canal temporal {}: {:?}", channel_id, e);
        }
    }

    if let Some(channel_id) = moved.joined {
        let display_name = new
            .member
            .as_ref()
            .map_or_else(|| new.user_id.to_string(), |member| member.display_name().to_string());

        if let Err(e) = create_for(ctx, config, gate, guild_id, channel_id, new.user_id, &display_name).await {
            warn!("⚠️ Error creando canal temporal: {:?}", e);
        }
    }
}

async fn create_for(
    ctx: &Context,
    config: &Config,
    gate: &PermissionGate,
    guild_id: GuildId,
    joined: ChannelId,
    user_id: UserId,
    display_name: &str,
) -> Result<()> {
    // Datos del cache antes de cualquier await
    let category = {
        let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
            return Ok(());
        };
        let Some(channel) = guild.channels.get(&joined) else {
            return Ok(());
        };
        let category_name = channel
            .parent_id
            .and_then(|parent| guild.channels.get(&parent))
            .map(|parent| parent.name.clone());

        if !is_creator_channel(config, &channel.name, category_name.as_deref()) {
            return Ok(());
        }
        channel.parent_id
    };

    let mut builder = CreateChannel::new(temp_channel_name(display_name))
        .kind(ChannelType::Voice)
        .permissions(vec![PermissionOverwrite {
            allow: owner_permissions(),
            deny: Permissions::empty(),
            kind: PermissionOverwriteType::Member(user_id),
        }]);
    if let Some(category) = category {
        builder = builder.category(category);
    }

    let channel = guild_id
        .create_channel(&ctx.http, builder)
        .await
        .context("No se pudo crear el canal")?;
    gate.register(channel.id, user_id);

    guild_id
        .move_member(&ctx.http, user_id, channel.id)
        .await
        .context("No se pudo mover al usuario")?;

    info!("🔊 Canal temporal {} creado para {}", channel.name, user_id);
    Ok(())
}

async fn release_if_empty(ctx: &Context, gate: &PermissionGate, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
    if !gate.is_temp_channel(channel_id) {
        return Ok(());
    }

    let occupied = guild_id.to_guild_cached(&ctx.cache).is_some_and(|guild| {
        guild
            .voice_states
            .values()
            .any(|state| state.channel_id == Some(channel_id))
    });
    if occupied {
        return Ok(());
    }

    gate.unregister(guild_id, channel_id);
    channel_id.delete(&ctx.http).await.context("No se pudo borrar el canal")?;

    info!("🗑️ Canal temporal {} eliminado", channel_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const A: ChannelId = ChannelId::new(1);
    const B: ChannelId = ChannelId::new(2);

    #[test]
    fn moves_between_channels() {
        assert_eq!(Move::between(None, Some(A)), Move { left: None, joined: Some(A) });
        assert_eq!(Move::between(Some(A), None), Move { left: Some(A), joined: None });
        assert_eq!(Move::between(Some(A), Some(B)), Move { left: Some(A), joined: Some(B) });
        // mute/deafen sin cambio de canal
        assert_eq!(Move::between(Some(A), Some(A)), Move { left: None, joined: None });
    }

    #[test]
    fn creator_channel_needs_name_and_category() {
        let config = Config::default();

        assert!(is_creator_channel(&config, "➕ Create Voice", Some("Temp Channels")));
        assert!(!is_creator_channel(&config, "➕ Create Voice", Some("General")));
        assert!(!is_creator_channel(&config, "➕ Create Voice", None));
        assert!(!is_creator_channel(&config, "Lounge", Some("Temp Channels")));
    }

    #[test]
    fn owner_can_manage_their_channel() {
        let permissions = owner_permissions();

        assert!(permissions.manage_channels());
        assert!(permissions.move_members());
        assert!(!permissions.administrator());
        assert_eq!(temp_channel_name("ana"), "🎵 Canal de ana");
    }
}
