use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::HashSet;
use tracing::info;

/// A user-owned temporary voice channel.
#[derive(Debug, Clone)]
struct TempChannel {
    owner_id: UserId,
}

/// Who may control playback from a given voice channel.
///
/// Ordinary channels are open to everyone. In a temporary channel only the
/// owner and the users they trusted can use control commands; the rest
/// fall back to `/voteskip`.
#[derive(Default)]
pub struct PermissionGate {
    temp_channels: DashMap<ChannelId, TempChannel>,
    trusted: DashMap<(GuildId, ChannelId), HashSet<UserId>>,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `channel_id` as a temporary channel owned by `owner_id`.
    pub fn register(&self, channel_id: ChannelId, owner_id: UserId) {
        self.temp_channels.insert(channel_id, TempChannel { owner_id });
    }

    /// Forgets a temporary channel and everyone trusted in it.
    pub fn unregister(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.temp_channels.remove(&channel_id);
        self.trusted.remove(&(guild_id, channel_id));
    }

    pub fn is_owner(&self, channel_id: ChannelId, user_id: UserId) -> bool {
        self.temp_channels
            .get(&channel_id)
            .is_some_and(|channel| channel.owner_id == user_id)
    }

    pub fn is_temp_channel(&self, channel_id: ChannelId) -> bool {
        self.temp_channels.contains_key(&channel_id)
    }

    pub fn has_permission(&self, guild_id: GuildId, channel_id: ChannelId, user_id: UserId) -> bool {
        if !self.is_temp_channel(channel_id) {
            return true;
        }
        if self.is_owner(channel_id, user_id) {
            return true;
        }

        self.trusted
            .get(&(guild_id, channel_id))
            .is_some_and(|users| users.contains(&user_id))
    }

    /// Lets `user_id` control playback in the channel. Returns false if
    /// they already could.
    pub fn trust(&self, guild_id: GuildId, channel_id: ChannelId, user_id: UserId) -> bool {
        let added = self
            .trusted
            .entry((guild_id, channel_id))
            .or_default()
            .insert(user_id);

        if added {
            info!("🔑 Permisos de música para {} en canal {}", user_id, channel_id);
        }
        added
    }
}
