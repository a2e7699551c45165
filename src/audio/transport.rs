use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;

use super::transcoder::PcmStream;

/// Events a voice connection feeds back into a guild's session loop.
///
/// Track events carry the `play_id` they were started with so a late event
/// from a replaced track can be told apart from the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TrackEnded { play_id: u64 },
    TrackErrored { play_id: u64, reason: String },
    Disconnected,
    Recovered,
    /// Algo se encoló mientras la sesión estaba inactiva
    Kick,
}

/// A connected voice channel's player.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, stream: PcmStream, play_id: u64, volume: f32) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn set_volume(&self, volume: f32) -> Result<()>;
}

/// Opens and closes voice connections.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Joins `channel_id`. Track and connection events go to `events`.
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: flume::Sender<SessionEvent>,
    ) -> Result<Arc<dyn AudioSink>>;

    async fn disconnect(&self, guild_id: GuildId) -> Result<()>;
}
