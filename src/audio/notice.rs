use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::ChannelId;

use crate::sources::Track;

/// Human-readable playback updates sent to a guild's text channel.
#[derive(Debug, Clone)]
pub enum Notice {
    NowPlaying(Track),
    /// La pista no se pudo iniciar y se pasa a la siguiente
    SkippingAfterError { title: String, reason: String },
    /// Falló a mitad de reproducción y se agotaron los reintentos
    PlaybackFault { title: String },
    QueueEnded,
}

/// Delivery is best effort: callers log a failure and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel_id: ChannelId, notice: Notice) -> Result<()>;
}
