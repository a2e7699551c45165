use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::{builder::CreateMessage, http::Http, model::id::ChannelId};
use std::sync::Arc;

use crate::{
    audio::notice::{Notice, Notifier},
    ui::embeds,
};

/// Posts playback notices as embeds in the guild's text channel.
pub struct ChannelNotifier {
    http: Arc<Http>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, channel_id: ChannelId, notice: Notice) -> Result<()> {
        let message = CreateMessage::new().embed(embeds::create_notice_embed(&notice));
        channel_id
            .send_message(&self.http, message)
            .await
            .with_context(|| format!("no se pudo enviar el aviso al canal {}", channel_id))?;
        Ok(())
    }
}
