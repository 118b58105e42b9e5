use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;

use crate::ui::{embeds::PanelContent, panel::PanelChannel};

/// Mensajería real con la API HTTP de Discord.
pub struct SerenityChannel {
    http: Arc<Http>,
}

impl SerenityChannel {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PanelChannel for SerenityChannel {
    async fn send(&self, channel_id: ChannelId, content: &PanelContent) -> Result<MessageId> {
        let message = channel_id
            .send_message(
                self.http.as_ref(),
                CreateMessage::new()
                    .embed(content.to_embed())
                    .components(content.to_components()),
            )
            .await?;

        Ok(message.id)
    }

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &PanelContent,
    ) -> Result<()> {
        channel_id
            .edit_message(
                self.http.as_ref(),
                message_id,
                EditMessage::new()
                    .embed(content.to_embed())
                    .components(content.to_components()),
            )
            .await?;

        Ok(())
    }

    async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        channel_id
            .delete_message(self.http.as_ref(), message_id)
            .await?;
        Ok(())
    }

    async fn say(&self, channel_id: ChannelId, text: &str) -> Result<()> {
        channel_id.say(self.http.as_ref(), text).await?;
        Ok(())
    }
}
