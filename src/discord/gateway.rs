use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::cache::{ChannelCache, ChannelInfo, ChannelKind};
use super::client::DiscordClient;
use super::DiscordError;
use crate::util::{clamp_chars, sanitize_link};

/// Longest title included in any message body
pub const MAX_TITLE_CHARS: usize = 100;
/// Discord's limit on thread names
pub const MAX_THREAD_NAME_CHARS: usize = 90;
/// Forum threads archive after one day of inactivity
pub const THREAD_AUTO_ARCHIVE_MINUTES: u32 = 1440;

/// What a successful delivery created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Delivery {
    /// A forum thread (id of the thread)
    Thread(String),
    /// A plain message (id of the message)
    Message(String),
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct ThreadPayload<'a> {
    name: &'a str,
    auto_archive_duration: u32,
    message: MessagePayload<'a>,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

/// Posts articles into Discord channels, adapting to the channel type.
///
/// Forum channels get a new thread per article; text channels get a plain
/// message. Channel types are resolved once per channel and kept in the
/// shared [`ChannelCache`].
#[derive(Debug)]
pub struct Gateway {
    client: DiscordClient,
    cache: Arc<ChannelCache>,
}

impl Gateway {
    pub fn new(client: DiscordClient, cache: Arc<ChannelCache>) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &Arc<ChannelCache> {
        &self.cache
    }

    /// Channel metadata, from the cache when present.
    pub async fn resolve_channel(&self, channel_id: &str) -> Result<ChannelInfo, DiscordError> {
        if let Some(info) = self.cache.get(channel_id) {
            return Ok(info);
        }

        let info: ChannelInfo = self
            .client
            .get_json(&format!("/channels/{}", channel_id))
            .await?;

        tracing::debug!(
            channel = %channel_id,
            kind = info.kind.code(),
            name = info.name.as_deref().unwrap_or(""),
            "Channel resolved"
        );
        self.cache.insert(channel_id, info.clone());
        Ok(info)
    }

    /// Delivers one article to `channel_id`.
    ///
    /// The title is clamped to [`MAX_TITLE_CHARS`]; the link is re-validated
    /// and silently omitted when malformed.
    ///
    /// # Errors
    ///
    /// - [`DiscordError::UnsupportedChannelType`] - neither forum nor text;
    ///   only the channel lookup was sent
    /// - [`DiscordError::Api`] - Discord refused the call (after rate-limit retries)
    /// - [`DiscordError::Network`] / [`DiscordError::Decode`] - transport failures
    pub async fn post_article(
        &self,
        channel_id: &str,
        title: &str,
        link: Option<&str>,
    ) -> Result<Delivery, DiscordError> {
        let channel = self.resolve_channel(channel_id).await?;
        let title = clamp_chars(title.trim(), MAX_TITLE_CHARS);
        let content = render_content(&title, link);

        match channel.kind {
            ChannelKind::Forum => {
                let name = clamp_chars(&title, MAX_THREAD_NAME_CHARS);
                let payload = ThreadPayload {
                    name: &name,
                    auto_archive_duration: THREAD_AUTO_ARCHIVE_MINUTES,
                    message: MessagePayload { content: &content },
                };
                let created: Created = self
                    .client
                    .post_json(&format!("/channels/{}/threads", channel_id), &payload)
                    .await?;
                tracing::info!(channel = %channel_id, thread = %created.id, "Forum thread created");
                Ok(Delivery::Thread(created.id))
            }
            ChannelKind::Text => {
                let payload = MessagePayload { content: &content };
                let created: Created = self
                    .client
                    .post_json(&format!("/channels/{}/messages", channel_id), &payload)
                    .await?;
                tracing::info!(channel = %channel_id, message = %created.id, "Message posted");
                Ok(Delivery::Message(created.id))
            }
            ChannelKind::Other(code) => Err(DiscordError::UnsupportedChannelType {
                channel_id: channel_id.to_string(),
                code,
            }),
        }
    }
}

/// Message body: the title, then the link on its own line when valid.
pub fn render_content(title: &str, link: Option<&str>) -> String {
    match sanitize_link(link) {
        Some(link) => format!("{}\n{}", title, link),
        None => title.to_string(),
    }
}
