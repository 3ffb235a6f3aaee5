//! Discord delivery.
//!
//! - [`client`] - REST transport: bot auth, identifying header, 429 backoff
//! - [`cache`] - Channel type lookup cache
//! - [`gateway`] - Channel-type dispatch (forum thread vs. text message)

mod cache;
mod client;
mod gateway;

use thiserror::Error;

pub use cache::{ChannelCache, ChannelInfo, ChannelKind};
pub use client::{
    retry_delay, DiscordClient, DEFAULT_API_BASE, DEFAULT_RETRY_DELAY, MAX_RATE_LIMIT_RETRIES,
    MAX_RETRY_DELAY,
};
pub use gateway::{
    render_content, Delivery, Gateway, MAX_THREAD_NAME_CHARS, MAX_TITLE_CHARS,
    THREAD_AUTO_ARCHIVE_MINUTES,
};

/// Errors from Discord calls.
#[derive(Debug, Error)]
pub enum DiscordError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Discord request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-2xx response, including a 429 that outlived the retries
    #[error("Discord API error: status {status}: {body}")]
    Api { status: u16, body: String },
    /// The channel is neither a text nor a forum channel
    #[error("Unsupported channel type {code} for channel {channel_id}")]
    UnsupportedChannelType { channel_id: String, code: u8 },
    /// Payload could not be encoded or the response decoded
    #[error("Discord payload error: {0}")]
    Decode(#[from] serde_json::Error),
}
