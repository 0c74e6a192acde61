//! The chat side of the relay.

use async_trait::async_trait;
use thiserror::Error;

use crate::formatter::EntryEmbed;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Text(String),
    Embed(EntryEmbed),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("rate limited by the messaging service")]
    RateLimited,
    #[error("messaging service rejected the token: {0}")]
    Unauthorized(String),
    #[error("channel {0} not found or not visible to the bot")]
    ChannelNotFound(String),
    #[error("messaging service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
}

/// A resolved channel that accepts announcements.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), SinkError>;
}
