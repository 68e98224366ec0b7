//! Chat transport layer
//!
//! The request handler only needs a handful of operations from the chat
//! platform: fetch the image bytes, post/update/delete a transient status
//! message, send text, and deliver the result as a file attachment. Those are
//! captured by [`ChatTransport`]; [`UpdateSource`] feeds the polling loop.

pub mod handler;
pub mod runner;
pub mod telegram;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use handler::{RequestHandler, RequestOutcome, StatusGuard};
pub use runner::BotRunner;
pub use telegram::TelegramTransport;

/// How the image reached the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    /// Compressed photo; the largest available size is used
    Photo,
    /// Uncompressed file attachment with an image MIME type
    Document,
}

/// An image message waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingImage {
    pub chat_id: i64,
    pub message_id: i64,
    /// Platform file reference used to download the bytes
    pub file_id: String,
    pub kind: ImageKind,
    /// Declared size in bytes, when the platform reports it
    pub file_size: Option<u64>,
}

/// Handle of a posted status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusHandle {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Inbound event after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A photo or image document
    Image(IncomingImage),
    /// A bot command such as `/start`
    Command { chat_id: i64, command: String },
    /// Anything the bot does not react to
    Ignored,
}

/// Classified update with its platform sequence number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub event: InboundEvent,
}

/// Operations the request handler needs from the chat platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Download the raw bytes of an incoming image
    async fn download(&self, image: &IncomingImage) -> Result<Vec<u8>>;

    /// Post a transient status message
    async fn post_status(&self, chat_id: i64, text: &str) -> Result<StatusHandle>;

    /// Replace the text of a status message
    async fn update_status(&self, handle: &StatusHandle, text: &str) -> Result<()>;

    /// Remove a status message
    async fn delete_status(&self, handle: &StatusHandle) -> Result<()>;

    /// Send a plain text message
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Deliver a file attachment
    async fn deliver_result(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        bytes: Vec<u8>,
        filename: &str,
        caption: &str,
    ) -> Result<()>;
}

/// Source of inbound updates for the polling loop
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch the next batch of updates with ids >= `offset`
    async fn poll_updates(&self, offset: Option<i64>) -> Result<Vec<InboundUpdate>>;
}
