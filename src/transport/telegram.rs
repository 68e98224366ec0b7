//! Telegram Bot API transport
//!
//! Thin reqwest client over the handful of Bot API methods the bot uses:
//! `getUpdates` (long polling), `getFile` plus the file download endpoint,
//! `sendMessage`, `editMessageText`, `deleteMessage` and `sendDocument`.
//! Request URLs embed the bot token, so errors are stripped of their URL
//! before they are logged.

use super::{
    ChatTransport, ImageKind, InboundEvent, InboundUpdate, IncomingImage, StatusHandle,
    UpdateSource,
};
use crate::{
    config::BotConfig,
    error::{BgRemovalError, Result},
    services::ImageCodec,
};
use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Extra time granted to a long poll on top of the server-side wait
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    username: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

/// Pick the highest-resolution rendition of a photo
#[must_use]
pub fn largest_photo(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    sizes.iter().max_by_key(|p| {
        (
            u64::from(p.width) * u64::from(p.height),
            p.file_size.unwrap_or(0),
        )
    })
}

/// Classify an update into something the bot reacts to
#[must_use]
pub fn classify_update(update: &Update) -> InboundEvent {
    let Some(message) = &update.message else {
        return InboundEvent::Ignored;
    };
    let chat_id = message.chat.id;

    if let Some(photo) = message.photo.as_deref().and_then(largest_photo) {
        return InboundEvent::Image(IncomingImage {
            chat_id,
            message_id: message.message_id,
            file_id: photo.file_id.clone(),
            kind: ImageKind::Photo,
            file_size: photo.file_size,
        });
    }

    if let Some(document) = &message.document {
        let is_image = document
            .mime_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("image/"));
        if is_image {
            return InboundEvent::Image(IncomingImage {
                chat_id,
                message_id: message.message_id,
                file_id: document.file_id.clone(),
                kind: ImageKind::Document,
                file_size: document.file_size,
            });
        }
    }

    if let Some(text) = message.text.as_deref().map(str::trim) {
        if text.starts_with('/') {
            let command = text
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .split('@')
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase();
            return InboundEvent::Command { chat_id, command };
        }
    }

    InboundEvent::Ignored
}

/// Chat transport backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    client: Client,
    method_base: String,
    file_base: String,
    poll_timeout_secs: u64,
}

impl fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Both base URLs embed the token
        f.debug_struct("TelegramTransport")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl TelegramTransport {
    /// Create a transport from the bot configuration
    ///
    /// # Errors
    /// - the HTTP client cannot be constructed
    pub fn new(config: &BotConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.transfer_timeout())
            .build()
            .map_err(|e| BgRemovalError::config(format!("Failed to create HTTP client: {e}")))?;

        let api = config.telegram_api_url.trim_end_matches('/');
        Ok(Self {
            client,
            method_base: format!("{api}/bot{}", config.bot_token),
            file_base: format!("{api}/file/bot{}", config.bot_token),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    /// Verify the token and return the bot's username
    ///
    /// # Errors
    /// - the API rejects the token or cannot be reached
    pub async fn get_me(&self) -> Result<String> {
        let user: User = self.call("getMe", &json!({})).await?;
        Ok(user.username.unwrap_or_default())
    }

    /// Long-poll raw updates
    ///
    /// # Errors
    /// - network failure or an API error response
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let payload = GetUpdates {
            offset,
            timeout: self.poll_timeout_secs,
            allowed_updates: ["message"],
        };
        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(self.poll_timeout_secs) + POLL_GRACE)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error("getUpdates", &e.without_url()))?;
        Self::parse_response("getUpdates", response).await
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.method_base)
    }

    async fn call<T, P>(&self, method: &str, payload: &P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(method, &e.without_url()))?;
        Self::parse_response(method, response).await
    }

    async fn parse_response<T: DeserializeOwned>(method: &str, response: Response) -> Result<T> {
        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(|e| {
            BgRemovalError::transport(format!(
                "{method} returned an unreadable response (HTTP {status}): {}",
                e.without_url()
            ))
        })?;

        if !body.ok {
            return Err(BgRemovalError::transport(format!(
                "{method} failed ({}): {}",
                body.error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                body.description.unwrap_or_else(|| "no description".to_string())
            )));
        }
        body.result
            .ok_or_else(|| BgRemovalError::transport(format!("{method} returned no result")))
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    #[instrument(skip(self, image), fields(kind = ?image.kind, file_size = image.file_size))]
    async fn download(&self, image: &IncomingImage) -> Result<Vec<u8>> {
        let file: File = self
            .call("getFile", &json!({ "file_id": image.file_id }))
            .await?;
        let file_path = file
            .file_path
            .ok_or_else(|| BgRemovalError::transport("getFile returned no file path"))?;

        let response = self
            .client
            .get(format!("{}/{file_path}", self.file_base))
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error("file download", &e.without_url()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BgRemovalError::transport(format!(
                "file download returned HTTP {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BgRemovalError::network_error("file download", &e.without_url()))?;
        debug!(bytes = bytes.len(), "Image downloaded");
        Ok(bytes.to_vec())
    }

    async fn post_status(&self, chat_id: i64, text: &str) -> Result<StatusHandle> {
        let message: Message = self
            .call("sendMessage", &json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(StatusHandle {
            chat_id: message.chat.id,
            message_id: message.message_id,
        })
    }

    async fn update_status(&self, handle: &StatusHandle, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &json!({
                    "chat_id": handle.chat_id,
                    "message_id": handle.message_id,
                    "text": text,
                }),
            )
            .await?;
        Ok(())
    }

    async fn delete_status(&self, handle: &StatusHandle) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": handle.chat_id, "message_id": handle.message_id }),
            )
            .await?;
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: Message = self
            .call("sendMessage", &json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, bytes, caption), fields(bytes = bytes.len()))]
    async fn deliver_result(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        bytes: Vec<u8>,
        filename: &str,
        caption: &str,
    ) -> Result<()> {
        let mime = ImageCodec::mime_type(ImageCodec::sniff_format(&bytes));
        let document = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime)
            .map_err(|e| BgRemovalError::transport(format!("Invalid attachment type: {e}")))?;

        let mut form = multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", document);
        if let Some(message_id) = reply_to {
            form = form.text("reply_to_message_id", message_id.to_string());
        }

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error("sendDocument", &e.without_url()))?;
        let _: Message = Self::parse_response("sendDocument", response).await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramTransport {
    async fn poll_updates(&self, offset: Option<i64>) -> Result<Vec<InboundUpdate>> {
        let updates = self.get_updates(offset).await?;
        Ok(updates
            .iter()
            .map(|update| InboundUpdate {
                update_id: update.update_id,
                event: classify_update(update),
            })
            .collect())
    }
}
