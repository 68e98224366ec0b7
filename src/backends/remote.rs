//! Remote mask backend
//!
//! Forwards the original image bytes to an HTTP inference endpoint (the
//! `BiRefNet` model on the `HuggingFace` inference API by default) and reads
//! the mask back from the response body.

use crate::{
    config::{redacted, RemoteInferenceConfig},
    error::{BgRemovalError, Result},
    inference::{InferenceInput, MaskBackend},
    services::ImageCodec,
    types::AlphaMask,
};
use async_trait::async_trait;
use reqwest::{header, Client};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Longest response body excerpt written to logs
const MAX_LOGGED_BODY: usize = 512;

/// Mask backend calling an HTTP inference endpoint
#[derive(Clone)]
pub struct RemoteBackend {
    client: Client,
    endpoint_url: String,
    api_token: Option<String>,
}

impl fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("endpoint_url", &self.endpoint_url)
            .field("api_token", &redacted(self.api_token.as_deref()))
            .finish_non_exhaustive()
    }
}

impl RemoteBackend {
    /// Create a backend with its own HTTP client
    ///
    /// # Errors
    /// - the HTTP client cannot be constructed
    pub fn new(config: &RemoteInferenceConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BgRemovalError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url.clone(),
            api_token: config.api_token.clone(),
        })
    }

    #[must_use]
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}

fn request_error(error: &reqwest::Error) -> BgRemovalError {
    let kind = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "could not connect"
    } else {
        "failed"
    };
    BgRemovalError::inference(format!("Inference request {kind}: {error}"))
}

fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(MAX_LOGGED_BODY) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}

#[async_trait]
impl MaskBackend for RemoteBackend {
    #[instrument(skip(self, input), fields(endpoint = %self.endpoint_url, bytes = input.raw_bytes.len()))]
    async fn infer(&self, input: InferenceInput<'_>) -> Result<AlphaMask> {
        let content_type = ImageCodec::mime_type(ImageCodec::sniff_format(input.raw_bytes));

        let mut request = self
            .client
            .post(&self.endpoint_url)
            .header(header::CONTENT_TYPE, content_type)
            .body(input.raw_bytes.to_vec());
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| request_error(&e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| request_error(&e))?;

        if !status.is_success() {
            warn!(%status, body = %truncate_body(&body), "Inference endpoint rejected request");
            return Err(BgRemovalError::inference(format!(
                "Inference endpoint returned HTTP {status}"
            )));
        }
        if body.is_empty() {
            return Err(BgRemovalError::inference(
                "Inference endpoint returned an empty body",
            ));
        }

        debug!(response_bytes = body.len(), "Inference response received");
        ImageCodec::decode_mask(&body).map_err(|e| {
            warn!(error = %e, body = %truncate_body(&body), "Inference response is not an image");
            BgRemovalError::inference(format!("Inference response is not a valid mask: {e}"))
        })
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
