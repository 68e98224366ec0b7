//! Per-request orchestration between the chat transport and the pipeline
//!
//! One [`RequestHandler::handle`] call drives one chat request end to end:
//! acknowledge, download, process, deliver or apologize, then clear the
//! acknowledgment. Every runtime failure ends here; none propagates to the
//! polling loop.

use super::{ChatTransport, IncomingImage, StatusHandle};
use crate::{
    error::{BgRemovalError, Result},
    processor::{BackgroundRemovalProcessor, PipelineFailure},
    services::{PipelineStage, OUTPUT_FILE_NAME},
    types::{ProcessingTimings, RequestContext},
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

/// Transient acknowledgment shown while a request is in flight
pub const PROCESSING_MESSAGE: &str = "⏳ Removing the background, please wait...";

/// The only failure text users ever see
pub const FAILURE_MESSAGE: &str = "❌ Something went wrong, please try again.";

/// Caption attached to delivered results
pub const RESULT_CAPTION: &str = "✨ Done, the background is transparent!";

/// Reply to `/start` and `/help`
pub const USAGE_MESSAGE: &str =
    "Send me a photo (or an image file for best quality) and I will return it as a PNG with the background removed.";

/// Terminal state of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Delivered {
        dimensions: (u32, u32),
        timings: ProcessingTimings,
    },
    Failed {
        stage: PipelineStage,
        error_kind: &'static str,
    },
}

/// Scoped ownership of a posted status message
///
/// The message is deleted exactly once: by [`StatusGuard::release`] on the
/// normal path, or by a background task spawned from `Drop` if the request
/// future is dropped first.
pub struct StatusGuard {
    transport: Arc<dyn ChatTransport>,
    handle: Option<StatusHandle>,
}

impl StatusGuard {
    /// Post a status message and take ownership of it
    ///
    /// A failure to post is logged and yields an empty guard; the request
    /// proceeds without an acknowledgment.
    pub async fn acquire(transport: Arc<dyn ChatTransport>, chat_id: i64, text: &str) -> Self {
        let handle = match transport.post_status(chat_id, text).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Could not post status message");
                None
            },
        };
        Self { transport, handle }
    }

    #[must_use]
    pub fn handle(&self) -> Option<&StatusHandle> {
        self.handle.as_ref()
    }

    /// Replace the status text, keeping ownership
    pub async fn update(&self, text: &str) {
        if let Some(handle) = &self.handle {
            if let Err(e) = self.transport.update_status(handle, text).await {
                warn!(error = %e, "Could not update status message");
            }
        }
    }

    /// Delete the status message
    pub async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.transport.delete_status(&handle).await {
                warn!(error = %e, "Could not delete status message");
            }
        }
    }
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = transport.delete_status(&handle).await {
                        warn!(error = %e, "Could not delete abandoned status message");
                    }
                });
            },
            Err(_) => warn!(
                chat_id = handle.chat_id,
                message_id = handle.message_id,
                "Status message abandoned outside a runtime"
            ),
        }
    }
}

/// Drives a single image request through the pipeline
#[derive(Clone)]
pub struct RequestHandler {
    transport: Arc<dyn ChatTransport>,
    processor: BackgroundRemovalProcessor,
    transfer_timeout: Duration,
}

impl RequestHandler {
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        processor: BackgroundRemovalProcessor,
        transfer_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            processor,
            transfer_timeout,
        }
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    /// Handle one incoming image
    ///
    /// The user receives exactly one of the result document or
    /// [`FAILURE_MESSAGE`], and the status message is cleared afterwards.
    pub async fn handle(&self, image: IncomingImage) -> RequestOutcome {
        let ctx = RequestContext::new(image.chat_id, Some(image.message_id));
        let span = info_span!(
            "request",
            request_id = %ctx.request_id,
            chat_id = ctx.chat_id,
            message_id = image.message_id
        );
        self.handle_in_context(&ctx, image).instrument(span).await
    }

    async fn handle_in_context(&self, ctx: &RequestContext, image: IncomingImage) -> RequestOutcome {
        info!(kind = ?image.kind, "Image received");
        let status =
            StatusGuard::acquire(Arc::clone(&self.transport), ctx.chat_id, PROCESSING_MESSAGE).await;

        let outcome = match self.run(ctx, &image).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                error!(
                    stage = %failure.stage,
                    error_kind = failure.error.kind(),
                    error = %failure.error,
                    elapsed_ms = ctx.elapsed_ms(),
                    "Request failed"
                );
                if let Err(e) = self.transport.send_text(ctx.chat_id, FAILURE_MESSAGE).await {
                    warn!(error = %e, "Could not send failure message");
                }
                RequestOutcome::Failed {
                    stage: failure.stage,
                    error_kind: failure.error.kind(),
                }
            },
        };

        status.release().await;
        outcome
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        image: &IncomingImage,
    ) -> std::result::Result<RequestOutcome, PipelineFailure> {
        let bytes = self
            .bounded("download", self.transport.download(image))
            .await
            .map_err(|e| PipelineFailure::new(PipelineStage::Received, e))?;

        let output = self.processor.process_bytes(ctx, &bytes).await?;
        drop(bytes);

        self.bounded(
            "delivery",
            self.transport.deliver_result(
                ctx.chat_id,
                ctx.message_id,
                output.png_bytes,
                OUTPUT_FILE_NAME,
                RESULT_CAPTION,
            ),
        )
        .await
        .map_err(|e| PipelineFailure::new(PipelineStage::Delivered, e))?;

        info!(
            width = output.dimensions.0,
            height = output.dimensions.1,
            elapsed_ms = ctx.elapsed_ms(),
            "Result delivered"
        );
        Ok(RequestOutcome::Delivered {
            dimensions: output.dimensions,
            timings: output.timings,
        })
    }

    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.transfer_timeout, fut)
            .await
            .map_err(|_| {
                BgRemovalError::transport(format!(
                    "{operation} timed out after {}s",
                    self.transfer_timeout.as_secs_f64()
                ))
            })?
    }
}
