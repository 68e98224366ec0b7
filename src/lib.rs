#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Background Removal Bot
//!
//! A chat bot that accepts images, replaces their background with
//! transparency and returns the result as a PNG file.
//!
//! Every request runs the same pipeline:
//!
//! 1. **Decode** the uploaded bytes (JPEG, PNG, WebP, BMP, TIFF, GIF) into RGB
//! 2. **Infer** a foreground mask with the configured [`MaskBackend`]
//! 3. **Composite** the mask into the alpha channel at the source resolution
//! 4. **Encode** the RGBA result as PNG
//!
//! ## Features
//!
//! - **Two inference backends**: a remote HTTP endpoint (default) or a local
//!   ONNX model run through ONNX Runtime
//! - **Bounded work**: every inference call and file transfer has a timeout
//! - **Stage-aware failures**: each failure records the pipeline stage it
//!   happened in; users always see the same generic message
//! - **Health endpoint** for hosting platforms that probe a port
//!
//! ## Library Usage
//!
//! The pipeline can be driven without the chat transport:
//!
//! ```rust,no_run
//! use bgremove_bot::{
//!     BackendFactory, BotConfig, DefaultBackendFactory, remove_background_from_bytes,
//! };
//! use std::time::Duration;
//!
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let config = BotConfig::from_env()?;
//! let backend = DefaultBackendFactory.create_backend(&config)?;
//! let output = remove_background_from_bytes(backend, &upload, Duration::from_secs(30)).await?;
//! std::fs::write("no_bg.png", &output.png_bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): local inference through ONNX Runtime
//! - `cli` (default): the `bgremove-bot` binary and subscriber setup
//! - `tracing-json`: JSON log output

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod health;
pub mod inference;
pub mod models;
pub mod processor;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod transport;
pub mod types;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;

// Public API exports
pub use backends::*;
pub use compositor::Compositor;
pub use config::{
    BotConfig, BotConfigBuilder, ExecutionProvider, LocalInferenceConfig, MaskActivation,
    RemoteInferenceConfig,
};
pub use error::{BgRemovalError, Result};
pub use inference::{InferenceInput, MaskBackend, SegmentationModel};
pub use models::{ModelInfo, ModelSpec, PreprocessingConfig};
pub use processor::{
    BackendFactory, BackendType, BackgroundRemovalProcessor, DefaultBackendFactory,
    PipelineFailure, PipelineOutput,
};
pub use services::{
    ImageCodec, NoOpProgressReporter, PipelineStage, ProgressReporter, ProgressTracker,
    ProgressUpdate, TracingProgressReporter, OUTPUT_FILE_NAME, OUTPUT_MIME_TYPE,
};
pub use transport::{
    BotRunner, ChatTransport, IncomingImage, RequestHandler, RequestOutcome, StatusGuard,
    TelegramTransport, UpdateSource,
};
pub use types::{AlphaMask, CompositeImage, ProcessingTimings, RequestContext, SourceImage};
pub use utils::{ImagePreprocessor, TensorValidator};

#[cfg(feature = "cli")]
pub use tracing_config::{spans, TracingConfig, TracingFormat};

/// Remove the background from an image provided as bytes
///
/// Runs the full pipeline outside of any chat request. The stage of a failure
/// is logged; the returned error carries only its cause.
///
/// # Arguments
///
/// * `backend` - Mask backend, usually built by [`DefaultBackendFactory`]
/// * `image_bytes` - Raw image data (JPEG, PNG, WebP, BMP, TIFF, GIF)
/// * `inference_timeout` - Upper bound for the inference call
pub async fn remove_background_from_bytes(
    backend: Arc<dyn MaskBackend>,
    image_bytes: &[u8],
    inference_timeout: Duration,
) -> Result<PipelineOutput> {
    let processor = BackgroundRemovalProcessor::new(backend, inference_timeout);
    let ctx = RequestContext::new(0, None);
    processor
        .process_bytes(&ctx, image_bytes)
        .await
        .map_err(|failure| {
            tracing::debug!(stage = %failure.stage, "Standalone pipeline run failed");
            failure.error
        })
}

/// Remove the background from an async reader stream
///
/// The stream is read to the end before decoding starts.
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    backend: Arc<dyn MaskBackend>,
    inference_timeout: Duration,
) -> Result<PipelineOutput> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer).await?;
    remove_background_from_bytes(backend, &buffer, inference_timeout).await
}
