//! Background removal processor
//!
//! This module provides the `BackgroundRemovalProcessor` that runs one request
//! through decode, inference, compositing and encoding, strictly in sequence.
//! It owns no per-request state: everything a run needs travels in its
//! arguments, and the only shared piece is the mask backend behind an `Arc`.

use crate::{
    compositor::Compositor,
    config::BotConfig,
    error::{BgRemovalError, Result},
    inference::{InferenceInput, MaskBackend},
    services::{ImageCodec, NoOpProgressReporter, PipelineStage, ProgressReporter, ProgressTracker},
    types::{ProcessingTimings, RequestContext},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, span, Instrument, Level};

/// Mask backend variant, selected once at startup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// HTTP inference endpoint
    #[default]
    Remote,
    /// In-process ONNX model
    Local,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Remote => f.write_str("remote"),
            BackendType::Local => f.write_str("local"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(BackendType::Remote),
            "local" => Ok(BackendType::Local),
            other => Err(BgRemovalError::config_value_error(
                "INFERENCE_BACKEND",
                other,
                "remote, local",
            )),
        }
    }
}

/// Factory trait for creating mask backends
pub trait BackendFactory: Send + Sync {
    /// Create the backend selected by the configuration
    ///
    /// # Errors
    ///
    /// Returns `BgRemovalError::Config` for:
    /// - backend types not compiled into this build
    /// - model loading failures
    /// - HTTP client construction failures
    fn create_backend(&self, config: &BotConfig) -> Result<Arc<dyn MaskBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Default backend factory implementation
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, config: &BotConfig) -> Result<Arc<dyn MaskBackend>> {
        match config.backend_type {
            BackendType::Remote => {
                let backend =
                    crate::backends::RemoteBackend::new(&config.remote, config.inference_timeout())?;
                info!(endpoint = %backend.endpoint_url(), "Using remote inference backend");
                Ok(Arc::new(backend))
            },
            #[cfg(feature = "onnx")]
            BackendType::Local => {
                let model = crate::backends::OnnxModel::load(&config.local)?;
                info!(
                    model = %crate::inference::SegmentationModel::model_info(&model).name,
                    activation = ?config.local.activation,
                    "Using local inference backend"
                );
                Ok(Arc::new(crate::backends::LocalBackend::new(
                    Arc::new(model),
                    config.local.activation,
                )))
            },
            #[cfg(not(feature = "onnx"))]
            BackendType::Local => Err(BgRemovalError::config(
                "Local inference requires the `onnx` feature",
            )),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = vec![BackendType::Remote];
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Local);
        }
        backends
    }
}

/// Successful pipeline result
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// PNG-encoded RGBA image
    pub png_bytes: Vec<u8>,
    /// Dimensions of the result, equal to the decoded input
    pub dimensions: (u32, u32),
    /// Per-stage timings
    pub timings: ProcessingTimings,
}

/// Failed pipeline run: the stage the request was in and the cause
#[derive(Debug, thiserror::Error)]
#[error("failed at {stage} stage: {error}")]
pub struct PipelineFailure {
    pub stage: PipelineStage,
    #[source]
    pub error: BgRemovalError,
}

impl PipelineFailure {
    #[must_use]
    pub fn new(stage: PipelineStage, error: BgRemovalError) -> Self {
        Self { stage, error }
    }
}

/// Runs the decode → infer → composite → encode pipeline for one request
#[derive(Clone)]
pub struct BackgroundRemovalProcessor {
    backend: Arc<dyn MaskBackend>,
    inference_timeout: Duration,
    reporter: Arc<dyn ProgressReporter>,
}

impl BackgroundRemovalProcessor {
    /// Create a processor around a mask backend
    #[must_use]
    pub fn new(backend: Arc<dyn MaskBackend>, inference_timeout: Duration) -> Self {
        Self {
            backend,
            inference_timeout,
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    /// Attach a progress reporter
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[must_use]
    pub fn inference_timeout(&self) -> Duration {
        self.inference_timeout
    }

    /// Remove the background from raw image bytes
    ///
    /// The backend is called at most once and only after decoding succeeded.
    /// Delivery is left to the caller, so a successful run ends after `Encoding`.
    ///
    /// # Errors
    /// Returns the stage the request failed in together with the cause:
    /// - `Decoding` + `Decode` for unparseable input
    /// - `Inferring` + `Inference` for backend failures and timeouts
    /// - `Compositing` + `Internal` for invalid masks
    /// - `Encoding` + `Encode` for PNG failures
    #[instrument(
        name = "pipeline",
        skip(self, ctx, bytes),
        fields(
            request_id = %ctx.request_id,
            backend = self.backend.name(),
            input_bytes = bytes.len()
        )
    )]
    pub async fn process_bytes(
        &self,
        ctx: &RequestContext,
        bytes: &[u8],
    ) -> std::result::Result<PipelineOutput, PipelineFailure> {
        let mut tracker = ProgressTracker::new(self.reporter.as_ref());
        let result = self.run_stages(&mut tracker, bytes).await;

        match &result {
            Ok(output) => tracker.report_completion(output.timings.clone()),
            Err(failure) => tracker.report_error(&failure.error.to_string()),
        }
        result
    }

    async fn run_stages(
        &self,
        tracker: &mut ProgressTracker<'_>,
        bytes: &[u8],
    ) -> std::result::Result<PipelineOutput, PipelineFailure> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        tracker.report_stage(PipelineStage::Decoding);
        let stage_start = Instant::now();
        let image = {
            let _span = span!(Level::DEBUG, "decode", format = ?ImageCodec::sniff_format(bytes))
                .entered();
            ImageCodec::decode(bytes)
                .map_err(|e| PipelineFailure::new(PipelineStage::Decoding, e))?
        };
        timings.decode_ms = stage_start.elapsed().as_millis() as u64;
        debug!(
            width = image.width(),
            height = image.height(),
            "Input decoded"
        );

        tracker.report_stage(PipelineStage::Inferring);
        let stage_start = Instant::now();
        let inference_span = span!(Level::INFO, "inference", backend = self.backend.name());
        let mask = tokio::time::timeout(
            self.inference_timeout,
            self.backend
                .infer(InferenceInput::new(&image, bytes))
                .instrument(inference_span),
        )
        .await
        .map_err(|_| {
            BgRemovalError::inference(format!(
                "Inference timed out after {}s",
                self.inference_timeout.as_secs_f64()
            ))
        })
        .and_then(|result| result)
        .map_err(|e| PipelineFailure::new(PipelineStage::Inferring, e))?;
        timings.inference_ms = stage_start.elapsed().as_millis() as u64;
        debug!(
            mask_width = mask.dimensions.0,
            mask_height = mask.dimensions.1,
            foreground_ratio = mask.foreground_ratio(),
            "Mask received"
        );

        tracker.report_stage(PipelineStage::Compositing);
        let stage_start = Instant::now();
        let composite = {
            let _span = span!(Level::DEBUG, "composite").entered();
            Compositor::composite(&image, &mask)
                .map_err(|e| PipelineFailure::new(PipelineStage::Compositing, e))?
        };
        timings.composite_ms = stage_start.elapsed().as_millis() as u64;
        let dimensions = composite.dimensions();

        tracker.report_stage(PipelineStage::Encoding);
        let stage_start = Instant::now();
        let png_bytes = {
            let _span = span!(Level::DEBUG, "encode").entered();
            ImageCodec::encode_composite(composite)
                .map_err(|e| PipelineFailure::new(PipelineStage::Encoding, e))?
        };
        timings.encode_ms = stage_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        info!(
            width = dimensions.0,
            height = dimensions.1,
            output_bytes = png_bytes.len(),
            total_ms = timings.total_ms,
            "Background removed"
        );

        Ok(PipelineOutput {
            png_bytes,
            dimensions,
            timings,
        })
    }
}
