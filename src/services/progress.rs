//! Progress reporting service
//!
//! This module separates progress reporting concerns from business logic,
//! so the request handler, tests and the CLI can observe pipeline stages
//! without the processor knowing who is listening.

use crate::types::ProcessingTimings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Stages of a single background removal request
///
/// A request moves strictly forward through these stages. A failed request
/// is reported with the stage it was in when the error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    /// Request accepted, input bytes being acquired
    Received,
    /// Decoding input bytes into a source image
    Decoding,
    /// Waiting for the mask backend
    Inferring,
    /// Resizing the mask and merging it with the source
    Compositing,
    /// Writing the PNG container
    Encoding,
    /// Result handed to the transport
    Delivered,
}

impl PipelineStage {
    /// Get a human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            PipelineStage::Received => "Receiving image",
            PipelineStage::Decoding => "Decoding image",
            PipelineStage::Inferring => "Running segmentation",
            PipelineStage::Compositing => "Applying mask",
            PipelineStage::Encoding => "Encoding PNG",
            PipelineStage::Delivered => "Delivered",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            PipelineStage::Received => 0,
            PipelineStage::Decoding => 10,
            PipelineStage::Inferring => 20,
            PipelineStage::Compositing => 85,
            PipelineStage::Encoding => 95,
            PipelineStage::Delivered => 100,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Decoding => "decoding",
            PipelineStage::Inferring => "inferring",
            PipelineStage::Compositing => "compositing",
            PipelineStage::Encoding => "encoding",
            PipelineStage::Delivered => "delivered",
        };
        f.write_str(name)
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current pipeline stage
    pub stage: PipelineStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: PipelineStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Trait for reporting progress during background removal
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: ProcessingTimings);

    /// Report an error during processing
    ///
    /// # Arguments
    /// * `stage` - Stage where the error occurred
    /// * `error` - Error description (internal, never shown to chat users)
    fn report_error(&self, stage: PipelineStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: PipelineStage, _error: &str) {}
}

/// Progress reporter that emits tracing events
pub struct TracingProgressReporter {
    verbose: bool,
}

impl TracingProgressReporter {
    /// Create a new tracing progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Emit per-stage events at info level instead of debug
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for TracingProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            tracing::info!(
                stage = %update.stage,
                progress = update.progress,
                elapsed_ms = update.elapsed_ms,
                "{}",
                update.description
            );
        } else {
            tracing::debug!(stage = %update.stage, progress = update.progress, "{}", update.description);
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        let (_, inference_pct, _, _) = timings.breakdown_percentages();
        tracing::info!(
            total_ms = timings.total_ms,
            inference_pct = format_args!("{inference_pct:.1}"),
            decode_ms = timings.decode_ms,
            inference_ms = timings.inference_ms,
            composite_ms = timings.composite_ms,
            encode_ms = timings.encode_ms,
            "Background removal completed"
        );
    }

    fn report_error(&self, stage: PipelineStage, error: &str) {
        // The request handler owns the error-level record of a failure
        tracing::debug!(stage = %stage, error = %error, "Pipeline stopped");
    }
}

/// Progress tracker that manages timing and the current stage of one request
pub struct ProgressTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    start_time: Instant,
    current_stage: PipelineStage,
}

impl<'a> ProgressTracker<'a> {
    /// Create a tracker positioned at [`PipelineStage::Received`]
    #[must_use]
    pub fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: PipelineStage::Received,
        }
    }

    /// Move to a stage and report it
    pub fn report_stage(&mut self, stage: PipelineStage) {
        self.current_stage = stage;
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: ProcessingTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error at the current stage
    pub fn report_error(&self, error: &str) {
        self.reporter.report_error(self.current_stage, error);
    }
}
