//! Services separated from the request pipeline's business logic

pub mod codec;
pub mod progress;

pub use codec::{ImageCodec, OUTPUT_FILE_NAME, OUTPUT_MIME_TYPE};
pub use progress::{
    NoOpProgressReporter, PipelineStage, ProgressReporter, ProgressTracker, ProgressUpdate,
    TracingProgressReporter,
};
