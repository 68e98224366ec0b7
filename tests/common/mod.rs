//! Shared helpers for integration tests: synthetic images, deterministic
//! models and backends, and a recording chat transport.

#![allow(dead_code)]

use async_trait::async_trait;
use bgremove_bot::{
    error::{BgRemovalError, Result},
    inference::{InferenceInput, MaskBackend, SegmentationModel},
    models::{ModelInfo, PreprocessingConfig, IMAGENET_MEAN, IMAGENET_STD},
    transport::{ChatTransport, IncomingImage, ImageKind, StatusHandle},
    types::AlphaMask,
};
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SUBJECT_COLOR: Rgb<u8> = Rgb([150, 60, 40]);
pub const BACKGROUND_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// White canvas with a filled subject rectangle covering the middle half
pub fn person_on_white(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let inside_x = x >= width / 4 && x < width * 3 / 4;
        let inside_y = y >= height / 4 && y < height * 3 / 4;
        if inside_x && inside_y {
            SUBJECT_COLOR
        } else {
            BACKGROUND_COLOR
        }
    })
}

/// Image where every pixel has a distinct color
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8])
    })
}

pub fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// Model marking every non-white pixel as foreground
///
/// Inverts the ImageNet normalization, so it sees the same pixels the
/// preprocessing produced, and emits logits of +/-10.
#[derive(Debug, Clone, Copy)]
pub struct SubjectModel {
    pub size: u32,
}

impl SegmentationModel for SubjectModel {
    fn forward(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let (_, _, height, width) = input.dim();
        Ok(Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| {
            let near_white = (0..3).all(|c| {
                let value = input[[0, c, y, x]] * IMAGENET_STD[c] + IMAGENET_MEAN[c];
                value > 0.9
            });
            if near_white {
                -10.0
            } else {
                10.0
            }
        }))
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        PreprocessingConfig::default().with_target_size(self.size)
    }

    fn model_info(&self) -> ModelInfo {
        let size = self.size as usize;
        ModelInfo {
            name: "subject-model".to_string(),
            size_bytes: 0,
            input_shape: (1, 3, size, size),
            output_shape: (1, 1, size, size),
        }
    }
}

/// Wraps a backend and counts how often it is called
pub struct CountingBackend<B> {
    inner: B,
    calls: Arc<AtomicUsize>,
}

impl<B> CountingBackend<B> {
    pub fn new(inner: B) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl<B: MaskBackend> MaskBackend for CountingBackend<B> {
    async fn infer(&self, input: InferenceInput<'_>) -> Result<AlphaMask> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.infer(input).await
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Backend that never answers within any sane timeout
pub struct HangingBackend;

#[async_trait]
impl MaskBackend for HangingBackend {
    async fn infer(&self, _input: InferenceInput<'_>) -> Result<AlphaMask> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(BgRemovalError::inference("woke up"))
    }

    fn name(&self) -> &'static str {
        "hanging"
    }
}

/// Backend failing the way an unavailable remote endpoint does
pub struct UnavailableBackend;

#[async_trait]
impl MaskBackend for UnavailableBackend {
    async fn infer(&self, _input: InferenceInput<'_>) -> Result<AlphaMask> {
        Err(BgRemovalError::inference("Inference endpoint returned HTTP 503 Service Unavailable"))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

/// Everything a [`RecordingTransport`] was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Download(String),
    PostStatus { chat_id: i64, text: String },
    UpdateStatus(String),
    DeleteStatus(i64),
    SendText { chat_id: i64, text: String },
    Deliver {
        chat_id: i64,
        reply_to: Option<i64>,
        filename: String,
        caption: String,
        bytes: Vec<u8>,
    },
}

/// In-memory chat transport recording every call
pub struct RecordingTransport {
    image_bytes: Option<Vec<u8>>,
    fail_delivery: bool,
    calls: Mutex<Vec<TransportCall>>,
}

pub const STATUS_MESSAGE_ID: i64 = 4242;

impl RecordingTransport {
    /// Transport whose downloads return `bytes`, or fail when `None`
    pub fn new(image_bytes: Option<Vec<u8>>) -> Self {
        Self {
            image_bytes,
            fail_delivery: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_delivery(mut self) -> Self {
        self.fail_delivery = true;
        self
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::SendText { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn deliveries(&self) -> Vec<TransportCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, TransportCall::Deliver { .. }))
            .collect()
    }

    pub fn status_deletions(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, TransportCall::DeleteStatus(_)))
            .count()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn download(&self, image: &IncomingImage) -> Result<Vec<u8>> {
        self.record(TransportCall::Download(image.file_id.clone()));
        self.image_bytes
            .clone()
            .ok_or_else(|| BgRemovalError::transport("getFile failed: file is too big"))
    }

    async fn post_status(&self, chat_id: i64, text: &str) -> Result<StatusHandle> {
        self.record(TransportCall::PostStatus {
            chat_id,
            text: text.to_string(),
        });
        Ok(StatusHandle {
            chat_id,
            message_id: STATUS_MESSAGE_ID,
        })
    }

    async fn update_status(&self, _handle: &StatusHandle, text: &str) -> Result<()> {
        self.record(TransportCall::UpdateStatus(text.to_string()));
        Ok(())
    }

    async fn delete_status(&self, handle: &StatusHandle) -> Result<()> {
        self.record(TransportCall::DeleteStatus(handle.message_id));
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.record(TransportCall::SendText {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn deliver_result(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        bytes: Vec<u8>,
        filename: &str,
        caption: &str,
    ) -> Result<()> {
        self.record(TransportCall::Deliver {
            chat_id,
            reply_to,
            filename: filename.to_string(),
            caption: caption.to_string(),
            bytes,
        });
        if self.fail_delivery {
            return Err(BgRemovalError::transport("sendDocument failed: Bad Request"));
        }
        Ok(())
    }
}

pub fn incoming_photo(chat_id: i64, message_id: i64) -> IncomingImage {
    IncomingImage {
        chat_id,
        message_id,
        file_id: format!("file-{message_id}"),
        kind: ImageKind::Photo,
        file_size: Some(1024),
    }
}

/// Backend answering instantly with a uniform mask
pub struct UniformBackend {
    pub value: u8,
}

#[async_trait]
impl MaskBackend for UniformBackend {
    async fn infer(&self, _input: InferenceInput<'_>) -> Result<AlphaMask> {
        AlphaMask::new(vec![self.value; 16 * 16], (16, 16))
    }

    fn name(&self) -> &'static str {
        "uniform"
    }
}
