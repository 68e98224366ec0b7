//! Configuration types for the bot process
//!
//! All configuration is read once at startup and shared read-only afterwards.
//! Missing credentials surface as [`BgRemovalError::Config`] before the bot
//! starts polling, never in the middle of a request.

use crate::{
    error::{BgRemovalError, Result},
    processor::BackendType,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default remote inference endpoint (`BiRefNet` on the `HuggingFace` inference API)
pub const DEFAULT_INFERENCE_URL: &str =
    "https://api-inference.huggingface.co/models/ZhengPeng7/BiRefNet";

/// Default Telegram Bot API base URL
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Port used by the health endpoint when `PORT` is unset
pub const DEFAULT_HEALTH_PORT: u16 = 10000;

/// Default timeout for a single inference call
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 30;

/// Default timeout for downloading and uploading files through the transport
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 60;

/// Default long-polling timeout passed to `getUpdates`
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Placeholder printed instead of credentials
pub(crate) const REDACTED: &str = "<redacted>";

pub(crate) fn redacted(secret: Option<&str>) -> Option<&'static str> {
    secret.map(|_| REDACTED)
}

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::config_value_error(
                "execution provider",
                other,
                "auto, cpu, cuda, coreml",
            )),
        }
    }
}

/// How raw model scores are mapped into `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MaskActivation {
    /// Model emits logits; apply the logistic sigmoid
    #[default]
    Sigmoid,
    /// Model already emits probabilities; only clamp
    Identity,
}

/// Settings for the remote inference variant
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteInferenceConfig {
    /// Endpoint receiving the raw image bytes
    pub endpoint_url: String,
    /// Bearer credential sent in the `Authorization` header
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
}

impl fmt::Debug for RemoteInferenceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteInferenceConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("api_token", &redacted(self.api_token.as_deref()))
            .finish()
    }
}

impl Default for RemoteInferenceConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_INFERENCE_URL.to_string(),
            api_token: None,
        }
    }
}

/// Settings for the local inference variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LocalInferenceConfig {
    /// Path to the ONNX segmentation model
    pub model_path: Option<PathBuf>,
    /// Expected hex SHA-256 of the model file, verified before loading
    pub expected_sha256: Option<String>,
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
    /// Mapping from raw scores to mask probabilities
    pub activation: MaskActivation,
}

/// Process-wide configuration for the bot
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Chat transport credential
    #[serde(skip_serializing)]
    pub bot_token: String,
    /// Base URL of the Telegram Bot API
    pub telegram_api_url: String,
    /// Which inference variant serves requests
    pub backend_type: BackendType,
    /// Remote variant settings
    pub remote: RemoteInferenceConfig,
    /// Local variant settings
    pub local: LocalInferenceConfig,
    /// Upper bound for one inference call, in seconds
    pub inference_timeout_secs: u64,
    /// Upper bound for one file transfer, in seconds
    pub transfer_timeout_secs: u64,
    /// Long-polling timeout for update fetching, in seconds
    pub poll_timeout_secs: u64,
    /// Port of the health endpoint
    pub health_port: u16,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("bot_token", &REDACTED)
            .field("telegram_api_url", &self.telegram_api_url)
            .field("backend_type", &self.backend_type)
            .field("remote", &self.remote)
            .field("local", &self.local)
            .field("inference_timeout_secs", &self.inference_timeout_secs)
            .field("transfer_timeout_secs", &self.transfer_timeout_secs)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("health_port", &self.health_port)
            .finish()
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            backend_type: BackendType::Remote,
            remote: RemoteInferenceConfig::default(),
            local: LocalInferenceConfig::default(),
            inference_timeout_secs: DEFAULT_INFERENCE_TIMEOUT_SECS,
            transfer_timeout_secs: DEFAULT_TRANSFER_TIMEOUT_SECS,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            health_port: DEFAULT_HEALTH_PORT,
        }
    }
}

impl BotConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> BotConfigBuilder {
        BotConfigBuilder::default()
    }

    /// Load configuration from the process environment
    ///
    /// # Errors
    /// - `BOT_TOKEN` is unset
    /// - the selected backend's credential or model path is unset
    /// - a numeric variable cannot be parsed
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    /// Same as [`BotConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = get("BOT_TOKEN")
            .ok_or_else(|| BgRemovalError::missing_env("BOT_TOKEN", "chat transport credential"))?;

        let mut builder = Self::builder().bot_token(bot_token);

        if let Some(url) = get("TELEGRAM_API_URL") {
            builder = builder.telegram_api_url(url);
        }

        if let Some(backend) = get("INFERENCE_BACKEND") {
            builder = builder.backend_type(backend.parse()?);
        }

        if let Some(url) = get("INFERENCE_URL") {
            builder = builder.inference_url(url);
        }
        if let Some(token) = get("HF_TOKEN") {
            builder = builder.inference_token(token);
        }

        if let Some(path) = get("MODEL_PATH") {
            builder = builder.model_path(path);
        }
        if let Some(digest) = get("MODEL_SHA256") {
            builder = builder.expected_sha256(digest);
        }
        if let Some(provider) = get("EXECUTION_PROVIDER") {
            builder = builder.execution_provider(provider.parse()?);
        }

        if let Some(secs) = get("INFERENCE_TIMEOUT_SECS") {
            builder = builder.inference_timeout_secs(parse_number("INFERENCE_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = get("TRANSFER_TIMEOUT_SECS") {
            builder = builder.transfer_timeout_secs(parse_number("TRANSFER_TIMEOUT_SECS", &secs)?);
        }
        if let Some(port) = get("PORT") {
            builder = builder.health_port(parse_number("PORT", &port)?);
        }

        builder.build()
    }

    /// Inference timeout as a [`Duration`]
    #[must_use]
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    /// Transfer timeout as a [`Duration`]
    #[must_use]
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - empty bot token
    /// - remote backend without credential or with a non-HTTP endpoint
    /// - local backend without a model path
    /// - zero timeouts or zero port
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            return Err(BgRemovalError::missing_env(
                "BOT_TOKEN",
                "chat transport credential",
            ));
        }

        match self.backend_type {
            BackendType::Remote => {
                if self
                    .remote
                    .api_token
                    .as_deref()
                    .map_or(true, |t| t.trim().is_empty())
                {
                    return Err(BgRemovalError::missing_env(
                        "HF_TOKEN",
                        "remote inference credential",
                    ));
                }
                let url = &self.remote.endpoint_url;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(BgRemovalError::config_value_error(
                        "INFERENCE_URL",
                        url,
                        "an http(s) URL",
                    ));
                }
            },
            BackendType::Local => {
                if self.local.model_path.is_none() {
                    return Err(BgRemovalError::missing_env(
                        "MODEL_PATH",
                        "ONNX model for local inference",
                    ));
                }
            },
        }

        if self.inference_timeout_secs == 0 {
            return Err(BgRemovalError::config_value_error(
                "INFERENCE_TIMEOUT_SECS",
                0,
                "a positive number of seconds",
            ));
        }
        if self.transfer_timeout_secs == 0 {
            return Err(BgRemovalError::config_value_error(
                "TRANSFER_TIMEOUT_SECS",
                0,
                "a positive number of seconds",
            ));
        }
        if self.health_port == 0 {
            return Err(BgRemovalError::config_value_error("PORT", 0, "1-65535"));
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(variable: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BgRemovalError::config_value_error(variable, value, "a positive integer"))
}

/// Builder for `BotConfig`
#[derive(Debug, Default)]
pub struct BotConfigBuilder {
    config: BotConfig,
}

impl BotConfigBuilder {
    #[must_use]
    pub fn bot_token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.bot_token = token.into();
        self
    }

    #[must_use]
    pub fn telegram_api_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.telegram_api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn inference_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.remote.endpoint_url = url.into();
        self
    }

    #[must_use]
    pub fn inference_token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.remote.api_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.local.model_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn expected_sha256<S: Into<String>>(mut self, digest: S) -> Self {
        self.config.local.expected_sha256 = Some(digest.into().to_ascii_lowercase());
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.local.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.local.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn activation(mut self, activation: MaskActivation) -> Self {
        self.config.local.activation = activation;
        self
    }

    #[must_use]
    pub fn inference_timeout_secs(mut self, secs: u64) -> Self {
        self.config.inference_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn transfer_timeout_secs(mut self, secs: u64) -> Self {
        self.config.transfer_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn poll_timeout_secs(mut self, secs: u64) -> Self {
        self.config.poll_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn health_port(mut self, port: u16) -> Self {
        self.config.health_port = port;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// See [`BotConfig::validate`].
    pub fn build(self) -> Result<BotConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
