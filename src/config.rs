//! Configuration types for question extraction, generation and validation.
//!
//! Every knob lives in [`AssistantConfig`], built via
//! [`AssistantConfigBuilder`]. The API key pool is *not* part of the config:
//! keys are secrets with their own lifecycle (rotated, re-supplied at
//! runtime) and live in a [`crate::keys::KeyRotator`] the caller owns.

use crate::error::QuizError;
use serde::{Deserialize, Serialize};

/// Default Gemini API host.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default vision-capable model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Sampling parameters for one kind of request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskTuning {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl TaskTuning {
    pub const fn new(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            max_output_tokens,
        }
    }
}

/// Prompt template generation.
///
/// `Basic` sends only the page image (extraction) or the topic and
/// references (generation). `Advanced` adds prior-page context, page memory,
/// recently generated questions and topic notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PromptVersion {
    Basic,
    #[default]
    Advanced,
}

/// How PDF pages are rasterised before being sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Page scale factor relative to the PDF's 72-DPI user space. Default: 2.0.
    ///
    /// 2.0 renders an A4 page at roughly 1190 × 1684 px, enough for the model
    /// to read subscripts and option labels.
    pub scale: f32,

    /// Cap on either rendered dimension. Default: 4000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            max_rendered_pixels: 4000,
            password: None,
        }
    }
}

/// Configuration for an [`crate::assistant::ExamAssistant`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2quiz::AssistantConfig;
///
/// let config = AssistantConfig::builder()
///     .model("gemini-2.0-flash")
///     .request_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.extraction.temperature, 0.1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Gemini model name, e.g. "gemini-2.0-flash", "gemini-1.5-pro".
    pub model: String,

    /// API host, without trailing slash. Override for proxies and tests.
    pub base_url: String,

    /// Per-request HTTP timeout in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Prompt template generation. Default: [`PromptVersion::Advanced`].
    pub prompt_version: PromptVersion,

    /// Page extraction: low temperature, the model is transcribing. 0.1 / 8192.
    pub extraction: TaskTuning,

    /// Question generation: higher temperature for variety. 0.7 / 8192.
    pub generation: TaskTuning,

    /// Solution writing. 0.2 / 8192.
    pub solutions: TaskTuning,

    /// Answer validation. 0.1 / 2048.
    pub validation: TaskTuning,

    /// Page rasterisation settings.
    pub render: RenderConfig,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Attach the page image as `source_image` to extracted records that
    /// report `has_image`. Default: false (data-URLs are large).
    pub attach_page_images: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 60,
            prompt_version: PromptVersion::default(),
            extraction: TaskTuning::new(0.1, 8192),
            generation: TaskTuning::new(0.7, 8192),
            solutions: TaskTuning::new(0.2, 8192),
            validation: TaskTuning::new(0.1, 2048),
            render: RenderConfig::default(),
            download_timeout_secs: 120,
            attach_page_images: false,
        }
    }
}

impl AssistantConfig {
    /// Create a new builder for `AssistantConfig`.
    pub fn builder() -> AssistantConfigBuilder {
        AssistantConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overridden by `GEMINI_MODEL` and `GEMINI_BASE_URL` when set.
    pub fn from_env() -> Result<Self, QuizError> {
        let mut builder = Self::builder();
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            if !model.trim().is_empty() {
                builder = builder.model(model.trim());
            }
        }
        if let Ok(url) = std::env::var("GEMINI_BASE_URL") {
            if !url.trim().is_empty() {
                builder = builder.base_url(url.trim());
            }
        }
        builder.build()
    }

    /// Full `generateContent` endpoint, without the key parameter.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// Builder for [`AssistantConfig`].
#[derive(Debug)]
pub struct AssistantConfigBuilder {
    config: AssistantConfig,
}

impl AssistantConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn prompt_version(mut self, version: PromptVersion) -> Self {
        self.config.prompt_version = version;
        self
    }

    pub fn extraction(mut self, tuning: TaskTuning) -> Self {
        self.config.extraction = clamp_tuning(tuning);
        self
    }

    pub fn generation(mut self, tuning: TaskTuning) -> Self {
        self.config.generation = clamp_tuning(tuning);
        self
    }

    pub fn solutions(mut self, tuning: TaskTuning) -> Self {
        self.config.solutions = clamp_tuning(tuning);
        self
    }

    pub fn validation(mut self, tuning: TaskTuning) -> Self {
        self.config.validation = clamp_tuning(tuning);
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render.scale = scale;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.render.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.render.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn attach_page_images(mut self, v: bool) -> Self {
        self.config.attach_page_images = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssistantConfig, QuizError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(QuizError::InvalidConfig("Model name must not be empty".into()));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(QuizError::InvalidConfig(format!(
                "Base URL must be http(s), got '{}'",
                c.base_url
            )));
        }
        if !(0.5..=4.0).contains(&c.render.scale) {
            return Err(QuizError::InvalidConfig(format!(
                "Render scale must be 0.5–4.0, got {}",
                c.render.scale
            )));
        }
        Ok(self.config)
    }
}

fn clamp_tuning(t: TaskTuning) -> TaskTuning {
    TaskTuning {
        temperature: t.temperature.clamp(0.0, 2.0),
        max_output_tokens: t.max_output_tokens.max(1),
    }
}
