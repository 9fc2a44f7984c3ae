//! Request inputs, the result envelope, and the error taxonomy shared by every pipeline operation.

use crate::{
    extraction::ExtractionError,
    generation::{GenerationError, GenerationRequest},
    summarization::{Device, SummarizationError, SummaryRequest},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input; no backend was called.
    ValidationError,
    /// Upload suffix is not one of `.pdf`, `.docx`, `.txt`.
    UnsupportedFormat,
    /// An uploaded file could not be staged, read, or parsed.
    ExtractionError,
    /// A remote page could not be fetched.
    FetchError,
    /// The local summarization model failed.
    SummarizationError,
    /// The remote generation provider failed.
    GenerationError,
}

impl ErrorKind {
    /// Wire name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::UnsupportedFormat => "unsupported_format",
            Self::ExtractionError => "extraction_error",
            Self::FetchError => "fetch_error",
            Self::SummarizationError => "summarization_error",
            Self::GenerationError => "generation_error",
        }
    }
}

/// A failed pipeline operation, classified by [`ErrorKind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PipelineError {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable message, preserving the backend's detail.
    pub message: String,
}

impl PipelineError {
    /// Build an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }
}

impl From<ExtractionError> for PipelineError {
    fn from(error: ExtractionError) -> Self {
        let kind = match &error {
            ExtractionError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ExtractionError::Fetch(_) => ErrorKind::FetchError,
            _ => ErrorKind::ExtractionError,
        };
        Self::new(kind, error.to_string())
    }
}

impl From<SummarizationError> for PipelineError {
    fn from(error: SummarizationError) -> Self {
        Self::new(ErrorKind::SummarizationError, error.to_string())
    }
}

impl From<GenerationError> for PipelineError {
    fn from(error: GenerationError) -> Self {
        Self::new(ErrorKind::GenerationError, error.to_string())
    }
}

/// Uniform outcome of a pipeline operation.
///
/// Holds either a payload or an error kind with its message, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEnvelope {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl ResultEnvelope {
    /// Successful outcome carrying `payload`.
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            ok: true,
            payload: Some(payload.into()),
            error_kind: None,
            error_message: None,
        }
    }

    /// Failed outcome carrying the error's kind and message.
    pub fn failure(error: PipelineError) -> Self {
        Self {
            ok: false,
            payload: None,
            error_kind: Some(error.kind),
            error_message: Some(error.message),
        }
    }

    /// Whether the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Payload of a successful outcome.
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Kind of a failed outcome.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// Message of a failed outcome.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Convert back into a `Result`.
    pub fn into_result(self) -> Result<String, PipelineError> {
        match (self.payload, self.error_kind) {
            (Some(payload), _) if self.ok => Ok(payload),
            (_, Some(kind)) => Err(PipelineError::new(
                kind,
                self.error_message.unwrap_or_default(),
            )),
            (_, None) => Ok(String::new()),
        }
    }
}

impl From<Result<String, PipelineError>> for ResultEnvelope {
    fn from(result: Result<String, PipelineError>) -> Self {
        match result {
            Ok(payload) => Self::success(payload),
            Err(error) => Self::failure(error),
        }
    }
}

/// Input for the summarize operation; omitted parameters take the documented defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummarizeInput {
    /// Text to summarize.
    #[serde(default)]
    pub text: String,
    /// Optional maximum summary length in tokens.
    pub max_length: Option<usize>,
    /// Optional minimum summary length in tokens.
    pub min_length: Option<usize>,
    /// Optional length penalty.
    pub length_penalty: Option<f32>,
    /// Optional beam width.
    pub beam_count: Option<usize>,
}

impl SummarizeInput {
    /// Input with only text set.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Apply defaults and check invariants.
    pub fn validate(self) -> Result<SummaryRequest, PipelineError> {
        if self.text.trim().is_empty() {
            return Err(PipelineError::validation("text must not be empty"));
        }
        let mut request = SummaryRequest::new(self.text);
        if let Some(max_length) = self.max_length {
            request.max_length = max_length;
        }
        if let Some(min_length) = self.min_length {
            request.min_length = min_length;
        }
        if let Some(length_penalty) = self.length_penalty {
            request.length_penalty = length_penalty;
        }
        if let Some(beam_count) = self.beam_count {
            request.beam_count = beam_count;
        }

        if request.min_length >= request.max_length {
            return Err(PipelineError::validation(format!(
                "min_length ({}) must be less than max_length ({})",
                request.min_length, request.max_length
            )));
        }
        if request.max_length > SummaryRequest::MAX_LENGTH_LIMIT {
            return Err(PipelineError::validation(format!(
                "max_length must be at most {}",
                SummaryRequest::MAX_LENGTH_LIMIT
            )));
        }
        if !(1..=SummaryRequest::MAX_BEAM_COUNT).contains(&request.beam_count) {
            return Err(PipelineError::validation(format!(
                "beam_count must be between 1 and {}",
                SummaryRequest::MAX_BEAM_COUNT
            )));
        }
        if !request.length_penalty.is_finite() {
            return Err(PipelineError::validation("length_penalty must be finite"));
        }
        Ok(request)
    }
}

/// Input for the generate operation; omitted parameters take the documented defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateInput {
    /// Prompt sent to the provider.
    #[serde(default)]
    pub prompt: String,
    /// Optional provider model override.
    pub model: Option<String>,
    /// Optional token budget.
    pub max_tokens: Option<u32>,
    /// Optional sampling temperature.
    pub temperature: Option<f32>,
    /// Optional nucleus sampling mass.
    pub top_p: Option<f32>,
}

impl GenerateInput {
    /// Input with only the prompt set.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Apply defaults and check invariants.
    pub fn validate(self, default_model: &str) -> Result<GenerationRequest, PipelineError> {
        if self.prompt.trim().is_empty() {
            return Err(PipelineError::validation("prompt must not be empty"));
        }
        let mut request = GenerationRequest::new(self.prompt);
        request.model_id = self
            .model
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| default_model.to_string());
        if let Some(max_tokens) = self.max_tokens {
            request.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            request.temperature = temperature;
        }
        if let Some(top_p) = self.top_p {
            request.top_p = top_p;
        }

        if request.max_tokens == 0 {
            return Err(PipelineError::validation("max_tokens must be at least 1"));
        }
        if !(0.0..=2.0).contains(&request.temperature) {
            return Err(PipelineError::validation(
                "temperature must be between 0.0 and 2.0",
            ));
        }
        if !(request.top_p > 0.0 && request.top_p <= 1.0) {
            return Err(PipelineError::validation(
                "top_p must be greater than 0.0 and at most 1.0",
            ));
        }
        Ok(request)
    }
}

/// An uploaded file as received from the transport.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Filename declared by the client.
    pub filename: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Startup facts reported by the health endpoint.
#[derive(Debug, Clone, Copy)]
pub struct HealthSnapshot {
    /// Device the summarization model runs on.
    pub device: Device,
}
