//! Pipeline service routing validated requests to the extractor and the two generation backends.

use crate::{
    config::Config,
    extraction::{FileKind, SourceExtractor, SourceInput},
    generation::{GenerationClient, GenerationRequest},
    pipeline::types::{
        GenerateInput, HealthSnapshot, PipelineError, ResultEnvelope, SummarizeInput, Upload,
    },
    summarization::Summarizer,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Abstraction over the pipeline used by the HTTP surface.
///
/// Every operation validates its input before touching a backend and reports the outcome as a
/// [`ResultEnvelope`]; backend failures are wrapped, never propagated.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Summarize inline text with the local model.
    async fn summarize(&self, input: SummarizeInput) -> ResultEnvelope;

    /// Generate freeform text from a prompt with the remote provider.
    async fn generate(&self, input: GenerateInput) -> ResultEnvelope;

    /// Fetch a web page and return its paragraph text.
    async fn import_url(&self, url: String) -> ResultEnvelope;

    /// Extract text from an uploaded file; `None` means the request carried no file part.
    async fn extract_file(&self, upload: Option<Upload>) -> ResultEnvelope;

    /// Startup facts for health reporting.
    fn health(&self) -> HealthSnapshot;
}

/// Coordinates the source extractor, summarization engine, and generation client.
///
/// Holds no per-request state; construct it once at startup and share it through an `Arc`.
pub struct PipelineService {
    extractor: SourceExtractor,
    summarizer: Arc<dyn Summarizer>,
    generator: Arc<dyn GenerationClient>,
    default_model: String,
}

impl PipelineService {
    /// Assemble a pipeline from its three collaborators.
    pub fn new(
        extractor: SourceExtractor,
        summarizer: Arc<dyn Summarizer>,
        generator: Arc<dyn GenerationClient>,
    ) -> Self {
        Self {
            extractor,
            summarizer,
            generator,
            default_model: GenerationRequest::DEFAULT_MODEL_ID.to_string(),
        }
    }

    /// Override the model used when a generate request does not name one.
    pub fn with_generation_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Assemble a pipeline using configured defaults.
    pub fn from_config(
        config: &Config,
        extractor: SourceExtractor,
        summarizer: Arc<dyn Summarizer>,
        generator: Arc<dyn GenerationClient>,
    ) -> Self {
        Self::new(extractor, summarizer, generator)
            .with_generation_model(config.generation_model.clone())
    }

    async fn run_summarize(&self, input: SummarizeInput) -> Result<String, PipelineError> {
        let request = input.validate()?;
        tracing::debug!(
            text_chars = request.text.len(),
            max_length = request.max_length,
            min_length = request.min_length,
            beam_count = request.beam_count,
            "Summarizing"
        );
        Ok(self.summarizer.summarize(request).await?)
    }

    async fn run_generate(&self, input: GenerateInput) -> Result<String, PipelineError> {
        let request = input.validate(&self.default_model)?;
        tracing::debug!(
            model = %request.model_id,
            prompt_chars = request.prompt.len(),
            max_tokens = request.max_tokens,
            "Generating"
        );
        Ok(self.generator.generate(request).await?)
    }

    async fn run_import(&self, url: String) -> Result<String, PipelineError> {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(PipelineError::validation("url must not be empty"));
        }
        let document = self.extractor.extract(SourceInput::Url(url)).await?;
        Ok(document.into_text())
    }

    async fn run_extract(&self, upload: Option<Upload>) -> Result<String, PipelineError> {
        let Upload { filename, bytes } =
            upload.ok_or_else(|| PipelineError::validation("No file part"))?;
        if filename.is_empty() {
            return Err(PipelineError::validation("No selected file"));
        }
        FileKind::from_filename(&filename)?;
        let document = self
            .extractor
            .extract(SourceInput::File { filename, bytes })
            .await?;
        Ok(document.into_text())
    }
}

fn complete(operation: &'static str, result: Result<String, PipelineError>) -> ResultEnvelope {
    match &result {
        Ok(payload) => tracing::info!(operation, output_chars = payload.len(), "Request completed"),
        Err(error) => tracing::warn!(
            operation,
            error_kind = error.kind.as_str(),
            error = %error.message,
            "Request failed"
        ),
    }
    ResultEnvelope::from(result)
}

#[async_trait]
impl PipelineApi for PipelineService {
    async fn summarize(&self, input: SummarizeInput) -> ResultEnvelope {
        complete("summarize", self.run_summarize(input).await)
    }

    async fn generate(&self, input: GenerateInput) -> ResultEnvelope {
        complete("generate", self.run_generate(input).await)
    }

    async fn import_url(&self, url: String) -> ResultEnvelope {
        complete("import_url", self.run_import(url).await)
    }

    async fn extract_file(&self, upload: Option<Upload>) -> ResultEnvelope {
        complete("extract_file", self.run_extract(upload).await)
    }

    fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            device: self.summarizer.device(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use crate::pipeline::types::ErrorKind;
    use crate::summarization::{Device, SummarizationError, SummaryRequest};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSummarizer {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Summarizer for RecordingSummarizer {
        async fn summarize(&self, request: SummaryRequest) -> Result<String, SummarizationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SummarizationError::Task("worker crashed".into()));
            }
            Ok(format!("summary of {} chars", request.text.len()))
        }

        fn device(&self) -> Device {
            Device::Cpu
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        requests: Mutex<Vec<GenerationRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl GenerationClient for RecordingGenerator {
        async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            let prompt = request.prompt.clone();
            self.requests.lock().expect("lock").push(request);
            if self.fail {
                return Err(GenerationError::Provider {
                    status: 429,
                    detail: "rate limited".into(),
                });
            }
            Ok(format!("echo: {prompt}"))
        }
    }

    struct Harness {
        service: PipelineService,
        summarizer: Arc<RecordingSummarizer>,
        generator: Arc<RecordingGenerator>,
        staging: tempfile::TempDir,
    }

    fn harness(summarizer: RecordingSummarizer, generator: RecordingGenerator) -> Harness {
        let staging = tempfile::tempdir().expect("tempdir");
        let summarizer = Arc::new(summarizer);
        let generator = Arc::new(generator);
        let service = PipelineService::new(
            SourceExtractor::new(staging.path()).expect("extractor"),
            summarizer.clone(),
            generator.clone(),
        );
        Harness {
            service,
            summarizer,
            generator,
            staging,
        }
    }

    #[tokio::test]
    async fn summarize_wraps_backend_output() {
        let h = harness(RecordingSummarizer::default(), RecordingGenerator::default());

        let envelope = h.service.summarize(SummarizeInput::new("abcdef")).await;

        assert!(envelope.is_ok());
        assert_eq!(envelope.payload(), Some("summary of 6 chars"));
        assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_failures_never_reach_backends() {
        let h = harness(RecordingSummarizer::default(), RecordingGenerator::default());

        let summary = h.service.summarize(SummarizeInput::new("")).await;
        let generated = h.service.generate(GenerateInput::new("  ")).await;
        let imported = h.service.import_url(String::new()).await;

        for envelope in [summary, generated, imported] {
            assert_eq!(envelope.error_kind(), Some(ErrorKind::ValidationError));
        }
        assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 0);
        assert!(h.generator.requests.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn backend_failures_become_error_envelopes() {
        let h = harness(
            RecordingSummarizer {
                fail: true,
                ..Default::default()
            },
            RecordingGenerator {
                fail: true,
                ..Default::default()
            },
        );

        let summary = h.service.summarize(SummarizeInput::new("text")).await;
        assert_eq!(summary.error_kind(), Some(ErrorKind::SummarizationError));
        assert!(summary.error_message().unwrap_or_default().contains("worker crashed"));

        let generated = h.service.generate(GenerateInput::new("prompt")).await;
        assert_eq!(generated.error_kind(), Some(ErrorKind::GenerationError));
        assert!(generated.error_message().unwrap_or_default().contains("rate limited"));
    }

    #[tokio::test]
    async fn generate_uses_configured_default_model() {
        let h = harness(RecordingSummarizer::default(), RecordingGenerator::default());
        let service = h.service.with_generation_model("jamba-mini");

        let envelope = service.generate(GenerateInput::new("Hi")).await;

        assert_eq!(envelope.payload(), Some("echo: Hi"));
        let requests = h.generator.requests.lock().expect("lock");
        assert_eq!(requests[0].model_id, "jamba-mini");
        assert_eq!(requests[0].max_tokens, 2048);
    }

    #[tokio::test]
    async fn upload_validation_matches_form_semantics() {
        let h = harness(RecordingSummarizer::default(), RecordingGenerator::default());

        let missing = h.service.extract_file(None).await;
        assert_eq!(missing.error_kind(), Some(ErrorKind::ValidationError));
        assert_eq!(missing.error_message(), Some("No file part"));

        let unnamed = h
            .service
            .extract_file(Some(Upload {
                filename: String::new(),
                bytes: b"data".to_vec(),
            }))
            .await;
        assert_eq!(unnamed.error_message(), Some("No selected file"));

        let csv = h
            .service
            .extract_file(Some(Upload {
                filename: "table.csv".into(),
                bytes: b"a,b".to_vec(),
            }))
            .await;
        assert_eq!(csv.error_kind(), Some(ErrorKind::UnsupportedFormat));
        assert_eq!(std::fs::read_dir(h.staging.path()).expect("dir").count(), 0);
    }

    #[tokio::test]
    async fn text_upload_returns_content() {
        let h = harness(RecordingSummarizer::default(), RecordingGenerator::default());

        let envelope = h
            .service
            .extract_file(Some(Upload {
                filename: "note.txt".into(),
                bytes: b"hello upload".to_vec(),
            }))
            .await;

        assert_eq!(envelope.payload(), Some("hello upload"));
        assert_eq!(std::fs::read_dir(h.staging.path()).expect("dir").count(), 0);
    }

    #[tokio::test]
    async fn unreachable_url_is_a_fetch_error() {
        let h = harness(RecordingSummarizer::default(), RecordingGenerator::default());

        let envelope = h.service.import_url("http://bad-host.invalid".into()).await;

        assert_eq!(envelope.error_kind(), Some(ErrorKind::FetchError));
        assert!(!envelope.error_message().unwrap_or_default().is_empty());
    }

    #[test]
    fn health_reports_model_device() {
        let h = harness(RecordingSummarizer::default(), RecordingGenerator::default());
        assert_eq!(h.service.health().device, Device::Cpu);
    }
}
