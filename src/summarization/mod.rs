//! Abstractive summarization with a local sequence-to-sequence model.
//!
//! The model is loaded once at process start and owned by a [`SummarizationEngine`], which
//! serializes every inference call behind a single lock: tokenize, beam search, and decode run as
//! one critical section on a blocking worker thread. Backends implement [`Seq2SeqModel`]; the
//! production backend is [`OnnxSeq2Seq`].

mod beam;
mod onnx;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub use beam::{BeamParams, beam_search};
pub use onnx::OnnxSeq2Seq;

/// Maximum number of input tokens fed to the encoder; longer inputs are silently truncated.
pub const MAX_INPUT_TOKENS: usize = 1024;

/// Failures raised by a [`Seq2SeqModel`] backend.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Model files were missing or unreadable.
    #[error("Failed to load model: {0}")]
    Load(String),
    /// Tokenizer rejected the input or output ids.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    /// The inference runtime failed.
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Errors surfaced by the summarization engine.
#[derive(Debug, Error)]
pub enum SummarizationError {
    /// The backing model failed while tokenizing, decoding, or running inference.
    #[error("Summarization failed: {0}")]
    Model(#[from] ModelError),
    /// A previous inference panicked while holding the model lock.
    #[error("Summarization model is unavailable after an earlier failure")]
    Poisoned,
    /// The blocking inference task was cancelled or panicked.
    #[error("Summarization task failed: {0}")]
    Task(String),
}

/// Compute device the model was placed on at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// General-purpose CPU execution.
    Cpu,
    /// CUDA accelerator.
    Cuda,
}

impl Device {
    /// Lowercase label used in logs and the health endpoint.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }
}

/// Token ids with special meaning during decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    /// First token fed to the decoder.
    pub decoder_start: u32,
    /// End-of-sequence token.
    pub eos: u32,
    /// Token forced as the first generated token, if the model requires one.
    pub forced_bos: Option<u32>,
    /// Token forced when the sequence reaches its length limit, if the model requires one.
    pub forced_eos: Option<u32>,
}

/// A local encoder-decoder model exposing tokenization, incremental decoding, and detokenization.
///
/// Implementations may keep mutable inference state, so every method that runs the network takes
/// `&mut self`; callers must not share one instance across threads without a lock.
pub trait Seq2SeqModel: Send + 'static {
    /// Encoder output reused across decoding steps.
    type Encoded;

    /// Token ids for `text`, truncated to the model's input window.
    fn tokenize(&self, text: &str) -> Result<Vec<u32>, ModelError>;

    /// Run the encoder once over the input ids.
    fn encode(&mut self, input_ids: &[u32]) -> Result<Self::Encoded, ModelError>;

    /// Logits over the vocabulary for the next token of each prefix.
    ///
    /// All prefixes have the same length. The result holds one row per prefix.
    fn next_token_logits(
        &mut self,
        encoded: &Self::Encoded,
        prefixes: &[Vec<u32>],
    ) -> Result<Vec<Vec<f32>>, ModelError>;

    /// Text for a generated id sequence with special tokens removed.
    fn decode(&self, ids: &[u32]) -> Result<String, ModelError>;

    /// Special token ids used by beam search.
    fn special_tokens(&self) -> SpecialTokens;

    /// Device the model runs on.
    fn device(&self) -> Device;
}

/// Parameters for a single summarization call.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    /// Text to summarize.
    pub text: String,
    /// Upper bound on the summary length in tokens.
    pub max_length: usize,
    /// Lower bound on the summary length in tokens.
    pub min_length: usize,
    /// Exponent applied to the hypothesis length when ranking beams; above 1.0 favors longer output.
    pub length_penalty: f32,
    /// Number of beams kept during search.
    pub beam_count: usize,
}

impl SummaryRequest {
    /// Default upper bound on summary length.
    pub const DEFAULT_MAX_LENGTH: usize = 150;
    /// Default lower bound on summary length.
    pub const DEFAULT_MIN_LENGTH: usize = 30;
    /// Default length penalty.
    pub const DEFAULT_LENGTH_PENALTY: f32 = 2.0;
    /// Default beam width.
    pub const DEFAULT_BEAM_COUNT: usize = 4;
    /// Widest beam a request may ask for.
    pub const MAX_BEAM_COUNT: usize = 16;
    /// Longest summary a request may ask for; BART decoders have as many positions as inputs.
    pub const MAX_LENGTH_LIMIT: usize = MAX_INPUT_TOKENS;

    /// Request with default decoding parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            max_length: Self::DEFAULT_MAX_LENGTH,
            min_length: Self::DEFAULT_MIN_LENGTH,
            length_penalty: Self::DEFAULT_LENGTH_PENALTY,
            beam_count: Self::DEFAULT_BEAM_COUNT,
        }
    }

    fn beam_params(&self) -> BeamParams {
        BeamParams {
            num_beams: self.beam_count,
            min_length: self.min_length,
            max_length: self.max_length,
            length_penalty: self.length_penalty,
            early_stopping: true,
        }
    }
}

/// Interface used by the pipeline to obtain summaries.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a summary for the request.
    async fn summarize(&self, request: SummaryRequest) -> Result<String, SummarizationError>;

    /// Device inference runs on.
    fn device(&self) -> Device;
}

/// Owns the single model instance and serializes access to it.
pub struct SummarizationEngine<M> {
    model: Arc<Mutex<M>>,
    device: Device,
}

impl<M: Seq2SeqModel> SummarizationEngine<M> {
    /// Take ownership of a loaded model.
    pub fn new(model: M) -> Self {
        let device = model.device();
        Self {
            model: Arc::new(Mutex::new(model)),
            device,
        }
    }
}

/// Tokenize, search, and decode while the caller holds exclusive access to the model.
fn run_summary<M: Seq2SeqModel>(
    model: &mut M,
    request: &SummaryRequest,
) -> Result<String, ModelError> {
    let input_ids = model.tokenize(&request.text)?;
    let encoded = model.encode(&input_ids)?;
    let output_ids = beam_search(model, &encoded, &request.beam_params())?;
    model.decode(&output_ids)
}

#[async_trait]
impl<M: Seq2SeqModel> Summarizer for SummarizationEngine<M> {
    async fn summarize(&self, request: SummaryRequest) -> Result<String, SummarizationError> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut guard = model.lock().map_err(|_| SummarizationError::Poisoned)?;
            let summary = run_summary(&mut *guard, &request)?;
            Ok(summary.trim().to_string())
        })
        .await
        .map_err(|error| SummarizationError::Task(error.to_string()))?
    }

    fn device(&self) -> Device {
        self.device
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;

    fn article(words: usize) -> String {
        (0..words)
            .map(|i| ["alpha", "be", "gamma", "delta", "epsilon"][i % 5])
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn defaults_match_documented_values() {
        let request = SummaryRequest::new("text");
        assert_eq!(request.max_length, 150);
        assert_eq!(request.min_length, 30);
        assert_eq!(request.length_penalty, 2.0);
        assert_eq!(request.beam_count, 4);
    }

    #[tokio::test]
    async fn summarize_is_deterministic() {
        let engine = SummarizationEngine::new(ScriptedModel::new());
        let request = SummaryRequest {
            min_length: 3,
            max_length: 20,
            ..SummaryRequest::new(article(1200))
        };

        let first = engine.summarize(request.clone()).await.expect("summary");
        let second = engine.summarize(request).await.expect("summary");

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn summary_respects_max_length() {
        let engine = SummarizationEngine::new(ScriptedModel::new());
        let request = SummaryRequest {
            min_length: 1,
            max_length: 6,
            ..SummaryRequest::new(article(50))
        };

        let summary = engine.summarize(request).await.expect("summary");

        assert!(summary.split_whitespace().count() <= 6);
    }

    #[tokio::test]
    async fn tokenizer_failures_surface_as_summarization_errors() {
        let engine = SummarizationEngine::new(ScriptedModel::new());

        let error = engine
            .summarize(SummaryRequest::new("bad\u{0}input"))
            .await
            .expect_err("tokenizer failure");

        assert!(matches!(error, SummarizationError::Model(ModelError::Tokenizer(_))));
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_model() {
        let engine = Arc::new(SummarizationEngine::new(ScriptedModel::new()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                let request = SummaryRequest {
                    min_length: 2,
                    max_length: 12,
                    ..SummaryRequest::new(article(200))
                };
                engine.summarize(request).await
            }));
        }

        let mut outputs = Vec::new();
        for handle in handles {
            outputs.push(handle.await.expect("join").expect("summary"));
        }
        assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(engine.model.lock().expect("lock").encode_calls, 8);
    }

    #[test]
    fn long_inputs_are_truncated_silently() {
        let mut model = ScriptedModel::new();
        model.max_input = 16;
        let ids = model.tokenize(&article(1200)).expect("ids");
        assert_eq!(ids.len(), 16);
    }
}
