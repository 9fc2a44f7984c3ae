//! ONNX Runtime backend for BART-style encoder-decoder models.
//!
//! Expects a model directory exported with separate encoder and decoder graphs:
//!
//! - `encoder_model.onnx` – inputs `input_ids`, `attention_mask`; output `last_hidden_state`.
//! - `decoder_model.onnx` – inputs `input_ids`, `encoder_hidden_states`,
//!   `encoder_attention_mask`; output `logits`.
//! - `tokenizer.json` – Hugging Face tokenizer definition.
//! - `config.json` – model config carrying the special token ids.

use super::{Device, MAX_INPUT_TOKENS, ModelError, Seq2SeqModel, SpecialTokens};
use crate::config::DevicePreference;
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use serde::Deserialize;
use std::fmt::Display;
use std::path::Path;
use tokenizers::{Tokenizer, TruncationParams};

const ENCODER_FILE: &str = "encoder_model.onnx";
const DECODER_FILE: &str = "decoder_model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";
const CONFIG_FILE: &str = "config.json";

/// Special token ids as they appear in a Hugging Face `config.json`.
#[derive(Debug, Deserialize)]
struct ModelConfig {
    decoder_start_token_id: u32,
    eos_token_id: u32,
    #[serde(default)]
    forced_bos_token_id: Option<u32>,
    #[serde(default)]
    forced_eos_token_id: Option<u32>,
}

impl From<ModelConfig> for SpecialTokens {
    fn from(config: ModelConfig) -> Self {
        Self {
            decoder_start: config.decoder_start_token_id,
            eos: config.eos_token_id,
            forced_bos: config.forced_bos_token_id,
            forced_eos: config.forced_eos_token_id,
        }
    }
}

/// Encoder activations for one input sequence.
pub struct EncoderOutput {
    hidden_states: Vec<f32>,
    source_len: usize,
    hidden_size: usize,
}

/// Seq2seq model running on ONNX Runtime.
pub struct OnnxSeq2Seq {
    encoder: Session,
    decoder: Session,
    tokenizer: Tokenizer,
    special: SpecialTokens,
    device: Device,
}

impl OnnxSeq2Seq {
    /// Load the model from `model_dir`, placing both graphs on the device resolved from
    /// `preference`.
    pub fn load(model_dir: &Path, preference: DevicePreference) -> Result<Self, ModelError> {
        let device = resolve_device(preference)?;

        let config_path = model_dir.join(CONFIG_FILE);
        let raw_config =
            std::fs::read(&config_path).map_err(|error| load_error(&config_path, error))?;
        let config: ModelConfig =
            serde_json::from_slice(&raw_config).map_err(|error| load_error(&config_path, error))?;

        let tokenizer_path = model_dir.join(TOKENIZER_FILE);
        let mut tokenizer =
            Tokenizer::from_file(&tokenizer_path).map_err(|error| load_error(&tokenizer_path, error))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_INPUT_TOKENS,
                ..Default::default()
            }))
            .map_err(|error| load_error(&tokenizer_path, error))?;

        let encoder = build_session(&model_dir.join(ENCODER_FILE), device)?;
        let decoder = build_session(&model_dir.join(DECODER_FILE), device)?;

        tracing::info!(
            model_dir = %model_dir.display(),
            device = device.as_str(),
            "Summarization model loaded"
        );

        Ok(Self {
            encoder,
            decoder,
            tokenizer,
            special: config.into(),
            device,
        })
    }
}

fn load_error(path: &Path, error: impl Display) -> ModelError {
    ModelError::Load(format!("{}: {error}", path.display()))
}

fn inference_error(error: impl Display) -> ModelError {
    ModelError::Inference(error.to_string())
}

fn cuda_available() -> bool {
    CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
}

fn resolve_device(preference: DevicePreference) -> Result<Device, ModelError> {
    match preference {
        DevicePreference::Cpu => Ok(Device::Cpu),
        DevicePreference::Cuda if cuda_available() => Ok(Device::Cuda),
        DevicePreference::Cuda => Err(ModelError::Load(
            "CUDA execution provider requested but not available".into(),
        )),
        DevicePreference::Auto if cuda_available() => Ok(Device::Cuda),
        DevicePreference::Auto => Ok(Device::Cpu),
    }
}

fn build_session(path: &Path, device: Device) -> Result<Session, ModelError> {
    let mut builder = Session::builder()
        .map_err(|error| load_error(path, error))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|error| load_error(path, error))?;
    if device == Device::Cuda {
        builder = builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(|error| load_error(path, error))?;
    }
    builder
        .commit_from_file(path)
        .map_err(|error| load_error(path, error))
}

impl Seq2SeqModel for OnnxSeq2Seq {
    type Encoded = EncoderOutput;

    fn tokenize(&self, text: &str) -> Result<Vec<u32>, ModelError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|error| ModelError::Tokenizer(error.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn encode(&mut self, input_ids: &[u32]) -> Result<EncoderOutput, ModelError> {
        let source_len = input_ids.len();
        if source_len == 0 {
            return Err(ModelError::Tokenizer("input produced no tokens".into()));
        }
        let ids: Vec<i64> = input_ids.iter().map(|id| i64::from(*id)).collect();
        let ids = Tensor::from_array(([1_usize, source_len], ids)).map_err(inference_error)?;
        let mask =
            Tensor::from_array(([1_usize, source_len], vec![1_i64; source_len])).map_err(inference_error)?;

        let outputs = self
            .encoder
            .run(ort::inputs!["input_ids" => ids, "attention_mask" => mask])
            .map_err(inference_error)?;
        let (_, hidden) = outputs["last_hidden_state"]
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;

        if hidden.is_empty() || hidden.len() % source_len != 0 {
            return Err(ModelError::Inference(format!(
                "encoder returned {} values for {source_len} tokens",
                hidden.len()
            )));
        }
        Ok(EncoderOutput {
            hidden_size: hidden.len() / source_len,
            hidden_states: hidden.to_vec(),
            source_len,
        })
    }

    fn next_token_logits(
        &mut self,
        encoded: &EncoderOutput,
        prefixes: &[Vec<u32>],
    ) -> Result<Vec<Vec<f32>>, ModelError> {
        let batch = prefixes.len();
        let target_len = prefixes.first().map(Vec::len).unwrap_or(0);
        if batch == 0 || target_len == 0 {
            return Ok(Vec::new());
        }
        if prefixes.iter().any(|prefix| prefix.len() != target_len) {
            return Err(ModelError::Inference(
                "decoder prefixes must share one length".into(),
            ));
        }

        let ids: Vec<i64> = prefixes
            .iter()
            .flat_map(|prefix| prefix.iter().map(|id| i64::from(*id)))
            .collect();
        let mut hidden = Vec::with_capacity(batch * encoded.hidden_states.len());
        for _ in 0..batch {
            hidden.extend_from_slice(&encoded.hidden_states);
        }
        let mask = vec![1_i64; batch * encoded.source_len];

        let ids = Tensor::from_array(([batch, target_len], ids)).map_err(inference_error)?;
        let hidden = Tensor::from_array(([batch, encoded.source_len, encoded.hidden_size], hidden))
            .map_err(inference_error)?;
        let mask =
            Tensor::from_array(([batch, encoded.source_len], mask)).map_err(inference_error)?;

        let outputs = self
            .decoder
            .run(ort::inputs![
                "input_ids" => ids,
                "encoder_hidden_states" => hidden,
                "encoder_attention_mask" => mask,
            ])
            .map_err(inference_error)?;
        let (_, logits) = outputs["logits"]
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;

        let positions = batch * target_len;
        if logits.is_empty() || logits.len() % positions != 0 {
            return Err(ModelError::Inference(format!(
                "decoder returned {} logits for {positions} positions",
                logits.len()
            )));
        }
        let vocab = logits.len() / positions;
        Ok((0..batch)
            .map(|row| {
                let start = (row * target_len + target_len - 1) * vocab;
                logits[start..start + vocab].to_vec()
            })
            .collect())
    }

    fn decode(&self, ids: &[u32]) -> Result<String, ModelError> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|error| ModelError::Tokenizer(error.to_string()))
    }

    fn special_tokens(&self) -> SpecialTokens {
        self.special
    }

    fn device(&self) -> Device {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_tokens_come_from_model_config() {
        let config: ModelConfig = serde_json::from_str(
            r#"{
                "model_type": "bart",
                "decoder_start_token_id": 2,
                "eos_token_id": 2,
                "pad_token_id": 1,
                "forced_bos_token_id": 0,
                "forced_eos_token_id": 2,
                "vocab_size": 50264
            }"#,
        )
        .expect("config");

        let special = SpecialTokens::from(config);

        assert_eq!(special.decoder_start, 2);
        assert_eq!(special.eos, 2);
        assert_eq!(special.forced_bos, Some(0));
        assert_eq!(special.forced_eos, Some(2));
    }

    #[test]
    fn forced_tokens_are_optional() {
        let config: ModelConfig = serde_json::from_str(
            r#"{"decoder_start_token_id": 0, "eos_token_id": 1, "pad_token_id": 0}"#,
        )
        .expect("config");
        let special = SpecialTokens::from(config);
        assert_eq!(special.forced_bos, None);
        assert_eq!(special.forced_eos, None);
    }

    #[test]
    fn missing_model_directory_fails_to_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = OnnxSeq2Seq::load(&dir.path().join("absent"), DevicePreference::Cpu);
        assert!(matches!(result, Err(ModelError::Load(message)) if message.contains("config.json")));
    }
}
