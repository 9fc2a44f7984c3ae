use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_AI21_BASE_URL: &str = "https://api.ai21.com/studio/v1";
const DEFAULT_GENERATION_MODEL: &str = "jamba-1.5-large";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_LOG_FILE: &str = "logs/docsummarizer.log";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was installed twice in the same process.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the summarization service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory containing the exported seq2seq model (ONNX graphs, tokenizer, model config).
    pub summarizer_model_dir: PathBuf,
    /// Requested compute device for local inference.
    pub summarizer_device: DevicePreference,
    /// Credential for the remote chat-completion provider.
    pub ai21_api_key: String,
    /// Base URL of the chat-completion provider.
    pub ai21_base_url: String,
    /// Default model identifier used for generation requests.
    pub generation_model: String,
    /// Directory where uploaded files are staged during extraction.
    pub upload_dir: PathBuf,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// File that receives a copy of the log output.
    pub log_file: PathBuf,
}

/// Compute device requested for the summarization model.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Use an accelerator when one is available, otherwise the CPU.
    #[default]
    Auto,
    /// Always run on the CPU.
    Cpu,
    /// Require the CUDA execution provider.
    Cuda,
}

/// Values supplied on the command line that take precedence over the environment.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Port override from `--port`.
    pub server_port: Option<u16>,
    /// Model directory override from `--model-dir`.
    pub model_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the environment, preferring explicit overrides when present.
    pub fn from_env_with(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup(overrides, |key| env::var(key).ok())
    }

    /// Build configuration from `lookup`, which maps variable names to raw values.
    ///
    /// Blank values count as unset.
    fn from_lookup(
        overrides: &ConfigOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required =
            |key: &str| optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()));

        let summarizer_model_dir = match &overrides.model_dir {
            Some(dir) => dir.clone(),
            None => PathBuf::from(required("SUMMARIZER_MODEL_DIR")?),
        };
        let server_port = match overrides.server_port {
            Some(port) => Some(port),
            None => optional("SERVER_PORT")
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };

        Ok(Self {
            summarizer_model_dir,
            summarizer_device: optional("SUMMARIZER_DEVICE")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("SUMMARIZER_DEVICE".into()))
                })
                .transpose()?
                .unwrap_or_default(),
            ai21_api_key: required("AI21_API_KEY")?,
            ai21_base_url: optional("AI21_BASE_URL")
                .unwrap_or_else(|| DEFAULT_AI21_BASE_URL.to_string()),
            generation_model: optional("GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            upload_dir: PathBuf::from(
                optional("UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
            ),
            server_port,
            log_file: PathBuf::from(
                optional("DOCSUMMARIZER_LOG_FILE").unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
            ),
        })
    }

    /// Emit the loaded settings at debug level. The API key is never logged.
    pub fn log_summary(&self) {
        tracing::debug!(
            model_dir = %self.summarizer_model_dir.display(),
            device = ?self.summarizer_device,
            ai21_base_url = %self.ai21_base_url,
            generation_model = %self.generation_model,
            upload_dir = %self.upload_dir.display(),
            server_port = ?self.server_port,
            log_file = %self.log_file.display(),
            "Loaded configuration"
        );
    }
}

impl std::str::FromStr for DevicePreference {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from `.env` and the environment and install it in the global cache.
pub fn init_config(overrides: &ConfigOverrides) -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env_with(overrides)?;
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}
