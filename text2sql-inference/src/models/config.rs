use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::models::ModelId;

/// Configuration section name, inside the node configuration file.
pub const MODEL_CONFIG_SECTION: &str = "text2sql_inference";
/// Prefix of the environment variables overriding the configuration file,
/// e.g. `TEXT2SQL_INFERENCE__MODEL_ID`.
const ENV_PREFIX: &str = "TEXT2SQL_INFERENCE";

const DEFAULT_MODEL_ID: &str = "tscholak/cxmefzzi";
const DEFAULT_REVISION: &str = "main";
const DEFAULT_DTYPE: &str = "f32";
const DEFAULT_MAX_INPUT_LENGTH: usize = 512;
const DEFAULT_MAX_OUTPUT_LENGTH: usize = 512;
const DEFAULT_REPEAT_LAST_N: usize = 64;
const DEFAULT_SEED: u64 = 299_792_458;

/// Configuration of the seq2seq model served by the node.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Hugging Face repository of the model weights and `config.json`.
    #[serde(default = "default_model_id")]
    pub model_id: ModelId,

    /// Revision (branch, tag or commit) of `model_id`.
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Repository holding `tokenizer.json`, when the model repository lacks one.
    /// The tokenizer repository is always fetched at its `main` revision.
    #[serde(default)]
    pub tokenizer_id: Option<String>,

    /// GGUF file, inside `model_id`, with quantized weights. When set, the
    /// quantized T5 implementation is used and `dtype` is ignored.
    #[serde(default)]
    pub quantized_weights_file: Option<String>,

    /// Floating point precision of the weights (`f32`, `bf16` or `f16`).
    #[serde(default = "default_dtype")]
    pub dtype: String,

    /// Accelerator ordinal, ignored on CPU.
    #[serde(default)]
    pub device_id: usize,

    /// Local directory for downloaded artifacts, defaults to the hub cache.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Tokenized prompts are truncated to this many tokens, special tokens included.
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,

    /// Upper bound on the decoder sequence length, start token included.
    #[serde(default = "default_max_output_length")]
    pub max_output_length: usize,

    /// Repeat penalty applied to the last `repeat_last_n` decoded tokens,
    /// `1.0` disables it.
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    #[serde(default = "default_repeat_last_n")]
    pub repeat_last_n: usize,

    /// Sampling temperature, greedy decoding when unset.
    #[serde(default)]
    pub temperature: Option<f64>,

    /// Nucleus sampling threshold, only used together with `temperature`.
    #[serde(default)]
    pub top_p: Option<f64>,

    /// Seed of the logits sampler.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            revision: default_revision(),
            tokenizer_id: None,
            quantized_weights_file: None,
            dtype: default_dtype(),
            device_id: 0,
            cache_dir: None,
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
            max_output_length: DEFAULT_MAX_OUTPUT_LENGTH,
            repeat_penalty: default_repeat_penalty(),
            repeat_last_n: DEFAULT_REPEAT_LAST_N,
            temperature: None,
            top_p: None,
            seed: DEFAULT_SEED,
        }
    }
}

impl ModelConfig {
    /// Reads the `text2sql_inference` section of the configuration file at
    /// `config_file_path`, with `TEXT2SQL_INFERENCE__*` environment variables
    /// taking precedence over the file values.
    ///
    /// A missing section yields the default configuration.
    pub fn from_file_path<P: AsRef<Path>>(config_file_path: P) -> Result<Self, ConfigError> {
        let config_file_path = config_file_path.as_ref();
        let config = Config::builder()
            .add_source(File::from(config_file_path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .keep_prefix(true)
                    .separator("__"),
            )
            .build()?;
        match config.get::<Self>(MODEL_CONFIG_SECTION) {
            Ok(model_config) => Ok(model_config),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Repository the tokenizer is fetched from, with its revision.
    pub fn tokenizer_repo(&self) -> (&str, &str) {
        match &self.tokenizer_id {
            Some(tokenizer_id) => (tokenizer_id.as_str(), DEFAULT_REVISION),
            None => (self.model_id.as_str(), self.revision.as_str()),
        }
    }
}

fn default_model_id() -> ModelId {
    DEFAULT_MODEL_ID.to_string()
}

fn default_revision() -> String {
    DEFAULT_REVISION.to_string()
}

fn default_dtype() -> String {
    DEFAULT_DTYPE.to_string()
}

fn default_max_input_length() -> usize {
    DEFAULT_MAX_INPUT_LENGTH
}

fn default_max_output_length() -> usize {
    DEFAULT_MAX_OUTPUT_LENGTH
}

fn default_repeat_penalty() -> f32 {
    1.0
}

fn default_repeat_last_n() -> usize {
    DEFAULT_REPEAT_LAST_N
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

#[cfg(test)]
pub mod tests {
    use std::io::Write;

    use serial_test::serial;
    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_config_from_file() {
        let file = write_config(
            r#"
            [text2sql_inference]
            model_id = "tscholak/3vnuv1vf"
            tokenizer_id = "t5-base"
            dtype = "bf16"
            max_input_length = 256
            "#,
        );

        let config = ModelConfig::from_file_path(file.path()).unwrap();
        assert_eq!(config.model_id, "tscholak/3vnuv1vf");
        assert_eq!(config.dtype, "bf16");
        assert_eq!(config.max_input_length, 256);
        assert_eq!(config.max_output_length, 512);
        assert_eq!(config.revision, "main");
        assert!(config.quantized_weights_file.is_none());
        assert_eq!(config.tokenizer_repo(), ("t5-base", "main"));
    }

    #[test]
    #[serial]
    fn test_config_missing_section_uses_defaults() {
        let file = write_config(
            r#"
            [text2sql_service]
            service_bind_address = "0.0.0.0:8080"
            "#,
        );

        let config = ModelConfig::from_file_path(file.path()).unwrap();
        assert_eq!(config.model_id, "tscholak/cxmefzzi");
        assert_eq!(config.max_output_length, 512);
        assert_eq!(config.repeat_penalty, 1.0);
        assert!(config.temperature.is_none());
        assert_eq!(config.tokenizer_repo(), ("tscholak/cxmefzzi", "main"));
    }

    #[test]
    #[serial]
    fn test_config_env_override() {
        let file = write_config(
            r#"
            [text2sql_inference]
            model_id = "tscholak/cxmefzzi"
            device_id = 0
            "#,
        );

        std::env::set_var("TEXT2SQL_INFERENCE__DEVICE_ID", "3");
        let config = ModelConfig::from_file_path(file.path());
        std::env::remove_var("TEXT2SQL_INFERENCE__DEVICE_ID");

        assert_eq!(config.unwrap().device_id, 3);
    }

    #[test]
    fn test_config_serializes_to_toml() {
        let config = ModelConfig {
            quantized_weights_file: Some("t5-3b.q8_0.gguf".to_string()),
            ..Default::default()
        };

        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("model_id = \"tscholak/cxmefzzi\""));
        assert!(toml_str.contains("quantized_weights_file = \"t5-3b.q8_0.gguf\""));
        assert!(toml_str.contains("max_output_length = 512"));
    }
}
