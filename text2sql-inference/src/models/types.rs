use std::{fmt::Display, path::PathBuf};

use candle::{DType, Device};

use crate::models::{config::ModelConfig, ModelId};

/// Files holding the model weights, as resolved from the model repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WeightFiles {
    /// One or more (sharded) safetensors files.
    Safetensors(Vec<PathBuf>),
    /// A single PyTorch pickle checkpoint.
    Pth(PathBuf),
    /// Quantized weights, in GGUF format.
    Gguf(PathBuf),
}

/// Decoding parameters, fixed for the lifetime of the process.
#[derive(Clone, Debug)]
pub struct GenerationParams {
    pub max_input_length: usize,
    pub max_output_length: usize,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: u64,
}

impl From<&ModelConfig> for GenerationParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_input_length: config.max_input_length,
            max_output_length: config.max_output_length,
            repeat_penalty: config.repeat_penalty,
            repeat_last_n: config.repeat_last_n,
            temperature: config.temperature,
            top_p: config.top_p,
            seed: config.seed,
        }
    }
}

/// Everything needed to build a seq2seq model in memory, once its files
/// have been fetched.
#[derive(Debug)]
pub struct Seq2SeqLoadData {
    pub config_path: PathBuf,
    pub device: Device,
    pub dtype: DType,
    pub generation: GenerationParams,
    pub model_id: ModelId,
    pub tokenizer_path: PathBuf,
    pub weights: WeightFiles,
}

/// Input of a single text-to-SQL generation: the linearized schema prompt.
#[derive(Clone, Debug)]
pub struct Text2SqlInput {
    pub prompt: String,
}

impl Text2SqlInput {
    pub fn new(prompt: String) -> Self {
        Self { prompt }
    }
}

#[derive(Clone, Debug)]
pub struct Text2SqlOutput {
    /// Decoded SQL query, special tokens skipped.
    pub text: String,
    /// Number of prompt tokens fed to the encoder, after truncation.
    pub input_tokens: usize,
    /// Number of generated tokens, start and end tokens excluded.
    pub output_tokens: usize,
    /// Generation wall time, in seconds.
    pub time: f64,
}

impl Display for Text2SqlOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Output: {}\nTime: {}\nInput tokens: {}\nOutput tokens: {}",
            self.text, self.time, self.input_tokens, self.output_tokens
        )
    }
}
