use std::{str::FromStr, time::Instant};

use candle::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::{
    generation::LogitsProcessor,
    models::{quantized_t5, t5},
    quantized_var_builder, utils::apply_repeat_penalty,
};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::{
    apis::ApiTrait,
    models::{
        config::ModelConfig,
        types::{GenerationParams, Seq2SeqLoadData, Text2SqlInput, Text2SqlOutput, WeightFiles},
        ModelError, ModelId, ModelTrait,
    },
};

use super::{device, fetch_weights, CONFIG_FILE, TOKENIZER_FILE};

/// Token ids driving the decoder loop, read from the model `config.json`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecoderSpecialTokens {
    pub decoder_start_token_id: u32,
    pub eos_token_id: u32,
    pub use_cache: bool,
}

impl From<&t5::Config> for DecoderSpecialTokens {
    fn from(config: &t5::Config) -> Self {
        Self {
            decoder_start_token_id: config
                .decoder_start_token_id
                .unwrap_or(config.pad_token_id) as u32,
            eos_token_id: config.eos_token_id as u32,
            use_cache: config.use_cache,
        }
    }
}

impl From<&quantized_t5::Config> for DecoderSpecialTokens {
    fn from(config: &quantized_t5::Config) -> Self {
        Self {
            decoder_start_token_id: config
                .decoder_start_token_id
                .unwrap_or(config.pad_token_id) as u32,
            eos_token_id: config.eos_token_id as u32,
            use_cache: config.use_cache,
        }
    }
}

/// Full precision or quantized T5 encoder-decoder.
enum T5Backbone {
    Full(t5::T5ForConditionalGeneration),
    Quantized(quantized_t5::T5ForConditionalGeneration),
}

impl T5Backbone {
    fn encode(&mut self, input_ids: &Tensor) -> candle::Result<Tensor> {
        match self {
            Self::Full(model) => model.encode(input_ids),
            Self::Quantized(model) => model.encode(input_ids),
        }
    }

    fn decode(&mut self, decoder_ids: &Tensor, encoder_output: &Tensor) -> candle::Result<Tensor> {
        match self {
            Self::Full(model) => model.decode(decoder_ids, encoder_output),
            Self::Quantized(model) => model.decode(decoder_ids, encoder_output),
        }
    }

    fn clear_kv_cache(&mut self) {
        match self {
            Self::Full(model) => model.clear_kv_cache(),
            Self::Quantized(model) => model.clear_kv_cache(),
        }
    }
}

/// T5 family text-to-SQL model (e.g. the PICARD fine-tuned T5-3B checkpoints).
pub struct T5Model {
    model: T5Backbone,
    device: Device,
    generation: GenerationParams,
    model_id: ModelId,
    special_tokens: DecoderSpecialTokens,
    tokenizer: Tokenizer,
}

impl T5Model {
    fn new(
        model: T5Backbone,
        device: Device,
        generation: GenerationParams,
        model_id: ModelId,
        special_tokens: DecoderSpecialTokens,
        tokenizer: Tokenizer,
    ) -> Self {
        Self {
            model,
            device,
            generation,
            model_id,
            special_tokens,
            tokenizer,
        }
    }
}

/// Loads a tokenizer truncating every encoding to `max_input_length` tokens,
/// special tokens included, and never padding.
pub fn load_tokenizer(
    tokenizer_path: &std::path::Path,
    max_input_length: usize,
) -> Result<Tokenizer, ModelError> {
    let mut tokenizer = Tokenizer::from_file(tokenizer_path)?;
    tokenizer.with_padding(None);
    tokenizer.with_truncation(Some(TruncationParams {
        max_length: max_input_length,
        ..Default::default()
    }))?;
    Ok(tokenizer)
}

impl ModelTrait for T5Model {
    type Input = Text2SqlInput;
    type Output = Text2SqlOutput;
    type LoadData = Seq2SeqLoadData;

    fn fetch<A: ApiTrait>(api: &A, config: &ModelConfig) -> Result<Self::LoadData, ModelError> {
        let device = device(config.device_id)?;
        let dtype = DType::from_str(&config.dtype)?;

        let model_id = config.model_id.clone();
        let config_path = api.get(&model_id, &config.revision, CONFIG_FILE)?;
        let (tokenizer_repo, tokenizer_revision) = config.tokenizer_repo();
        let tokenizer_path = api.get(tokenizer_repo, tokenizer_revision, TOKENIZER_FILE)?;
        let weights = fetch_weights(
            api,
            &model_id,
            &config.revision,
            config.quantized_weights_file.as_deref(),
        )?;

        Ok(Self::LoadData {
            config_path,
            device,
            dtype,
            generation: GenerationParams::from(config),
            model_id,
            tokenizer_path,
            weights,
        })
    }

    fn load(load_data: Self::LoadData) -> Result<Self, ModelError> {
        info!("Loading T5 model {} ...", load_data.model_id);

        let start = Instant::now();

        let tokenizer = load_tokenizer(
            &load_data.tokenizer_path,
            load_data.generation.max_input_length,
        )?;
        let config_contents = std::fs::read(&load_data.config_path)?;

        let (model, special_tokens) = match &load_data.weights {
            WeightFiles::Gguf(path) => {
                let config: quantized_t5::Config = serde_json::from_slice(&config_contents)?;
                let vb = quantized_var_builder::VarBuilder::from_gguf(path, &load_data.device)?;
                let model = quantized_t5::T5ForConditionalGeneration::load(vb, &config)?;
                (T5Backbone::Quantized(model), DecoderSpecialTokens::from(&config))
            }
            WeightFiles::Safetensors(paths) => {
                let config: t5::Config = serde_json::from_slice(&config_contents)?;
                let vb = unsafe {
                    VarBuilder::from_mmaped_safetensors(paths, load_data.dtype, &load_data.device)?
                };
                let model = t5::T5ForConditionalGeneration::load(vb, &config)?;
                (T5Backbone::Full(model), DecoderSpecialTokens::from(&config))
            }
            WeightFiles::Pth(path) => {
                let config: t5::Config = serde_json::from_slice(&config_contents)?;
                let vb = VarBuilder::from_pth(path, load_data.dtype, &load_data.device)?;
                let model = t5::T5ForConditionalGeneration::load(vb, &config)?;
                (T5Backbone::Full(model), DecoderSpecialTokens::from(&config))
            }
        };
        info!("Loaded the model in {:?}", start.elapsed());

        Ok(Self::new(
            model,
            load_data.device,
            load_data.generation,
            load_data.model_id,
            special_tokens,
            tokenizer,
        ))
    }

    fn model_id(&self) -> ModelId {
        self.model_id.clone()
    }

    fn run(&mut self, input: Self::Input) -> Result<Self::Output, ModelError> {
        let Text2SqlInput { prompt } = input;
        let special_tokens = self.special_tokens;

        debug!("Running inference on prompt: {:?}", prompt);
        let start_gen = Instant::now();

        let encoding = self.tokenizer.encode(prompt, true)?;
        let input_ids = encoding.get_ids();
        let input_tokens = input_ids.len();

        self.model.clear_kv_cache();
        let input_ids = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let encoder_output = self.model.encode(&input_ids)?;

        let model = &mut self.model;
        let device = &self.device;
        let output_ids = generate(&self.generation, special_tokens, |output_ids| {
            let decoder_ids = if output_ids.len() == 1 || !special_tokens.use_cache {
                Tensor::new(output_ids, device)?.unsqueeze(0)?
            } else {
                let last_token = output_ids[output_ids.len() - 1];
                Tensor::new(&[last_token], device)?.unsqueeze(0)?
            };
            Ok(model.decode(&decoder_ids, &encoder_output)?.squeeze(0)?)
        })?;

        let output = Text2SqlOutput {
            text: self.tokenizer.decode(&output_ids, true)?,
            input_tokens,
            output_tokens: output_ids.len() - 1,
            time: start_gen.elapsed().as_secs_f64(),
        };
        info!(
            "{} token/s\n----\n{output}\n----",
            output.output_tokens as f64 / output.time,
        );

        Ok(output)
    }
}

/// Runs the decoder loop, from the decoder start token until the end of
/// sequence token, or until the decoder sequence holds `max_output_length`
/// tokens (start token included).
///
/// `next_logits` maps the decoder sequence so far to the logits of the next
/// token. Returns the decoder sequence, start token included and end of
/// sequence token excluded.
pub fn generate<F>(
    generation: &GenerationParams,
    special_tokens: DecoderSpecialTokens,
    mut next_logits: F,
) -> Result<Vec<u32>, ModelError>
where
    F: FnMut(&[u32]) -> Result<Tensor, ModelError>,
{
    let GenerationParams {
        max_output_length,
        repeat_penalty,
        repeat_last_n,
        temperature,
        top_p,
        seed,
        ..
    } = *generation;

    let mut logits_processor = LogitsProcessor::new(seed, temperature, top_p);
    let mut output_ids = vec![special_tokens.decoder_start_token_id];
    while output_ids.len() < max_output_length {
        let logits = next_logits(&output_ids)?.to_dtype(DType::F32)?;
        let logits = if repeat_penalty == 1. {
            logits
        } else {
            let start_at = output_ids.len().saturating_sub(repeat_last_n);
            apply_repeat_penalty(&logits, repeat_penalty, &output_ids[start_at..])?
        };

        let next_token = logits_processor.sample(&logits)?;
        if next_token == special_tokens.eos_token_id {
            break;
        }
        output_ids.push(next_token);
    }
    Ok(output_ids)
}
