use ::candle::{DTypeParseError, Error as CandleError};
use thiserror::Error;

use crate::apis::{ApiError, ApiTrait};

pub mod candle;
pub mod config;
pub mod types;

pub use config::ModelConfig;

pub type ModelId = String;

/// A model that can be fetched, loaded once and then run repeatedly on a
/// dedicated thread.
///
/// `fetch` and `load` are split so that the (network bound) download step
/// and the (memory bound) weight loading step can be logged and tested
/// independently.
pub trait ModelTrait {
    type Input: Send + 'static;
    type Output: Send + 'static;
    type LoadData;

    fn fetch<A: ApiTrait>(api: &A, config: &ModelConfig) -> Result<Self::LoadData, ModelError>;

    fn load(load_data: Self::LoadData) -> Result<Self, ModelError>
    where
        Self: Sized;

    fn model_id(&self) -> ModelId;

    fn run(&mut self, input: Self::Input) -> Result<Self::Output, ModelError>;
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{0}")]
    Msg(String),
    #[error("Candle error: `{0}`")]
    CandleError(#[from] CandleError),
    #[error("Api error: `{0}`")]
    ApiError(#[from] ApiError),
    #[error("Tokenizer error: `{0}`")]
    TokenizerError(#[from] tokenizers::Error),
    #[error("Io error: `{0}`")]
    IoError(#[from] std::io::Error),
    #[error("Deserialize error: `{0}`")]
    DeserializeError(#[from] serde_json::Error),
    #[error("DTypeParseError: `{0}`")]
    DTypeParseError(#[from] DTypeParseError),
}

#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::models::ModelError::Msg(format!($msg)))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::models::ModelError::Msg(format!($fmt, $($arg)*)))
    };
}
