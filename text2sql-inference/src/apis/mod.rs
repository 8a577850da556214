use hf_hub::api::sync::ApiError as HuggingFaceError;

use std::path::PathBuf;

use thiserror::Error;

pub mod hugging_face;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("File `{filename}` not found in repo `{repo_id}`")]
    FileNotFound { repo_id: String, filename: String },
    #[error("HuggingFace API error: `{0}`")]
    HuggingFaceError(#[from] HuggingFaceError),
}

/// Source of model artifacts (weights, configs, tokenizers).
///
/// The production implementation is the Hugging Face Hub sync client, tests
/// provide a local directory backed implementation.
pub trait ApiTrait {
    /// Builds a new client, authenticated with `api_key` when present, and
    /// storing downloaded files under `cache_dir` (or the default hub cache).
    fn create(api_key: Option<String>, cache_dir: Option<PathBuf>) -> Result<Self, ApiError>
    where
        Self: Sized;

    /// Retrieves `filename` from `repo_id` at `revision`, returning the local path
    /// of the (possibly cached) file.
    fn get(&self, repo_id: &str, revision: &str, filename: &str) -> Result<PathBuf, ApiError>;
}
