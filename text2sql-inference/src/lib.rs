pub mod apis;
pub mod model_thread;
pub mod models;
pub mod prompt;

#[cfg(test)]
mod tests;

pub use hf_hub::api::sync::Api as HuggingFaceApi;
