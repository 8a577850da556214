use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

/// Counter metric that tracks the number of inference requests, by outcome.
///
/// # Metric Details
/// - Name: `text2sql_inference_requests_total`
/// - Type: Counter
/// - Labels: `status` (`success`, `invalid_body`, `model_error`, `internal_error`)
pub static INFERENCE_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "text2sql_inference_requests_total",
        "Total number of inference requests, by outcome",
        &["status"]
    )
    .unwrap()
});

/// Histogram metric that tracks the end-to-end latency of successful inference requests.
///
/// Generation is greedy and bounded by the maximum output length, so the buckets
/// range from 50ms up to 5 minutes for long queries on CPU.
///
/// # Metric Details
/// - Name: `text2sql_inference_latency_seconds`
/// - Type: Histogram
/// - Labels: `model`
/// - Unit: seconds
pub static INFERENCE_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "text2sql_inference_latency_seconds",
        "The latency of inference requests in seconds",
        &["model"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .unwrap()
});

/// Counter metric that tracks the total number of prompt tokens fed to the encoder.
///
/// # Metric Details
/// - Name: `text2sql_input_tokens_total`
/// - Type: Counter
/// - Labels: `model`
pub static INPUT_TOKENS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "text2sql_input_tokens_total",
        "Total number of input tokens processed",
        &["model"]
    )
    .unwrap()
});

/// Counter metric that tracks the total number of tokens generated by the decoder.
///
/// # Metric Details
/// - Name: `text2sql_output_tokens_total`
/// - Type: Counter
/// - Labels: `model`
pub static OUTPUT_TOKENS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "text2sql_output_tokens_total",
        "Total number of output tokens generated",
        &["model"]
    )
    .unwrap()
});
