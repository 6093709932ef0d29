//! Provider error types and HTTP status classification.
//!
//! The error enum itself lives in `admitscore-core` so that the retry loop can
//! downcast it; this module maps raw HTTP failures onto it.

pub use admitscore_core::error::ProviderError;

/// Seconds to wait after a 429 that carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Parse a `retry-after` header value given in whole seconds.
pub(crate) fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
        * 1000
}

/// Classify a non-success HTTP response.
///
/// `message` is the provider's error message when one could be parsed from
/// the body, otherwise the raw body.
pub(crate) fn classify_status(
    status: u16,
    retry_after_ms: u64,
    message: String,
    model: &str,
) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited { retry_after_ms },
        529 => ProviderError::Overloaded(message),
        401 | 403 => ProviderError::AuthenticationFailed(message),
        404 => ProviderError::ModelNotFound(model.to_string()),
        _ if message.to_lowercase().contains("overloaded") => ProviderError::Overloaded(message),
        _ => ProviderError::ApiError { status, message },
    }
}

/// Map a transport failure.
pub(crate) fn transport_error(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}
