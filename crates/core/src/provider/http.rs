//! Request execution shared by all backends.

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ErrorCategory, ProviderError};
use crate::metrics::{PROVIDER_ERRORS, PROVIDER_REQUESTS};

pub const INVALID_TOKEN: &str = "invalid_token.mp4";
pub const NEED_PREMIUM: &str = "need_premium.mp4";
pub const TOO_MANY_REQUESTS: &str = "too_many_requests.mp4";
pub const SERVICE_DOWN: &str = "debrid_service_down_error.mp4";
pub const CONTENT_INFRINGING: &str = "content_infringing.mp4";
pub const TRANSFER_ERROR: &str = "transfer_error.mp4";
pub const API_ERROR: &str = "api_error.mp4";

/// A backend error payload translated to the shared taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedError {
    pub category: ErrorCategory,
    pub message: String,
    pub asset_ref: &'static str,
}

impl MappedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>, asset_ref: &'static str) -> Self {
        Self {
            category,
            message: message.into(),
            asset_ref,
        }
    }
}

/// Classification of a non-success status no backend mapping claimed.
pub fn status_fallback(status: u16) -> Option<MappedError> {
    let mapped = match status {
        200..=299 => return None,
        401 | 403 => MappedError::new(ErrorCategory::AuthInvalid, "Invalid token", INVALID_TOKEN),
        402 => MappedError::new(ErrorCategory::QuotaExceeded, "Payment required", NEED_PREMIUM),
        429 => MappedError::new(ErrorCategory::RateLimited, "Too many requests", TOO_MANY_REQUESTS),
        451 => MappedError::new(
            ErrorCategory::LegalRestriction,
            "Unavailable for legal reasons",
            CONTENT_INFRINGING,
        ),
        500..=599 => MappedError::new(
            ErrorCategory::ServiceUnavailable,
            format!("Service unavailable (HTTP {})", status),
            SERVICE_DOWN,
        ),
        _ => MappedError::new(ErrorCategory::Unknown, format!("HTTP {}", status), API_ERROR),
    };
    Some(mapped)
}

/// Sends requests for one backend and normalizes failures.
pub struct RequestExecutor {
    provider: &'static str,
    client: Client,
}

impl RequestExecutor {
    pub fn new(provider: &'static str, timeout: Duration, user_agent: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                ProviderError::new(
                    provider,
                    ErrorCategory::Unknown,
                    format!("Failed to create HTTP client: {}", e),
                    API_ERROR,
                )
            })?;
        Ok(Self { provider, client })
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Build a provider error and count it.
    pub fn error(&self, mapped: MappedError) -> ProviderError {
        PROVIDER_ERRORS
            .with_label_values(&[self.provider, mapped.category.as_str()])
            .inc();
        warn!(
            provider = self.provider,
            category = %mapped.category,
            asset = mapped.asset_ref,
            "{}",
            mapped.message
        );
        ProviderError::new(self.provider, mapped.category, mapped.message, mapped.asset_ref)
    }

    /// Send a request and return its status and JSON body without
    /// interpreting either. Only transport failures are errors, including
    /// a body that fails to arrive.
    pub async fn send(&self, request: RequestBuilder) -> Result<(u16, Value), ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(&e, "Request failed"))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e, "Failed to read response body"))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        debug!(provider = self.provider, status, "Provider response");
        Ok((status, body))
    }

    fn transport_error(&self, e: &reqwest::Error, context: &str) -> ProviderError {
        PROVIDER_REQUESTS
            .with_label_values(&[self.provider, "error"])
            .inc();
        self.error(if e.is_timeout() {
            MappedError::new(ErrorCategory::ServiceUnavailable, "Request timed out", SERVICE_DOWN)
        } else if e.is_connect() {
            MappedError::new(
                ErrorCategory::ServiceUnavailable,
                format!("Connection failed: {}", e),
                SERVICE_DOWN,
            )
        } else if e.is_body() || e.is_decode() {
            MappedError::new(
                ErrorCategory::ServiceUnavailable,
                format!("{}: {}", context, e),
                SERVICE_DOWN,
            )
        } else {
            MappedError::new(ErrorCategory::Unknown, format!("{}: {}", context, e), API_ERROR)
        })
    }

    /// Send a request, consult the backend's error mapping, then the
    /// generic status mapping. Returns the JSON body on success.
    pub async fn execute<M>(&self, request: RequestBuilder, map_error: M) -> Result<Value, ProviderError>
    where
        M: Fn(u16, &Value) -> Option<MappedError>,
    {
        let (status, body) = self.send(request).await?;

        if let Some(mapped) = map_error(status, &body).or_else(|| status_fallback(status)) {
            PROVIDER_REQUESTS
                .with_label_values(&[self.provider, "error"])
                .inc();
            return Err(self.error(mapped));
        }

        PROVIDER_REQUESTS
            .with_label_values(&[self.provider, "success"])
            .inc();
        Ok(body)
    }
}

/// String field that backends send either as a string or a number.
pub fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn u64_field(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0)
}
