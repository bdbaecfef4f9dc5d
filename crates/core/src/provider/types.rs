//! Types for debrid provider operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of failure categories shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Token invalid or expired.
    AuthInvalid,
    /// Plan or data limit hit.
    QuotaExceeded,
    /// Backend-side throttling.
    RateLimited,
    /// Backend outage or overload.
    ServiceUnavailable,
    /// Content blocked for legal reasons.
    LegalRestriction,
    /// Unclassified backend error, surfaced verbatim.
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::AuthInvalid => "auth_invalid",
            ErrorCategory::QuotaExceeded => "quota_exceeded",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::ServiceUnavailable => "service_unavailable",
            ErrorCategory::LegalRestriction => "legal_restriction",
            ErrorCategory::Unknown => "unknown",
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            ErrorCategory::AuthInvalid => RetryPolicy::RequireReauth,
            ErrorCategory::RateLimited | ErrorCategory::ServiceUnavailable => {
                RetryPolicy::RetryAfterBackoff
            }
            ErrorCategory::QuotaExceeded
            | ErrorCategory::LegalRestriction
            | ErrorCategory::Unknown => RetryPolicy::Terminal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller should do after a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// The user has to authorize again.
    RequireReauth,
    /// Retrying the same call will not help.
    Terminal,
    RetryAfterBackoff,
}

/// Error raised by any provider, normalized to a category.
///
/// `asset_ref` names the explanation video shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider} {category}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub category: ErrorCategory,
    pub message: String,
    pub asset_ref: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        category: ErrorCategory,
        message: impl Into<String>,
        asset_ref: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            category,
            message: message.into(),
            asset_ref: asset_ref.into(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.category.retry_policy()
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_policy() == RetryPolicy::RetryAfterBackoff
    }
}

/// How a backend is authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Pre-shared token used as is.
    PrivateToken(String),
    /// Refresh token exchanged for an access token by `initialize_auth`.
    RefreshToken(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::PrivateToken(_) => f.write_str("PrivateToken(<redacted>)"),
            Credential::RefreshToken(_) => f.write_str("RefreshToken(<redacted>)"),
        }
    }
}

/// Transfer state on the debrid side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Queued,
    Downloading,
    /// Fully cached and ready to stream.
    Downloaded,
    Error,
    Unknown,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Queued => "queued",
            TransferStatus::Downloading => "downloading",
            TransferStatus::Downloaded => "downloaded",
            TransferStatus::Error => "error",
            TransferStatus::Unknown => "unknown",
        }
    }
}

/// Result of adding a magnet or torrent file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedTorrent {
    /// Backend transfer id.
    pub id: String,
    pub info_hash: String,
    pub name: Option<String>,
    /// Already cached on the backend.
    pub ready: bool,
}

/// A file of a remote transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub size: u64,
    /// Direct or restricted link, once available.
    pub link: Option<String>,
}

/// A transfer as the backend reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTorrent {
    pub id: String,
    pub info_hash: String,
    pub name: String,
    pub size: u64,
    pub status: TransferStatus,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    pub files: Vec<RemoteFile>,
}

/// Whether a hash is cached on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub info_hash: String,
    pub cached: bool,
}

/// Account details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: Option<String>,
    pub email: Option<String>,
    pub premium: bool,
    pub premium_until: Option<DateTime<Utc>>,
}

/// Device code issued at the start of a device authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    pub expires_in: u64,
    /// Seconds to wait between exchange attempts.
    pub interval: u64,
}

/// Tokens granted by an exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Capability contract implemented by every debrid backend.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Backend name, used in errors and metric labels.
    fn name(&self) -> &str;

    /// Prepare credentials. A private token needs no exchange.
    async fn initialize_auth(&self) -> Result<(), ProviderError>;

    async fn add_magnet(&self, magnet_link: &str) -> Result<AddedTorrent, ProviderError>;

    async fn add_torrent_file(
        &self,
        torrent: &[u8],
        name: &str,
    ) -> Result<AddedTorrent, ProviderError>;

    async fn list_torrents(&self) -> Result<Vec<RemoteTorrent>, ProviderError>;

    async fn get_torrent_info(&self, id: &str) -> Result<RemoteTorrent, ProviderError>;

    /// Cache state of each hash, in input order.
    async fn get_availability(
        &self,
        info_hashes: &[String],
    ) -> Result<Vec<Availability>, ProviderError>;

    async fn delete_torrent(&self, id: &str) -> Result<(), ProviderError>;

    async fn get_user_info(&self) -> Result<UserInfo, ProviderError>;

    /// Revoke the current token where the backend supports it.
    async fn disable_token(&self) -> Result<(), ProviderError>;
}

/// Device-code authorization, modeled as explicit request/response pairs.
#[async_trait]
pub trait DeviceAuthorization: Send + Sync {
    async fn request_device_code(&self) -> Result<DeviceCode, ProviderError>;

    /// `None` while the user has not approved the device yet.
    async fn exchange_device_code(
        &self,
        device_code: &str,
    ) -> Result<Option<TokenGrant>, ProviderError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError>;
}
