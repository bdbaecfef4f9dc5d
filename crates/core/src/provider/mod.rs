//! Debrid provider abstraction.
//!
//! This module provides a `ProviderClient` trait for debrid backends
//! (Debrid-Link, AllDebrid, StremThru). Every backend maps its own error
//! payloads into the shared `ErrorCategory` set.

mod alldebrid;
mod debridlink;
mod http;
mod retry;
mod stremthru;
mod types;

pub use alldebrid::{AllDebridClient, ALLDEBRID_URL};
pub use debridlink::{DebridLinkClient, DEBRID_LINK_CLIENT_ID, DEBRID_LINK_URL};
pub use http::{status_fallback, MappedError, RequestExecutor};
pub use retry::retry_with_backoff;
pub use stremthru::StremThruClient;
pub use types::*;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProviderConfig, ProviderKind};

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Create a provider client from its configuration.
pub fn create_provider(
    kind: ProviderKind,
    config: &ProviderConfig,
    user_agent: &str,
) -> Result<Arc<dyn ProviderClient>, ProviderError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let base_url = non_empty(config.base_url.as_deref());
    let token = non_empty(config.token.as_deref());
    let missing_token = || {
        ProviderError::new(
            kind.as_str(),
            ErrorCategory::AuthInvalid,
            "No token configured",
            http::INVALID_TOKEN,
        )
    };

    let client: Arc<dyn ProviderClient> = match kind {
        ProviderKind::DebridLink => {
            let credential = match (token, non_empty(config.refresh_token.as_deref())) {
                (Some(token), _) => Credential::PrivateToken(token.to_string()),
                (None, Some(refresh)) => Credential::RefreshToken(refresh.to_string()),
                (None, None) => return Err(missing_token()),
            };
            Arc::new(DebridLinkClient::new(
                credential,
                base_url,
                non_empty(config.client_id.as_deref()),
                config.user_ip.clone(),
                timeout,
                user_agent,
            )?)
        }
        ProviderKind::AllDebrid => Arc::new(AllDebridClient::new(
            token.ok_or_else(missing_token)?,
            base_url,
            config.user_ip.clone(),
            timeout,
            user_agent,
        )?),
        ProviderKind::StremThru => {
            let base_url = base_url.ok_or_else(|| {
                ProviderError::new(
                    kind.as_str(),
                    ErrorCategory::Unknown,
                    "No base URL configured",
                    http::API_ERROR,
                )
            })?;
            Arc::new(StremThruClient::new(
                base_url,
                token.ok_or_else(missing_token)?,
                timeout,
                user_agent,
            )?)
        }
    };
    Ok(client)
}
