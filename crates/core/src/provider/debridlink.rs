//! Debrid-Link backend.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::multipart;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::http::{
    string_field, u64_field, MappedError, RequestExecutor, API_ERROR, INVALID_TOKEN, NEED_PREMIUM,
    SERVICE_DOWN, TOO_MANY_REQUESTS, TRANSFER_ERROR,
};
use super::{
    AddedTorrent, Availability, Credential, DeviceAuthorization, DeviceCode, ErrorCategory,
    ProviderClient, ProviderError, RemoteFile, RemoteTorrent, TokenGrant, TransferStatus, UserInfo,
};

pub const DEBRID_LINK_URL: &str = "https://debrid-link.com/api";
/// Public client id for device-code authorization.
pub const DEBRID_LINK_CLIENT_ID: &str = "RyrV22FOg30DsxjYPziRKA";
const NAME: &str = "debrid_link";
const SCOPE: &str = "get.post.downloader get.post.seedbox get.account get.files get.post.stream";
const DEVICE_GRANT: &str = "http://oauth.net/grant_type/device/1.0";

/// Map a Debrid-Link `error` code.
pub fn map_error_code(code: &str) -> MappedError {
    match code {
        "badToken" | "expired_token" => {
            MappedError::new(ErrorCategory::AuthInvalid, "Invalid token", INVALID_TOKEN)
        }
        "freeServerOverload" => MappedError::new(
            ErrorCategory::ServiceUnavailable,
            "Debrid-Link free servers are overloaded",
            NEED_PREMIUM,
        ),
        "server_error" | "notDebrid" => MappedError::new(
            ErrorCategory::ServiceUnavailable,
            "Debrid-Link server error",
            SERVICE_DOWN,
        ),
        "maxLink" | "maxLinkHost" | "maxData" | "maxDataHost" | "maxTorrent" => MappedError::new(
            ErrorCategory::QuotaExceeded,
            "Debrid-Link daily limit reached",
            "daily_download_limit.mp4",
        ),
        "floodDetected" => MappedError::new(
            ErrorCategory::RateLimited,
            "Debrid-Link flood detected",
            TOO_MANY_REQUESTS,
        ),
        "disabledServerHost" => MappedError::new(
            ErrorCategory::Unknown,
            "Debrid-Link does not allow servers or VPNs on this host",
            "ip_not_allowed.mp4",
        ),
        other => MappedError::new(
            ErrorCategory::Unknown,
            format!("Debrid-Link error: {}", other),
            API_ERROR,
        ),
    }
}

fn map_error(_status: u16, body: &Value) -> Option<MappedError> {
    body.get("error")
        .and_then(Value::as_str)
        .map(map_error_code)
}

/// Debrid-Link client.
///
/// A refresh token is exchanged for an access token by `initialize_auth`;
/// a private token is used as is.
pub struct DebridLinkClient {
    exec: RequestExecutor,
    api_url: String,
    oauth_url: String,
    client_id: String,
    credential: Credential,
    user_ip: Option<String>,
    access_token: RwLock<Option<String>>,
}

impl DebridLinkClient {
    pub fn new(
        credential: Credential,
        base_url: Option<&str>,
        client_id: Option<&str>,
        user_ip: Option<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, ProviderError> {
        let base = base_url.unwrap_or(DEBRID_LINK_URL).trim_end_matches('/');
        let access_token = match &credential {
            Credential::PrivateToken(token) => Some(token.clone()),
            Credential::RefreshToken(_) => None,
        };
        Ok(Self {
            exec: RequestExecutor::new(NAME, timeout, user_agent)?,
            api_url: format!("{}/v2", base),
            oauth_url: format!("{}/oauth", base),
            client_id: client_id.unwrap_or(DEBRID_LINK_CLIENT_ID).to_string(),
            credential,
            user_ip,
            access_token: RwLock::new(access_token),
        })
    }

    async fn bearer(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.access_token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.initialize_auth().await?;
        self.access_token.read().await.clone().ok_or_else(|| {
            self.exec.error(MappedError::new(
                ErrorCategory::AuthInvalid,
                "No access token available",
                INVALID_TOKEN,
            ))
        })
    }

    async fn api(
        &self,
        method: reqwest::Method,
        endpoint: &str,
    ) -> Result<reqwest::RequestBuilder, ProviderError> {
        let mut request = self
            .exec
            .client()
            .request(method, format!("{}{}", self.api_url, endpoint))
            .bearer_auth(self.bearer().await?);
        if let Some(ip) = &self.user_ip {
            request = request.query(&[("ip", ip)]);
        }
        Ok(request)
    }

    /// The `value` payload of a successful response.
    async fn call(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let body = self.exec.execute(request, map_error).await?;
        Ok(body.get("value").cloned().unwrap_or(Value::Null))
    }

    fn added(&self, value: &Value) -> Result<AddedTorrent, ProviderError> {
        let id = string_field(value, "id").ok_or_else(|| {
            self.exec.error(MappedError::new(
                ErrorCategory::Unknown,
                "Failed to add torrent to Debrid-Link: no id returned",
                TRANSFER_ERROR,
            ))
        })?;
        Ok(AddedTorrent {
            id,
            info_hash: string_field(value, "hashString")
                .unwrap_or_default()
                .to_lowercase(),
            name: string_field(value, "name"),
            ready: download_percent(value) >= 100.0,
        })
    }
}

fn download_percent(value: &Value) -> f64 {
    value
        .get("downloadPercent")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

fn parse_torrent(value: &Value) -> RemoteTorrent {
    let percent = download_percent(value);
    let status = if value.get("errorCode").and_then(Value::as_u64).unwrap_or(0) != 0 {
        TransferStatus::Error
    } else if percent >= 100.0 {
        TransferStatus::Downloaded
    } else if percent > 0.0 {
        TransferStatus::Downloading
    } else {
        TransferStatus::Queued
    };
    let files = value
        .get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .map(|f| RemoteFile {
                    name: string_field(f, "name").unwrap_or_default(),
                    size: u64_field(f, "size"),
                    link: string_field(f, "downloadUrl"),
                })
                .collect()
        })
        .unwrap_or_default();

    RemoteTorrent {
        id: string_field(value, "id").unwrap_or_default(),
        info_hash: string_field(value, "hashString")
            .unwrap_or_default()
            .to_lowercase(),
        name: string_field(value, "name").unwrap_or_default(),
        size: u64_field(value, "totalSize"),
        status,
        progress: (percent / 100.0).clamp(0.0, 1.0),
        files,
    }
}

fn parse_grant(body: &Value) -> Option<TokenGrant> {
    Some(TokenGrant {
        access_token: string_field(body, "access_token")?,
        refresh_token: string_field(body, "refresh_token"),
        expires_in: body.get("expires_in").and_then(Value::as_u64),
    })
}

#[async_trait]
impl ProviderClient for DebridLinkClient {
    fn name(&self) -> &str {
        NAME
    }

    async fn initialize_auth(&self) -> Result<(), ProviderError> {
        let Credential::RefreshToken(refresh) = &self.credential else {
            return Ok(());
        };
        let grant = self.refresh_token(refresh).await?;
        *self.access_token.write().await = Some(grant.access_token);
        info!(provider = NAME, "Access token refreshed");
        Ok(())
    }

    async fn add_magnet(&self, magnet_link: &str) -> Result<AddedTorrent, ProviderError> {
        let request = self
            .api(reqwest::Method::POST, "/seedbox/add")
            .await?
            .json(&json!({"url": magnet_link, "async": true}));
        let value = self.call(request).await?;
        self.added(&value)
    }

    async fn add_torrent_file(
        &self,
        torrent: &[u8],
        name: &str,
    ) -> Result<AddedTorrent, ProviderError> {
        let part = multipart::Part::bytes(torrent.to_vec())
            .file_name(name.to_string())
            .mime_str("application/x-bittorrent")
            .map_err(|e| {
                self.exec.error(MappedError::new(
                    ErrorCategory::Unknown,
                    format!("Invalid upload: {}", e),
                    TRANSFER_ERROR,
                ))
            })?;
        let form = multipart::Form::new().part("file", part);
        let request = self
            .api(reqwest::Method::POST, "/seedbox/add")
            .await?
            .multipart(form);
        let value = self.call(request).await?;
        self.added(&value)
    }

    async fn list_torrents(&self) -> Result<Vec<RemoteTorrent>, ProviderError> {
        let value = self
            .call(self.api(reqwest::Method::GET, "/seedbox/list").await?)
            .await?;
        Ok(value
            .as_array()
            .map(|items| items.iter().map(parse_torrent).collect())
            .unwrap_or_default())
    }

    async fn get_torrent_info(&self, id: &str) -> Result<RemoteTorrent, ProviderError> {
        let request = self
            .api(reqwest::Method::GET, "/seedbox/list")
            .await?
            .query(&[("ids", id)]);
        let value = self.call(request).await?;
        value
            .as_array()
            .and_then(|items| items.first())
            .map(parse_torrent)
            .ok_or_else(|| {
                self.exec.error(MappedError::new(
                    ErrorCategory::Unknown,
                    format!("Torrent {} not found on Debrid-Link", id),
                    TRANSFER_ERROR,
                ))
            })
    }

    async fn get_availability(
        &self,
        info_hashes: &[String],
    ) -> Result<Vec<Availability>, ProviderError> {
        let torrents = self.list_torrents().await?;
        Ok(info_hashes
            .iter()
            .map(|hash| Availability {
                info_hash: hash.clone(),
                cached: torrents.iter().any(|t| {
                    t.info_hash.eq_ignore_ascii_case(hash) && t.status == TransferStatus::Downloaded
                }),
            })
            .collect())
    }

    async fn delete_torrent(&self, id: &str) -> Result<(), ProviderError> {
        let endpoint = format!("/seedbox/{}/delete", urlencoding::encode(id));
        self.call(self.api(reqwest::Method::DELETE, &endpoint).await?)
            .await?;
        Ok(())
    }

    async fn get_user_info(&self) -> Result<UserInfo, ProviderError> {
        let value = self
            .call(self.api(reqwest::Method::GET, "/account/infos").await?)
            .await?;
        let premium_left = value.get("premiumLeft").and_then(Value::as_i64).unwrap_or(0);
        Ok(UserInfo {
            username: string_field(&value, "pseudo"),
            email: string_field(&value, "email"),
            premium: value.get("accountType").and_then(Value::as_u64) == Some(1),
            premium_until: (premium_left > 0)
                .then(|| Utc::now() + ChronoDuration::seconds(premium_left)),
        })
    }

    async fn disable_token(&self) -> Result<(), ProviderError> {
        let request = self
            .exec
            .client()
            .get(format!("{}/revoke", self.oauth_url))
            .bearer_auth(self.bearer().await?);
        // Revocation is best effort: an already revoked token answers with an error.
        let (status, _) = self.exec.send(request).await?;
        debug!(provider = NAME, status, "Token revoked");
        *self.access_token.write().await = None;
        Ok(())
    }
}

#[async_trait]
impl DeviceAuthorization for DebridLinkClient {
    async fn request_device_code(&self) -> Result<DeviceCode, ProviderError> {
        let request = self
            .exec
            .client()
            .post(format!("{}/device/code", self.oauth_url))
            .form(&[("client_id", self.client_id.as_str()), ("scope", SCOPE)]);
        let body = self.exec.execute(request, map_error).await?;

        let field = |key: &str| {
            string_field(&body, key).ok_or_else(|| {
                self.exec.error(MappedError::new(
                    ErrorCategory::Unknown,
                    format!("Device code response is missing '{}'", key),
                    API_ERROR,
                ))
            })
        };
        Ok(DeviceCode {
            device_code: field("device_code")?,
            user_code: field("user_code")?,
            verification_url: field("verification_url")?,
            expires_in: u64_field(&body, "expires_in"),
            interval: body.get("interval").and_then(Value::as_u64).unwrap_or(5),
        })
    }

    async fn exchange_device_code(
        &self,
        device_code: &str,
    ) -> Result<Option<TokenGrant>, ProviderError> {
        let request = self
            .exec
            .client()
            .post(format!("{}/token", self.oauth_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("code", device_code),
                ("grant_type", DEVICE_GRANT),
            ]);
        let (status, body) = self.exec.send(request).await?;

        if body.get("error").and_then(Value::as_str) == Some("authorization_pending") {
            return Ok(None);
        }
        if let Some(mapped) = map_error(status, &body).or_else(|| super::http::status_fallback(status)) {
            return Err(self.exec.error(mapped));
        }
        parse_grant(&body).map(Some).ok_or_else(|| {
            self.exec.error(MappedError::new(
                ErrorCategory::Unknown,
                "Device code exchange returned no access token",
                API_ERROR,
            ))
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        let request = self
            .exec
            .client()
            .post(format!("{}/token", self.oauth_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ]);
        let body = self.exec.execute(request, map_error).await?;
        parse_grant(&body).ok_or_else(|| {
            self.exec.error(MappedError::new(
                ErrorCategory::AuthInvalid,
                "Token refresh returned no access token",
                INVALID_TOKEN,
            ))
        })
    }
}
