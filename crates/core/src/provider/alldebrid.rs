//! AllDebrid backend.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{multipart, Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

use super::http::{
    string_field, u64_field, MappedError, RequestExecutor, INVALID_TOKEN, NEED_PREMIUM,
    TRANSFER_ERROR,
};
use super::{
    AddedTorrent, Availability, ErrorCategory, ProviderClient, ProviderError, RemoteFile,
    RemoteTorrent, TransferStatus, UserInfo,
};

pub const ALLDEBRID_URL: &str = "https://api.alldebrid.com/v4.1";
/// Agent name sent with every request.
pub const AGENT: &str = "streamvault";
const NAME: &str = "alldebrid";
/// `statusCode` of a finished magnet.
const STATUS_READY: u64 = 4;

/// Map an AllDebrid `error.code`.
pub fn map_error_code(code: &str) -> MappedError {
    match code {
        "AUTH_BAD_APIKEY" | "AUTH_MISSING_APIKEY" => MappedError::new(
            ErrorCategory::AuthInvalid,
            "Invalid AllDebrid API key",
            INVALID_TOKEN,
        ),
        "AUTH_BLOCKED" => MappedError::new(
            ErrorCategory::AuthInvalid,
            "API got blocked on AllDebrid",
            "alldebrid_api_blocked.mp4",
        ),
        "NO_SERVER" => MappedError::new(
            ErrorCategory::ServiceUnavailable,
            "AllDebrid does not allow servers to use this endpoint",
            TRANSFER_ERROR,
        ),
        "MAGNET_MUST_BE_PREMIUM" => MappedError::new(
            ErrorCategory::QuotaExceeded,
            "Torrent must be premium on AllDebrid",
            NEED_PREMIUM,
        ),
        "MAGNET_TOO_MANY_ACTIVE" | "MAGNET_TOO_MANY" => MappedError::new(
            ErrorCategory::QuotaExceeded,
            "Too many active torrents on AllDebrid",
            "torrent_limit.mp4",
        ),
        other => MappedError::new(
            ErrorCategory::Unknown,
            format!("AllDebrid error: {}", other),
            TRANSFER_ERROR,
        ),
    }
}

fn error_code(value: &Value) -> Option<&str> {
    value.get("error")?.get("code")?.as_str()
}

fn map_error(_status: u16, body: &Value) -> Option<MappedError> {
    if body.get("status").and_then(Value::as_str) == Some("success") {
        return None;
    }
    // Non-JSON bodies carry no status; leave them to the HTTP status mapping.
    if !body.is_object() {
        return None;
    }
    Some(map_error_code(error_code(body).unwrap_or("UNKNOWN")))
}

/// AllDebrid client. Authenticates with a pre-shared API key.
pub struct AllDebridClient {
    exec: RequestExecutor,
    base_url: String,
    token: String,
    user_ip: Option<String>,
}

impl AllDebridClient {
    pub fn new(
        token: impl Into<String>,
        base_url: Option<&str>,
        user_ip: Option<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            exec: RequestExecutor::new(NAME, timeout, user_agent)?,
            base_url: base_url
                .unwrap_or(ALLDEBRID_URL)
                .trim_end_matches('/')
                .to_string(),
            token: token.into(),
            user_ip,
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let mut request = self
            .exec
            .client()
            .request(method, format!("{}{}", self.base_url, endpoint))
            .bearer_auth(&self.token)
            .query(&[("agent", AGENT)]);
        if let Some(ip) = &self.user_ip {
            request = request.query(&[("ip", ip)]);
        }
        request
    }

    /// The `data` payload of a successful response.
    async fn call(&self, request: RequestBuilder) -> Result<Value, ProviderError> {
        let body = self.exec.execute(request, map_error).await?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    /// First entry of an upload result, which may carry its own error.
    fn first_upload(&self, data: &Value, key: &str) -> Result<AddedTorrent, ProviderError> {
        let entry = data
            .get(key)
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .ok_or_else(|| {
                self.exec.error(MappedError::new(
                    ErrorCategory::Unknown,
                    "AllDebrid returned no upload result",
                    TRANSFER_ERROR,
                ))
            })?;
        if let Some(code) = error_code(entry) {
            return Err(self.exec.error(map_error_code(code)));
        }
        Ok(AddedTorrent {
            id: string_field(entry, "id").unwrap_or_default(),
            info_hash: string_field(entry, "hash").unwrap_or_default().to_lowercase(),
            name: string_field(entry, "name"),
            ready: entry.get("ready").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

fn parse_magnet(value: &Value) -> RemoteTorrent {
    let size = u64_field(value, "size");
    let downloaded = u64_field(value, "downloaded");
    let status = match value.get("statusCode").and_then(Value::as_u64) {
        Some(STATUS_READY) => TransferStatus::Downloaded,
        Some(0) => TransferStatus::Queued,
        Some(1..=3) => TransferStatus::Downloading,
        Some(_) => TransferStatus::Error,
        None => TransferStatus::Unknown,
    };
    let progress = if status == TransferStatus::Downloaded {
        1.0
    } else if size > 0 {
        (downloaded as f64 / size as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let files = value
        .get("links")
        .and_then(Value::as_array)
        .map(|links| {
            links
                .iter()
                .map(|l| RemoteFile {
                    name: string_field(l, "filename").unwrap_or_default(),
                    size: u64_field(l, "size"),
                    link: string_field(l, "link"),
                })
                .collect()
        })
        .unwrap_or_default();

    RemoteTorrent {
        id: string_field(value, "id").unwrap_or_default(),
        info_hash: string_field(value, "hash").unwrap_or_default().to_lowercase(),
        name: string_field(value, "filename").unwrap_or_default(),
        size,
        status,
        progress,
        files,
    }
}

/// `data.magnets` is a list when listing and an object for a single id.
fn magnets(data: &Value) -> Vec<RemoteTorrent> {
    match data.get("magnets") {
        Some(Value::Array(items)) => items.iter().map(parse_magnet).collect(),
        Some(item @ Value::Object(_)) => vec![parse_magnet(item)],
        _ => Vec::new(),
    }
}

#[async_trait]
impl ProviderClient for AllDebridClient {
    fn name(&self) -> &str {
        NAME
    }

    async fn initialize_auth(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn add_magnet(&self, magnet_link: &str) -> Result<AddedTorrent, ProviderError> {
        let request = self
            .request(Method::POST, "/magnet/upload")
            .form(&[("magnets[]", magnet_link)]);
        let data = self.call(request).await?;
        self.first_upload(&data, "magnets")
    }

    async fn add_torrent_file(
        &self,
        torrent: &[u8],
        name: &str,
    ) -> Result<AddedTorrent, ProviderError> {
        let file_name = if name.ends_with(".torrent") {
            name.to_string()
        } else {
            format!("{}.torrent", name)
        };
        let form = multipart::Form::new()
            .part("files[]", multipart::Part::bytes(torrent.to_vec()).file_name(file_name));
        let request = self
            .request(Method::POST, "/magnet/upload/file")
            .multipart(form);
        let data = self.call(request).await?;
        self.first_upload(&data, "files")
    }

    async fn list_torrents(&self) -> Result<Vec<RemoteTorrent>, ProviderError> {
        let data = self.call(self.request(Method::GET, "/magnet/status")).await?;
        Ok(magnets(&data))
    }

    async fn get_torrent_info(&self, id: &str) -> Result<RemoteTorrent, ProviderError> {
        let request = self
            .request(Method::GET, "/magnet/status")
            .query(&[("id", id)]);
        let data = self.call(request).await?;
        magnets(&data).into_iter().next().ok_or_else(|| {
            self.exec.error(MappedError::new(
                ErrorCategory::Unknown,
                format!("Magnet {} not found on AllDebrid", id),
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
        let request = self
            .request(Method::GET, "/magnet/delete")
            .query(&[("ids[]", id)]);
        self.call(request).await?;
        Ok(())
    }

    async fn get_user_info(&self) -> Result<UserInfo, ProviderError> {
        let data = self.call(self.request(Method::GET, "/user")).await?;
        let user = data.get("user").cloned().unwrap_or(Value::Null);
        Ok(UserInfo {
            username: string_field(&user, "username"),
            email: string_field(&user, "email"),
            premium: user.get("isPremium").and_then(Value::as_bool).unwrap_or(false),
            premium_until: user
                .get("premiumUntil")
                .and_then(Value::as_i64)
                .filter(|ts| *ts > 0)
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }

    async fn disable_token(&self) -> Result<(), ProviderError> {
        // API keys are managed from the AllDebrid dashboard.
        Ok(())
    }
}
