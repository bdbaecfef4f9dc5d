//! StremThru backend.
//!
//! StremThru proxies several debrid stores. A `store:token` credential
//! addresses a store directly; any other token authenticates against the
//! proxy itself.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;

use super::http::{
    string_field, u64_field, MappedError, RequestExecutor, API_ERROR, CONTENT_INFRINGING,
    INVALID_TOKEN, NEED_PREMIUM, SERVICE_DOWN, TOO_MANY_REQUESTS, TRANSFER_ERROR,
};
use super::{
    AddedTorrent, Availability, ErrorCategory, ProviderClient, ProviderError, RemoteFile,
    RemoteTorrent, TransferStatus, UserInfo,
};
use crate::metadata::{decode_torrent, MagnetLink};

const NAME: &str = "stremthru";

/// Map a StremThru `error.code`.
pub fn map_error_code(code: &str) -> MappedError {
    match code {
        "UNAUTHORIZED" | "FORBIDDEN" => MappedError::new(
            ErrorCategory::AuthInvalid,
            "Invalid token or permission denied",
            INVALID_TOKEN,
        ),
        "PAYMENT_REQUIRED" => {
            MappedError::new(ErrorCategory::QuotaExceeded, "Need to upgrade plan", NEED_PREMIUM)
        }
        "STORE_LIMIT_EXCEEDED" => MappedError::new(
            ErrorCategory::QuotaExceeded,
            "Store limit exceeded",
            "exceed_remote_traffic_limit.mp4",
        ),
        "TOO_MANY_REQUESTS" => MappedError::new(
            ErrorCategory::RateLimited,
            "Too many requests",
            TOO_MANY_REQUESTS,
        ),
        "SERVICE_UNAVAILABLE" => MappedError::new(
            ErrorCategory::ServiceUnavailable,
            "Store is unavailable",
            SERVICE_DOWN,
        ),
        "UNAVAILABLE_FOR_LEGAL_REASONS" => MappedError::new(
            ErrorCategory::LegalRestriction,
            "Content marked as infringing",
            CONTENT_INFRINGING,
        ),
        other => MappedError::new(
            ErrorCategory::Unknown,
            format!("StremThru error: {}", other),
            API_ERROR,
        ),
    }
}

fn map_error(_status: u16, body: &Value) -> Option<MappedError> {
    match body.get("error")? {
        Value::Null => None,
        Value::Object(error) => {
            let code = error.get("code").and_then(Value::as_str).unwrap_or("UNKNOWN");
            let mut mapped = map_error_code(code);
            if let Some(message) = error.get("message").and_then(Value::as_str) {
                if mapped.category == ErrorCategory::Unknown {
                    mapped.message = format!("StremThru error {}: {}", code, message);
                }
            }
            Some(mapped)
        }
        other => Some(MappedError::new(
            ErrorCategory::Unknown,
            format!("StremThru error: {}", other),
            API_ERROR,
        )),
    }
}

/// How requests are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StoreAuth {
    /// Credentials of the proxy itself.
    Proxy(String),
    /// Direct store credentials.
    Store { store: String, token: String },
}

impl StoreAuth {
    fn parse(token: &str) -> Self {
        match token.split_once(':') {
            Some((store, token)) => StoreAuth::Store {
                store: store.to_string(),
                token: token.to_string(),
            },
            None => StoreAuth::Proxy(token.to_string()),
        }
    }
}

/// StremThru client.
pub struct StremThruClient {
    exec: RequestExecutor,
    base_url: String,
    auth: StoreAuth,
}

impl StremThruClient {
    pub fn new(
        base_url: &str,
        token: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            exec: RequestExecutor::new(NAME, timeout, user_agent)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: StoreAuth::parse(token),
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let request = self
            .exec
            .client()
            .request(method, format!("{}{}", self.base_url, endpoint));
        match &self.auth {
            StoreAuth::Proxy(token) => {
                request.header("Proxy-Authorization", format!("Basic {}", token))
            }
            StoreAuth::Store { store, token } => request
                .header("X-StremThru-Store-Name", store)
                .header("X-StremThru-Store-Authorization", format!("Bearer {}", token)),
        }
    }

    /// The `data` payload of a successful response.
    async fn call(&self, request: RequestBuilder) -> Result<Value, ProviderError> {
        let body = self.exec.execute(request, map_error).await?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

fn parse_status(status: &str) -> TransferStatus {
    match status {
        "cached" | "downloaded" => TransferStatus::Downloaded,
        "queued" => TransferStatus::Queued,
        "downloading" | "processing" | "uploading" => TransferStatus::Downloading,
        "failed" | "invalid" => TransferStatus::Error,
        _ => TransferStatus::Unknown,
    }
}

fn parse_magnet(value: &Value) -> RemoteTorrent {
    let status = value
        .get("status")
        .and_then(Value::as_str)
        .map(parse_status)
        .unwrap_or(TransferStatus::Unknown);
    let files: Vec<RemoteFile> = value
        .get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .map(|f| RemoteFile {
                    name: string_field(f, "name").unwrap_or_default(),
                    size: u64_field(f, "size"),
                    link: string_field(f, "link"),
                })
                .collect()
        })
        .unwrap_or_default();
    let size = match u64_field(value, "size") {
        0 => files.iter().map(|f| f.size).sum(),
        size => size,
    };

    RemoteTorrent {
        id: string_field(value, "id").unwrap_or_default(),
        info_hash: string_field(value, "hash").unwrap_or_default().to_lowercase(),
        name: string_field(value, "name").unwrap_or_default(),
        size,
        progress: if status == TransferStatus::Downloaded { 1.0 } else { 0.0 },
        status,
        files,
    }
}

#[async_trait]
impl ProviderClient for StremThruClient {
    fn name(&self) -> &str {
        NAME
    }

    async fn initialize_auth(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn add_magnet(&self, magnet_link: &str) -> Result<AddedTorrent, ProviderError> {
        let request = self
            .request(Method::POST, "/v0/store/magnets")
            .json(&json!({ "magnet": magnet_link }));
        let data = self.call(request).await?;
        let torrent = parse_magnet(&data);
        Ok(AddedTorrent {
            ready: torrent.status == TransferStatus::Downloaded,
            name: (!torrent.name.is_empty()).then_some(torrent.name),
            id: torrent.id,
            info_hash: torrent.info_hash,
        })
    }

    /// Submitted as the equivalent magnet link.
    async fn add_torrent_file(
        &self,
        torrent: &[u8],
        _name: &str,
    ) -> Result<AddedTorrent, ProviderError> {
        let info = decode_torrent(torrent).map_err(|e| {
            self.exec.error(MappedError::new(
                ErrorCategory::Unknown,
                format!("Invalid torrent file: {}", e),
                TRANSFER_ERROR,
            ))
        })?;
        let magnet = MagnetLink {
            info_hash: info.info_hash,
            trackers: info.announce_list,
            display_name: Some(info.name),
        };
        self.add_magnet(&magnet.to_uri()).await
    }

    async fn list_torrents(&self) -> Result<Vec<RemoteTorrent>, ProviderError> {
        let data = self.call(self.request(Method::GET, "/v0/store/magnets")).await?;
        Ok(data
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(parse_magnet).collect())
            .unwrap_or_default())
    }

    async fn get_torrent_info(&self, id: &str) -> Result<RemoteTorrent, ProviderError> {
        let endpoint = format!("/v0/store/magnets/{}", urlencoding::encode(id));
        let data = self.call(self.request(Method::GET, &endpoint)).await?;
        Ok(parse_magnet(&data))
    }

    async fn get_availability(
        &self,
        info_hashes: &[String],
    ) -> Result<Vec<Availability>, ProviderError> {
        if info_hashes.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .request(Method::GET, "/v0/store/magnets/check")
            .query(&[("magnet", info_hashes.join(","))]);
        let data = self.call(request).await?;
        let items = data
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(info_hashes
            .iter()
            .map(|hash| Availability {
                info_hash: hash.clone(),
                cached: items.iter().any(|item| {
                    string_field(item, "hash").is_some_and(|h| h.eq_ignore_ascii_case(hash))
                        && item.get("status").and_then(Value::as_str) == Some("cached")
                }),
            })
            .collect())
    }

    async fn delete_torrent(&self, id: &str) -> Result<(), ProviderError> {
        let endpoint = format!("/v0/store/magnets/{}", urlencoding::encode(id));
        self.call(self.request(Method::DELETE, &endpoint)).await?;
        Ok(())
    }

    async fn get_user_info(&self) -> Result<UserInfo, ProviderError> {
        let data = self.call(self.request(Method::GET, "/v0/store/user")).await?;
        Ok(UserInfo {
            username: string_field(&data, "id"),
            email: string_field(&data, "email"),
            premium: data.get("subscription_status").and_then(Value::as_str) == Some("premium"),
            premium_until: None,
        })
    }

    async fn disable_token(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::torrent_bytes;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, token: &str) -> StremThruClient {
        StremThruClient::new(&server.uri(), token, Duration::from_secs(5), "test").unwrap()
    }

    #[test]
    fn test_error_code_map() {
        let cases = [
            ("UNAUTHORIZED", ErrorCategory::AuthInvalid, "invalid_token.mp4"),
            ("FORBIDDEN", ErrorCategory::AuthInvalid, "invalid_token.mp4"),
            ("PAYMENT_REQUIRED", ErrorCategory::QuotaExceeded, "need_premium.mp4"),
            ("STORE_LIMIT_EXCEEDED", ErrorCategory::QuotaExceeded, "exceed_remote_traffic_limit.mp4"),
            ("TOO_MANY_REQUESTS", ErrorCategory::RateLimited, "too_many_requests.mp4"),
            ("SERVICE_UNAVAILABLE", ErrorCategory::ServiceUnavailable, "debrid_service_down_error.mp4"),
            ("UNAVAILABLE_FOR_LEGAL_REASONS", ErrorCategory::LegalRestriction, "content_infringing.mp4"),
            ("BAD_GATEWAY", ErrorCategory::Unknown, "api_error.mp4"),
        ];
        for (code, category, asset) in cases {
            let mapped = map_error_code(code);
            assert_eq!(mapped.category, category, "{}", code);
            assert_eq!(mapped.asset_ref, asset, "{}", code);
        }
    }

    #[test]
    fn test_token_forms() {
        assert_eq!(
            StoreAuth::parse("realdebrid:abc"),
            StoreAuth::Store {
                store: "realdebrid".to_string(),
                token: "abc".to_string()
            }
        );
        assert_eq!(StoreAuth::parse("dXNlcjpwYXNz"), StoreAuth::Proxy("dXNlcjpwYXNz".to_string()));
    }

    #[tokio::test]
    async fn test_store_headers_and_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/store/user"))
            .and(header("X-StremThru-Store-Name", "realdebrid"))
            .and(header("X-StremThru-Store-Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"type": "store_error", "code": "UNAUTHORIZED", "message": "bad token"}
            })))
            .mount(&server)
            .await;

        let err = client(&server, "realdebrid:abc").get_user_info().await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::AuthInvalid);
        assert_eq!(err.asset_ref, "invalid_token.mp4");
    }

    #[tokio::test]
    async fn test_proxy_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/store/user"))
            .and(header("Proxy-Authorization", "Basic creds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": "u1", "email": "u@example.com", "subscription_status": "premium"}
            })))
            .mount(&server)
            .await;

        let info = client(&server, "creds").get_user_info().await.unwrap();
        assert!(info.premium);
        assert_eq!(info.email.as_deref(), Some("u@example.com"));
    }

    #[tokio::test]
    async fn test_torrent_file_is_submitted_as_magnet() {
        let bytes = torrent_bytes("Movie.2020.mkv", &[], 100, &["udp://t:1"]);
        let hash = decode_torrent(&bytes).unwrap().info_hash;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v0/store/magnets"))
            .and(body_string_contains(format!("urn:btih:{}", hash)))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": {"id": "m1", "hash": hash, "name": "Movie.2020.mkv", "status": "downloaded", "files": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let added = client(&server, "realdebrid:abc")
            .add_torrent_file(&bytes, "Movie.2020.mkv")
            .await
            .unwrap();
        assert_eq!(added.id, "m1");
        assert!(added.ready);
    }

    #[tokio::test]
    async fn test_availability_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/store/magnets/check"))
            .and(query_param("magnet", "aaa,bbb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"items": [
                    {"hash": "aaa", "status": "cached", "files": []},
                    {"hash": "bbb", "status": "unknown", "files": []}
                ]}
            })))
            .mount(&server)
            .await;

        let hashes = vec!["aaa".to_string(), "bbb".to_string()];
        let availability = client(&server, "realdebrid:abc")
            .get_availability(&hashes)
            .await
            .unwrap();
        assert!(availability[0].cached);
        assert!(!availability[1].cached);
    }

    #[tokio::test]
    async fn test_legal_restriction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v0/store/magnets"))
            .respond_with(ResponseTemplate::new(451).set_body_json(json!({
                "error": {"code": "UNAVAILABLE_FOR_LEGAL_REASONS", "message": "infringing"}
            })))
            .mount(&server)
            .await;

        let err = client(&server, "realdebrid:abc")
            .add_magnet("magnet:?xt=urn:btih:abc")
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::LegalRestriction);
        assert!(!err.is_retryable());
    }
}
