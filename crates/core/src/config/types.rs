use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Metrics and health endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    9464
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("streamvault.db")
}

/// Ingestion pipelines
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Buffered items per pipeline before `enqueue` reports the queue as full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// JSONL file of scraped items. Reads stdin when unset.
    #[serde(default)]
    pub input: Option<PathBuf>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub torrent_fetch: FetchCacheConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            input: None,
            user_agent: default_user_agent(),
            torrent_fetch: FetchCacheConfig::default(),
        }
    }
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_user_agent() -> String {
    concat!("streamvault/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Cache and rate limit around torrent file downloads
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchCacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_rate_limit_calls")]
    pub rate_limit_calls: u32,
    #[serde(default = "default_rate_limit_period_ms")]
    pub rate_limit_period_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            rate_limit_calls: default_rate_limit_calls(),
            rate_limit_period_ms: default_rate_limit_period_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    900
}

fn default_rate_limit_calls() -> u32 {
    5
}

fn default_rate_limit_period_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

/// Debrid provider credentials. Each backend is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub debrid_link: Option<ProviderConfig>,
    #[serde(default)]
    pub alldebrid: Option<ProviderConfig>,
    #[serde(default)]
    pub stremthru: Option<ProviderConfig>,
}

impl ProvidersConfig {
    /// Configured backends with their kind.
    pub fn configured(&self) -> Vec<(ProviderKind, &ProviderConfig)> {
        let mut out = Vec::new();
        if let Some(c) = &self.debrid_link {
            out.push((ProviderKind::DebridLink, c));
        }
        if let Some(c) = &self.alldebrid {
            out.push((ProviderKind::AllDebrid, c));
        }
        if let Some(c) = &self.stremthru {
            out.push((ProviderKind::StremThru, c));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    DebridLink,
    AllDebrid,
    StremThru,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::DebridLink => "debrid_link",
            ProviderKind::AllDebrid => "alldebrid",
            ProviderKind::StremThru => "stremthru",
        }
    }
}

/// Credentials and endpoint for one debrid backend
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Pre-shared API token. Bypasses any token exchange.
    #[serde(default)]
    pub token: Option<String>,
    /// Refresh token obtained from a device-code authorization
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// OAuth client id for device-code flows
    #[serde(default)]
    pub client_id: Option<String>,
    /// Override the backend's base URL (self-hosted StremThru, tests)
    #[serde(default)]
    pub base_url: Option<String>,
    /// Forwarded to backends that restrict by client address
    #[serde(default)]
    pub user_ip: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            refresh_token: None,
            client_id: None,
            base_url: None,
            user_ip: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub providers: Vec<SanitizedProviderConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub kind: &'static str,
    pub token_configured: bool,
    pub refresh_token_configured: bool,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            ingest: config.ingest.clone(),
            providers: config
                .providers
                .configured()
                .into_iter()
                .map(|(kind, p)| SanitizedProviderConfig {
                    kind: kind.as_str(),
                    token_configured: p.token.is_some(),
                    refresh_token_configured: p.refresh_token.is_some(),
                    base_url: p.base_url.clone(),
                    timeout_secs: p.timeout_secs,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9100

[database]
path = "/data/vault.sqlite"

[ingest]
queue_capacity = 128
input = "/data/items.jsonl"

[providers.debrid_link]
token = "dl-secret"

[providers.stremthru]
token = "realdebrid:abc"
base_url = "http://localhost:8080"
timeout_secs = 5
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.database.path.to_str().unwrap(), "/data/vault.sqlite");
        assert_eq!(config.ingest.queue_capacity, 128);
        assert_eq!(
            config.ingest.input.as_deref().and_then(|p| p.to_str()),
            Some("/data/items.jsonl")
        );

        let dl = config.providers.debrid_link.as_ref().unwrap();
        assert_eq!(dl.token.as_deref(), Some("dl-secret"));
        assert_eq!(dl.timeout_secs, 30);

        let st = config.providers.stremthru.as_ref().unwrap();
        assert_eq!(st.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(st.timeout_secs, 5);
        assert!(config.providers.alldebrid.is_none());
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "streamvault.db");
        assert!(config.ingest.input.is_none());
        assert!(config.ingest.user_agent.starts_with("streamvault/"));
        assert_eq!(config.ingest.torrent_fetch.ttl_secs, 900);
    }

    #[test]
    fn test_sanitized_config_hides_tokens() {
        let mut config = Config::default();
        config.providers.alldebrid = Some(ProviderConfig::with_token("very-secret"));

        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.providers.len(), 1);
        assert_eq!(sanitized.providers[0].kind, "alldebrid");
        assert!(sanitized.providers[0].token_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("very-secret"));
    }

    #[test]
    fn test_configured_providers_order() {
        let mut providers = ProvidersConfig::default();
        providers.stremthru = Some(ProviderConfig::with_token("a:b"));
        providers.debrid_link = Some(ProviderConfig::with_token("c"));

        let kinds: Vec<_> = providers.configured().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![ProviderKind::DebridLink, ProviderKind::StremThru]);
    }
}
