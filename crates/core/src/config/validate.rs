use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Queue capacity and rate limits are non-zero
/// - Configured providers carry a non-empty credential and a non-zero timeout
/// - StremThru has a base URL
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.ingest.queue_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "ingest.queue_capacity must be greater than 0".to_string(),
        ));
    }

    let fetch = &config.ingest.torrent_fetch;
    if fetch.rate_limit_calls == 0 || fetch.rate_limit_period_ms == 0 {
        return Err(ConfigError::ValidationError(
            "ingest.torrent_fetch rate limit must allow at least one call per non-zero period"
                .to_string(),
        ));
    }
    if fetch.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "ingest.torrent_fetch.timeout_secs cannot be 0".to_string(),
        ));
    }

    for (kind, provider) in config.providers.configured() {
        let has_token = provider.token.as_deref().is_some_and(|t| !t.trim().is_empty());
        let has_refresh = provider
            .refresh_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if !has_token && !has_refresh {
            return Err(ConfigError::ValidationError(format!(
                "providers.{} requires token or refresh_token",
                kind.as_str()
            )));
        }
        if provider.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "providers.{}.timeout_secs cannot be 0",
                kind.as_str()
            )));
        }
    }

    if let Some(stremthru) = &config.providers.stremthru {
        if stremthru.base_url.as_deref().is_none_or(|u| u.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "providers.stremthru.base_url is required".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_capacity_fails() {
        let mut config = Config::default();
        config.ingest.queue_capacity = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_rate_limit_fails() {
        let mut config = Config::default();
        config.ingest.torrent_fetch.rate_limit_calls = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_provider_without_credentials_fails() {
        let mut config = Config::default();
        let mut provider = ProviderConfig::with_token("   ");
        provider.token = Some("   ".to_string());
        config.providers.alldebrid = Some(provider);

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("providers.alldebrid"));
    }

    #[test]
    fn test_validate_provider_with_refresh_token_only() {
        let mut config = Config::default();
        let mut provider = ProviderConfig::with_token("x");
        provider.token = None;
        provider.refresh_token = Some("refresh".to_string());
        config.providers.debrid_link = Some(provider);

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_stremthru_requires_base_url() {
        let mut config = Config::default();
        config.providers.stremthru = Some(ProviderConfig::with_token("realdebrid:abc"));
        assert!(validate_config(&config).is_err());

        config.providers.stremthru =
            Some(ProviderConfig::with_token("realdebrid:abc").with_base_url("http://localhost:8080"));
        assert!(validate_config(&config).is_ok());
    }
}
