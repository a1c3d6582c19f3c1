//! Environment configuration
//!
//! Settings come from process environment variables, with a `.env` file in
//! the working directory loaded first when present.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use oauth2::{ClientId, ClientSecret, RefreshToken, TokenUrl};
use thiserror::Error;
use url::Url;

use crate::auth::RetryPolicy;

const DEFAULT_PARTITION: &str = "osdu";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration problems. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("could not determine a cache directory for the token file")]
    NoCacheDir,
}

/// OAuth2 client credentials for the platform's token endpoint.
///
/// `ClientSecret` redacts itself in `Debug`, so this is safe to log.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub token_endpoint: TokenUrl,
    pub partition_id: String,
}

/// Where the token manager mirrors the current token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCacheLocation {
    /// Keep tokens in process memory only.
    Memory,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: Url,
    pub credentials: Credentials,
    /// Seed refresh token, tried before client credentials.
    pub refresh_token: Option<RefreshToken>,
    pub scopes: Vec<String>,
    pub verify_ssl: bool,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub token_cache: TokenCacheLocation,
    /// Replacement for the built-in domain catalog.
    pub catalog_path: Option<PathBuf>,
    pub listen: SocketAddr,
}

impl Settings {
    /// Load settings from `.env` and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let required = [
            "OSDU_BASE_URL",
            "OSDU_TOKEN_ENDPOINT",
            "OSDU_CLIENT_ID",
            "OSDU_CLIENT_SECRET",
        ];
        let missing: Vec<&'static str> = required
            .into_iter()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let base_url = parse_http_url("OSDU_BASE_URL", &get("OSDU_BASE_URL").unwrap_or_default())?;
        let token_endpoint = parse_http_url(
            "OSDU_TOKEN_ENDPOINT",
            &get("OSDU_TOKEN_ENDPOINT").unwrap_or_default(),
        )?;

        let credentials = Credentials {
            client_id: ClientId::new(get("OSDU_CLIENT_ID").unwrap_or_default()),
            client_secret: ClientSecret::new(get("OSDU_CLIENT_SECRET").unwrap_or_default()),
            token_endpoint: TokenUrl::from_url(token_endpoint),
            partition_id: get("OSDU_PARTITION_ID").unwrap_or_else(|| DEFAULT_PARTITION.to_string()),
        };

        let scopes = get("OSDU_SCOPE")
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        let verify_ssl = match get("OSDU_VERIFY_SSL") {
            Some(v) => parse_bool("OSDU_VERIFY_SSL", &v)?,
            None => true,
        };

        let http_timeout = Duration::from_secs(parse_number(
            "OSDU_HTTP_TIMEOUT_SECS",
            get("OSDU_HTTP_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
        )?);

        let defaults = RetryPolicy::default();
        let max_attempts = parse_number(
            "OSDU_RETRY_ATTEMPTS",
            get("OSDU_RETRY_ATTEMPTS"),
            u64::from(defaults.max_attempts),
        )?;
        let max_attempts = u32::try_from(max_attempts)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or(ConfigError::Invalid {
                key: "OSDU_RETRY_ATTEMPTS",
                reason: "must be between 1 and 4294967295".to_string(),
            })?;
        let base_delay_ms = parse_number(
            "OSDU_RETRY_BASE_DELAY_MS",
            get("OSDU_RETRY_BASE_DELAY_MS"),
            defaults.base_delay.as_millis() as u64,
        )?;
        let max_delay_ms = parse_number(
            "OSDU_RETRY_MAX_DELAY_MS",
            get("OSDU_RETRY_MAX_DELAY_MS"),
            defaults.max_delay.as_millis() as u64,
        )?;
        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        };

        let token_cache = match get("OSDU_TOKEN_CACHE") {
            Some(v) if v.eq_ignore_ascii_case("memory") => TokenCacheLocation::Memory,
            Some(v) => TokenCacheLocation::File(PathBuf::from(v)),
            None => TokenCacheLocation::File(default_cache_path()?),
        };

        let host = get("OSDU_VIEWER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_number("OSDU_VIEWER_PORT", get("OSDU_VIEWER_PORT"), u64::from(DEFAULT_PORT))?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            key: "OSDU_VIEWER_PORT",
            reason: format!("{} is not a valid port", port),
        })?;
        let listen = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| ConfigError::Invalid {
                key: "OSDU_VIEWER_HOST",
                reason: format!("{}", e),
            })?;

        Ok(Self {
            base_url,
            credentials,
            refresh_token: get("OSDU_REFRESH_TOKEN").map(RefreshToken::new),
            scopes,
            verify_ssl,
            http_timeout,
            retry,
            token_cache,
            catalog_path: get("OSDU_CATALOG").map(PathBuf::from),
            listen,
        })
    }

    /// HTTP client shared by the token endpoint and the OSDU API.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        if !self.verify_ssl {
            tracing::warn!("TLS certificate verification is disabled (OSDU_VERIFY_SSL=false)");
        }
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .danger_accept_invalid_certs(!self.verify_ssl)
            .build()
    }
}

/// Default token cache file under the user's cache directory.
fn default_cache_path() -> Result<PathBuf, ConfigError> {
    let proj_dirs =
        ProjectDirs::from("com", "osdu-viewer", "osdu-viewer").ok_or(ConfigError::NoCacheDir)?;
    Ok(proj_dirs.cache_dir().join("token.toml"))
}

fn parse_http_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("'{}' is not a URL: {}", value, e),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got '{}'", value),
        }),
    }
}

fn parse_number(key: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("expected a number, got '{}'", v),
        }),
        None => Ok(default),
    }
}
