//! OSDU client errors

use thiserror::Error;

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Still 401 after invalidating and re-acquiring the token.
    #[error("OSDU rejected the credentials for {url} after re-authenticating")]
    UpstreamRejected { url: String },

    #[error("HTTP {status} for {url}: {body}")]
    Upstream { status: u16, url: String, body: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot build request URL: {0}")]
    InvalidUrl(String),

    #[error("domain '{0}' not found")]
    UnknownDomain(String),

    #[error("entity '{entity}' not found in domain '{domain}'")]
    UnknownEntity { domain: String, entity: String },

    #[error("record '{0}' not found")]
    RecordNotFound(String),
}

impl ApiError {
    /// Failures that no alternative endpoint or kind can fix.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Auth(_) | ApiError::UpstreamRejected { .. })
    }
}
