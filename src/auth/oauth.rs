//! OAuth2 token endpoint: refresh-token and client-credentials grants

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::http::StatusCode;
use oauth2::{
    AccessToken, AuthType, AuthUrl, Client, HttpRequest, HttpResponse, RefreshToken,
    RequestTokenError, Scope, StandardRevocableToken, TokenResponse,
};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::config::Credentials;

/// A grant the token manager can present to the endpoint.
#[derive(Debug, Clone)]
pub enum Grant {
    RefreshToken(RefreshToken),
    ClientCredentials,
}

impl Grant {
    pub fn kind(&self) -> GrantKind {
        match self {
            Grant::RefreshToken(_) => GrantKind::RefreshToken,
            Grant::ClientCredentials => GrantKind::ClientCredentials,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    RefreshToken,
    ClientCredentials,
}

impl fmt::Display for GrantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantKind::RefreshToken => f.write_str("refresh_token"),
            GrantKind::ClientCredentials => f.write_str("client_credentials"),
        }
    }
}

/// Successful grant, before the manager applies its expiry margin.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: AccessToken,
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<RefreshToken>,
}

/// Why a single grant request failed.
#[derive(Debug, Clone, Error)]
pub enum GrantError {
    /// Timeouts, connection failures and 5xx/429 answers. Worth retrying.
    #[error("token endpoint unavailable: {0}")]
    Transient(String),

    /// The endpoint answered and refused the grant (e.g. `invalid_grant`).
    #[error("grant rejected: {0}")]
    Rejected(String),

    #[error("unexpected token response: {0}")]
    InvalidResponse(String),
}

impl GrantError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GrantError::Transient(_))
    }
}

/// Source of OAuth2 tokens.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn request(&self, grant: &Grant) -> Result<TokenGrant, GrantError>;
}

/// Token response that tolerates what real identity providers send:
/// a missing `token_type` and `expires_in` encoded as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsduTokenResponse {
    access_token: AccessToken,
    #[serde(default = "bearer", deserialize_with = "token_type_any_case")]
    token_type: BasicTokenType,
    #[serde(
        default,
        deserialize_with = "lenient_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<RefreshToken>,
}

impl TokenResponse<BasicTokenType> for OsduTokenResponse {
    fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    fn token_type(&self) -> &BasicTokenType {
        &self.token_type
    }

    fn expires_in(&self) -> Option<Duration> {
        self.expires_in.map(Duration::from_secs)
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    fn scopes(&self) -> Option<&Vec<Scope>> {
        None
    }
}

fn bearer() -> BasicTokenType {
    BasicTokenType::Bearer
}

fn token_type_any_case<'de, D>(deserializer: D) -> Result<BasicTokenType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(match raw.to_ascii_lowercase().as_str() {
        "bearer" => BasicTokenType::Bearer,
        "mac" => BasicTokenType::Mac,
        _ => BasicTokenType::Extension(raw),
    })
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Float(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(secs)) => Ok(Some(secs)),
        Some(Raw::Float(secs)) if secs >= 0.0 => Ok(Some(secs as u64)),
        Some(Raw::Float(secs)) => Err(D::Error::custom(format!("negative expires_in {}", secs))),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expires_in '{}' is not a number", text))),
    }
}

type OsduOAuthClient = Client<
    BasicErrorResponse,
    OsduTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// Transport failure below the OAuth2 layer.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Unavailable(u16),
}

/// Production endpoint: the `oauth2` crate driving our `reqwest` client,
/// credentials sent in the request body.
pub struct OAuthEndpoint {
    client: OsduOAuthClient,
    http: reqwest::Client,
    scopes: Vec<String>,
}

impl OAuthEndpoint {
    pub fn new(credentials: &Credentials, scopes: Vec<String>, http: reqwest::Client) -> Self {
        // The crate wants an authorization URL; only the token URL is ever used.
        let auth_url = AuthUrl::from_url(credentials.token_endpoint.url().clone());
        let client = OsduOAuthClient::new(
            credentials.client_id.clone(),
            Some(credentials.client_secret.clone()),
            auth_url,
            Some(credentials.token_endpoint.clone()),
        )
        .set_auth_type(AuthType::RequestBody);

        Self {
            client,
            http,
            scopes,
        }
    }

    fn scopes(&self) -> impl Iterator<Item = Scope> + '_ {
        self.scopes.iter().cloned().map(Scope::new)
    }
}

#[async_trait]
impl TokenEndpoint for OAuthEndpoint {
    async fn request(&self, grant: &Grant) -> Result<TokenGrant, GrantError> {
        tracing::debug!("Requesting {} grant", grant.kind());

        let response = match grant {
            Grant::RefreshToken(refresh_token) => {
                self.client
                    .exchange_refresh_token(refresh_token)
                    .add_scopes(self.scopes())
                    .request_async(|req| send(self.http.clone(), req))
                    .await
            }
            Grant::ClientCredentials => {
                self.client
                    .exchange_client_credentials()
                    .add_scopes(self.scopes())
                    .request_async(|req| send(self.http.clone(), req))
                    .await
            }
        }
        .map_err(classify)?;

        let token_type = match response.token_type() {
            BasicTokenType::Bearer => "Bearer".to_string(),
            BasicTokenType::Mac => "MAC".to_string(),
            BasicTokenType::Extension(other) => other.clone(),
        };

        Ok(TokenGrant {
            access_token: response.access_token().clone(),
            token_type,
            expires_in: response.expires_in().map(|d| d.as_secs()),
            refresh_token: response.refresh_token().cloned(),
        })
    }
}

/// Send an OAuth2 request with our configured client (timeouts, TLS
/// settings). Server-side failures are reported as transport errors so
/// they are retried rather than parsed as grant errors.
async fn send(http: reqwest::Client, request: HttpRequest) -> Result<HttpResponse, EndpointError> {
    let response = http
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    if status_code.is_server_error() || status_code == StatusCode::TOO_MANY_REQUESTS {
        return Err(EndpointError::Unavailable(status_code.as_u16()));
    }

    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

fn classify(err: RequestTokenError<EndpointError, BasicErrorResponse>) -> GrantError {
    match err {
        RequestTokenError::Request(EndpointError::Transport(e)) if e.is_builder() => {
            GrantError::InvalidResponse(format!("could not build request: {}", e))
        }
        RequestTokenError::Request(e) => GrantError::Transient(e.to_string()),
        RequestTokenError::ServerResponse(resp) => GrantError::Rejected(resp.to_string()),
        RequestTokenError::Parse(e, _) => GrantError::InvalidResponse(e.to_string()),
        RequestTokenError::Other(msg) => GrantError::Rejected(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use oauth2::{ClientId, ClientSecret, TokenUrl};

    fn credentials(token_url: String) -> Credentials {
        Credentials {
            client_id: ClientId::new("viewer".to_string()),
            client_secret: ClientSecret::new("s3cret".to_string()),
            token_endpoint: TokenUrl::new(token_url).unwrap(),
            partition_id: "osdu".to_string(),
        }
    }

    fn endpoint(server: &MockServer) -> OAuthEndpoint {
        OAuthEndpoint::new(
            &credentials(server.url("/token")),
            Vec::new(),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn test_client_credentials_sends_credentials_in_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .body_includes("grant_type=client_credentials")
                .body_includes("client_id=viewer")
                .body_includes("client_secret=s3cret");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"tok-cc","token_type":"Bearer","expires_in":3600}"#);
        });

        let grant = endpoint(&server)
            .request(&Grant::ClientCredentials)
            .await
            .unwrap();

        assert_eq!(grant.access_token.secret(), "tok-cc");
        assert_eq!(grant.token_type, "Bearer");
        assert_eq!(grant.expires_in, Some(3600));
        assert!(grant.refresh_token.is_none());
        mock.assert();
    }

    #[tokio::test]
    async fn test_refresh_grant_returns_rotated_refresh_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .body_includes("grant_type=refresh_token")
                .body_includes("refresh_token=rt-old");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"tok-rt","token_type":"bearer","expires_in":1800,"refresh_token":"rt-new"}"#);
        });

        let grant = endpoint(&server)
            .request(&Grant::RefreshToken(RefreshToken::new("rt-old".to_string())))
            .await
            .unwrap();

        assert_eq!(grant.access_token.secret(), "tok-rt");
        assert_eq!(grant.token_type, "Bearer");
        assert_eq!(grant.refresh_token.unwrap().secret(), "rt-new");
        mock.assert();
    }

    #[tokio::test]
    async fn test_scopes_are_sent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .body_includes("scope=openid+osdu");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"tok"}"#);
        });

        let endpoint = OAuthEndpoint::new(
            &credentials(server.url("/token")),
            vec!["openid".to_string(), "osdu".to_string()],
            reqwest::Client::new(),
        );
        endpoint.request(&Grant::ClientCredentials).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn test_lenient_response_fields() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"abc","expires_in":"300"}"#);
        });

        let grant = endpoint(&server)
            .request(&Grant::ClientCredentials)
            .await
            .unwrap();

        assert_eq!(grant.access_token.secret(), "abc");
        assert_eq!(grant.token_type, "Bearer");
        assert_eq!(grant.expires_in, Some(300));
    }

    #[tokio::test]
    async fn test_invalid_grant_is_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(400)
                .header("content-type", "application/json")
                .body(r#"{"error":"invalid_grant","error_description":"refresh token expired"}"#);
        });

        let err = endpoint(&server)
            .request(&Grant::RefreshToken(RefreshToken::new("rt".to_string())))
            .await
            .unwrap_err();

        match err {
            GrantError::Rejected(msg) => assert!(msg.contains("invalid_grant"), "{msg}"),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(503).body("upstream down");
        });

        let err = endpoint(&server)
            .request(&Grant::ClientCredentials)
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Bind and drop to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let endpoint = OAuthEndpoint::new(
            &credentials(format!("http://127.0.0.1:{}/token", port)),
            Vec::new(),
            reqwest::Client::new(),
        );

        let err = endpoint
            .request(&Grant::ClientCredentials)
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    async fn test_missing_access_token_is_invalid_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"token_type":"Bearer","expires_in":3600}"#);
        });

        let err = endpoint(&server)
            .request(&Grant::ClientCredentials)
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidResponse(_)), "{err:?}");
    }
}
