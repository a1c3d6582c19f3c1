//! Token lifecycle: cache lookup, grant fallback, retry and persistence
//!
//! [`TokenManager::get_token`] answers from memory when it can, then from the
//! persistent cache, and only then walks the grant strategies against the
//! token endpoint. The whole check-then-acquire-then-store sequence runs under
//! one async mutex, so concurrent callers share a single acquisition.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use backon::Retryable;
use chrono::{DateTime, Utc};
use oauth2::RefreshToken;
use thiserror::Error;
use tokio::sync::Mutex;

use super::oauth::{Grant, GrantError, GrantKind, TokenEndpoint, TokenGrant};
use super::retry::RetryPolicy;
use super::tokens::{CacheError, Token, TokenCache};

/// One grant that failed during an acquisition.
#[derive(Debug, Clone)]
pub struct GrantFailure {
    pub grant: GrantKind,
    pub attempts: u32,
    pub error: GrantError,
}

impl fmt::Display for GrantFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} attempt", self.grant, self.attempts)?;
        if self.attempts != 1 {
            f.write_str("s")?;
        }
        write!(f, "): {}", self.error)
    }
}

/// Every grant strategy failed; no token is available.
#[derive(Debug, Clone, Error)]
#[error("authentication failed: {}", summarize(.failures))]
pub struct AuthError {
    pub failures: Vec<GrantFailure>,
}

fn summarize(failures: &[GrantFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Snapshot of what the manager holds, without touching the network.
#[derive(Debug, Clone)]
pub struct TokenStatus {
    pub valid: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub has_refresh_token: bool,
}

#[derive(Default)]
struct TokenState {
    current: Option<Token>,
    refresh_token: Option<RefreshToken>,
    /// Bumped after every acquisition, successful or not.
    generation: u64,
    last_failure: Option<AuthError>,
}

pub struct TokenManager {
    endpoint: Arc<dyn TokenEndpoint>,
    cache: Arc<dyn TokenCache>,
    retry: RetryPolicy,
    state: Mutex<TokenState>,
    /// Mirror of `TokenState::generation`, readable before taking the lock.
    generation: AtomicU64,
}

impl TokenManager {
    pub fn new(
        endpoint: Arc<dyn TokenEndpoint>,
        cache: Arc<dyn TokenCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            endpoint,
            cache,
            retry,
            state: Mutex::new(TokenState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Seed the refresh token used before the persistent cache offers one.
    pub fn with_refresh_token(mut self, refresh_token: Option<RefreshToken>) -> Self {
        self.state.get_mut().refresh_token = refresh_token;
        self
    }

    /// Return a token that is valid for at least the immediate request.
    pub async fn get_token(&self) -> Result<Token, AuthError> {
        let observed = self.generation.load(Ordering::Acquire);
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if let Some(token) = state.current.as_ref().filter(|t| t.is_valid_at(now)) {
            return Ok(token.clone());
        }

        // Someone else finished an acquisition while we waited for the lock:
        // share its outcome instead of hitting the endpoint again.
        if state.generation != observed {
            if let Some(token) = state.current.clone() {
                return Ok(token);
            }
            if let Some(err) = state.last_failure.clone() {
                return Err(err);
            }
        }

        if let Some(token) = self.load_cached(&mut state, now) {
            return Ok(token);
        }

        let result = self.acquire(&mut state).await;
        state.generation += 1;
        self.generation.store(state.generation, Ordering::Release);
        state.last_failure = result.as_ref().err().cloned();
        result
    }

    /// Drop the memory and persistent cache so the next call re-acquires.
    ///
    /// The refresh token is kept: a rejected access token says nothing
    /// about the refresh token that minted it.
    pub async fn invalidate(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        state.current = None;
        state.last_failure = None;
        tracing::info!("Token invalidated");
        self.cache.clear()
    }

    /// Invalidate only while `rejected` is still the current access token.
    ///
    /// Requests that were all refused with the same token then cause a
    /// single re-acquisition: the first caller clears it, the rest find a
    /// newer token (or none) and leave it alone. Returns whether anything
    /// was cleared.
    pub async fn invalidate_if(&self, rejected: &str) -> Result<bool, CacheError> {
        let mut state = self.state.lock().await;
        if !state
            .current
            .as_ref()
            .is_some_and(|t| t.access_token == rejected)
        {
            tracing::debug!("Rejected token already replaced");
            return Ok(false);
        }
        state.current = None;
        state.last_failure = None;
        tracing::info!("Token invalidated after rejection");
        self.cache.clear()?;
        Ok(true)
    }

    /// Report whether a valid token is held, checking memory then the
    /// persistent cache.
    pub async fn status(&self) -> TokenStatus {
        let state = self.state.lock().await;
        let cached = match state.current.clone() {
            Some(token) => Some(token),
            None => self.cache.get().unwrap_or_else(|e| {
                tracing::warn!("Failed to read token cache: {}", e);
                None
            }),
        };

        let has_refresh_token = state.refresh_token.is_some()
            || cached.as_ref().is_some_and(|t| t.refresh_token.is_some());
        TokenStatus {
            valid: cached.as_ref().is_some_and(|t| !t.is_expired()),
            expires_at: cached.map(|t| t.expires_at),
            has_refresh_token,
        }
    }

    /// Adopt the persisted token. Its refresh token is kept even when the
    /// access token is stale.
    fn load_cached(&self, state: &mut TokenState, now: DateTime<Utc>) -> Option<Token> {
        let token = match self.cache.get() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to load token cache: {}", e);
                return None;
            }
        };

        if let Some(rt) = token.refresh_token.clone() {
            state.refresh_token = Some(RefreshToken::new(rt));
        }

        if token.is_valid_at(now) {
            tracing::debug!("Using cached token (expires {})", token.expires_at);
            state.current = Some(token.clone());
            Some(token)
        } else {
            tracing::debug!("Cached token expired at {}", token.expires_at);
            None
        }
    }

    /// Grants to try, in order.
    fn strategies(state: &TokenState) -> Vec<Grant> {
        let mut grants = Vec::with_capacity(2);
        if let Some(rt) = state.refresh_token.clone() {
            grants.push(Grant::RefreshToken(rt));
        }
        grants.push(Grant::ClientCredentials);
        grants
    }

    async fn acquire(&self, state: &mut TokenState) -> Result<Token, AuthError> {
        let mut failures = Vec::new();

        for grant in Self::strategies(state) {
            match self.request_with_retry(&grant).await {
                Ok(granted) => {
                    let token = self.store(state, granted);
                    tracing::info!(
                        "Obtained access token via {} (valid until {})",
                        grant.kind(),
                        token.expires_at
                    );
                    return Ok(token);
                }
                Err((attempts, error)) => {
                    tracing::warn!("{} grant failed: {}", grant.kind(), error);
                    if let (Grant::RefreshToken(rejected), false) = (&grant, error.is_transient()) {
                        self.forget_cached_refresh_token(rejected);
                        state.refresh_token = None;
                    }
                    failures.push(GrantFailure {
                        grant: grant.kind(),
                        attempts,
                        error,
                    });
                }
            }
        }

        let err = AuthError { failures };
        tracing::error!("{}", err);
        Err(err)
    }

    /// Run one grant, retrying transient failures per the policy. On failure
    /// returns the number of attempts made alongside the last error.
    async fn request_with_retry(&self, grant: &Grant) -> Result<TokenGrant, (u32, GrantError)> {
        let attempts = AtomicU32::new(0);
        let endpoint = &self.endpoint;
        let counter = &attempts;

        let result = (move || {
            counter.fetch_add(1, Ordering::Relaxed);
            endpoint.request(grant)
        })
        .retry(self.retry.backoff())
        .when(GrantError::is_transient)
        .notify(|err, dur| {
            tracing::warn!(
                "{} grant attempt {}/{} failed: {}. Retrying in {:.1}s",
                grant.kind(),
                attempts.load(Ordering::Relaxed),
                self.retry.max_attempts,
                err,
                dur.as_secs_f32()
            );
        })
        .await;

        result.map_err(|e| (attempts.load(Ordering::Relaxed), e))
    }

    /// Strip a rejected refresh token from the persisted entry so the next
    /// process does not present it again.
    fn forget_cached_refresh_token(&self, rejected: &RefreshToken) {
        let mut token = match self.cache.get() {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Failed to read token cache: {}", e);
                return;
            }
        };
        if token.refresh_token.as_deref() != Some(rejected.secret().as_str()) {
            return;
        }
        token.refresh_token = None;
        if let Err(e) = self.cache.set(&token) {
            tracing::warn!("Failed to save token cache: {}", e);
        }
    }

    fn store(&self, state: &mut TokenState, granted: TokenGrant) -> Token {
        if let Some(rotated) = granted.refresh_token {
            state.refresh_token = Some(rotated);
        }

        let token = Token::issue(
            granted.access_token.secret().clone(),
            granted.token_type,
            granted.expires_in,
            state.refresh_token.as_ref().map(|rt| rt.secret().clone()),
            Utc::now(),
        );

        if let Err(e) = self.cache.set(&token) {
            tracing::warn!("Failed to save token cache: {}", e);
        }
        state.current = Some(token.clone());
        token
    }
}
