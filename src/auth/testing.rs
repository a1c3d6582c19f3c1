//! Scripted token endpoint for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use oauth2::{AccessToken, RefreshToken};

use super::oauth::{Grant, GrantError, GrantKind, TokenEndpoint, TokenGrant};

pub fn granted(access: &str, expires_in: u64, refresh: Option<&str>) -> TokenGrant {
    TokenGrant {
        access_token: AccessToken::new(access.to_string()),
        token_type: "Bearer".to_string(),
        expires_in: Some(expires_in),
        refresh_token: refresh.map(|rt| RefreshToken::new(rt.to_string())),
    }
}

/// Replays queued responses, then issues `tok-<n>` (or rejects, when
/// built with [`ScriptedEndpoint::failing`]).
#[derive(Default)]
pub struct ScriptedEndpoint {
    script: Mutex<VecDeque<Result<TokenGrant, GrantError>>>,
    seen: Mutex<Vec<Grant>>,
    calls: AtomicUsize,
    delay: Duration,
    fail_when_empty: bool,
}

impl ScriptedEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_when_empty: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, response: Result<TokenGrant, GrantError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn grants(&self) -> Vec<GrantKind> {
        self.seen.lock().unwrap().iter().map(Grant::kind).collect()
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|g| match g {
                Grant::RefreshToken(rt) => Some(rt.secret().clone()),
                Grant::ClientCredentials => None,
            })
            .collect()
    }
}

#[async_trait]
impl TokenEndpoint for ScriptedEndpoint {
    async fn request(&self, grant: &Grant) -> Result<TokenGrant, GrantError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(grant.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            None if self.fail_when_empty => Err(GrantError::Rejected("invalid_client".to_string())),
            None => Ok(granted(&format!("tok-{}", n), 3600, None)),
        }
    }
}
