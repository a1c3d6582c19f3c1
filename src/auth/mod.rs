//! Authentication against the platform's OAuth2 token endpoint
//!
//! The [`TokenManager`] owns the token lifecycle. It talks to a
//! [`TokenEndpoint`](oauth::TokenEndpoint) (production: [`OAuthEndpoint`]) and mirrors the current
//! token into a [`TokenCache`] so it survives restarts.

pub mod manager;
pub mod oauth;
pub mod retry;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::config::{Settings, TokenCacheLocation};

pub use manager::{AuthError, TokenManager};
pub use retry::RetryPolicy;
pub use tokens::{FileTokenCache, MemoryTokenCache};

use oauth::OAuthEndpoint;
use tokens::TokenCache;

/// Build the production token manager described by `settings`.
pub fn token_manager(settings: &Settings, http: reqwest::Client) -> TokenManager {
    let endpoint = OAuthEndpoint::new(&settings.credentials, settings.scopes.clone(), http);
    let cache: Arc<dyn TokenCache> = match &settings.token_cache {
        TokenCacheLocation::Memory => Arc::new(MemoryTokenCache::new()),
        TokenCacheLocation::File(path) => {
            tracing::debug!("Token cache at {}", path.display());
            Arc::new(FileTokenCache::new(path.clone()))
        }
    };

    TokenManager::new(Arc::new(endpoint), cache, settings.retry)
        .with_refresh_token(settings.refresh_token.clone())
}

/// Make sure a usable token is cached, acquiring one if needed.
pub async fn login(tokens: &TokenManager, force: bool) -> anyhow::Result<()> {
    if !force && tokens.status().await.valid {
        println!("Already logged in (token valid). Use --force to re-authenticate.");
        return Ok(());
    }
    if force {
        tokens.invalidate().await?;
    }

    let token = tokens.get_token().await?;
    println!("Login successful.");
    println!("  expires_at: {}", token.expires_at);
    Ok(())
}

/// Clear the cached token.
pub async fn logout(tokens: &TokenManager) -> anyhow::Result<()> {
    tokens.invalidate().await?;
    println!("Logged out.");
    Ok(())
}

/// Display current auth status
pub async fn status(tokens: &TokenManager) -> anyhow::Result<()> {
    let status = tokens.status().await;
    match (status.valid, status.expires_at) {
        (true, Some(exp)) => {
            println!("Access token:  valid");
            println!("  expires_at: {}", exp);
        }
        (false, Some(exp)) => {
            println!("Access token:  expired");
            println!("  expires_at: {}", exp);
        }
        (_, None) => println!("Access token:  none"),
    }
    if status.has_refresh_token {
        println!("Refresh token: present");
    } else {
        println!("Refresh token: none");
    }
    Ok(())
}
