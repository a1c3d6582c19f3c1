//! Token storage and management

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Safety margin subtracted from every server-reported lifetime.
pub const EXPIRY_MARGIN_SECS: u64 = 300;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_LIFETIME_SECS: u64 = 3600;

/// Access token with its usable lifetime already reduced by the margin.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Token {
    /// Build a token issued at `issued_at` from a server-reported lifetime.
    ///
    /// `expires_at` never precedes `issued_at`; a lifetime at or below the
    /// margin yields a token that is already stale for cache purposes.
    pub fn issue(
        access_token: String,
        token_type: String,
        expires_in_secs: Option<u64>,
        refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let lifetime = expires_in_secs
            .unwrap_or(DEFAULT_LIFETIME_SECS)
            .saturating_sub(EXPIRY_MARGIN_SECS)
            .min(u64::from(u32::MAX));
        Self {
            access_token,
            token_type,
            issued_at,
            expires_at: issued_at + Duration::seconds(lifetime as i64),
            refresh_token,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Utc::now())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("token cache I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("token cache {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize token: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Persistent mirror of the current token, surviving restarts.
pub trait TokenCache: Send + Sync {
    fn get(&self) -> Result<Option<Token>, CacheError>;
    fn set(&self, token: &Token) -> Result<(), CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
}

/// TOML file cache. Deleting the file forces re-authentication.
#[derive(Debug, Clone)]
pub struct FileTokenCache {
    path: PathBuf,
}

impl FileTokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Temp file in the target directory so the final rename stays on one
    /// filesystem.
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "token".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()))
    }
}

impl TokenCache for FileTokenCache {
    fn get(&self) -> Result<Option<Token>, CacheError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        toml::from_str(&content)
            .map(Some)
            .map_err(|source| CacheError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    fn set(&self, token: &Token) -> Result<(), CacheError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }

        let content = toml::to_string_pretty(token)?;
        let temp = self.temp_path();
        let written = fs::write(&temp, content).and_then(|()| {
            // Set restrictive permissions before the file becomes visible (contains tokens)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&temp, fs::Permissions::from_mode(0o600))?;
            }
            fs::rename(&temp, &self.path)
        });

        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(self.io_error(e));
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Process-local cache, for `OSDU_TOKEN_CACHE=memory` and tests.
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    slot: Mutex<Option<Token>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: Token) -> Self {
        Self {
            slot: Mutex::new(Some(token)),
        }
    }
}

impl TokenCache for MemoryTokenCache {
    fn get(&self) -> Result<Option<Token>, CacheError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set(&self, token: &Token) -> Result<(), CacheError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
