use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use lazy_static::lazy_static;
use serde::Deserialize;

use crate::Error;

/// Safety margin subtracted from the server reported lifetime so a token is
/// refreshed before it actually lapses.
pub(crate) const EXPIRY_MARGIN_SECS: i64 = 60;

/// Epoch-ms expiry for a token issued now with the given lifetime. The
/// margin is applied here, exactly once; comparisons against the stored
/// value never re-apply it.
pub(crate) fn expiry_epoch_ms(now_ms: i64, expires_in_secs: i64) -> i64 {
    now_ms + (expires_in_secs - EXPIRY_MARGIN_SECS) * 1000
}

pub(crate) fn now_epoch_ms() -> i64 {
    Local::now().timestamp_millis()
}

/// Body of a successful token exchange. `refresh_token` is absent on the
/// refresh grant.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// The keys a [`TokenStore`] persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    PkceVerifier,
    AccessToken,
    RefreshToken,
    TokenExpiresAt,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PkceVerifier => "pkce_verifier",
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::TokenExpiresAt => "token_expires_at",
        }
    }
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable key-value storage for the token lifecycle. Exclusively owned by
/// [`TokenManager`][crate::TokenManager]; nothing else reads or writes the
/// four keys. Writes are last-write-wins with no transactional semantics.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: StoreKey) -> Option<String>;
    fn set(&self, key: StoreKey, value: &str) -> Result<(), Error>;
    fn clear(&self, key: StoreKey) -> Result<(), Error>;
}

lazy_static! {
    pub(crate) static ref CACHE_PATH: PathBuf = {
        #[cfg(windows)]
        let dir = ".nowify";
        #[cfg(not(windows))]
        let dir = ".config/nowify";
        home::home_dir().unwrap_or_default().join(dir)
    };
}

/// Token storage backed by a JSON file in the user's config directory.
pub struct FileTokenStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileTokenStore {
    pub fn new() -> Self {
        Self::at(CACHE_PATH.join("tokens.json"))
    }

    pub fn at<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|body| serde_json::from_str(&body).ok())
            .unwrap_or_default();

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(&self.path, serde_json::to_string(entries)?)?;
        Ok(())
    }
}

impl Default for FileTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        self.entries.lock().unwrap().get(key.as_str()).cloned()
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), Error> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.as_str().to_string(), value.to_string());
        self.flush(&entries)
    }

    fn clear(&self, key: StoreKey) -> Result<(), Error> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key.as_str());
        self.flush(&entries)
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        self.entries.lock().unwrap().get(key.as_str()).cloned()
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), Error> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.as_str().to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: StoreKey) -> Result<(), Error> {
        self.entries.lock().unwrap().remove(key.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_applies_margin_once() {
        // expires_in = 3600 at time T stores T + 3540s
        assert_eq!(expiry_epoch_ms(1_000_000, 3600), 1_000_000 + 3_540_000);
    }

    #[test]
    fn memory_store_round_trips_keys() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.get(StoreKey::AccessToken), None);

        store.set(StoreKey::AccessToken, "abc").unwrap();
        store.set(StoreKey::TokenExpiresAt, "1234").unwrap();
        assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("abc"));
        assert_eq!(store.get(StoreKey::TokenExpiresAt).as_deref(), Some("1234"));

        store.clear(StoreKey::AccessToken).unwrap();
        assert_eq!(store.get(StoreKey::AccessToken), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_store_round_trips_through_its_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        {
            let store = FileTokenStore::at(&path);
            store.set(StoreKey::AccessToken, "token-a").unwrap();
            store.set(StoreKey::RefreshToken, "token-r").unwrap();
            store.clear(StoreKey::RefreshToken).unwrap();
        }

        let reloaded = FileTokenStore::at(&path);
        assert_eq!(reloaded.get(StoreKey::AccessToken).as_deref(), Some("token-a"));
        assert_eq!(reloaded.get(StoreKey::RefreshToken), None);
    }

    #[test]
    fn token_grant_parses_with_optional_refresh_token() {
        let grant: TokenGrant = serde_json::from_str(
            r#"{"access_token":"at","token_type":"Bearer","expires_in":3600,"scope":"user-read-currently-playing"}"#,
        )
        .unwrap();

        assert_eq!(grant.access_token, "at");
        assert_eq!(grant.refresh_token, None);
        assert_eq!(grant.expires_in, 3600);
    }
}
