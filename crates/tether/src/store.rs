// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token storage: the only mutable state shared across the core.
//!
//! Stores hold the current access and refresh tokens. They do no validation;
//! pairing the two members on renewal is the coordinator's job, which it does
//! through [`TokenStore::replace`].

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Which member of the credential pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Access => "access_token",
            Self::Refresh => "refresh_token",
        }
    }
}

/// An access/refresh pair as issued or renewed by the identity provider.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
}

/// Synchronous key-value holder for the current credential pair.
///
/// Each `set` must be atomic on its own. Object-safe for use as
/// `Arc<dyn TokenStore>`.
pub trait TokenStore: Send + Sync + 'static {
    fn get(&self, kind: TokenKind) -> Option<String>;

    fn set(&self, kind: TokenKind, value: String);

    fn clear(&self);

    /// Replace both members together. Implementations should override this
    /// so readers never see members of two different pairs.
    fn replace(&self, pair: &TokenPair) {
        self.set(TokenKind::Access, pair.access_token.clone());
        self.set(TokenKind::Refresh, pair.refresh_token.clone());
    }

    /// Whether any credential is present.
    fn has_credentials(&self) -> bool {
        self.get(TokenKind::Access).is_some() || self.get(TokenKind::Refresh).is_some()
    }
}

/// On-disk and in-memory representation of the stored pair.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl StoredTokens {
    fn slot(&mut self, kind: TokenKind) -> &mut Option<String> {
        match kind {
            TokenKind::Access => &mut self.access_token,
            TokenKind::Refresh => &mut self.refresh_token,
        }
    }

    fn get(&self, kind: TokenKind) -> Option<String> {
        match kind {
            TokenKind::Access => self.access_token.clone(),
            TokenKind::Refresh => self.refresh_token.clone(),
        }
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StoredTokens>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a pair.
    pub fn with_pair(pair: &TokenPair) -> Self {
        let store = Self::new();
        store.replace(pair);
        store
    }
}

impl TokenStore for MemoryStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        self.inner.lock().get(kind)
    }

    fn set(&self, kind: TokenKind, value: String) {
        *self.inner.lock().slot(kind) = Some(value);
    }

    fn clear(&self) {
        *self.inner.lock() = StoredTokens::default();
    }

    fn replace(&self, pair: &TokenPair) {
        *self.inner.lock() = StoredTokens {
            access_token: Some(pair.access_token.clone()),
            refresh_token: Some(pair.refresh_token.clone()),
        };
    }
}

/// JSON file store with a write-through in-memory cache.
///
/// Reads are served from the cache. Every mutation rewrites the whole file
/// atomically (write tmp + rename) while the cache lock is held, so the file
/// and the cache never disagree about which pair is current.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<StoredTokens>,
}

impl FileStore {
    /// Open the store at `path`. A missing file loads as empty.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let tokens = if path.exists() { load(&path)? } else { StoredTokens::default() };
        Ok(Self { path, inner: Mutex::new(tokens) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, tokens: &StoredTokens) {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    tracing::warn!(err = %e, path = %dir.display(), "failed to create token dir");
                    return;
                }
            }
        }
        if let Err(e) = save(&self.path, tokens) {
            tracing::warn!(err = %e, path = %self.path.display(), "failed to persist tokens");
        }
    }
}

impl TokenStore for FileStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        self.inner.lock().get(kind)
    }

    fn set(&self, kind: TokenKind, value: String) {
        let mut tokens = self.inner.lock();
        *tokens.slot(kind) = Some(value);
        self.persist(&tokens);
    }

    fn clear(&self) {
        let mut tokens = self.inner.lock();
        *tokens = StoredTokens::default();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(err = %e, path = %self.path.display(), "failed to remove token file");
            }
        }
    }

    fn replace(&self, pair: &TokenPair) {
        let mut tokens = self.inner.lock();
        *tokens = StoredTokens {
            access_token: Some(pair.access_token.clone()),
            refresh_token: Some(pair.refresh_token.clone()),
        };
        self.persist(&tokens);
    }
}

/// Load stored tokens from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<StoredTokens> {
    let contents = std::fs::read_to_string(path)?;
    let tokens: StoredTokens = serde_json::from_str(&contents)?;
    Ok(tokens)
}

/// Save tokens to a JSON file atomically (write tmp + rename).
///
/// The file holds refresh credentials, so it is created owner-only (0600).
///
/// The temp name carries PID + counter so concurrent saves never share a
/// `.tmp` file.
pub fn save(path: &Path, tokens: &StoredTokens) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(tokens)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    write_private(&tmp_path, json.as_bytes())?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Create `path` readable by the owner only, then write `contents`.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
