//! Credential sources for the connection token.
//!
//! The client asks its [`CredentialSource`] for a token on every open attempt,
//! so a token set or cleared between retries takes effect on the next one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::errors::Result;

/// Supplies the optional token appended to the connection URL.
pub trait CredentialSource: Send + Sync + 'static {
    /// Current token, if any.
    fn token(&self) -> Option<String>;
}

impl<F> CredentialSource for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Never supplies a token.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn token(&self) -> Option<String> {
        None
    }
}

/// A fixed token.
#[derive(Clone, Debug)]
pub struct StaticToken(pub String);

impl CredentialSource for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Shared in-memory token slot.
///
/// Clones share the slot, so a login flow can hold one clone while the
/// client holds another.
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    slot: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token.
    pub fn get(&self) -> Option<String> {
        self.slot.read().clone()
    }

    /// Replace the token.
    pub fn set(&self, token: impl Into<String>) {
        *self.slot.write() = Some(token.into());
    }

    /// Remove the token.
    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    /// Whether a token is present.
    pub fn is_authenticated(&self) -> bool {
        self.slot.read().is_some()
    }
}

impl CredentialSource for TokenStore {
    fn token(&self) -> Option<String> {
        self.get()
    }
}

/// Token persisted in a single file.
///
/// The file holds the raw token; surrounding whitespace is ignored and an
/// empty or missing file means no token. Written with mode 0o600 on unix.
#[derive(Clone, Debug)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    /// Store backed by `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the token. Unreadable files are logged and treated as empty.
    pub fn get(&self) -> Option<String> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read token file: {e}");
                return None;
            }
        };
        let token = data.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    /// Write the token, creating parent directories as needed.
    pub fn set(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token.trim())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&self.path, perms);
        }

        Ok(())
    }

    /// Delete the file. A missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the file holds a token.
    pub fn is_authenticated(&self) -> bool {
        self.get().is_some()
    }
}

impl CredentialSource for TokenFile {
    fn token(&self) -> Option<String> {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn closure_is_a_source() {
        let source = || Some("abc".to_string());
        assert_eq!(source.token().as_deref(), Some("abc"));
    }

    #[test]
    fn no_credentials() {
        assert!(NoCredentials.token().is_none());
    }

    #[test]
    fn static_token() {
        assert_eq!(StaticToken("t".into()).token().as_deref(), Some("t"));
    }

    #[test]
    fn token_store_shares_slot() {
        let store = TokenStore::new();
        let handle = store.clone();
        assert!(!store.is_authenticated());

        handle.set("secret");
        assert!(store.is_authenticated());
        assert_eq!(store.token().as_deref(), Some("secret"));

        store.clear();
        assert!(handle.get().is_none());
    }

    #[test]
    fn token_file_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let file = TokenFile::new(dir.path().join("token"));
        assert!(file.get().is_none());
        assert!(!file.is_authenticated());
        file.clear().unwrap();
    }

    #[test]
    fn token_file_set_get_clear() {
        let dir = TempDir::new().unwrap();
        let file = TokenFile::new(dir.path().join("nested").join("token"));

        file.set("  tok-123\n").unwrap();
        assert_eq!(file.token().as_deref(), Some("tok-123"));

        file.clear().unwrap();
        assert!(file.get().is_none());
    }

    #[test]
    fn token_file_blank_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "\n  \n").unwrap();
        assert!(TokenFile::new(path).get().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn token_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let file = TokenFile::new(dir.path().join("token"));
        file.set("tok").unwrap();
        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
