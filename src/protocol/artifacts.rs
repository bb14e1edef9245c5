//! Named at-rest layout for keys, contexts and session artifacts.
//!
//! One deployment root holds the vault key and a `sessions/` directory
//! with one subdirectory per session id. Every artifact has an explicit
//! name; nothing is found by convention or glob.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::vault::{self, SymmetricKey};

use super::session::SessionId;

/// Deployment-wide vault key blob.
pub const VAULT_KEY_FILE: &str = "vault.key";
/// Client-only private context blob.
pub const PRIVATE_CONTEXT_FILE: &str = "private_context.bin";
/// Public context blob handed to the server.
pub const PUBLIC_CONTEXT_FILE: &str = "public_context.bin";
/// Sealed request as transmitted.
pub const REQUEST_ENVELOPE_FILE: &str = "request.envelope";
/// Sealed result as received.
pub const RESULT_ENVELOPE_FILE: &str = "result.envelope";
/// Human-readable session sidecar.
pub const SESSION_META_FILE: &str = "session.json";
/// Deployment-wide JSON-lines ledger file.
pub const LEDGER_FILE: &str = "ledger.jsonl";

const SESSIONS_DIR: &str = "sessions";

/// Sidecar describing a persisted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session: String,
    pub created_unix: u64,
    pub feature_count: usize,
    pub request_digest: String,
}

impl SessionMeta {
    pub fn new(id: SessionId, feature_count: usize, request_digest: &Digest) -> Self {
        let created_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            session: id.to_string(),
            created_unix,
            feature_count,
            request_digest: request_digest.to_string(),
        }
    }

    pub fn session_id(&self) -> Result<SessionId> {
        self.session.parse()
    }
}

/// Filesystem layout helper rooted at one deployment directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the deployment vault key, generating it on first use.
    ///
    /// The generated file is mode 0600 on Unix.
    pub fn load_or_generate_key(&self) -> Result<SymmetricKey> {
        let path = self.root.join(VAULT_KEY_FILE);
        match fs::read(&path) {
            Ok(bytes) => {
                let raw: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    Error::MalformedInput(format!(
                        "vault key at {} is {} bytes, want 32",
                        path.display(),
                        bytes.len()
                    ))
                })?;
                Ok(SymmetricKey::from_bytes(raw))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&self.root)?;
                let key = vault::generate_key()?;
                write_restricted(&path, key.as_bytes())?;
                info!("generated vault key at {}", path.display());
                Ok(key)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn session_dir(&self, id: SessionId) -> PathBuf {
        self.root.join(SESSIONS_DIR).join(id.to_string())
    }

    pub fn create_session_dir(&self, id: SessionId) -> Result<PathBuf> {
        let dir = self.session_dir(id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn write_session_file(&self, id: SessionId, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.create_session_dir(id)?;
        let path = dir.join(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn read_session_file(&self, id: SessionId, name: &str) -> Result<Vec<u8>> {
        let path = self.session_dir(id).join(name);
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                Error::MalformedInput(format!("missing session artifact {}", path.display()))
            }
            _ => e.into(),
        })
    }

    pub fn write_session_meta(&self, id: SessionId, meta: &SessionMeta) -> Result<PathBuf> {
        let text = serde_json::to_string_pretty(meta)
            .map_err(|e| Error::MalformedInput(format!("session meta: {e}")))?;
        self.write_session_file(id, SESSION_META_FILE, text.as_bytes())
    }

    pub fn read_session_meta(&self, id: SessionId) -> Result<SessionMeta> {
        let bytes = self.read_session_file(id, SESSION_META_FILE)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::MalformedInput(format!("session meta: {e}")))
    }

    /// Remove a session directory and everything in it. Missing is fine.
    pub fn remove_session(&self, id: SessionId) -> Result<()> {
        match fs::remove_dir_all(self.session_dir(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_restricted(path: &Path, bytes: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(bytes)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        fs::write(path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::request_digest;

    #[test]
    fn test_key_generated_once_then_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("deploy"));
        let first = store.load_or_generate_key().unwrap();
        let second = store.load_or_generate_key().unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert!(store.root().join(VAULT_KEY_FILE).is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.load_or_generate_key().unwrap();
        let mode = fs::metadata(dir.path().join(VAULT_KEY_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_short_key_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        fs::write(dir.path().join(VAULT_KEY_FILE), b"short").unwrap();
        assert!(matches!(
            store.load_or_generate_key(),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_session_files_roundtrip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let id = SessionId(0xabcd);

        store
            .write_session_file(id, REQUEST_ENVELOPE_FILE, b"sealed bytes")
            .unwrap();
        assert_eq!(
            store.read_session_file(id, REQUEST_ENVELOPE_FILE).unwrap(),
            b"sealed bytes"
        );
        assert!(matches!(
            store.read_session_file(id, RESULT_ENVELOPE_FILE),
            Err(Error::MalformedInput(_))
        ));

        store.remove_session(id).unwrap();
        assert!(!store.session_dir(id).exists());
        store.remove_session(id).unwrap();
    }

    #[test]
    fn test_meta_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let id = SessionId::fresh();
        let meta = SessionMeta::new(id, 6, &request_digest(b"envelope"));
        store.write_session_meta(id, &meta).unwrap();
        let read = store.read_session_meta(id).unwrap();
        assert_eq!(read, meta);
        assert_eq!(read.session_id().unwrap(), id);
    }
}
