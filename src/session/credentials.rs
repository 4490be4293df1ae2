use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::session::error::SessionError;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access: String,
    pub refresh: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Where the credential pair lives between requests and between runs.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Result<Option<Credentials>, SessionError>;

    fn set(&self, credentials: &Credentials) -> Result<(), SessionError>;

    fn clear(&self) -> Result<(), SessionError>;
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Option<Credentials>>,
}

impl MemoryStore {
    pub fn with(credentials: Credentials) -> Self {
        Self {
            inner: Mutex::new(Some(credentials)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Credentials>>, SessionError> {
        self.inner
            .lock()
            .map_err(|_| SessionError::Storage("credential store poisoned".to_string()))
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Result<Option<Credentials>, SessionError> {
        Ok(self.lock()?.clone())
    }

    fn set(&self, credentials: &Credentials) -> Result<(), SessionError> {
        *self.lock()? = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.lock()? = None;
        Ok(())
    }
}

/// JSON file holding the pair. Writes land in a sibling temp file first and
/// are renamed into place.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileStore {
    fn get(&self) -> Result<Option<Credentials>, SessionError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_error(&self.path, err)),
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|err| {
            SessionError::Storage(format!("{} is not a credential file: {err}", self.path.display()))
        })
    }

    fn set(&self, credentials: &Credentials) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| storage_error(parent, err))?;
        }

        let body = serde_json::to_vec_pretty(credentials)
            .map_err(|err| SessionError::Storage(format!("failed to encode credentials: {err}")))?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, body).map_err(|err| storage_error(&staging, err))?;
        fs::rename(&staging, &self.path).map_err(|err| storage_error(&self.path, err))
    }

    fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error(&self.path, err)),
        }
    }
}

fn storage_error(path: &Path, err: std::io::Error) -> SessionError {
    SessionError::Storage(format!("{}: {err}", path.display()))
}
