//! Persisted credential and its file store
//!
//! Exactly one credential lives in the store at a time. Every save replaces
//! the whole record through a temp-file + rename so a crash mid-write never
//! leaves a half-written file that parses as valid.
//!
//! Only the token manager writes here; the flows hand back in-memory values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::refresh::RefreshedToken;

/// The persisted unit of authentication state.
///
/// `expiry_date` is a unix timestamp in milliseconds (absolute, not a delta),
/// computed when the token arrives from the provider's `expires_in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for API calls
    pub access_token: String,
    /// Long-lived token; the provider may withhold it on repeat consent
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiration as unix timestamp in milliseconds
    #[serde(default)]
    pub expiry_date: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Where a credential stands relative to the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Valid,
    Expired,
    /// No `expiry_date` was recorded.
    Unknown,
}

impl Credential {
    pub fn expiry(&self, now_millis: u64) -> Expiry {
        match self.expiry_date {
            Some(expiry) if expiry > now_millis => Expiry::Valid,
            Some(_) => Expiry::Expired,
            None => Expiry::Unknown,
        }
    }

    /// Apply a refresh result, keeping the old refresh token (and metadata)
    /// wherever the provider did not send a new value.
    pub fn refreshed(&self, token: RefreshedToken) -> Credential {
        Credential {
            access_token: token.access_token,
            refresh_token: token.refresh_token.or_else(|| self.refresh_token.clone()),
            expiry_date: token.expiry_date,
            scope: token.scope.or_else(|| self.scope.clone()),
            token_type: token.token_type.or_else(|| self.token_type.clone()),
        }
    }
}

/// File-backed store for the single credential.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential.
    ///
    /// `NotFound` on first run, `CorruptStore` when the file does not parse
    /// or carries an empty access token.
    pub async fn load(&self) -> Result<Credential> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "credential file {}",
                    self.path.display()
                )));
            }
            Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
        };

        let credential: Credential = serde_json::from_str(&contents)
            .map_err(|e| Error::CorruptStore(format!("parsing {}: {e}", self.path.display())))?;
        if credential.access_token.is_empty() {
            return Err(Error::CorruptStore(format!(
                "{} has an empty access_token",
                self.path.display()
            )));
        }

        debug!(path = %self.path.display(), "loaded credential");
        Ok(credential)
    }

    /// Replace the stored credential.
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        write_atomic(&self.path, credential).await
    }
}

/// Write the credential to a sibling temp file, restrict it to the owner,
/// then rename it over the target.
async fn write_atomic(path: &Path, credential: &Credential) -> Result<()> {
    let json = serde_json::to_string_pretty(credential)
        .map_err(|e| Error::Persist(format!("serializing credential: {e}")))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Persist(format!("{} has no file name", path.display())))?;
    let dir = path.parent().unwrap_or_else(|| Path::new(""));

    if !dir.as_os_str().is_empty() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Persist(format!("creating {}: {e}", dir.display())))?;
    }

    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    if let Err(e) = write_then_rename(&tmp_path, path, json.as_bytes()).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    debug!(path = %path.display(), "persisted credential");
    Ok(())
}

/// Any error here may leave `tmp_path` behind; the caller removes it.
async fn write_then_rename(tmp_path: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(tmp_path, contents)
        .await
        .map_err(|e| Error::Persist(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(tmp_path, perms)
            .await
            .map_err(|e| Error::Persist(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(tmp_path, path)
        .await
        .map_err(|e| Error::Persist(format!("renaming temp credential file: {e}")))
}
