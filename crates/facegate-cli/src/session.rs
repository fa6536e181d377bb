//! Session-scoped hand-off between CLI invocations.
//!
//! Two single-value slots in a per-user runtime directory: the pending
//! descriptor waiting for `register`, and the identity authenticated in
//! this session. Slots are replaced atomically (temp file + rename) and
//! live until consumed or until the runtime directory is cleared.

use chrono::{DateTime, Utc};
use facegate_core::{Identity, PendingDescriptor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const PENDING_FILE: &str = "pending.json";
const CURRENT_FILE: &str = "current.json";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session io: {0}")]
    Io(#[from] std::io::Error),
    #[error("session encoding: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identity signed in for this session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub username: String,
    pub since: DateTime<Utc>,
}

pub struct SessionChannel {
    dir: PathBuf,
}

impl SessionChannel {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store the pending descriptor, replacing any earlier one.
    pub fn stage_pending(&self, pending: &PendingDescriptor) -> Result<(), SessionError> {
        if self.slot(PENDING_FILE).exists() {
            tracing::info!("replacing previously pending descriptor");
        }
        self.write(PENDING_FILE, pending)
    }

    /// The pending descriptor, if one is waiting. An unreadable slot is
    /// discarded and reads as empty; the user recaptures.
    pub fn pending(&self) -> Result<Option<PendingDescriptor>, SessionError> {
        self.read_or_discard(PENDING_FILE)
    }

    pub fn clear_pending(&self) -> Result<bool, SessionError> {
        self.remove(PENDING_FILE)
    }

    pub fn sign_in(&self, identity: &Identity) -> Result<SessionUser, SessionError> {
        let user = SessionUser {
            id: identity.id().to_string(),
            username: identity.username().to_string(),
            since: Utc::now(),
        };
        self.write(CURRENT_FILE, &user)?;
        Ok(user)
    }

    pub fn current(&self) -> Result<Option<SessionUser>, SessionError> {
        self.read_or_discard(CURRENT_FILE)
    }

    pub fn sign_out(&self) -> Result<bool, SessionError> {
        self.remove(CURRENT_FILE)
    }

    fn slot(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Per-process staging file, so concurrent writers never share one.
    fn temp_slot(&self, name: &str) -> PathBuf {
        self.slot(&format!(".{name}.{}.tmp", std::process::id()))
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<(), SessionError> {
        let path = self.slot(name);
        let tmp = self.temp_slot(name);
        std::fs::write(&tmp, serde_json::to_vec(value)?)?;
        if let Err(err) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    fn read_or_discard<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, SessionError> {
        let path = self.slot(name);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(slot = name, error = %err, "discarding unreadable session slot");
                self.remove(name)?;
                Ok(None)
            }
        }
    }

    fn remove(&self, name: &str) -> Result<bool, SessionError> {
        match std::fs::remove_file(self.slot(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::{Descriptor, DESCRIPTOR_DIM};
    use tempfile::TempDir;

    fn pending() -> PendingDescriptor {
        PendingDescriptor::new(
            Descriptor::from_raw(vec![0.125; DESCRIPTOR_DIM]),
            Some("/tmp/preview.png".into()),
        )
    }

    #[test]
    fn test_pending_slot_lifecycle() {
        let dir = TempDir::new().unwrap();
        let channel = SessionChannel::open(dir.path().join("session")).unwrap();

        assert_eq!(channel.pending().unwrap(), None);
        let staged = pending();
        channel.stage_pending(&staged).unwrap();
        assert_eq!(channel.pending().unwrap(), Some(staged.clone()));
        // Reading does not consume.
        assert_eq!(channel.pending().unwrap(), Some(staged));

        assert!(channel.clear_pending().unwrap());
        assert!(!channel.clear_pending().unwrap());
        assert_eq!(channel.pending().unwrap(), None);
    }

    #[test]
    fn test_unreadable_pending_is_discarded() {
        let dir = TempDir::new().unwrap();
        let channel = SessionChannel::open(dir.path()).unwrap();
        std::fs::write(dir.path().join(PENDING_FILE), b"{truncated").unwrap();

        assert_eq!(channel.pending().unwrap(), None);
        assert!(!dir.path().join(PENDING_FILE).exists());
    }

    #[test]
    fn test_write_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let channel = SessionChannel::open(dir.path()).unwrap();
        channel.stage_pending(&pending()).unwrap();

        let tmp = channel.temp_slot(PENDING_FILE);
        assert!(tmp
            .to_string_lossy()
            .contains(&std::process::id().to_string()));
        assert!(!tmp.exists());

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, [PENDING_FILE]);
    }

    #[test]
    fn test_sign_in_and_out() {
        let dir = TempDir::new().unwrap();
        let channel = SessionChannel::open(dir.path()).unwrap();
        let identity = Identity::enroll(
            "alice",
            "alice@x.com",
            Descriptor::from_raw(vec![0.0; DESCRIPTOR_DIM]),
        );

        let user = channel.sign_in(&identity).unwrap();
        assert_eq!(user.id, identity.id());
        assert_eq!(channel.current().unwrap(), Some(user));

        assert!(channel.sign_out().unwrap());
        assert_eq!(channel.current().unwrap(), None);
    }
}
