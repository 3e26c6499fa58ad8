//! Session context read by the stream and the gateway at request time.

use std::{
    fmt, fs, io,
    path::Path,
    sync::{PoisonError, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use rand::Rng;
use tracing::{debug, info};

const DEVICE_SUFFIX_LEN: usize = 9;

/// Credential and device identity, injected instead of read from ambient storage.
pub trait SessionContext: Send + Sync + fmt::Debug {
    /// Current bearer credential, if the operator is signed in.
    fn credential(&self) -> Option<String>;

    /// Stable identifier of this console installation.
    fn device_id(&self) -> String;
}

/// In-process session: a fixed device id and a replaceable credential.
pub struct ConsoleSession {
    device_id: String,
    credential: RwLock<Option<String>>,
}

impl ConsoleSession {
    pub fn new(device_id: impl Into<String>, credential: Option<String>) -> Self {
        Self {
            device_id: device_id.into(),
            credential: RwLock::new(credential),
        }
    }

    /// Loads the device id persisted at `path`, generating and storing one on first use.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read, or cannot be created.
    pub fn persistent(path: &Path, credential: Option<String>) -> io::Result<Self> {
        let stored = match fs::read_to_string(path) {
            Ok(contents) => Some(contents.trim().to_string()).filter(|id| !id.is_empty()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };

        let device_id = if let Some(id) = stored {
            debug!(path = %path.display(), "reusing persisted device id");
            id
        } else {
            let id = generate_device_id();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &id)?;
            info!(path = %path.display(), device_id = %id, "generated device id");
            id
        };

        Ok(Self::new(device_id, credential))
    }

    /// Replaces the credential, e.g. after the operator signs in again.
    pub fn set_credential(&self, credential: Option<String>) {
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credential;
    }
}

impl SessionContext for ConsoleSession {
    fn credential(&self) -> Option<String> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn device_id(&self) -> String {
        self.device_id.clone()
    }
}

impl fmt::Debug for ConsoleSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSession")
            .field("device_id", &self.device_id)
            .field("credential", &self.credential().map(|_| "<redacted>"))
            .finish()
    }
}

/// `device_<unix millis>_<9 base36 chars>`
#[must_use]
pub fn generate_device_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis());
    let mut rng = rand::rng();
    let suffix: String = (0..DEVICE_SUFFIX_LEN)
        .filter_map(|_| char::from_digit(rng.random_range(0..36), 36))
        .collect();
    format!("device_{millis}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn device_id_has_expected_shape() {
        let id = generate_device_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "device");
        assert!(parts[1].parse::<u128>().is_ok());
        assert_eq!(parts[2].len(), DEVICE_SUFFIX_LEN);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn persistent_session_reuses_stored_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("device_id");

        let first = ConsoleSession::persistent(&path, None).unwrap();
        let second = ConsoleSession::persistent(&path, None).unwrap();

        assert_eq!(first.device_id(), second.device_id());
        assert_eq!(fs::read_to_string(&path).unwrap(), first.device_id());
    }

    #[test]
    fn credential_can_be_replaced() {
        let session = ConsoleSession::new("device_1_abc", None);
        assert!(session.credential().is_none());

        session.set_credential(Some("token".into()));
        assert_eq!(session.credential().as_deref(), Some("token"));
    }

    #[test]
    fn debug_output_redacts_credential() {
        let session = ConsoleSession::new("device_1_abc", Some("secret".into()));
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
