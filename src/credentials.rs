//! Signed-in session persistence in the system keyring
//!
//! The command-line front end runs one command per process, so the session
//! obtained by `clover login` is kept in the keyring between invocations.

use crate::auth::AuthSession;
use crate::error::{CloverError, Result};

/// Keyring service name
pub const KEYRING_SERVICE: &str = "clover";

/// Keyring entry holding the current session
pub const KEYRING_USER: &str = "session";

/// Keyring-backed storage for one [`AuthSession`]
#[derive(Debug, Clone)]
pub struct CredentialStore {
    service: String,
    user: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, KEYRING_USER)
    }
}

impl CredentialStore {
    /// Store under a specific service and entry name
    pub fn new(service: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            user: user.into(),
        }
    }

    /// Load the saved session
    ///
    /// An expired session is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`CloverError::Authentication`] when nothing usable is
    /// stored, or the keyring error when the keyring is unavailable
    pub fn load(&self) -> Result<AuthSession> {
        let entry = keyring::Entry::new(&self.service, &self.user)?;
        let json = match entry.get_password() {
            Ok(json) => json,
            Err(keyring::Error::NoEntry) => return Err(not_signed_in()),
            Err(e) => return Err(e.into()),
        };
        if json.is_empty() {
            return Err(not_signed_in());
        }

        let session: AuthSession = serde_json::from_str(&json)?;
        if session.is_expired() {
            tracing::debug!("Stored session for {} has expired", session.user_label());
            return Err(CloverError::Authentication(
                "Session expired. Run `clover login` again".to_string(),
            ));
        }
        Ok(session)
    }

    /// Save `session`, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns error if the keyring is unavailable
    pub fn save(&self, session: &AuthSession) -> Result<()> {
        let entry = keyring::Entry::new(&self.service, &self.user)?;
        let json = serde_json::to_string(session)?;
        entry.set_password(&json)?;
        tracing::debug!("Saved session for {}", session.user_label());
        Ok(())
    }

    /// Forget the saved session (best-effort)
    pub fn clear(&self) {
        match keyring::Entry::new(&self.service, &self.user) {
            Ok(entry) => match entry.delete_password() {
                Ok(()) | Err(keyring::Error::NoEntry) => {
                    tracing::debug!("Cleared stored session");
                }
                Err(e) => tracing::warn!("Failed to clear stored session: {}", e),
            },
            Err(e) => tracing::warn!("Keyring not available while clearing session: {}", e),
        }
    }
}

fn not_signed_in() -> CloverError {
    CloverError::Authentication("Not signed in. Run `clover login` first".to_string())
}
