//! File-backed credential store

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{AuthError, is_valid_email};

/// File name inside the data directory
const USERS_FILE: &str = "users.json";

/// One registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub email: String,
    pub password: String,
    pub callsign: String,
}

/// Accounts persisted as a single JSON array
///
/// The file is read whole on every operation and replaced atomically on
/// write, so a failed write never leaves a partial file behind.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store under `data_dir`
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(USERS_FILE),
        }
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All registered accounts; empty if the file does not exist yet
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the file cannot be read or parsed
    pub fn users(&self) -> Result<Vec<UserRecord>, AuthError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AuthError::Storage(e.to_string())),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "credential store is corrupt");
            AuthError::Storage(e.to_string())
        })
    }

    /// Register a new account and return its callsign
    ///
    /// # Errors
    ///
    /// Returns the first failing check: missing field, malformed e-mail,
    /// e-mail already registered, callsign taken (case-insensitive), or a
    /// storage failure
    pub fn signup(&self, email: &str, password: &str, callsign: &str) -> Result<String, AuthError> {
        if callsign.trim().is_empty() || email.trim().is_empty() || password.trim().is_empty() {
            return Err(AuthError::MissingFields);
        }
        if !is_valid_email(email) {
            return Err(AuthError::InvalidEmail);
        }

        let mut users = self.users()?;
        if users.iter().any(|u| u.email == email) {
            return Err(AuthError::EmailTaken);
        }
        if users
            .iter()
            .any(|u| u.callsign.to_lowercase() == callsign.to_lowercase())
        {
            return Err(AuthError::CallsignTaken);
        }

        users.push(UserRecord {
            email: email.to_string(),
            password: password.to_string(),
            callsign: callsign.to_string(),
        });
        self.save(&users)?;

        tracing::info!(callsign, "account created");
        Ok(callsign.to_string())
    }

    /// Check credentials and return the account's callsign
    ///
    /// # Errors
    ///
    /// Returns the first failing check: missing field, unknown e-mail, wrong
    /// password, or a storage failure
    pub fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        if email.trim().is_empty() || password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let users = self.users()?;
        let user = users
            .into_iter()
            .find(|u| u.email == email)
            .ok_or(AuthError::UnknownEmail)?;
        if user.password != password {
            return Err(AuthError::WrongPassword);
        }

        tracing::info!(callsign = %user.callsign, "logged in");
        Ok(user.callsign)
    }

    fn save(&self, users: &[UserRecord]) -> Result<(), AuthError> {
        let storage = |e: &dyn std::fmt::Display| AuthError::Storage(e.to_string());
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| storage(&e))?;

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| storage(&e))?;
        serde_json::to_writer_pretty(&mut file, users).map_err(|e| storage(&e))?;
        file.flush().map_err(|e| storage(&e))?;
        file.persist(&self.path).map_err(|e| storage(&e))?;

        tracing::debug!(path = %self.path.display(), users = users.len(), "credential store saved");
        Ok(())
    }
}
