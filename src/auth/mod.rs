//! Account gate
//!
//! Local sign-up and login against a file-backed credential store, plus the
//! simulated e-mail verification step. Passwords are stored as entered; this
//! gate identifies a user, it does not secure anything.

mod store;

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub use store::{CredentialStore, UserRecord};

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("valid regex"));

/// Rejections shown to the user verbatim
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("All fields are required.")]
    MissingFields,

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("An account with this email already exists.")]
    EmailTaken,

    #[error("This callsign is already taken.")]
    CallsignTaken,

    #[error("Email and password are required.")]
    MissingCredentials,

    #[error("No account found with this email.")]
    UnknownEmail,

    #[error("Incorrect password.")]
    WrongPassword,

    /// The store could not be read or written
    #[error("Account storage is unavailable: {0}")]
    Storage(String),
}

/// Check the shape of an e-mail address
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Simulate sending a verification link
///
/// No mail leaves the machine; the returned notice is what the user sees.
///
/// # Errors
///
/// Returns [`AuthError::InvalidEmail`] if the address is malformed
pub fn request_verification(email: &str) -> Result<String, AuthError> {
    let email = email.trim();
    if !is_valid_email(email) {
        return Err(AuthError::InvalidEmail);
    }
    tracing::info!(email, "verification link requested");
    Ok(format!(
        "A verification link has been sent to {email}. Please check your inbox."
    ))
}
