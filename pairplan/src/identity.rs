//! User identity: the per-installation user id and account sign-in.
//!
//! [`LocalIdentity`] is the stable id this installation acts as; it is
//! created once and handed to the session view model. [`IdentityProvider`]
//! is the account service seam, with [`MemoryIdentityProvider`] as the
//! in-process implementation.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::state::{self, StateError};

/// File under the state directory holding the local user id.
pub const IDENTITY_FILE: &str = "identity.toml";

/// Shortest password [`MemoryIdentityProvider`] accepts.
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(serde::Serialize, serde::Deserialize)]
struct IdentityFile {
    user_id: String,
}

/// The user id this installation acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    user_id: String,
}

impl LocalIdentity {
    /// Loads the persisted id from `state_dir`, generating and saving a new
    /// one on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the file cannot be read, parsed or written.
    pub fn load_or_create(state_dir: &Path) -> Result<Self, StateError> {
        let path = state_dir.join(IDENTITY_FILE);
        if let Some(file) = state::read_toml::<IdentityFile>(&path)?
            && !file.user_id.trim().is_empty()
        {
            return Ok(Self {
                user_id: file.user_id,
            });
        }
        let user_id = Uuid::new_v4().to_string();
        state::write_toml(
            &path,
            &IdentityFile {
                user_id: user_id.clone(),
            },
        )?;
        tracing::info!(user_id = %user_id, "created local identity");
        Ok(Self { user_id })
    }

    /// Uses a known id without touching disk.
    pub fn from_user_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// The user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Account-service failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// Registration with an email that already has an account.
    #[error("an account with this email already exists")]
    EmailInUse,
    /// The password does not meet the minimum requirements.
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,
    /// The account service could not be reached.
    #[error("network error: {0}")]
    Network(String),
    /// Anything else.
    #[error("authentication failed: {0}")]
    Unknown(String),
}

/// Account sign-in service.
pub trait IdentityProvider: Send + Sync {
    /// Creates an account and signs in, returning the new user id.
    fn register(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<String, AuthError>> + Send;

    /// Signs in, returning the user id.
    fn login(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<String, AuthError>> + Send;

    /// Signs out. Signing out while signed out is a no-op.
    fn logout(&self) -> impl Future<Output = ()> + Send;

    /// The signed-in user id, if any.
    fn current_user(&self) -> Option<String>;
}

struct Account {
    user_id: String,
    salt: String,
    password_hash: String,
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// In-process accounts with salted SHA-256 password hashes.
#[derive(Default)]
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<String>>,
}

impl MemoryIdentityProvider {
    /// Creates a provider with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    async fn register(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(AuthError::Unknown(format!("invalid email address {email:?}")));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }
        let user_id = {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(&email) {
                return Err(AuthError::EmailInUse);
            }
            let salt = Uuid::new_v4().simple().to_string();
            let account = Account {
                user_id: Uuid::new_v4().to_string(),
                password_hash: hash_password(&salt, password),
                salt,
            };
            let user_id = account.user_id.clone();
            accounts.insert(email, account);
            user_id
        };
        *self.current.lock() = Some(user_id.clone());
        tracing::info!(user_id = %user_id, "account registered");
        Ok(user_id)
    }

    async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        let user_id = {
            let accounts = self.accounts.lock();
            let account = accounts.get(&email).ok_or(AuthError::InvalidCredentials)?;
            if hash_password(&account.salt, password) != account.password_hash {
                return Err(AuthError::InvalidCredentials);
            }
            account.user_id.clone()
        };
        *self.current.lock() = Some(user_id.clone());
        tracing::info!(user_id = %user_id, "signed in");
        Ok(user_id)
    }

    async fn logout(&self) {
        if let Some(user_id) = self.current.lock().take() {
            tracing::info!(user_id = %user_id, "signed out");
        }
    }

    fn current_user(&self) -> Option<String> {
        self.current.lock().clone()
    }
}
