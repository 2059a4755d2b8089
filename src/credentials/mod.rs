//! Admin JMX credentials shared by the JMX proxy client and the control
//! surface's basic auth.
//!
//! Both consumers hold a clone of the same [`SharedCredentials`] handle, so a
//! single [`SharedCredentials::swap`] done by the [`watcher`] is observed by
//! every future poll and every future HTTP request at once.
use std::sync::{Arc, RwLock};

use tracing::{event, Level};

use crate::error::{Error, Internal, Result};

pub mod watcher;

/// Secret keys holding the admin role name and password
pub const ADMIN_ROLE_KEY: &str = "admin-role";
pub const ADMIN_PASSWORD_KEY: &str = "admin-password";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Credentials are considered loaded once a role name is known
    pub fn is_loaded(&self) -> bool {
        !self.user.is_empty()
    }

    pub fn matches(&self, user: &str, password: &str) -> bool {
        self.is_loaded() && self.user == user && self.password == password
    }
}

// never print the password, not even at trace level
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct SharedCredentials {
    inner: Arc<RwLock<Credentials>>,
}

impl SharedCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            inner: Arc::new(RwLock::new(credentials)),
        }
    }

    /// Returns a copy of the current credentials.
    pub fn current(&self) -> Result<Credentials> {
        match self.inner.read() {
            Ok(guard) => Ok(guard.clone()),
            Err(_) => Err(Error::Internal(Internal::Logic {
                reason: "Unable to acquire read lock for credentials - poisoned...".to_string(),
            })),
        }
    }

    /// Replaces the current credentials. Returns true if they actually changed.
    pub fn swap(&self, credentials: Credentials) -> Result<bool> {
        let mut guard = self.inner.write().map_err(|_| {
            Error::Internal(Internal::Logic {
                reason: "Unable to acquire write lock for credentials - poisoned...".to_string(),
            })
        })?;

        if *guard == credentials {
            return Ok(false);
        }

        event!(Level::INFO, user = %credentials.user, "admin credentials swapped");
        *guard = credentials;
        Ok(true)
    }
}
