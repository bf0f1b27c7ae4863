//! User credential records

use crate::error::{DbdockError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a user authenticates against the database server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationType {
    /// Username and password
    Basic,
    /// Anything the server handles itself (integrated, token, ...)
    Other,
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthenticationType::Basic => write!(f, "basic"),
            AuthenticationType::Other => write!(f, "other"),
        }
    }
}

/// Username/password payload for basic authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuthDetails {
    pub username: String,
    /// Whether `password` is encrypted rather than only encoded
    #[serde(default)]
    pub password_encrypted: bool,
    /// Encoded password, see [`secret`](super::secret)
    pub password: String,
}

/// Named credential record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredential {
    pub name: String,
    pub authentication_type: AuthenticationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuthDetails>,
}

impl UserCredential {
    /// Basic-auth credential
    pub fn basic(name: &str, username: &str, password: &str, password_encrypted: bool) -> Self {
        Self {
            name: name.to_string(),
            authentication_type: AuthenticationType::Basic,
            basic_auth: Some(BasicAuthDetails {
                username: username.to_string(),
                password_encrypted,
                password: password.to_string(),
            }),
        }
    }

    /// Check the record's invariants
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DbdockError::Validation(
                "user name must not be empty".to_string(),
            ));
        }

        if self.authentication_type == AuthenticationType::Basic {
            let details = self.basic_auth.as_ref().ok_or_else(|| {
                DbdockError::Validation(format!(
                    "user '{}' uses basic authentication but has no credentials",
                    self.name
                ))
            })?;

            if details.username.is_empty() {
                return Err(DbdockError::Validation(format!(
                    "user '{}' has an empty username",
                    self.name
                )));
            }
            if details.password.is_empty() {
                return Err(DbdockError::Validation(format!(
                    "user '{}' has an empty password",
                    self.name
                )));
            }
        }

        Ok(())
    }
}
