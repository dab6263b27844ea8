//! Identity states reported by the identity provider.

use crate::UserId;
use serde::{Deserialize, Serialize};

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl User {
    /// Creates a user with only an id.
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            email: None,
            display_name: None,
        }
    }
}

/// The identity currently reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "user", rename_all = "snake_case")]
pub enum AuthIdentity {
    /// Nobody is signed in.
    #[default]
    None,
    /// Local-only guest mode.
    Guest,
    /// A signed-in user.
    Authenticated(User),
    /// The provider is mid-way through changing users.
    Switching,
}

impl AuthIdentity {
    /// Returns the user if authenticated.
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthIdentity::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// True for the `Authenticated` state.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthIdentity::Authenticated(_))
    }
}
