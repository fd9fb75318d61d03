//! Auth collaborator interface
//!
//! The messaging core never stores the current user itself: it re-derives the
//! live identity from an [`AuthContext`] on every operation, because a profile
//! refresh can change the display name mid-session. The context is an explicit
//! capability: embedders without an authenticated session plug in
//! [`DisabledAuth`] and every engine action fails fast before side effects.

use serde::{Deserialize, Serialize};

/// Profile snapshot for one identity in the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable identity id (never the display name)
    pub id: String,
    /// Human-readable display name
    pub display_name: String,
    /// Avatar image reference, if any
    pub avatar_url: Option<String>,
    /// Account email, if known
    pub email: Option<String>,
    /// Account role, if known
    pub role: Option<String>,
}

impl UserProfile {
    /// Create a minimal profile from a bare identity id
    ///
    /// Used when a message arrives from a counterpart the client has no
    /// directory entry for yet; a later directory refresh fills in the rest.
    pub fn bare(id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: id.to_string(),
            avatar_url: None,
            email: None,
            role: None,
        }
    }

    /// Merge fields from another snapshot of the same identity
    ///
    /// A sparser update never erases previously known fields.
    pub fn merge_from(&mut self, other: &UserProfile) {
        if !other.display_name.is_empty() && other.display_name != other.id {
            self.display_name = other.display_name.clone();
        }
        if other.avatar_url.is_some() {
            self.avatar_url = other.avatar_url.clone();
        }
        if other.email.is_some() {
            self.email = other.email.clone();
        }
        if other.role.is_some() {
            self.role = other.role.clone();
        }
    }
}

/// Capability interface supplying the current authenticated identity
pub trait AuthContext: Send + Sync {
    /// The live current user, or `None` when no session is active
    fn current_user(&self) -> Option<UserProfile>;

    /// Bearer/session token for REST calls, if any
    fn token(&self) -> Option<String>;
}

/// Null-object auth context: no identity, no token
///
/// With this context installed the engine is effectively disabled: every
/// public action returns [`crate::Error::Auth`] before any side effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAuth;

impl AuthContext for DisabledAuth {
    fn current_user(&self) -> Option<UserProfile> {
        None
    }

    fn token(&self) -> Option<String> {
        None
    }
}

/// Fixed-identity auth context for tests and single-user embedders
#[derive(Debug, Clone)]
pub struct StaticAuth {
    user: UserProfile,
    token: Option<String>,
}

impl StaticAuth {
    /// Create a context that always resolves to the given profile
    pub fn new(user: UserProfile) -> Self {
        Self { user, token: None }
    }

    /// Attach a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl AuthContext for StaticAuth {
    fn current_user(&self) -> Option<UserProfile> {
        Some(self.user.clone())
    }

    fn token(&self) -> Option<String> {
        self.token.clone()
    }
}
