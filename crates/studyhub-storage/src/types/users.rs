//! User and whitelist types.

use chrono::{DateTime, Utc};

use super::UserId;

/// User record
#[derive(Clone, Debug)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub password_hash: String, // Argon2id PHC string
    pub bio: Option<String>,
    pub github_url: Option<String>,
    pub blog_url: Option<String>,
    pub verified: bool, // Email matched the whitelist at registration
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a user
#[derive(Clone, Debug)]
pub struct CreateUserParams {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub verified: bool,
}

/// Profile fields a user may change. `None` leaves the field untouched.
#[derive(Clone, Debug, Default)]
pub struct UpdateProfileParams {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub github_url: Option<String>,
    pub blog_url: Option<String>,
}

impl UpdateProfileParams {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.bio.is_none()
            && self.github_url.is_none()
            && self.blog_url.is_none()
    }
}

/// Email address allowed to register
#[derive(Clone, Debug)]
pub struct WhitelistEntry {
    pub email: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
