//! User profile snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::id::UserId;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Profile of the authenticated user, as returned by login and `/auth/profile`.
///
/// Persisted verbatim under the `user` storage key. Unknown fields are ignored
/// and absent optional fields take their defaults, so older snapshots still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Backend id (`_id` on some endpoints).
    #[serde(alias = "_id")]
    pub id: UserId,
    pub name: String,
    /// Kept as a plain string: the backend is the authority on its format.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether this user may use the back-office.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_from_backend_payload() {
        let json = r#"{
            "_id": "6650aa",
            "name": "Lan",
            "email": "lan@example.com",
            "role": "admin",
            "isActive": true,
            "isEmailVerified": false,
            "createdAt": "2025-11-13T03:52:32.416Z",
            "__v": 0
        }"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id.as_str(), "6650aa");
        assert!(user.is_admin());
        assert!(user.is_active);
        assert!(user.created_at.is_some());
        assert!(user.updated_at.is_none());
    }

    #[test]
    fn test_minimal_user_defaults() {
        let user: User = serde_json::from_str(r#"{"id":"u1","name":"Minh"}"#).unwrap();
        assert_eq!(user.role, Role::User);
        assert!(!user.is_admin());
        assert!(user.avatar.is_none());
    }
}
