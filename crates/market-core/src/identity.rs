//! Caller Identity
//!
//! Authentication happens upstream. By the time a request reaches the
//! marketplace it carries an [`Identity`] that is trusted as-is.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Capability level of a caller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Unknown role names fall back to the least privileged role
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// The authenticated caller of a request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

impl Identity {
    pub fn user(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            role: Role::User,
        }
    }

    pub fn admin(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            role: Role::Admin,
            ..Self::user(user_id, email)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners may act on their own records; admins may act on anyone's
    pub fn can_manage(&self, owner: UserId) -> bool {
        self.user_id == owner || self.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_defaults_to_user() {
        assert_eq!(Role::parse("ADMIN"), Role::Admin);
        assert_eq!(Role::parse("superuser"), Role::User);
    }

    #[test]
    fn test_can_manage() {
        let owner = Identity::user(UserId(1), "a@example.com");
        let other = Identity::user(UserId(2), "b@example.com");
        let admin = Identity::admin(UserId(3), "root@example.com");

        assert!(owner.can_manage(UserId(1)));
        assert!(!other.can_manage(UserId(1)));
        assert!(admin.can_manage(UserId(1)));
    }
}
