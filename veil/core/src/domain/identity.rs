// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Identity Value Objects
//!
//! Users act on the platform through one or more aliases (public personas).
//! Aliases are owned by the identity collaborator; the privacy engine only
//! reads them to resolve alias → user when maintaining exclude lists.

use serde::{Deserialize, Serialize};

uuid_identifier!(
    /// Unique identifier for an alias (public persona of a user)
    AliasId
);

uuid_identifier!(
    /// Unique identifier for an account holder
    UserId
);

/// Read-only view of an alias row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub id: AliasId,
    pub user_id: UserId,
}

impl Alias {
    pub fn new(user_id: UserId) -> Self {
        Self { id: AliasId::new(), user_id }
    }
}

/// Platform-wide role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Moderator,
    Admin,
    SuperAdmin,
}

impl UserRole {
    /// Moderators and above bypass ownership rules
    pub fn is_elevated(&self) -> bool {
        !matches!(self, UserRole::User)
    }
}

/// The authenticated user a permission question is asked about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestingUser {
    pub id: UserId,
    pub alias_ids: Vec<AliasId>,
    pub role: UserRole,
    /// `false` when the request is made through an identity the user is not
    /// authenticated as (e.g. an anonymous-mode session).
    pub authenticated_as_self: bool,
}

impl RequestingUser {
    pub fn new(id: UserId, alias_ids: Vec<AliasId>) -> Self {
        Self {
            id,
            alias_ids,
            role: UserRole::User,
            authenticated_as_self: true,
        }
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }

    pub fn holds_alias(&self, alias_id: AliasId) -> bool {
        self.alias_ids.contains(&alias_id)
    }

    pub fn holds_any_alias(&self, alias_ids: &[AliasId]) -> bool {
        self.alias_ids.iter().any(|a| alias_ids.contains(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevated_roles() {
        assert!(!UserRole::User.is_elevated());
        assert!(UserRole::Moderator.is_elevated());
        assert!(UserRole::Admin.is_elevated());
        assert!(UserRole::SuperAdmin.is_elevated());
    }

    #[test]
    fn test_holds_any_alias() {
        let a = AliasId::new();
        let b = AliasId::new();
        let user = RequestingUser::new(UserId::new(), vec![a]);

        assert!(user.holds_alias(a));
        assert!(!user.holds_alias(b));
        assert!(user.holds_any_alias(&[b, a]));
        assert!(!user.holds_any_alias(&[b]));
        assert!(!user.holds_any_alias(&[]));
    }

    #[test]
    fn test_alias_id_parse() {
        let id = AliasId::new();
        let parsed: AliasId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(AliasId::from_string("not-a-uuid").is_err());
    }
}
