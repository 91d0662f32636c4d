// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the privacy engine, following the DDD Repository
//! pattern: interfaces defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Concern | Implementations |
//! |-------|---------|----------------|
//! | `AccessControlStore` | opens transactions | `InMemoryAccessControlStore`, `PostgresAccessControlStore` |
//! | `AccessControlTransaction` | ACG rows, membership edges, containment edges | per store |
//! | `ContentDirectory` | read-only content lookups | `InMemoryContentDirectory` |
//!
//! ## Transactions
//!
//! Every mutating operation receives an explicit `&mut dyn AccessControlTransaction`
//! and threads it through the whole propagation cascade, so a cascade either
//! commits as a unit or not at all. Dropping a transaction without calling
//! `commit` rolls it back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::access_control::{
    AccessControlGroup, AccessControlGroupId, Membership, MembershipFilter,
};
use crate::domain::content::{Blog, BlogId, BlogPost, BlogPostId, Community, CommunityId, RelatedEntity};
use crate::domain::identity::{Alias, AliasId, UserId};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
    pub isolation_level: IsolationLevel,
}

/// Isolation level for read-then-write cascades such as safe removal.
/// Both levels prevent the phantom reads that would let a concurrent edge
/// change slip between reading the graph and acting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::str::FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '-'], "_").as_str() {
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            other => Err(format!("unsupported isolation level: {}", other)),
        }
    }
}

/// Opens transactions against the ACG tables
#[async_trait]
pub trait AccessControlStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn AccessControlTransaction>, RepositoryError>;
}

/// Transaction-scoped access to groups, membership edges, user-level exclude
/// registrations and the containment edge table.
#[async_trait]
pub trait AccessControlTransaction: Send {
    // --- groups ---

    async fn insert_group(&mut self, group: &AccessControlGroup) -> Result<(), RepositoryError>;

    async fn update_group(&mut self, group: &AccessControlGroup) -> Result<(), RepositoryError>;

    async fn find_group(
        &mut self,
        id: AccessControlGroupId,
    ) -> Result<Option<AccessControlGroup>, RepositoryError>;

    /// Groups owned by an alias, newest first
    async fn find_groups_by_owner(
        &mut self,
        alias_id: AliasId,
        include_deleted: bool,
    ) -> Result<Vec<AccessControlGroup>, RepositoryError>;

    // --- aliases (read-only) ---

    async fn find_alias(&mut self, alias_id: AliasId) -> Result<Option<Alias>, RepositoryError>;

    // --- membership edges ---

    /// Inserts the row unless the exact (alias, group, flag) row exists.
    /// Returns whether a row was written.
    async fn insert_membership(&mut self, membership: Membership) -> Result<bool, RepositoryError>;

    /// Deletes exactly the (alias, group, flag) row. Returns whether a row was removed.
    async fn delete_membership(&mut self, membership: Membership) -> Result<bool, RepositoryError>;

    async fn find_memberships(
        &mut self,
        group_id: AccessControlGroupId,
        filter: MembershipFilter,
    ) -> Result<Vec<Membership>, RepositoryError>;

    async fn find_member_alias_ids(
        &mut self,
        group_id: AccessControlGroupId,
        filter: MembershipFilter,
    ) -> Result<BTreeSet<AliasId>, RepositoryError> {
        Ok(self
            .find_memberships(group_id, filter)
            .await?
            .into_iter()
            .map(|m| m.alias_id)
            .collect())
    }

    /// Whether any of the aliases holds a row (direct or derived) in the group
    async fn has_any_member(
        &mut self,
        group_id: AccessControlGroupId,
        alias_ids: &[AliasId],
    ) -> Result<bool, RepositoryError> {
        let members = self.find_member_alias_ids(group_id, MembershipFilter::All).await?;
        Ok(alias_ids.iter().any(|a| members.contains(a)))
    }

    // --- user-level exclude registrations ---

    /// Returns `false` when the user was already registered.
    async fn insert_excluded_user(
        &mut self,
        user_id: UserId,
        group_id: AccessControlGroupId,
    ) -> Result<bool, RepositoryError>;

    async fn delete_excluded_user(
        &mut self,
        user_id: UserId,
        group_id: AccessControlGroupId,
    ) -> Result<bool, RepositoryError>;

    async fn is_user_excluded(
        &mut self,
        group_id: AccessControlGroupId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError>;

    // --- containment edges ---

    /// Returns `false` when the edge already existed.
    async fn insert_edge(
        &mut self,
        container: AccessControlGroupId,
        contained: AccessControlGroupId,
    ) -> Result<bool, RepositoryError>;

    async fn delete_edge(
        &mut self,
        container: AccessControlGroupId,
        contained: AccessControlGroupId,
    ) -> Result<bool, RepositoryError>;

    /// Groups the container contains (`WHERE container_id = ?`)
    async fn find_contained_group_ids(
        &mut self,
        container: AccessControlGroupId,
    ) -> Result<Vec<AccessControlGroupId>, RepositoryError>;

    /// Groups that contain the given group (`WHERE contained_id = ?`)
    async fn find_container_group_ids(
        &mut self,
        contained: AccessControlGroupId,
    ) -> Result<Vec<AccessControlGroupId>, RepositoryError>;

    // --- lifecycle ---

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Read-only lookups into the content controllers' aggregates
#[async_trait]
pub trait ContentDirectory: Send + Sync {
    async fn find_blog(&self, id: BlogId) -> Result<Option<Blog>, RepositoryError>;

    async fn find_community(&self, id: CommunityId) -> Result<Option<Community>, RepositoryError>;

    async fn find_blog_post(&self, id: BlogPostId) -> Result<Option<BlogPost>, RepositoryError>;

    async fn find_community_moderators(
        &self,
        id: CommunityId,
    ) -> Result<Vec<AliasId>, RepositoryError>;

    async fn is_community_member(
        &self,
        id: CommunityId,
        alias_ids: &[AliasId],
    ) -> Result<bool, RepositoryError>;

    /// Reverse lookup of the entity referencing an ACG
    async fn find_entity_by_access_control_group(
        &self,
        id: AccessControlGroupId,
    ) -> Result<Option<RelatedEntity>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_parse() {
        assert_eq!("repeatable read".parse::<IsolationLevel>().unwrap(), IsolationLevel::RepeatableRead);
        assert_eq!("SERIALIZABLE".parse::<IsolationLevel>().unwrap(), IsolationLevel::Serializable);
        assert!("read committed".parse::<IsolationLevel>().is_err());
        assert_eq!(IsolationLevel::default().as_sql(), "REPEATABLE READ");
    }
}
