// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! This module provides infrastructure implementations of the repository
//! abstractions defined in the domain layer, following the Repository pattern
//! from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve ACG state
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL
//!
//! - **PostgresAccessControlStore** - ACG rows, membership and containment edges
//!
//! ## In-Memory
//!
//! Lightweight implementations for testing and development:
//! - **InMemoryAccessControlStore** - serialized transactions over a working copy
//! - **InMemoryContentDirectory** - blogs, communities and posts registered by hand
//!
//! # Usage
//!
//! ```ignore
//! use veil_core::infrastructure::repositories::PostgresAccessControlStore;
//!
//! let store = PostgresAccessControlStore::new(pool, IsolationLevel::RepeatableRead);
//! let mut tx = store.begin().await?;
//! let group = tx.find_group(group_id).await?;
//! tx.commit().await?;
//! ```

pub mod postgres_access_control;

pub use postgres_access_control::PostgresAccessControlStore;

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::access_control::{
    AccessControlGroup, AccessControlGroupId, Membership, MembershipFilter,
};
use crate::domain::content::{
    Blog, BlogId, BlogPost, BlogPostId, Community, CommunityId, RelatedEntity,
};
use crate::domain::identity::{Alias, AliasId, UserId};
use crate::domain::repository::{
    AccessControlStore, AccessControlTransaction, ContentDirectory, RepositoryError,
};

// ============================================================================
// Access control store
// ============================================================================

#[derive(Debug, Clone, Default)]
struct AccessControlState {
    groups: HashMap<AccessControlGroupId, AccessControlGroup>,
    memberships: BTreeSet<Membership>,
    excluded_users: BTreeSet<(UserId, AccessControlGroupId)>,
    /// (container, contained)
    edges: BTreeSet<(AccessControlGroupId, AccessControlGroupId)>,
    aliases: HashMap<AliasId, Alias>,
}

/// Transactions hold the state lock for their whole lifetime and mutate a
/// working copy that only replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryAccessControlStore {
    state: Arc<Mutex<AccessControlState>>,
}

impl InMemoryAccessControlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an alias owned by the identity collaborator
    pub async fn register_alias(&self, alias: Alias) {
        self.state.lock().await.aliases.insert(alias.id, alias);
    }
}

#[async_trait]
impl AccessControlStore for InMemoryAccessControlStore {
    async fn begin(&self) -> Result<Box<dyn AccessControlTransaction>, RepositoryError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(InMemoryAccessControlTransaction { guard, working }))
    }
}

pub struct InMemoryAccessControlTransaction {
    guard: OwnedMutexGuard<AccessControlState>,
    working: AccessControlState,
}

#[async_trait]
impl AccessControlTransaction for InMemoryAccessControlTransaction {
    async fn insert_group(&mut self, group: &AccessControlGroup) -> Result<(), RepositoryError> {
        self.working.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn update_group(&mut self, group: &AccessControlGroup) -> Result<(), RepositoryError> {
        match self.working.groups.get_mut(&group.id) {
            Some(existing) => {
                *existing = group.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!(
                "Access control group {} not found",
                group.id
            ))),
        }
    }

    async fn find_group(
        &mut self,
        id: AccessControlGroupId,
    ) -> Result<Option<AccessControlGroup>, RepositoryError> {
        Ok(self.working.groups.get(&id).cloned())
    }

    async fn find_groups_by_owner(
        &mut self,
        alias_id: AliasId,
        include_deleted: bool,
    ) -> Result<Vec<AccessControlGroup>, RepositoryError> {
        let mut groups: Vec<AccessControlGroup> = self
            .working
            .groups
            .values()
            .filter(|g| g.is_owned_by(alias_id))
            .filter(|g| include_deleted || !g.user_deleted)
            .cloned()
            .collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(groups)
    }

    async fn find_alias(&mut self, alias_id: AliasId) -> Result<Option<Alias>, RepositoryError> {
        Ok(self.working.aliases.get(&alias_id).cloned())
    }

    async fn insert_membership(&mut self, membership: Membership) -> Result<bool, RepositoryError> {
        Ok(self.working.memberships.insert(membership))
    }

    async fn delete_membership(&mut self, membership: Membership) -> Result<bool, RepositoryError> {
        Ok(self.working.memberships.remove(&membership))
    }

    async fn find_memberships(
        &mut self,
        group_id: AccessControlGroupId,
        filter: MembershipFilter,
    ) -> Result<Vec<Membership>, RepositoryError> {
        Ok(self
            .working
            .memberships
            .iter()
            .filter(|m| m.access_control_group_id == group_id && filter.admits(m))
            .copied()
            .collect())
    }

    async fn insert_excluded_user(
        &mut self,
        user_id: UserId,
        group_id: AccessControlGroupId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.working.excluded_users.insert((user_id, group_id)))
    }

    async fn delete_excluded_user(
        &mut self,
        user_id: UserId,
        group_id: AccessControlGroupId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.working.excluded_users.remove(&(user_id, group_id)))
    }

    async fn is_user_excluded(
        &mut self,
        group_id: AccessControlGroupId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.working.excluded_users.contains(&(user_id, group_id)))
    }

    async fn insert_edge(
        &mut self,
        container: AccessControlGroupId,
        contained: AccessControlGroupId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.working.edges.insert((container, contained)))
    }

    async fn delete_edge(
        &mut self,
        container: AccessControlGroupId,
        contained: AccessControlGroupId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.working.edges.remove(&(container, contained)))
    }

    async fn find_contained_group_ids(
        &mut self,
        container: AccessControlGroupId,
    ) -> Result<Vec<AccessControlGroupId>, RepositoryError> {
        Ok(self
            .working
            .edges
            .iter()
            .filter(|(from, _)| *from == container)
            .map(|(_, to)| *to)
            .collect())
    }

    async fn find_container_group_ids(
        &mut self,
        contained: AccessControlGroupId,
    ) -> Result<Vec<AccessControlGroupId>, RepositoryError> {
        Ok(self
            .working
            .edges
            .iter()
            .filter(|(_, to)| *to == contained)
            .map(|(from, _)| *from)
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let InMemoryAccessControlTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}

// ============================================================================
// Content directory
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryContentDirectory {
    blogs: Arc<RwLock<HashMap<BlogId, Blog>>>,
    communities: Arc<RwLock<HashMap<CommunityId, Community>>>,
    posts: Arc<RwLock<HashMap<BlogPostId, BlogPost>>>,
    moderators: Arc<RwLock<HashMap<CommunityId, Vec<AliasId>>>>,
    members: Arc<RwLock<HashMap<CommunityId, HashSet<AliasId>>>>,
}

impl InMemoryContentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_blog(&self, blog: Blog) {
        self.blogs.write().await.insert(blog.id, blog);
    }

    pub async fn insert_community(&self, community: Community) {
        self.communities.write().await.insert(community.id, community);
    }

    pub async fn insert_blog_post(&self, post: BlogPost) {
        self.posts.write().await.insert(post.id, post);
    }

    pub async fn add_moderator(&self, community_id: CommunityId, alias_id: AliasId) {
        self.moderators
            .write()
            .await
            .entry(community_id)
            .or_default()
            .push(alias_id);
    }

    pub async fn add_community_member(&self, community_id: CommunityId, alias_id: AliasId) {
        self.members
            .write()
            .await
            .entry(community_id)
            .or_default()
            .insert(alias_id);
    }
}

#[async_trait]
impl ContentDirectory for InMemoryContentDirectory {
    async fn find_blog(&self, id: BlogId) -> Result<Option<Blog>, RepositoryError> {
        Ok(self.blogs.read().await.get(&id).cloned())
    }

    async fn find_community(&self, id: CommunityId) -> Result<Option<Community>, RepositoryError> {
        Ok(self.communities.read().await.get(&id).cloned())
    }

    async fn find_blog_post(&self, id: BlogPostId) -> Result<Option<BlogPost>, RepositoryError> {
        Ok(self.posts.read().await.get(&id).cloned())
    }

    async fn find_community_moderators(
        &self,
        id: CommunityId,
    ) -> Result<Vec<AliasId>, RepositoryError> {
        Ok(self.moderators.read().await.get(&id).cloned().unwrap_or_default())
    }

    async fn is_community_member(
        &self,
        id: CommunityId,
        alias_ids: &[AliasId],
    ) -> Result<bool, RepositoryError> {
        let members = self.members.read().await;
        Ok(members
            .get(&id)
            .map(|set| alias_ids.iter().any(|a| set.contains(a)))
            .unwrap_or(false))
    }

    async fn find_entity_by_access_control_group(
        &self,
        id: AccessControlGroupId,
    ) -> Result<Option<RelatedEntity>, RepositoryError> {
        if let Some(blog) = self.blogs.read().await.values().find(|b| b.access.references(id)) {
            return Ok(Some(RelatedEntity::Blog { blog_id: blog.id }));
        }
        if let Some(community) = self
            .communities
            .read()
            .await
            .values()
            .find(|c| c.access.references(id))
        {
            return Ok(Some(RelatedEntity::Community { community_id: community.id }));
        }
        if let Some(post) = self.posts.read().await.values().find(|p| p.access.references(id)) {
            return Ok(Some(RelatedEntity::BlogPost { blog_post_id: post.id }));
        }
        Ok(None)
    }
}
