// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Permission Evaluator
//!
//! Answers "may this user do X to this entity" against the edit rules and the
//! entity's access control groups. Evaluation never fails: lookup errors are
//! logged and deny.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::access_control::{AccessControlGroup, AccessControlSetting, MembershipFilter};
use crate::domain::content::{AccessControlRefs, CommunityId, GuardedEntity, PermissionAction};
use crate::domain::identity::RequestingUser;
use crate::domain::repository::{AccessControlTransaction, ContentDirectory, RepositoryError};
use crate::infrastructure::telemetry;

pub struct PermissionEvaluator {
    directory: Arc<dyn ContentDirectory>,
}

impl PermissionEvaluator {
    pub fn new(directory: Arc<dyn ContentDirectory>) -> Self {
        Self { directory }
    }

    pub async fn user_has_edit_permissions_for_entity(
        &self,
        entity: &GuardedEntity,
        user: &RequestingUser,
    ) -> bool {
        let allowed = match self.edit_permission(entity, user).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(entity = entity.kind(), user_id = %user.id, error = %e, "Edit permission lookup failed");
                false
            }
        };
        telemetry::record_permission_check("edit", allowed);
        allowed
    }

    async fn edit_permission(
        &self,
        entity: &GuardedEntity,
        user: &RequestingUser,
    ) -> Result<bool, RepositoryError> {
        if !user.authenticated_as_self {
            return Ok(false);
        }
        if user.role.is_elevated() {
            return Ok(true);
        }

        match entity {
            GuardedEntity::Blog(blog) => Ok(user.holds_alias(blog.alias_id)),
            GuardedEntity::BlogPost(post) => {
                if user.holds_alias(post.alias_id) {
                    return Ok(true);
                }
                if let Some(community_id) = post.community_id {
                    if self.moderates(user, community_id).await? {
                        return Ok(true);
                    }
                }
                if let Some(blog_id) = post.blog_id {
                    if let Some(blog) = self.directory.find_blog(blog_id).await? {
                        return Ok(user.holds_alias(blog.alias_id));
                    }
                }
                Ok(false)
            }
            GuardedEntity::Comment(comment) => {
                if user.holds_alias(comment.alias_id) {
                    return Ok(true);
                }
                let root = self.directory.find_blog_post(comment.root_post_id).await?;
                Ok(root.is_some_and(|post| user.holds_alias(post.alias_id)))
            }
            GuardedEntity::Community(community) => self.moderates(user, community.id).await,
            GuardedEntity::AccessControlGroup(group) => Ok(group
                .belongs_to_alias_id
                .is_some_and(|owner| user.holds_alias(owner))),
            GuardedEntity::Other => Ok(true),
        }
    }

    pub async fn user_is_community_moderator(
        &self,
        user: &RequestingUser,
        community_id: CommunityId,
    ) -> bool {
        match self.moderates(user, community_id).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(community_id = %community_id, error = %e, "Moderator lookup failed");
                false
            }
        }
    }

    async fn moderates(
        &self,
        user: &RequestingUser,
        community_id: CommunityId,
    ) -> Result<bool, RepositoryError> {
        if user.role.is_elevated() {
            return Ok(true);
        }
        let moderators = self.directory.find_community_moderators(community_id).await?;
        Ok(user.holds_any_alias(&moderators))
    }

    /// Applies a group's setting to the user. No group means the entity is
    /// not gated.
    pub async fn user_has_security_group_permissions(
        &self,
        tx: &mut dyn AccessControlTransaction,
        user: &RequestingUser,
        group: Option<&AccessControlGroup>,
        entity: &GuardedEntity,
    ) -> bool {
        let Some(group) = group else {
            return true;
        };

        let allowed = match self.group_permission(tx, user, group, entity).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(
                    group_id = %group.id,
                    user_id = %user.id,
                    error = %e,
                    "Access control group lookup failed"
                );
                false
            }
        };
        telemetry::record_permission_check("security_group", allowed);
        allowed
    }

    async fn group_permission(
        &self,
        tx: &mut dyn AccessControlTransaction,
        user: &RequestingUser,
        group: &AccessControlGroup,
        entity: &GuardedEntity,
    ) -> Result<bool, RepositoryError> {
        match group.setting {
            AccessControlSetting::Full => Ok(true),
            AccessControlSetting::Members => match entity {
                GuardedEntity::Community(community) => {
                    self.directory.is_community_member(community.id, &user.alias_ids).await
                }
                _ => Ok(true),
            },
            // TODO: check the follow graph once subscriptions are exposed by the content directory
            AccessControlSetting::Subscribers => Ok(true),
            AccessControlSetting::SpecificInclude => {
                tx.has_any_member(group.id, &user.alias_ids).await
            }
            AccessControlSetting::SpecificExclude => {
                let members = tx.find_member_alias_ids(group.id, MembershipFilter::All).await?;
                if user.alias_ids.iter().any(|a| members.contains(a)) {
                    return Ok(false);
                }
                Ok(!tx.is_user_excluded(group.id, user.id).await?)
            }
        }
    }

    /// Resolves the group guarding `action` on the entity and evaluates it.
    /// Comments are guarded by their root post.
    pub async fn user_can(
        &self,
        tx: &mut dyn AccessControlTransaction,
        user: &RequestingUser,
        action: PermissionAction,
        entity: &GuardedEntity,
    ) -> bool {
        if action == PermissionAction::Edit {
            return self.user_has_edit_permissions_for_entity(entity, user).await;
        }

        let refs = match self.access_refs(entity).await {
            Ok(refs) => refs,
            Err(e) => {
                warn!(entity = entity.kind(), error = %e, "Failed to resolve access control refs");
                return false;
            }
        };
        let Some(group_id) = refs.for_action(action) else {
            debug!(entity = entity.kind(), ?action, "Entity not gated for action");
            return true;
        };

        let group = match tx.find_group(group_id).await {
            Ok(Some(group)) => group,
            Ok(None) => {
                warn!(group_id = %group_id, "Referenced access control group is missing");
                return false;
            }
            Err(e) => {
                warn!(group_id = %group_id, error = %e, "Failed to load access control group");
                return false;
            }
        };

        self.user_has_security_group_permissions(tx, user, Some(&group), entity)
            .await
    }

    async fn access_refs(&self, entity: &GuardedEntity) -> Result<AccessControlRefs, RepositoryError> {
        match entity {
            GuardedEntity::Blog(blog) => Ok(blog.access),
            GuardedEntity::BlogPost(post) => Ok(post.access),
            GuardedEntity::Community(community) => Ok(community.access),
            GuardedEntity::Comment(comment) => self
                .directory
                .find_blog_post(comment.root_post_id)
                .await?
                .map(|post| post.access)
                .ok_or_else(|| {
                    RepositoryError::NotFound(format!("blog post {}", comment.root_post_id))
                }),
            GuardedEntity::AccessControlGroup(_) | GuardedEntity::Other => {
                Ok(AccessControlRefs::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::content::{Blog, BlogId, BlogPost, BlogPostId, Comment, CommentId, Community};
    use crate::domain::identity::{AliasId, UserId, UserRole};
    use crate::infrastructure::repositories::InMemoryContentDirectory;

    fn user(alias_ids: Vec<AliasId>) -> RequestingUser {
        RequestingUser::new(UserId::new(), alias_ids)
    }

    #[tokio::test]
    async fn test_edit_requires_self_authentication() {
        let directory = Arc::new(InMemoryContentDirectory::new());
        let evaluator = PermissionEvaluator::new(directory);
        let alias = AliasId::new();
        let blog = GuardedEntity::Blog(Blog {
            id: BlogId::new(),
            alias_id: alias,
            access: AccessControlRefs::default(),
        });

        let mut owner = user(vec![alias]);
        assert!(evaluator.user_has_edit_permissions_for_entity(&blog, &owner).await);

        owner.authenticated_as_self = false;
        assert!(!evaluator.user_has_edit_permissions_for_entity(&blog, &owner).await);

        let admin = user(vec![]).with_role(UserRole::Admin);
        assert!(evaluator.user_has_edit_permissions_for_entity(&blog, &admin).await);
        assert!(!evaluator.user_has_edit_permissions_for_entity(&blog, &user(vec![])).await);
    }

    #[tokio::test]
    async fn test_edit_post_via_blog_owner_and_moderator() {
        let directory = Arc::new(InMemoryContentDirectory::new());
        let blog_owner = AliasId::new();
        let moderator = AliasId::new();
        let blog = Blog {
            id: BlogId::new(),
            alias_id: blog_owner,
            access: AccessControlRefs::default(),
        };
        let community = Community {
            id: CommunityId::new(),
            access: AccessControlRefs::default(),
        };
        directory.insert_blog(blog.clone()).await;
        directory.insert_community(community.clone()).await;
        directory.add_moderator(community.id, moderator).await;

        let post = BlogPost {
            id: BlogPostId::new(),
            alias_id: AliasId::new(),
            blog_id: Some(blog.id),
            community_id: Some(community.id),
            access: AccessControlRefs::default(),
        };
        directory.insert_blog_post(post.clone()).await;
        let evaluator = PermissionEvaluator::new(directory);
        let entity = GuardedEntity::BlogPost(post.clone());

        assert!(evaluator.user_has_edit_permissions_for_entity(&entity, &user(vec![blog_owner])).await);
        assert!(evaluator.user_has_edit_permissions_for_entity(&entity, &user(vec![moderator])).await);
        assert!(!evaluator.user_has_edit_permissions_for_entity(&entity, &user(vec![AliasId::new()])).await);

        let comment = GuardedEntity::Comment(Comment {
            id: CommentId::new(),
            alias_id: AliasId::new(),
            root_post_id: post.id,
        });
        assert!(evaluator.user_has_edit_permissions_for_entity(&comment, &user(vec![post.alias_id])).await);
        assert!(evaluator.user_is_community_moderator(&user(vec![moderator]), community.id).await);
        assert!(!evaluator.user_is_community_moderator(&user(vec![blog_owner]), community.id).await);
    }

    #[tokio::test]
    async fn test_other_entities_are_editable() {
        let evaluator = PermissionEvaluator::new(Arc::new(InMemoryContentDirectory::new()));
        assert!(evaluator.user_has_edit_permissions_for_entity(&GuardedEntity::Other, &user(vec![])).await);

        let owner = AliasId::new();
        let group = AccessControlGroup::new(AccessControlSetting::Full, Some(owner), false, None);
        let entity = GuardedEntity::AccessControlGroup(group);
        assert!(evaluator.user_has_edit_permissions_for_entity(&entity, &user(vec![owner])).await);
        assert!(!evaluator.user_has_edit_permissions_for_entity(&entity, &user(vec![AliasId::new()])).await);
    }
}
