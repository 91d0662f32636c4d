// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Content Collaborator Types
//!
//! Read-only views of the content aggregates that hold ACG references. Their
//! CRUD lives with the content controllers; the privacy engine only needs the
//! ownership fields and the ACG ids gating each action.

use serde::{Deserialize, Serialize};

use crate::domain::access_control::{AccessControlGroup, AccessControlGroupId};
use crate::domain::identity::AliasId;

uuid_identifier!(
    /// Unique identifier for a blog
    BlogId
);

uuid_identifier!(
    /// Unique identifier for a community
    CommunityId
);

uuid_identifier!(
    /// Unique identifier for a blog post
    BlogPostId
);

uuid_identifier!(
    /// Unique identifier for a comment
    CommentId
);

/// Action a user attempts on a content entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    View,
    Edit,
    Comment,
    React,
    Post,
}

/// ACG ids gating each action on an entity. `None` means ungated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlRefs {
    pub view: Option<AccessControlGroupId>,
    pub comment: Option<AccessControlGroupId>,
    pub react: Option<AccessControlGroupId>,
    pub post: Option<AccessControlGroupId>,
}

impl AccessControlRefs {
    pub fn for_action(&self, action: PermissionAction) -> Option<AccessControlGroupId> {
        match action {
            PermissionAction::View => self.view,
            PermissionAction::Comment => self.comment,
            PermissionAction::React => self.react,
            PermissionAction::Post => self.post,
            PermissionAction::Edit => None,
        }
    }

    pub fn references(&self, id: AccessControlGroupId) -> bool {
        [self.view, self.comment, self.react, self.post]
            .iter()
            .any(|r| *r == Some(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blog {
    pub id: BlogId,
    /// Owning alias
    pub alias_id: AliasId,
    pub access: AccessControlRefs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: CommunityId,
    pub access: AccessControlRefs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: BlogPostId,
    /// Authoring alias
    pub alias_id: AliasId,
    pub blog_id: Option<BlogId>,
    pub community_id: Option<CommunityId>,
    pub access: AccessControlRefs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub alias_id: AliasId,
    pub root_post_id: BlogPostId,
}

/// Any entity a permission question can be asked about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardedEntity {
    Blog(Blog),
    BlogPost(BlogPost),
    Comment(Comment),
    Community(Community),
    AccessControlGroup(AccessControlGroup),
    /// Entities without an ownership concept
    Other,
}

impl GuardedEntity {
    pub fn kind(&self) -> &'static str {
        match self {
            GuardedEntity::Blog(_) => "blog",
            GuardedEntity::BlogPost(_) => "blog_post",
            GuardedEntity::Comment(_) => "comment",
            GuardedEntity::Community(_) => "community",
            GuardedEntity::AccessControlGroup(_) => "access_control_group",
            GuardedEntity::Other => "other",
        }
    }
}

/// Content entity an ACG is attached to, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelatedEntity {
    Blog { blog_id: BlogId },
    Community { community_id: CommunityId },
    BlogPost { blog_post_id: BlogPostId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_for_action() {
        let view = AccessControlGroupId::new();
        let post = AccessControlGroupId::new();
        let refs = AccessControlRefs {
            view: Some(view),
            post: Some(post),
            ..Default::default()
        };

        assert_eq!(refs.for_action(PermissionAction::View), Some(view));
        assert_eq!(refs.for_action(PermissionAction::Post), Some(post));
        assert_eq!(refs.for_action(PermissionAction::Comment), None);
        assert_eq!(refs.for_action(PermissionAction::Edit), None);
        assert!(refs.references(post));
        assert!(!refs.references(AccessControlGroupId::new()));
    }

    #[test]
    fn test_related_entity_serialization() {
        let blog_id = BlogId::new();
        let json = serde_json::to_value(RelatedEntity::Blog { blog_id }).unwrap();
        assert_eq!(json["type"], "blog");
        assert_eq!(json["blog_id"], blog_id.to_string());
    }
}
