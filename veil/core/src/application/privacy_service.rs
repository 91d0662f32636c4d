// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Privacy Application Service
//!
//! Entry point for callers that do not manage transactions themselves. Each
//! operation opens one transaction on the store, runs the matching
//! transaction-scoped function from `lifecycle`, `propagation` or
//! `containment`, then commits on success and rolls back on error.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::permission::PermissionEvaluator;
use crate::application::{containment, lifecycle, propagation};
use crate::domain::access_control::{
    AccessControlError, AccessControlGroup, AccessControlGroupDetails, AccessControlGroupEdit,
    AccessControlGroupId, MembershipFilter, NewAccessControlGroup, RequestScope,
};
use crate::domain::content::{GuardedEntity, PermissionAction, RelatedEntity};
use crate::domain::identity::{AliasId, RequestingUser};
use crate::domain::repository::{AccessControlStore, AccessControlTransaction, ContentDirectory};

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait PrivacyService: Send + Sync {
    async fn create_access_control_group(
        &self,
        request: NewAccessControlGroup,
    ) -> Result<AccessControlGroup, AccessControlError>;

    async fn edit_access_control_group(
        &self,
        id: AccessControlGroupId,
        scope: RequestScope,
        edit: AccessControlGroupEdit,
    ) -> Result<AccessControlGroup, AccessControlError>;

    /// Group with memberships and both containment directions
    async fn get_access_control_group(
        &self,
        id: AccessControlGroupId,
        requesting_alias_id: AliasId,
        direct_only: bool,
    ) -> Result<AccessControlGroupDetails, AccessControlError>;

    /// Groups owned by an alias, newest first
    async fn get_alias_privacy_groups(
        &self,
        alias_id: AliasId,
        hide_deleted: bool,
    ) -> Result<Vec<AccessControlGroup>, AccessControlError>;

    /// Soft delete; severs containment edges first
    async fn delete_access_control_group(
        &self,
        id: AccessControlGroupId,
        scope: RequestScope,
    ) -> Result<AccessControlGroup, AccessControlError>;

    /// Adds aliases to a group and to every group above it
    async fn add_aliases_to_access_control_group(
        &self,
        id: AccessControlGroupId,
        scope: RequestScope,
        alias_ids: &[AliasId],
        is_direct: bool,
    ) -> Result<u64, AccessControlError>;

    /// Removes aliases from a group, then safely from every group above it
    async fn remove_aliases_from_access_control_group(
        &self,
        id: AccessControlGroupId,
        scope: RequestScope,
        alias_ids: &[AliasId],
        is_direct: bool,
    ) -> Result<u64, AccessControlError>;

    async fn link_access_control_groups(
        &self,
        container: AccessControlGroupId,
        contained: &[AccessControlGroupId],
        requesting_alias_id: AliasId,
    ) -> Result<(), AccessControlError>;

    async fn unlink_access_control_groups(
        &self,
        container: AccessControlGroupId,
        contained: &[AccessControlGroupId],
        requesting_alias_id: AliasId,
    ) -> Result<(), AccessControlError>;

    async fn get_access_control_related_entity(
        &self,
        id: AccessControlGroupId,
    ) -> Result<Option<RelatedEntity>, AccessControlError>;

    /// Never fails; any error denies
    async fn user_can(
        &self,
        user: &RequestingUser,
        action: PermissionAction,
        entity: &GuardedEntity,
    ) -> bool;
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardPrivacyService {
    store: Arc<dyn AccessControlStore>,
    directory: Arc<dyn ContentDirectory>,
    evaluator: PermissionEvaluator,
}

impl StandardPrivacyService {
    pub fn new(store: Arc<dyn AccessControlStore>, directory: Arc<dyn ContentDirectory>) -> Self {
        Self {
            evaluator: PermissionEvaluator::new(directory.clone()),
            store,
            directory,
        }
    }

    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }
}

/// Commits on success, rolls back on error. A failed rollback is logged and
/// the original error is returned.
async fn finish<T>(
    tx: Box<dyn AccessControlTransaction>,
    result: Result<T, AccessControlError>,
    operation: &'static str,
) -> Result<T, AccessControlError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            warn!(operation, error = %e, "Rolling back privacy operation");
            if let Err(rollback_err) = tx.rollback().await {
                error!(operation, error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}

#[async_trait]
impl PrivacyService for StandardPrivacyService {
    async fn create_access_control_group(
        &self,
        request: NewAccessControlGroup,
    ) -> Result<AccessControlGroup, AccessControlError> {
        let mut tx = self.store.begin().await?;
        let result = lifecycle::create_access_control_group(tx.as_mut(), request).await;
        finish(tx, result, "create_access_control_group").await
    }

    async fn edit_access_control_group(
        &self,
        id: AccessControlGroupId,
        scope: RequestScope,
        edit: AccessControlGroupEdit,
    ) -> Result<AccessControlGroup, AccessControlError> {
        let mut tx = self.store.begin().await?;
        let result = lifecycle::edit_access_control_group(tx.as_mut(), id, scope, edit).await;
        finish(tx, result, "edit_access_control_group").await
    }

    async fn get_access_control_group(
        &self,
        id: AccessControlGroupId,
        requesting_alias_id: AliasId,
        direct_only: bool,
    ) -> Result<AccessControlGroupDetails, AccessControlError> {
        let mut tx = self.store.begin().await?;
        let result =
            lifecycle::get_access_control_group(tx.as_mut(), id, requesting_alias_id, direct_only)
                .await;
        finish(tx, result, "get_access_control_group").await
    }

    async fn get_alias_privacy_groups(
        &self,
        alias_id: AliasId,
        hide_deleted: bool,
    ) -> Result<Vec<AccessControlGroup>, AccessControlError> {
        let mut tx = self.store.begin().await?;
        let result = lifecycle::get_alias_privacy_groups(tx.as_mut(), alias_id, hide_deleted).await;
        finish(tx, result, "get_alias_privacy_groups").await
    }

    async fn delete_access_control_group(
        &self,
        id: AccessControlGroupId,
        scope: RequestScope,
    ) -> Result<AccessControlGroup, AccessControlError> {
        let mut tx = self.store.begin().await?;
        let result = lifecycle::delete_access_control_group(tx.as_mut(), id, scope).await;
        finish(tx, result, "delete_access_control_group").await
    }

    async fn add_aliases_to_access_control_group(
        &self,
        id: AccessControlGroupId,
        scope: RequestScope,
        alias_ids: &[AliasId],
        is_direct: bool,
    ) -> Result<u64, AccessControlError> {
        let mut tx = self.store.begin().await?;
        let result = add_and_propagate(tx.as_mut(), id, scope, alias_ids, is_direct).await;
        let added = finish(tx, result, "add_aliases_to_access_control_group").await?;
        info!(group_id = %id, added, "Added aliases to access control group");
        Ok(added)
    }

    async fn remove_aliases_from_access_control_group(
        &self,
        id: AccessControlGroupId,
        scope: RequestScope,
        alias_ids: &[AliasId],
        is_direct: bool,
    ) -> Result<u64, AccessControlError> {
        let mut tx = self.store.begin().await?;
        let result = remove_and_propagate(tx.as_mut(), id, scope, alias_ids, is_direct).await;
        let removed = finish(tx, result, "remove_aliases_from_access_control_group").await?;
        info!(group_id = %id, removed, "Removed aliases from access control group");
        Ok(removed)
    }

    async fn link_access_control_groups(
        &self,
        container: AccessControlGroupId,
        contained: &[AccessControlGroupId],
        requesting_alias_id: AliasId,
    ) -> Result<(), AccessControlError> {
        let mut tx = self.store.begin().await?;
        let result = containment::link_access_control_groups(
            tx.as_mut(),
            container,
            contained,
            requesting_alias_id,
        )
        .await;
        finish(tx, result, "link_access_control_groups").await
    }

    async fn unlink_access_control_groups(
        &self,
        container: AccessControlGroupId,
        contained: &[AccessControlGroupId],
        requesting_alias_id: AliasId,
    ) -> Result<(), AccessControlError> {
        let mut tx = self.store.begin().await?;
        let result = containment::unlink_access_control_groups(
            tx.as_mut(),
            container,
            contained,
            requesting_alias_id,
        )
        .await;
        finish(tx, result, "unlink_access_control_groups").await
    }

    async fn get_access_control_related_entity(
        &self,
        id: AccessControlGroupId,
    ) -> Result<Option<RelatedEntity>, AccessControlError> {
        lifecycle::get_access_control_related_entity(self.directory.as_ref(), id).await
    }

    async fn user_can(
        &self,
        user: &RequestingUser,
        action: PermissionAction,
        entity: &GuardedEntity,
    ) -> bool {
        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                warn!(error = %e, "Could not open transaction for permission check");
                return false;
            }
        };
        let allowed = self.evaluator.user_can(tx.as_mut(), user, action, entity).await;
        if let Err(e) = tx.rollback().await {
            warn!(error = %e, "Failed to release permission check transaction");
        }
        allowed
    }
}

async fn add_and_propagate(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    scope: RequestScope,
    alias_ids: &[AliasId],
    is_direct: bool,
) -> Result<u64, AccessControlError> {
    let added =
        propagation::add_aliases_to_access_control_group(tx, id, scope, alias_ids, is_direct)
            .await?;

    // Only what actually landed in the group travels upward
    let members = tx.find_member_alias_ids(id, MembershipFilter::All).await?;
    let landed: Vec<AliasId> = alias_ids
        .iter()
        .copied()
        .filter(|alias_id| members.contains(alias_id))
        .collect();
    propagation::add_aliases_to_related_access_control_groups(tx, id, &landed, &mut vec![id])
        .await?;
    Ok(added)
}

async fn remove_and_propagate(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    scope: RequestScope,
    alias_ids: &[AliasId],
    is_direct: bool,
) -> Result<u64, AccessControlError> {
    let removed =
        propagation::remove_aliases_from_access_control_group(tx, id, scope, alias_ids, is_direct)
            .await?;
    propagation::remove_aliases_from_related_access_control_groups(tx, id, alias_ids, &mut vec![id])
        .await?;
    Ok(removed)
}
