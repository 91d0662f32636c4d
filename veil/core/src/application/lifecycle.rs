// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # ACG Lifecycle
//!
//! Create, edit, fetch, list and soft-delete access control groups. Every
//! function takes the caller's transaction so that the rows written here and
//! the membership side effects they trigger commit together.

use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::application::containment;
use crate::application::propagation;
use crate::domain::access_control::{
    ensure_uniform_policy, AccessControlError, AccessControlGroup, AccessControlGroupDetails,
    AccessControlGroupEdit, AccessControlGroupId, AccessControlSetting, MembershipFilter,
    NewAccessControlGroup, RelatedGroup, RequestScope,
};
use crate::domain::content::RelatedEntity;
use crate::domain::identity::AliasId;
use crate::domain::repository::{AccessControlTransaction, ContentDirectory};

/// Loads a group the scope is allowed to see, `NotFound` otherwise.
pub async fn load_scoped_group(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    scope: RequestScope,
) -> Result<AccessControlGroup, AccessControlError> {
    tx.find_group(id)
        .await?
        .filter(|group| scope.admits(group))
        .ok_or(AccessControlError::NotFound(id))
}

/// Like [`load_scoped_group`], but refuses soft-deleted groups. Used by the
/// operations that would grow a group: linking and adding members.
pub async fn load_active_group(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    scope: RequestScope,
) -> Result<AccessControlGroup, AccessControlError> {
    let group = load_scoped_group(tx, id, scope).await?;
    if group.user_deleted {
        return Err(AccessControlError::Deleted(id));
    }
    Ok(group)
}

/// Loads a group regardless of ownership, `NotFound` if the row is missing.
pub(crate) async fn load_group(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
) -> Result<AccessControlGroup, AccessControlError> {
    tx.find_group(id).await?.ok_or(AccessControlError::NotFound(id))
}

pub async fn create_access_control_group(
    tx: &mut dyn AccessControlTransaction,
    request: NewAccessControlGroup,
) -> Result<AccessControlGroup, AccessControlError> {
    let group = AccessControlGroup::new(
        request.setting,
        request.belongs_to_alias_id,
        request.is_default,
        request.name,
    );
    tx.insert_group(&group).await?;

    let owner = group.belongs_to_alias_id;
    match group.setting {
        AccessControlSetting::SpecificInclude => {
            propagation::insert_aliases(tx, &group, &request.initial_alias_ids, true).await?;
            if let Some(owner) = owner {
                if !request.initial_alias_ids.contains(&owner) {
                    propagation::insert_aliases(tx, &group, &[owner], false).await?;
                }
            }
        }
        AccessControlSetting::SpecificExclude => {
            let excluded: Vec<AliasId> = request
                .initial_alias_ids
                .iter()
                .copied()
                .filter(|alias_id| Some(*alias_id) != owner)
                .collect();
            propagation::insert_aliases(tx, &group, &excluded, true).await?;
        }
        _ => {}
    }

    info!(
        group_id = %group.id,
        setting = %group.setting,
        owner = ?owner,
        "Created access control group"
    );
    Ok(group)
}

pub async fn edit_access_control_group(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    scope: RequestScope,
    edit: AccessControlGroupEdit,
) -> Result<AccessControlGroup, AccessControlError> {
    let mut group = load_scoped_group(tx, id, scope).await?;
    if let Some(setting) = edit.setting.filter(|setting| {
        matches!(
            setting,
            AccessControlSetting::SpecificInclude | AccessControlSetting::SpecificExclude
        )
    }) {
        let mut settings = containment::family_settings(tx, id).await?;
        settings.push(setting);
        if let Err(err) = ensure_uniform_policy(settings) {
            warn!(
                group_id = %id,
                setting = %setting,
                "Refusing setting that mixes include and exclude groups"
            );
            return Err(err);
        }
    }
    let transition = group.apply_edit(&edit);
    tx.update_group(&group).await?;

    if let Some(owner) = group.belongs_to_alias_id {
        if transition.entered(AccessControlSetting::SpecificInclude) {
            propagation::insert_aliases(tx, &group, &[owner], false).await?;
            propagation::add_aliases_to_related_access_control_groups(tx, id, &[owner], &mut vec![id])
                .await?;
        } else if transition.entered(AccessControlSetting::SpecificExclude) {
            // An owner cannot exclude themselves
            propagation::delete_aliases(tx, &group, &[owner], true).await?;
            propagation::delete_aliases(tx, &group, &[owner], false).await?;
            propagation::remove_aliases_from_related_access_control_groups(
                tx,
                id,
                &[owner],
                &mut vec![id],
            )
            .await?;
        }
    }

    info!(
        group_id = %group.id,
        from = %transition.from,
        to = %transition.to,
        "Edited access control group"
    );
    Ok(group)
}

pub async fn get_access_control_group(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    requesting_alias_id: AliasId,
    direct_only: bool,
) -> Result<AccessControlGroupDetails, AccessControlError> {
    let group = load_scoped_group(tx, id, RequestScope::Alias(requesting_alias_id)).await?;
    let memberships = tx
        .find_memberships(id, MembershipFilter::from_direct_only(direct_only))
        .await?;

    let contained_ids = tx.find_contained_group_ids(id).await?;
    let contains = load_related_groups(tx, contained_ids).await?;
    let container_ids = tx.find_container_group_ids(id).await?;
    let belongs_to = load_related_groups(tx, container_ids).await?;

    Ok(AccessControlGroupDetails {
        owner_alias_id: group.belongs_to_alias_id,
        group,
        memberships,
        contains,
        belongs_to,
    })
}

async fn load_related_groups(
    tx: &mut dyn AccessControlTransaction,
    ids: Vec<AccessControlGroupId>,
) -> Result<Vec<RelatedGroup>, AccessControlError> {
    let mut related = Vec::with_capacity(ids.len());
    for id in ids {
        let group = load_group(tx, id).await?;
        let member_alias_ids: BTreeSet<AliasId> =
            tx.find_member_alias_ids(id, MembershipFilter::All).await?;
        related.push(RelatedGroup { group, member_alias_ids });
    }
    Ok(related)
}

pub async fn get_alias_privacy_groups(
    tx: &mut dyn AccessControlTransaction,
    alias_id: AliasId,
    hide_deleted: bool,
) -> Result<Vec<AccessControlGroup>, AccessControlError> {
    Ok(tx.find_groups_by_owner(alias_id, !hide_deleted).await?)
}

/// Severs every containment edge of the group, then marks it deleted. The row
/// stays because content entities may still reference it.
pub async fn delete_access_control_group(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    scope: RequestScope,
) -> Result<AccessControlGroup, AccessControlError> {
    let mut group = load_scoped_group(tx, id, scope).await?;
    if group.user_deleted {
        debug!(group_id = %id, "Access control group already deleted");
        return Ok(group);
    }

    for container_id in tx.find_container_group_ids(id).await? {
        containment::remove_contains_access_control_group(tx, container_id, id).await?;
    }
    for contained_id in tx.find_contained_group_ids(id).await? {
        containment::remove_contains_access_control_group(tx, id, contained_id).await?;
    }

    group.mark_deleted();
    tx.update_group(&group).await?;

    info!(group_id = %id, "Soft-deleted access control group");
    Ok(group)
}

pub async fn get_access_control_related_entity(
    directory: &dyn ContentDirectory,
    id: AccessControlGroupId,
) -> Result<Option<RelatedEntity>, AccessControlError> {
    Ok(directory.find_entity_by_access_control_group(id).await?)
}
