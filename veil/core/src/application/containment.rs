// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Containment Graph Editor
//!
//! Edges are stored once as (container, contained) and read in both
//! directions. Linking copies every member of the contained group into the
//! container and its ancestors as derived rows; unlinking takes back only
//! what no other path still grants.

use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info, warn};

use crate::application::lifecycle::{load_active_group, load_group, load_scoped_group};
use crate::application::propagation::{
    add_aliases_to_related_access_control_groups, collect_ancestors, delete_aliases,
    insert_aliases, remove_aliases_from_related_access_control_groups, retained_aliases,
};
use crate::domain::access_control::{
    ensure_uniform_policy, AccessControlError, AccessControlGroupId, AccessControlSetting,
    MembershipFilter, RequestScope,
};
use crate::domain::identity::AliasId;
use crate::domain::repository::AccessControlTransaction;
use crate::infrastructure::telemetry;

/// Whether adding `container → contained` would close a loop, i.e. the
/// container is already reachable downward from `contained`.
pub async fn would_create_cycle(
    tx: &mut dyn AccessControlTransaction,
    container: AccessControlGroupId,
    contained: AccessControlGroupId,
) -> Result<bool, AccessControlError> {
    if container == contained {
        return Ok(true);
    }

    let mut seen = vec![contained];
    let mut queue = VecDeque::from([contained]);
    while let Some(current) = queue.pop_front() {
        for child in tx.find_contained_group_ids(current).await? {
            if child == container {
                return Ok(true);
            }
            if !seen.contains(&child) {
                seen.push(child);
                queue.push_back(child);
            }
        }
    }
    Ok(false)
}

/// Inserts the edge and pushes every member of `contained` upward as derived
/// rows. Returns whether the edge was new.
pub async fn add_contains_access_control_group(
    tx: &mut dyn AccessControlTransaction,
    container: AccessControlGroupId,
    contained: AccessControlGroupId,
) -> Result<bool, AccessControlError> {
    let container_group = load_group(tx, container).await?;
    load_group(tx, contained).await?;

    if would_create_cycle(tx, container, contained).await? {
        warn!(container = %container, contained = %contained, "Rejected containment cycle");
        return Err(AccessControlError::ContainmentCycle { container, contained });
    }

    let members: Vec<AliasId> = tx
        .find_member_alias_ids(contained, MembershipFilter::All)
        .await?
        .into_iter()
        .collect();

    let inserted = tx.insert_edge(container, contained).await?;
    if inserted {
        telemetry::record_edge_linked();
    }

    insert_aliases(tx, &container_group, &members, false).await?;
    let mut visited = vec![container];
    add_aliases_to_related_access_control_groups(tx, container, &members, &mut visited).await?;

    info!(
        container = %container,
        contained = %contained,
        members = members.len(),
        new_edge = inserted,
        "Linked access control groups"
    );
    Ok(inserted)
}

/// Deletes the edge and removes from the container, then from its ancestors,
/// only the aliases that no remaining child still lists. Returns whether an
/// edge was removed.
pub async fn remove_contains_access_control_group(
    tx: &mut dyn AccessControlTransaction,
    container: AccessControlGroupId,
    contained: AccessControlGroupId,
) -> Result<bool, AccessControlError> {
    let container_group = load_group(tx, container).await?;

    if !tx.find_contained_group_ids(container).await?.contains(&contained) {
        debug!(container = %container, contained = %contained, "No such containment edge");
        return Ok(false);
    }

    let members = tx.find_member_alias_ids(contained, MembershipFilter::All).await?;
    let retained = retained_aliases(tx, &container_group, Some(contained)).await?;
    let to_remove: Vec<AliasId> = members.difference(&retained).copied().collect();

    delete_aliases(tx, &container_group, &to_remove, false).await?;
    let removed = tx.delete_edge(container, contained).await?;
    if removed {
        telemetry::record_edge_unlinked();
    }

    let mut visited = vec![container];
    remove_aliases_from_related_access_control_groups(tx, container, &to_remove, &mut visited)
        .await?;

    info!(
        container = %container,
        contained = %contained,
        removed_aliases = to_remove.len(),
        "Unlinked access control groups"
    );
    Ok(removed)
}

/// Links groups owned by the requesting alias. The container's family
/// (its ancestors, everything below them and below the container) together
/// with each contained group and its descendants must not mix include and
/// exclude lists; on failure no edge is written.
pub async fn link_access_control_groups(
    tx: &mut dyn AccessControlTransaction,
    container: AccessControlGroupId,
    contained: &[AccessControlGroupId],
    requesting_alias_id: AliasId,
) -> Result<(), AccessControlError> {
    let scope = RequestScope::Alias(requesting_alias_id);
    let container_group = load_active_group(tx, container, scope).await?;

    let mut settings = vec![container_group.setting];
    for &id in contained {
        settings.push(load_active_group(tx, id, scope).await?.setting);
    }

    settings.extend(family_settings(tx, container).await?);
    for &id in contained {
        for descendant in collect_descendants(tx, id).await? {
            settings.push(load_group(tx, descendant).await?.setting);
        }
    }

    if let Err(err) = ensure_uniform_policy(settings) {
        warn!(container = %container, "Refusing to link include and exclude groups");
        return Err(err);
    }

    for &id in contained {
        add_contains_access_control_group(tx, container, id).await?;
    }
    Ok(())
}

pub async fn unlink_access_control_groups(
    tx: &mut dyn AccessControlTransaction,
    container: AccessControlGroupId,
    contained: &[AccessControlGroupId],
    requesting_alias_id: AliasId,
) -> Result<(), AccessControlError> {
    let scope = RequestScope::Alias(requesting_alias_id);
    load_scoped_group(tx, container, scope).await?;
    for &id in contained {
        load_scoped_group(tx, id, scope).await?;
    }

    for &id in contained {
        remove_contains_access_control_group(tx, container, id).await?;
    }
    Ok(())
}

pub(crate) async fn collect_descendants(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
) -> Result<BTreeSet<AccessControlGroupId>, AccessControlError> {
    let mut descendants = BTreeSet::new();
    let mut queue = VecDeque::from([id]);
    while let Some(current) = queue.pop_front() {
        for child in tx.find_contained_group_ids(current).await? {
            if child != id && descendants.insert(child) {
                queue.push_back(child);
            }
        }
    }
    Ok(descendants)
}

/// Settings of every group sharing a containment chain with `id`: its
/// ancestors, all of their descendants and the descendants of `id`. The
/// group's own setting is left out.
pub(crate) async fn family_settings(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
) -> Result<Vec<AccessControlSetting>, AccessControlError> {
    let ancestors = collect_ancestors(tx, id, &mut vec![id]).await?;

    let mut family: BTreeSet<AccessControlGroupId> = ancestors.iter().copied().collect();
    for root in ancestors.into_iter().chain(std::iter::once(id)) {
        family.extend(collect_descendants(tx, root).await?);
    }
    family.remove(&id);

    let mut settings = Vec::with_capacity(family.len());
    for member in family {
        settings.push(load_group(tx, member).await?.setting);
    }
    Ok(settings)
}
