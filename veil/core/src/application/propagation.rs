// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Membership Propagation
//!
//! Membership edges come in two flavours: direct rows written by the owner and
//! derived rows written by the engine when a group is contained by another.
//! This module owns both the per-group writes and the upward walks that keep
//! derived rows in sync with the containment graph.
//!
//! ## Safe removal
//!
//! Removing derived rows from ancestors is only correct when no other path
//! still grants the alias. Ancestors are therefore processed children-first
//! and, at each ancestor, an alias is kept while any remaining child group
//! still lists it.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

use crate::application::lifecycle::{load_active_group, load_group, load_scoped_group};
use crate::domain::access_control::{
    AccessControlError, AccessControlGroup, AccessControlGroupId, AccessControlSetting, Membership,
    MembershipFilter, RequestScope,
};
use crate::domain::identity::AliasId;
use crate::domain::repository::AccessControlTransaction;
use crate::infrastructure::telemetry;

pub async fn add_aliases_to_access_control_group(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    scope: RequestScope,
    alias_ids: &[AliasId],
    is_direct: bool,
) -> Result<u64, AccessControlError> {
    let group = load_active_group(tx, id, scope).await?;
    insert_aliases(tx, &group, alias_ids, is_direct).await
}

pub async fn remove_aliases_from_access_control_group(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    scope: RequestScope,
    alias_ids: &[AliasId],
    is_direct: bool,
) -> Result<u64, AccessControlError> {
    let group = load_scoped_group(tx, id, scope).await?;
    delete_aliases(tx, &group, alias_ids, is_direct).await
}

/// Writes one membership row per alias with the given flag. Exclude groups
/// also register the alias's user and never list their own owner.
pub(crate) async fn insert_aliases(
    tx: &mut dyn AccessControlTransaction,
    group: &AccessControlGroup,
    alias_ids: &[AliasId],
    is_direct: bool,
) -> Result<u64, AccessControlError> {
    let mut inserted = 0u64;

    for &alias_id in alias_ids {
        let alias = tx
            .find_alias(alias_id)
            .await?
            .ok_or(AccessControlError::AliasNotFound(alias_id))?;

        if group.setting == AccessControlSetting::SpecificExclude && group.is_owned_by(alias_id) {
            debug!(group_id = %group.id, alias_id = %alias_id, "Owner cannot be excluded, skipping");
            continue;
        }

        let membership = Membership {
            alias_id,
            access_control_group_id: group.id,
            is_direct_member: is_direct,
        };
        if tx.insert_membership(membership).await? {
            inserted += 1;
        }

        if group.setting == AccessControlSetting::SpecificExclude
            && !tx.insert_excluded_user(alias.user_id, group.id).await?
        {
            warn!(
                group_id = %group.id,
                user_id = %alias.user_id,
                alias_id = %alias_id,
                "User already excluded from access control group"
            );
        }
    }

    telemetry::record_memberships_added(inserted, is_direct);
    Ok(inserted)
}

/// Deletes exactly the (alias, group, flag) rows. Exclude groups also drop the
/// user-level registration of each alias's user once the alias holds no row
/// in the group.
pub(crate) async fn delete_aliases(
    tx: &mut dyn AccessControlTransaction,
    group: &AccessControlGroup,
    alias_ids: &[AliasId],
    is_direct: bool,
) -> Result<u64, AccessControlError> {
    let mut removed = 0u64;

    for &alias_id in alias_ids {
        let membership = Membership {
            alias_id,
            access_control_group_id: group.id,
            is_direct_member: is_direct,
        };
        if tx.delete_membership(membership).await? {
            removed += 1;
        }

        // The other flag's row still excludes the user
        if group.setting == AccessControlSetting::SpecificExclude
            && !tx.has_any_member(group.id, &[alias_id]).await?
        {
            match tx.find_alias(alias_id).await? {
                Some(alias) => {
                    tx.delete_excluded_user(alias.user_id, group.id).await?;
                }
                None => {
                    warn!(
                        group_id = %group.id,
                        alias_id = %alias_id,
                        "Alias not found, user-level exclusion left in place"
                    );
                }
            }
        }
    }

    telemetry::record_memberships_removed(removed, is_direct);
    Ok(removed)
}

/// Adds the aliases as derived members of every group above `id`. Groups
/// already in `visited` are skipped and each group reached is appended.
pub async fn add_aliases_to_related_access_control_groups(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    alias_ids: &[AliasId],
    visited: &mut Vec<AccessControlGroupId>,
) -> Result<(), AccessControlError> {
    if alias_ids.is_empty() {
        return Ok(());
    }

    let mut pending = vec![id];
    while let Some(current) = pending.pop() {
        for container_id in tx.find_container_group_ids(current).await? {
            if visited.contains(&container_id) {
                continue;
            }
            visited.push(container_id);

            let container = load_group(tx, container_id).await?;
            insert_aliases(tx, &container, alias_ids, false).await?;
            pending.push(container_id);
        }
    }

    debug!(group_id = %id, reached = visited.len(), "Propagated aliases to related groups");
    Ok(())
}

/// Removes the aliases' derived rows from every group above `id`, keeping any
/// alias another child of that ancestor still grants.
pub async fn remove_aliases_from_related_access_control_groups(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    alias_ids: &[AliasId],
    visited: &mut Vec<AccessControlGroupId>,
) -> Result<(), AccessControlError> {
    if alias_ids.is_empty() {
        return Ok(());
    }

    let ancestors = collect_ancestors(tx, id, visited).await?;
    if ancestors.is_empty() {
        return Ok(());
    }

    for ancestor_id in children_first(tx, &ancestors).await? {
        let ancestor = load_group(tx, ancestor_id).await?;
        let retained = retained_aliases(tx, &ancestor, None).await?;
        let to_remove: Vec<AliasId> = alias_ids
            .iter()
            .copied()
            .filter(|alias_id| !retained.contains(alias_id))
            .collect();

        if to_remove.is_empty() {
            continue;
        }
        let removed = delete_aliases(tx, &ancestor, &to_remove, false).await?;
        debug!(group_id = %ancestor_id, removed, "Removed derived aliases from ancestor");
    }

    info!(group_id = %id, ancestors = ancestors.len(), "Removed aliases from related groups");
    Ok(())
}

/// Aliases a group must keep as derived members: everything its contained
/// groups list (optionally ignoring one of them), plus the owner of an
/// include group.
pub(crate) async fn retained_aliases(
    tx: &mut dyn AccessControlTransaction,
    group: &AccessControlGroup,
    ignoring: Option<AccessControlGroupId>,
) -> Result<BTreeSet<AliasId>, AccessControlError> {
    let mut retained = BTreeSet::new();
    for child_id in tx.find_contained_group_ids(group.id).await? {
        if Some(child_id) == ignoring {
            continue;
        }
        retained.extend(tx.find_member_alias_ids(child_id, MembershipFilter::All).await?);
    }

    if group.setting == AccessControlSetting::SpecificInclude {
        if let Some(owner) = group.belongs_to_alias_id {
            retained.insert(owner);
        }
    }
    Ok(retained)
}

/// Every group reachable upward from `id` that is not already in `visited`,
/// in discovery order. Each one found is appended to `visited`.
pub(crate) async fn collect_ancestors(
    tx: &mut dyn AccessControlTransaction,
    id: AccessControlGroupId,
    visited: &mut Vec<AccessControlGroupId>,
) -> Result<Vec<AccessControlGroupId>, AccessControlError> {
    let mut ancestors = Vec::new();
    let mut queue = VecDeque::from([id]);

    while let Some(current) = queue.pop_front() {
        for container_id in tx.find_container_group_ids(current).await? {
            if visited.contains(&container_id) {
                continue;
            }
            visited.push(container_id);
            ancestors.push(container_id);
            queue.push_back(container_id);
        }
    }
    Ok(ancestors)
}

/// Orders ancestors so that a group comes after every ancestor it contains.
/// Graphs written before the cycle guard existed may loop; the remainder is
/// then appended in discovery order.
async fn children_first(
    tx: &mut dyn AccessControlTransaction,
    ancestors: &[AccessControlGroupId],
) -> Result<Vec<AccessControlGroupId>, AccessControlError> {
    let members: HashSet<AccessControlGroupId> = ancestors.iter().copied().collect();
    let mut blocking: HashMap<AccessControlGroupId, usize> = HashMap::new();
    let mut parents: HashMap<AccessControlGroupId, Vec<AccessControlGroupId>> = HashMap::new();

    for &ancestor in ancestors {
        let children = tx.find_contained_group_ids(ancestor).await?;
        let count = children.iter().filter(|c| members.contains(c)).count();
        blocking.insert(ancestor, count);

        for parent in tx.find_container_group_ids(ancestor).await? {
            if members.contains(&parent) {
                parents.entry(ancestor).or_default().push(parent);
            }
        }
    }

    let mut ready: VecDeque<AccessControlGroupId> = ancestors
        .iter()
        .copied()
        .filter(|a| blocking.get(a) == Some(&0))
        .collect();
    let mut ordered = Vec::with_capacity(ancestors.len());

    while let Some(next) = ready.pop_front() {
        ordered.push(next);
        for parent in parents.get(&next).into_iter().flatten() {
            if let Some(count) = blocking.get_mut(parent) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push_back(*parent);
                }
            }
        }
    }

    if ordered.len() < ancestors.len() {
        warn!(
            remaining = ancestors.len() - ordered.len(),
            "Containment cycle among ancestors, falling back to discovery order"
        );
        let placed: HashSet<AccessControlGroupId> = ordered.iter().copied().collect();
        ordered.extend(ancestors.iter().copied().filter(|a| !placed.contains(a)));
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{Alias, UserId};
    use crate::domain::repository::AccessControlStore;
    use crate::infrastructure::repositories::InMemoryAccessControlStore;

    async fn alias(store: &InMemoryAccessControlStore) -> AliasId {
        let alias = Alias::new(UserId::new());
        let id = alias.id;
        store.register_alias(alias).await;
        id
    }

    async fn group(
        tx: &mut dyn AccessControlTransaction,
        setting: AccessControlSetting,
        owner: Option<AliasId>,
    ) -> AccessControlGroup {
        let group = AccessControlGroup::new(setting, owner, false, None);
        tx.insert_group(&group).await.unwrap();
        group
    }

    #[tokio::test]
    async fn test_insert_aliases_is_idempotent_per_flag() {
        let store = InMemoryAccessControlStore::new();
        let a = alias(&store).await;
        let mut tx = store.begin().await.unwrap();
        let g = group(tx.as_mut(), AccessControlSetting::SpecificInclude, None).await;

        assert_eq!(insert_aliases(tx.as_mut(), &g, &[a], true).await.unwrap(), 1);
        assert_eq!(insert_aliases(tx.as_mut(), &g, &[a], true).await.unwrap(), 0);
        assert_eq!(insert_aliases(tx.as_mut(), &g, &[a], false).await.unwrap(), 1);

        let rows = tx.find_memberships(g.id, MembershipFilter::All).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_unknown_alias() {
        let store = InMemoryAccessControlStore::new();
        let mut tx = store.begin().await.unwrap();
        let g = group(tx.as_mut(), AccessControlSetting::SpecificInclude, None).await;
        let missing = AliasId::new();

        let result = insert_aliases(tx.as_mut(), &g, &[missing], true).await;
        assert!(matches!(result, Err(AccessControlError::AliasNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn test_exclude_registers_user_and_skips_owner() {
        let store = InMemoryAccessControlStore::new();
        let owner = alias(&store).await;
        let user_id = UserId::new();
        let a = Alias::new(user_id);
        let a_id = a.id;
        store.register_alias(a).await;

        let mut tx = store.begin().await.unwrap();
        let g = group(tx.as_mut(), AccessControlSetting::SpecificExclude, Some(owner)).await;

        let inserted = insert_aliases(tx.as_mut(), &g, &[owner, a_id], true).await.unwrap();
        assert_eq!(inserted, 1);
        assert!(tx.is_user_excluded(g.id, user_id).await.unwrap());

        // Duplicate registration is tolerated
        insert_aliases(tx.as_mut(), &g, &[a_id], false).await.unwrap();

        // The derived row keeps the user excluded
        delete_aliases(tx.as_mut(), &g, &[a_id], true).await.unwrap();
        assert!(tx.is_user_excluded(g.id, user_id).await.unwrap());

        delete_aliases(tx.as_mut(), &g, &[a_id], false).await.unwrap();
        assert!(!tx.is_user_excluded(g.id, user_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_ancestors_processed_children_first() {
        let store = InMemoryAccessControlStore::new();
        let mut tx = store.begin().await.unwrap();
        let leaf = group(tx.as_mut(), AccessControlSetting::SpecificInclude, None).await;
        let mid = group(tx.as_mut(), AccessControlSetting::SpecificInclude, None).await;
        let top = group(tx.as_mut(), AccessControlSetting::SpecificInclude, None).await;

        // top contains both mid and leaf; mid contains leaf
        tx.insert_edge(mid.id, leaf.id).await.unwrap();
        tx.insert_edge(top.id, mid.id).await.unwrap();
        tx.insert_edge(top.id, leaf.id).await.unwrap();

        let mut visited = vec![leaf.id];
        let ancestors = collect_ancestors(tx.as_mut(), leaf.id, &mut visited).await.unwrap();
        assert_eq!(ancestors.len(), 2);

        let ordered = children_first(tx.as_mut(), &ancestors).await.unwrap();
        assert_eq!(ordered, vec![mid.id, top.id]);
    }

    #[tokio::test]
    async fn test_legacy_cycle_falls_back_to_discovery_order() {
        let store = InMemoryAccessControlStore::new();
        let mut tx = store.begin().await.unwrap();
        let a = group(tx.as_mut(), AccessControlSetting::Full, None).await;
        let b = group(tx.as_mut(), AccessControlSetting::Full, None).await;
        let c = group(tx.as_mut(), AccessControlSetting::Full, None).await;

        tx.insert_edge(b.id, a.id).await.unwrap();
        tx.insert_edge(c.id, b.id).await.unwrap();
        tx.insert_edge(b.id, c.id).await.unwrap();

        let mut visited = vec![a.id];
        let ancestors = collect_ancestors(tx.as_mut(), a.id, &mut visited).await.unwrap();
        let ordered = children_first(tx.as_mut(), &ancestors).await.unwrap();
        assert_eq!(ordered.len(), 2);
        assert!(ordered.contains(&b.id) && ordered.contains(&c.id));
    }
}
