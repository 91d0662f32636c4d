// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for membership propagation and containment editing
//!
//! Every scenario runs through `StandardPrivacyService` on the in-memory
//! store, so each call commits (or rolls back) its own transaction.

use std::collections::BTreeSet;
use std::sync::Arc;

use veil_core::application::containment;
use veil_core::application::{PrivacyService, StandardPrivacyService};
use veil_core::domain::access_control::{
    AccessControlError, AccessControlGroupEdit, AccessControlGroupId, AccessControlSetting,
    NewAccessControlGroup, RequestScope,
};
use veil_core::domain::identity::{Alias, AliasId, UserId};
use veil_core::domain::repository::{AccessControlStore, AccessControlTransaction};
use veil_core::infrastructure::repositories::{InMemoryAccessControlStore, InMemoryContentDirectory};

struct Fixture {
    store: InMemoryAccessControlStore,
    service: StandardPrivacyService,
    owner: AliasId,
}

impl Fixture {
    async fn new() -> Self {
        let store = InMemoryAccessControlStore::new();
        let directory = Arc::new(InMemoryContentDirectory::new());
        let service = StandardPrivacyService::new(Arc::new(store.clone()), directory);
        let mut fixture = Self {
            store,
            service,
            owner: AliasId::new(),
        };
        fixture.owner = fixture.alias().await;
        fixture
    }

    async fn alias(&self) -> AliasId {
        let alias = Alias::new(UserId::new());
        let id = alias.id;
        self.store.register_alias(alias).await;
        id
    }

    async fn group(&self, setting: AccessControlSetting, members: Vec<AliasId>) -> AccessControlGroupId {
        let request = NewAccessControlGroup::new(setting, Some(self.owner)).with_initial_aliases(members);
        self.service
            .create_access_control_group(request)
            .await
            .expect("group should be created")
            .id
    }

    async fn include(&self, members: Vec<AliasId>) -> AccessControlGroupId {
        self.group(AccessControlSetting::SpecificInclude, members).await
    }

    async fn link(&self, container: AccessControlGroupId, contained: AccessControlGroupId) {
        self.service
            .link_access_control_groups(container, &[contained], self.owner)
            .await
            .expect("link should succeed");
    }

    async fn unlink(&self, container: AccessControlGroupId, contained: AccessControlGroupId) {
        self.service
            .unlink_access_control_groups(container, &[contained], self.owner)
            .await
            .expect("unlink should succeed");
    }

    async fn members(&self, id: AccessControlGroupId) -> BTreeSet<AliasId> {
        self.service
            .get_access_control_group(id, self.owner, false)
            .await
            .expect("group should load")
            .member_alias_ids()
    }

    async fn direct_members(&self, id: AccessControlGroupId) -> BTreeSet<AliasId> {
        self.service
            .get_access_control_group(id, self.owner, true)
            .await
            .expect("group should load")
            .direct_member_alias_ids()
    }
}

#[tokio::test]
async fn test_create_include_group_with_members() {
    let f = Fixture::new().await;
    let a2 = f.alias().await;
    let a3 = f.alias().await;

    let g = f.include(vec![a2, a3]).await;
    let details = f.service.get_access_control_group(g, f.owner, false).await.unwrap();

    assert_eq!(details.owner_alias_id, Some(f.owner));
    assert_eq!(details.member_alias_ids(), BTreeSet::from([f.owner, a2, a3]));
    assert_eq!(details.direct_member_alias_ids(), BTreeSet::from([a2, a3]));
}

#[tokio::test]
async fn test_invalid_setting_is_rejected() {
    let f = Fixture::new().await;
    let result = NewAccessControlGroup::parse("friends-only", Some(f.owner));
    assert!(matches!(result, Err(AccessControlError::InvalidSetting(s)) if s == "friends-only"));
}

#[tokio::test]
async fn test_link_then_unlink_restores_container() {
    let f = Fixture::new().await;
    let a2 = f.alias().await;
    let a3 = f.alias().await;

    let g = f.include(vec![a2, a3]).await;
    let h = f.include(vec![]).await;
    let before = f.members(h).await;
    assert_eq!(before, BTreeSet::from([f.owner]));

    f.link(h, g).await;
    assert_eq!(f.members(h).await, BTreeSet::from([f.owner, a2, a3]));
    assert!(f.direct_members(h).await.is_empty());

    let details = f.service.get_access_control_group(h, f.owner, false).await.unwrap();
    assert_eq!(details.contains.len(), 1);
    assert_eq!(details.contains[0].group.id, g);
    assert_eq!(details.contains[0].member_alias_ids, BTreeSet::from([f.owner, a2, a3]));

    let details = f.service.get_access_control_group(g, f.owner, false).await.unwrap();
    assert_eq!(details.belongs_to.len(), 1);
    assert_eq!(details.belongs_to[0].group.id, h);

    f.unlink(h, g).await;
    assert_eq!(f.members(h).await, before);
    assert_eq!(f.members(g).await, BTreeSet::from([f.owner, a2, a3]));
}

#[tokio::test]
async fn test_propagation_reaches_every_ancestor() {
    let f = Fixture::new().await;
    let x = f.alias().await;
    let y = f.alias().await;

    let a = f.include(vec![x]).await;
    let b = f.include(vec![]).await;
    let c = f.include(vec![]).await;

    // Link the upper edge first so the lower link has to walk upward
    f.link(c, b).await;
    f.link(b, a).await;
    assert!(f.members(c).await.contains(&x));

    f.service
        .add_aliases_to_access_control_group(a, RequestScope::Alias(f.owner), &[y], true)
        .await
        .unwrap();
    assert!(f.members(b).await.contains(&y));
    assert!(f.members(c).await.contains(&y));
    assert!(!f.direct_members(c).await.contains(&y));
}

#[tokio::test]
async fn test_safe_removal_keeps_alternative_path() {
    let f = Fixture::new().await;
    let x = f.alias().await;

    let shared = f.include(vec![x]).await;
    let left = f.include(vec![]).await;
    let right = f.include(vec![]).await;
    let top = f.include(vec![]).await;

    f.link(left, shared).await;
    f.link(right, shared).await;
    f.link(top, left).await;
    f.link(top, right).await;
    assert!(f.members(top).await.contains(&x));

    f.unlink(left, shared).await;
    assert!(!f.members(left).await.contains(&x));
    assert!(f.members(right).await.contains(&x));
    assert!(f.members(top).await.contains(&x), "still granted through right");

    f.service
        .remove_aliases_from_access_control_group(shared, RequestScope::Alias(f.owner), &[x], true)
        .await
        .unwrap();
    assert!(!f.members(shared).await.contains(&x));
    assert!(!f.members(right).await.contains(&x));
    assert!(!f.members(top).await.contains(&x));
}

#[tokio::test]
async fn test_sibling_keeps_alias_on_unlink() {
    let f = Fixture::new().await;
    let x = f.alias().await;
    let only_a = f.alias().await;

    let a = f.include(vec![x, only_a]).await;
    let b = f.include(vec![x]).await;
    let parent = f.include(vec![]).await;

    f.link(parent, a).await;
    f.link(parent, b).await;
    f.unlink(parent, a).await;

    let members = f.members(parent).await;
    assert!(members.contains(&x));
    assert!(!members.contains(&only_a));
}

#[tokio::test]
async fn test_add_is_idempotent() {
    let f = Fixture::new().await;
    let x = f.alias().await;
    let g = f.include(vec![]).await;
    let scope = RequestScope::Alias(f.owner);

    assert_eq!(f.service.add_aliases_to_access_control_group(g, scope, &[x], true).await.unwrap(), 1);
    assert_eq!(f.service.add_aliases_to_access_control_group(g, scope, &[x], true).await.unwrap(), 0);

    let details = f.service.get_access_control_group(g, f.owner, false).await.unwrap();
    assert_eq!(details.memberships.iter().filter(|m| m.alias_id == x).count(), 1);
}

#[tokio::test]
async fn test_direct_and_derived_rows_are_independent() {
    let f = Fixture::new().await;
    let x = f.alias().await;
    let child = f.include(vec![x]).await;
    let parent = f.include(vec![x]).await;

    f.link(parent, child).await;
    let details = f.service.get_access_control_group(parent, f.owner, false).await.unwrap();
    assert_eq!(details.memberships.iter().filter(|m| m.alias_id == x).count(), 2);

    f.unlink(parent, child).await;
    assert!(f.direct_members(parent).await.contains(&x));

    f.link(parent, child).await;
    f.service
        .remove_aliases_from_access_control_group(parent, RequestScope::Alias(f.owner), &[x], true)
        .await
        .unwrap();
    assert!(!f.direct_members(parent).await.contains(&x));
    assert!(f.members(parent).await.contains(&x), "derived row survives");
}

#[tokio::test]
async fn test_mixed_policy_link_is_rejected() {
    let f = Fixture::new().await;
    let include = f.include(vec![]).await;
    let exclude = f.group(AccessControlSetting::SpecificExclude, vec![]).await;

    let result = f
        .service
        .link_access_control_groups(include, &[exclude], f.owner)
        .await;
    assert!(matches!(result, Err(AccessControlError::MixedPolicy)));

    let details = f.service.get_access_control_group(include, f.owner, false).await.unwrap();
    assert!(details.contains.is_empty());
}

#[tokio::test]
async fn test_mixed_policy_checks_whole_chain() {
    let f = Fixture::new().await;
    let top = f.include(vec![]).await;
    let middle = f.group(AccessControlSetting::Full, vec![]).await;
    let exclude = f.group(AccessControlSetting::SpecificExclude, vec![]).await;

    f.link(top, middle).await;
    let result = f
        .service
        .link_access_control_groups(middle, &[exclude], f.owner)
        .await;
    assert!(matches!(result, Err(AccessControlError::MixedPolicy)));

    let details = f.service.get_access_control_group(middle, f.owner, false).await.unwrap();
    assert!(details.contains.is_empty());
}

#[tokio::test]
async fn test_mixed_policy_checks_existing_siblings() {
    let f = Fixture::new().await;
    let top = f.group(AccessControlSetting::Full, vec![]).await;
    let include = f.include(vec![]).await;
    let exclude = f.group(AccessControlSetting::SpecificExclude, vec![]).await;

    f.link(top, include).await;
    let result = f
        .service
        .link_access_control_groups(top, &[exclude], f.owner)
        .await;
    assert!(matches!(result, Err(AccessControlError::MixedPolicy)));

    let details = f.service.get_access_control_group(top, f.owner, false).await.unwrap();
    assert_eq!(details.contains.len(), 1);
    assert_eq!(details.contains[0].group.id, include);
}

#[tokio::test]
async fn test_edit_cannot_mix_policies_in_chain() {
    let f = Fixture::new().await;
    let parent = f.include(vec![]).await;
    let child = f.group(AccessControlSetting::Full, vec![]).await;
    f.link(parent, child).await;

    let edit = AccessControlGroupEdit {
        setting: Some(AccessControlSetting::SpecificExclude),
        ..Default::default()
    };
    let result = f
        .service
        .edit_access_control_group(child, RequestScope::Alias(f.owner), edit)
        .await;
    assert!(matches!(result, Err(AccessControlError::MixedPolicy)));

    let details = f.service.get_access_control_group(child, f.owner, false).await.unwrap();
    assert_eq!(details.group.setting, AccessControlSetting::Full);

    // Same mode as the parent is fine
    let edit = AccessControlGroupEdit {
        setting: Some(AccessControlSetting::SpecificInclude),
        ..Default::default()
    };
    let edited = f
        .service
        .edit_access_control_group(child, RequestScope::Alias(f.owner), edit)
        .await
        .unwrap();
    assert_eq!(edited.setting, AccessControlSetting::SpecificInclude);

    // A parent cannot flip against its children either
    let edit = AccessControlGroupEdit {
        setting: Some(AccessControlSetting::SpecificExclude),
        ..Default::default()
    };
    let result = f
        .service
        .edit_access_control_group(parent, RequestScope::Alias(f.owner), edit)
        .await;
    assert!(matches!(result, Err(AccessControlError::MixedPolicy)));
}

#[tokio::test]
async fn test_cycles_are_rejected() {
    let f = Fixture::new().await;
    let a = f.include(vec![]).await;
    let b = f.include(vec![]).await;
    let c = f.include(vec![]).await;

    f.link(a, b).await;
    f.link(b, c).await;

    let result = f.service.link_access_control_groups(c, &[a], f.owner).await;
    assert!(matches!(
        result,
        Err(AccessControlError::ContainmentCycle { container, contained }) if container == c && contained == a
    ));

    let result = f.service.link_access_control_groups(a, &[a], f.owner).await;
    assert!(matches!(result, Err(AccessControlError::ContainmentCycle { .. })));

    let details = f.service.get_access_control_group(c, f.owner, false).await.unwrap();
    assert!(details.contains.is_empty());
}

#[tokio::test]
async fn test_failed_cascade_rolls_back() {
    let f = Fixture::new().await;
    let x = f.alias().await;
    let container = f.include(vec![]).await;
    let fine = f.include(vec![x]).await;
    let looping = f.include(vec![]).await;
    f.link(looping, container).await;

    // The first edge is written before the second one trips the cycle guard
    let result = f
        .service
        .link_access_control_groups(container, &[fine, looping], f.owner)
        .await;
    assert!(matches!(result, Err(AccessControlError::ContainmentCycle { .. })));

    let details = f.service.get_access_control_group(container, f.owner, false).await.unwrap();
    assert!(details.contains.is_empty());
    assert!(!details.member_alias_ids().contains(&x));
    assert!(!f.members(looping).await.contains(&x));
}

#[tokio::test]
async fn test_dropped_transaction_discards_cascade() {
    let f = Fixture::new().await;
    let x = f.alias().await;
    let child = f.include(vec![x]).await;
    let parent = f.include(vec![]).await;

    {
        let mut tx = f.store.begin().await.unwrap();
        containment::add_contains_access_control_group(tx.as_mut(), parent, child)
            .await
            .unwrap();
        assert!(tx.find_contained_group_ids(parent).await.unwrap().contains(&child));
    }

    assert!(!f.members(parent).await.contains(&x));
}

#[tokio::test]
async fn test_scoped_operations_hide_foreign_groups() {
    let f = Fixture::new().await;
    let stranger = f.alias().await;
    let g = f.include(vec![]).await;

    let result = f
        .service
        .add_aliases_to_access_control_group(g, RequestScope::Alias(stranger), &[stranger], true)
        .await;
    assert!(matches!(result, Err(AccessControlError::NotFound(id)) if id == g));

    let result = f.service.link_access_control_groups(g, &[g], stranger).await;
    assert!(matches!(result, Err(AccessControlError::NotFound(_))));

    let result = f
        .service
        .edit_access_control_group(g, RequestScope::Alias(stranger), AccessControlGroupEdit::default())
        .await;
    assert!(matches!(result, Err(AccessControlError::NotFound(_))));
}

#[tokio::test]
async fn test_unknown_alias_is_rejected() {
    let f = Fixture::new().await;
    let g = f.include(vec![]).await;

    let result = f
        .service
        .add_aliases_to_access_control_group(g, RequestScope::Alias(f.owner), &[AliasId::new()], true)
        .await;
    assert!(matches!(result, Err(AccessControlError::AliasNotFound(_))));
}

#[tokio::test]
async fn test_soft_delete_severs_edges() {
    let f = Fixture::new().await;
    let x = f.alias().await;
    let child = f.include(vec![x]).await;
    let parent = f.include(vec![]).await;
    f.link(parent, child).await;

    let deleted = f
        .service
        .delete_access_control_group(child, RequestScope::Alias(f.owner))
        .await
        .unwrap();
    assert!(deleted.user_deleted);

    let parent_details = f.service.get_access_control_group(parent, f.owner, false).await.unwrap();
    assert!(parent_details.contains.is_empty());
    assert!(!parent_details.member_alias_ids().contains(&x));

    // Row is kept and still reachable by its owner
    let child_details = f.service.get_access_control_group(child, f.owner, false).await.unwrap();
    assert!(child_details.group.user_deleted);
    assert!(child_details.member_alias_ids().contains(&x));

    let listed = f.service.get_alias_privacy_groups(f.owner, true).await.unwrap();
    assert!(listed.iter().all(|g| g.id != child));

    // Deleting twice is a no-op
    f.service
        .delete_access_control_group(child, RequestScope::Alias(f.owner))
        .await
        .unwrap();

    // A deleted group cannot grow again
    let result = f.service.link_access_control_groups(parent, &[child], f.owner).await;
    assert!(matches!(result, Err(AccessControlError::Deleted(id)) if id == child));
    let result = f.service.link_access_control_groups(child, &[parent], f.owner).await;
    assert!(matches!(result, Err(AccessControlError::Deleted(id)) if id == child));
    let result = f
        .service
        .add_aliases_to_access_control_group(child, RequestScope::Alias(f.owner), &[x], false)
        .await;
    assert!(matches!(result, Err(AccessControlError::Deleted(id)) if id == child));
    assert!(f.direct_members(parent).await.is_empty());
}

#[tokio::test]
async fn test_edit_transitions_move_owner_upward() {
    let f = Fixture::new().await;
    let child = f.group(AccessControlSetting::Full, vec![]).await;

    // A parent administered by someone else, linked without scoping
    let other_owner = f.alias().await;
    let parent = f
        .service
        .create_access_control_group(NewAccessControlGroup::new(
            AccessControlSetting::Full,
            Some(other_owner),
        ))
        .await
        .unwrap()
        .id;
    let mut tx = f.store.begin().await.unwrap();
    containment::add_contains_access_control_group(tx.as_mut(), parent, child)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let edit = AccessControlGroupEdit {
        setting: Some(AccessControlSetting::SpecificInclude),
        ..Default::default()
    };
    f.service
        .edit_access_control_group(child, RequestScope::Alias(f.owner), edit)
        .await
        .unwrap();
    let parent_details = f
        .service
        .get_access_control_group(parent, other_owner, false)
        .await
        .unwrap();
    assert!(parent_details.member_alias_ids().contains(&f.owner));

    let edit = AccessControlGroupEdit {
        setting: Some(AccessControlSetting::SpecificExclude),
        name: Some(Some("everyone but".to_string())),
        ..Default::default()
    };
    let edited = f
        .service
        .edit_access_control_group(child, RequestScope::Alias(f.owner), edit)
        .await
        .unwrap();
    assert_eq!(edited.name.as_deref(), Some("everyone but"));
    assert!(f.members(child).await.is_empty());

    let parent_details = f
        .service
        .get_access_control_group(parent, other_owner, false)
        .await
        .unwrap();
    assert!(!parent_details.member_alias_ids().contains(&f.owner));
}
