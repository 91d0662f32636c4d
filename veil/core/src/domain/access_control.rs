// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Access Control Group Aggregate
//!
//! An access control group (ACG) is a named visibility policy attached to
//! content. Membership is stored per (alias, group, is_direct) so that an
//! alias can be both an explicit member and a member derived through the
//! containment graph at the same time.
//!
//! Groups are never hard-deleted: content rows keep foreign keys to them, so
//! deletion only sets `user_deleted`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::identity::AliasId;
use crate::domain::repository::RepositoryError;

// ============================================================================
// Value Objects
// ============================================================================

uuid_identifier!(
    /// Unique identifier for an access control group
    AccessControlGroupId
);

/// Visibility mode of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessControlSetting {
    /// Everyone may see the content
    Full,
    /// Followers of the owner
    Subscribers,
    /// Members of the community the content lives in
    Members,
    /// Only the listed aliases
    SpecificInclude,
    /// Everyone except the listed aliases
    SpecificExclude,
}

impl AccessControlSetting {
    pub const ALL: [AccessControlSetting; 5] = [
        AccessControlSetting::Full,
        AccessControlSetting::Subscribers,
        AccessControlSetting::Members,
        AccessControlSetting::SpecificInclude,
        AccessControlSetting::SpecificExclude,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessControlSetting::Full => "full",
            AccessControlSetting::Subscribers => "subscribers",
            AccessControlSetting::Members => "members",
            AccessControlSetting::SpecificInclude => "specific_include",
            AccessControlSetting::SpecificExclude => "specific_exclude",
        }
    }

    /// Include/exclude groups list aliases; the other modes ignore membership.
    pub fn lists_members(&self) -> bool {
        matches!(
            self,
            AccessControlSetting::SpecificInclude | AccessControlSetting::SpecificExclude
        )
    }
}

impl std::fmt::Display for AccessControlSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessControlSetting {
    type Err = AccessControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" | "Full" => Ok(AccessControlSetting::Full),
            "subscribers" | "Subscribers" => Ok(AccessControlSetting::Subscribers),
            "members" | "Members" => Ok(AccessControlSetting::Members),
            "specific_include" | "SpecificInclude" => Ok(AccessControlSetting::SpecificInclude),
            "specific_exclude" | "SpecificExclude" => Ok(AccessControlSetting::SpecificExclude),
            other => Err(AccessControlError::InvalidSetting(other.to_string())),
        }
    }
}

/// Fails with `MixedPolicy` when both list modes appear among groups that are
/// about to be linked together.
pub fn ensure_uniform_policy<I>(settings: I) -> Result<(), AccessControlError>
where
    I: IntoIterator<Item = AccessControlSetting>,
{
    let mut include = false;
    let mut exclude = false;
    for setting in settings {
        match setting {
            AccessControlSetting::SpecificInclude => include = true,
            AccessControlSetting::SpecificExclude => exclude = true,
            _ => {}
        }
    }

    if include && exclude {
        return Err(AccessControlError::MixedPolicy);
    }
    Ok(())
}

// ============================================================================
// Aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlGroup {
    pub id: AccessControlGroupId,
    pub setting: AccessControlSetting,
    pub name: Option<String>,
    /// The implicit open policy an owner starts with
    pub is_default: bool,
    /// Administering alias; `None` for community-scoped groups
    pub belongs_to_alias_id: Option<AliasId>,
    pub user_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessControlGroup {
    pub fn new(
        setting: AccessControlSetting,
        belongs_to_alias_id: Option<AliasId>,
        is_default: bool,
        name: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AccessControlGroupId::new(),
            setting,
            name,
            is_default,
            belongs_to_alias_id,
            user_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, alias_id: AliasId) -> bool {
        self.belongs_to_alias_id == Some(alias_id)
    }

    /// Applies an edit and reports which setting transition happened.
    pub fn apply_edit(&mut self, edit: &AccessControlGroupEdit) -> SettingTransition {
        let previous = self.setting;
        if let Some(setting) = edit.setting {
            self.setting = setting;
        }
        if let Some(name) = &edit.name {
            self.name = name.clone();
        }
        if let Some(is_default) = edit.is_default {
            self.is_default = is_default;
        }
        self.updated_at = Utc::now();

        SettingTransition {
            from: previous,
            to: self.setting,
        }
    }

    pub fn mark_deleted(&mut self) {
        self.user_deleted = true;
        self.updated_at = Utc::now();
    }
}

/// Input for creating a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccessControlGroup {
    pub setting: AccessControlSetting,
    pub belongs_to_alias_id: Option<AliasId>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub initial_alias_ids: Vec<AliasId>,
}

impl NewAccessControlGroup {
    pub fn new(setting: AccessControlSetting, belongs_to_alias_id: Option<AliasId>) -> Self {
        Self {
            setting,
            belongs_to_alias_id,
            is_default: false,
            name: None,
            initial_alias_ids: Vec::new(),
        }
    }

    /// Parses the raw setting name received from a collaborator
    pub fn parse(setting: &str, belongs_to_alias_id: Option<AliasId>) -> Result<Self, AccessControlError> {
        Ok(Self::new(setting.parse()?, belongs_to_alias_id))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_initial_aliases(mut self, alias_ids: Vec<AliasId>) -> Self {
        self.initial_alias_ids = alias_ids;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// Who is asking for a group-scoped operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestScope {
    /// Acting alias; only groups it owns are visible
    Alias(AliasId),
    /// Caller authorized the request itself (e.g. community-scoped groups)
    Trusted,
}

impl RequestScope {
    pub fn admits(&self, group: &AccessControlGroup) -> bool {
        match self {
            RequestScope::Alias(alias_id) => group.is_owned_by(*alias_id),
            RequestScope::Trusted => true,
        }
    }
}

impl From<AliasId> for RequestScope {
    fn from(alias_id: AliasId) -> Self {
        RequestScope::Alias(alias_id)
    }
}

/// Partial update of a group. `name: Some(None)` clears the label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlGroupEdit {
    pub setting: Option<AccessControlSetting>,
    pub name: Option<Option<String>>,
    pub is_default: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingTransition {
    pub from: AccessControlSetting,
    pub to: AccessControlSetting,
}

impl SettingTransition {
    pub fn entered(&self, setting: AccessControlSetting) -> bool {
        self.from != setting && self.to == setting
    }
}

// ============================================================================
// Membership
// ============================================================================

/// One row of the alias ↔ group relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Membership {
    pub alias_id: AliasId,
    pub access_control_group_id: AccessControlGroupId,
    pub is_direct_member: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipFilter {
    DirectOnly,
    All,
}

impl MembershipFilter {
    pub fn from_direct_only(direct_only: bool) -> Self {
        if direct_only {
            MembershipFilter::DirectOnly
        } else {
            MembershipFilter::All
        }
    }

    pub fn admits(&self, membership: &Membership) -> bool {
        match self {
            MembershipFilter::DirectOnly => membership.is_direct_member,
            MembershipFilter::All => true,
        }
    }
}

/// A neighbouring group in the containment graph with its member aliases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedGroup {
    pub group: AccessControlGroup,
    pub member_alias_ids: BTreeSet<AliasId>,
}

/// A group loaded together with its membership and both containment directions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlGroupDetails {
    pub group: AccessControlGroup,
    pub owner_alias_id: Option<AliasId>,
    pub memberships: Vec<Membership>,
    /// Groups this one contains
    pub contains: Vec<RelatedGroup>,
    /// Groups that contain this one
    pub belongs_to: Vec<RelatedGroup>,
}

impl AccessControlGroupDetails {
    pub fn member_alias_ids(&self) -> BTreeSet<AliasId> {
        self.memberships.iter().map(|m| m.alias_id).collect()
    }

    pub fn direct_member_alias_ids(&self) -> BTreeSet<AliasId> {
        self.memberships
            .iter()
            .filter(|m| m.is_direct_member)
            .map(|m| m.alias_id)
            .collect()
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum AccessControlError {
    #[error("Invalid access control setting: {0}")]
    InvalidSetting(String),

    #[error("Access control group not found: {0}")]
    NotFound(AccessControlGroupId),

    #[error("Access control group {0} has been deleted")]
    Deleted(AccessControlGroupId),

    #[error("Cannot link specific-include and specific-exclude groups together")]
    MixedPolicy,

    #[error("Alias not found: {0}")]
    AliasNotFound(AliasId),

    #[error("Linking {container} to {contained} would create a containment cycle")]
    ContainmentCycle {
        container: AccessControlGroupId,
        contained: AccessControlGroupId,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
