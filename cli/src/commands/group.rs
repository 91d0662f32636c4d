// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Access control group administration
//!
//! Commands: create, show, list, edit, delete, add-members, remove-members,
//! link, unlink. Every command runs as one transaction against the
//! configured PostgreSQL database.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use veil_core::application::{PrivacyService, StandardPrivacyService};
use veil_core::domain::access_control::{
    AccessControlGroup, AccessControlGroupDetails, AccessControlGroupEdit, AccessControlGroupId,
    AccessControlSetting, NewAccessControlGroup, RelatedGroup, RequestScope,
};
use veil_core::domain::config::VeilConfig;
use veil_core::domain::identity::AliasId;
use veil_core::domain::repository::StorageBackend;
use veil_core::infrastructure::db::connect_store;
use veil_core::infrastructure::repositories::InMemoryContentDirectory;

#[derive(Subcommand)]
pub enum GroupCommand {
    /// Create an access control group
    Create {
        /// full, subscribers, members, specific_include or specific_exclude
        #[arg(long)]
        setting: String,

        /// Owning alias; omit for community-scoped groups
        #[arg(long, value_name = "ALIAS_ID")]
        owner: Option<AliasId>,

        #[arg(long)]
        name: Option<String>,

        /// Mark as the owner's default group
        #[arg(long)]
        default: bool,

        /// Initial direct members
        #[arg(long = "member", value_name = "ALIAS_ID")]
        members: Vec<AliasId>,
    },

    /// Show a group with its members and containment
    Show {
        #[arg(value_name = "GROUP_ID")]
        id: AccessControlGroupId,

        /// Acting alias (must own the group)
        #[arg(long = "as", value_name = "ALIAS_ID")]
        alias: AliasId,

        /// Only list direct members
        #[arg(long)]
        direct_only: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List groups owned by an alias
    List {
        #[arg(long, value_name = "ALIAS_ID")]
        owner: AliasId,

        /// Include soft-deleted groups
        #[arg(long)]
        all: bool,
    },

    /// Change the setting, name or default flag of a group
    Edit {
        #[arg(value_name = "GROUP_ID")]
        id: AccessControlGroupId,

        #[arg(long = "as", value_name = "ALIAS_ID")]
        alias: AliasId,

        #[arg(long)]
        setting: Option<AccessControlSetting>,

        #[arg(long, conflicts_with = "clear_name")]
        name: Option<String>,

        #[arg(long)]
        clear_name: bool,

        #[arg(long)]
        default: Option<bool>,
    },

    /// Soft-delete a group after severing its containment edges
    Delete {
        #[arg(value_name = "GROUP_ID")]
        id: AccessControlGroupId,

        #[arg(long = "as", value_name = "ALIAS_ID")]
        alias: AliasId,
    },

    /// Add aliases to a group and propagate them to containing groups
    AddMembers {
        #[arg(value_name = "GROUP_ID")]
        id: AccessControlGroupId,

        #[arg(long = "as", value_name = "ALIAS_ID")]
        alias: AliasId,

        #[arg(value_name = "MEMBER_ALIAS_ID", required = true)]
        members: Vec<AliasId>,

        /// Write derived rows instead of direct ones
        #[arg(long)]
        derived: bool,
    },

    /// Remove aliases from a group and from containing groups
    RemoveMembers {
        #[arg(value_name = "GROUP_ID")]
        id: AccessControlGroupId,

        #[arg(long = "as", value_name = "ALIAS_ID")]
        alias: AliasId,

        #[arg(value_name = "MEMBER_ALIAS_ID", required = true)]
        members: Vec<AliasId>,

        #[arg(long)]
        derived: bool,
    },

    /// Make a group contain other groups
    Link {
        #[arg(value_name = "CONTAINER_ID")]
        container: AccessControlGroupId,

        #[arg(long = "as", value_name = "ALIAS_ID")]
        alias: AliasId,

        #[arg(value_name = "CONTAINED_ID", required = true)]
        contained: Vec<AccessControlGroupId>,
    },

    /// Remove containment edges
    Unlink {
        #[arg(value_name = "CONTAINER_ID")]
        container: AccessControlGroupId,

        #[arg(long = "as", value_name = "ALIAS_ID")]
        alias: AliasId,

        #[arg(value_name = "CONTAINED_ID", required = true)]
        contained: Vec<AccessControlGroupId>,
    },
}

pub async fn handle_command(command: GroupCommand, config_override: Option<PathBuf>) -> Result<()> {
    let service = connect_service(config_override).await?;

    match command {
        GroupCommand::Create {
            setting,
            owner,
            name,
            default,
            members,
        } => {
            let mut request = NewAccessControlGroup::parse(&setting, owner)?.with_initial_aliases(members);
            request.name = name;
            request.is_default = default;

            let group = service.create_access_control_group(request).await?;
            println!("{}", format!("✓ Access control group created: {}", group.id).green());
        }
        GroupCommand::Show {
            id,
            alias,
            direct_only,
            json,
        } => {
            let details = service.get_access_control_group(id, alias, direct_only).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&details)?);
            } else {
                print_details(&details);
            }
        }
        GroupCommand::List { owner, all } => {
            let groups = service.get_alias_privacy_groups(owner, !all).await?;
            print_groups(&groups);
        }
        GroupCommand::Edit {
            id,
            alias,
            setting,
            name,
            clear_name,
            default,
        } => {
            let name = if clear_name { Some(None) } else { name.map(Some) };
            let edit = AccessControlGroupEdit {
                setting,
                name,
                is_default: default,
            };
            let group = service
                .edit_access_control_group(id, RequestScope::Alias(alias), edit)
                .await?;
            println!(
                "{}",
                format!("✓ Access control group {} updated ({})", group.id, group.setting).green()
            );
        }
        GroupCommand::Delete { id, alias } => {
            service
                .delete_access_control_group(id, RequestScope::Alias(alias))
                .await?;
            println!("{}", format!("✓ Access control group {} deleted", id).green());
        }
        GroupCommand::AddMembers {
            id,
            alias,
            members,
            derived,
        } => {
            let added = service
                .add_aliases_to_access_control_group(id, RequestScope::Alias(alias), &members, !derived)
                .await?;
            println!("{}", format!("✓ {} membership(s) added to {}", added, id).green());
        }
        GroupCommand::RemoveMembers {
            id,
            alias,
            members,
            derived,
        } => {
            let removed = service
                .remove_aliases_from_access_control_group(
                    id,
                    RequestScope::Alias(alias),
                    &members,
                    !derived,
                )
                .await?;
            println!("{}", format!("✓ {} membership(s) removed from {}", removed, id).green());
        }
        GroupCommand::Link {
            container,
            alias,
            contained,
        } => {
            service
                .link_access_control_groups(container, &contained, alias)
                .await?;
            println!(
                "{}",
                format!("✓ {} now contains {} group(s)", container, contained.len()).green()
            );
        }
        GroupCommand::Unlink {
            container,
            alias,
            contained,
        } => {
            service
                .unlink_access_control_groups(container, &contained, alias)
                .await?;
            println!(
                "{}",
                format!("✓ {} group(s) unlinked from {}", contained.len(), container).green()
            );
        }
    }

    Ok(())
}

async fn connect_service(config_override: Option<PathBuf>) -> Result<StandardPrivacyService> {
    let config = VeilConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let backend = config.storage_backend();
    if matches!(backend, StorageBackend::InMemory) {
        anyhow::bail!(
            "Group commands need a database. Set spec.database.url or VEIL_DATABASE_URL."
        );
    }

    let store = connect_store(&backend)
        .await
        .context("Failed to connect to database")?;
    // Content lookups are not served from the CLI
    let directory = Arc::new(InMemoryContentDirectory::new());
    Ok(StandardPrivacyService::new(store, directory))
}

fn print_groups(groups: &[AccessControlGroup]) {
    if groups.is_empty() {
        println!("{}", "No access control groups found".yellow());
        return;
    }

    println!("{} groups found:", groups.len());
    println!(
        "{:<38} {:<18} {:<20} {:<8} {}",
        "ID", "SETTING", "NAME", "DEFAULT", "CREATED"
    );
    for group in groups {
        let name = group.name.as_deref().unwrap_or("-");
        let row = format!(
            "{:<38} {:<18} {:<20} {:<8} {}",
            group.id,
            group.setting.as_str(),
            name,
            group.is_default,
            group.created_at.format("%Y-%m-%d %H:%M")
        );
        if group.user_deleted {
            println!("{}", row.dimmed());
        } else {
            println!("{}", row);
        }
    }
}

fn print_details(details: &AccessControlGroupDetails) {
    let group = &details.group;
    println!("{} {}", "Group".bold(), group.id);
    println!("  Setting: {}", group.setting);
    println!("  Name: {}", group.name.as_deref().unwrap_or("-"));
    match details.owner_alias_id {
        Some(owner) => println!("  Owner: {}", owner),
        None => println!("  Owner: {}", "(community)".dimmed()),
    }
    if group.user_deleted {
        println!("  {}", "deleted".red());
    }
    println!();

    println!("{}", "Members:".bold());
    if details.memberships.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for membership in &details.memberships {
        let kind = if membership.is_direct_member {
            "direct".normal()
        } else {
            "derived".dimmed()
        };
        println!("  {} {}", membership.alias_id, kind);
    }
    println!();

    print_related("Contains:", &details.contains);
    print_related("Contained by:", &details.belongs_to);
}

fn print_related(title: &str, related: &[RelatedGroup]) {
    println!("{}", title.bold());
    if related.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for entry in related {
        println!(
            "  {} {} ({} members)",
            entry.group.id,
            entry.group.setting,
            entry.member_alias_ids.len()
        );
    }
}
