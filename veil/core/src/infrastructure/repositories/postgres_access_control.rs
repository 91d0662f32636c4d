// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Access Control
//!
//! PostgreSQL implementation of the ACG store. Every transaction is opened at
//! the configured isolation level; all statements run on the same
//! `sqlx::Transaction` so a propagation cascade commits or rolls back as one.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements postgres access control persistence
//!
//! Tables (see `cli/migrations`): `access_control_groups`,
//! `access_control_group_aliases`, `access_control_group_users`,
//! `access_control_group_edges`, plus the collaborator-owned `aliases`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::domain::access_control::{
    AccessControlGroup, AccessControlGroupId, AccessControlSetting, Membership, MembershipFilter,
};
use crate::domain::identity::{Alias, AliasId, UserId};
use crate::domain::repository::{
    AccessControlStore, AccessControlTransaction, IsolationLevel, RepositoryError,
};

const GROUP_COLUMNS: &str = "id, setting, name, is_default, belongs_to_alias_id, user_deleted, created_at, updated_at";

pub struct PostgresAccessControlStore {
    pool: PgPool,
    isolation_level: IsolationLevel,
}

impl PostgresAccessControlStore {
    pub fn new(pool: PgPool, isolation_level: IsolationLevel) -> Self {
        Self { pool, isolation_level }
    }
}

#[async_trait]
impl AccessControlStore for PostgresAccessControlStore {
    async fn begin(&self) -> Result<Box<dyn AccessControlTransaction>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let statement = format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            self.isolation_level.as_sql()
        );
        sqlx::query(&statement).execute(&mut *tx).await?;

        debug!(isolation = self.isolation_level.as_sql(), "Opened access control transaction");
        Ok(Box::new(PostgresAccessControlTransaction { tx }))
    }
}

pub struct PostgresAccessControlTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AccessControlTransaction for PostgresAccessControlTransaction {
    async fn insert_group(&mut self, group: &AccessControlGroup) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO access_control_groups (
                id, setting, name, is_default, belongs_to_alias_id,
                user_deleted, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(group.id.0)
        .bind(group.setting.as_str())
        .bind(&group.name)
        .bind(group.is_default)
        .bind(group.belongs_to_alias_id.map(|a| a.0))
        .bind(group.user_deleted)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert access control group: {}", e)))?;

        Ok(())
    }

    async fn update_group(&mut self, group: &AccessControlGroup) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE access_control_groups
            SET setting = $2,
                name = $3,
                is_default = $4,
                belongs_to_alias_id = $5,
                user_deleted = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(group.id.0)
        .bind(group.setting.as_str())
        .bind(&group.name)
        .bind(group.is_default)
        .bind(group.belongs_to_alias_id.map(|a| a.0))
        .bind(group.user_deleted)
        .bind(group.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to update access control group: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!(
                "Access control group {} not found",
                group.id
            )));
        }
        Ok(())
    }

    async fn find_group(
        &mut self,
        id: AccessControlGroupId,
    ) -> Result<Option<AccessControlGroup>, RepositoryError> {
        let sql = format!("SELECT {} FROM access_control_groups WHERE id = $1", GROUP_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(parse_group_row).transpose()
    }

    async fn find_groups_by_owner(
        &mut self,
        alias_id: AliasId,
        include_deleted: bool,
    ) -> Result<Vec<AccessControlGroup>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM access_control_groups \
             WHERE belongs_to_alias_id = $1 AND ($2 OR user_deleted = FALSE) \
             ORDER BY created_at DESC",
            GROUP_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(alias_id.0)
            .bind(include_deleted)
            .fetch_all(&mut *self.tx)
            .await?;

        rows.into_iter().map(parse_group_row).collect()
    }

    async fn find_alias(&mut self, alias_id: AliasId) -> Result<Option<Alias>, RepositoryError> {
        let row = sqlx::query("SELECT id, user_id FROM aliases WHERE id = $1")
            .bind(alias_id.0)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => {
                let id: Uuid = row.try_get("id")?;
                let user_id: Uuid = row.try_get("user_id")?;
                Ok(Some(Alias {
                    id: AliasId(id),
                    user_id: UserId(user_id),
                }))
            }
            None => Ok(None),
        }
    }

    async fn insert_membership(&mut self, membership: Membership) -> Result<bool, RepositoryError> {
        // At most one row per (alias, group, flag)
        let result = sqlx::query(
            r#"
            INSERT INTO access_control_group_aliases (alias_id, access_control_group_id, is_direct_member)
            SELECT $1::uuid, $2::uuid, $3::boolean
            WHERE NOT EXISTS (
                SELECT 1 FROM access_control_group_aliases
                WHERE alias_id = $1 AND access_control_group_id = $2 AND is_direct_member = $3
            )
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(membership.alias_id.0)
        .bind(membership.access_control_group_id.0)
        .bind(membership.is_direct_member)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_membership(&mut self, membership: Membership) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM access_control_group_aliases
            WHERE alias_id = $1 AND access_control_group_id = $2 AND is_direct_member = $3
            "#,
        )
        .bind(membership.alias_id.0)
        .bind(membership.access_control_group_id.0)
        .bind(membership.is_direct_member)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_memberships(
        &mut self,
        group_id: AccessControlGroupId,
        filter: MembershipFilter,
    ) -> Result<Vec<Membership>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT alias_id, access_control_group_id, is_direct_member
            FROM access_control_group_aliases
            WHERE access_control_group_id = $1 AND ($2 = FALSE OR is_direct_member = TRUE)
            ORDER BY alias_id, is_direct_member
            "#,
        )
        .bind(group_id.0)
        .bind(filter == MembershipFilter::DirectOnly)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<Membership, RepositoryError> {
                let alias_id: Uuid = row.try_get("alias_id")?;
                let group_id: Uuid = row.try_get("access_control_group_id")?;
                let is_direct_member: bool = row.try_get("is_direct_member")?;
                Ok(Membership {
                    alias_id: AliasId(alias_id),
                    access_control_group_id: AccessControlGroupId(group_id),
                    is_direct_member,
                })
            })
            .collect()
    }

    async fn has_any_member(
        &mut self,
        group_id: AccessControlGroupId,
        alias_ids: &[AliasId],
    ) -> Result<bool, RepositoryError> {
        let ids: Vec<Uuid> = alias_ids.iter().map(|a| a.0).collect();
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM access_control_group_aliases
                WHERE access_control_group_id = $1 AND alias_id = ANY($2)
            )
            "#,
        )
        .bind(group_id.0)
        .bind(ids)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn insert_excluded_user(
        &mut self,
        user_id: UserId,
        group_id: AccessControlGroupId,
    ) -> Result<bool, RepositoryError> {
        // Duplicates surface through the return value, never as an error
        let result = sqlx::query(
            r#"
            INSERT INTO access_control_group_users (user_id, access_control_group_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id.0)
        .bind(group_id.0)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_excluded_user(
        &mut self,
        user_id: UserId,
        group_id: AccessControlGroupId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM access_control_group_users WHERE user_id = $1 AND access_control_group_id = $2",
        )
        .bind(user_id.0)
        .bind(group_id.0)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_user_excluded(
        &mut self,
        group_id: AccessControlGroupId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM access_control_group_users
                WHERE access_control_group_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(group_id.0)
        .bind(user_id.0)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn insert_edge(
        &mut self,
        container: AccessControlGroupId,
        contained: AccessControlGroupId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO access_control_group_edges (container_id, contained_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(container.0)
        .bind(contained.0)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_edge(
        &mut self,
        container: AccessControlGroupId,
        contained: AccessControlGroupId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM access_control_group_edges WHERE container_id = $1 AND contained_id = $2",
        )
        .bind(container.0)
        .bind(contained.0)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_contained_group_ids(
        &mut self,
        container: AccessControlGroupId,
    ) -> Result<Vec<AccessControlGroupId>, RepositoryError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT contained_id FROM access_control_group_edges WHERE container_id = $1",
        )
        .bind(container.0)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(ids.into_iter().map(AccessControlGroupId).collect())
    }

    async fn find_container_group_ids(
        &mut self,
        contained: AccessControlGroupId,
    ) -> Result<Vec<AccessControlGroupId>, RepositoryError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT container_id FROM access_control_group_edges WHERE contained_id = $1",
        )
        .bind(contained.0)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(ids.into_iter().map(AccessControlGroupId).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx
            .commit()
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to commit: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to roll back: {}", e)))
    }
}

/// Parse an access control group from a database row
fn parse_group_row(row: PgRow) -> Result<AccessControlGroup, RepositoryError> {
    let id: Uuid = row.try_get("id")?;
    let setting: String = row.try_get("setting")?;
    let name: Option<String> = row.try_get("name")?;
    let is_default: bool = row.try_get("is_default")?;
    let belongs_to_alias_id: Option<Uuid> = row.try_get("belongs_to_alias_id")?;
    let user_deleted: bool = row.try_get("user_deleted")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    let setting: AccessControlSetting = setting
        .parse()
        .map_err(|e| RepositoryError::Serialization(format!("Failed to parse setting: {}", e)))?;

    Ok(AccessControlGroup {
        id: AccessControlGroupId(id),
        setting,
        name,
        is_default,
        belongs_to_alias_id: belongs_to_alias_id.map(AliasId),
        user_deleted,
        created_at,
        updated_at,
    })
}
