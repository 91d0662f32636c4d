// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that can be
//! injected into the PostgreSQL store, and builds the store selected by the
//! configured `StorageBackend`.

use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use tracing::info;

use crate::domain::repository::{AccessControlStore, PostgresConfig, StorageBackend};
use crate::infrastructure::repositories::{InMemoryAccessControlStore, PostgresAccessControlStore};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::with_max_connections(connection_string, 5).await
    }

    pub async fn with_max_connections(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Build the access control store for a storage backend
pub async fn connect_store(backend: &StorageBackend) -> Result<Arc<dyn AccessControlStore>> {
    match backend {
        StorageBackend::InMemory => {
            info!("Using in-memory access control store");
            Ok(Arc::new(InMemoryAccessControlStore::new()))
        }
        StorageBackend::PostgreSQL(PostgresConfig {
            connection_string,
            max_connections,
            isolation_level,
        }) => {
            let database = Database::with_max_connections(connection_string, *max_connections).await?;
            info!(
                max_connections = *max_connections,
                isolation = isolation_level.as_sql(),
                "Connected access control store to PostgreSQL"
            );
            Ok(Arc::new(PostgresAccessControlStore::new(
                database.get_pool().clone(),
                *isolation_level,
            )))
        }
    }
}
