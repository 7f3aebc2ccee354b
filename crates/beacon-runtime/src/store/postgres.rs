use chrono::{DateTime, Utc};
use sqlx::PgPool;

use beacon_core::config::RegistryConfig;
use beacon_core::error::{BeaconError, Result};
use beacon_core::registry::{Descriptor, RegistryStore, StoreFuture};

/// SQL statements for one registry table.
#[derive(Debug, Clone)]
struct RegistrySql {
    create_table: String,
    create_index: String,
    delete: String,
    insert: String,
    update: String,
}

impl RegistrySql {
    /// `table` must already be a validated identifier.
    fn new(table: &str) -> Self {
        Self {
            create_table: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    server_host VARCHAR(255) NOT NULL,
                    server_port INTEGER NOT NULL,
                    app_install_dir VARCHAR(1024),
                    profile VARCHAR(255),
                    projectName VARCHAR(255) NOT NULL DEFAULT '',
                    buildVersion VARCHAR(255) NOT NULL DEFAULT '',
                    buildTime VARCHAR(255) NOT NULL DEFAULT '',
                    registry_time TIMESTAMPTZ NOT NULL,
                    PRIMARY KEY (server_host, server_port)
                )
                "#
            ),
            create_index: format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_registry_time ON {table} (registry_time)"
            ),
            delete: format!("DELETE FROM {table} WHERE server_host = $1 AND server_port = $2"),
            insert: format!(
                r#"
                INSERT INTO {table} (
                    server_host, server_port, app_install_dir, profile,
                    projectName, buildVersion, buildTime, registry_time
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#
            ),
            update: format!(
                r#"
                UPDATE {table}
                SET app_install_dir = $1,
                    profile = $2,
                    projectName = $3,
                    buildVersion = $4,
                    buildTime = $5,
                    registry_time = $6
                WHERE server_host = $7 AND server_port = $8
                "#
            ),
        }
    }
}

/// Registry store backed by a PostgreSQL table keyed by
/// `(server_host, server_port)`.
///
/// Column names match the `mon_app_registry` table existing readers query.
/// The camel-case metadata columns are unquoted, so Postgres stores them
/// folded to lower case.
///
/// The pool is shared with the rest of the process; row locking on the key
/// is all the concurrency control writes rely on.
#[derive(Clone)]
pub struct PgRegistryStore {
    pool: PgPool,
    table: String,
    sql: RegistrySql,
}

impl PgRegistryStore {
    /// Create a store writing to the table named in `config`.
    pub fn new(pool: PgPool, config: &RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool,
            table: config.table.clone(),
            sql: RegistrySql::new(&config.table),
        })
    }

    /// Create the registry table and its timestamp index if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(&self.sql.create_table)
            .execute(&self.pool)
            .await?;
        sqlx::query(&self.sql.create_index)
            .execute(&self.pool)
            .await?;

        tracing::debug!(table = %self.table, "Registry schema ready");
        Ok(())
    }
}

impl RegistryStore for PgRegistryStore {
    fn delete<'a>(&'a self, host: &'a str, port: u16) -> StoreFuture<'a> {
        Box::pin(async move {
            sqlx::query(&self.sql.delete)
                .bind(host)
                .bind(port as i32)
                .execute(&self.pool)
                .await?;

            Ok(())
        })
    }

    fn insert<'a>(
        &'a self,
        descriptor: &'a Descriptor,
        registry_time: DateTime<Utc>,
    ) -> StoreFuture<'a> {
        Box::pin(async move {
            sqlx::query(&self.sql.insert)
                .bind(descriptor.host())
                .bind(descriptor.port() as i32)
                .bind(descriptor.install_dir())
                .bind(descriptor.profile())
                .bind(descriptor.project_name())
                .bind(descriptor.build_version())
                .bind(descriptor.build_time())
                .bind(registry_time)
                .execute(&self.pool)
                .await?;

            Ok(())
        })
    }

    fn update<'a>(
        &'a self,
        descriptor: &'a Descriptor,
        registry_time: DateTime<Utc>,
    ) -> StoreFuture<'a> {
        Box::pin(async move {
            let result = sqlx::query(&self.sql.update)
                .bind(descriptor.install_dir())
                .bind(descriptor.profile())
                .bind(descriptor.project_name())
                .bind(descriptor.build_version())
                .bind(descriptor.build_time())
                .bind(registry_time)
                .bind(descriptor.host())
                .bind(descriptor.port() as i32)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(BeaconError::NotFound(format!(
                    "No row in {} for {}",
                    self.table, descriptor
                )));
            }
            Ok(())
        })
    }
}
