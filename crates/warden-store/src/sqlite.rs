//! SQLite-backed store.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;
use tracing::debug;

use warden_protocols::error::StoreError;
use warden_protocols::{
    CustomConfig, FleetStore, Instance, InstanceMethod, PluginBundle, SettingsStore,
    UpsertOutcome,
};

use crate::schema::init_schema;

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;

/// SQLite-based fleet registry and settings store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::init(conn).await
    }

    /// Open or create a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        debug!("Opening fleet store at {:?}", path);
        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| Ok(init_schema(conn)?))
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(Self { conn })
    }
}

fn row_to_instance(row: &rusqlite::Row<'_>) -> rusqlite::Result<Instance> {
    let hostname: String = row.get(0)?;
    let port: u16 = row.get(1)?;
    let server_name: String = row.get(2)?;
    let method: String = row.get(3)?;
    let last_seen: Option<String> = row.get(4)?;

    let method = method
        .parse::<InstanceMethod>()
        .map_err(|_| rusqlite::Error::InvalidColumnType(3, "method".to_string(), Type::Text))?;
    let last_seen = last_seen
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(Instance {
        hostname,
        port,
        server_name,
        method,
        last_seen,
    })
}

#[async_trait]
impl FleetStore for SqliteStore {
    async fn get_instances(&self) -> Result<Vec<Instance>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT hostname, port, server_name, method, last_seen
                     FROM instances ORDER BY hostname",
                )?;
                let instances = stmt
                    .query_map([], row_to_instance)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(instances)
            })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn upsert_instance(&self, instance: Instance) -> Result<UpsertOutcome, StoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let exists = tx
                    .query_row(
                        "SELECT 1 FROM instances WHERE hostname = ?1",
                        [&instance.hostname],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();

                tx.execute(
                    "INSERT INTO instances (hostname, port, server_name, method)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(hostname) DO UPDATE SET
                         port = excluded.port,
                         server_name = excluded.server_name,
                         method = excluded.method",
                    params![
                        instance.hostname,
                        instance.port,
                        instance.server_name,
                        instance.method.as_str()
                    ],
                )?;
                tx.commit()?;

                Ok(if exists {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Created
                })
            })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn seen_instance(&self, hostname: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let hostname = hostname.to_string();
        let lookup = hostname.clone();
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE instances SET last_seen = ?1 WHERE hostname = ?2",
                    params![at.to_rfc3339(), lookup],
                )?;
                Ok(updated)
            })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        if updated == 0 {
            return Err(StoreError::NotFound(hostname));
        }
        Ok(())
    }

    async fn refresh_instances(
        &self,
        method: InstanceMethod,
        instances: Vec<Instance>,
    ) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM instances WHERE method = ?1",
                    [method.as_str()],
                )?;
                for instance in instances {
                    tx.execute(
                        "INSERT OR REPLACE INTO instances (hostname, port, server_name, method, last_seen)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            instance.hostname,
                            instance.port,
                            instance.server_name,
                            instance.method.as_str(),
                            instance.last_seen.map(|t| t.to_rfc3339())
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn get_settings(&self) -> Result<BTreeMap<String, String>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
                let settings = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                Ok(settings)
            })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn save_settings(&self, settings: BTreeMap<String, String>) -> Result<bool, StoreError> {
        if self.get_settings().await? == settings {
            return Ok(false);
        }

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM settings", [])?;
                for (key, value) in &settings {
                    tx.execute(
                        "INSERT INTO settings (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(true)
    }

    async fn get_custom_configs(&self) -> Result<Vec<CustomConfig>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT config_type, service_id, name, data FROM custom_configs
                     ORDER BY config_type, service_id, name",
                )?;
                let configs = stmt
                    .query_map([], |row| {
                        let service_id: String = row.get(1)?;
                        Ok(CustomConfig {
                            config_type: row.get(0)?,
                            service_id: (!service_id.is_empty()).then_some(service_id),
                            name: row.get(2)?,
                            data: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(configs)
            })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn save_custom_config(&self, config: CustomConfig) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO custom_configs (config_type, service_id, name, data)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        config.config_type,
                        config.service_id.unwrap_or_default(),
                        config.name,
                        config.data
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn get_plugin_bundles(&self) -> Result<Vec<PluginBundle>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, data FROM plugin_bundles ORDER BY id")?;
                let bundles = stmt
                    .query_map([], |row| {
                        let data: Vec<u8> = row.get(1)?;
                        Ok(PluginBundle {
                            id: row.get(0)?,
                            data: Bytes::from(data),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(bundles)
            })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn save_plugin_bundle(&self, bundle: PluginBundle) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO plugin_bundles (id, data) VALUES (?1, ?2)",
                    params![bundle.id, bundle.data.to_vec()],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }
}
