//! Database schema management.

use rusqlite::Connection;
use tokio_rusqlite::Error;

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

const SCHEMA: &str = r#"
-- Known proxy nodes
CREATE TABLE IF NOT EXISTS instances (
    hostname TEXT PRIMARY KEY,
    port INTEGER NOT NULL,
    server_name TEXT NOT NULL,
    method TEXT NOT NULL,
    last_seen TEXT
);

CREATE INDEX IF NOT EXISTS idx_instances_method ON instances(method);

-- Flat settings snapshot
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Custom configuration snippets; global snippets use an empty service_id
CREATE TABLE IF NOT EXISTS custom_configs (
    config_type TEXT NOT NULL,
    service_id TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (config_type, service_id, name)
);

-- External plugins as gzip'd tar archives
CREATE TABLE IF NOT EXISTS plugin_bundles (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL
);
"#;
