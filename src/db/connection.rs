use crate::config::DatabaseConfig;
use duckdb::{Connection, Result as DbResult};
use std::sync::{Arc, Mutex};
use tracing::info;

pub type DbPool = Arc<Mutex<Connection>>;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id VARCHAR PRIMARY KEY,
    owner_id VARCHAR NOT NULL,
    body TEXT NOT NULL,
    role VARCHAR NOT NULL,
    status VARCHAR NOT NULL DEFAULT 'sent',
    sent_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_owner ON messages(owner_id);

CREATE TABLE IF NOT EXISTS conversations (
    id VARCHAR PRIMARY KEY,
    owner_id VARCHAR NOT NULL,
    title VARCHAR,
    created_at TIMESTAMP NOT NULL,
    last_activity TIMESTAMP NOT NULL,
    messages TEXT NOT NULL
);
"#;

pub fn get_connection(config: &DatabaseConfig) -> DbResult<DbPool> {
    info!("Connecting to DuckDB at {}", config.path);
    let conn = if config.path == ":memory:" {
        Connection::open_in_memory()?
    } else {
        Connection::open(&config.path)?
    };

    init_schema(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_schema(conn: &Connection) -> DbResult<()> {
    info!("Initializing database schema");
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
