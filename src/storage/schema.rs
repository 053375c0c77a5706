//! Capture file schema and initialization.
//!
//! The schema is part of the file format shared with replay and analysis
//! tooling; table and column names must stay stable. All columns except
//! `start_time` are nullable on purpose: wait-statistics and counter marker
//! rows carry only a timestamp and a type.

use std::path::Path;

use rusqlite::Connection;

use super::StoreError;

/// Format version stamped into `FileProperties` once, when the file is
/// created. Appending to an existing file never rewrites it.
pub const FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The unique index enforces at most one row per (session, sequence) pair
/// among rows that carry a sequence number; the start-time index supports
/// ordered scans for replay.
const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS FileProperties (
    name TEXT NOT NULL PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Events (
    row_id INTEGER PRIMARY KEY,
    event_sequence INTEGER,
    event_type INTEGER,
    start_time date NOT NULL,
    client_app_name TEXT NULL,
    client_host_name TEXT NULL,
    database_name TEXT NULL,
    server_principal_name TEXT NULL,
    session_id INTEGER NULL,
    sql_text TEXT NULL,
    cpu INTEGER NULL,
    duration INTEGER NULL,
    reads INTEGER NULL,
    writes INTEGER NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS Index_Session_ID_Event_Sequence ON Events(
    session_id ASC,
    event_sequence DESC
);

CREATE INDEX IF NOT EXISTS Index_Start_Time_Row_ID ON Events(
    start_time ASC,
    row_id ASC
);

CREATE TABLE IF NOT EXISTS Counters (
    row_id INTEGER,
    name TEXT NULL,
    value FLOAT NULL
);

CREATE TABLE IF NOT EXISTS Waits (
    row_id INTEGER,
    wait_type TEXT NULL,
    wait_sec INTEGER NULL,
    resource_sec INTEGER NULL,
    signal_sec INTEGER NULL,
    wait_count INTEGER NULL
);
";

/// Opens (creating if needed) a capture file and makes sure the schema and
/// format-version stamp exist.
pub fn open(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;

    // Single-writer tuning; transaction durability is bounded by the batch,
    // not by individual rows.
    conn.pragma_update(None, "journal_mode", "MEMORY")?;
    conn.pragma_update(None, "locking_mode", "EXCLUSIVE")?;
    conn.pragma_update(None, "cache_size", 10000)?;

    conn.execute_batch(CREATE_TABLES)?;
    conn.execute(
        "INSERT INTO FileProperties (name, value)
         SELECT 'FormatVersion', ?1
          WHERE NOT EXISTS (SELECT 1 FROM FileProperties WHERE name = 'FormatVersion')",
        [FORMAT_VERSION],
    )?;

    Ok(conn)
}

/// First free row id. Row ids are assigned at write time and resume one
/// past the highest existing id, so appending to a pre-existing file never
/// collides.
pub fn next_row_id(conn: &Connection) -> Result<i64, StoreError> {
    let next = conn.query_row("SELECT COALESCE(MAX(row_id), 0) + 1 FROM Events", [], |row| {
        row.get(0)
    })?;
    Ok(next)
}
