//! Read-only summary of an existing capture file.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use super::StoreError;
use crate::model::EventType;

/// Aggregate view of a capture file, cheap enough to compute on files with
/// millions of rows (index-backed counts and min/max scans only).
#[derive(Serialize, Debug)]
pub struct StoreSummary {
    /// Raw `FileProperties` rows, including the format-version stamp.
    pub file_properties: BTreeMap<String, String>,
    pub event_rows: i64,
    /// Row counts keyed by event type name.
    pub events_by_type: BTreeMap<String, i64>,
    pub session_count: i64,
    pub first_start_time: Option<String>,
    pub last_start_time: Option<String>,
    pub wait_rows: i64,
    pub counter_rows: i64,
    pub max_row_id: i64,
}

pub fn summarize(path: &Path) -> Result<StoreSummary, StoreError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let mut file_properties = BTreeMap::new();
    let mut stmt = conn.prepare("SELECT name, value FROM FileProperties")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        file_properties.insert(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
    }

    let mut events_by_type = BTreeMap::new();
    let mut stmt = conn.prepare(
        "SELECT event_type, COUNT(*) FROM Events WHERE event_type IS NOT NULL GROUP BY event_type",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let code: i64 = row.get(0)?;
        events_by_type.insert(EventType::from_code(code).name().to_owned(), row.get(1)?);
    }

    let (event_rows, session_count, max_row_id) = conn.query_row(
        "SELECT COUNT(*),
                COUNT(DISTINCT session_id),
                COALESCE(MAX(row_id), 0)
         FROM Events",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    let (first_start_time, last_start_time) = conn.query_row(
        "SELECT MIN(start_time), MAX(start_time) FROM Events",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let wait_rows = count(&conn, "SELECT COUNT(*) FROM Waits")?;
    let counter_rows = count(&conn, "SELECT COUNT(*) FROM Counters")?;

    Ok(StoreSummary {
        file_properties,
        event_rows,
        events_by_type,
        session_count,
        first_start_time,
        last_start_time,
        wait_rows,
        counter_rows,
        max_row_id,
    })
}

fn count(conn: &Connection, sql: &str) -> Result<i64, StoreError> {
    Ok(conn.query_row(sql, [], |row| row.get(0))?)
}
