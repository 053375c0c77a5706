//! Batched transactional writer for capture files.
//!
//! One [`FileWriter`] owns the store connection for its lifetime. Every
//! batch is committed as a single transaction: on any failure the whole
//! batch rolls back and the error propagates, so no partial batch is ever
//! visible in the file.
//!
//! Starting-phase execution events insert a new row; completion events
//! update the closest preceding unmatched starting row of the same session
//! instead of inserting. Wait-statistics and counter snapshots insert one
//! marker row plus one detail row per entry, all sharing the marker's
//! row id.

use std::path::PathBuf;

use rusqlite::{Connection, Transaction, params};
use tracing::{debug, info};

use super::{StoreError, schema};
use crate::model::{CounterEvent, EventType, ExecutionEvent, WaitStatsEvent, WorkloadEvent};
use crate::sink::BatchWriter;

const INSERT_EVENT: &str = "
INSERT INTO Events (
    row_id, event_sequence, event_type, start_time,
    client_app_name, client_host_name, database_name, server_principal_name,
    session_id, sql_text, cpu, duration, reads, writes
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

/// Correlation: the most recent starting-class row of the same session,
/// with a smaller sequence number, whose metrics are still unknown.
/// Starting-class stored types are RpcStarting (2) and BatchStarting (-3).
const UPDATE_EVENT: &str = "
UPDATE Events SET cpu = ?1,
                  duration = ?2,
                  reads = ?3,
                  writes = ?4,
                  sql_text = ?5
WHERE row_id = (SELECT row_id
                FROM Events
                WHERE session_id = ?6
                AND event_sequence < ?7
                AND IFNULL(duration, 0) = 0
                AND event_type IN (2, -3)
                ORDER BY event_sequence DESC
                LIMIT 1)";

const INSERT_MARKER: &str =
    "INSERT INTO Events (row_id, event_type, start_time) VALUES (?1, ?2, ?3)";

const INSERT_WAIT: &str = "
INSERT INTO Waits (row_id, wait_type, wait_sec, resource_sec, signal_sec, wait_count)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const INSERT_COUNTER: &str = "INSERT INTO Counters (row_id, name, value) VALUES (?1, ?2, ?3)";

/// Persistence engine for one capture file.
///
/// The connection is created lazily on the first batch, so a consumer that
/// never receives an event never touches the filesystem.
pub struct FileWriter {
    path: PathBuf,
    conn: Option<Connection>,
    /// Next row id; assigned at write time, resumes past existing rows.
    row_id: i64,
}

impl FileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: None,
            row_id: 1,
        }
    }

    fn ensure_open(&mut self) -> Result<(), StoreError> {
        if self.conn.is_some() {
            return Ok(());
        }
        info!("writing event data to {}", self.path.display());
        let conn = schema::open(&self.path)?;
        self.row_id = schema::next_row_id(&conn)?;
        self.conn = Some(conn);
        Ok(())
    }
}

impl BatchWriter for FileWriter {
    type Error = StoreError;

    fn write_batch(&mut self, events: Vec<WorkloadEvent>) -> Result<(), StoreError> {
        self.ensure_open()?;
        let Some(conn) = self.conn.as_mut() else {
            return Ok(());
        };

        let mut row_id = self.row_id;
        // dropping the transaction without commit rolls the batch back
        let tx = conn.transaction()?;
        for event in &events {
            match event {
                WorkloadEvent::Execution(evt) if evt.event_type.is_completed() => {
                    update_execution(&tx, evt)?;
                }
                WorkloadEvent::Execution(evt) => insert_execution(&tx, &mut row_id, evt)?,
                WorkloadEvent::WaitStats(evt) => insert_waits(&tx, &mut row_id, evt)?,
                WorkloadEvent::Counters(evt) => insert_counters(&tx, &mut row_id, evt)?,
            }
        }
        tx.commit()?;
        self.row_id = row_id;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            info!("closing the connection to {}", self.path.display());
            // close failures must not fail the shutdown path
            let _ = conn.close();
        }
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        self.close();
    }
}

fn insert_execution(
    tx: &Transaction<'_>,
    row_id: &mut i64,
    evt: &ExecutionEvent,
) -> Result<(), StoreError> {
    tx.execute(
        INSERT_EVENT,
        params![
            *row_id,
            evt.event_sequence,
            evt.event_type.code(),
            evt.start_time.to_rfc3339(),
            evt.application_name,
            evt.host_name,
            evt.database_name,
            evt.login_name,
            evt.session_id,
            evt.text,
            evt.cpu,
            evt.duration,
            evt.reads,
            evt.writes,
        ],
    )?;
    *row_id += 1;
    Ok(())
}

fn update_execution(tx: &Transaction<'_>, evt: &ExecutionEvent) -> Result<(), StoreError> {
    let updated = tx.execute(
        UPDATE_EVENT,
        params![
            evt.cpu,
            evt.duration,
            evt.reads,
            evt.writes,
            evt.text,
            evt.session_id,
            evt.event_sequence,
        ],
    )?;
    if updated == 0 {
        // the start this completion belongs to was never captured
        debug!(
            "starting event not found - session_id: {}, event_sequence: {}",
            evt.session_id, evt.event_sequence
        );
    }
    Ok(())
}

fn insert_waits(
    tx: &Transaction<'_>,
    row_id: &mut i64,
    evt: &WaitStatsEvent,
) -> Result<(), StoreError> {
    let marker_row = *row_id;
    tx.execute(
        INSERT_MARKER,
        params![
            marker_row,
            EventType::WaitStats.code(),
            evt.start_time.to_rfc3339()
        ],
    )?;
    *row_id += 1;

    for wait in &evt.waits {
        tx.execute(
            INSERT_WAIT,
            params![
                marker_row,
                wait.wait_type,
                wait.wait_sec,
                wait.resource_sec,
                wait.signal_sec,
                wait.wait_count,
            ],
        )?;
    }
    Ok(())
}

fn insert_counters(
    tx: &Transaction<'_>,
    row_id: &mut i64,
    evt: &CounterEvent,
) -> Result<(), StoreError> {
    let marker_row = *row_id;
    tx.execute(
        INSERT_MARKER,
        params![
            marker_row,
            EventType::PerformanceCounter.code(),
            evt.start_time.to_rfc3339()
        ],
    )?;
    *row_id += 1;

    for (name, value) in &evt.counters {
        tx.execute(INSERT_COUNTER, params![marker_row, name, value])?;
    }
    Ok(())
}
