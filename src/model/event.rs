//! Workload events emitted by the trace listener.
//!
//! Three kinds of events flow through the pipeline: query executions
//! (start/completion pairs correlated by session and sequence), periodic
//! wait-statistics snapshots and periodic performance-counter snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type codes as stored in the capture file.
///
/// The numeric codes are part of the file format: the start/completion
/// correlation query matches stored starting-class rows by code, so the
/// values must stay stable across versions.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    RpcCompleted,
    BatchCompleted,
    RpcStarting,
    Message,
    Timeout,
    WaitStats,
    BatchStarting,
    PerformanceCounter,
    Error,
    Unknown,
}

impl EventType {
    /// Numeric code stored in the `event_type` column.
    pub fn code(self) -> i64 {
        match self {
            EventType::RpcCompleted => 0,
            EventType::BatchCompleted => 1,
            EventType::RpcStarting => 2,
            EventType::Message => 3,
            EventType::Timeout => -1,
            EventType::WaitStats => -2,
            EventType::BatchStarting => -3,
            EventType::PerformanceCounter => -4,
            EventType::Error => -5,
            EventType::Unknown => -9,
        }
    }

    /// Inverse of [`EventType::code`]; unrecognized codes map to `Unknown`.
    pub fn from_code(code: i64) -> EventType {
        match code {
            0 => EventType::RpcCompleted,
            1 => EventType::BatchCompleted,
            2 => EventType::RpcStarting,
            3 => EventType::Message,
            -1 => EventType::Timeout,
            -2 => EventType::WaitStats,
            -3 => EventType::BatchStarting,
            -4 => EventType::PerformanceCounter,
            -5 => EventType::Error,
            _ => EventType::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventType::RpcCompleted => "RpcCompleted",
            EventType::BatchCompleted => "BatchCompleted",
            EventType::RpcStarting => "RpcStarting",
            EventType::Message => "Message",
            EventType::Timeout => "Timeout",
            EventType::WaitStats => "WaitStats",
            EventType::BatchStarting => "BatchStarting",
            EventType::PerformanceCounter => "PerformanceCounter",
            EventType::Error => "Error",
            EventType::Unknown => "Unknown",
        }
    }

    /// Execution phase, for execution-class types only.
    pub fn phase(self) -> Option<EventPhase> {
        match self {
            EventType::RpcStarting | EventType::BatchStarting => Some(EventPhase::Starting),
            EventType::RpcCompleted | EventType::BatchCompleted => Some(EventPhase::Completed),
            _ => None,
        }
    }

    pub fn is_starting(self) -> bool {
        self.phase() == Some(EventPhase::Starting)
    }

    pub fn is_completed(self) -> bool {
        self.phase() == Some(EventPhase::Completed)
    }
}

/// Phase of a query execution event.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum EventPhase {
    Starting,
    Completed,
}

/// One query execution occurrence (a start or a completion).
///
/// Starting events carry identity and text; metrics populate only on
/// completion. A completion never creates its own row in the capture file,
/// it updates the closest preceding starting row of the same session.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ExecutionEvent {
    /// Capture-time sequence number, unique and increasing per session.
    pub event_sequence: i64,

    pub event_type: EventType,

    /// When the execution started on the server.
    pub start_time: DateTime<Utc>,

    /// Server session (SPID) that produced the command.
    pub session_id: i64,

    pub application_name: Option<String>,
    pub host_name: Option<String>,
    pub database_name: Option<String>,
    pub login_name: Option<String>,

    /// Command text. On completion events this is the final text and
    /// replaces whatever the starting event carried.
    pub text: Option<String>,

    /// CPU time in milliseconds. Completion only.
    pub cpu: Option<i64>,
    /// Elapsed time in microseconds. Completion only.
    pub duration: Option<i64>,
    /// Logical reads. Completion only.
    pub reads: Option<i64>,
    /// Writes. Completion only.
    pub writes: Option<i64>,
}

/// One row of a wait-statistics snapshot.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct WaitRow {
    pub wait_type: String,
    pub wait_sec: i64,
    pub resource_sec: i64,
    pub signal_sec: i64,
    pub wait_count: i64,
}

/// Periodic snapshot of server wait statistics.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct WaitStatsEvent {
    /// Capture-time sequence number.
    pub event_sequence: i64,
    /// Snapshot timestamp.
    pub start_time: DateTime<Utc>,
    pub waits: Vec<WaitRow>,
}

/// Periodic snapshot of server performance counters.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct CounterEvent {
    /// Capture-time sequence number.
    pub event_sequence: i64,
    /// Snapshot timestamp.
    pub start_time: DateTime<Utc>,
    pub counters: BTreeMap<String, f64>,
}

/// Tagged union of everything the listener can emit.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum WorkloadEvent {
    Execution(ExecutionEvent),
    WaitStats(WaitStatsEvent),
    Counters(CounterEvent),
}

impl WorkloadEvent {
    /// Capture-time sequence number of the event.
    pub fn sequence(&self) -> i64 {
        match self {
            WorkloadEvent::Execution(e) => e.event_sequence,
            WorkloadEvent::WaitStats(e) => e.event_sequence,
            WorkloadEvent::Counters(e) => e.event_sequence,
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        match self {
            WorkloadEvent::Execution(e) => e.start_time,
            WorkloadEvent::WaitStats(e) => e.start_time,
            WorkloadEvent::Counters(e) => e.start_time,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            WorkloadEvent::Execution(e) => e.event_type,
            WorkloadEvent::WaitStats(_) => EventType::WaitStats,
            WorkloadEvent::Counters(_) => EventType::PerformanceCounter,
        }
    }
}
