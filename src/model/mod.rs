//! Data models for captured workloads.
//!
//! This module contains the data structures flowing through the capture
//! pipeline:
//!
//! - [`command`]: raw and normalized command text
//! - [`event`]: workload events (executions, wait statistics, counters)
//!
//! Command normalization is transient (produced and consumed per command,
//! never persisted standalone); events travel from the listener through the
//! buffered sink into the capture file.

mod command;
mod event;

pub use command::{CommandType, NormalizedCommand, RawCommand};
pub use event::{
    CounterEvent, EventPhase, EventType, ExecutionEvent, WaitRow, WaitStatsEvent, WorkloadEvent,
};
