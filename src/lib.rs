//! sqlcap - SQL Server workload capture library.
//!
//! Captures query-execution traces from a live server, normalizes the raw
//! command text into a stable, comparable form, and persists the event
//! stream into a durable SQLite capture file for later replay or analysis.
//!
//! This library provides the core functionality shared between a trace
//! listener (external) and the bundled inspection tool:
//! - `model` - event and command data models
//! - `transform` - command rewrite, skip and classification engine
//! - `sink` - buffered, batch-flushing event delivery
//! - `storage` - capture file schema, batched transactional writer, reader

pub mod model;
pub mod sink;
pub mod storage;
pub mod transform;
