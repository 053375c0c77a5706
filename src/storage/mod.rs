//! Durable persistence of the captured event stream.
//!
//! The capture file is a SQLite database with a fixed, minimal schema
//! sufficient for later replay and analysis:
//!
//! ```text
//! FileProperties          Events                    Waits / Counters
//! ┌────────────┐          ┌──────────────────┐      ┌──────────────┐
//! │ name (PK)  │          │ row_id (PK)      │◄─────│ row_id       │
//! │ value      │          │ event_sequence   │      │ detail cols  │
//! └────────────┘          │ event_type       │      └──────────────┘
//!   FormatVersion         │ identity/text    │
//!                         │ cpu/duration/... │
//!                         └──────────────────┘
//! ```
//!
//! - [`schema`]: DDL, pragmas, format-version stamp, row-id resume
//! - [`writer`]: batched transactional writer with start/completion
//!   correlation
//! - [`reader`]: read-only summary of an existing capture file

pub mod reader;
pub mod schema;
pub mod writer;

pub use reader::{StoreSummary, summarize};
pub use writer::FileWriter;

/// Error type for capture file access.
#[derive(Debug)]
pub enum StoreError {
    /// SQLite-level failure (open, statement, transaction).
    Sqlite(rusqlite::Error),
    /// Filesystem failure creating the output location.
    Io(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(err) => write!(f, "capture store: {}", err),
            StoreError::Io(err) => write!(f, "capture store I/O: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(err) => Some(err),
            StoreError::Io(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}
