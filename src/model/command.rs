//! Raw and normalized command text.

use serde::{Deserialize, Serialize};

/// One raw command as captured from the trace feed.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RawCommand {
    /// Unmodified command text.
    pub text: String,
    /// Server session (SPID) that issued the command.
    pub session_id: i64,
    /// Monotonically increasing per-capture sequence number.
    pub sequence: i64,
}

/// Protocol-level classification of a command.
///
/// A command matches at most one type; classification is attempted in a
/// fixed priority order and short-circuits on the first success.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum CommandType {
    /// No recognized protocol shape.
    #[default]
    Plain,
    /// `sp_prepare` call carrying the statement text to prepare.
    PrepareRequest,
    /// `sp_execute` of a previously prepared statement handle.
    ExecuteByHandle,
    /// `sp_unprepare` of a statement handle.
    UnprepareRequest,
    /// Pooled connection reset marker.
    ConnectionResetPooled,
    /// Non-pooled connection reset marker.
    ConnectionResetNonpooled,
}

/// Result of classifying one raw command.
///
/// Which fields carry meaning is determined by `command_type`: `handle` and
/// `canonical_text` are populated only for the prepare/execute/unprepare
/// types. For `Plain` commands all three texts equal the input.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct NormalizedCommand {
    /// Unmodified input text.
    pub original_text: String,
    /// Text safe to re-execute (protocol handles stripped).
    pub rewritten_text: String,
    /// Text with variable components replaced by placeholders, used to
    /// group semantically identical commands.
    pub canonical_text: String,
    pub command_type: CommandType,
    /// Prepared-statement or cursor handle, when the type carries one.
    pub handle: Option<i64>,
}

impl NormalizedCommand {
    /// Unclassified command: all texts equal the input, type `Plain`.
    pub fn new(text: &str) -> Self {
        Self {
            original_text: text.to_owned(),
            rewritten_text: text.to_owned(),
            canonical_text: text.to_owned(),
            command_type: CommandType::Plain,
            handle: None,
        }
    }
}
