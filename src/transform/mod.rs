//! Rewrite and classification of captured command text.
//!
//! Drivers talk to the server through protocol-level procedure calls
//! (`sp_prepexec`, `sp_execute`, cursor open/close cycles) that embed
//! ephemeral statement handles. The same logical statement therefore looks
//! different on every capture. This module provides three pure functions:
//!
//! - [`transform`]: rewrites a command so it can be re-executed against
//!   another server (handles stripped, missing cleanup calls appended,
//!   over-precision decimal literals reinterpreted as float).
//! - [`skip`]: true for internal/administrative commands that must not be
//!   captured at all.
//! - [`normalize`]: classifies a command into a [`NormalizedCommand`] for
//!   grouping and handle correlation. Shapes are tried in a fixed priority
//!   order; the first match wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{CommandType, NormalizedCommand};

static EXEC_PREPPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^EXEC\s+SP_EXECUTE\s+(?P<stmtnum>\d+)").unwrap());

static EXEC_UNPREP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)EXEC\s+SP_UNPREPARE\s+(?P<stmtnum>\d+)").unwrap());

static PREPARE_SQL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)EXEC\s+(?P<preptype>SP_PREP(ARE|EXEC))\s+@P1\s+OUTPUT,\s*(NULL|(N'.*?')),\s*N(?P<remaining>.+)$",
    )
    .unwrap()
});

/// Quoted statement literal at the start of the prepare call remainder.
/// `''` inside the literal is an escaped quote, not a terminator.
static PREPPED_STATEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^'(?P<statement>(?:[^']|'')*)'").unwrap());

static DOUBLE_APOSTROPHE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"''(?P<string>.*?)''").unwrap());

/// Numeric literal of 38+ digits, optionally already carrying an exponent
/// marker. Word boundaries keep the match from splitting longer tokens.
static DECIMAL_38: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9\.]{38,})+([E]+[0]+)?\b").unwrap());

/// Fixed canonical text for unprepare calls; the handle is never part of
/// the canonical form.
const UNPREPARE_PLACEHOLDER: &str = "EXEC sp_unprepare §";

/// Rewrites a command so it is safe to re-execute.
///
/// Prepare/cursor calls get their embedded handle zeroed in place and, when
/// the matching cleanup call is missing, one appended, so replay does not
/// leak prepared handles. Decimal literals beyond the server's maximum
/// precision of 38 get an `E0` suffix so they are read back as float.
/// Idempotent: rewriting an already rewritten command changes nothing.
pub fn transform(command: &str) -> String {
    let mut command = command.to_owned();

    if command.contains("sp_prepexec ") {
        command = zero_fill_prepare_handle(&command).0;
        if !command.ends_with("EXEC sp_unprepare @p1;") {
            command.push_str(" ; EXEC sp_unprepare @p1;");
        }
    } else if command.contains("sp_cursoropen ") {
        command = zero_fill_prepare_handle(&command).0;
        if !command.ends_with("EXEC sp_cursorclose @p1;") {
            command.push_str(" ; EXEC sp_cursorclose @p1;");
        }
    } else if command.contains("sp_cursorprepexec ") {
        command = zero_fill_prepare_handle(&command).0;
        if !command.ends_with("EXEC sp_cursorunprepare @p1;") {
            command.push_str(" ; EXEC sp_cursorunprepare @p1;");
        }
    }

    // Completed events may dump float parameters as numeric strings longer
    // than the maximum decimal precision of 38. Those need an E0 suffix to
    // be read back as float. The pattern also matches literals that already
    // carry the suffix, so the replacement checks before appending.
    DECIMAL_38
        .replace_all(&command, |caps: &regex::Captures| {
            let lit = &caps[0];
            if lit.ends_with("E0") {
                lit.to_owned()
            } else {
                format!("{lit}E0")
            }
        })
        .into_owned()
}

/// True for commands that must not be processed further: empty text,
/// cursor bookkeeping, trace-reading internals, session management and
/// bulk loads. The checks are independent predicates; the first hit wins.
pub fn skip(command: &str) -> bool {
    if command.is_empty() {
        return true;
    }

    const MARKERS: [&str; 8] = [
        "sp_cursor ",
        "sp_cursorfetch ",
        "sp_cursorclose ",
        "sp_cursoroption ",
        "sp_cursorunprepare ",
        "fn_xe_file_target_read_file",
        "ALTER EVENT SESSION",
        "fn_trace_getinfo",
    ];
    if MARKERS.iter().any(|m| command.contains(m)) {
        return true;
    }

    command.starts_with("KILL") || command.starts_with("insert bulk")
}

/// Classifies a command into a [`NormalizedCommand`].
///
/// Priority order, each branch terminal:
/// 1. connection reset marker (pooled / non-pooled)
/// 2. prepare call shape; only the pure `sp_prepare` form populates fields
/// 3. execute by statement handle
/// 4. unprepare by statement handle
/// 5. anything else stays `Plain`
///
/// Handle extraction never fails the classification: a malformed number
/// degrades to the value the matching regex captured, or to zero.
pub fn normalize(command: &str) -> NormalizedCommand {
    let mut result = NormalizedCommand::new(command);

    if command.contains("sp_reset_connection") {
        result.command_type = if command.contains("Nonpooled") {
            CommandType::ConnectionResetNonpooled
        } else {
            CommandType::ConnectionResetPooled
        };
        return result;
    }

    if let Some(caps) = PREPARE_SQL.captures(command) {
        if caps["preptype"].eq_ignore_ascii_case("sp_prepare")
            && let Some(stmt) = PREPPED_STATEMENT.captures(&caps["remaining"])
        {
            result.canonical_text = DOUBLE_APOSTROPHE
                .replace_all(&stmt["statement"], "'${string}'")
                .into_owned();
            let (rewritten, handle_digits) = zero_fill_prepare_handle(command);
            result.rewritten_text = rewritten;
            result.handle = Some(handle_digits.and_then(|d| d.parse().ok()).unwrap_or(0));
            result.command_type = CommandType::PrepareRequest;
        }
        return result;
    }

    if let Some(caps) = EXEC_PREPPED.captures(command) {
        let num: i64 = caps["stmtnum"].parse().unwrap_or(0);
        let (masked, handle_digits) = mask_execute_statement_num(command);
        result.handle = Some(handle_digits.and_then(|d| d.parse().ok()).unwrap_or(num));
        result.canonical_text = masked.clone();
        result.rewritten_text = masked;
        result.command_type = CommandType::ExecuteByHandle;
        return result;
    }

    if let Some(caps) = EXEC_UNPREP.captures(command) {
        result.handle = Some(caps["stmtnum"].parse().unwrap_or(0));
        result.canonical_text = UNPREPARE_PLACEHOLDER.to_owned();
        result.rewritten_text = UNPREPARE_PLACEHOLDER.to_owned();
        result.command_type = CommandType::UnprepareRequest;
        return result;
    }

    result
}

/// Zeroes the handle digits after `set @p1=` in place, preserving string
/// length, and returns the digits that were there.
///
/// Returns the text unchanged (and `None`) when the marker is absent or
/// sits at the very start of the text.
fn zero_fill_prepare_handle(command: &str) -> (String, Option<String>) {
    const MARKER: &str = "set @p1=";

    let Some(idx) = command.find(MARKER) else {
        return (command.to_owned(), None);
    };
    if idx == 0 {
        return (command.to_owned(), None);
    }

    let start = idx + MARKER.len();
    let end = command[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(command.len(), |off| start + off);
    let digits = command[start..end].to_owned();

    let mut out = String::with_capacity(command.len());
    out.push_str(&command[..start]);
    out.push_str(&"0".repeat(digits.len()));
    out.push_str(&command[end..]);
    (out, Some(digits))
}

/// Replaces the statement number after ` sp_execute ` with the single
/// placeholder `§`, shortening the string, and returns the digits that
/// were there.
///
/// Distinct from [`zero_fill_prepare_handle`] on purpose: the placeholder
/// form shortens the text and downstream grouping relies on the exact
/// shape of each.
fn mask_execute_statement_num(command: &str) -> (String, Option<String>) {
    const MARKER: &str = " sp_execute ";

    let Some(idx) = command.find(MARKER) else {
        return (command.to_owned(), None);
    };
    if idx == 0 {
        return (command.to_owned(), None);
    }

    let start = idx + MARKER.len();
    let end = command[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(command.len(), |off| start + off);
    let digits = command[start..end].to_owned();
    if digits.is_empty() {
        return (command.to_owned(), Some(digits));
    }

    let mut out = String::with_capacity(command.len());
    out.push_str(&command[..start]);
    out.push('§');
    out.push_str(&command[end..]);
    (out, Some(digits))
}
