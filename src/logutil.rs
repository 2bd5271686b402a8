//! Sanitizing of player-supplied text before it reaches the log.
//!
//! Chat lines, character names and session ids come straight from players.
//! A stray newline would split one log record in two, so everything that
//! originated in chat goes through [`escape_log`] first.

use std::fmt::Write;

/// Longest chat fragment copied into a log line.
pub const MAX_LOGGED_CHARS: usize = 200;

/// Render `text` on a single line: backslash, newline, carriage return and
/// tab become their escape sequences, other control characters become
/// `\xNN`. Text longer than [`MAX_LOGGED_CHARS`] is cut and ends in `…`.
pub fn escape_log(text: &str) -> String {
    let mut out = String::with_capacity(text.len().min(MAX_LOGGED_CHARS) + 4);
    let mut chars = text.chars();
    for ch in chars.by_ref().take(MAX_LOGGED_CHARS) {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    if chars.next().is_some() {
        out.push('…');
    }
    out
}
