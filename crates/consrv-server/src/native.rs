//! Native commands: built-ins registered ahead of user commands.
//!
//! These need access to the command table (or the session), so the
//! dispatcher implements them directly instead of going through a
//! caller-supplied handler. The connectionless transports skip them;
//! their clients provide equivalents on their own side.

use std::fs;
use std::path::Path;

use consrv_types::Result;

use crate::registry::CommandTable;

/// Identifies a dispatcher-implemented built-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCommand {
    /// List all commands, or show one command's usage.
    Help,
    /// End the interactive session (not the process).
    Quit,
    /// Display the session's input history.
    History,
    /// Replay commands from a file.
    Batch,
}

/// Register the native commands. Must run before any user registration
/// so the natives occupy the head of the table.
pub(crate) fn register_native_commands(table: &mut CommandTable) {
    table.register_native(
        "help",
        "List commands, or show usage for one command",
        Some("help [command]"),
        (0, 1),
        NativeCommand::Help,
    );
    table.register_native(
        "quit",
        "End this session",
        None,
        (0, 0),
        NativeCommand::Quit,
    );
    table.register_native(
        "history",
        "Display the session input history",
        None,
        (0, 0),
        NativeCommand::History,
    );
    table.register_native(
        "batch",
        "Replay commands from a file",
        Some("batch <file>"),
        (1, 1),
        NativeCommand::Batch,
    );
}

/// Read a batch file into replayable lines, skipping blanks and `#`
/// comments.
pub(crate) fn read_batch_lines(path: &Path) -> Result<Vec<String>> {
    let source = fs::read_to_string(path)?;
    Ok(source
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}
