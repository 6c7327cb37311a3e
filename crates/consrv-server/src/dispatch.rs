//! The dispatcher: completed line in, handler invocation out.
//!
//! Pipeline per command: strip the client timeout token, tokenize,
//! resolve against the table, intercept help requests, enforce argument
//! bounds, invoke. Resolution and bound failures are reported through
//! the reply buffer (prefixed, in-line) and mirrored as a status code
//! for control callers; they are never fatal.

use consrv_editor::History;
use consrv_types::{ConsrvError, ControlStatus};

use crate::native::{read_batch_lines, NativeCommand};
use crate::registry::{CommandAction, CommandCall, CommandTable, Resolution};
use crate::reply::Reply;
use crate::tokens::Tokenizer;

/// Tokens that request usage instead of execution.
const HELP_TOKENS: [&str; 4] = ["?", "-h", "-help", "--help"];

/// Nested batch-file replay limit.
const MAX_BATCH_DEPTH: usize = 4;

/// Machine-readable dispatch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// Resolved and (if a handler exists) invoked.
    Done,
    NotFound,
    BadArgCount,
    Ambiguous,
}

impl From<DispatchStatus> for ControlStatus {
    fn from(status: DispatchStatus) -> Self {
        match status {
            DispatchStatus::Done => Self::Done,
            DispatchStatus::NotFound => Self::NotFound,
            DispatchStatus::BadArgCount => Self::BadArgCount,
            DispatchStatus::Ambiguous => Self::Ambiguous,
        }
    }
}

/// What the session should do after this dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    None,
    /// The peer issued `quit`: end the session, keep the server.
    Quit,
}

/// Status plus session control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub status: DispatchStatus,
    pub action: SessionAction,
}

impl DispatchOutcome {
    fn done() -> Self {
        Self {
            status: DispatchStatus::Done,
            action: SessionAction::None,
        }
    }

    fn status(status: DispatchStatus) -> Self {
        Self {
            status,
            action: SessionAction::None,
        }
    }
}

/// Work that must happen after the token slices are released.
enum Deferred {
    None,
    Batch(String),
}

/// Dispatch one completed command line.
///
/// `session_history` is the interactive session's ring when the caller
/// has one (the `history` native displays it).
pub fn dispatch(
    table: &CommandTable,
    tokenizer: &mut Tokenizer,
    line: &str,
    reply: &mut Reply<'_>,
    session_history: Option<&History>,
) -> DispatchOutcome {
    dispatch_depth(table, tokenizer, line, reply, session_history, 0)
}

fn dispatch_depth(
    table: &CommandTable,
    tokenizer: &mut Tokenizer,
    line: &str,
    reply: &mut Reply<'_>,
    session_history: Option<&History>,
    depth: usize,
) -> DispatchOutcome {
    let line = strip_timeout_token(line.trim());

    tokenizer.open_window();
    let mut deferred = Deferred::None;
    let outcome = {
        let tokens = tokenizer.tokenize(line, ' ');
        if tokens.is_empty() {
            DispatchOutcome::done()
        } else {
            run_tokens(table, &tokens, reply, session_history, &mut deferred)
        }
    };
    tokenizer.close_window();

    if let Deferred::Batch(path) = deferred {
        return run_batch(table, tokenizer, &path, reply, session_history, depth);
    }
    outcome
}

fn run_tokens(
    table: &CommandTable,
    tokens: &[&str],
    reply: &mut Reply<'_>,
    session_history: Option<&History>,
    deferred: &mut Deferred,
) -> DispatchOutcome {
    let index = match table.resolve(tokens[0]) {
        Resolution::Match(index) => index,
        Resolution::NotFound => {
            reply.error(&format!("unrecognized command: {}", tokens[0]));
            return DispatchOutcome::status(DispatchStatus::NotFound);
        },
        Resolution::Ambiguous(names) => {
            reply.error(&format!(
                "ambiguous command '{}': matches {}",
                tokens[0],
                names.join(", ")
            ));
            return DispatchOutcome::status(DispatchStatus::Ambiguous);
        },
    };
    let Some(entry) = table.entry(index) else {
        return DispatchOutcome::status(DispatchStatus::NotFound);
    };
    let args = &tokens[1..];

    let help_requested = args.len() == 1 && HELP_TOKENS.contains(&args[0]);
    if help_requested && entry.show_usage_on_help {
        match &entry.usage {
            Some(usage) => reply.println(&format!("Usage: {usage}")),
            None => reply.println(&format!("{} takes no arguments", entry.name)),
        }
        return DispatchOutcome::done();
    }

    if !help_requested && (args.len() < entry.min_args || args.len() > entry.max_args) {
        match &entry.usage {
            Some(usage) => reply.println(&format!("Usage: {usage}")),
            None => reply.error(&format!("{} takes no arguments", entry.name)),
        }
        return DispatchOutcome::status(DispatchStatus::BadArgCount);
    }

    match &entry.action {
        CommandAction::Native(native) => match native {
            NativeCommand::Help => {
                run_help(table, args, reply);
                DispatchOutcome::done()
            },
            NativeCommand::Quit => {
                reply.println("bye");
                DispatchOutcome {
                    status: DispatchStatus::Done,
                    action: SessionAction::Quit,
                }
            },
            NativeCommand::History => {
                match session_history {
                    Some(history) => reply.print(&history.listing()),
                    None => reply.println("(no interactive session history)"),
                }
                DispatchOutcome::done()
            },
            NativeCommand::Batch => {
                *deferred = Deferred::Batch(args[0].to_string());
                DispatchOutcome::done()
            },
        },
        CommandAction::Handler(handler) => {
            let call = CommandCall {
                name: &entry.name,
                args,
                help_requested,
            };
            if let Err(e) = handler.run(&call, reply) {
                // A Command error is the handler's own message; other
                // variants keep their subsystem prefix.
                let detail = match e {
                    ConsrvError::Command(msg) => msg,
                    other => other.to_string(),
                };
                reply.error(&format!("{}: {detail}", entry.name));
            }
            DispatchOutcome::done()
        },
    }
}

fn run_help(table: &CommandTable, args: &[&str], reply: &mut Reply<'_>) {
    match args.first() {
        None => {
            reply.println("Available commands:");
            reply.print(&table.listing_human());
        },
        Some(name) => match table.resolve(name) {
            Resolution::Match(index) => {
                if let Some(entry) = table.entry(index) {
                    reply.println(&format!("{} -- {}", entry.name, entry.description));
                    if let Some(usage) = &entry.usage {
                        reply.println(&format!("Usage: {usage}"));
                    }
                }
            },
            Resolution::NotFound => reply.error(&format!("unrecognized command: {name}")),
            Resolution::Ambiguous(names) => {
                reply.error(&format!("ambiguous command '{name}': matches {}", names.join(", ")));
            },
        },
    }
}

fn run_batch(
    table: &CommandTable,
    tokenizer: &mut Tokenizer,
    path: &str,
    reply: &mut Reply<'_>,
    session_history: Option<&History>,
    depth: usize,
) -> DispatchOutcome {
    if depth >= MAX_BATCH_DEPTH {
        reply.error(&format!("batch nesting exceeds {MAX_BATCH_DEPTH} levels"));
        return DispatchOutcome::done();
    }
    let lines = match read_batch_lines(std::path::Path::new(path)) {
        Ok(lines) => lines,
        Err(e) => {
            reply.error(&format!("batch {path}: {e}"));
            return DispatchOutcome::done();
        },
    };
    let mut action = SessionAction::None;
    for line in &lines {
        let outcome = dispatch_depth(table, tokenizer, line, reply, session_history, depth + 1);
        if outcome.action == SessionAction::Quit {
            action = SessionAction::Quit;
            break;
        }
    }
    DispatchOutcome {
        status: DispatchStatus::Done,
        action,
    }
}

/// Strip the interactive client's leading response-timeout token
/// (`-t` or `-t<seconds>`) so commands relayed by such clients still
/// resolve.
pub fn strip_timeout_token(line: &str) -> &str {
    let Some(rest) = line.strip_prefix("-t") else {
        return line;
    };
    let mut chars = rest.chars();
    match chars.next() {
        // Bare "-t" followed by whitespace (or nothing).
        None => "",
        Some(c) if c.is_whitespace() => rest.trim_start(),
        Some(c) if c.is_ascii_digit() => {
            let after = rest.trim_start_matches(|ch: char| ch.is_ascii_digit());
            match after.chars().next() {
                None => "",
                Some(ws) if ws.is_whitespace() => after.trim_start(),
                // "-t3x" is not a timeout token; leave the line alone.
                _ => line,
            }
        },
        // "-tfoo" is a regular token.
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CommandDef, CommandHandler};
    use consrv_types::message::PAYLOAD_CHUNK;
    use std::io::Write as _;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recorder {
        calls: AtomicUsize,
        last_args: std::sync::Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                last_args: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    impl CommandHandler for Arc<Recorder> {
        fn run(&self, call: &CommandCall<'_>, reply: &mut Reply<'_>) -> consrv_types::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_args.lock().unwrap() =
                call.args.iter().map(|a| (*a).to_string()).collect();
            reply.println("ok");
            Ok(())
        }
    }

    fn table_with_add(recorder: &Arc<Recorder>) -> CommandTable {
        let mut table = CommandTable::new();
        table
            .register(
                CommandDef::new("add", "Add two integers", Arc::new(Arc::clone(recorder)))
                    .with_usage("add <a> <b>")
                    .with_args(2, 2),
            )
            .unwrap();
        table
    }

    fn run(table: &CommandTable, line: &str) -> (DispatchOutcome, String) {
        let mut tokenizer = Tokenizer::new();
        let mut reply = Reply::buffered(PAYLOAD_CHUNK);
        let outcome = dispatch(table, &mut tokenizer, line, &mut reply, None);
        (outcome, reply.text())
    }

    #[test]
    fn add_with_two_args_invokes_handler() {
        let rec = Recorder::new();
        let table = table_with_add(&rec);
        let (outcome, _) = run(&table, "add 3 4");
        assert_eq!(outcome.status, DispatchStatus::Done);
        assert_eq!(rec.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *rec.last_args.lock().unwrap(),
            vec!["3".to_string(), "4".to_string()]
        );
    }

    #[test]
    fn too_few_args_shows_usage_without_invoking() {
        let rec = Recorder::new();
        let table = table_with_add(&rec);
        let (outcome, text) = run(&table, "add 3");
        assert_eq!(outcome.status, DispatchStatus::BadArgCount);
        assert_eq!(rec.calls.load(Ordering::SeqCst), 0);
        assert!(text.contains("Usage: add <a> <b>"));
    }

    #[test]
    fn too_many_args_shows_usage_without_invoking() {
        let rec = Recorder::new();
        let table = table_with_add(&rec);
        let (outcome, _) = run(&table, "add 1 2 3");
        assert_eq!(outcome.status, DispatchStatus::BadArgCount);
        assert_eq!(rec.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unique_abbreviation_dispatches_like_full_name() {
        let rec = Recorder::new();
        let table = table_with_add(&rec);
        let (outcome, _) = run(&table, "ad 3 4");
        assert_eq!(outcome.status, DispatchStatus::Done);
        assert_eq!(rec.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_command_reports_not_found() {
        let rec = Recorder::new();
        let table = table_with_add(&rec);
        let (outcome, text) = run(&table, "frobnicate");
        assert_eq!(outcome.status, DispatchStatus::NotFound);
        assert!(text.contains("ERROR: unrecognized command: frobnicate"));
    }

    #[test]
    fn ambiguous_abbreviation_reports_candidates() {
        let mut table = CommandTable::new();
        let noop: Arc<dyn CommandHandler> =
            Arc::new(|_: &CommandCall<'_>, _: &mut Reply<'_>| Ok(()));
        table
            .register(CommandDef::new("setgain", "a", Arc::clone(&noop)))
            .unwrap();
        table
            .register(CommandDef::new("setgate", "b", noop).share_handler())
            .unwrap();
        let (outcome, text) = run(&table, "set");
        assert_eq!(outcome.status, DispatchStatus::Ambiguous);
        assert!(text.contains("setgain"));
        assert!(text.contains("setgate"));
    }

    #[test]
    fn help_tokens_bypass_bound_check() {
        let rec = Recorder::new();
        let table = table_with_add(&rec);
        for token in ["?", "-h", "-help", "--help"] {
            let (outcome, text) = run(&table, &format!("add {token}"));
            assert_eq!(outcome.status, DispatchStatus::Done, "token {token}");
            assert!(text.contains("Usage: add <a> <b>"), "token {token}");
        }
        assert_eq!(rec.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn opted_out_command_receives_help_token() {
        let mut table = CommandTable::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        let handler: Arc<dyn CommandHandler> =
            Arc::new(move |call: &CommandCall<'_>, reply: &mut Reply<'_>| {
                if call.help_requested {
                    seen2.fetch_add(1, Ordering::SeqCst);
                    reply.println("extended help text");
                }
                Ok(())
            });
        table
            .register(
                CommandDef::new("tune", "Tune things", handler)
                    .with_usage("tune <k> [v]")
                    .with_args(1, 2)
                    .handle_help_in_handler(),
            )
            .unwrap();
        let (outcome, text) = run(&table, "tune ?");
        assert_eq!(outcome.status, DispatchStatus::Done);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(text.contains("extended help text"));
    }

    #[test]
    fn handler_error_reported_through_reply() {
        let mut table = CommandTable::new();
        let handler: Arc<dyn CommandHandler> =
            Arc::new(|_: &CommandCall<'_>, _: &mut Reply<'_>| {
                Err(consrv_types::ConsrvError::Command("deliberate".to_string()))
            });
        table
            .register(CommandDef::new("fail", "Always fails", handler))
            .unwrap();
        let (outcome, text) = run(&table, "fail");
        // The handler ran; the failure is in-band text with the
        // handler's own message, no variant prefix.
        assert_eq!(outcome.status, DispatchStatus::Done);
        assert!(text.contains("ERROR: fail: deliberate"), "{text:?}");
    }

    #[test]
    fn non_command_handler_error_keeps_subsystem_prefix() {
        let mut table = CommandTable::new();
        let handler: Arc<dyn CommandHandler> =
            Arc::new(|_: &CommandCall<'_>, _: &mut Reply<'_>| {
                Err(std::io::Error::other("disk gone").into())
            });
        table
            .register(CommandDef::new("read", "Read a value", handler))
            .unwrap();
        let (_, text) = run(&table, "read");
        assert!(text.contains("ERROR: read: I/O error: disk gone"), "{text:?}");
    }

    #[test]
    fn empty_line_is_a_quiet_noop() {
        let rec = Recorder::new();
        let table = table_with_add(&rec);
        let (outcome, text) = run(&table, "   ");
        assert_eq!(outcome.status, DispatchStatus::Done);
        assert!(text.is_empty());
    }

    #[test]
    fn quit_native_signals_session_end() {
        let mut table = CommandTable::new();
        crate::native::register_native_commands(&mut table);
        let (outcome, _) = run(&table, "quit");
        assert_eq!(outcome.action, SessionAction::Quit);
    }

    #[test]
    fn help_native_lists_commands() {
        let rec = Recorder::new();
        let mut table = CommandTable::new();
        crate::native::register_native_commands(&mut table);
        table
            .register(
                CommandDef::new("add", "Add two integers", Arc::new(Arc::clone(&rec)))
                    .with_usage("add <a> <b>")
                    .with_args(2, 2),
            )
            .unwrap();
        let (_, text) = run(&table, "help");
        assert!(text.contains("Available commands:"));
        assert!(text.contains("add"));
        assert!(text.contains("quit"));

        let (_, text) = run(&table, "help add");
        assert!(text.contains("Usage: add <a> <b>"));
    }

    #[test]
    fn batch_replays_file_lines() {
        let rec = Recorder::new();
        let mut table = CommandTable::new();
        crate::native::register_native_commands(&mut table);
        table
            .register(
                CommandDef::new("add", "Add two integers", Arc::new(Arc::clone(&rec)))
                    .with_usage("add <a> <b>")
                    .with_args(2, 2),
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.cmds");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# two adds").unwrap();
        writeln!(f, "add 1 2").unwrap();
        writeln!(f, "add 3 4").unwrap();
        drop(f);

        let (outcome, _) = run(&table, &format!("batch {}", path.display()));
        assert_eq!(outcome.status, DispatchStatus::Done);
        assert_eq!(rec.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_batch_file_reports_error() {
        let mut table = CommandTable::new();
        crate::native::register_native_commands(&mut table);
        let (outcome, text) = run(&table, "batch /no/such/file");
        assert_eq!(outcome.status, DispatchStatus::Done);
        assert!(text.contains("ERROR: batch /no/such/file"));
    }

    #[test]
    fn timeout_token_stripped() {
        assert_eq!(strip_timeout_token("-t5 add 3 4"), "add 3 4");
        assert_eq!(strip_timeout_token("-t add 3 4"), "add 3 4");
        assert_eq!(strip_timeout_token("-t"), "");
        assert_eq!(strip_timeout_token("add 3 4"), "add 3 4");
        // Not timeout tokens.
        assert_eq!(strip_timeout_token("-tune x"), "-tune x");
        assert_eq!(strip_timeout_token("-t3x y"), "-t3x y");
    }

    #[test]
    fn control_status_mapping() {
        assert_eq!(ControlStatus::from(DispatchStatus::Done), ControlStatus::Done);
        assert_eq!(
            ControlStatus::from(DispatchStatus::NotFound),
            ControlStatus::NotFound
        );
        assert_eq!(
            ControlStatus::from(DispatchStatus::BadArgCount),
            ControlStatus::BadArgCount
        );
        assert_eq!(
            ControlStatus::from(DispatchStatus::Ambiguous),
            ControlStatus::Ambiguous
        );
    }
}
