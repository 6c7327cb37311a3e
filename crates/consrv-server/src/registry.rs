//! Command table: the growable registry of named commands.
//!
//! Entries are appended at registration time and immutable afterwards.
//! Lookup is by case-sensitive prefix with exact matches winning ties,
//! so interactive peers can abbreviate command names.

use std::borrow::Cow;
use std::sync::Arc;

use consrv_types::{ConsrvError, Result};

use crate::native::NativeCommand;
use crate::reply::Reply;

/// The resolved command line handed to a handler.
#[derive(Debug)]
pub struct CommandCall<'a> {
    /// Full registered name (the peer may have typed an abbreviation).
    pub name: &'a str,
    /// Argument tokens, command name excluded.
    pub args: &'a [&'a str],
    /// True when the peer asked for help and the command opted out of
    /// the auto-printed usage string.
    pub help_requested: bool,
}

/// A registered command's behavior.
pub trait CommandHandler: Send + Sync {
    fn run(&self, call: &CommandCall<'_>, reply: &mut Reply<'_>) -> Result<()>;
}

impl<F> CommandHandler for F
where
    F: Fn(&CommandCall<'_>, &mut Reply<'_>) -> Result<()> + Send + Sync,
{
    fn run(&self, call: &CommandCall<'_>, reply: &mut Reply<'_>) -> Result<()> {
        self(call, reply)
    }
}

/// What a resolved entry executes.
#[derive(Clone)]
pub(crate) enum CommandAction {
    /// A caller-supplied handler.
    Handler(Arc<dyn CommandHandler>),
    /// A built-in the dispatcher implements itself (it needs table access).
    Native(NativeCommand),
}

/// One registry entry.
pub struct CommandEntry {
    pub name: Cow<'static, str>,
    pub description: Cow<'static, str>,
    pub usage: Option<Cow<'static, str>>,
    pub min_args: usize,
    pub max_args: usize,
    /// Auto-print the usage string on a help request; when false the
    /// help token is forwarded to the handler instead.
    pub show_usage_on_help: bool,
    pub(crate) action: CommandAction,
}

/// Registration request for one command.
///
/// String metadata is `Cow<'static, str>`: static callers pay no copy,
/// dynamic callers hand over owned strings.
pub struct CommandDef {
    pub name: Cow<'static, str>,
    pub description: Cow<'static, str>,
    pub usage: Option<Cow<'static, str>>,
    pub min_args: usize,
    pub max_args: usize,
    pub show_usage_on_help: bool,
    /// Tolerate this handler already being registered under another name
    /// (one generic handler serving many commands).
    pub allow_shared_handler: bool,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandDef {
    /// A command taking no arguments. Add bounds and usage with the
    /// builder methods.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        description: impl Into<Cow<'static, str>>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            usage: None,
            min_args: 0,
            max_args: 0,
            show_usage_on_help: true,
            allow_shared_handler: false,
            handler,
        }
    }

    pub fn with_usage(mut self, usage: impl Into<Cow<'static, str>>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn with_args(mut self, min_args: usize, max_args: usize) -> Self {
        self.min_args = min_args;
        self.max_args = max_args;
        self
    }

    /// Forward help requests to the handler instead of auto-printing usage.
    pub fn handle_help_in_handler(mut self) -> Self {
        self.show_usage_on_help = false;
        self
    }

    pub fn share_handler(mut self) -> Self {
        self.allow_shared_handler = true;
        self
    }
}

/// Outcome of a name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Index of the single matching entry.
    Match(usize),
    NotFound,
    /// Names of all entries the abbreviation matched.
    Ambiguous(Vec<String>),
}

/// The registry itself.
#[derive(Default)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<&CommandEntry> {
        self.entries.get(index)
    }

    /// Register a command.
    ///
    /// On any validation failure the table is left unchanged, a warning
    /// is logged, and the error is returned (callers may ignore it; the
    /// process continues either way).
    pub fn register(&mut self, def: CommandDef) -> Result<()> {
        if let Err(e) = self.validate(&def) {
            log::warn!("command '{}' not registered: {e}", def.name);
            return Err(e);
        }
        self.entries.push(CommandEntry {
            name: def.name,
            description: def.description,
            usage: def.usage,
            min_args: def.min_args,
            max_args: def.max_args,
            show_usage_on_help: def.show_usage_on_help,
            action: CommandAction::Handler(def.handler),
        });
        Ok(())
    }

    /// Register a dispatcher-implemented built-in. Not reachable through
    /// the public registration API.
    pub(crate) fn register_native(
        &mut self,
        name: &'static str,
        description: &'static str,
        usage: Option<&'static str>,
        bounds: (usize, usize),
        native: NativeCommand,
    ) {
        self.entries.push(CommandEntry {
            name: Cow::Borrowed(name),
            description: Cow::Borrowed(description),
            usage: usage.map(Cow::Borrowed),
            min_args: bounds.0,
            max_args: bounds.1,
            show_usage_on_help: true,
            action: CommandAction::Native(native),
        });
    }

    fn validate(&self, def: &CommandDef) -> Result<()> {
        let reject = |why: &str| Err(ConsrvError::Registry(why.to_string()));

        if def.name.is_empty() {
            return reject("name is empty");
        }
        if def.name.contains(char::is_whitespace) {
            return reject("name contains whitespace");
        }
        if def.description.is_empty() {
            return reject("description is empty");
        }
        if def.min_args > def.max_args {
            return reject("min_args exceeds max_args");
        }
        let expects_args = def.max_args > 0;
        if expects_args && def.usage.is_none() {
            return reject("usage text required when arguments are expected");
        }
        if !expects_args && def.min_args == 0 && def.usage.is_some() {
            return reject("usage text supplied but no arguments are expected");
        }
        for entry in &self.entries {
            if entry.name == def.name {
                return reject("duplicate command name");
            }
            if !def.allow_shared_handler
                && let CommandAction::Handler(existing) = &entry.action
                && Arc::ptr_eq(existing, &def.handler)
            {
                return reject("handler already registered under another name");
            }
        }
        Ok(())
    }

    /// Resolve a possibly-abbreviated name.
    ///
    /// Case-sensitive prefix match against all registered names; an
    /// exact-length match wins any tie. The empty string never matches.
    pub fn resolve(&self, partial: &str) -> Resolution {
        if partial.is_empty() {
            return Resolution::NotFound;
        }
        let mut matches = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.name == partial {
                return Resolution::Match(i);
            }
            if entry.name.starts_with(partial) {
                matches.push(i);
            }
        }
        match matches.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Match(matches[0]),
            _ => Resolution::Ambiguous(
                matches
                    .iter()
                    .map(|&i| self.entries[i].name.to_string())
                    .collect(),
            ),
        }
    }

    /// Registered names, in registration order (the completion vocabulary).
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.to_string()).collect()
    }

    /// Human-readable command list, one line per command.
    pub fn listing_human(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!("  {:16} {}\r\n", entry.name, entry.description));
        }
        out
    }

    /// Machine-readable command list: `name<US>usage<US>...` per the
    /// delimited commands query.
    pub fn listing_delimited(&self, delimiter: char) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.name);
            out.push(delimiter);
            out.push_str(entry.usage.as_deref().unwrap_or(""));
            out.push(delimiter);
        }
        out
    }
}
