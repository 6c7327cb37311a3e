//! The server object: owns the command table, configuration, and
//! transport loop for one served instance.
//!
//! A server is built, populated with commands, bound, and then either
//! `run` on the calling thread or `spawn`ed onto its own worker thread.
//! All shared state lives behind the server object; two instances in one
//! process never touch each other's tables.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use consrv_editor::History;
use consrv_types::{ConsrvError, ControlStatus, Result, ServerConfig, Transport};

use crate::dispatch::{dispatch, DispatchOutcome};
use crate::lockfile::LockFile;
use crate::native::register_native_commands;
use crate::overrides::Overrides;
use crate::registry::{CommandDef, CommandTable};
use crate::reply::Reply;
use crate::tokens::Tokenizer;
use crate::transport::{self, Bound};

/// How many name or port candidates to try before giving up.
pub(crate) const MAX_BIND_ATTEMPTS: usize = 10;

/// Lock a mutex, recovering the data from a poisoned lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the server object, its worker thread, and any
/// in-process dispatchers.
pub(crate) struct Shared {
    pub(crate) table: Mutex<CommandTable>,
    tokenizer: Mutex<Tokenizer>,
    /// Dispatch-in-progress flag; waiters block on the condvar.
    busy: Mutex<bool>,
    busy_cv: Condvar,
    pub(crate) stop: AtomicBool,
    /// Current negotiated payload size for the datagram protocol.
    pub(crate) payload_size: AtomicUsize,
}

impl Shared {
    fn new(payload_size: usize) -> Self {
        Self {
            table: Mutex::new(CommandTable::new()),
            tokenizer: Mutex::new(Tokenizer::new()),
            busy: Mutex::new(false),
            busy_cv: Condvar::new(),
            stop: AtomicBool::new(false),
            payload_size: AtomicUsize::new(payload_size),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_tests(payload_size: usize) -> Self {
        Self::new(payload_size)
    }

    /// Run `f` while holding the dispatch slot. Concurrent callers queue
    /// on the condvar; only one dispatch runs at a time.
    pub(crate) fn run_exclusive<T>(&self, f: impl FnOnce() -> T) -> T {
        let mut busy = lock(&self.busy);
        while *busy {
            busy = self
                .busy_cv
                .wait(busy)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *busy = true;
        drop(busy);

        let out = f();

        *lock(&self.busy) = false;
        self.busy_cv.notify_one();
        out
    }

    /// Dispatch one line under the exclusivity gate.
    pub(crate) fn dispatch_exclusive(
        &self,
        line: &str,
        reply: &mut Reply<'_>,
        history: Option<&History>,
    ) -> DispatchOutcome {
        self.run_exclusive(|| {
            let table = lock(&self.table);
            let mut tokenizer = lock(&self.tokenizer);
            dispatch(&table, &mut tokenizer, line, reply, history)
        })
    }

    /// Dispatch an argv the host program already split. Used by the
    /// in-process transport and the spawn handle.
    pub(crate) fn dispatch_args(&self, args: &[&str]) -> (ControlStatus, String) {
        let line = args.join(" ");
        let capacity = self.payload_size.load(Ordering::SeqCst);
        let mut reply = Reply::buffered(capacity);
        let outcome = self.dispatch_exclusive(&line, &mut reply, None);
        (outcome.status.into(), reply.text())
    }
}

/// One command server instance.
pub struct Server {
    config: ServerConfig,
    shared: Arc<Shared>,
    bound: Option<Bound>,
}

impl Server {
    /// Build a server from its configuration. The interactive transports
    /// get the built-in commands registered ahead of user commands.
    pub fn new(config: ServerConfig) -> Self {
        let shared = Arc::new(Shared::new(config.payload_size));
        if matches!(config.transport, Transport::Tcp | Transport::InProcess) {
            register_native_commands(&mut lock(&shared.table));
        }
        Self {
            config,
            shared,
            bound: None,
        }
    }

    /// Build a server after applying the override file at `path`.
    pub fn with_overrides(mut config: ServerConfig, path: &Path) -> Result<Self> {
        let overrides = Overrides::load(path)?;
        overrides.apply(&mut config);
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Effective server name (may carry a collision suffix after bind).
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Effective port (set after bind for the IP transports).
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Register a command. Failures are logged and returned; the server
    /// keeps running either way.
    pub fn register(&self, def: CommandDef) -> Result<()> {
        lock(&self.shared.table).register(def)
    }

    /// Dispatch an already-split argv through this server's table.
    pub fn dispatch_args(&self, args: &[&str]) -> (ControlStatus, String) {
        self.shared.dispatch_args(args)
    }

    /// Claim the server name and bind the transport. Idempotent.
    ///
    /// On a name or address collision the next candidate is tried (name
    /// suffix `1`, `2`, ... or port + 1, + 2, ...) up to
    /// `MAX_BIND_ATTEMPTS`; the effective name and port are recorded in
    /// the configuration.
    pub fn bind(&mut self) -> Result<()> {
        if self.bound.is_some() {
            return Ok(());
        }
        let name_lock = claim_name(&mut self.config)?;
        let bound = match self.config.transport {
            Transport::Udp => transport::udp::bind(&mut self.config, name_lock)?,
            Transport::Tcp => transport::tcp::bind(&mut self.config, name_lock)?,
            #[cfg(unix)]
            Transport::UnixDatagram => transport::unix::bind(&mut self.config, name_lock)?,
            #[cfg(not(unix))]
            Transport::UnixDatagram => {
                return Err(ConsrvError::Transport(
                    "local-domain sockets are not available on this platform".to_string(),
                ));
            },
            Transport::InProcess => Bound::InProcess { _name_lock: name_lock },
        };
        log::info!(
            "server '{}' bound ({:?})",
            self.config.name,
            self.config.transport
        );
        self.shared
            .payload_size
            .store(self.config.payload_size, Ordering::SeqCst);
        self.bound = Some(bound);
        Ok(())
    }

    /// Bind if needed and serve on the calling thread until stopped.
    pub fn run(mut self) -> Result<()> {
        self.bind()?;
        let Some(bound) = self.bound.take() else {
            return Err(ConsrvError::Transport("server did not bind".to_string()));
        };
        let result = match &bound {
            Bound::Udp { socket, .. } => transport::udp::serve(socket, &self.config, &self.shared),
            Bound::Tcp { listener, .. } => {
                transport::tcp::serve(listener, &self.config, &self.shared)
            },
            #[cfg(unix)]
            Bound::Unix { socket, .. } => {
                transport::unix::serve(socket, &self.config, &self.shared)
            },
            Bound::InProcess { .. } => transport::inproc::serve(&self.config, &self.shared),
        };
        log::info!("server '{}' stopped", self.config.name);
        drop(bound);
        result
    }

    /// Bind, then serve on a dedicated worker thread.
    pub fn spawn(mut self) -> Result<ServerHandle> {
        self.bind()?;
        let shared = Arc::clone(&self.shared);
        let name = self.config.name.clone();
        let port = self.config.port;
        let thread = std::thread::Builder::new()
            .name(format!("consrv-{name}"))
            .spawn(move || self.run())?;
        Ok(ServerHandle {
            shared,
            thread: Some(thread),
            name,
            port,
        })
    }
}

/// Claim a lock on the server name, suffixing on collision.
fn claim_name(config: &mut ServerConfig) -> Result<LockFile> {
    let base = config.name.clone();
    for attempt in 0..MAX_BIND_ATTEMPTS {
        let candidate = if attempt == 0 {
            base.clone()
        } else {
            format!("{base}{attempt}")
        };
        match LockFile::acquire(&config.runtime_dir, &candidate) {
            Ok(held) => {
                if candidate != base {
                    log::info!("server name '{base}' taken, using '{candidate}'");
                }
                config.name = candidate;
                return Ok(held);
            },
            Err(e) => {
                log::debug!("name candidate '{candidate}' unavailable: {e}");
            },
        }
    }
    Err(ConsrvError::Transport(format!(
        "no free server name after {MAX_BIND_ATTEMPTS} candidates from '{base}'"
    )))
}

/// Control handle for a spawned server.
pub struct ServerHandle {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<Result<()>>>,
    name: String,
    port: u16,
}

impl ServerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Ask the worker to stop. The serve loop notices within its poll
    /// interval; `join` to wait for it.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    /// Dispatch an argv through the running server's table.
    pub fn dispatch_args(&self, args: &[&str]) -> (ControlStatus, String) {
        self.shared.dispatch_args(args)
    }

    /// Stop the worker and wait for it to exit.
    pub fn join(mut self) -> Result<()> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| ConsrvError::Transport("server thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take()
            && let Err(e) = thread.join()
        {
            log::warn!("server thread panicked on shutdown: {e:?}");
        }
    }
}
