//! TCP stream transport: the interactive terminal personality.
//!
//! One peer is served at a time. A connected peer gets the banner, a
//! prompt, and the full line editor; completed lines go through the
//! dispatcher and output streams back over the same connection.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use consrv_editor::{Console, LineEditor, LineOutcome, Personality, Read, SocketConsole};
use consrv_types::{Result, ServerConfig};

use crate::dispatch::SessionAction;
use crate::lockfile::LockFile;
use crate::reply::{Reply, ReplySink};
use crate::server::{lock, Shared};
use crate::transport::{bind_ip, Bound, STOP_POLL};

/// Accept-poll interval while no peer is connected.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

pub(crate) fn bind(config: &mut ServerConfig, name_lock: LockFile) -> Result<Bound> {
    let (listener, addr_lock) = bind_ip(
        config,
        "tcp",
        |addr: &str| TcpListener::bind(addr),
        |l: &TcpListener| l.local_addr().map(|a| a.port()),
    )?;
    Ok(Bound::Tcp {
        listener,
        _name_lock: name_lock,
        _addr_lock: addr_lock,
    })
}

pub(crate) fn serve(listener: &TcpListener, config: &ServerConfig, shared: &Shared) -> Result<()> {
    listener.set_nonblocking(true)?;
    log::info!(
        "'{}' serving tcp on {}:{}",
        config.name,
        config.host,
        config.port
    );
    while !shared.stop.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            },
            Err(e) => return Err(e.into()),
        };
        log::info!("peer {peer} connected to '{}'", config.name);
        if let Err(e) = peer_session(stream, config, shared) {
            log::warn!("session with {peer} ended with error: {e}");
        }
        log::info!("peer {peer} disconnected from '{}'", config.name);
    }
    Ok(())
}

fn peer_session(stream: TcpStream, config: &ServerConfig, shared: &Shared) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut console = StopConsole {
        inner: SocketConsole::new(stream),
        stop: &shared.stop,
    };
    session(&mut console, config, shared)
}

/// Run one interactive session over any console.
pub(crate) fn session(
    console: &mut dyn Console,
    config: &ServerConfig,
    shared: &Shared,
) -> Result<()> {
    if !config.banner.is_empty() {
        console.write_bytes(config.banner.as_bytes())?;
        console.write_bytes(b"\r\n")?;
    }
    let mut editor = LineEditor::new(Personality::Socket)
        .with_idle_timeout(Duration::from_secs(config.idle_timeout_mins * 60));
    editor.set_completions(lock(&shared.table).names());
    let prompt = config.effective_prompt();

    loop {
        let line = match editor.read_line(console, &prompt)? {
            LineOutcome::Line(line) => line,
            LineOutcome::Idle => {
                console.write_bytes(b"\r\nidle timeout, closing session\r\n")?;
                console.flush()?;
                return Ok(());
            },
            LineOutcome::Eof => return Ok(()),
        };

        let capacity = shared.payload_size.load(Ordering::SeqCst);
        let outcome;
        {
            let mut sink = ConsoleSink {
                console: &mut *console,
            };
            let mut reply = Reply::streaming(capacity, &mut sink);
            outcome = shared.dispatch_exclusive(&line, &mut reply, Some(editor.history()));
            let tail = reply.take();
            if !tail.is_empty() {
                sink.flush_chunk(&tail)?;
            }
        }
        if outcome.action == SessionAction::Quit {
            return Ok(());
        }
    }
}

/// Streams reply overflow (and the final chunk) to the session console.
struct ConsoleSink<'c> {
    console: &'c mut dyn Console,
}

impl ReplySink for ConsoleSink<'_> {
    fn flush_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        self.console.write_bytes(bytes)?;
        self.console.flush()
    }
}

/// Console wrapper that polls the stop flag between short reads, so a
/// stopping server does not wait out a session's idle timeout.
struct StopConsole<'a> {
    inner: SocketConsole,
    stop: &'a AtomicBool,
}

impl Console for StopConsole<'_> {
    fn read_byte(&mut self, timeout: Duration) -> Result<Read> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return Ok(Read::Eof);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Read::Idle);
            }
            match self.inner.read_byte(remaining.min(STOP_POLL))? {
                Read::Idle => {},
                other => return Ok(other),
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_bytes(bytes)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}
