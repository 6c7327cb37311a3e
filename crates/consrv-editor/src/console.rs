//! Console abstraction: where the editor reads bytes and writes output.
//!
//! Every read carries a bounded timeout so the server layer can treat a
//! silent peer as disconnected (idle-session timeout).

use std::collections::VecDeque;
use std::io::{self, Read as IoRead, Write};
use std::net::TcpStream;
use std::time::Duration;

use consrv_types::Result;

/// Outcome of a single bounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read {
    /// One byte arrived.
    Byte(u8),
    /// Nothing arrived before the timeout.
    Idle,
    /// The peer closed the connection.
    Eof,
}

/// Byte-level terminal I/O as the editor sees it.
pub trait Console {
    /// Wait up to `timeout` for one byte.
    fn read_byte(&mut self, timeout: Duration) -> Result<Read>;

    /// Write raw output bytes.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Flush buffered output to the peer.
    fn flush(&mut self) -> Result<()>;
}

/// Console over a connected TCP stream (the socket/telnet personality).
pub struct SocketConsole {
    stream: TcpStream,
}

impl SocketConsole {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// The underlying stream, for shutdown from the session layer.
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl Console for SocketConsole {
    fn read_byte(&mut self, timeout: Duration) -> Result<Read> {
        self.stream.set_read_timeout(Some(timeout))?;
        let mut buf = [0u8; 1];
        match self.stream.read(&mut buf) {
            Ok(0) => Ok(Read::Eof),
            Ok(_) => Ok(Read::Byte(buf[0])),
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(Read::Idle)
            },
            Err(e) => Err(e.into()),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }
}

/// In-memory console fed from a fixed byte script.
///
/// Used by the editor and transport tests; reads return `Idle` once the
/// script is exhausted (or `Eof` when built with `then_eof`).
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    input: VecDeque<u8>,
    eof_on_exhaust: bool,
    /// Everything the editor wrote.
    pub output: Vec<u8>,
}

impl ScriptedConsole {
    pub fn new(script: &[u8]) -> Self {
        Self {
            input: script.iter().copied().collect(),
            eof_on_exhaust: false,
            output: Vec::new(),
        }
    }

    /// Exhausting the script reads as a peer disconnect instead of idle.
    pub fn then_eof(mut self) -> Self {
        self.eof_on_exhaust = true;
        self
    }

    /// Output written so far, as lossy UTF-8.
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Console for ScriptedConsole {
    fn read_byte(&mut self, _timeout: Duration) -> Result<Read> {
        match self.input.pop_front() {
            Some(b) => Ok(Read::Byte(b)),
            None if self.eof_on_exhaust => Ok(Read::Eof),
            None => Ok(Read::Idle),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_console_replays_bytes() {
        let mut c = ScriptedConsole::new(b"ab");
        let t = Duration::from_millis(1);
        assert_eq!(c.read_byte(t).unwrap(), Read::Byte(b'a'));
        assert_eq!(c.read_byte(t).unwrap(), Read::Byte(b'b'));
        assert_eq!(c.read_byte(t).unwrap(), Read::Idle);
    }

    #[test]
    fn scripted_console_eof_mode() {
        let mut c = ScriptedConsole::new(b"x").then_eof();
        let t = Duration::from_millis(1);
        assert_eq!(c.read_byte(t).unwrap(), Read::Byte(b'x'));
        assert_eq!(c.read_byte(t).unwrap(), Read::Eof);
    }

    #[test]
    fn scripted_console_records_output() {
        let mut c = ScriptedConsole::new(b"");
        c.write_bytes(b"hello ").unwrap();
        c.write_bytes(b"world").unwrap();
        assert_eq!(c.output_text(), "hello world");
    }
}
