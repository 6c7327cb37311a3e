//! Transport personalities.
//!
//! Each transport owns its bind logic and serve loop; the pieces they
//! share live here: the bound-socket holder, the IP port retry ladder,
//! and the datagram request handler the UDP and local-domain loops both
//! call.

use std::io;
use std::net::{TcpListener, UdpSocket};
#[cfg(unix)]
use std::path::PathBuf;

use consrv_types::{
    ConsrvError, ControlStatus, Message, MessageKind, Result, ServerConfig, PROTOCOL_VERSION,
};

use crate::lockfile::{ip_stem, LockFile};
use crate::reply::Reply;
use crate::server::{lock, Shared, MAX_BIND_ATTEMPTS};

pub(crate) mod inproc;
pub(crate) mod tcp;
pub(crate) mod udp;
#[cfg(unix)]
pub(crate) mod unix;

/// Poll interval for the stop flag in every serve loop.
pub(crate) const STOP_POLL: std::time::Duration = std::time::Duration::from_secs(1);

/// A bound transport and the locks that guard it. Dropping releases
/// the locks (and the local-domain socket path).
pub(crate) enum Bound {
    Udp {
        socket: UdpSocket,
        _name_lock: LockFile,
        _addr_lock: LockFile,
    },
    Tcp {
        listener: TcpListener,
        _name_lock: LockFile,
        _addr_lock: LockFile,
    },
    #[cfg(unix)]
    Unix {
        socket: std::os::unix::net::UnixDatagram,
        path: PathBuf,
        _name_lock: LockFile,
    },
    InProcess {
        _name_lock: LockFile,
    },
}

impl Drop for Bound {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Self::Unix { path, .. } = self {
            if let Err(e) = std::fs::remove_file(path.as_path()) {
                log::warn!("failed to remove socket {}: {e}", path.display());
            }
        }
    }
}

/// Bind an IP socket, walking the port ladder on collision.
///
/// Port 0 asks the OS for an ephemeral port and skips the ladder; the
/// lock is then taken on whatever port came back. A nonzero port is
/// locked first, then bound; either failing moves to port + 1, up to
/// `MAX_BIND_ATTEMPTS` candidates.
pub(crate) fn bind_ip<S>(
    config: &mut ServerConfig,
    proto: &str,
    bind: impl Fn(&str) -> io::Result<S>,
    local_port: impl Fn(&S) -> io::Result<u16>,
) -> Result<(S, LockFile)> {
    if config.port == 0 {
        let socket = bind(&format!("{}:0", config.host))?;
        let port = local_port(&socket)?;
        let addr_lock = LockFile::acquire(&config.runtime_dir, &ip_stem(proto, &config.host, port))?;
        config.port = port;
        return Ok((socket, addr_lock));
    }
    let requested = config.port;
    for attempt in 0..MAX_BIND_ATTEMPTS as u16 {
        // The ladder ends at the port ceiling; it never wraps.
        let Some(port) = requested.checked_add(attempt) else {
            break;
        };
        let stem = ip_stem(proto, &config.host, port);
        let addr_lock = match LockFile::acquire(&config.runtime_dir, &stem) {
            Ok(held) => held,
            Err(e) => {
                log::debug!("{proto} port {port} locked: {e}");
                continue;
            },
        };
        match bind(&format!("{}:{port}", config.host)) {
            Ok(socket) => {
                if port != requested {
                    log::info!("{proto} port {requested} busy, using {port}");
                }
                config.port = port;
                return Ok((socket, addr_lock));
            },
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                log::debug!("{proto} port {port} in use");
            },
            Err(e) => return Err(e.into()),
        }
    }
    Err(ConsrvError::Transport(format!(
        "no free {proto} port after {MAX_BIND_ATTEMPTS} candidates from {requested}"
    )))
}

/// Whether a socket read error is just a poll timeout.
pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Handle one received datagram; returns the encoded replies to send,
/// in order.
pub(crate) fn handle_datagram(
    shared: &Shared,
    config: &ServerConfig,
    wire: &[u8],
) -> Vec<Vec<u8>> {
    let msg = match Message::decode(wire) {
        Ok(msg) => msg,
        Err(e) => {
            log::warn!("dropping malformed datagram: {e}");
            return Vec::new();
        },
    };

    let mut out = Vec::new();
    match msg.kind {
        MessageKind::VersionQuery => {
            out.push(reply_msg(msg.kind, PROTOCOL_VERSION.to_string()));
        },
        MessageKind::PayloadSizeQuery => {
            let size = shared.payload_size.load(std::sync::atomic::Ordering::SeqCst);
            out.push(reply_msg(msg.kind, size.to_string()));
        },
        MessageKind::NameQuery => out.push(reply_msg(msg.kind, config.name.clone())),
        MessageKind::TitleQuery => out.push(reply_msg(msg.kind, config.title.clone())),
        MessageKind::BannerQuery => out.push(reply_msg(msg.kind, config.banner.clone())),
        MessageKind::PromptQuery => out.push(reply_msg(msg.kind, config.effective_prompt())),
        MessageKind::CommandsHuman => {
            out.push(reply_msg(msg.kind, lock(&shared.table).listing_human()));
        },
        MessageKind::CommandsDelimited => {
            let listing = lock(&shared.table)
                .listing_delimited(consrv_types::message::COMMANDS_DELIMITER);
            out.push(reply_msg(msg.kind, listing));
        },
        MessageKind::UserCommand => {
            let capacity = shared.payload_size.load(std::sync::atomic::Ordering::SeqCst);
            let mut reply = Reply::buffered(capacity);
            let line = msg.text();
            shared.dispatch_exclusive(&line, &mut reply, None);
            if msg.response_needed {
                if reply.grew() {
                    let new_size = reply.capacity();
                    shared
                        .payload_size
                        .store(new_size, std::sync::atomic::Ordering::SeqCst);
                    out.push(reply_msg(
                        MessageKind::PayloadSizeUpdate,
                        new_size.to_string(),
                    ));
                }
                out.push(reply_msg(MessageKind::CommandComplete, reply.take()));
            }
        },
        MessageKind::ControlCommand => {
            let capacity = shared.payload_size.load(std::sync::atomic::Ordering::SeqCst);
            let mut reply = Reply::buffered(capacity);
            let line = msg.text();
            let outcome = shared.dispatch_exclusive(&line, &mut reply, None);
            if msg.response_needed {
                let status: ControlStatus = outcome.status.into();
                out.push(reply_msg(
                    MessageKind::CommandComplete,
                    vec![status.as_byte()],
                ));
            }
        },
        MessageKind::CommandComplete | MessageKind::PayloadSizeUpdate => {
            log::debug!("ignoring client-bound message kind {:?}", msg.kind);
        },
    }
    out
}

/// Encode a server reply (no response expected back).
fn reply_msg(kind: MessageKind, payload: impl Into<Vec<u8>>) -> Vec<u8> {
    let mut msg = Message::new(kind, payload);
    msg.response_needed = false;
    msg.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CommandCall, CommandDef, CommandHandler};
    use consrv_types::Transport;
    use std::sync::Arc;

    fn shared_with(commands: &[(&'static str, &'static str)]) -> (Shared, ServerConfig) {
        let shared = Shared::new_for_tests(1024);
        for (name, desc) in commands {
            let handler: Arc<dyn CommandHandler> =
                Arc::new(|call: &CommandCall<'_>, reply: &mut Reply<'_>| {
                    reply.println(&format!("ran {}", call.name));
                    Ok(())
                });
            lock(&shared.table)
                .register(CommandDef::new(*name, *desc, handler))
                .unwrap();
        }
        let mut config = ServerConfig::new("dgram");
        config.transport = Transport::Udp;
        config.title = "bench A".to_string();
        config.banner = "welcome".to_string();
        (shared, config)
    }

    fn one_reply(shared: &Shared, config: &ServerConfig, msg: &Message) -> Message {
        let replies = handle_datagram(shared, config, &msg.encode());
        assert_eq!(replies.len(), 1);
        Message::decode(&replies[0]).unwrap()
    }

    #[test]
    fn metadata_queries_echo_their_kind() {
        let (shared, config) = shared_with(&[]);
        for (kind, expect) in [
            (MessageKind::VersionQuery, PROTOCOL_VERSION.to_string()),
            (MessageKind::PayloadSizeQuery, "1024".to_string()),
            (MessageKind::NameQuery, "dgram".to_string()),
            (MessageKind::TitleQuery, "bench A".to_string()),
            (MessageKind::BannerQuery, "welcome".to_string()),
            (MessageKind::PromptQuery, "dgram> ".to_string()),
        ] {
            let reply = one_reply(&shared, &config, &Message::query(kind));
            assert_eq!(reply.kind, kind);
            assert!(!reply.response_needed);
            assert_eq!(reply.text(), expect);
        }
    }

    #[test]
    fn commands_queries_list_the_table() {
        let (shared, config) = shared_with(&[("status", "Show status")]);
        let reply = one_reply(&shared, &config, &Message::query(MessageKind::CommandsHuman));
        assert!(reply.text().contains("status"));
        assert!(reply.text().contains("Show status"));

        let reply = one_reply(
            &shared,
            &config,
            &Message::query(MessageKind::CommandsDelimited),
        );
        assert_eq!(reply.text(), "status\x1f\x1f");
    }

    #[test]
    fn user_command_gets_text_and_completion() {
        let (shared, config) = shared_with(&[("status", "Show status")]);
        let reply = one_reply(
            &shared,
            &config,
            &Message::new(MessageKind::UserCommand, "status"),
        );
        assert_eq!(reply.kind, MessageKind::CommandComplete);
        assert_eq!(reply.text(), "ran status\r\n");
    }

    #[test]
    fn control_command_gets_status_digit() {
        let (shared, config) = shared_with(&[("status", "Show status")]);
        let reply = one_reply(
            &shared,
            &config,
            &Message::new(MessageKind::ControlCommand, "status"),
        );
        assert_eq!(reply.payload, vec![b'0']);

        let reply = one_reply(
            &shared,
            &config,
            &Message::new(MessageKind::ControlCommand, "missing"),
        );
        assert_eq!(reply.payload, vec![b'1']);
    }

    #[test]
    fn no_response_requested_means_silence() {
        let (shared, config) = shared_with(&[("status", "Show status")]);
        let mut msg = Message::new(MessageKind::UserCommand, "status");
        msg.response_needed = false;
        assert!(handle_datagram(&shared, &config, &msg.encode()).is_empty());
    }

    #[test]
    fn oversized_reply_grows_and_notifies_once() {
        let shared = Shared::new_for_tests(16);
        let handler: Arc<dyn CommandHandler> =
            Arc::new(|_: &CommandCall<'_>, reply: &mut Reply<'_>| {
                reply.print(&"x".repeat(100));
                Ok(())
            });
        lock(&shared.table)
            .register(CommandDef::new("blast", "Big output", handler))
            .unwrap();
        let config = ServerConfig::new("dgram");

        let replies = handle_datagram(
            &shared,
            &config,
            &Message::new(MessageKind::UserCommand, "blast").encode(),
        );
        assert_eq!(replies.len(), 2);
        let update = Message::decode(&replies[0]).unwrap();
        assert_eq!(update.kind, MessageKind::PayloadSizeUpdate);
        let new_size: usize = update.text().parse().unwrap();
        assert!(new_size > 16);
        // The negotiated size sticks for later queries.
        assert_eq!(
            shared
                .payload_size
                .load(std::sync::atomic::Ordering::SeqCst),
            new_size
        );
        let done = Message::decode(&replies[1]).unwrap();
        assert_eq!(done.kind, MessageKind::CommandComplete);
        assert_eq!(done.payload.len(), 100);
    }

    #[test]
    fn port_ladder_stops_at_the_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::new("high");
        config.runtime_dir = dir.path().to_path_buf();
        config.port = u16::MAX;
        // The only in-range candidate is locked; the ladder must give up
        // instead of wrapping past the top port.
        let _held =
            LockFile::acquire(dir.path(), &ip_stem("tcp", "127.0.0.1", u16::MAX)).unwrap();
        let result = bind_ip(
            &mut config,
            "tcp",
            |addr: &str| std::net::TcpListener::bind(addr),
            |l: &std::net::TcpListener| l.local_addr().map(|a| a.port()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn malformed_datagram_dropped() {
        let (shared, config) = shared_with(&[]);
        assert!(handle_datagram(&shared, &config, &[255, 0]).is_empty());
        assert!(handle_datagram(&shared, &config, &[99, 1, 0, 0]).is_empty());
    }

    #[test]
    fn client_bound_kinds_ignored() {
        let (shared, config) = shared_with(&[]);
        let msg = Message::new(MessageKind::CommandComplete, "stray");
        assert!(handle_datagram(&shared, &config, &msg.encode()).is_empty());
    }
}
